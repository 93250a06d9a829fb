//! Extraction of annotation blocks from C source text.
//!
//! The parser only ever sees one isolated block. This module finds the
//! `/** ... */` regions that carry at least one contract clause and records where
//! they start, so parse errors can point at absolute source lines.

use serde::{Deserialize, Serialize};

use crate::parser::KNOWN_TAGS;

/// One documentation comment containing contract clauses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationBlock {
    /// Full comment text, from `/**` through `*/`.
    pub text: String,
    /// 1-based line of the opening `/**`.
    pub start_line: usize,
    /// Name of the function defined right after the block, if one could be
    /// recognised.
    pub function_hint: Option<String>,
}

/// Returns every annotation block in `source`, in order of appearance.
///
/// Plain `/* */` comments and doc comments without any contract clause are
/// skipped. An unterminated final comment is ignored.
pub fn extract_blocks(source: &str) -> Vec<AnnotationBlock> {
    let mut blocks = Vec::new();
    let mut cursor = 0;

    while let Some(open) = source[cursor..].find("/**") {
        let start = cursor + open;
        // `/**/` closes itself.
        let Some(close) = source[start + 2..].find("*/") else {
            break;
        };
        let end = start + 2 + close + 2;
        let text = &source[start..end];
        cursor = end;

        if !has_clause(text) {
            continue;
        }

        blocks.push(AnnotationBlock {
            text: text.to_string(),
            start_line: line_of(source, start),
            function_hint: function_after(&source[end..]),
        });
    }

    blocks
}

fn has_clause(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim_start();
        let line = line.strip_prefix("/**").unwrap_or(line);
        let line = line.trim_start();
        let line = line.strip_prefix('*').unwrap_or(line);
        let Some(after_at) = line.trim_start().strip_prefix('@') else {
            return false;
        };
        KNOWN_TAGS.iter().any(|tag| {
            after_at.strip_prefix(*tag).is_some_and(|rest| {
                !rest.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            })
        })
    })
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].bytes().filter(|b| *b == b'\n').count() + 1
}

/// Finds the identifier right before the first `(` of the following
/// declaration, e.g. `double_int_ptr` in `void double_int_ptr ( int* in )`.
fn function_after(rest: &str) -> Option<String> {
    let decl_end = rest.find(['(', ';', '{'])?;
    if !rest[decl_end..].starts_with('(') {
        return None;
    }
    let head = rest[..decl_end].trim_end();
    let name: String = head
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        None
    } else {
        Some(name)
    }
}
