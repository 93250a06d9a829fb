//! Core error types for calico-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of annotation parsing and type-size resolution.

use std::fmt;

use thiserror::Error;

/// A malformed or inconsistent annotation block.
///
/// Carries the absolute source line of the offending clause and, when known,
/// the clause tag (without the leading `@`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}{}: {kind}", TagSuffix(.tag.as_deref()))]
pub struct ParseError {
    pub line: usize,
    pub tag: Option<String>,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(line: usize, tag: Option<&str>, kind: ParseErrorKind) -> Self {
        ParseError {
            line,
            tag: tag.map(str::to_string),
            kind,
        }
    }
}

struct TagSuffix<'a>(Option<&'a str>);

impl fmt::Display for TagSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(tag) => write!(f, " (@{tag})"),
            None => Ok(()),
        }
    }
}

/// What went wrong while parsing a clause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// A brace group was never closed, or closed without being opened.
    #[error("unbalanced braces")]
    UnbalancedBraces,

    /// The clause's brace group closed without a terminating `;` on that line.
    #[error("missing ';' after clause")]
    MissingSemicolon,

    /// A known tag received the wrong number of fields.
    #[error("expected {expected} field(s), found {found}")]
    FieldCount { expected: &'static str, found: usize },

    /// A field had the wrong shape for its position.
    #[error("invalid field: expected {expected}")]
    InvalidField { expected: &'static str },

    /// An effect-kind tag that is neither `Pure` nor `SideEffect`.
    #[error("unknown effect kind '{name}'")]
    UnknownEffectKind { name: String },

    /// A property clause written in the other dialect's form.
    #[error("property clause does not match the {dialect} dialect declared by @fun-info")]
    DialectMismatch { dialect: &'static str },

    /// The block has clauses but no `@fun-info`.
    #[error("missing @fun-info clause")]
    MissingFunInfo,

    /// A clause that may only appear once appeared again.
    #[error("duplicate clause")]
    DuplicateClause,

    /// Two `@param-info` clauses declared the same name.
    #[error("duplicate parameter '{name}'")]
    DuplicateParameter { name: String },

    /// A clause referenced a parameter that no `@param-info` declares.
    #[error("unknown parameter '{name}'")]
    UnknownParameter { name: String },

    /// An element count that is zero or does not fit in memory.
    #[error("element count must be a positive integer, got '{value}'")]
    InvalidCount { value: String },

    /// A character or token that the clause grammar does not allow here.
    #[error("unexpected {found}")]
    UnexpectedToken { found: String },
}

/// Failure to turn a size expression such as `sizeof(int)` into a byte count.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unknown type '{name}'")]
    UnknownType { name: String },

    #[error("type '{name}' has no size")]
    Unsized { name: String },

    #[error("malformed size expression '{expr}'")]
    Malformed { expr: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_includes_line_and_tag() {
        let err = ParseError::new(7, Some("param-info"), ParseErrorKind::MissingSemicolon);
        assert_eq!(err.to_string(), "line 7 (@param-info): missing ';' after clause");
    }

    #[test]
    fn parse_error_display_without_tag() {
        let err = ParseError::new(1, None, ParseErrorKind::MissingFunInfo);
        assert_eq!(err.to_string(), "line 1: missing @fun-info clause");
    }

    #[test]
    fn field_count_display() {
        let kind = ParseErrorKind::FieldCount {
            expected: "2 or 3",
            found: 4,
        };
        assert_eq!(kind.to_string(), "expected 2 or 3 field(s), found 4");
    }

    #[test]
    fn errors_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ParseError>();
        assert_send_sync::<ResolveError>();
    }
}
