//! Parser for contract annotation blocks.
//!
//! Input is the text of one `/** ... */` comment block plus the source line
//! it starts on. Comment decoration is stripped, lines that do not start with
//! `@` are treated as prose, and each `@tag { ... } ;` clause is lexed and
//! folded into a [`Contract`].
//!
//! Two dialects exist and are told apart by the shape of `@fun-info`:
//!
//! ```text
//! untagged:       @fun-info { double_int_ptr, "void" } ;
//!                 @input-prop { negate(in) } ;
//! effect-tagged:  @fun-info { double_int_ptr, SideEffect, "void" } ;
//!                 @input-prop { SideEffect } negate(in) ;
//! ```
//!
//! Both produce the same [`Contract`] for the same semantic content: an
//! effect-kind scope equal to the contract's own effect kind is redundant and
//! stored as `None`.

use std::fmt;

use crate::contract::{
    Contract, EffectKind, Parameter, PropertyClause, RecoverySpec, DEFAULT_EQUALITY_OP,
};
use crate::error::{ParseError, ParseErrorKind};

/// The annotation grammar a block was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `@fun-info { name, "ret" }`, properties as `{ pred(arg) }`.
    Untagged,
    /// `@fun-info { name, Kind, "ret" }`, properties as `{ Kind } pred(arg)`.
    EffectTagged,
}

impl Dialect {
    fn name(self) -> &'static str {
        match self {
            Dialect::Untagged => "untagged",
            Dialect::EffectTagged => "effect-tagged",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses one annotation block into a [`Contract`].
///
/// `start_line` is the source line of the block's first line; error line
/// numbers are absolute.
pub fn parse_block(text: &str, start_line: usize) -> Result<Contract, ParseError> {
    parse_block_with_dialect(text, start_line).map(|(contract, _)| contract)
}

/// Like [`parse_block`], also reporting which dialect the block used.
pub fn parse_block_with_dialect(
    text: &str,
    start_line: usize,
) -> Result<(Contract, Dialect), ParseError> {
    let clauses = collect_clauses(text, start_line)?
        .into_iter()
        .map(ShapedClause::from_raw)
        .collect::<Result<Vec<_>, _>>()?;

    let mut fun_infos = clauses.iter().filter(|c| c.tag == "fun-info");
    let fun_info = fun_infos
        .next()
        .ok_or_else(|| ParseError::new(start_line, None, ParseErrorKind::MissingFunInfo))?;
    if let Some(dup) = fun_infos.next() {
        return Err(dup.error(ParseErrorKind::DuplicateClause));
    }
    let header = FunInfo::parse(fun_info)?;

    let dialect = header.dialect;
    let mut builder = ContractBuilder::new(dialect);
    for clause in &clauses {
        builder.apply(clause)?;
    }
    Ok((builder.finish(header)?, dialect))
}

// ---------------------------------------------------------------------------
// Lexing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Ident(String),
    Str(String),
    /// Decimal digits, kept as text so oversized counts can be reported.
    Int(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LBrace => "'{'".into(),
            Token::RBrace => "'}'".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::Comma => "','".into(),
            Token::Ident(s) => format!("identifier '{s}'"),
            Token::Str(s) => format!("string \"{s}\""),
            Token::Int(s) => format!("integer {s}"),
        }
    }
}

/// One clause with its tokens, before any tag-specific interpretation.
#[derive(Debug)]
struct RawClause {
    line: usize,
    tag: String,
    tokens: Vec<Token>,
    depth: usize,
}

enum Scan {
    Terminated,
    Open,
}

/// Removes `/**`, `*/` and the leading `*` of a comment line.
fn strip_decoration(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("/**") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("/*") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("*/") {
        s = rest;
    }
    s = s.trim_start();
    if let Some(rest) = s.strip_prefix('*') {
        s = rest;
    }
    s.trim()
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Tags that carry contract clauses. Any other `@word` line is documentation.
pub(crate) const KNOWN_TAGS: &[&str] = &[
    "fun-info",
    "param-info",
    "input-prop",
    "output-prop",
    "state-recover",
    "equality-op",
];

fn collect_clauses(text: &str, start_line: usize) -> Result<Vec<RawClause>, ParseError> {
    let mut clauses = Vec::new();
    let mut open: Option<RawClause> = None;

    for (offset, raw) in text.lines().enumerate() {
        let line = start_line + offset;
        let body = strip_decoration(raw);

        let (mut clause, rest) = match open.take() {
            Some(clause) => {
                if body.starts_with('@') {
                    return Err(ParseError::new(
                        clause.line,
                        Some(clause.tag.as_str()),
                        ParseErrorKind::UnbalancedBraces,
                    ));
                }
                (clause, body)
            }
            None => {
                let Some(after_at) = body.strip_prefix('@') else {
                    continue;
                };
                let tag_len = after_at
                    .find(|c: char| !is_ident_continue(c))
                    .unwrap_or(after_at.len());
                let tag = &after_at[..tag_len];
                if tag.is_empty() || !tag.starts_with(is_ident_start) {
                    return Err(ParseError::new(
                        line,
                        None,
                        ParseErrorKind::UnexpectedToken {
                            found: "'@' without a tag name".into(),
                        },
                    ));
                }
                if !KNOWN_TAGS.contains(&tag) {
                    tracing::warn!(line, tag, "skipping unknown annotation tag");
                    continue;
                }
                let clause = RawClause {
                    line,
                    tag: tag.to_string(),
                    tokens: Vec::new(),
                    depth: 0,
                };
                (clause, &after_at[tag_len..])
            }
        };

        match scan_line(rest, line, &mut clause)? {
            Scan::Terminated => clauses.push(clause),
            Scan::Open => open = Some(clause),
        }
    }

    if let Some(clause) = open {
        return Err(ParseError::new(
            clause.line,
            Some(clause.tag.as_str()),
            ParseErrorKind::UnbalancedBraces,
        ));
    }
    Ok(clauses)
}

/// Lexes one line of a clause. Returns `Open` when a brace group continues
/// onto the next line.
fn scan_line(rest: &str, line: usize, clause: &mut RawClause) -> Result<Scan, ParseError> {
    let tag = clause.tag.clone();
    let err = |kind| ParseError::new(line, Some(tag.as_str()), kind);

    let mut chars = rest.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '{' => {
                clause.depth += 1;
                clause.tokens.push(Token::LBrace);
            }
            '}' => {
                if clause.depth == 0 {
                    return Err(err(ParseErrorKind::UnbalancedBraces));
                }
                clause.depth -= 1;
                clause.tokens.push(Token::RBrace);
            }
            '(' => clause.tokens.push(Token::LParen),
            ')' => clause.tokens.push(Token::RParen),
            ',' => clause.tokens.push(Token::Comma),
            ';' => {
                if clause.depth > 0 {
                    return Err(err(ParseErrorKind::UnbalancedBraces));
                }
                let trailing = rest[i + 1..].trim();
                if !trailing.is_empty() {
                    return Err(err(ParseErrorKind::UnexpectedToken {
                        found: format!("'{trailing}' after ';'"),
                    }));
                }
                return Ok(Scan::Terminated);
            }
            '"' => {
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => {
                            if let Some((_, escaped)) = chars.next() {
                                s.push(escaped);
                            }
                        }
                        Some((_, ch)) => s.push(ch),
                        None => {
                            return Err(err(ParseErrorKind::UnexpectedToken {
                                found: "unterminated string".into(),
                            }))
                        }
                    }
                }
                clause.tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let mut s = c.to_string();
                while let Some(&(_, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    s.push(d);
                    chars.next();
                }
                clause.tokens.push(Token::Int(s));
            }
            c if is_ident_start(c) => {
                let mut s = c.to_string();
                while let Some(&(_, d)) = chars.peek() {
                    if !is_ident_continue(d) {
                        break;
                    }
                    s.push(d);
                    chars.next();
                }
                clause.tokens.push(Token::Ident(s));
            }
            other => {
                return Err(err(ParseErrorKind::UnexpectedToken {
                    found: format!("'{other}'"),
                }))
            }
        }
    }

    if clause.depth > 0 {
        Ok(Scan::Open)
    } else {
        Err(err(ParseErrorKind::MissingSemicolon))
    }
}

// ---------------------------------------------------------------------------
// Clause shape: `{ field, ... } [call]`
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct Call {
    name: String,
    arg: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Ident(String),
    Str(String),
    Int(String),
    Call(Call),
}

#[derive(Debug)]
struct ShapedClause {
    line: usize,
    tag: String,
    fields: Vec<Field>,
    /// Predicate call written after the brace group.
    tail: Option<Call>,
}

impl ShapedClause {
    fn from_raw(raw: RawClause) -> Result<ShapedClause, ParseError> {
        let mut cursor = Cursor {
            tokens: &raw.tokens,
            pos: 0,
            line: raw.line,
            tag: &raw.tag,
        };

        cursor.expect(&Token::LBrace, "'{'")?;
        let mut fields = Vec::new();
        if !cursor.eat(&Token::RBrace) {
            loop {
                fields.push(cursor.field()?);
                if cursor.eat(&Token::RBrace) {
                    break;
                }
                cursor.expect(&Token::Comma, "',' or '}'")?;
            }
        }

        let tail = if cursor.at_end() {
            None
        } else {
            let name = cursor.ident("predicate name")?;
            let arg = cursor.call_argument()?;
            Some(Call { name, arg })
        };
        if let Some(extra) = cursor.peek() {
            return Err(cursor.error(ParseErrorKind::UnexpectedToken {
                found: extra.describe(),
            }));
        }

        Ok(ShapedClause {
            line: raw.line,
            tag: raw.tag,
            fields,
            tail,
        })
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.line, Some(self.tag.as_str()), kind)
    }

    fn expect_fields(&self, expected: &'static str, count: usize) -> Result<(), ParseError> {
        if self.fields.len() != count {
            return Err(self.error(ParseErrorKind::FieldCount {
                expected,
                found: self.fields.len(),
            }));
        }
        Ok(())
    }

    fn expect_no_tail(&self) -> Result<(), ParseError> {
        match &self.tail {
            Some(call) => Err(self.error(ParseErrorKind::UnexpectedToken {
                found: format!("'{}({})' after the brace group", call.name, call.arg),
            })),
            None => Ok(()),
        }
    }

    fn ident_at(&self, index: usize, expected: &'static str) -> Result<&str, ParseError> {
        match &self.fields[index] {
            Field::Ident(s) => Ok(s),
            _ => Err(self.error(ParseErrorKind::InvalidField { expected })),
        }
    }

    fn str_at(&self, index: usize, expected: &'static str) -> Result<&str, ParseError> {
        match &self.fields[index] {
            Field::Str(s) => Ok(s),
            _ => Err(self.error(ParseErrorKind::InvalidField { expected })),
        }
    }
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: usize,
    tag: &'a str,
}

impl Cursor<'_> {
    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.line, Some(self.tag), kind)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn found(&self) -> String {
        self.peek()
            .map(Token::describe)
            .unwrap_or_else(|| "end of clause".into())
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(ParseErrorKind::UnexpectedToken {
                found: format!("{} where {what} was expected", self.found()),
            }))
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Ident(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.error(ParseErrorKind::UnexpectedToken {
                found: format!("{} where {what} was expected", self.found()),
            })),
        }
    }

    /// Parses `( identifier )`.
    fn call_argument(&mut self) -> Result<String, ParseError> {
        self.expect(&Token::LParen, "'('")?;
        let arg = self.ident("argument name")?;
        self.expect(&Token::RParen, "')'")?;
        Ok(arg)
    }

    fn field(&mut self) -> Result<Field, ParseError> {
        let found = self.found();
        match self.next().cloned() {
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    let arg = self.call_argument()?;
                    Ok(Field::Call(Call { name, arg }))
                } else {
                    Ok(Field::Ident(name))
                }
            }
            Some(Token::Str(s)) => Ok(Field::Str(s)),
            Some(Token::Int(s)) => Ok(Field::Int(s)),
            _ => Err(self.error(ParseErrorKind::UnexpectedToken {
                found: format!("{found} where a field was expected"),
            })),
        }
    }
}

// ---------------------------------------------------------------------------
// Folding clauses into a contract
// ---------------------------------------------------------------------------

struct FunInfo {
    dialect: Dialect,
    name: String,
    effect_kind: Option<EffectKind>,
    return_type: String,
}

impl FunInfo {
    fn parse(clause: &ShapedClause) -> Result<FunInfo, ParseError> {
        clause.expect_no_tail()?;
        match clause.fields.len() {
            2 => Ok(FunInfo {
                dialect: Dialect::Untagged,
                name: clause.ident_at(0, "function name")?.to_string(),
                effect_kind: None,
                return_type: clause.str_at(1, "quoted return type")?.to_string(),
            }),
            3 => Ok(FunInfo {
                dialect: Dialect::EffectTagged,
                name: clause.ident_at(0, "function name")?.to_string(),
                effect_kind: Some(parse_effect_kind(
                    clause,
                    clause.ident_at(1, "effect kind")?,
                )?),
                return_type: clause.str_at(2, "quoted return type")?.to_string(),
            }),
            found => Err(clause.error(ParseErrorKind::FieldCount {
                expected: "2 or 3",
                found,
            })),
        }
    }
}

fn parse_effect_kind(clause: &ShapedClause, name: &str) -> Result<EffectKind, ParseError> {
    name.parse().map_err(|_| {
        clause.error(ParseErrorKind::UnknownEffectKind {
            name: name.to_string(),
        })
    })
}

/// A parameter reference to validate once all `@param-info` clauses are in.
struct Reference {
    line: usize,
    tag: String,
    name: String,
}

struct ContractBuilder {
    dialect: Dialect,
    parameters: Vec<Parameter>,
    input_properties: Vec<PropertyClause>,
    output_properties: Vec<PropertyClause>,
    recovery_specs: Vec<RecoverySpec>,
    equality_op: Option<String>,
    references: Vec<Reference>,
}

impl ContractBuilder {
    fn new(dialect: Dialect) -> Self {
        ContractBuilder {
            dialect,
            parameters: Vec::new(),
            input_properties: Vec::new(),
            output_properties: Vec::new(),
            recovery_specs: Vec::new(),
            equality_op: None,
            references: Vec::new(),
        }
    }

    fn reference(&mut self, clause: &ShapedClause, name: &str) {
        self.references.push(Reference {
            line: clause.line,
            tag: clause.tag.clone(),
            name: name.to_string(),
        });
    }

    fn apply(&mut self, clause: &ShapedClause) -> Result<(), ParseError> {
        match clause.tag.as_str() {
            "fun-info" => {}
            "param-info" => {
                clause.expect_no_tail()?;
                clause.expect_fields("2", 2)?;
                let name = clause.ident_at(0, "parameter name")?;
                let declared_type = clause.str_at(1, "quoted parameter type")?;
                if self.parameters.iter().any(|p| p.name == name) {
                    return Err(clause.error(ParseErrorKind::DuplicateParameter {
                        name: name.to_string(),
                    }));
                }
                self.parameters.push(Parameter {
                    name: name.to_string(),
                    declared_type: declared_type.to_string(),
                });
            }
            "input-prop" => {
                let property = self.property(clause)?;
                self.input_properties.push(property);
            }
            "output-prop" => {
                let property = self.property(clause)?;
                self.output_properties.push(property);
            }
            "state-recover" => {
                clause.expect_no_tail()?;
                clause.expect_fields("3", 3)?;
                let name = clause.ident_at(0, "parameter name")?;
                let size = clause.str_at(1, "quoted element size expression")?;
                let element_count = match &clause.fields[2] {
                    Field::Int(digits) => match digits.parse::<usize>() {
                        Ok(n) if n >= 1 => n,
                        _ => {
                            return Err(clause.error(ParseErrorKind::InvalidCount {
                                value: digits.clone(),
                            }))
                        }
                    },
                    _ => {
                        return Err(clause.error(ParseErrorKind::InvalidField {
                            expected: "integer element count",
                        }))
                    }
                };
                self.reference(clause, name);
                self.recovery_specs.push(RecoverySpec {
                    parameter_name: name.to_string(),
                    element_size_expr: size.to_string(),
                    element_count,
                });
            }
            "equality-op" => {
                clause.expect_no_tail()?;
                clause.expect_fields("1", 1)?;
                let op = clause.ident_at(0, "strategy name")?;
                if self.equality_op.is_some() {
                    return Err(clause.error(ParseErrorKind::DuplicateClause));
                }
                self.equality_op = Some(op.to_string());
            }
            // Unknown tags never leave `collect_clauses`.
            _ => {}
        }
        Ok(())
    }

    fn property(&mut self, clause: &ShapedClause) -> Result<PropertyClause, ParseError> {
        let property = match self.dialect {
            Dialect::Untagged => {
                if clause.tail.is_some()
                    && matches!(clause.fields.as_slice(), [Field::Ident(_)])
                {
                    return Err(clause.error(ParseErrorKind::DialectMismatch {
                        dialect: Dialect::Untagged.name(),
                    }));
                }
                clause.expect_no_tail()?;
                clause.expect_fields("1", 1)?;
                match &clause.fields[0] {
                    Field::Call(call) => PropertyClause {
                        applies_to_effect_kind: None,
                        predicate_name: call.name.clone(),
                        argument: call.arg.clone(),
                    },
                    _ => {
                        return Err(clause.error(ParseErrorKind::InvalidField {
                            expected: "predicate call such as negate(in)",
                        }))
                    }
                }
            }
            Dialect::EffectTagged => {
                if clause.tail.is_none()
                    && matches!(clause.fields.as_slice(), [Field::Call(_)])
                {
                    return Err(clause.error(ParseErrorKind::DialectMismatch {
                        dialect: Dialect::EffectTagged.name(),
                    }));
                }
                clause.expect_fields("1", 1)?;
                let kind = parse_effect_kind(clause, clause.ident_at(0, "effect kind")?)?;
                let call = clause.tail.as_ref().ok_or_else(|| {
                    clause.error(ParseErrorKind::InvalidField {
                        expected: "predicate call after the effect-kind group",
                    })
                })?;
                PropertyClause {
                    applies_to_effect_kind: Some(kind),
                    predicate_name: call.name.clone(),
                    argument: call.arg.clone(),
                }
            }
        };
        self.reference(clause, &property.argument);
        Ok(property)
    }

    fn finish(self, header: FunInfo) -> Result<Contract, ParseError> {
        for reference in &self.references {
            if !self.parameters.iter().any(|p| p.name == reference.name) {
                return Err(ParseError::new(
                    reference.line,
                    Some(reference.tag.as_str()),
                    ParseErrorKind::UnknownParameter {
                        name: reference.name.clone(),
                    },
                ));
            }
        }

        let has_properties =
            !self.input_properties.is_empty() || !self.output_properties.is_empty();
        let effect_kind = match header.effect_kind {
            Some(kind) => kind,
            None if has_properties => EffectKind::SideEffect,
            None => EffectKind::Pure,
        };

        let normalize = |mut clause: PropertyClause| {
            if clause.applies_to_effect_kind == Some(effect_kind) {
                clause.applies_to_effect_kind = None;
            }
            clause
        };

        Ok(Contract {
            function_name: header.name,
            effect_kind,
            return_type: header.return_type,
            parameters: self.parameters,
            input_properties: self.input_properties.into_iter().map(normalize).collect(),
            output_properties: self.output_properties.into_iter().map(normalize).collect(),
            recovery_specs: self.recovery_specs,
            equality_op: self
                .equality_op
                .unwrap_or_else(|| DEFAULT_EQUALITY_OP.to_string()),
        })
    }
}
