//! The typed contract model produced by the annotation parser.
//!
//! A [`Contract`] is built once per annotation block and never mutated
//! afterwards. All downstream components (snapshotting, property evaluation,
//! equality comparison) read it without caring which annotation dialect it
//! was written in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::CType;

/// Comparison strategy used when a block has no `@equality-op` clause.
pub const DEFAULT_EQUALITY_OP: &str = "memcmp";

/// Whether a function mutates state reachable from its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectKind {
    Pure,
    SideEffect,
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectKind::Pure => f.write_str("Pure"),
            EffectKind::SideEffect => f.write_str("SideEffect"),
        }
    }
}

impl FromStr for EffectKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pure" => Ok(EffectKind::Pure),
            "SideEffect" => Ok(EffectKind::SideEffect),
            _ => Err(()),
        }
    }
}

/// A declared function parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// C type string as written, e.g. `"int*"`.
    pub declared_type: String,
}

impl Parameter {
    /// The parsed form of [`declared_type`](Self::declared_type), if it is a
    /// type calico understands.
    pub fn c_type(&self) -> Option<CType> {
        CType::parse(&self.declared_type)
    }
}

/// One `@input-prop` / `@output-prop` clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyClause {
    /// Effect kind this clause is restricted to. `None` applies always.
    pub applies_to_effect_kind: Option<EffectKind>,
    pub predicate_name: String,
    /// Parameter the predicate is evaluated against.
    pub argument: String,
}

impl PropertyClause {
    /// Whether the clause should be evaluated for a contract of `kind`.
    pub fn applies_to(&self, kind: EffectKind) -> bool {
        self.applies_to_effect_kind.map_or(true, |k| k == kind)
    }
}

impl fmt::Display for PropertyClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(kind) = self.applies_to_effect_kind {
            write!(f, "{{ {kind} }} ")?;
        }
        write!(f, "{}({})", self.predicate_name, self.argument)
    }
}

/// How to snapshot and restore one parameter's storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySpec {
    pub parameter_name: String,
    /// Size of one element, resolved by a [`SizeResolver`](crate::types::SizeResolver).
    pub element_size_expr: String,
    /// Number of elements, always at least 1.
    pub element_count: usize,
}

/// The parsed contract of one annotated function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub function_name: String,
    pub effect_kind: EffectKind,
    pub return_type: String,
    pub parameters: Vec<Parameter>,
    pub input_properties: Vec<PropertyClause>,
    pub output_properties: Vec<PropertyClause>,
    pub recovery_specs: Vec<RecoverySpec>,
    pub equality_op: String,
}

impl Contract {
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Position of a parameter in the declared argument list.
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }

    pub fn recovery_spec(&self, name: &str) -> Option<&RecoverySpec> {
        self.recovery_specs.iter().find(|r| r.parameter_name == name)
    }

    /// Input and output clauses, input first.
    pub fn all_properties(&self) -> impl Iterator<Item = &PropertyClause> {
        self.input_properties
            .iter()
            .chain(self.output_properties.iter())
    }
}
