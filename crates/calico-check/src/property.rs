//! Property evaluation against before/after snapshots.
//!
//! Predicates live in an open [`PredicateRegistry`] keyed by the name used in
//! `@input-prop` / `@output-prop` clauses. A predicate is either unary (looks
//! at the anchored tick only) or relational (compares the anchored tick with
//! the complementary one). Input clauses are anchored on the before tick,
//! output clauses on the after tick.

use std::fmt;
use std::sync::Arc;

use calico_core::contract::{Contract, PropertyClause};
use calico_core::types::ScalarType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::snapshot::SnapshotSet;
use crate::value::{decode_elements, DecodeError, Value};

/// Outcome of evaluating one clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyResult {
    Satisfied,
    Violated,
    /// The clause is scoped to a different effect kind.
    Skipped,
    /// No predicate with this name is registered.
    PredicateUnknown(String),
}

/// Which clause list a property comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Input,
    Output,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Input => f.write_str("input"),
            Phase::Output => f.write_str("output"),
        }
    }
}

pub type UnaryFn = dyn Fn(&[Value]) -> bool + Send + Sync;
pub type RelationalFn = dyn Fn(&[Value], &[Value]) -> bool + Send + Sync;

/// A registered predicate.
#[derive(Clone)]
pub enum Predicate {
    Unary(Arc<UnaryFn>),
    /// Called as `f(primary, complementary)`.
    Relational(Arc<RelationalFn>),
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Unary(_) => f.write_str("Predicate::Unary"),
            Predicate::Relational(_) => f.write_str("Predicate::Relational"),
        }
    }
}

/// Name → predicate table.
#[derive(Debug, Clone)]
pub struct PredicateRegistry {
    predicates: IndexMap<String, Predicate>,
}

impl Default for PredicateRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl PredicateRegistry {
    /// A registry with no predicates at all.
    pub fn empty() -> Self {
        PredicateRegistry {
            predicates: IndexMap::new(),
        }
    }

    /// A registry preloaded with the built-in predicates.
    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        reg.register_relational("negate", |p, c| {
            elementwise(p, c, |a, b| *a == b.negated())
        });
        reg.register_relational("unchanged", |p, c| elementwise(p, c, |a, b| a == b));
        reg.register_relational("preserve_sign", |p, c| {
            elementwise(p, c, |a, b| a.signum() == b.signum())
        });
        reg.register_relational("flip_sign", |p, c| {
            elementwise(p, c, |a, b| a.signum() == -b.signum())
        });
        reg.register_unary("nonzero", |p| p.iter().all(|v| !v.is_zero()));
        reg.register_unary("non_negative", |p| p.iter().all(|v| v.signum() >= 0));
        reg.register_unary("positive", |p| p.iter().all(|v| v.signum() > 0));
        reg
    }

    /// Adds or replaces a predicate.
    pub fn register(&mut self, name: impl Into<String>, predicate: Predicate) {
        self.predicates.insert(name.into(), predicate);
    }

    pub fn register_unary<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> bool + Send + Sync + 'static,
    {
        self.register(name, Predicate::Unary(Arc::new(f)));
    }

    pub fn register_relational<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value], &[Value]) -> bool + Send + Sync + 'static,
    {
        self.register(name, Predicate::Relational(Arc::new(f)));
    }

    pub fn get(&self, name: &str) -> Option<&Predicate> {
        self.predicates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.predicates.keys().map(String::as_str)
    }
}

fn elementwise(p: &[Value], c: &[Value], f: impl Fn(&Value, &Value) -> bool) -> bool {
    p.len() == c.len() && p.iter().zip(c).all(|(a, b)| f(a, b))
}

/// A clause could not be evaluated at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("parameter '{parameter}' of type '{declared_type}' has no numeric element type")]
    NonNumericType {
        parameter: String,
        declared_type: String,
    },

    #[error("no {tick} snapshot for parameter '{parameter}'")]
    MissingSnapshot {
        parameter: String,
        tick: &'static str,
    },

    #[error("cannot decode snapshot of '{parameter}': {source}")]
    Decode {
        parameter: String,
        #[source]
        source: DecodeError,
    },
}

/// Evaluates `clause` of `contract`.
///
/// Returns `Ok(None)` when the clause needs the after tick and `after` is not
/// available yet; the caller evaluates it again once it is. Scoped-out
/// clauses and unknown predicates resolve immediately.
pub fn evaluate(
    registry: &PredicateRegistry,
    contract: &Contract,
    clause: &PropertyClause,
    phase: Phase,
    before: &SnapshotSet,
    after: Option<&SnapshotSet>,
) -> Result<Option<PropertyResult>, EvalError> {
    if !clause.applies_to(contract.effect_kind) {
        return Ok(Some(PropertyResult::Skipped));
    }
    let Some(predicate) = registry.get(&clause.predicate_name) else {
        return Ok(Some(PropertyResult::PredicateUnknown(
            clause.predicate_name.clone(),
        )));
    };

    let element_type = element_type_of(contract, &clause.argument)?;
    let (anchored, complementary) = match phase {
        Phase::Input => (Some(before), after),
        Phase::Output => (after, Some(before)),
    };

    let holds = match predicate {
        Predicate::Unary(f) => {
            let Some(anchored) = anchored else {
                return Ok(None);
            };
            let primary = decode(anchored, &clause.argument, element_type, phase_tick(phase))?;
            f(&primary)
        }
        Predicate::Relational(f) => {
            let (Some(anchored), Some(complementary)) = (anchored, complementary) else {
                return Ok(None);
            };
            let primary = decode(anchored, &clause.argument, element_type, phase_tick(phase))?;
            let other = decode(
                complementary,
                &clause.argument,
                element_type,
                phase_tick(opposite(phase)),
            )?;
            f(&primary, &other)
        }
    };

    Ok(Some(if holds {
        PropertyResult::Satisfied
    } else {
        PropertyResult::Violated
    }))
}

fn element_type_of(contract: &Contract, parameter: &str) -> Result<ScalarType, EvalError> {
    let param = contract.parameter(parameter);
    param
        .and_then(|p| p.c_type())
        .and_then(|t| t.element_type())
        .ok_or_else(|| EvalError::NonNumericType {
            parameter: parameter.to_string(),
            declared_type: param.map(|p| p.declared_type.clone()).unwrap_or_default(),
        })
}

fn phase_tick(phase: Phase) -> &'static str {
    match phase {
        Phase::Input => "before",
        Phase::Output => "after",
    }
}

fn opposite(phase: Phase) -> Phase {
    match phase {
        Phase::Input => Phase::Output,
        Phase::Output => Phase::Input,
    }
}

fn decode(
    set: &SnapshotSet,
    parameter: &str,
    ty: ScalarType,
    tick: &'static str,
) -> Result<Vec<Value>, EvalError> {
    let snapshot = set.get(parameter).ok_or_else(|| EvalError::MissingSnapshot {
        parameter: parameter.to_string(),
        tick,
    })?;
    decode_elements(snapshot.bytes(), ty).map_err(|source| EvalError::Decode {
        parameter: parameter.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{capture, Tick};
    use crate::value::encode_elements;
    use calico_core::contract::{EffectKind, Parameter, RecoverySpec, DEFAULT_EQUALITY_OP};
    use calico_core::types::PrimitiveSizes;
    use proptest::prelude::*;

    fn contract(declared_type: &str, effect_kind: EffectKind) -> Contract {
        Contract {
            function_name: "f".into(),
            effect_kind,
            return_type: "void".into(),
            parameters: vec![Parameter {
                name: "in".into(),
                declared_type: declared_type.into(),
            }],
            input_properties: vec![],
            output_properties: vec![],
            recovery_specs: vec![RecoverySpec {
                parameter_name: "in".into(),
                element_size_expr: "sizeof(int)".into(),
                element_count: 1,
            }],
            equality_op: DEFAULT_EQUALITY_OP.into(),
        }
    }

    fn clause(name: &str) -> PropertyClause {
        PropertyClause {
            applies_to_effect_kind: None,
            predicate_name: name.into(),
            argument: "in".into(),
        }
    }

    fn set(values: &[i32], tick: Tick) -> SnapshotSet {
        let c = contract("int*", EffectKind::SideEffect);
        let bytes = encode_elements(&values.iter().map(|v| Value::I32(*v)).collect::<Vec<_>>());
        let mut spec = c.recovery_specs[0].clone();
        spec.element_count = values.len();
        let mut set = SnapshotSet::new();
        set.insert(capture(&spec, &bytes, tick, &PrimitiveSizes::new()).unwrap());
        set
    }

    fn eval(
        name: &str,
        phase: Phase,
        before: &[i32],
        after: Option<&[i32]>,
    ) -> Option<PropertyResult> {
        let c = contract("int*", EffectKind::SideEffect);
        let before = set(before, Tick::Before);
        let after = after.map(|a| set(a, Tick::After));
        evaluate(
            &PredicateRegistry::default(),
            &c,
            &clause(name),
            phase,
            &before,
            after.as_ref(),
        )
        .unwrap()
    }

    #[test]
    fn negate_compares_before_with_after() {
        assert_eq!(
            eval("negate", Phase::Input, &[5], Some(&[-5])),
            Some(PropertyResult::Satisfied)
        );
        assert_eq!(
            eval("negate", Phase::Input, &[5], Some(&[5])),
            Some(PropertyResult::Violated)
        );
        assert_eq!(
            eval("negate", Phase::Input, &[5], Some(&[10])),
            Some(PropertyResult::Violated)
        );
    }

    #[test]
    fn relational_input_clause_is_deferred_without_after() {
        assert_eq!(eval("negate", Phase::Input, &[5], None), None);
    }

    #[test]
    fn unary_input_clause_runs_before_invocation() {
        assert_eq!(
            eval("nonzero", Phase::Input, &[5], None),
            Some(PropertyResult::Satisfied)
        );
        assert_eq!(
            eval("nonzero", Phase::Input, &[3, 0], None),
            Some(PropertyResult::Violated)
        );
    }

    #[test]
    fn unary_output_clause_reads_after() {
        assert_eq!(
            eval("positive", Phase::Output, &[-1], Some(&[1])),
            Some(PropertyResult::Satisfied)
        );
        assert_eq!(
            eval("non_negative", Phase::Output, &[1], Some(&[-1])),
            Some(PropertyResult::Violated)
        );
        assert_eq!(eval("positive", Phase::Output, &[1], None), None);
    }

    #[test]
    fn sign_predicates() {
        assert_eq!(
            eval("preserve_sign", Phase::Output, &[3, -2, 0], Some(&[6, -4, 0])),
            Some(PropertyResult::Satisfied)
        );
        assert_eq!(
            eval("preserve_sign", Phase::Output, &[3], Some(&[-6])),
            Some(PropertyResult::Violated)
        );
        assert_eq!(
            eval("flip_sign", Phase::Output, &[3, -2], Some(&[-6, 4])),
            Some(PropertyResult::Satisfied)
        );
        assert_eq!(
            eval("unchanged", Phase::Output, &[1, 2], Some(&[1, 2])),
            Some(PropertyResult::Satisfied)
        );
    }

    #[test]
    fn unknown_predicate_is_reported_not_judged() {
        assert_eq!(
            eval("is_prime", Phase::Input, &[7], Some(&[7])),
            Some(PropertyResult::PredicateUnknown("is_prime".into()))
        );
    }

    #[test]
    fn scoped_clause_is_skipped_for_other_kind() {
        let c = contract("int*", EffectKind::SideEffect);
        let mut scoped = clause("negate");
        scoped.applies_to_effect_kind = Some(EffectKind::Pure);
        let result = evaluate(
            &PredicateRegistry::default(),
            &c,
            &scoped,
            Phase::Input,
            &set(&[1], Tick::Before),
            None,
        )
        .unwrap();
        assert_eq!(result, Some(PropertyResult::Skipped));
    }

    #[test]
    fn non_numeric_parameter_is_an_error() {
        let c = contract("void*", EffectKind::SideEffect);
        let err = evaluate(
            &PredicateRegistry::default(),
            &c,
            &clause("nonzero"),
            Phase::Input,
            &set(&[1], Tick::Before),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::NonNumericType { .. }));
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        let c = contract("int*", EffectKind::SideEffect);
        let err = evaluate(
            &PredicateRegistry::default(),
            &c,
            &clause("nonzero"),
            Phase::Input,
            &SnapshotSet::new(),
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            EvalError::MissingSnapshot {
                parameter: "in".into(),
                tick: "before"
            }
        );
    }

    #[test]
    fn custom_predicates_register_without_other_changes() {
        let mut reg = PredicateRegistry::empty();
        assert!(!reg.contains("even"));
        reg.register_unary("even", |p| p.iter().all(|v| v.as_i64().is_some_and(|i| i % 2 == 0)));
        let c = contract("int*", EffectKind::SideEffect);
        let result = evaluate(&reg, &c, &clause("even"), Phase::Input, &set(&[4], Tick::Before), None)
            .unwrap();
        assert_eq!(result, Some(PropertyResult::Satisfied));
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["even"]);
    }

    #[test]
    fn builtins_are_listed() {
        let registry = PredicateRegistry::default();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(
            names,
            vec![
                "negate",
                "unchanged",
                "preserve_sign",
                "flip_sign",
                "nonzero",
                "non_negative",
                "positive"
            ]
        );
    }

    proptest! {
        #[test]
        fn negate_holds_for_negated_values(xs in proptest::collection::vec(any::<i32>(), 1..8)) {
            let negated: Vec<i32> = xs.iter().map(|x| x.wrapping_neg()).collect();
            prop_assert_eq!(
                eval("negate", Phase::Input, &xs, Some(&negated)),
                Some(PropertyResult::Satisfied)
            );
        }

        #[test]
        fn unchanged_is_reflexive(xs in proptest::collection::vec(any::<i32>(), 1..8)) {
            prop_assert_eq!(
                eval("unchanged", Phase::Output, &xs, Some(&xs)),
                Some(PropertyResult::Satisfied)
            );
        }
    }
}
