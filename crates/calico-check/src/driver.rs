//! Mutation test driver state machine.
//!
//! A [`MutationDriver`] runs one candidate cycle at a time for a single
//! contract. The state transitions of a cycle are:
//! `Parsed -> Snapshotting(Before) -> Invoking -> Snapshotting(After) ->
//! Evaluating -> Reporting -> Done`, with `Failed` reachable from anywhere.
//!
//! [`evaluate_candidates`] drives the baseline and every mutant over a list
//! of inputs and judges each mutant against the baseline.

use std::fmt;
use std::sync::Arc;

use calico_core::contract::{Contract, PropertyClause};
use calico_core::types::{PrimitiveSizes, SizeResolver};
use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::candidate::{Arguments, Candidate, CandidateId, InvokeError};
use crate::equality::{EqualityRegistry, EqualityVerdict};
use crate::property::{evaluate, EvalError, Phase, PredicateRegistry, PropertyResult};
use crate::report::{CandidateReport, PropertyRef, Verdict};
use crate::snapshot::{capture, restore, SnapshotError, SnapshotSet, Tick};
use crate::value::Value;

/// Registries and resolver shared by every cycle.
#[derive(Clone)]
pub struct CheckContext {
    pub resolver: Arc<dyn SizeResolver>,
    pub predicates: PredicateRegistry,
    pub equality: EqualityRegistry,
}

impl Default for CheckContext {
    fn default() -> Self {
        CheckContext {
            resolver: Arc::new(PrimitiveSizes::new()),
            predicates: PredicateRegistry::default(),
            equality: EqualityRegistry::default(),
        }
    }
}

impl fmt::Debug for CheckContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckContext")
            .field("predicates", &self.predicates)
            .field("equality", &self.equality)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverState {
    Parsed,
    Snapshotting(Tick),
    Invoking,
    Evaluating,
    Reporting,
    Done,
    Failed(String),
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverState::Parsed => f.write_str("parsed"),
            DriverState::Snapshotting(tick) => write!(f, "snapshotting({tick})"),
            DriverState::Invoking => f.write_str("invoking"),
            DriverState::Evaluating => f.write_str("evaluating"),
            DriverState::Reporting => f.write_str("reporting"),
            DriverState::Done => f.write_str("done"),
            DriverState::Failed(reason) => write!(f, "failed({reason})"),
        }
    }
}

/// A cycle could not produce property results.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CycleError {
    #[error("expected {expected} arguments, got {found}")]
    ArityMismatch { expected: usize, found: usize },

    #[error("no region supplied for parameter '{parameter}'")]
    MissingRegion { parameter: String },

    #[error("snapshot failed: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("restore failed: {0}")]
    Restore(SnapshotError),

    #[error("property evaluation failed: {0}")]
    Eval(#[from] EvalError),

    #[error("invocation failed: {0}")]
    Invoke(#[from] InvokeError),

    /// An earlier cycle on the same input left the live state unrecoverable.
    #[error("aborted: {reason}")]
    Aborted { reason: String },
}

/// The result of one clause in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyOutcome {
    pub property: PropertyRef,
    pub result: PropertyResult,
}

/// Everything a completed cycle observed.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub candidate_id: CandidateId,
    /// Input clauses first, then output clauses, each in declaration order.
    pub properties: Vec<PropertyOutcome>,
    pub before: SnapshotSet,
    pub after: SnapshotSet,
    pub return_value: Value,
}

impl CycleOutcome {
    pub fn violated(&self) -> impl Iterator<Item = &PropertyRef> {
        self.properties
            .iter()
            .filter(|p| p.result == PropertyResult::Violated)
            .map(|p| &p.property)
    }

    pub fn unknown_predicates(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().filter_map(|p| match &p.result {
            PropertyResult::PredicateUnknown(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

/// Runs candidate cycles for one contract.
pub struct MutationDriver<'a> {
    contract: &'a Contract,
    ctx: &'a CheckContext,
    state: DriverState,
    history: Vec<DriverState>,
}

impl<'a> MutationDriver<'a> {
    pub fn new(contract: &'a Contract, ctx: &'a CheckContext) -> Self {
        MutationDriver {
            contract,
            ctx,
            state: DriverState::Parsed,
            history: vec![DriverState::Parsed],
        }
    }

    pub fn state(&self) -> &DriverState {
        &self.state
    }

    /// Every state entered so far, across cycles.
    pub fn history(&self) -> &[DriverState] {
        &self.history
    }

    pub fn contract(&self) -> &Contract {
        self.contract
    }

    fn transition(&mut self, next: DriverState) {
        trace!(
            contract = %self.contract.function_name,
            from = %self.state,
            to = %next,
            "driver transition"
        );
        self.state = next.clone();
        self.history.push(next);
    }

    /// Runs `candidate` once against the live state in `args`.
    ///
    /// On return, every recovered region of `args` holds its before-state
    /// again, unless the error is [`CycleError::Restore`].
    pub fn run_cycle(
        &mut self,
        candidate: &dyn Candidate,
        args: &mut Arguments,
    ) -> Result<CycleOutcome, CycleError> {
        if self.state != DriverState::Parsed {
            self.transition(DriverState::Parsed);
        }
        match self.cycle(candidate, args) {
            Ok(outcome) => {
                self.transition(DriverState::Reporting);
                debug!(
                    contract = %self.contract.function_name,
                    candidate = %outcome.candidate_id,
                    violated = outcome.violated().count(),
                    "cycle complete"
                );
                self.transition(DriverState::Done);
                Ok(outcome)
            }
            Err(err) => {
                debug!(
                    contract = %self.contract.function_name,
                    candidate = %candidate.id(),
                    error = %err,
                    "cycle failed"
                );
                self.transition(DriverState::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    fn cycle(
        &mut self,
        candidate: &dyn Candidate,
        args: &mut Arguments,
    ) -> Result<CycleOutcome, CycleError> {
        let expected = self.contract.parameters.len();
        if args.len() != expected {
            return Err(CycleError::ArityMismatch {
                expected,
                found: args.len(),
            });
        }

        self.transition(DriverState::Snapshotting(Tick::Before));
        let before = self.capture_all(args, Tick::Before)?;

        let result = self.invoke_and_evaluate(candidate, args, &before);
        self.restore_all(&before, args)?;
        result
    }

    fn invoke_and_evaluate(
        &mut self,
        candidate: &dyn Candidate,
        args: &mut Arguments,
        before: &SnapshotSet,
    ) -> Result<CycleOutcome, CycleError> {
        let contract: &'a Contract = self.contract;
        let ctx: &'a CheckContext = self.ctx;
        let predicates = &ctx.predicates;

        // Unary input clauses are decided on the before tick alone.
        let mut inputs = Vec::with_capacity(contract.input_properties.len());
        for clause in &contract.input_properties {
            inputs.push(evaluate(predicates, contract, clause, Phase::Input, before, None)?);
        }

        self.transition(DriverState::Invoking);
        let return_value = candidate.invoke(args)?;

        self.transition(DriverState::Snapshotting(Tick::After));
        let after = self.capture_all(args, Tick::After)?;

        self.transition(DriverState::Evaluating);
        let mut properties = Vec::new();
        for (clause, early) in contract.input_properties.iter().zip(inputs) {
            let result = match early {
                Some(result) => result,
                None => decided(evaluate(
                    predicates,
                    contract,
                    clause,
                    Phase::Input,
                    before,
                    Some(&after),
                )?),
            };
            properties.push(outcome(Phase::Input, clause, result));
        }
        for clause in &contract.output_properties {
            let result = decided(evaluate(
                predicates,
                contract,
                clause,
                Phase::Output,
                before,
                Some(&after),
            )?);
            properties.push(outcome(Phase::Output, clause, result));
        }

        Ok(CycleOutcome {
            candidate_id: candidate.id().clone(),
            properties,
            before: before.clone(),
            after,
            return_value,
        })
    }

    fn capture_all(&self, args: &Arguments, tick: Tick) -> Result<SnapshotSet, CycleError> {
        let mut set = SnapshotSet::new();
        for spec in &self.contract.recovery_specs {
            let region = args
                .region(&spec.parameter_name)
                .ok_or_else(|| CycleError::MissingRegion {
                    parameter: spec.parameter_name.clone(),
                })?;
            set.insert(capture(spec, region, tick, self.ctx.resolver.as_ref())?);
        }
        Ok(set)
    }

    fn restore_all(&self, before: &SnapshotSet, args: &mut Arguments) -> Result<(), CycleError> {
        for spec in &self.contract.recovery_specs {
            let (Some(snapshot), Some(region)) = (
                before.get(&spec.parameter_name),
                args.region_mut(&spec.parameter_name),
            ) else {
                return Err(CycleError::MissingRegion {
                    parameter: spec.parameter_name.clone(),
                });
            };
            restore(snapshot, spec, region, self.ctx.resolver.as_ref())
                .map_err(CycleError::Restore)?;
        }
        Ok(())
    }
}

// With both ticks present `evaluate` always decides.
fn decided(result: Option<PropertyResult>) -> PropertyResult {
    result.unwrap_or(PropertyResult::Skipped)
}

fn outcome(
    phase: Phase,
    clause: &PropertyClause,
    result: PropertyResult,
) -> PropertyOutcome {
    PropertyOutcome {
        property: PropertyRef {
            phase,
            predicate: clause.predicate_name.clone(),
            argument: clause.argument.clone(),
        },
        result,
    }
}

// ---------------------------------------------------------------------------
// Judging
// ---------------------------------------------------------------------------

/// Verdict of one mutant on one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgement {
    pub verdict: Verdict,
    /// Properties the mutant violated that the baseline satisfied.
    pub violated: Vec<PropertyRef>,
    pub unknown_predicates: Vec<String>,
    pub equality: Option<EqualityVerdict>,
    pub error: Option<String>,
}

/// Judges a mutant cycle against the baseline cycle on the same input.
pub fn judge(
    baseline: &Result<CycleOutcome, CycleError>,
    mutant: &Result<CycleOutcome, CycleError>,
    equality: &EqualityRegistry,
    equality_op: &str,
) -> Judgement {
    let (base, mutated) = match (baseline, mutant) {
        (Ok(b), Ok(m)) => (b, m),
        (Err(err), _) => return inconclusive(format!("baseline: {err}")),
        (_, Err(err)) => return inconclusive(err.to_string()),
    };

    let violated: Vec<PropertyRef> = base
        .properties
        .iter()
        .zip(&mutated.properties)
        .filter(|(b, m)| {
            b.result == PropertyResult::Satisfied && m.result == PropertyResult::Violated
        })
        .map(|(_, m)| m.property.clone())
        .collect();

    let mut unknown_predicates: Vec<String> = Vec::new();
    for name in base.unknown_predicates().chain(mutated.unknown_predicates()) {
        if !unknown_predicates.iter().any(|n| n == name) {
            unknown_predicates.push(name.to_string());
        }
    }

    let eq = equality.compare_all(equality_op, &base.after, &mutated.after);

    let verdict = if !violated.is_empty() || eq == EqualityVerdict::Unequal {
        Verdict::Killed
    } else if !unknown_predicates.is_empty() || matches!(eq, EqualityVerdict::UnknownStrategy(_)) {
        Verdict::Inconclusive
    } else {
        Verdict::Survived
    };

    Judgement {
        verdict,
        violated,
        unknown_predicates,
        equality: Some(eq),
        error: None,
    }
}

fn inconclusive(error: String) -> Judgement {
    Judgement {
        verdict: Verdict::Inconclusive,
        violated: Vec::new(),
        unknown_predicates: Vec::new(),
        equality: None,
        error: Some(error),
    }
}

// ---------------------------------------------------------------------------
// Multi-input evaluation
// ---------------------------------------------------------------------------

/// Inputs a contract is checked against.
///
/// Seeds run first, then `iterations` inputs generated from `random_seed`.
/// Same configuration, same inputs, same verdicts.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub seeds: Vec<Arguments>,
    pub iterations: u32,
    pub random_seed: u64,
    /// Scalar parameters pinned to one value in every input.
    pub fixed_scalars: IndexMap<String, Value>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            seeds: Vec::new(),
            iterations: 32,
            random_seed: 0,
            fixed_scalars: IndexMap::new(),
        }
    }
}

#[derive(Default)]
struct MutantTally {
    inputs_run: usize,
    killed: Option<(usize, Judgement)>,
    inconclusive: Option<Judgement>,
    last: Option<Judgement>,
}

/// Runs the baseline and every mutant over `inputs`, sharing one live state
/// per input, and returns the baseline report followed by one report per
/// mutant.
///
/// A mutant stops running once an input kills it.
pub fn evaluate_candidates(
    contract: &Contract,
    ctx: &CheckContext,
    baseline: &dyn Candidate,
    mutants: &[Arc<dyn Candidate>],
    inputs: &[Arguments],
) -> Vec<CandidateReport> {
    let mut driver = MutationDriver::new(contract, ctx);
    let mut tallies: Vec<MutantTally> = mutants.iter().map(|_| MutantTally::default()).collect();

    let mut base_violated: Vec<PropertyRef> = Vec::new();
    let mut base_unknown: Vec<String> = Vec::new();
    let mut base_error: Option<String> = None;

    for (index, input) in inputs.iter().enumerate() {
        let mut live = input.clone();
        let base = driver.run_cycle(baseline, &mut live);
        let mut poisoned = match &base {
            Err(err @ CycleError::Restore(_)) => Some(err.to_string()),
            _ => None,
        };

        match &base {
            Ok(outcome) => {
                for prop in outcome.violated() {
                    if !base_violated.contains(prop) {
                        base_violated.push(prop.clone());
                    }
                }
                for name in outcome.unknown_predicates() {
                    if !base_unknown.iter().any(|n| n == name) {
                        base_unknown.push(name.to_string());
                    }
                }
            }
            Err(err) => {
                base_error.get_or_insert_with(|| format!("input {index}: {err}"));
            }
        }

        for (mutant, tally) in mutants.iter().zip(tallies.iter_mut()) {
            if tally.killed.is_some() {
                continue;
            }
            let result = match &poisoned {
                Some(reason) => Err(CycleError::Aborted {
                    reason: reason.clone(),
                }),
                None => driver.run_cycle(mutant.as_ref(), &mut live),
            };
            if let Err(err @ CycleError::Restore(_)) = &result {
                poisoned = Some(err.to_string());
            }

            let judgement = judge(&base, &result, &ctx.equality, &contract.equality_op);
            tally.inputs_run += 1;
            match judgement.verdict {
                Verdict::Killed => tally.killed = Some((index, judgement)),
                Verdict::Inconclusive => {
                    tally.inconclusive.get_or_insert(judgement.clone());
                    tally.last = Some(judgement);
                }
                _ => tally.last = Some(judgement),
            }
        }
    }

    let mut reports = Vec::with_capacity(mutants.len() + 1);
    reports.push(CandidateReport {
        contract_name: contract.function_name.clone(),
        candidate_id: baseline.id().clone(),
        verdict: Verdict::Baseline,
        violated_properties: base_violated,
        unknown_predicates: base_unknown,
        equality_verdict: None,
        inputs_run: inputs.len(),
        killing_input: None,
        error: base_error,
    });

    for (mutant, tally) in mutants.iter().zip(tallies) {
        let report = mutant_report(contract, mutant.id(), tally);
        debug!(
            contract = %contract.function_name,
            candidate = %report.candidate_id,
            verdict = %report.verdict,
            inputs = report.inputs_run,
            "mutant judged"
        );
        reports.push(report);
    }
    reports
}

fn mutant_report(contract: &Contract, id: &CandidateId, tally: MutantTally) -> CandidateReport {
    let inputs_run = tally.inputs_run;
    let (verdict, judgement, killing_input) = match (tally.killed, tally.inconclusive, tally.last) {
        (Some((index, j)), _, _) => (Verdict::Killed, Some(j), Some(index)),
        (None, Some(j), _) => (Verdict::Inconclusive, Some(j), None),
        (None, None, Some(j)) => (Verdict::Survived, Some(j), None),
        (None, None, None) => (Verdict::Inconclusive, None, None),
    };

    let (violated_properties, unknown_predicates, equality_verdict, error) = match judgement {
        Some(j) => (j.violated, j.unknown_predicates, j.equality, j.error),
        None => (Vec::new(), Vec::new(), None, Some("no inputs to run".to_string())),
    };

    CandidateReport {
        contract_name: contract.function_name.clone(),
        candidate_id: id.clone(),
        verdict,
        violated_properties,
        unknown_predicates,
        equality_verdict,
        inputs_run,
        killing_input,
        error,
    }
}
