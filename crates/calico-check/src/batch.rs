//! Batch evaluation of every contract in a source file.
//!
//! Each annotation block becomes one job: parse, look up a subject, build
//! inputs, evaluate candidates. Jobs are independent, so
//! [`run_parallel`] hands them to blocking workers on the Tokio runtime while
//! [`run_sequential`] runs them in order on the calling thread. Both return
//! exactly one [`ContractOutcome`] per block, in block order.

use std::sync::Arc;

use calico_core::contract::Contract;
use calico_core::error::ParseError;
use calico_core::parser::parse_block;
use calico_core::source::AnnotationBlock;
use calico_core::types::SizeResolver;
use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::candidate::{Arguments, Candidate};
use crate::driver::{evaluate_candidates, CheckContext, DriverConfig};
use crate::inputs::{build_inputs, fixed_scalars_from_json, InputError};
use crate::report::{CandidateReport, ReportSink, Verdict};
use crate::value::Value;

/// A baseline implementation, its mutants and the inputs to try them on.
#[derive(Clone)]
pub struct Subject {
    pub baseline: Arc<dyn Candidate>,
    pub mutants: Vec<Arc<dyn Candidate>>,
    pub seeds: Vec<Arguments>,
    pub fixed_scalars: IndexMap<String, Value>,
}

/// Supplies candidates for parsed contracts.
pub trait SubjectProvider: Send + Sync {
    fn subject_for(&self, contract: &Contract, resolver: &dyn SizeResolver) -> Option<Subject>;
}

/// Settings shared by every job of a batch.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub iterations: u32,
    pub random_seed: u64,
    /// Maximum number of contracts evaluated at once by [`run_parallel`].
    pub jobs: usize,
    /// Per-function scalar overrides, `{ "<param>": <number> }`.
    pub fixtures: IndexMap<String, serde_json::Map<String, serde_json::Value>>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        let driver = DriverConfig::default();
        BatchConfig {
            iterations: driver.iterations,
            random_seed: driver.random_seed,
            jobs: 4,
            fixtures: IndexMap::new(),
        }
    }
}

/// What happened to one annotation block.
#[derive(Debug, Clone)]
pub enum ContractOutcome {
    ParseFailed {
        function_hint: Option<String>,
        error: ParseError,
    },
    NoSubject {
        contract: Contract,
    },
    InputFailed {
        contract: Contract,
        error: InputError,
    },
    Evaluated {
        contract: Contract,
        reports: Vec<CandidateReport>,
    },
    WorkerPanicked {
        function_hint: Option<String>,
        message: String,
    },
}

impl ContractOutcome {
    /// Function name from the contract, or the hint found in the source.
    pub fn function_name(&self) -> Option<&str> {
        match self {
            ContractOutcome::NoSubject { contract }
            | ContractOutcome::InputFailed { contract, .. }
            | ContractOutcome::Evaluated { contract, .. } => Some(&contract.function_name),
            ContractOutcome::ParseFailed { function_hint, .. }
            | ContractOutcome::WorkerPanicked { function_hint, .. } => function_hint.as_deref(),
        }
    }

    pub fn reports(&self) -> &[CandidateReport] {
        match self {
            ContractOutcome::Evaluated { reports, .. } => reports,
            _ => &[],
        }
    }
}

/// Parses and evaluates one block.
pub fn check_block(
    block: &AnnotationBlock,
    ctx: &CheckContext,
    provider: &dyn SubjectProvider,
    config: &BatchConfig,
) -> ContractOutcome {
    let contract = match parse_block(&block.text, block.start_line) {
        Ok(contract) => contract,
        Err(error) => {
            warn!(%error, "skipping contract that failed to parse");
            return ContractOutcome::ParseFailed {
                function_hint: block.function_hint.clone(),
                error,
            };
        }
    };

    let Some(subject) = provider.subject_for(&contract, ctx.resolver.as_ref()) else {
        debug!(function = %contract.function_name, "no subject available");
        return ContractOutcome::NoSubject { contract };
    };

    let mut fixed_scalars = subject.fixed_scalars.clone();
    if let Some(fixture) = config.fixtures.get(&contract.function_name) {
        match fixed_scalars_from_json(&contract, fixture) {
            Ok(overrides) => fixed_scalars.extend(overrides),
            Err(error) => return ContractOutcome::InputFailed { contract, error },
        }
    }

    let driver_config = DriverConfig {
        seeds: subject.seeds.clone(),
        iterations: config.iterations,
        random_seed: config.random_seed,
        fixed_scalars,
    };
    let inputs = match build_inputs(&contract, ctx.resolver.as_ref(), &driver_config) {
        Ok(inputs) => inputs,
        Err(error) => return ContractOutcome::InputFailed { contract, error },
    };

    let reports = evaluate_candidates(
        &contract,
        ctx,
        subject.baseline.as_ref(),
        &subject.mutants,
        &inputs,
    );
    ContractOutcome::Evaluated { contract, reports }
}

/// Evaluates every block in order on the calling thread.
pub fn run_sequential(
    blocks: &[AnnotationBlock],
    ctx: &CheckContext,
    provider: &dyn SubjectProvider,
    config: &BatchConfig,
) -> Vec<ContractOutcome> {
    let outcomes: Vec<ContractOutcome> = blocks
        .iter()
        .map(|block| check_block(block, ctx, provider, config))
        .collect();
    log_summary(&outcomes);
    outcomes
}

/// Evaluates blocks on blocking workers, at most `config.jobs` at a time.
///
/// Outcomes come back in block order. A worker that panics yields
/// [`ContractOutcome::WorkerPanicked`] for its block; the rest of the batch
/// is unaffected.
pub async fn run_parallel(
    blocks: Vec<AnnotationBlock>,
    ctx: Arc<CheckContext>,
    provider: Arc<dyn SubjectProvider>,
    config: Arc<BatchConfig>,
) -> Vec<ContractOutcome> {
    let permits = Arc::new(Semaphore::new(config.jobs.max(1)));
    let hints: Vec<Option<String>> = blocks.iter().map(|b| b.function_hint.clone()).collect();
    let mut slots: Vec<Option<ContractOutcome>> = blocks.iter().map(|_| None).collect();

    let mut joins = JoinSet::new();
    for (index, block) in blocks.into_iter().enumerate() {
        let permits = Arc::clone(&permits);
        let ctx = Arc::clone(&ctx);
        let provider = Arc::clone(&provider);
        let config = Arc::clone(&config);
        joins.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let hint = block.function_hint.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                check_block(&block, &ctx, provider.as_ref(), &config)
            })
            .await
            .unwrap_or_else(|err| ContractOutcome::WorkerPanicked {
                function_hint: hint,
                message: err.to_string(),
            });
            (index, outcome)
        });
    }

    while let Some(result) = joins.join_next().await {
        match result {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(err) => warn!(error = %err, "batch task failed"),
        }
    }

    let outcomes: Vec<ContractOutcome> = slots
        .into_iter()
        .zip(hints)
        .map(|(slot, hint)| {
            slot.unwrap_or_else(|| ContractOutcome::WorkerPanicked {
                function_hint: hint,
                message: "worker did not report".to_string(),
            })
        })
        .collect();
    log_summary(&outcomes);
    outcomes
}

/// Sends every candidate report of every evaluated contract to `sink`.
pub fn emit_all(outcomes: &[ContractOutcome], sink: &mut dyn ReportSink) {
    for report in outcomes.iter().flat_map(ContractOutcome::reports) {
        sink.emit(report);
    }
}

/// Counts across a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub contracts: usize,
    pub parse_failures: usize,
    pub skipped: usize,
    pub failed: usize,
    pub killed: usize,
    pub survived: usize,
    pub inconclusive: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[ContractOutcome]) -> Self {
        let mut summary = BatchSummary {
            contracts: outcomes.len(),
            ..BatchSummary::default()
        };
        for outcome in outcomes {
            match outcome {
                ContractOutcome::ParseFailed { .. } => summary.parse_failures += 1,
                ContractOutcome::NoSubject { .. } => summary.skipped += 1,
                ContractOutcome::InputFailed { .. } | ContractOutcome::WorkerPanicked { .. } => {
                    summary.failed += 1
                }
                ContractOutcome::Evaluated { reports, .. } => {
                    for report in reports {
                        match report.verdict {
                            Verdict::Killed => summary.killed += 1,
                            Verdict::Survived => summary.survived += 1,
                            Verdict::Inconclusive => summary.inconclusive += 1,
                            Verdict::Baseline => {}
                        }
                    }
                }
            }
        }
        summary
    }
}

fn log_summary(outcomes: &[ContractOutcome]) {
    let s = BatchSummary::from_outcomes(outcomes);
    info!(
        contracts = s.contracts,
        parse_failures = s.parse_failures,
        skipped = s.skipped,
        failed = s.failed,
        killed = s.killed,
        survived = s.survived,
        inconclusive = s.inconclusive,
        "batch complete"
    );
}
