//! Mutation-test engine for calico contracts.
//!
//! Takes parsed [`calico_core::Contract`]s and checks candidate
//! implementations against them: snapshot pointer state, invoke, evaluate
//! declared properties, compare after-states, judge mutants.
//!
//! # Modules
//!
//! - [`snapshot`] -- Owned byte snapshots of parameter storage
//! - [`property`] -- Predicate registry and clause evaluation
//! - [`equality`] -- State comparison strategies
//! - [`driver`] -- Per-candidate state machine and mutant judging
//! - [`batch`] -- Whole-file evaluation, sequential or on Tokio workers
//! - [`library`] -- Built-in subjects and mutation operators

pub mod batch;
pub mod candidate;
pub mod driver;
pub mod equality;
pub mod inputs;
pub mod library;
pub mod property;
pub mod report;
pub mod snapshot;
pub mod value;

pub use batch::{
    check_block, emit_all, run_parallel, run_sequential, BatchConfig, BatchSummary,
    ContractOutcome, Subject, SubjectProvider,
};
pub use candidate::{Argument, Arguments, Candidate, CandidateId, FnCandidate, InvokeError};
pub use driver::{
    evaluate_candidates, judge, CheckContext, CycleError, CycleOutcome, DriverConfig, DriverState,
    MutationDriver,
};
pub use equality::{EqualityRegistry, EqualityVerdict};
pub use library::{BuiltinSubjects, MutationOperator};
pub use property::{evaluate, EvalError, Phase, Predicate, PredicateRegistry, PropertyResult};
pub use report::{CandidateReport, CollectingSink, JsonLinesSink, PropertyRef, ReportSink, Verdict};
pub use snapshot::{capture, restore, Snapshot, SnapshotError, SnapshotSet, Tick};
pub use value::Value;
