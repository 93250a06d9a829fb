//! End-to-end tests over the annotated C files in `demos/`.
//!
//! Each test extracts blocks from a real source file, runs them through the
//! built-in subjects and checks the resulting candidate reports.

use std::sync::Arc;

use calico_check::{
    run_parallel, run_sequential, BatchConfig, BatchSummary, BuiltinSubjects, CandidateId,
    CandidateReport, CheckContext, ContractOutcome, Phase, PropertyRef, Verdict,
};
use calico_core::{extract_blocks, parse_block_with_dialect, Dialect};

const UNTAGGED: &str = include_str!("../../../demos/double_int_ptr.c");
const TAGGED: &str = include_str!("../../../demos/double_int_ptr_tagged.c");
const PROPS: &str = include_str!("../../../demos/calico_props.c");
const FIXTURES: &str = include_str!("../../../demos/fixtures.json");

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn config() -> BatchConfig {
    BatchConfig {
        iterations: 16,
        random_seed: 2024,
        fixtures: serde_json::from_str(FIXTURES).unwrap(),
        ..BatchConfig::default()
    }
}

fn check(source: &str, config: &BatchConfig) -> Vec<ContractOutcome> {
    let blocks = extract_blocks(source);
    run_sequential(&blocks, &CheckContext::default(), &BuiltinSubjects, config)
}

fn reports_for<'a>(outcomes: &'a [ContractOutcome], function: &str) -> &'a [CandidateReport] {
    outcomes
        .iter()
        .find(|o| o.function_name() == Some(function))
        .map(ContractOutcome::reports)
        .unwrap()
}

fn mutant<'a>(reports: &'a [CandidateReport], op: &str) -> &'a CandidateReport {
    let id = CandidateId::mutant(op);
    reports.iter().find(|r| r.candidate_id == id).unwrap()
}

fn property(phase: Phase, predicate: &str, argument: &str) -> PropertyRef {
    PropertyRef {
        phase,
        predicate: predicate.into(),
        argument: argument.into(),
    }
}

// ---------------------------------------------------------------------------
// Dialects
// ---------------------------------------------------------------------------

#[test]
fn both_dialects_give_the_same_verdicts() {
    let untagged = extract_blocks(UNTAGGED);
    let tagged = extract_blocks(TAGGED);
    assert_eq!(untagged.len(), 1);
    assert_eq!(tagged.len(), 1);

    let (plain, dialect) =
        parse_block_with_dialect(&untagged[0].text, untagged[0].start_line).unwrap();
    assert_eq!(dialect, Dialect::Untagged);
    let (scoped, dialect) = parse_block_with_dialect(&tagged[0].text, tagged[0].start_line).unwrap();
    assert_eq!(dialect, Dialect::EffectTagged);
    assert_eq!(plain, scoped);

    let cfg = config();
    let a = check(UNTAGGED, &cfg);
    let b = check(TAGGED, &cfg);
    assert_eq!(a[0].reports(), b[0].reports());
}

#[test]
fn doubling_violates_negate_on_both_sides() {
    let outcomes = check(UNTAGGED, &config());
    let reports = reports_for(&outcomes, "double_int_ptr");

    let baseline = &reports[0];
    assert_eq!(baseline.candidate_id, CandidateId::Baseline);
    assert_eq!(baseline.verdict, Verdict::Baseline);
    assert_eq!(
        baseline.violated_properties,
        vec![
            property(Phase::Input, "negate", "in"),
            property(Phase::Output, "negate", "in"),
        ]
    );
    assert_eq!(baseline.error, None);

    // Every mutant changes *in on the seed value 1.
    for report in &reports[1..] {
        assert_eq!(report.verdict, Verdict::Killed, "{}", report.candidate_id);
        assert_eq!(report.killing_input, Some(0));
    }
}

// ---------------------------------------------------------------------------
// Helper library
// ---------------------------------------------------------------------------

#[test]
fn every_helper_contract_is_evaluated() {
    let outcomes = check(PROPS, &config());
    let names: Vec<&str> = outcomes.iter().filter_map(|o| o.function_name()).collect();
    assert_eq!(
        names,
        vec![
            "multiply_int",
            "multiply_int_array",
            "multiply_double",
            "multiply_double_array",
            "id",
        ]
    );
    assert!(outcomes
        .iter()
        .all(|o| matches!(o, ContractOutcome::Evaluated { .. })));
}

#[test]
fn negated_factor_breaks_sign_preservation() {
    let outcomes = check(PROPS, &config());
    let reports = reports_for(&outcomes, "multiply_int_array");

    let negated = mutant(reports, "negate-factor");
    assert_eq!(negated.verdict, Verdict::Killed);
    assert_eq!(negated.killing_input, Some(0));
    assert_eq!(negated.inputs_run, 1);
    assert_eq!(
        negated.violated_properties,
        vec![property(Phase::Output, "preserve_sign", "a")]
    );

    let shortened = mutant(reports, "shorten-loop");
    assert_eq!(shortened.verdict, Verdict::Killed);
    assert!(shortened.violated_properties.is_empty());
}

#[test]
fn double_length_is_rounded_into_the_loop() {
    let outcomes = check(PROPS, &config());
    let reports = reports_for(&outcomes, "multiply_double_array");
    let shortened = mutant(reports, "shorten-loop");
    assert_eq!(shortened.verdict, Verdict::Killed);
    assert_eq!(shortened.killing_input, Some(0));
}

#[test]
fn id_only_loses_to_zero_fill() {
    let cfg = config();
    let outcomes = check(PROPS, &cfg);
    let reports = reports_for(&outcomes, "id");
    assert!(reports[0].violated_properties.is_empty());

    let no_op = mutant(reports, "no-op");
    assert_eq!(no_op.verdict, Verdict::Survived);
    assert_eq!(no_op.inputs_run, 1 + cfg.iterations as usize);

    let zero = mutant(reports, "zero-fill");
    assert_eq!(zero.verdict, Verdict::Killed);
    assert_eq!(zero.killing_input, Some(0));
}

#[test]
fn same_seed_same_reports() {
    let cfg = config();
    let first = check(PROPS, &cfg);
    let second = check(PROPS, &cfg);
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.reports(), b.reports());
    }
}

// ---------------------------------------------------------------------------
// Batches with broken blocks
// ---------------------------------------------------------------------------

fn with_broken_block() -> String {
    format!(
        "{PROPS}\n/**\n * @fun-info {{ broken, \"void\" }} ;\n * @param-info {{ a }} ;\n */\n\
         void broken(int *a);\n"
    )
}

#[test]
fn broken_block_is_reported_and_skipped() {
    let source = with_broken_block();
    let outcomes = check(&source, &config());
    assert_eq!(outcomes.len(), 6);

    let last = &outcomes[5];
    assert!(matches!(last, ContractOutcome::ParseFailed { .. }));
    assert_eq!(last.function_name(), Some("broken"));

    let summary = BatchSummary::from_outcomes(&outcomes);
    assert_eq!(summary.parse_failures, 1);
    assert_eq!(summary.failed, 0);
    assert!(summary.killed > 0);
}

#[tokio::test]
async fn parallel_batch_keeps_block_order() {
    let source = with_broken_block();
    let cfg = config();
    let sequential = check(&source, &cfg);
    let parallel = run_parallel(
        extract_blocks(&source),
        Arc::new(CheckContext::default()),
        Arc::new(BuiltinSubjects),
        Arc::new(BatchConfig { jobs: 2, ..cfg }),
    )
    .await;

    assert_eq!(parallel.len(), sequential.len());
    for (p, s) in parallel.iter().zip(&sequential) {
        assert_eq!(p.function_name(), s.function_name());
        assert_eq!(p.reports(), s.reports());
    }
    assert_eq!(
        BatchSummary::from_outcomes(&parallel),
        BatchSummary::from_outcomes(&sequential)
    );
}
