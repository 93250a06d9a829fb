//! Calico command-line front end.
//!
//! Provides the `calico` binary:
//! - `parse` prints the contracts of a C file as JSON
//! - `check` runs every contract with a built-in subject and prints one
//!   JSON report per candidate
//! - `subjects` lists built-in subjects and their mutation operators
//!
//! Logging goes to stderr, filtered by `CALICO_LOG` (default `warn`).

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use tracing_subscriber::EnvFilter;

use calico_check::{
    emit_all, library, run_parallel, BatchConfig, BatchSummary, BuiltinSubjects, CheckContext,
    ContractOutcome, JsonLinesSink,
};
use calico_core::{extract_blocks, parse_block};

/// Contract annotation parser and mutation-test driver.
#[derive(Parser)]
#[command(name = "calico", about = "Contract annotation parser and mutation-test driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse annotation blocks and print the contracts as JSON.
    Parse {
        /// C source file.
        file: PathBuf,
    },

    /// Check every contract that has a built-in subject.
    Check {
        /// C source file.
        file: PathBuf,

        /// JSON file of scalar overrides: { "<function>": { "<param>": <number> } }.
        #[arg(short, long)]
        fixtures: Option<PathBuf>,

        /// Seed for generated inputs.
        #[arg(short, long, env = "CALICO_SEED", default_value_t = 0)]
        seed: u64,

        /// Generated inputs per contract, after the subject's own seeds.
        #[arg(short, long, env = "CALICO_ITERATIONS", default_value_t = 32)]
        iterations: u32,

        /// Contracts evaluated concurrently.
        #[arg(short, long, env = "CALICO_JOBS", default_value_t = 4)]
        jobs: usize,
    },

    /// List built-in subjects and their mutants.
    Subjects,
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Parse { file } => run_parse(&file),
        Commands::Check {
            file,
            fixtures,
            seed,
            iterations,
            jobs,
        } => {
            let config = BatchConfig {
                iterations,
                random_seed: seed,
                jobs,
                fixtures: IndexMap::new(),
            };
            run_check(&file, fixtures.as_deref(), config).await
        }
        Commands::Subjects => run_subjects(),
    };
    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CALICO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_source(path: &Path) -> Result<String, i32> {
    std::fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: failed to read '{}': {}", path.display(), e);
        3
    })
}

/// Execute the parse subcommand.
///
/// Returns exit code: 0 = all blocks parsed, 2 = some block failed to parse,
/// 3 = I/O error.
fn run_parse(path: &Path) -> i32 {
    let source = match read_source(path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let mut contracts = Vec::new();
    let mut failed = 0;
    for block in extract_blocks(&source) {
        match parse_block(&block.text, block.start_line) {
            Ok(contract) => contracts.push(contract),
            Err(e) => {
                failed += 1;
                eprintln!("{}:{}", path.display(), e);
            }
        }
    }

    match serde_json::to_string_pretty(&contracts) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: failed to serialize contracts: {}", e);
            return 3;
        }
    }
    if failed > 0 {
        2
    } else {
        0
    }
}

/// Execute the check subcommand.
///
/// Returns exit code: 0 = every mutant killed, 1 = some mutant survived or
/// was inconclusive, 2 = some contract failed to parse, 3 = I/O or fixture
/// error.
async fn run_check(path: &Path, fixtures: Option<&Path>, mut config: BatchConfig) -> i32 {
    let source = match read_source(path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    if let Some(fixture_path) = fixtures {
        let text = match read_source(fixture_path) {
            Ok(s) => s,
            Err(code) => return code,
        };
        match serde_json::from_str(&text) {
            Ok(parsed) => config.fixtures = parsed,
            Err(e) => {
                eprintln!("Error: invalid fixtures '{}': {}", fixture_path.display(), e);
                return 3;
            }
        }
    }

    let blocks = extract_blocks(&source);
    let outcomes = run_parallel(
        blocks,
        Arc::new(CheckContext::default()),
        Arc::new(BuiltinSubjects),
        Arc::new(config),
    )
    .await;

    let mut io_failed = false;
    for outcome in &outcomes {
        match outcome {
            ContractOutcome::ParseFailed { error, .. } => {
                eprintln!("{}:{}", path.display(), error);
            }
            ContractOutcome::InputFailed { contract, error } => {
                io_failed = true;
                eprintln!("Error: {}: {}", contract.function_name, error);
            }
            ContractOutcome::WorkerPanicked { message, .. } => {
                eprintln!(
                    "Error: worker for '{}' panicked: {}",
                    outcome.function_name().unwrap_or("<unknown>"),
                    message
                );
            }
            ContractOutcome::NoSubject { contract } => {
                tracing::info!(function = %contract.function_name, "no built-in subject, skipped");
            }
            ContractOutcome::Evaluated { .. } => {}
        }
    }

    let stdout = io::stdout();
    let mut sink = JsonLinesSink::new(stdout.lock());
    emit_all(&outcomes, &mut sink);
    if let Err(e) = sink.finish() {
        eprintln!("Error: failed to write reports: {}", e);
        return 3;
    }

    let summary = BatchSummary::from_outcomes(&outcomes);
    eprintln!(
        "{} contract(s): {} killed, {} survived, {} inconclusive, {} parse failure(s), {} skipped",
        summary.contracts,
        summary.killed,
        summary.survived,
        summary.inconclusive,
        summary.parse_failures,
        summary.skipped,
    );

    if io_failed {
        3
    } else if summary.parse_failures > 0 {
        2
    } else if summary.survived > 0 || summary.inconclusive > 0 || summary.failed > 0 {
        1
    } else {
        0
    }
}

/// Execute the subjects subcommand.
fn run_subjects() -> i32 {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for name in library::subject_names() {
        let ops: Vec<&str> = library::operators(name)
            .unwrap_or_default()
            .iter()
            .map(|op| op.name())
            .collect();
        if writeln!(out, "{}: {}", name, ops.join(", ")).is_err() {
            return 3;
        }
    }
    0
}
