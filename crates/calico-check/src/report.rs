//! Per-candidate reports and the sinks that receive them.

use std::fmt;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::candidate::CandidateId;
use crate::equality::EqualityVerdict;
use crate::property::Phase;

/// Final judgement for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// The baseline's own run; lists which properties it violated.
    Baseline,
    Killed,
    Survived,
    Inconclusive,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Baseline => "baseline",
            Verdict::Killed => "killed",
            Verdict::Survived => "survived",
            Verdict::Inconclusive => "inconclusive",
        };
        f.write_str(s)
    }
}

/// Identifies one property clause in a report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyRef {
    pub phase: Phase,
    pub predicate: String,
    pub argument: String,
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}({})", self.phase, self.predicate, self.argument)
    }
}

/// Outcome of one candidate of one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub contract_name: String,
    pub candidate_id: CandidateId,
    pub verdict: Verdict,
    /// Properties violated on the deciding input (or on any input, for the
    /// baseline).
    pub violated_properties: Vec<PropertyRef>,
    pub unknown_predicates: Vec<String>,
    /// After-state comparison against the baseline on the deciding input.
    pub equality_verdict: Option<EqualityVerdict>,
    pub inputs_run: usize,
    /// Index of the first input that killed the mutant.
    pub killing_input: Option<usize>,
    pub error: Option<String>,
}

pub trait ReportSink {
    fn emit(&mut self, report: &CandidateReport);
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub reports: Vec<CandidateReport>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_reports(self) -> Vec<CandidateReport> {
        self.reports
    }
}

impl ReportSink for CollectingSink {
    fn emit(&mut self, report: &CandidateReport) {
        self.reports.push(report.clone());
    }
}

/// Writes one JSON object per line.
///
/// The first write failure is kept and returned by [`finish`](Self::finish);
/// later reports are dropped.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    error: Option<io::Error>,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink {
            writer,
            error: None,
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Flushes the writer and hands it back, or the first I/O error.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn write_line(&mut self, report: &CandidateReport) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, report)?;
        self.writer.write_all(b"\n")
    }
}

impl<W: Write> ReportSink for JsonLinesSink<W> {
    fn emit(&mut self, report: &CandidateReport) {
        if self.error.is_some() {
            return;
        }
        match self.write_line(report) {
            Ok(()) => self.written += 1,
            Err(err) => self.error = Some(err),
        }
    }
}
