//! Per-operation verdicts and the comparison report.

#![allow(missing_docs)]

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compare::equivalence::{DiscrepancyKind, Mismatch};
use crate::core::errors::Result;
use crate::engine::cancel::Budget;
use crate::execute::outcome::Execution;
use crate::generate::binder::Phase;
use crate::model::signature::Signature;

/// Overall result for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Equivalent,
    NotEquivalent,
    /// Generation gave up before the operation could be judged.
    Exhausted,
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equivalent => "equivalent",
            Self::NotEquivalent => "not_equivalent",
            Self::Exhausted => "exhausted",
        })
    }
}

/// Engine-side failure confined to one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    pub phase: Phase,
    pub case_index: usize,
    pub details: String,
}

/// First observed behavioral difference for an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub details: String,
    /// The reproducing case and both outcomes. Absent for missing operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<Execution>,
}

impl Discrepancy {
    pub fn observed(mismatch: Mismatch, execution: Execution) -> Self {
        Self {
            kind: mismatch.kind,
            details: mismatch.details,
            execution: Some(execution),
        }
    }

    pub fn missing(details: impl Into<String>) -> Self {
        Self {
            kind: DiscrepancyKind::MissingOperation,
            details: details.into(),
            execution: None,
        }
    }
}

/// Aggregate result for one operation across its case stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Operation identity, e.g. `add(int, int)`.
    pub operation: String,
    pub signature: Signature,
    pub status: VerdictStatus,
    pub cases_run: usize,
    pub discarded: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<Anomaly>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discrepancy: Option<Discrepancy>,
    /// Why generation gave up, for exhausted operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    /// False when a budget stopped the stream early.
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_by: Option<Budget>,
    pub elapsed_ms: u64,
}

impl Verdict {
    /// Verdict for an operation the candidate does not offer.
    pub fn missing(signature: Signature, details: impl Into<String>) -> Self {
        Self {
            operation: signature.id().to_string(),
            signature,
            status: VerdictStatus::NotEquivalent,
            cases_run: 0,
            discarded: 0,
            anomalies: Vec::new(),
            discrepancy: Some(Discrepancy::missing(details)),
            diagnostic: None,
            completed: true,
            stopped_by: None,
            elapsed_ms: 0,
        }
    }

    pub fn is_equivalent(&self) -> bool {
        self.status == VerdictStatus::Equivalent
    }
}

/// Running tallies for one operation, folded into a [`Verdict`].
#[derive(Debug, Default)]
pub(crate) struct Tally {
    pub cases_run: usize,
    pub discarded: usize,
    pub anomalies: Vec<Anomaly>,
    pub discrepancy: Option<Discrepancy>,
    pub diagnostic: Option<String>,
    pub stopped_by: Option<Budget>,
}

impl Tally {
    pub fn status(&self) -> VerdictStatus {
        if self.discrepancy.is_some() {
            VerdictStatus::NotEquivalent
        } else if self.diagnostic.is_some()
            || (self.cases_run == 0 && self.discarded + self.anomalies.len() > 0)
        {
            VerdictStatus::Exhausted
        } else {
            VerdictStatus::Equivalent
        }
    }

    pub fn into_verdict(self, signature: Signature, elapsed_ms: u64) -> Verdict {
        let status = self.status();
        let diagnostic = match (&self.diagnostic, status) {
            (None, VerdictStatus::Exhausted) => Some(format!(
                "no case could be scored: {} discarded, {} anomalies",
                self.discarded,
                self.anomalies.len()
            )),
            (diagnostic, _) => diagnostic.clone(),
        };
        Verdict {
            operation: signature.id().to_string(),
            signature,
            status,
            cases_run: self.cases_run,
            discarded: self.discarded,
            anomalies: self.anomalies,
            discrepancy: self.discrepancy,
            diagnostic,
            completed: self.stopped_by.is_none(),
            stopped_by: self.stopped_by,
            elapsed_ms,
        }
    }
}

/// Result of comparing one candidate against the reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub reference: String,
    pub candidate: String,
    pub seed: u64,
    pub config_hash: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub verdicts: Vec<Verdict>,
    /// False when any budget cut the run short.
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_by: Option<Budget>,
}

impl ComparisonReport {
    /// True when every operation was judged equivalent.
    pub fn is_equivalent(&self) -> bool {
        self.verdicts.iter().all(Verdict::is_equivalent)
    }

    pub fn verdict(&self, operation: &str) -> Option<&Verdict> {
        self.verdicts.iter().find(|v| v.operation == operation)
    }

    pub fn equivalent_count(&self) -> usize {
        self.count(VerdictStatus::Equivalent)
    }

    pub fn failing_count(&self) -> usize {
        self.count(VerdictStatus::NotEquivalent)
    }

    pub fn exhausted_count(&self) -> usize {
        self.count(VerdictStatus::Exhausted)
    }

    fn count(&self, status: VerdictStatus) -> usize {
        self.verdicts.iter().filter(|v| v.status == status).count()
    }

    pub fn total_cases(&self) -> usize {
        self.verdicts.iter().map(|v| v.cases_run).sum()
    }

    pub fn total_discarded(&self) -> usize {
        self.verdicts.iter().map(|v| v.discarded).sum()
    }

    /// First discrepancy in contract order.
    pub fn first_discrepancy(&self) -> Option<(&Verdict, &Discrepancy)> {
        self.verdicts
            .iter()
            .find_map(|v| v.discrepancy.as_ref().map(|d| (v, d)))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Format a human-readable summary for triage.
    pub fn summary(&self) -> String {
        use std::fmt::Write as _;

        let mut out = format!(
            "=== Equivalence Report: {} vs {} ===\n",
            self.reference, self.candidate
        );
        let _ = writeln!(
            out,
            "Operations: {} | Equivalent: {} | Not equivalent: {} | Exhausted: {} | Cases: {} | Discarded: {}",
            self.verdicts.len(),
            self.equivalent_count(),
            self.failing_count(),
            self.exhausted_count(),
            self.total_cases(),
            self.total_discarded(),
        );
        let _ = writeln!(out, "Seed: {} | Config: {}", self.seed, self.config_hash);
        if let Some(budget) = self.stopped_by {
            let _ = writeln!(out, "Incomplete: stopped by {budget}");
        }
        let _ = writeln!(out);

        for verdict in &self.verdicts {
            let icon = match verdict.status {
                VerdictStatus::Equivalent if verdict.completed => "\u{2705}",
                VerdictStatus::Equivalent => "\u{1f504}",
                VerdictStatus::NotEquivalent => "\u{274c}",
                VerdictStatus::Exhausted => "\u{23ed}",
            };
            let _ = write!(
                out,
                "{icon} {} ({} cases, {} discarded)",
                verdict.operation, verdict.cases_run, verdict.discarded
            );
            if let Some(discrepancy) = &verdict.discrepancy {
                let _ = write!(out, " [{}: {}]", discrepancy.kind, discrepancy.details);
            }
            if let Some(diagnostic) = &verdict.diagnostic {
                let _ = write!(out, " [exhausted: {diagnostic}]");
            }
            if !verdict.anomalies.is_empty() {
                let _ = write!(out, " [{} anomalies]", verdict.anomalies.len());
            }
            if let Some(budget) = verdict.stopped_by {
                let _ = write!(out, " [stopped: {budget}]");
            }
            let _ = writeln!(out);

            if let Some(execution) = verdict.discrepancy.as_ref().and_then(|d| d.execution.as_ref()) {
                if let Some(receiver_case) = &execution.receiver_case {
                    let _ = writeln!(out, "    receiver: {receiver_case}");
                }
                let _ = writeln!(out, "    case: {}", execution.case);
                let _ = writeln!(out, "    reference: {}", execution.reference);
                let _ = writeln!(out, "    candidate: {}", execution.candidate);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::execute::outcome::{Outcome, Stage};
    use crate::generate::binder::InputCase;
    use crate::generate::complexity::Complexity;
    use crate::model::types::TypeDesc;
    use crate::model::value::Value;

    fn add() -> Signature {
        Signature::static_op("add", vec![TypeDesc::Int, TypeDesc::Int], TypeDesc::Int)
    }

    fn returned(value: i64) -> Outcome {
        Outcome {
            stage: Stage::Invocation,
            result: Ok(Value::Int(value)),
            receiver: None,
            resources: BTreeMap::new(),
            arguments: BTreeMap::new(),
        }
    }

    fn report(verdicts: Vec<Verdict>) -> ComparisonReport {
        ComparisonReport {
            reference: "reference".to_string(),
            candidate: "candidate".to_string(),
            seed: 124,
            config_hash: "abc".to_string(),
            started_at: Utc::now(),
            elapsed_ms: 1,
            verdicts,
            completed: true,
            stopped_by: None,
        }
    }

    #[test]
    fn clean_tally_is_equivalent() {
        let tally = Tally {
            cases_run: 4,
            discarded: 2,
            ..Tally::default()
        };
        let verdict = tally.into_verdict(add(), 3);
        assert_eq!(verdict.status, VerdictStatus::Equivalent);
        assert!(verdict.completed);
        assert_eq!(verdict.operation, "add(int, int)");
    }

    #[test]
    fn all_discarded_is_exhausted_with_diagnostic() {
        let tally = Tally {
            discarded: 5,
            ..Tally::default()
        };
        let verdict = tally.into_verdict(add(), 0);
        assert_eq!(verdict.status, VerdictStatus::Exhausted);
        assert!(verdict.diagnostic.unwrap().contains("5 discarded"));
    }

    #[test]
    fn discrepancy_outranks_exhaustion() {
        let tally = Tally {
            cases_run: 1,
            diagnostic: Some("random generator skipped 64 times".to_string()),
            discrepancy: Some(Discrepancy::missing("gone")),
            ..Tally::default()
        };
        assert_eq!(tally.status(), VerdictStatus::NotEquivalent);
    }

    #[test]
    fn budget_marks_verdict_incomplete() {
        let tally = Tally {
            cases_run: 1,
            stopped_by: Some(Budget::RunTime),
            ..Tally::default()
        };
        let verdict = tally.into_verdict(add(), 0);
        assert!(!verdict.completed);
        assert_eq!(verdict.status, VerdictStatus::Equivalent);
    }

    #[test]
    fn summary_shows_reproducing_case() {
        let execution = Execution {
            case: InputCase {
                phase: Phase::Fixed,
                index: 2,
                complexity: Complexity::new(Complexity::MIN),
                arguments: vec![Value::Int(1), Value::Int(2)],
                resources: Vec::new(),
            },
            receiver_case: None,
            reference: returned(3),
            candidate: returned(4),
        };
        let mismatch = Mismatch {
            kind: DiscrepancyKind::ValueMismatch,
            details: "expected 3, got 4".to_string(),
        };
        let failing = Tally {
            cases_run: 3,
            discrepancy: Some(Discrepancy::observed(mismatch, execution)),
            ..Tally::default()
        }
        .into_verdict(add(), 1);
        let passing = Tally {
            cases_run: 10,
            ..Tally::default()
        }
        .into_verdict(Signature::static_op("neg", vec![TypeDesc::Int], TypeDesc::Int), 1);

        let report = report(vec![passing, failing]);
        assert!(!report.is_equivalent());
        assert_eq!(report.failing_count(), 1);
        assert_eq!(report.total_cases(), 13);

        let text = report.summary();
        assert!(text.starts_with("=== Equivalence Report: reference vs candidate ==="));
        assert!(text.contains("\u{274c} add(int, int)"), "{text}");
        assert!(text.contains("value mismatch"), "{text}");
        assert!(text.contains("case: fixed #2 (1, 2)"), "{text}");
        assert!(text.contains("candidate: returned 4"), "{text}");

        let (verdict, _) = report.first_discrepancy().unwrap();
        assert_eq!(verdict.operation, "add(int, int)");
    }

    #[test]
    fn report_serializes_to_json() {
        let report = report(vec![Verdict::missing(add(), "candidate has no add(int, int)")]);
        let json = report.to_json().unwrap();
        assert!(json.contains("\"missing_operation\""));
        assert!(json.contains("\"not_equivalent\""));
    }
}
