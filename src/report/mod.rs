//! The report assembler (spec §4.G).
//!
//! Pure with respect to time: [`ReportAssembler::assemble`] takes the
//! generation timestamp as an argument rather than reading a clock, so the
//! same inputs always produce byte-identical output (spec §8
//! "Determinism").

use serde::Serialize;

use crate::rules::Severity;
use crate::value::Value;

/// The three outcome statuses (spec §3 "Outcome"). There is no separate
/// "error" status — every evaluator failure other than missing data is
/// recovered locally into `Failed` with a diagnostic `message` (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    Pass,
    Fail,
    Missing,
}

/// One node's result inside a `nodeValidation` outcome (spec §3 "Outcome").
#[derive(Debug, Clone, Serialize)]
pub struct NodeOutcome {
    pub node_index: usize,
    /// Absolute, indexed-step path to the node (spec §4.A).
    pub node_xpath: String,
    pub actual_value: Value,
    pub expected_value: Value,
    pub status: Status,
    pub message: Option<String>,
}

/// The result of running a single [`crate::rules::Rule`] against one file
/// (spec §3 "Outcome"). `node_results` is empty for every rule kind except
/// `nodeValidation`; overall `status` for that kind is `Pass` iff every
/// per-node status is `Pass`.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub rule_id: String,
    pub file_path: String,
    pub status: Status,
    pub returned_value: Value,
    pub expected_value: Option<Value>,
    pub message: Option<String>,
    pub severity: Severity,
    pub node_results: Vec<NodeOutcome>,
}

impl Outcome {
    #[must_use]
    pub fn is_passed(&self) -> bool {
        self.status == Status::Pass
    }
}

/// Aggregate counts over a [`Report`]'s outcomes (spec §4.G "Counting
/// policy": each rule, including `nodeValidation`, contributes exactly 1 to
/// `total` regardless of its per-node count).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub missing: usize,
}

impl Summary {
    fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome.status {
                Status::Pass => summary.passed += 1,
                Status::Fail => summary.failed += 1,
                Status::Missing => summary.missing += 1,
            }
        }
        summary
    }
}

/// Run-level identifying information, kept separate from the outcomes
/// themselves (spec §4.G).
#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    /// Caller-supplied, never generated here — see module docs.
    pub timestamp: String,
    pub files: Vec<String>,
    pub rule_documents: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub summary: Summary,
    pub results: Vec<Outcome>,
    pub metadata: Metadata,
}

pub struct ReportAssembler;

impl ReportAssembler {
    /// Fold outcomes (from one or more files) into a finished [`Report`].
    /// `timestamp` is supplied by the caller (e.g. `chrono::Utc::now()` at
    /// the call site) so this function stays a pure fold over its inputs.
    #[must_use]
    pub fn assemble(
        timestamp: String,
        files: Vec<String>,
        rule_documents: Vec<String>,
        outcomes: Vec<Outcome>,
    ) -> Report {
        let summary = Summary::from_outcomes(&outcomes);
        Report {
            summary,
            results: outcomes,
            metadata: Metadata {
                timestamp,
                files,
                rule_documents,
            },
        }
    }
}

impl Serialize for Severity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let name = match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        };
        serializer.serialize_str(name)
    }
}
