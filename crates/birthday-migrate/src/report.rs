use std::fmt;

use serde::Serialize;

use crate::errors::{StoreError, StoreErrorKind};

/// Final result for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    Created,
    AlreadyExisted,
    Failed(StoreError),
}

impl RunResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, RunResult::Failed(_))
    }
}

/// Outcome of reconciling one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityOutcome {
    pub name: String,
    pub result: RunResult,
    /// Another provisioner created the table between our existence check
    /// and our create call. Informational only.
    pub race_lost: bool,
}

/// Per-table outcomes of one run, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    outcomes: Vec<EntityOutcome>,
    cancelled: bool,
}

impl RunReport {
    pub fn new(outcomes: Vec<EntityOutcome>, cancelled: bool) -> Self {
        Self {
            outcomes,
            cancelled,
        }
    }

    pub fn outcomes(&self) -> &[EntityOutcome] {
        &self.outcomes
    }

    /// The run was interrupted before every table was processed.
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn created(&self) -> usize {
        self.count(|r| matches!(r, RunResult::Created))
    }

    pub fn already_existed(&self) -> usize {
        self.count(|r| matches!(r, RunResult::AlreadyExisted))
    }

    pub fn failed(&self) -> usize {
        self.count(RunResult::is_failed)
    }

    /// Every table exists and is ready.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed() == 0
    }

    /// Process exit status for this report.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    fn count(&self, pred: impl Fn(&RunResult) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.result)).count()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            match &outcome.result {
                RunResult::Created => writeln!(f, "  created         {}", outcome.name)?,
                RunResult::AlreadyExisted if outcome.race_lost => writeln!(
                    f,
                    "  already existed {} (created concurrently)",
                    outcome.name
                )?,
                RunResult::AlreadyExisted => writeln!(f, "  already existed {}", outcome.name)?,
                RunResult::Failed(e) => writeln!(f, "  FAILED          {}: {e}", outcome.name)?,
            }
        }

        write!(
            f,
            "{} tables: {} created, {} already existed, {} failed",
            self.outcomes.len(),
            self.created(),
            self.already_existed(),
            self.failed()
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON form
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ReportJson<'a> {
    success: bool,
    cancelled: bool,
    created: usize,
    already_existed: usize,
    failed: usize,
    tables: Vec<OutcomeJson<'a>>,
}

#[derive(Serialize)]
struct OutcomeJson<'a> {
    name: &'a str,
    result: &'static str,
    race_lost: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<StoreErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Serialize for RunReport {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tables = self
            .outcomes
            .iter()
            .map(|o| {
                let (result, error) = match &o.result {
                    RunResult::Created => ("created", None),
                    RunResult::AlreadyExisted => ("already_existed", None),
                    RunResult::Failed(e) => ("failed", Some(e)),
                };
                OutcomeJson {
                    name: &o.name,
                    result,
                    race_lost: o.race_lost,
                    error_kind: error.map(StoreError::kind),
                    error: error.map(ToString::to_string),
                }
            })
            .collect();

        ReportJson {
            success: self.is_success(),
            cancelled: self.cancelled,
            created: self.created(),
            already_existed: self.already_existed(),
            failed: self.failed(),
            tables,
        }
        .serialize(serializer)
    }
}
