//! Bring the store in line with a list of table descriptors.
//!
//! Each table goes through
//!
//! ```text
//! Pending -> ExistsChecked -> Skipped
//!                          -> Creating -> Ready | Failed
//!                          -> RaceLost -> Ready | Failed
//! ```
//!
//! independently of the others: a failed table is recorded and the run moves
//! on. Only cancellation stops the run early, and it never rolls anything back.

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::descriptor::TableDescriptor;
use crate::errors::{ConfigError, StoreError};
use crate::loader;
use crate::report::{EntityOutcome, RunReport, RunResult};
use crate::store::TableStore;

/// Default bound on waiting for a new table to become ready.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(300);

/// Reconciliation state of a single table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    Pending,
    ExistsChecked,
    Skipped,
    Creating,
    RaceLost,
    Ready,
    Failed,
}

/// Result of the create step.
///
/// `AlreadyExisted` means another provisioner won the race between our
/// existence check and our create call; the table still has to become ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExisted,
    Failed(StoreError),
}

pub struct Reconciler<S> {
    store: S,
    ready_timeout: Duration,
}

impl<S: TableStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reconcile every table in order and report the outcomes.
    ///
    /// A cancelled token stops the run: the table in flight is recorded as
    /// failed with [`StoreError::Cancelled`] and the rest are not attempted.
    pub async fn run(&self, tables: &[TableDescriptor], cancel: &CancellationToken) -> RunReport {
        info!(tables = tables.len(), "reconciliation start");

        let mut outcomes = Vec::with_capacity(tables.len());
        let mut cancelled = false;

        for table in tables {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    EntityOutcome {
                        name: table.name.clone(),
                        result: RunResult::Failed(StoreError::Cancelled),
                        race_lost: false,
                    }
                }
                outcome = self.reconcile(table) => outcome,
            };

            log_outcome(&outcome);
            outcomes.push(outcome);

            if cancelled {
                break;
            }
        }

        if cancelled {
            warn!(
                processed = outcomes.len(),
                remaining = tables.len() - outcomes.len(),
                "reconciliation cancelled"
            );
        }

        let report = RunReport::new(outcomes, cancelled);
        info!(
            created = report.created(),
            already_existed = report.already_existed(),
            failed = report.failed(),
            "reconciliation complete"
        );
        report
    }

    /// Reconcile one table.
    pub async fn reconcile(&self, table: &TableDescriptor) -> EntityOutcome {
        let name = table.name.as_str();
        let mut state = EntityState::Pending;

        match self.store.exists(name).await {
            Ok(true) => {
                advance(&mut state, EntityState::Skipped, name);
                return outcome(name, RunResult::AlreadyExisted, false);
            }
            Ok(false) => advance(&mut state, EntityState::ExistsChecked, name),
            Err(e) => return self.fail(&mut state, name, e, false),
        }

        let race_lost = match self.attempt_create(table).await {
            CreateOutcome::Created => {
                advance(&mut state, EntityState::Creating, name);
                false
            }
            CreateOutcome::AlreadyExisted => {
                advance(&mut state, EntityState::RaceLost, name);
                true
            }
            CreateOutcome::Failed(e) => return self.fail(&mut state, name, e, false),
        };

        match self.store.await_ready(name, self.ready_timeout).await {
            Ok(()) => {
                advance(&mut state, EntityState::Ready, name);
                let result = if race_lost {
                    RunResult::AlreadyExisted
                } else {
                    RunResult::Created
                };
                outcome(name, result, race_lost)
            }
            Err(e) => self.fail(&mut state, name, e, race_lost),
        }
    }

    /// Issue the create call once. Creation is not idempotent, so failures
    /// other than "already exists" are surfaced rather than retried.
    pub async fn attempt_create(&self, table: &TableDescriptor) -> CreateOutcome {
        match self.store.create(table).await {
            Ok(()) => CreateOutcome::Created,
            Err(e) if e.is_already_exists() => {
                info!(table = %table.name, "table created concurrently by another provisioner");
                CreateOutcome::AlreadyExisted
            }
            Err(e) => CreateOutcome::Failed(e),
        }
    }

    fn fail(
        &self,
        state: &mut EntityState,
        name: &str,
        error: StoreError,
        race_lost: bool,
    ) -> EntityOutcome {
        debug!(table = %name, from = ?state, error = %error, "failing table");
        advance(state, EntityState::Failed, name);
        outcome(name, RunResult::Failed(error), race_lost)
    }
}

/// Load the configuration at `path` and reconcile it.
///
/// An invalid configuration is returned as an error before the store is
/// touched.
pub async fn apply_file<S: TableStore>(
    path: impl AsRef<Path>,
    reconciler: &Reconciler<S>,
    cancel: &CancellationToken,
) -> Result<RunReport, ConfigError> {
    let tables = loader::load_file(path)?;
    if tables.is_empty() {
        warn!("no table configurations found");
    }
    Ok(reconciler.run(&tables, cancel).await)
}

fn advance(state: &mut EntityState, next: EntityState, name: &str) {
    debug!(table = %name, from = ?state, to = ?next, "state transition");
    *state = next;
}

fn outcome(name: &str, result: RunResult, race_lost: bool) -> EntityOutcome {
    EntityOutcome {
        name: name.to_string(),
        result,
        race_lost,
    }
}

fn log_outcome(outcome: &EntityOutcome) {
    match &outcome.result {
        RunResult::Created => info!(table = %outcome.name, "table created and ready"),
        RunResult::AlreadyExisted => info!(
            table = %outcome.name,
            race_lost = outcome.race_lost,
            "table already exists, skipping creation"
        ),
        RunResult::Failed(e) => error!(
            table = %outcome.name,
            kind = ?e.kind(),
            error = %e,
            "failed to provision table"
        ),
    }
}
