//! Probe orchestration and the run-level arbiter.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{Document, QuorumMode};
use crate::runtime::compile::{self, CompileError, Dependency};
use crate::runtime::probe::run_probe;
use crate::runtime::quorum::{DependencyState, Outcome};

/// Process exit status for a successful run.
pub const EXIT_READY: i32 = 0;
/// Process exit status when the quorum cannot be satisfied.
pub const EXIT_FAILED: i32 = 1;

/// Compiled run: the dependency set plus the quorum mode across it.
pub struct Executor {
    mode: QuorumMode,
    deps: Vec<Dependency>,
}

impl Executor {
    /// Compile the document into a runnable probe set.
    pub fn new(doc: &Document) -> Result<Self, CompileError> {
        Ok(Self {
            mode: doc.mode,
            deps: compile::compile(doc)?,
        })
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.deps
    }

    /// Human-readable probe plan (for `--dry-run`).
    pub fn plan(&self) -> Plan<'_> {
        Plan { executor: self }
    }

    /// Warn about names that do not resolve yet.
    pub async fn preflight(&self) {
        compile::preflight(&self.deps).await;
    }

    /// Probe everything and wait for the run-level quorum to decide.
    /// Returns the process exit status.
    pub async fn run(&self) -> i32 {
        if self.deps.is_empty() {
            log::info!("no dependencies declared, nothing to wait for");
            return EXIT_READY;
        }

        let total_probes: usize = self.deps.iter().map(|d| d.probes.len()).sum();
        log::info!(
            "waiting for {} dependencies ({} probes, mode {})",
            self.deps.len(),
            total_probes,
            self.mode
        );

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let client = reqwest::Client::new();

        let mut states = Vec::with_capacity(self.deps.len());
        for dep in &self.deps {
            let state = Arc::new(DependencyState::new(
                dep.name.clone(),
                dep.mode(),
                dep.probes.len(),
            ));
            for probe in &dep.probes {
                tokio::spawn(run_probe(
                    probe.clone(),
                    dep.settings,
                    state.clone(),
                    outcome_tx.clone(),
                    client.clone(),
                ));
            }
            states.push(state);
        }
        drop(outcome_tx);

        let mut remaining = self.deps.len();
        let code = loop {
            // The channel cannot run dry before the quorum decides: every
            // dependency reports exactly one outcome.
            let Some((name, outcome)) = outcome_rx.recv().await else {
                log::error!("probe tasks finished without a run-level decision");
                break EXIT_FAILED;
            };
            remaining -= 1;
            match (outcome, self.mode) {
                (Outcome::Success, QuorumMode::Any) => {
                    log::info!("[{}] ready, any-mode quorum satisfied", name);
                    break EXIT_READY;
                }
                (Outcome::Failure, QuorumMode::All) => {
                    log::error!("[{}] failed, giving up", name);
                    break EXIT_FAILED;
                }
                (Outcome::Success, QuorumMode::All) if remaining == 0 => {
                    log::info!("all dependencies ready");
                    break EXIT_READY;
                }
                (Outcome::Failure, QuorumMode::Any) if remaining == 0 => {
                    log::error!("no dependency became ready");
                    break EXIT_FAILED;
                }
                (outcome, _) => {
                    log::debug!("[{}] {}, {} dependencies outstanding", name, outcome, remaining);
                }
            }
        };

        // Short-circuit whatever is still in flight.
        for state in &states {
            state.cancel();
        }
        code
    }
}

/// Display adapter listing every compiled dependency and probe.
pub struct Plan<'a> {
    executor: &'a Executor,
}

impl std::fmt::Display for Plan<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Probe plan (mode: {})", self.executor.mode)?;
        for dep in &self.executor.deps {
            let s = &dep.settings;
            writeln!(
                f,
                "  {} (mode {}, attempts {}, timeout {}s, delay {}s, initial delay {}s)",
                dep.name, s.mode, s.attempts, s.timeout, s.delay, s.initial_delay
            )?;
            for probe in &dep.probes {
                writeln!(f, "    - {}", probe)?;
            }
        }
        Ok(())
    }
}
