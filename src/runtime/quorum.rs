//! Per-dependency quorum state.
//!
//! Each dependency owns a result cell and a live-probe counter. Probe tasks
//! report their terminal outcome here; the first report that satisfies the
//! dependency's quorum wins a compare-and-swap on the cell, fires the
//! dependency's cancel channel, and is the only caller that propagates the
//! outcome upward. Late reporters observe the decided cell and return
//! without touching the tallies.

use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

use tokio::sync::watch;

use crate::config::QuorumMode;

/// Terminal outcome of a dependency. The cell transitions away from
/// `Unknown` at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unknown,
    Success,
    Failure,
}

const UNKNOWN: u8 = 0;
const SUCCESS: u8 = 1;
const FAILURE: u8 = 2;

impl Outcome {
    fn from_u8(value: u8) -> Self {
        match value {
            SUCCESS => Outcome::Success,
            FAILURE => Outcome::Failure,
            _ => Outcome::Unknown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Outcome::Unknown => UNKNOWN,
            Outcome::Success => SUCCESS,
            Outcome::Failure => FAILURE,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Unknown => write!(f, "undecided"),
            Outcome::Success => write!(f, "ready"),
            Outcome::Failure => write!(f, "failed"),
        }
    }
}

/// Shared runtime state of one dependency.
pub struct DependencyState {
    name: String,
    mode: QuorumMode,
    active_probes: AtomicI64,
    final_result: AtomicU8,
    cancel_tx: watch::Sender<bool>,
}

impl DependencyState {
    pub fn new(name: impl Into<String>, mode: QuorumMode, probe_count: usize) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            name: name.into(),
            mode,
            active_probes: AtomicI64::new(probe_count as i64),
            final_result: AtomicU8::new(UNKNOWN),
            cancel_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value of the result cell.
    pub fn outcome(&self) -> Outcome {
        Outcome::from_u8(self.final_result.load(Ordering::SeqCst))
    }

    /// A receiver that resolves once the dependency is decided.
    pub fn subscribe_cancel(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    /// Fire the cancel channel without deciding; used when the run-level
    /// quorum is already satisfied.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Record one probe's terminal result.
    ///
    /// Returns the decided outcome when this call wins the transition; the
    /// winner must propagate the outcome to the run-level arbiter. All other
    /// calls return `None`.
    pub fn report(&self, success: bool) -> Option<Outcome> {
        let remaining = self.active_probes.fetch_sub(1, Ordering::SeqCst) - 1;

        let decides = match (success, self.mode) {
            (true, QuorumMode::Any) => true,
            (false, QuorumMode::All) => true,
            _ => remaining <= 0,
        };
        if !decides {
            return None;
        }

        let target = if success {
            Outcome::Success
        } else {
            Outcome::Failure
        };
        match self.final_result.compare_exchange(
            UNKNOWN,
            target.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                // Zero the counter so in-flight reporters become no-ops,
                // then release every probe still blocked on I/O or a sleep.
                self.active_probes.store(0, Ordering::SeqCst);
                let _ = self.cancel_tx.send(true);
                Some(target)
            }
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_mode_waits_for_every_probe() {
        let state = DependencyState::new("db", QuorumMode::All, 2);
        assert_eq!(state.report(true), None);
        assert_eq!(state.outcome(), Outcome::Unknown);
        assert_eq!(state.report(true), Some(Outcome::Success));
        assert_eq!(state.outcome(), Outcome::Success);
    }

    #[test]
    fn test_all_mode_fails_on_first_failure() {
        let state = DependencyState::new("db", QuorumMode::All, 3);
        assert_eq!(state.report(false), Some(Outcome::Failure));
        assert_eq!(state.outcome(), Outcome::Failure);
    }

    #[test]
    fn test_any_mode_succeeds_on_first_success() {
        let state = DependencyState::new("cluster", QuorumMode::Any, 2);
        assert_eq!(state.report(false), None);
        assert_eq!(state.report(true), Some(Outcome::Success));
    }

    #[test]
    fn test_any_mode_fails_when_exhausted() {
        let state = DependencyState::new("cluster", QuorumMode::Any, 2);
        assert_eq!(state.report(false), None);
        assert_eq!(state.report(false), Some(Outcome::Failure));
    }

    #[test]
    fn test_single_transition() {
        let state = DependencyState::new("db", QuorumMode::Any, 2);
        assert_eq!(state.report(true), Some(Outcome::Success));
        // A racing failure report cannot overwrite the decided cell.
        assert_eq!(state.report(false), None);
        assert_eq!(state.outcome(), Outcome::Success);
    }

    #[test]
    fn test_decide_fires_cancel_channel() {
        let state = DependencyState::new("db", QuorumMode::All, 1);
        let rx = state.subscribe_cancel();
        assert!(!*rx.borrow());
        state.report(true);
        assert!(*rx.borrow());
    }

    #[test]
    fn test_late_reports_after_decision_are_noops() {
        let state = DependencyState::new("db", QuorumMode::All, 2);
        assert_eq!(state.report(false), Some(Outcome::Failure));
        // The sibling probe finishing late must not re-decide.
        assert_eq!(state.report(true), None);
        assert_eq!(state.report(false), None);
        assert_eq!(state.outcome(), Outcome::Failure);
    }
}
