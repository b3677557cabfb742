//! Batch aggregation rules.
//!
//! A batch owns nothing but its child task ids; its state and counters are
//! always recomputed from the authoritative task states, never mutated
//! independently. That keeps the aggregate from ever disagreeing with its
//! children.

use crate::task::TaskState;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Template id deduplication
// ---------------------------------------------------------------------------

/// Collapse duplicate template ids, preserving first-occurrence order.
pub fn dedupe_preserving_order(ids: &[DbId]) -> Vec<DbId> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}

// ---------------------------------------------------------------------------
// Derived batch state
// ---------------------------------------------------------------------------

/// Batch state derived from child task states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// No child has started yet.
    Pending,
    /// At least one child has started or finished; some are still open.
    Processing,
    /// All children terminal, at least one completed.
    Completed,
    /// All children terminal and every one of them failed.
    Failed,
    /// All children terminal, none completed, at least one canceled.
    Canceled,
}

impl BatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

/// Counts of child tasks per state, produced by one scan of the children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStateCounts {
    pub total: u32,
    pub pending: u32,
    pub running: u32,
    pub completed: u32,
    pub failed: u32,
    pub canceled: u32,
}

impl TaskStateCounts {
    pub fn from_states(states: &[TaskState]) -> Self {
        let mut counts = Self::default();
        for state in states {
            counts.total += 1;
            match state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Completed => counts.completed += 1,
                TaskState::Failed => counts.failed += 1,
                TaskState::Canceled => counts.canceled += 1,
            }
        }
        counts
    }

    /// Children in a terminal state.
    pub fn terminal(&self) -> u32 {
        self.completed + self.failed + self.canceled
    }

    pub fn all_terminal(&self) -> bool {
        self.terminal() == self.total
    }
}

/// Derive the batch state from its children's counts.
pub fn derive_batch_state(counts: &TaskStateCounts) -> BatchState {
    if counts.total == 0 {
        // Creation rejects empty batches; an empty scan means the children
        // are gone, which only retention can cause. Treat as completed.
        return BatchState::Completed;
    }
    if counts.all_terminal() {
        if counts.completed > 0 {
            BatchState::Completed
        } else if counts.failed == counts.total {
            BatchState::Failed
        } else {
            BatchState::Canceled
        }
    } else if counts.terminal() > 0 || counts.running > 0 {
        BatchState::Processing
    } else {
        BatchState::Pending
    }
}

/// Fraction of children in a terminal state, as a percentage rounded to
/// two decimals. This is the batch's externally visible progress signal.
pub fn progress_percentage(counts: &TaskStateCounts) -> f64 {
    if counts.total == 0 {
        return 0.0;
    }
    let raw = counts.terminal() as f64 / counts.total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use TaskState::*;

    // -- dedupe_preserving_order ----------------------------------------------

    #[test]
    fn dedupe_keeps_first_occurrence_order() {
        assert_eq!(dedupe_preserving_order(&[5, 5, 7]), vec![5, 7]);
        assert_eq!(dedupe_preserving_order(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }

    #[test]
    fn dedupe_of_unique_list_is_identity() {
        assert_eq!(dedupe_preserving_order(&[1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn dedupe_of_empty_list_is_empty() {
        assert!(dedupe_preserving_order(&[]).is_empty());
    }

    // -- derive_batch_state ---------------------------------------------------

    fn counts(states: &[TaskState]) -> TaskStateCounts {
        TaskStateCounts::from_states(states)
    }

    #[test]
    fn all_pending_is_pending() {
        assert_eq!(derive_batch_state(&counts(&[Pending, Pending])), BatchState::Pending);
    }

    #[test]
    fn any_running_is_processing() {
        assert_eq!(
            derive_batch_state(&counts(&[Pending, Running])),
            BatchState::Processing
        );
    }

    #[test]
    fn partial_terminal_is_processing() {
        assert_eq!(
            derive_batch_state(&counts(&[Completed, Pending])),
            BatchState::Processing
        );
        assert_eq!(
            derive_batch_state(&counts(&[Failed, Running])),
            BatchState::Processing
        );
    }

    #[test]
    fn all_terminal_with_any_completed_is_completed() {
        assert_eq!(
            derive_batch_state(&counts(&[Completed, Failed, Canceled])),
            BatchState::Completed
        );
    }

    #[test]
    fn all_failed_is_failed() {
        assert_eq!(derive_batch_state(&counts(&[Failed, Failed])), BatchState::Failed);
    }

    #[test]
    fn all_canceled_is_canceled() {
        assert_eq!(
            derive_batch_state(&counts(&[Canceled, Canceled])),
            BatchState::Canceled
        );
    }

    #[test]
    fn failed_and_canceled_mix_without_completed_is_canceled() {
        assert_eq!(
            derive_batch_state(&counts(&[Failed, Canceled])),
            BatchState::Canceled
        );
    }

    // -- aggregate consistency ------------------------------------------------

    #[test]
    fn counters_never_exceed_total_across_transition_sequences() {
        // Walk a batch of three through every child transition and check
        // the §-invariant at each step: completed + failed <= total, and
        // equality once everything is terminal.
        let histories: Vec<Vec<TaskState>> = vec![
            vec![Pending, Running, Completed],
            vec![Pending, Running, Failed],
            vec![Pending, Canceled],
        ];
        let max_len = histories.iter().map(Vec::len).max().unwrap();

        for step in 0..max_len {
            let snapshot: Vec<TaskState> = histories
                .iter()
                .map(|h| h[step.min(h.len() - 1)])
                .collect();
            let c = counts(&snapshot);
            assert!(c.completed + c.failed <= c.total);
        }

        let final_states: Vec<TaskState> =
            histories.iter().map(|h| *h.last().unwrap()).collect();
        let c = counts(&final_states);
        assert!(c.all_terminal());
        assert_eq!(c.completed + c.failed + c.canceled, c.total);
    }

    // -- progress_percentage --------------------------------------------------

    #[test]
    fn progress_of_untouched_batch_is_zero() {
        assert_eq!(progress_percentage(&counts(&[Pending, Pending])), 0.0);
    }

    #[test]
    fn progress_counts_terminal_children() {
        let c = counts(&[Completed, Failed, Pending]);
        assert_eq!(progress_percentage(&c), 66.67);
    }

    #[test]
    fn progress_of_finished_batch_is_one_hundred() {
        assert_eq!(progress_percentage(&counts(&[Completed, Canceled])), 100.0);
    }

    #[test]
    fn progress_of_empty_counts_is_zero() {
        assert_eq!(progress_percentage(&TaskStateCounts::default()), 0.0);
    }
}
