//! Task state machine rules and progress bookkeeping.
//!
//! A task is one source-pair + one template + one resolved mapping
//! producing one result image. The database stores the state; this module
//! owns the transition table and the progress invariants.

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Task execution state.
///
/// `Completed`, `Failed`, and `Canceled` are terminal. Only `Pending` and
/// `Canceled` are reachable from outside the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    /// True for states that never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Human-readable label for display and logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

/// Whether `from -> to` is a legal transition.
///
/// - `Pending -> Running` (executor pickup)
/// - `Running -> Completed | Failed` (executor outcome)
/// - `Pending | Running -> Canceled` (cancel request; cooperative while
///   running)
pub fn can_transition(from: TaskState, to: TaskState) -> bool {
    use TaskState::*;
    matches!(
        (from, to),
        (Pending, Running)
            | (Running, Completed)
            | (Running, Failed)
            | (Pending, Canceled)
            | (Running, Canceled)
    )
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress reported immediately after pickup, before any swap call.
pub const PROGRESS_STARTED: i16 = 10;

/// Progress reported after the last swap, while the result is persisted.
pub const PROGRESS_PERSISTING: i16 = 90;

/// Progress at completion. Always exactly this value on `Completed`.
pub const PROGRESS_DONE: i16 = 100;

/// Whether a progress update is acceptable in the given state.
///
/// Progress is 0 while `Pending`, monotonically non-decreasing while
/// `Running`, and must be exactly 100 on `Completed`.
pub fn progress_allowed(state: TaskState, current: i16, proposed: i16) -> bool {
    match state {
        TaskState::Pending => proposed == 0,
        TaskState::Running => (current..=PROGRESS_DONE).contains(&proposed),
        TaskState::Completed => proposed == PROGRESS_DONE,
        TaskState::Failed | TaskState::Canceled => proposed == current,
    }
}

/// Coarse progress for having applied `done` of `total` mapping rules,
/// interpolated between [`PROGRESS_STARTED`] and [`PROGRESS_PERSISTING`].
pub fn rule_progress(done: usize, total: usize) -> i16 {
    if total == 0 || done == 0 {
        return PROGRESS_STARTED;
    }
    let done = done.min(total);
    let span = (PROGRESS_PERSISTING - PROGRESS_STARTED) as usize;
    PROGRESS_STARTED + (span * done / total) as i16
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use TaskState::*;

    const ALL: [TaskState; 5] = [Pending, Running, Completed, Failed, Canceled];

    // -- transitions ----------------------------------------------------------

    #[test]
    fn pickup_and_outcomes_are_legal() {
        assert!(can_transition(Pending, Running));
        assert!(can_transition(Running, Completed));
        assert!(can_transition(Running, Failed));
    }

    #[test]
    fn cancel_is_legal_from_pending_and_running() {
        assert!(can_transition(Pending, Canceled));
        assert!(can_transition(Running, Canceled));
    }

    #[test]
    fn terminal_states_never_transition() {
        for from in [Completed, Failed, Canceled] {
            for to in ALL {
                assert!(!can_transition(from, to), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn pending_cannot_jump_to_terminal_outcomes() {
        assert!(!can_transition(Pending, Completed));
        assert!(!can_transition(Pending, Failed));
    }

    #[test]
    fn no_self_transitions() {
        for s in ALL {
            assert!(!can_transition(s, s));
        }
    }

    #[test]
    fn terminal_flag_matches_state_set() {
        assert!(!Pending.is_terminal());
        assert!(!Running.is_terminal());
        assert!(Completed.is_terminal());
        assert!(Failed.is_terminal());
        assert!(Canceled.is_terminal());
    }

    // -- progress -------------------------------------------------------------

    #[test]
    fn pending_progress_must_stay_zero() {
        assert!(progress_allowed(Pending, 0, 0));
        assert!(!progress_allowed(Pending, 0, 10));
    }

    #[test]
    fn running_progress_is_monotonic() {
        assert!(progress_allowed(Running, 10, 10));
        assert!(progress_allowed(Running, 10, 50));
        assert!(!progress_allowed(Running, 50, 40));
    }

    #[test]
    fn completed_progress_is_exactly_one_hundred() {
        assert!(progress_allowed(Completed, 100, 100));
        assert!(!progress_allowed(Completed, 100, 99));
    }

    #[test]
    fn rule_progress_interpolates_between_start_and_persist() {
        assert_eq!(rule_progress(0, 4), PROGRESS_STARTED);
        assert_eq!(rule_progress(2, 4), 50);
        assert_eq!(rule_progress(4, 4), PROGRESS_PERSISTING);
    }

    #[test]
    fn rule_progress_handles_empty_mapping() {
        assert_eq!(rule_progress(0, 0), PROGRESS_STARTED);
    }

    #[test]
    fn rule_progress_clamps_overcount() {
        assert_eq!(rule_progress(9, 4), PROGRESS_PERSISTING);
    }
}
