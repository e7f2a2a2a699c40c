//! Batch state machine
//!
//! Pure state machine: receives events, returns the new state. The pipeline
//! performs the I/O and feeds the outcome back in, so tests can assert the
//! exact halt point.
//!
//! Transitions:
//! - Running → Running (account committed, or commit incomplete)
//! - Running → HaltedOnError (authentication failed)
//! - Running → Drained (queue exhausted)
//! - HaltedOnError / Drained are terminal and ignore further events

use authenticator::AuthError;

/// Where a batch run stands.
#[derive(Debug)]
pub enum BatchState {
    Running {
        committed: usize,
    },
    HaltedOnError {
        committed: usize,
        identifier: String,
        error: AuthError,
    },
    Drained {
        committed: usize,
    },
}

impl BatchState {
    pub fn label(&self) -> &'static str {
        match self {
            BatchState::Running { .. } => "running",
            BatchState::HaltedOnError { .. } => "halted_on_error",
            BatchState::Drained { .. } => "drained",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchState::Running { .. })
    }

    /// Accounts fully committed so far.
    pub fn committed(&self) -> usize {
        match self {
            BatchState::Running { committed }
            | BatchState::HaltedOnError { committed, .. }
            | BatchState::Drained { committed } => *committed,
        }
    }
}

/// Outcome of one pipeline step.
#[derive(Debug)]
pub enum BatchEvent {
    /// All three ledger writes succeeded.
    AccountCommitted,
    /// Login succeeded but a ledger write failed; the account stays pending.
    CommitIncomplete,
    AuthenticationFailed {
        identifier: String,
        error: AuthError,
    },
    QueueExhausted,
}

/// Apply `event` to `state`. No I/O.
pub fn transition(state: BatchState, event: BatchEvent) -> BatchState {
    match (state, event) {
        (BatchState::Running { committed }, BatchEvent::AccountCommitted) => {
            BatchState::Running {
                committed: committed + 1,
            }
        }
        (running @ BatchState::Running { .. }, BatchEvent::CommitIncomplete) => running,
        (
            BatchState::Running { committed },
            BatchEvent::AuthenticationFailed { identifier, error },
        ) => BatchState::HaltedOnError {
            committed,
            identifier,
            error,
        },
        (BatchState::Running { committed }, BatchEvent::QueueExhausted) => {
            BatchState::Drained { committed }
        }
        (terminal, _) => terminal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commits_accumulate_until_drained() {
        let mut state = BatchState::Running { committed: 0 };
        state = transition(state, BatchEvent::AccountCommitted);
        state = transition(state, BatchEvent::CommitIncomplete);
        state = transition(state, BatchEvent::AccountCommitted);
        state = transition(state, BatchEvent::QueueExhausted);

        assert!(matches!(state, BatchState::Drained { committed: 2 }));
        assert!(state.is_terminal());
        assert_eq!(state.label(), "drained");
    }

    #[test]
    fn authentication_failure_halts() {
        let state = transition(
            BatchState::Running { committed: 1 },
            BatchEvent::AuthenticationFailed {
                identifier: "y".into(),
                error: AuthError::new("login", "banned").with_status(403),
            },
        );

        match &state {
            BatchState::HaltedOnError {
                committed,
                identifier,
                error,
            } => {
                assert_eq!(*committed, 1);
                assert_eq!(identifier, "y");
                assert_eq!(error.http_status, Some(403));
            }
            other => panic!("expected HaltedOnError, got {other:?}"),
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn terminal_states_ignore_events() {
        let drained = transition(
            BatchState::Drained { committed: 3 },
            BatchEvent::AccountCommitted,
        );
        assert!(matches!(drained, BatchState::Drained { committed: 3 }));

        let halted = transition(
            BatchState::HaltedOnError {
                committed: 0,
                identifier: "x".into(),
                error: AuthError::new("login", "nope"),
            },
            BatchEvent::QueueExhausted,
        );
        assert_eq!(halted.label(), "halted_on_error");
        assert_eq!(halted.committed(), 0);
    }

    #[test]
    fn running_is_not_terminal() {
        assert!(!BatchState::Running { committed: 0 }.is_terminal());
    }
}
