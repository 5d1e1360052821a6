//! Session lifecycle states and the transition table.
//!
//! ```text
//!  Idle ──Connect──▶ Connecting ──Linked──▶ ServiceDiscovery ──ServicesResolved──▶ Ready ◀─┐
//!                     │  ▲  │                  │                                     │    │
//!                     │  └──┘ AttemptFailed     │ ServicesMissing / DiscoveryFailed  └────┘ Read
//!                     │ ConnectExhausted        ▼
//!                     └─────────────────────▶ Failed
//!
//!  any non-terminal state ──Close──▶ Closed
//! ```
//!
//! [`SessionState::next`] is the only place transitions are defined; the
//! session task never assigns a state directly.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a connection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    ServiceDiscovery,
    Ready,
    Closed,
    Failed,
}

/// Completions and requests that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    /// Caller asked to connect.
    Connect,
    /// A connect attempt failed and another one will follow.
    AttemptFailed,
    /// A connect attempt succeeded.
    Linked,
    /// The last allowed attempt failed, or the failure is not retryable.
    ConnectExhausted,
    /// The expected characteristic was found.
    ServicesResolved,
    /// Discovery succeeded but the expected characteristic is absent.
    ServicesMissing,
    /// Discovery itself failed or timed out.
    DiscoveryFailed,
    /// A read finished, successfully or not.
    Read,
    /// Caller asked to close.
    Close,
}

impl SessionState {
    /// Apply `input`, returning the new state or `None` if the input is not
    /// valid in this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use ems_core::state::{SessionInput, SessionState};
    ///
    /// assert_eq!(
    ///     SessionState::Idle.next(SessionInput::Connect),
    ///     Some(SessionState::Connecting)
    /// );
    /// assert_eq!(SessionState::Closed.next(SessionInput::Close), None);
    /// ```
    #[must_use]
    pub fn next(self, input: SessionInput) -> Option<SessionState> {
        use SessionInput as I;
        use SessionState as S;

        match (self, input) {
            (S::Closed | S::Failed, _) => None,
            (_, I::Close) => Some(S::Closed),

            (S::Idle, I::Connect) => Some(S::Connecting),

            (S::Connecting, I::AttemptFailed) => Some(S::Connecting),
            (S::Connecting, I::Linked) => Some(S::ServiceDiscovery),
            (S::Connecting, I::ConnectExhausted) => Some(S::Failed),

            (S::ServiceDiscovery, I::ServicesResolved) => Some(S::Ready),
            (S::ServiceDiscovery, I::ServicesMissing | I::DiscoveryFailed) => Some(S::Failed),

            (S::Ready, I::Read) => Some(S::Ready),

            _ => None,
        }
    }

    /// `Closed` and `Failed` accept no further input.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    /// Whether the session is still working towards `Ready`.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Connecting | SessionState::ServiceDiscovery
        )
    }

    pub fn is_ready(self) -> bool {
        self == SessionState::Ready
    }

    /// A link is held in these states.
    pub fn holds_link(self) -> bool {
        matches!(self, SessionState::ServiceDiscovery | SessionState::Ready)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::ServiceDiscovery => "service discovery",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionInput as I;
    use SessionState as S;

    const ALL_STATES: [SessionState; 6] = [
        S::Idle,
        S::Connecting,
        S::ServiceDiscovery,
        S::Ready,
        S::Closed,
        S::Failed,
    ];

    const ALL_INPUTS: [SessionInput; 9] = [
        I::Connect,
        I::AttemptFailed,
        I::Linked,
        I::ConnectExhausted,
        I::ServicesResolved,
        I::ServicesMissing,
        I::DiscoveryFailed,
        I::Read,
        I::Close,
    ];

    #[test]
    fn test_happy_path() {
        let mut state = S::Idle;
        for input in [I::Connect, I::Linked, I::ServicesResolved, I::Read, I::Read, I::Close] {
            state = state.next(input).unwrap();
        }
        assert_eq!(state, S::Closed);
    }

    #[test]
    fn test_retry_stays_connecting() {
        assert_eq!(S::Connecting.next(I::AttemptFailed), Some(S::Connecting));
        assert_eq!(S::Connecting.next(I::ConnectExhausted), Some(S::Failed));
    }

    #[test]
    fn test_discovery_failures() {
        assert_eq!(S::ServiceDiscovery.next(I::ServicesMissing), Some(S::Failed));
        assert_eq!(S::ServiceDiscovery.next(I::DiscoveryFailed), Some(S::Failed));
    }

    #[test]
    fn test_failed_only_from_connecting_or_discovery() {
        for state in ALL_STATES {
            for input in ALL_INPUTS {
                if state.next(input) == Some(S::Failed) {
                    assert!(
                        matches!(state, S::Connecting | S::ServiceDiscovery),
                        "{state:?} --{input:?}--> Failed"
                    );
                }
            }
        }
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for state in [S::Closed, S::Failed] {
            assert!(state.is_terminal());
            for input in ALL_INPUTS {
                assert_eq!(state.next(input), None, "{state:?} accepted {input:?}");
            }
        }
    }

    #[test]
    fn test_close_from_every_live_state() {
        for state in ALL_STATES.into_iter().filter(|s| !s.is_terminal()) {
            assert_eq!(state.next(I::Close), Some(S::Closed));
        }
    }

    #[test]
    fn test_read_only_when_ready() {
        for state in ALL_STATES {
            let expected = (state == S::Ready).then_some(S::Ready);
            assert_eq!(state.next(I::Read), expected, "{state:?}");
        }
    }

    #[test]
    fn test_connect_only_from_idle() {
        for state in ALL_STATES {
            let expected = (state == S::Idle).then_some(S::Connecting);
            assert_eq!(state.next(I::Connect), expected, "{state:?}");
        }
    }

    #[test]
    fn test_predicates() {
        assert!(S::Connecting.is_pending());
        assert!(!S::Ready.is_pending());
        assert!(S::Ready.is_ready());
        assert!(S::ServiceDiscovery.holds_link());
        assert!(!S::Failed.holds_link());
    }

    #[test]
    fn test_display_and_serde() {
        assert_eq!(S::ServiceDiscovery.to_string(), "service discovery");
        assert_eq!(
            serde_json::to_string(&S::ServiceDiscovery).unwrap(),
            "\"service_discovery\""
        );
    }
}
