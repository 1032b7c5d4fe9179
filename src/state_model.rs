//! The test suite's own model of the token lifecycle.
//!
//! The API-under-test keeps its token store hidden; every actor therefore
//! tracks the state it *expects* the server to be in, and the transition
//! table below is the single source of truth the contract verifier checks
//! observed responses against.

use crate::domain::{ApiAction, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Terminated,
}

/// How the upstream dependency behaves for the request being modelled.
///
/// `Delay` means the mock's artificial delay exceeds the client deadline,
/// so the expected outcome is a client-side timeout rather than a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamBehavior {
    Success,
    Failure,
    Delay,
}

/// Whether a LOGIN on an already-authenticated token is treated as a no-op
/// or rejected. The API documentation leaves this open; both variants are
/// modelled and exercised separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatLoginPolicy {
    Idempotent,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedStatus {
    Ok,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedOutcome {
    pub next_state: SessionState,
    pub status: ExpectedStatus,
}

/// The transition table. LOGIN from `Terminated` starts a new logical
/// session, so it behaves exactly like LOGIN from `Unauthenticated`;
/// the old session is not resurrected.
pub fn expected_transition(
    state: SessionState,
    action: ApiAction,
    upstream: UpstreamBehavior,
    policy: RepeatLoginPolicy,
) -> ExpectedOutcome {
    use ApiAction::{Action, Login, Logout};
    use ExpectedStatus::{Error, Ok, Timeout};
    use SessionState::{Authenticated, Terminated, Unauthenticated};

    match (state, action) {
        (Unauthenticated | Terminated, Login) => match upstream {
            UpstreamBehavior::Success => ExpectedOutcome {
                next_state: Authenticated,
                status: Ok,
            },
            UpstreamBehavior::Failure => ExpectedOutcome {
                next_state: state,
                status: Error,
            },
            // The auth call never completed; the model cannot assume the
            // server registered the session.
            UpstreamBehavior::Delay => ExpectedOutcome {
                next_state: state,
                status: Timeout,
            },
        },
        // No upstream call is expected for these; behavior is independent
        // of the installed mock rules.
        (Unauthenticated, Action | Logout) => ExpectedOutcome {
            next_state: Unauthenticated,
            status: Error,
        },
        (Authenticated, Login) => match policy {
            RepeatLoginPolicy::Idempotent => ExpectedOutcome {
                next_state: Authenticated,
                status: Ok,
            },
            RepeatLoginPolicy::Rejected => ExpectedOutcome {
                next_state: Authenticated,
                status: Error,
            },
        },
        (Authenticated, Action) => match upstream {
            UpstreamBehavior::Success => ExpectedOutcome {
                next_state: Authenticated,
                status: Ok,
            },
            UpstreamBehavior::Failure => ExpectedOutcome {
                next_state: Authenticated,
                status: Error,
            },
            UpstreamBehavior::Delay => ExpectedOutcome {
                next_state: Authenticated,
                status: Timeout,
            },
        },
        (Authenticated, Logout) => ExpectedOutcome {
            next_state: Terminated,
            status: Ok,
        },
        // LOGOUT is one-shot: everything after it fails until a new LOGIN.
        (Terminated, Action | Logout) => ExpectedOutcome {
            next_state: Terminated,
            status: Error,
        },
    }
}

/// One actor's view of one token's lifecycle. Exclusively owned by the
/// actor driving it; never shared across actors.
#[derive(Debug, Clone)]
pub struct Session {
    token: Token,
    state: SessionState,
}

impl Session {
    pub fn new(token: Token) -> Self {
        Self {
            token,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn advance(&mut self, next: SessionState) {
        self.state = next;
    }
}
