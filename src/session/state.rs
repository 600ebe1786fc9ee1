//! Single-flight session gate.
//!
//! [`SessionGate::try_acquire`] hands out at most one [`SessionToken`] at a
//! time.  The session is busy exactly while the token is alive; dropping it
//! (on any exit path, including a cancelled future) returns the gate to idle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Busy,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Busy => "busy",
        }
    }
}

/// Process-wide busy flag behind a token API.
#[derive(Debug, Clone, Default)]
pub struct SessionGate {
    busy: Arc<AtomicBool>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the session.  `None` while another token is alive.
    pub fn try_acquire(&self) -> Option<SessionToken> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SessionToken {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn state(&self) -> SessionState {
        if self.busy.load(Ordering::Acquire) {
            SessionState::Busy
        } else {
            SessionState::Idle
        }
    }
}

/// Proof of the one in-flight interaction.  Releases the gate on drop.
#[must_use = "the session is released as soon as the token is dropped"]
#[derive(Debug)]
pub struct SessionToken {
    busy: Arc<AtomicBool>,
}

impl Drop for SessionToken {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
