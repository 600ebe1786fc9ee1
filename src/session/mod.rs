//! Voice session: single-flight interaction protocol.
//!
//! - [`state`] — [`SessionGate`] / [`SessionToken`], the idle/busy flag.
//! - [`keep_awake`] — host sleep inhibition held during an interaction.
//! - [`orchestrator`] — [`SessionOrchestrator`], which sequences the wake-word
//!   engine, recorder, voice API and popup.

pub mod keep_awake;
pub mod orchestrator;
pub mod state;

pub use keep_awake::{KeepAwake, KeepAwakeError, KeepAwakeGuard, SystemInhibitor};
pub use orchestrator::{SessionError, SessionOrchestrator, SessionSettings};
pub use state::{SessionGate, SessionState, SessionToken};
