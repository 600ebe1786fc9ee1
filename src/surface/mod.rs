//! Presentation surface.
//!
//! The popup UI is an external collaborator; the session only pushes
//! [`SurfaceEvent`]s at it through a [`Popup`] and never waits for an answer.
//! The binary forwards these events as JSON lines on stdout.

pub mod events;
pub mod popup;

pub use events::{
    AiResponsePayload, SurfaceEvent, VisibilityPayload, VisibilityReason, WakeWordPayload,
};
pub use popup::Popup;
