//! Remote voice inference.
//!
//! [`InferenceClient`] is the seam used by the session orchestrator;
//! [`HttpVoiceClient`] is the reqwest-backed production implementation.

pub mod client;

pub use client::{HttpVoiceClient, InferenceClient, VoiceApiError, VoiceResponse};
