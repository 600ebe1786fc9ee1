//! Aurora voice session: wake word → utterance capture → remote voice API →
//! popup signals.

pub mod audio;
pub mod config;
pub mod session;
pub mod surface;
pub mod voice_api;
pub mod wakeword;
