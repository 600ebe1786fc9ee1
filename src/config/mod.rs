//! Configuration for the Aurora voice session.
//!
//! Provides `AppConfig` (top-level settings), one sub-config per subsystem,
//! `AppPaths` for the platform config directory, TOML persistence via
//! `AppConfig::load` / `AppConfig::save`, and the environment overrides
//! applied on top by `AppConfig::load` before relative paths are resolved.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioConfig, ConfigError, RecordingConfig, SessionConfig, VoiceApiConfig,
    WakeWordConfig,
};
