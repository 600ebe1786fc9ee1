//! Application settings structs, defaults, environment overrides and TOML
//! persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files.  Every section is
//! `#[serde(default)]`, so a partial `settings.toml` only overrides what it
//! names.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::AppPaths;
use crate::audio::RecorderConfig;
use crate::wakeword::WakeWordOptions;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A loaded configuration that cannot drive a session.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("voice_api.base_url is not set (AURORA_WORKER_URL)")]
    MissingBaseUrl,

    #[error("wake_word.access_key is not set (PORCUPINE_ACCESS_KEY)")]
    MissingAccessKey,

    #[error("wake_word.keyword_paths is empty (PORCUPINE_KEYWORD_PATH)")]
    MissingKeyword,

    #[error("wake_word.sensitivity must be within [0, 1], got {0}")]
    InvalidSensitivity(f32),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

// ---------------------------------------------------------------------------
// VoiceApiConfig
// ---------------------------------------------------------------------------

/// Remote inference endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceApiConfig {
    /// Service root; requests go to `{base_url}/api/voice`.
    pub base_url: String,
    /// Bearer token; `None` or empty sends no `Authorization` header.
    pub token: Option<String>,
    /// Abort the request after this many milliseconds.
    pub timeout_ms: u64,
}

impl Default for VoiceApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            timeout_ms: 20_000,
        }
    }
}

// ---------------------------------------------------------------------------
// WakeWordConfig
// ---------------------------------------------------------------------------

/// Acoustic model credentials and keyword files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeWordConfig {
    pub access_key: String,
    /// `.ppn` keyword files.  Relative paths are resolved against the config
    /// directory.
    pub keyword_paths: Vec<PathBuf>,
    /// Applied to every keyword.
    pub sensitivity: f32,
    pub model_path: Option<PathBuf>,
    /// Label shown with a detection.
    pub keyword_label: String,
}

impl Default for WakeWordConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            keyword_paths: Vec::new(),
            sensitivity: 0.6,
            model_path: None,
            keyword_label: "Hey Aurora".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingConfig
// ---------------------------------------------------------------------------

/// Voice-activity gating for utterance capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Quiet time after speech that ends the recording.
    pub silence_ms: u64,
    /// Hard cap on a recording.
    pub max_duration_ms: u64,
    /// Raw 16-bit sample magnitude that counts as speech.
    pub amplitude_threshold: u16,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            silence_ms: 1_200,
            max_duration_ms: 10_000,
            amplitude_threshold: 1_300,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Input device selection, shared by the wake-word engine and the recorder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name; `None` means the system default.
    pub device: Option<String>,
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay before the popup hides after a response or error.
    pub hide_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hide_delay_ms: 4_000,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Loading
///
/// ```rust,no_run
/// use aurora_voice::config::AppConfig;
///
/// // File (defaults when missing), then environment, then path resolution.
/// let config = AppConfig::load().unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub voice_api: VoiceApiConfig,
    pub wake_word: WakeWordConfig,
    pub recorder: RecordingConfig,
    pub audio: AudioConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    /// Load the platform-appropriate `settings.toml` and apply environment
    /// overrides.
    ///
    /// Starts from `AppConfig::default()` when the file does not exist yet.
    /// Relative paths, from the file or the environment, are resolved
    /// against the config directory.
    pub fn load() -> Result<Self> {
        let paths = AppPaths::new();
        Self::load_with(&paths.settings_file, &paths.config_dir, |name| {
            std::env::var(name).ok()
        })
    }

    /// Defaults plus environment overrides, for when the file is unusable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(&AppPaths::new().config_dir, |name| std::env::var(name).ok());
        config
    }

    /// [`load`](Self::load) with explicit sources.
    pub fn load_with(
        settings_file: &Path,
        config_dir: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = Self::load_from(settings_file)?;
        config.apply_overrides(config_dir, lookup);
        Ok(config)
    }

    /// Apply `lookup` overrides, then resolve relative paths against
    /// `config_dir`.
    pub fn apply_overrides(
        &mut self,
        config_dir: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) {
        self.apply_env_from(lookup);
        self.resolve_paths(config_dir);
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Environment overrides
    // -----------------------------------------------------------------------

    /// Apply overrides from `lookup`.  Empty values are ignored and an
    /// unparseable number keeps the current value.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("AURORA_WORKER_URL") {
            self.voice_api.base_url = url;
        }
        if let Some(token) = get("AURORA_WORKER_TOKEN") {
            self.voice_api.token = Some(token);
        }
        if let Some(key) = get("PORCUPINE_ACCESS_KEY") {
            self.wake_word.access_key = key;
        }
        if let Some(path) = get("PORCUPINE_KEYWORD_PATH") {
            self.wake_word.keyword_paths = vec![PathBuf::from(path)];
        }
        if let Some(path) = get("PORCUPINE_MODEL_PATH") {
            self.wake_word.model_path = Some(PathBuf::from(path));
        }
        if let Some(device) = get("AUDIO_INPUT_DEVICE") {
            self.audio.device = Some(device);
        }

        parse_into(get("PORCUPINE_SENSITIVITY"), &mut self.wake_word.sensitivity);
        parse_into(get("RECORDER_SILENCE_MS"), &mut self.recorder.silence_ms);
        parse_into(get("RECORDER_MAX_MS"), &mut self.recorder.max_duration_ms);
        parse_into(get("RECORDER_THRESHOLD"), &mut self.recorder.amplitude_threshold);
    }

    /// Make relative keyword/model paths absolute under `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.wake_word.keyword_paths.iter_mut().for_each(resolve);
        if let Some(model) = self.wake_word.model_path.as_mut() {
            resolve(model);
        }
    }

    // -----------------------------------------------------------------------
    // Validation / derived settings
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.voice_api.base_url.trim().is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        if self.wake_word.access_key.trim().is_empty() {
            return Err(ConfigError::MissingAccessKey);
        }
        if self.wake_word.keyword_paths.is_empty() {
            return Err(ConfigError::MissingKeyword);
        }
        if !(0.0..=1.0).contains(&self.wake_word.sensitivity) {
            return Err(ConfigError::InvalidSensitivity(self.wake_word.sensitivity));
        }
        if self.recorder.silence_ms == 0 {
            return Err(ConfigError::ZeroDuration("recorder.silence_ms"));
        }
        if self.recorder.max_duration_ms == 0 {
            return Err(ConfigError::ZeroDuration("recorder.max_duration_ms"));
        }
        if self.voice_api.timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("voice_api.timeout_ms"));
        }
        Ok(())
    }

    /// Detector options, one sensitivity per keyword.
    pub fn wake_word_options(&self) -> WakeWordOptions {
        WakeWordOptions {
            access_key: self.wake_word.access_key.clone(),
            keyword_paths: self.wake_word.keyword_paths.clone(),
            sensitivities: vec![self.wake_word.sensitivity; self.wake_word.keyword_paths.len()],
            model_path: self.wake_word.model_path.clone(),
        }
    }

    /// Recorder parameters at the detector's `sample_rate`.
    pub fn recorder_config(&self, sample_rate: u32) -> RecorderConfig {
        RecorderConfig {
            sample_rate,
            silence_duration: Duration::from_millis(self.recorder.silence_ms),
            max_duration: Duration::from_millis(self.recorder.max_duration_ms),
            amplitude_threshold: self.recorder.amplitude_threshold,
            device: self.audio.device.clone(),
        }
    }

    pub fn hide_delay(&self) -> Duration {
        Duration::from_millis(self.session.hide_delay_ms)
    }
}

fn parse_into<T: std::str::FromStr>(value: Option<String>, slot: &mut T) {
    let Some(raw) = value else {
        return;
    };
    match raw.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => log::warn!("config: ignoring unparseable override {raw:?}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn valid() -> AppConfig {
        let mut config = AppConfig::default();
        config.apply_env_from(env(&[
            ("AURORA_WORKER_URL", "https://worker.test"),
            ("PORCUPINE_ACCESS_KEY", "key"),
            ("PORCUPINE_KEYWORD_PATH", "/kw/hey-aurora.ppn"),
        ]));
        config
    }

    // ---- persistence -------------------------------------------------------

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let mut original = valid();
        original.voice_api.token = Some("t".into());
        original.audio.device = Some("USB Mic".into());
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(loaded, original);
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let config = AppConfig::load_from(&dir.path().join("nope.toml")).expect("no error");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[recorder]\nsilence_ms = 800\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.recorder.silence_ms, 800);
        assert_eq!(config.recorder.max_duration_ms, 10_000);
        assert_eq!(config.voice_api.timeout_ms, 20_000);
        assert_eq!(config.wake_word.keyword_label, "Hey Aurora");
    }

    // ---- environment -------------------------------------------------------

    #[test]
    fn env_overrides_every_field() {
        let mut config = AppConfig::default();
        config.apply_env_from(env(&[
            ("AURORA_WORKER_URL", "https://worker.test"),
            ("AURORA_WORKER_TOKEN", "tok"),
            ("PORCUPINE_ACCESS_KEY", "key"),
            ("PORCUPINE_KEYWORD_PATH", "kw.ppn"),
            ("PORCUPINE_MODEL_PATH", "model.pv"),
            ("PORCUPINE_SENSITIVITY", "0.8"),
            ("RECORDER_SILENCE_MS", "900"),
            ("RECORDER_MAX_MS", "7000"),
            ("RECORDER_THRESHOLD", "2000"),
            ("AUDIO_INPUT_DEVICE", "USB Mic"),
        ]));

        assert_eq!(config.voice_api.base_url, "https://worker.test");
        assert_eq!(config.voice_api.token.as_deref(), Some("tok"));
        assert_eq!(config.wake_word.access_key, "key");
        assert_eq!(config.wake_word.keyword_paths, vec![PathBuf::from("kw.ppn")]);
        assert_eq!(config.wake_word.model_path, Some(PathBuf::from("model.pv")));
        assert_eq!(config.wake_word.sensitivity, 0.8);
        assert_eq!(config.recorder.silence_ms, 900);
        assert_eq!(config.recorder.max_duration_ms, 7_000);
        assert_eq!(config.recorder.amplitude_threshold, 2_000);
        assert_eq!(config.audio.device.as_deref(), Some("USB Mic"));
    }

    #[test]
    fn bad_numbers_and_empty_values_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_env_from(env(&[
            ("RECORDER_SILENCE_MS", "soon"),
            ("RECORDER_THRESHOLD", "-5"),
            ("AURORA_WORKER_URL", "   "),
        ]));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let mut config = valid();
        config.wake_word.keyword_paths = vec!["kw.ppn".into(), "/abs/kw.ppn".into()];
        config.wake_word.model_path = Some("model.pv".into());

        config.resolve_paths(Path::new("/etc/aurora"));
        assert_eq!(
            config.wake_word.keyword_paths,
            vec![PathBuf::from("/etc/aurora/kw.ppn"), PathBuf::from("/abs/kw.ppn")]
        );
        assert_eq!(
            config.wake_word.model_path,
            Some(PathBuf::from("/etc/aurora/model.pv"))
        );
    }

    #[test]
    fn relative_env_paths_resolve_against_config_dir() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[wake_word]\nkeyword_paths = [\"file-kw.ppn\"]\n").unwrap();

        let config = AppConfig::load_with(
            &path,
            dir.path(),
            env(&[
                ("PORCUPINE_KEYWORD_PATH", "env-kw.ppn"),
                ("PORCUPINE_MODEL_PATH", "models/env.pv"),
            ]),
        )
        .unwrap();

        assert_eq!(
            config.wake_word.keyword_paths,
            vec![dir.path().join("env-kw.ppn")]
        );
        assert!(config.wake_word.keyword_paths[0].is_absolute());
        assert_eq!(
            config.wake_word.model_path,
            Some(dir.path().join("models/env.pv"))
        );
    }

    #[test]
    fn file_paths_resolve_without_env_overrides() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[wake_word]\nkeyword_paths = [\"file-kw.ppn\"]\n").unwrap();

        let config = AppConfig::load_with(&path, dir.path(), env(&[])).unwrap();
        assert_eq!(
            config.wake_word.keyword_paths,
            vec![dir.path().join("file-kw.ppn")]
        );
    }

    // ---- validation --------------------------------------------------------

    #[test]
    fn validate_accepts_complete_config() {
        assert_eq!(valid().validate(), Ok(()));
    }

    #[test]
    fn validate_reports_missing_fields() {
        let config = AppConfig::default();
        assert_eq!(config.validate(), Err(ConfigError::MissingBaseUrl));

        let mut config = valid();
        config.wake_word.access_key.clear();
        assert_eq!(config.validate(), Err(ConfigError::MissingAccessKey));

        let mut config = valid();
        config.wake_word.keyword_paths.clear();
        assert_eq!(config.validate(), Err(ConfigError::MissingKeyword));
    }

    #[test]
    fn validate_rejects_out_of_range_sensitivity() {
        let mut config = valid();
        config.wake_word.sensitivity = 1.2;
        assert_eq!(config.validate(), Err(ConfigError::InvalidSensitivity(1.2)));
    }

    #[test]
    fn derived_settings_follow_config() {
        let mut config = valid();
        config.audio.device = Some("USB Mic".into());

        let rec = config.recorder_config(16_000);
        assert_eq!(rec.silence_duration, Duration::from_millis(1_200));
        assert_eq!(rec.max_duration, Duration::from_millis(10_000));
        assert_eq!(rec.amplitude_threshold, 1_300);
        assert_eq!(rec.device.as_deref(), Some("USB Mic"));

        let opts = config.wake_word_options();
        assert_eq!(opts.sensitivities, vec![0.6]);
        assert_eq!(config.hide_delay(), Duration::from_millis(4_000));
    }
}
