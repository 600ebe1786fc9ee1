//! Signals sent to the presentation surface.
//!
//! Each signal is fire-and-forget and serialises as
//! `{"channel": "<name>", "payload": {...}}` with the channel names the popup
//! UI subscribes to:
//!
//! | Channel            | Payload                                   |
//! |--------------------|-------------------------------------------|
//! | `wake-word`        | `{ keyword, detectedAt }`                 |
//! | `ai:response`      | `{ message, raw?, error? }`               |
//! | `popup:visibility` | `{ visible, reason }`                     |

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Why the popup changed visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityReason {
    Wakeword,
    Error,
    Response,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WakeWordPayload {
    pub keyword: String,
    /// Milliseconds since the Unix epoch.
    pub detected_at: u64,
}

impl WakeWordPayload {
    pub fn new(keyword: impl Into<String>, detected_at: SystemTime) -> Self {
        let detected_at = detected_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            keyword: keyword.into(),
            detected_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponsePayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AiResponsePayload {
    pub fn success(message: impl Into<String>, raw: Option<serde_json::Value>) -> Self {
        Self {
            message: message.into(),
            raw,
            error: None,
        }
    }

    /// Failure payload: empty message, populated error.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            message: String::new(),
            raw: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityPayload {
    pub visible: bool,
    pub reason: VisibilityReason,
}

/// One signal on its channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload")]
pub enum SurfaceEvent {
    #[serde(rename = "wake-word")]
    WakeWord(WakeWordPayload),
    #[serde(rename = "ai:response")]
    AiResponse(AiResponsePayload),
    #[serde(rename = "popup:visibility")]
    Visibility(VisibilityPayload),
}

impl SurfaceEvent {
    pub fn channel(&self) -> &'static str {
        match self {
            SurfaceEvent::WakeWord(_) => "wake-word",
            SurfaceEvent::AiResponse(_) => "ai:response",
            SurfaceEvent::Visibility(_) => "popup:visibility",
        }
    }
}
