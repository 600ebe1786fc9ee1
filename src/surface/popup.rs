//! Popup visibility control.
//!
//! [`Popup`] turns show / hide requests into [`SurfaceEvent`]s.  At most one
//! delayed hide is pending: `hide_after` replaces the previous timer, and
//! `show` or `hide` cancel it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::events::{
    AiResponsePayload, SurfaceEvent, VisibilityPayload, VisibilityReason, WakeWordPayload,
};

pub struct Popup {
    tx: mpsc::UnboundedSender<SurfaceEvent>,
    visible: Arc<AtomicBool>,
    hide_timer: Option<JoinHandle<()>>,
}

impl Popup {
    /// Create a hidden popup and the receiver the surface reads from.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let popup = Self {
            tx,
            visible: Arc::new(AtomicBool::new(false)),
            hide_timer: None,
        };
        (popup, rx)
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    pub fn show(&mut self, reason: VisibilityReason) {
        self.cancel_hide();
        set_visibility(&self.tx, &self.visible, true, reason);
    }

    pub fn hide(&mut self, reason: VisibilityReason) {
        self.cancel_hide();
        set_visibility(&self.tx, &self.visible, false, reason);
    }

    /// Hide after `delay`, replacing any pending delayed hide.
    pub fn hide_after(&mut self, reason: VisibilityReason, delay: Duration) {
        self.cancel_hide();
        let tx = self.tx.clone();
        let visible = Arc::clone(&self.visible);
        self.hide_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            set_visibility(&tx, &visible, false, reason);
        }));
    }

    pub fn send_wake_word(&self, payload: WakeWordPayload) {
        self.send(SurfaceEvent::WakeWord(payload));
    }

    pub fn send_ai_response(&self, payload: AiResponsePayload) {
        self.send(SurfaceEvent::AiResponse(payload));
    }

    fn send(&self, event: SurfaceEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("surface: no receiver, signal dropped");
        }
    }

    fn cancel_hide(&mut self) {
        if let Some(timer) = self.hide_timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Popup {
    fn drop(&mut self) {
        self.cancel_hide();
    }
}

fn set_visibility(
    tx: &mpsc::UnboundedSender<SurfaceEvent>,
    visible: &AtomicBool,
    value: bool,
    reason: VisibilityReason,
) {
    visible.store(value, Ordering::SeqCst);
    let _ = tx.send(SurfaceEvent::Visibility(VisibilityPayload {
        visible: value,
        reason,
    }));
}
