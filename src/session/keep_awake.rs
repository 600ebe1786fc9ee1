//! Keep-awake lock held for the duration of an interaction.
//!
//! [`KeepAwake`] implementations must make `acquire` a no-op while held and
//! `release` a no-op while not held.  [`KeepAwakeGuard`] releases on drop, so
//! the lock cannot outlive the interaction that took it.  `release` never
//! blocks; it is called from `Drop` inside async code.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::{Child, Command};

/// How long a freshly spawned inhibitor must survive to count as holding
/// the lock.
const STARTUP_GRACE: Duration = Duration::from_millis(150);

#[derive(Debug, Error)]
pub enum KeepAwakeError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited immediately ({status})")]
    Exited { program: String, status: String },
}

/// A host-wide "do not sleep" lock.
#[async_trait]
pub trait KeepAwake: Send + Sync {
    async fn acquire(&self) -> Result<(), KeepAwakeError>;
    fn release(&self);
    fn is_held(&self) -> bool;
}

// ---------------------------------------------------------------------------
// KeepAwakeGuard
// ---------------------------------------------------------------------------

/// Holds the lock until dropped.  A failed acquire is logged, not fatal.
pub struct KeepAwakeGuard {
    lock: Arc<dyn KeepAwake>,
}

impl KeepAwakeGuard {
    pub async fn acquire(lock: Arc<dyn KeepAwake>) -> Self {
        match lock.acquire().await {
            Ok(()) => log::debug!("session: keep-awake acquired"),
            Err(e) => log::warn!("session: keep-awake unavailable: {e}"),
        }
        Self { lock }
    }
}

impl Drop for KeepAwakeGuard {
    fn drop(&mut self) {
        if self.lock.is_held() {
            self.lock.release();
            log::debug!("session: keep-awake released");
        }
    }
}

// ---------------------------------------------------------------------------
// SystemInhibitor
// ---------------------------------------------------------------------------

/// Keeps the host awake by running the platform's inhibitor tool
/// (`systemd-inhibit` on Linux, `caffeinate` on macOS) around `cat`.
///
/// The inhibitor lives exactly as long as `cat`, and `cat` lives until its
/// piped stdin is closed, so releasing the lock is closing one pipe.  The
/// exited processes are reaped by tokio in the background.
#[derive(Debug)]
pub struct SystemInhibitor {
    command: Option<(String, Vec<String>)>,
    child: Mutex<Option<Child>>,
}

impl Default for SystemInhibitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemInhibitor {
    /// The inhibitor for this platform; a no-op lock where unsupported.
    pub fn new() -> Self {
        const LINUX_ARGS: &[&str] = &[
            "--what=idle:sleep",
            "--who=aurora",
            "--why=voice interaction in progress",
            "--mode=block",
            "cat",
        ];
        const MACOS_ARGS: &[&str] = &["-d", "-i", "cat"];

        if cfg!(target_os = "linux") {
            Self::with_command("systemd-inhibit", LINUX_ARGS)
        } else if cfg!(target_os = "macos") {
            Self::with_command("caffeinate", MACOS_ARGS)
        } else {
            Self {
                command: None,
                child: Mutex::new(None),
            }
        }
    }

    /// Hold the lock by running `program args...` with stdin piped.  The
    /// command must keep running until stdin closes.
    pub fn with_command(program: &str, args: &[&str]) -> Self {
        Self {
            command: Some((
                program.to_string(),
                args.iter().map(|a| a.to_string()).collect(),
            )),
            child: Mutex::new(None),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl KeepAwake for SystemInhibitor {
    async fn acquire(&self) -> Result<(), KeepAwakeError> {
        if self.is_held() {
            return Ok(());
        }
        let Some((program, args)) = &self.command else {
            log::warn!("session: no keep-awake backend on this platform");
            return Ok(());
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|source| KeepAwakeError::Spawn {
                program: program.clone(),
                source,
            })?;

        // An inhibitor that cannot reach its service exits right away.
        if let Ok(status) = tokio::time::timeout(STARTUP_GRACE, child.wait()).await {
            let status = match status {
                Ok(status) => status.to_string(),
                Err(e) => e.to_string(),
            };
            return Err(KeepAwakeError::Exited {
                program: program.clone(),
                status,
            });
        }

        let mut slot = self.slot();
        if slot.is_none() {
            *slot = Some(child);
        }
        // Otherwise a concurrent acquire won; dropping ours closes its stdin.
        Ok(())
    }

    fn release(&self) {
        if let Some(mut child) = self.slot().take() {
            // EOF on stdin ends `cat`, and the inhibitor with it.
            drop(child.stdin.take());
        }
    }

    fn is_held(&self) -> bool {
        let mut slot = self.slot();
        let exited = match slot.as_mut() {
            Some(child) => !matches!(child.try_wait(), Ok(None)),
            None => return false,
        };
        if exited {
            log::warn!("session: keep-awake process exited on its own");
            *slot = None;
        }
        !exited
    }
}

impl Drop for SystemInhibitor {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// CountingKeepAwake (tests only)
// ---------------------------------------------------------------------------

/// Counts real transitions; repeated acquire/release calls are not counted.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct CountingKeepAwake {
    held: std::sync::atomic::AtomicBool,
    acquired: std::sync::atomic::AtomicUsize,
    released: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl CountingKeepAwake {
    pub fn acquired(&self) -> usize {
        self.acquired.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl KeepAwake for CountingKeepAwake {
    async fn acquire(&self) -> Result<(), KeepAwakeError> {
        use std::sync::atomic::Ordering;
        if !self.held.swap(true, Ordering::SeqCst) {
            self.acquired.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn release(&self) {
        use std::sync::atomic::Ordering;
        if self.held.swap(false, Ordering::SeqCst) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_held(&self) -> bool {
        self.held.load(std::sync::atomic::Ordering::SeqCst)
    }
}
