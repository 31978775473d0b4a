//! Input injection contract: typing a scanned code into the focused window.
//!
//! The relay only knows the [`InputInjector`] trait.  The platform backends
//! (SendInput, CoreGraphics, XTest) live in the infrastructure
//! layer, so the relay's correctness never depends on an automation library
//! being present and tests can substitute a fake.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Error type for input injection.
#[derive(Debug, Error, PartialEq)]
pub enum InjectionError {
    /// The OS refused synthetic input, or the backend is missing.
    #[error("input injection unavailable: {0}")]
    Unavailable(String),

    /// Nothing to type.
    #[error("refusing to inject empty text")]
    EmptyText,

    /// The backend did not finish within the allotted time.
    #[error("input injection timed out after {0:?}")]
    TimedOut(Duration),
}

/// Platform-agnostic keystroke injection.
///
/// Implementations type `text` into whatever currently holds keyboard focus,
/// then press Enter.  Calls are synchronous and may touch global OS state, so
/// async callers go through [`InjectionLane`].
#[cfg_attr(test, mockall::automock)]
pub trait InputInjector: Send + Sync {
    /// Types `text` followed by a confirming Enter keystroke.
    ///
    /// # Errors
    ///
    /// Returns [`InjectionError::EmptyText`] for empty input without touching
    /// the OS, and [`InjectionError::Unavailable`] when keystrokes could not
    /// be emitted at all.
    fn inject(&self, text: &str) -> Result<(), InjectionError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// The relay's single path to the keyboard.
///
/// Every call waits for the previous one to finish typing, so two scans
/// never interleave their keystrokes in the focused window.  The lock is
/// taken on the blocking thread itself: a call that timed out keeps the lane
/// until its keystrokes are done, and the next scan types after it.
#[derive(Clone)]
pub struct InjectionLane {
    injector: Arc<dyn InputInjector>,
    busy: Arc<Mutex<()>>,
}

impl InjectionLane {
    pub fn new(injector: Arc<dyn InputInjector>) -> Self {
        Self {
            injector,
            busy: Arc::new(Mutex::new(())),
        }
    }

    /// Backend name of the wrapped injector.
    pub fn name(&self) -> &'static str {
        self.injector.name()
    }

    /// Runs `inject(text)` on the blocking pool, waiting at most `limit`.
    ///
    /// On timeout the blocking call keeps running in the background and
    /// keeps the lane; the caller just stops waiting for it.
    ///
    /// # Errors
    ///
    /// Returns the injector's own error, [`InjectionError::TimedOut`] when
    /// `limit` elapses first (including time spent queued behind an earlier
    /// scan), or [`InjectionError::Unavailable`] if the blocking task
    /// panicked.
    pub async fn inject_with_timeout(&self, text: String, limit: Duration) -> Result<(), InjectionError> {
        if text.is_empty() {
            return Err(InjectionError::EmptyText);
        }
        let backend = self.injector.name();
        let injector = Arc::clone(&self.injector);
        let busy = Arc::clone(&self.busy);
        let task = tokio::task::spawn_blocking(move || {
            // A panic inside an earlier call poisons the lock but leaves
            // nothing half-updated behind it.
            let _turn = busy.lock().unwrap_or_else(PoisonError::into_inner);
            injector.inject(&text)
        });
        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => {
                debug!(backend, ok = result.is_ok(), "injection finished");
                result
            }
            Ok(Err(join_error)) => Err(InjectionError::Unavailable(format!(
                "{backend} injector task failed: {join_error}"
            ))),
            Err(_) => Err(InjectionError::TimedOut(limit)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
