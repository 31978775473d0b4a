//! Recording injector for tests and dry runs.
//!
//! # Why a recording injector?
//!
//! The real backends press keys on whatever machine runs them, which is the
//! last thing a test suite should do.  `RecordingInjector` pushes every
//! payload into a `Mutex<Vec<String>>` instead, so integration tests can
//! assert exactly what would have been typed and in what order.
//!
//! # Simulated screen
//!
//! Besides the list of payloads, every character is appended to a shared
//! "screen" buffer one key at a time, followed by `'\n'` for the Enter key.
//! With a key delay set ([`RecordingInjector::with_key_delay`]) a call takes
//! as long as real typing would, so two overlapping calls show up as
//! interleaved characters on the screen.
//!
//! # `should_fail` flag
//!
//! Set `should_fail` to simulate an OS that refuses synthetic input.  Failed
//! calls are not recorded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::application::inject_input::{InjectionError, InputInjector};

/// An injector that records payloads instead of typing them.
#[derive(Debug, Default)]
pub struct RecordingInjector {
    typed: Mutex<Vec<String>>,
    screen: Mutex<String>,
    key_delay: Option<Duration>,
    /// When `true`, every call fails with `InjectionError::Unavailable`.
    pub should_fail: AtomicBool,
}

impl RecordingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// An injector whose every call fails.
    pub fn failing() -> Self {
        let injector = Self::default();
        injector.should_fail.store(true, Ordering::SeqCst);
        injector
    }

    /// An injector that sleeps `delay` after every simulated key press.
    pub fn with_key_delay(delay: Duration) -> Self {
        Self {
            key_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Payloads recorded so far, oldest first.
    pub fn typed(&self) -> Vec<String> {
        self.typed
            .lock()
            .map(|typed| typed.clone())
            .unwrap_or_default()
    }

    /// Every simulated key press so far, Enter shown as `'\n'`.
    pub fn screen(&self) -> String {
        self.screen
            .lock()
            .map(|screen| screen.clone())
            .unwrap_or_default()
    }

    fn press(&self, key: char) -> Result<(), InjectionError> {
        self.screen
            .lock()
            .map_err(|_| InjectionError::Unavailable("screen lock poisoned".to_string()))?
            .push(key);
        if let Some(delay) = self.key_delay {
            std::thread::sleep(delay);
        }
        Ok(())
    }
}

impl InputInjector for RecordingInjector {
    fn inject(&self, text: &str) -> Result<(), InjectionError> {
        if text.is_empty() {
            return Err(InjectionError::EmptyText);
        }
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(InjectionError::Unavailable("simulated failure".to_string()));
        }
        for key in text.chars() {
            self.press(key)?;
        }
        self.press('\n')?;
        let mut typed = self
            .typed
            .lock()
            .map_err(|_| InjectionError::Unavailable("recording lock poisoned".to_string()))?;
        typed.push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
