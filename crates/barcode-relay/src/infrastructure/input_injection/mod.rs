//! Platform-specific keystroke injection backends.
//!
//! The backend is selected at compile time via `#[cfg(target_os = ...)]`.
//! [`build_injector`] picks the right one for the configured policy and falls
//! back to [`NoopInjector`] when the platform backend cannot start, so a
//! headless host still relays scans to consumers.

use std::sync::Arc;

use tracing::{info, warn};

use crate::application::inject_input::{InjectionError, InputInjector};
use crate::domain::InjectPolicy;

pub mod noop;
pub mod recording;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "macos")]
pub mod macos;

pub use noop::NoopInjector;
pub use recording::RecordingInjector;

/// Creates the native injector for this platform.
///
/// # Errors
///
/// Returns [`InjectionError::Unavailable`] when the platform has no backend
/// or the backend's prerequisites (an X display) are missing.
pub fn platform_injector() -> Result<Arc<dyn InputInjector>, InjectionError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::SendInputInjector::new()))
    }
    #[cfg(target_os = "macos")]
    {
        Ok(Arc::new(macos::CoreGraphicsInjector::new()))
    }
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(linux::XTestInjector::new()?))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        Err(InjectionError::Unavailable(
            "no input injection backend for this platform".to_string(),
        ))
    }
}

/// Chooses the injector the relay will use.
///
/// `InjectPolicy::Off` always yields the no-op injector.  Otherwise the
/// platform backend is tried; a failure is logged and the no-op injector is
/// used instead.  Never fails.
pub fn build_injector(policy: InjectPolicy) -> Arc<dyn InputInjector> {
    if policy == InjectPolicy::Off {
        info!("keystroke injection disabled");
        return Arc::new(NoopInjector);
    }
    match platform_injector() {
        Ok(injector) => {
            info!(backend = injector.name(), %policy, "keystroke injection ready");
            injector
        }
        Err(error) => {
            warn!("{error}; scans will only be relayed to consumers");
            Arc::new(NoopInjector)
        }
    }
}
