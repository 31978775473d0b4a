//! Injector that discards every payload.
//!
//! Used for `--inject off` and on hosts where no platform backend starts
//! (no display, missing helper tool).

use crate::application::inject_input::{InjectionError, InputInjector};

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInjector;

impl InputInjector for NoopInjector {
    fn inject(&self, text: &str) -> Result<(), InjectionError> {
        if text.is_empty() {
            return Err(InjectionError::EmptyText);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
