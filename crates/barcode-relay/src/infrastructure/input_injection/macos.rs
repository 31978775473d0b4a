//! macOS keystroke injection via CoreGraphics.
//!
//! A keyboard event can carry an arbitrary Unicode string
//! (`CGEventKeyboardSetUnicodeString`), which the receiving application
//! inserts as typed text.  The string is sent in chunks because the system
//! truncates longer strings, then a Return key press (virtual keycode 0x24)
//! confirms the entry.  Events are posted at the HID tap, the same level as
//! physical keyboard input.
//!
//! # Accessibility permission
//!
//! Posting events requires the Accessibility permission (System Settings →
//! Privacy & Security → Accessibility).  Without it the events are silently
//! discarded; macOS offers no error to detect this.

#![cfg(target_os = "macos")]

use core_graphics::event::{CGEvent, CGEventTapLocation, CGKeyCode};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};

use crate::application::inject_input::{InjectionError, InputInjector};

/// Virtual keycode of the Return key on an ANSI layout.
const RETURN_KEYCODE: CGKeyCode = 0x24;

/// Longest string CoreGraphics delivers from one event, in UTF-16 units.
const MAX_UNITS_PER_EVENT: usize = 20;

/// macOS implementation of [`InputInjector`].
#[derive(Debug, Default)]
pub struct CoreGraphicsInjector;

impl CoreGraphicsInjector {
    pub fn new() -> Self {
        Self
    }
}

impl InputInjector for CoreGraphicsInjector {
    fn inject(&self, text: &str) -> Result<(), InjectionError> {
        if text.is_empty() {
            return Err(InjectionError::EmptyText);
        }
        // Event sources are not Send, so each call creates its own.
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|()| unavailable("could not create event source"))?;

        for chunk in utf16_chunks(text, MAX_UNITS_PER_EVENT) {
            for key_down in [true, false] {
                let event = CGEvent::new_keyboard_event(source.clone(), 0, key_down)
                    .map_err(|()| unavailable("could not create keyboard event"))?;
                event.set_string(&chunk);
                event.post(CGEventTapLocation::HID);
            }
        }

        for key_down in [true, false] {
            let event = CGEvent::new_keyboard_event(source.clone(), RETURN_KEYCODE, key_down)
                .map_err(|()| unavailable("could not create Return key event"))?;
            event.post(CGEventTapLocation::HID);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "coregraphics"
    }
}

fn unavailable(reason: &str) -> InjectionError {
    InjectionError::Unavailable(format!("CoreGraphics: {reason}"))
}

/// Splits `text` into pieces of at most `max_units` UTF-16 units without
/// breaking a character apart.
fn utf16_chunks(text: &str, max_units: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut units = 0;
    for ch in text.chars() {
        let width = ch.len_utf16();
        if units + width > max_units && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            units = 0;
        }
        current.push(ch);
        units += width;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
