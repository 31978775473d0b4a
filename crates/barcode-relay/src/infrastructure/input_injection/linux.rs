//! Linux keystroke injection via the XTest extension.
//!
//! # What is XTest? (for beginners)
//!
//! XTest is an X11 protocol extension that lets a process synthesize keyboard
//! events as if the user had pressed the keys.  The focused window receives
//! them exactly like physical input.
//!
//! `XTestFakeKeyEvent` takes an X11 *keycode*, not a character, so each
//! character of the payload goes through two steps:
//!
//! ```text
//! char → KeySym → XKeysymToKeycode(display, keysym) → keycode
//! ```
//!
//! Latin-1 characters map to KeySyms equal to their code point; everything
//! else uses the Unicode KeySym range `0x0100_0000 | code point`.  Characters
//! that live on the shifted level of their key (`A`, `!`) are wrapped in a
//! Shift press/release.  A Return press follows the text.
//!
//! # Permissions
//!
//! XTest needs a reachable X display (`DISPLAY`).  Under a pure Wayland
//! session, or on a headless host, construction fails with
//! `InjectionError::Unavailable` and the relay falls back to the no-op
//! injector.

#![cfg(target_os = "linux")]

use std::os::raw::{c_int, c_ulong};
use std::ptr;

use x11::xlib;
use x11::xtest;

use crate::application::inject_input::{InjectionError, InputInjector};

// ── X11 constants ─────────────────────────────────────────────────────────────

/// `CurrentTime`: let the server stamp the synthesized event.
const CURRENT_TIME: c_ulong = 0;

const XK_RETURN: xlib::KeySym = 0xff0d;
const XK_TAB: xlib::KeySym = 0xff09;
const XK_SHIFT_L: xlib::KeySym = 0xffe1;

/// Linux implementation of [`InputInjector`] using XTest.
///
/// The display connection is opened per call: an Xlib `Display` pointer
/// cannot be shared between threads, and injection runs on the blocking pool.
#[derive(Debug, Default)]
pub struct XTestInjector;

impl XTestInjector {
    /// Verifies that the X display can be opened.
    ///
    /// # Errors
    ///
    /// Returns [`InjectionError::Unavailable`] when `DISPLAY` is unset or
    /// `XOpenDisplay` fails.
    pub fn new() -> Result<Self, InjectionError> {
        let display = Display::open()?;
        drop(display);
        Ok(Self)
    }
}

impl InputInjector for XTestInjector {
    fn inject(&self, text: &str) -> Result<(), InjectionError> {
        if text.is_empty() {
            return Err(InjectionError::EmptyText);
        }
        let display = Display::open()?;
        for ch in text.chars() {
            display.type_keysym(char_to_keysym(ch))?;
        }
        display.type_keysym(XK_RETURN)?;
        display.flush();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "xtest"
    }
}

/// Maps a character to its X11 KeySym.
fn char_to_keysym(ch: char) -> xlib::KeySym {
    match ch {
        '\n' | '\r' => XK_RETURN,
        '\t' => XK_TAB,
        c if (c as u32) < 0x100 => c as xlib::KeySym,
        c => 0x0100_0000 | c as xlib::KeySym,
    }
}

// ── Display connection ────────────────────────────────────────────────────────

/// Owned Xlib display connection, closed on drop.
struct Display(*mut xlib::Display);

impl Display {
    fn open() -> Result<Self, InjectionError> {
        if std::env::var_os("DISPLAY").is_none() {
            return Err(InjectionError::Unavailable(
                "DISPLAY is not set; no X server to type into".to_string(),
            ));
        }
        // SAFETY: a null name means "use $DISPLAY".
        let raw = unsafe { xlib::XOpenDisplay(ptr::null()) };
        if raw.is_null() {
            return Err(InjectionError::Unavailable(
                "cannot open X display".to_string(),
            ));
        }
        Ok(Self(raw))
    }

    fn type_keysym(&self, keysym: xlib::KeySym) -> Result<(), InjectionError> {
        // SAFETY: self.0 is a live display for the lifetime of self.
        let keycode = unsafe { xlib::XKeysymToKeycode(self.0, keysym) };
        if keycode == 0 {
            return Err(InjectionError::Unavailable(format!(
                "no key produces keysym 0x{keysym:x} in the current layout"
            )));
        }
        // SAFETY: as above; keycode came from the same display.
        let unshifted = unsafe { xlib::XKeycodeToKeysym(self.0, keycode, 0) };
        let shift = if unshifted != keysym {
            // SAFETY: as above.
            unsafe { xlib::XKeysymToKeycode(self.0, XK_SHIFT_L) }
        } else {
            0
        };

        if shift != 0 {
            self.fake_key(shift, true);
        }
        self.fake_key(keycode, true);
        self.fake_key(keycode, false);
        if shift != 0 {
            self.fake_key(shift, false);
        }
        Ok(())
    }

    fn fake_key(&self, keycode: xlib::KeyCode, press: bool) {
        // SAFETY: self.0 is live.
        unsafe {
            xtest::XTestFakeKeyEvent(self.0, u32::from(keycode), c_int::from(press), CURRENT_TIME);
        }
    }

    fn flush(&self) {
        // SAFETY: self.0 is live.
        unsafe {
            xlib::XFlush(self.0);
        }
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        // SAFETY: self.0 was returned by XOpenDisplay and is closed once.
        unsafe {
            xlib::XCloseDisplay(self.0);
        }
    }
}
