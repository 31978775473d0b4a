//! Windows keystroke injection via the SendInput API.
//!
//! Each UTF-16 code unit of the payload is sent as a `KEYEVENTF_UNICODE`
//! key-down/key-up pair, so the text arrives exactly as scanned regardless of
//! the active keyboard layout.  A `VK_RETURN` press follows.
//!
//! Before typing, the current foreground window is raised with `SetWindowPos`.
//! That call is best effort: failure is ignored and never stops the
//! keystrokes.
//!
//! # UIPI
//!
//! Windows silently drops synthetic input aimed at a window of a higher
//! integrity level (e.g. an elevated console).  `SendInput` then reports fewer
//! events than submitted, which is mapped to `InjectionError::Unavailable`.

#![cfg(target_os = "windows")]

use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP,
    KEYEVENTF_UNICODE, VIRTUAL_KEY, VK_RETURN,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetForegroundWindow, SetWindowPos, HWND_TOP, SWP_NOMOVE, SWP_NOSIZE, SWP_SHOWWINDOW,
};

use crate::application::inject_input::{InjectionError, InputInjector};

/// Windows implementation of [`InputInjector`] using SendInput.
#[derive(Debug, Default)]
pub struct SendInputInjector;

impl SendInputInjector {
    pub fn new() -> Self {
        Self
    }
}

impl InputInjector for SendInputInjector {
    fn inject(&self, text: &str) -> Result<(), InjectionError> {
        if text.is_empty() {
            return Err(InjectionError::EmptyText);
        }
        raise_foreground_window();

        let mut inputs = unicode_inputs(text);
        inputs.push(key_input(VK_RETURN, KEYBD_EVENT_FLAGS(0)));
        inputs.push(key_input(VK_RETURN, KEYEVENTF_KEYUP));

        // SAFETY: `inputs` is a slice of fully initialised INPUT structures and
        // the size argument matches the element type.
        let sent = unsafe { SendInput(&inputs, std::mem::size_of::<INPUT>() as i32) };
        if sent as usize != inputs.len() {
            return Err(InjectionError::Unavailable(format!(
                "SendInput accepted {sent} of {} events (input blocked by UIPI or desktop lock)",
                inputs.len()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sendinput"
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn raise_foreground_window() {
    // SAFETY: GetForegroundWindow has no preconditions.
    let hwnd = unsafe { GetForegroundWindow() };
    if hwnd.0.is_null() {
        return;
    }
    // SAFETY: hwnd came from GetForegroundWindow; a stale handle only makes
    // the call fail, which is ignored.
    let _ = unsafe {
        SetWindowPos(
            hwnd,
            HWND_TOP,
            0,
            0,
            0,
            0,
            SWP_NOMOVE | SWP_NOSIZE | SWP_SHOWWINDOW,
        )
    };
}

/// Key-down/key-up pairs for every UTF-16 unit of `text`.
fn unicode_inputs(text: &str) -> Vec<INPUT> {
    text.encode_utf16()
        .flat_map(|unit| {
            [
                unicode_input(unit, KEYEVENTF_UNICODE),
                unicode_input(unit, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP),
            ]
        })
        .collect()
}

fn unicode_input(unit: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(0),
                wScan: unit,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn key_input(vk: VIRTUAL_KEY, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: vk,
                wScan: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}
