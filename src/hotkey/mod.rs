//! Hotkey module for global keyboard event listening
//!
//! A single bound key toggles always-listening mode. On macOS the key is
//! detected with a CGEventTap; elsewhere the host forwards key presses.

mod keys;
mod listener;

pub use keys::{HotkeyBinding, KeyCode};
pub use listener::{HotkeyError, HotkeyEvent, HotkeyListener};
