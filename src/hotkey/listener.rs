//! Global hotkey listener
//!
//! On macOS this uses a CGEventTap on a dedicated thread with its own
//! CFRunLoop and reports key presses. Other platforms have no native
//! listener; the host forwards key presses over IPC instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
#[cfg(target_os = "macos")]
use tracing::{error, info};

use super::keys::KeyCode;

/// Events sent from the hotkey listener to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// A key went down (auto-repeat excluded)
    KeyPressed(KeyCode),
    /// Event tap was disabled by macOS (needs re-registration)
    TapDisabled,
}

/// Global hotkey listener that reports key presses
pub struct HotkeyListener {
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    event_tx: mpsc::Sender<HotkeyEvent>,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    /// Create a new hotkey listener
    pub fn new(event_tx: mpsc::Sender<HotkeyEvent>) -> Self {
        Self {
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the hotkey listener
    ///
    /// This spawns a dedicated thread that runs a CFRunLoop to receive
    /// CGEventTap callbacks. The listener runs until `stop()` is called
    /// or the program exits.
    #[cfg(target_os = "macos")]
    pub fn start(&self) -> Result<(), HotkeyError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);

        std::thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!("hotkey listener thread started");

                if let Err(e) = macos::run_event_loop(event_tx, running.clone()) {
                    error!(?e, "hotkey listener error");
                }

                running.store(false, Ordering::SeqCst);
                info!("hotkey listener thread stopped");
            })
            .map_err(|e| HotkeyError::ThreadSpawn(e.to_string()))?;

        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    pub fn start(&self) -> Result<(), HotkeyError> {
        Err(HotkeyError::Unsupported)
    }

    /// Stop the hotkey listener
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        #[cfg(target_os = "macos")]
        core_foundation::runloop::CFRunLoop::get_main().stop();
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Errors that can occur in the hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("hotkey listener is already running")]
    AlreadyRunning,

    #[error("no native global hotkey support on this platform")]
    Unsupported,

    #[error("failed to create event tap - check Accessibility permissions")]
    EventTapCreation,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),
}

#[cfg(target_os = "macos")]
mod macos {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
    use core_graphics::event::{
        CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
        CGEventTapProxy, CGEventType, EventField,
    };
    use tokio::sync::mpsc;
    use tracing::{debug, error, info, warn};

    use super::{HotkeyError, HotkeyEvent, KeyCode};

    enum TapMessage {
        KeyDown(u16),
        Disabled,
    }

    /// Run the CFRunLoop with the event tap
    pub(super) fn run_event_loop(
        event_tx: mpsc::Sender<HotkeyEvent>,
        running: Arc<AtomicBool>,
    ) -> Result<(), HotkeyError> {
        let (callback_tx, callback_rx) = std::sync::mpsc::channel::<TapMessage>();

        // CGEventTap callback - must be fast and non-blocking
        let callback = move |_proxy: CGEventTapProxy, event_type: CGEventType, event: &CGEvent| -> Option<CGEvent> {
            match event_type {
                CGEventType::KeyDown => {
                    let repeat = event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT);
                    if repeat == 0 {
                        let code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
                        let _ = callback_tx.send(TapMessage::KeyDown(code as u16));
                    }
                }
                CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                    let _ = callback_tx.send(TapMessage::Disabled);
                }
                _ => {}
            }
            Some(event.clone())
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            vec![CGEventType::KeyDown],
            callback,
        )
        .map_err(|_| {
            error!("failed to create event tap - is Accessibility permission granted?");
            HotkeyError::EventTapCreation
        })?;

        tap.enable();

        let run_loop_source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|_| HotkeyError::EventTapCreation)?;
        let run_loop = CFRunLoop::get_current();

        unsafe {
            run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
        }

        info!("event tap created and enabled");

        while running.load(Ordering::SeqCst) {
            unsafe {
                CFRunLoop::run_in_mode(
                    kCFRunLoopDefaultMode,
                    std::time::Duration::from_millis(100),
                    true,
                );
            }

            while let Ok(message) = callback_rx.try_recv() {
                let event = match message {
                    TapMessage::KeyDown(code) => match KeyCode::from_macos_keycode(code) {
                        Some(key) => HotkeyEvent::KeyPressed(key),
                        None => continue,
                    },
                    TapMessage::Disabled => {
                        warn!("event tap disabled by the system");
                        tap.enable();
                        HotkeyEvent::TapDisabled
                    }
                };

                debug!(?event, "hotkey event");
                // not in an async context here
                if event_tx.blocking_send(event).is_err() {
                    warn!("failed to send hotkey event - channel closed?");
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}
