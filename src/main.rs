//! neurotrain-daemon: voice interaction and command dispatch daemon
//!
//! The daemon provides:
//! - An interaction controller arbitrating listening, wake word and speaking
//! - A command grammar and dispatcher for the assistant backend
//! - Global hotkey detection via CGEventTap on macOS
//! - IPC server for UI clients and the speech host

mod backend;
mod command;
mod config;
mod conversation;
mod events;
mod hotkey;
mod ipc;
mod lifecycle;
mod state;
mod voice;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::backend::{Backend, HttpBackend};
use crate::config::Config;
use crate::events::StateEvent;
use crate::hotkey::{HotkeyError, HotkeyListener};
use crate::ipc::{Server, ServerContext};
use crate::lifecycle::ShutdownSignal;
use crate::state::{ControllerInput, InteractionController, Platform};
use crate::voice::{HostBridge, HostCapabilities, PlatformCommand};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "neurotrain-daemon starting");

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        socket_path = %config.socket_path.display(),
        backend = %config.backend.base_url,
        "configuration loaded"
    );
    let hotkey = config.voice.hotkey()?;

    let shutdown = ShutdownSignal::new();

    // Everything the controller reacts to
    let (input_tx, input_rx) = mpsc::channel::<ControllerInput>(64);
    // Controller -> subscribed clients
    let (event_tx, _) = broadcast::channel::<StateEvent>(64);
    // Controller -> attached speech host
    let (platform_tx, _) = broadcast::channel::<PlatformCommand>(64);
    let (hotkey_tx, mut hotkey_rx) = mpsc::channel(32);

    let capabilities = Arc::new(HostCapabilities::default());
    let bridge = HostBridge::new(platform_tx.clone(), Arc::clone(&capabilities));
    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(&config.backend)?);

    let mut controller = InteractionController::new(
        &config.voice,
        hotkey,
        Platform {
            recognizer: Box::new(bridge.clone()),
            synthesizer: Box::new(bridge),
        },
        Arc::clone(&backend),
        event_tx.clone(),
        input_tx.clone(),
    );

    let hotkey_listener = HotkeyListener::new(hotkey_tx);
    let hotkey_registered = match hotkey_listener.start() {
        Ok(()) => {
            info!(%hotkey, "hotkey listener started");
            true
        }
        Err(HotkeyError::Unsupported) => {
            warn!("no native hotkey listener, relying on host key forwarding");
            false
        }
        Err(e) => {
            error!(?e, "failed to start hotkey listener");
            warn!("continuing without hotkey support - check Accessibility permissions");
            false
        }
    };

    let hotkey_input = input_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = hotkey_rx.recv().await {
            if hotkey_input.send(ControllerInput::Hotkey(event)).await.is_err() {
                break;
            }
        }
        debug!("hotkey forwarding stopped");
    });

    let server = Server::new(
        &config.socket_path,
        &hotkey.to_string(),
        ServerContext {
            input_tx,
            events: event_tx.clone(),
            platform: platform_tx,
            capabilities,
            backend,
        },
    )?;
    server.set_hotkey_registered(hotkey_registered).await;

    let mut status_rx = event_tx.subscribe();
    let server_for_events = &server;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        _ = controller.run(input_rx) => {
            info!("interaction controller exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the status snapshot in step with the controller
        _ = async {
            loop {
                match status_rx.recv().await {
                    Ok(event) => server_for_events.apply_event(&event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "status event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("status event handler exited");
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!("shutting down...");

    controller.shutdown();
    hotkey_listener.stop();
    server.shutdown().await;

    info!("neurotrain-daemon stopped");

    Ok(())
}
