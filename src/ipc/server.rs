//! Unix domain socket server for IPC
//!
//! Provides request-response communication, state event notifications for
//! subscribed clients and the platform command stream for the attached host.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::events::StateEvent;
use crate::hotkey::{HotkeyEvent, KeyCode};
use crate::state::{ControllerInput, Query, UserAction};
use crate::voice::{HostCapabilities, PlatformCommand, PlatformEvent};

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_FRAME_LEN};

/// Handles the server needs to reach the rest of the daemon
pub struct ServerContext {
    pub input_tx: mpsc::Sender<ControllerInput>,
    pub events: broadcast::Sender<StateEvent>,
    pub platform: broadcast::Sender<PlatformCommand>,
    pub capabilities: Arc<HostCapabilities>,
    pub backend: Arc<dyn Backend>,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    context: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, hotkey: &str, context: ServerContext) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::new(hotkey),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            context: Arc::new(context),
            shutdown_tx,
        })
    }

    /// Track a controller event in the status snapshot
    pub async fn apply_event(&self, event: &StateEvent) {
        let mut server_state = self.state.write().await;
        let old_state = server_state.status.state;
        server_state.status.apply(event);

        if old_state != server_state.status.state {
            debug!(from = %old_state, to = %server_state.status.state, "IPC server: state updated");
        }
    }

    pub async fn set_hotkey_registered(&self, registered: bool) {
        self.state.write().await.status.hotkey_registered = registered;
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let context = Arc::clone(&self.context);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, context) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        context: Arc<ServerContext>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        // frames are read on their own task so pushes are never blocked on input
        let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(16);
        let reader_task = tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(frame)) => {
                        if frame_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("client disconnected");
                        break;
                    }
                    Err(e) => {
                        warn!(?e, "failed to read frame");
                        break;
                    }
                }
            }
        });

        let mut events: Option<broadcast::Receiver<StateEvent>> = None;
        let mut commands: Option<broadcast::Receiver<PlatformCommand>> = None;

        let result: Result<()> = loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else { break Ok(()) };

                    let response = match serde_json::from_slice::<Request>(&frame) {
                        Ok(request) => {
                            debug!(?request, "received request");
                            match request {
                                Request::Subscribe => {
                                    events = Some(context.events.subscribe());
                                    debug!("client subscribed to notifications");
                                }
                                Request::AttachHost { .. } => {
                                    commands = Some(context.platform.subscribe());
                                }
                                _ => {}
                            }
                            Self::process_request(request, &state, &context).await
                        }
                        Err(e) => {
                            warn!(?e, "failed to parse request");
                            Response::error("invalid_request", e.to_string())
                        }
                    };

                    if let Err(e) = write_frame(&mut writer, &response).await {
                        break Err(e);
                    }
                }

                event = next_broadcast(&mut events) => match event {
                    Ok(event) => {
                        if let Err(e) = write_frame(&mut writer, &Notification::StateEvent { event }).await {
                            break Err(e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "client event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => events = None,
                },

                command = next_broadcast(&mut commands) => match command {
                    Ok(command) => {
                        if let Err(e) = write_frame(&mut writer, &Notification::PlatformCommand { command }).await {
                            break Err(e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "host command stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => commands = None,
                },
            }
        };

        reader_task.abort();

        if commands.is_some() {
            info!("speech host detached");
            context.capabilities.clear();
            let _ = context
                .input_tx
                .send(ControllerInput::Platform(PlatformEvent::HostDetached))
                .await;
        }

        result
    }

    /// Process a request and return a response
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
        context: &ServerContext,
    ) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let mut state = state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                state.status.host_attached = context.capabilities.attached();
                Response::Status(state.status.clone())
            }

            Request::Subscribe => Response::Subscribed,

            Request::AttachHost {
                recognition,
                synthesis,
                voices,
            } => {
                info!(recognition, synthesis, voices = voices.len(), "speech host attached");
                context.capabilities.set(recognition, synthesis);
                match forward(context, ControllerInput::Platform(PlatformEvent::HostAttached { voices })).await {
                    Response::Accepted => Response::Attached,
                    other => other,
                }
            }

            Request::Platform { event } => forward(context, ControllerInput::Platform(event)).await,

            Request::PressMic => forward(context, ControllerInput::User(UserAction::PressMic)).await,

            Request::SetAlwaysListening { enabled } => {
                forward(context, ControllerInput::User(UserAction::SetAlwaysListening(enabled))).await
            }

            Request::ToggleAlwaysListening => {
                forward(context, ControllerInput::User(UserAction::ToggleAlwaysListening)).await
            }

            Request::SubmitText { text } => {
                if text.trim().is_empty() {
                    return Response::error("empty_text", "text must not be empty");
                }
                forward(context, ControllerInput::User(UserAction::SubmitText(text))).await
            }

            Request::SetHotkey { key } => match key.parse::<KeyCode>() {
                Ok(key) => forward(context, ControllerInput::User(UserAction::SetHotkey(key))).await,
                Err(e) => Response::error("invalid_key", e.to_string()),
            },

            Request::KeyPressed { key } => match key.parse::<KeyCode>() {
                Ok(key) => forward(context, ControllerInput::Hotkey(HotkeyEvent::KeyPressed(key))).await,
                Err(e) => Response::error("invalid_key", e.to_string()),
            },

            Request::SelectVoice { voice } => {
                forward(context, ControllerInput::User(UserAction::SelectVoice(voice))).await
            }

            Request::StopSpeaking => forward(context, ControllerInput::User(UserAction::StopSpeaking)).await,

            Request::GetConversation => {
                let (reply_tx, reply_rx) = oneshot::channel();
                match forward(context, ControllerInput::Query(Query::Conversation(reply_tx))).await {
                    Response::Accepted => match reply_rx.await {
                        Ok(utterances) => Response::Conversation { utterances },
                        Err(_) => Response::error("unavailable", "controller dropped the query"),
                    },
                    other => other,
                }
            }

            Request::GetMemory => match context.backend.memory().await {
                Ok(memory) => Response::Memory(memory),
                Err(e) => {
                    warn!(error = %e, "memory request failed");
                    Response::error("backend_error", e.to_string())
                }
            },
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Hand an input to the controller
async fn forward(context: &ServerContext, input: ControllerInput) -> Response {
    match context.input_tx.send(input).await {
        Ok(()) => Response::Accepted,
        Err(_) => Response::error("unavailable", "controller is not running"),
    }
}

/// Receive from an optional broadcast subscription; pends forever when absent
async fn next_broadcast<T: Clone>(
    rx: &mut Option<broadcast::Receiver<T>>,
) -> Result<T, broadcast::error::RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Read one length-prefixed frame; `None` on clean disconnect or oversize frame
pub(crate) async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        warn!(len, "message too large, disconnecting");
        return Ok(None);
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(msg_buf))
}

/// Send a length-prefixed JSON message
pub(crate) async fn write_frame<W: AsyncWrite + Unpin, T: serde::Serialize>(
    writer: &mut W,
    msg: &T,
) -> Result<()> {
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}
