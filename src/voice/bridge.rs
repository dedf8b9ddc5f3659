//! Host bridge
//!
//! Implements the speech capabilities by forwarding platform commands to
//! whichever host is attached over IPC.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::platform::{
    HandleId, PlatformCommand, RecognitionRequest, Recognizer, SessionKind, SpeechRequest,
    Synthesizer,
};

/// Capabilities announced by the attached host
#[derive(Debug, Default)]
pub struct HostCapabilities {
    recognition: AtomicBool,
    synthesis: AtomicBool,
}

impl HostCapabilities {
    pub fn set(&self, recognition: bool, synthesis: bool) {
        self.recognition.store(recognition, Ordering::SeqCst);
        self.synthesis.store(synthesis, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.set(false, false);
    }

    pub fn recognition(&self) -> bool {
        self.recognition.load(Ordering::SeqCst)
    }

    pub fn synthesis(&self) -> bool {
        self.synthesis.load(Ordering::SeqCst)
    }

    pub fn attached(&self) -> bool {
        self.recognition() || self.synthesis()
    }
}

#[derive(Clone)]
pub struct HostBridge {
    commands: broadcast::Sender<PlatformCommand>,
    capabilities: Arc<HostCapabilities>,
}

impl HostBridge {
    pub fn new(commands: broadcast::Sender<PlatformCommand>, capabilities: Arc<HostCapabilities>) -> Self {
        Self {
            commands,
            capabilities,
        }
    }

    fn send(&self, command: PlatformCommand) {
        debug!(?command, "platform command");
        if self.commands.send(command).is_err() {
            warn!("no host attached to receive platform command");
        }
    }
}

impl Recognizer for HostBridge {
    fn recognition_supported(&self) -> bool {
        self.capabilities.recognition()
    }

    fn start_recognition(&mut self, request: &RecognitionRequest) {
        self.send(PlatformCommand::StartRecognition(request.clone()));
    }

    fn stop_recognition(&mut self, session: SessionKind, handle: HandleId) {
        self.send(PlatformCommand::StopRecognition { session, handle });
    }
}

impl Synthesizer for HostBridge {
    fn synthesis_supported(&self) -> bool {
        self.capabilities.synthesis()
    }

    fn speak(&mut self, request: &SpeechRequest) {
        self.send(PlatformCommand::Speak(request.clone()));
    }

    fn cancel(&mut self) {
        self.send(PlatformCommand::CancelSpeech);
    }
}
