//! Interaction controller
//!
//! Top-level state machine over Idle, ListeningSingleShot,
//! ListeningContinuous, AwaitingWakeWord and Speaking. It is the only writer
//! of the recognition sessions and the speech output, and it never lets a
//! recognition handle be active while an utterance is being spoken.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::command::respond;
use crate::config::VoiceConfig;
use crate::conversation::{Conversation, DeliveryStatus, Utterance};
use crate::events::StateEvent;
use crate::hotkey::{HotkeyBinding, HotkeyEvent, KeyCode};
use crate::voice::{
    EndOutcome, HandleId, PlatformEvent, RecognitionSession, Recognizer, SessionError, SessionKind,
    SpeechOutputController, Synthesizer, WakeWordGate,
};

use super::input::{ControllerInput, PendingReply, Query, UserAction};

/// Interaction states visible to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    #[default]
    Idle,
    ListeningSingleShot,
    ListeningContinuous,
    AwaitingWakeWord,
    Speaking,
}

impl std::fmt::Display for InteractionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionState::Idle => write!(f, "Idle"),
            InteractionState::ListeningSingleShot => write!(f, "ListeningSingleShot"),
            InteractionState::ListeningContinuous => write!(f, "ListeningContinuous"),
            InteractionState::AwaitingWakeWord => write!(f, "AwaitingWakeWord"),
            InteractionState::Speaking => write!(f, "Speaking"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListeningMode {
    #[default]
    Off,
    SingleShot,
    Continuous,
}

impl std::fmt::Display for ListeningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListeningMode::Off => write!(f, "Off"),
            ListeningMode::SingleShot => write!(f, "SingleShot"),
            ListeningMode::Continuous => write!(f, "Continuous"),
        }
    }
}

/// Speech capabilities of the host, as seen by the controller
pub struct Platform {
    pub recognizer: Box<dyn Recognizer>,
    pub synthesizer: Box<dyn Synthesizer>,
}

/// Owns listening mode, both recognition sessions and speech output
pub struct InteractionController {
    /// Current state
    state: InteractionState,
    /// Listening mode chosen by the user
    mode: ListeningMode,
    /// Key that toggles continuous mode
    hotkey: HotkeyBinding,
    /// Session that captures commands
    dictation: RecognitionSession,
    /// Passive session gating continuous mode
    wake: WakeWordGate,
    /// Reply playback
    speech: SpeechOutputController,
    /// Host recognition engine
    recognizer: Box<dyn Recognizer>,
    /// Host synthesis engine
    synthesizer: Box<dyn Synthesizer>,
    /// Assistant API
    backend: Arc<dyn Backend>,
    /// Messages exchanged so far
    conversation: Conversation,
    /// User utterance whose reply is still pending
    in_flight: Option<Uuid>,
    /// Continuous mode waits for the wake word before dictation
    wake_word_enabled: bool,
    /// Replies to voice input are read aloud
    speak_responses: bool,
    /// Unsupported recognition already announced for this host
    unsupported_reported: bool,
    /// Time when the current state was entered
    state_entered_at: Instant,
    /// Channel for emitting state events
    event_tx: broadcast::Sender<StateEvent>,
    /// Used by spawned backend calls to report back
    input_tx: mpsc::Sender<ControllerInput>,
}

impl InteractionController {
    pub fn new(
        voice: &VoiceConfig,
        hotkey: KeyCode,
        platform: Platform,
        backend: Arc<dyn Backend>,
        event_tx: broadcast::Sender<StateEvent>,
        input_tx: mpsc::Sender<ControllerInput>,
    ) -> Self {
        let cooldown = std::time::Duration::from_millis(voice.restart_cooldown_ms);
        Self {
            state: InteractionState::Idle,
            mode: ListeningMode::Off,
            hotkey: HotkeyBinding::new(hotkey),
            dictation: RecognitionSession::new(SessionKind::Dictation, false, &voice.language, cooldown),
            wake: WakeWordGate::new(&voice.wake_word, &voice.language, cooldown),
            speech: SpeechOutputController::new(
                voice.voice.clone(),
                &voice.language,
                voice.rate,
                voice.pitch,
            ),
            recognizer: platform.recognizer,
            synthesizer: platform.synthesizer,
            backend,
            conversation: Conversation::new(),
            in_flight: None,
            wake_word_enabled: voice.wake_word_enabled,
            speak_responses: voice.speak_responses,
            unsupported_reported: false,
            state_entered_at: Instant::now(),
            event_tx,
            input_tx,
        }
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn mode(&self) -> ListeningMode {
        self.mode
    }

    pub fn hotkey(&self) -> KeyCode {
        self.hotkey.key()
    }

    pub fn is_speaking(&self) -> bool {
        self.speech.is_speaking()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Process inputs and restart deadlines until the input channel closes
    pub async fn run(&mut self, mut input_rx: mpsc::Receiver<ControllerInput>) {
        info!(state = %self.state, hotkey = %self.hotkey.key(), "interaction controller started");

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                input = input_rx.recv() => match input {
                    Some(input) => self.handle(input, Instant::now()),
                    None => break,
                },
                _ = sleep_until(deadline) => self.poll_restarts(Instant::now()),
            }
        }

        info!("interaction controller stopped");
    }

    /// Handle one input to completion
    pub fn handle(&mut self, input: ControllerInput, now: Instant) {
        match input {
            ControllerInput::Hotkey(HotkeyEvent::KeyPressed(key)) => self.on_key(key),
            ControllerInput::Hotkey(HotkeyEvent::TapDisabled) => {
                warn!("hotkey tap disabled, key presses may be missed");
            }
            ControllerInput::User(action) => self.on_action(action),
            ControllerInput::Platform(event) => self.on_platform(event, now),
            ControllerInput::Reply(reply) => self.on_reply(reply),
            ControllerInput::Query(Query::Conversation(reply_tx)) => {
                let _ = reply_tx.send(self.conversation.utterances().to_vec());
            }
        }
        self.check_exclusion();
    }

    /// Stop everything and return to Idle
    pub fn shutdown(&mut self) {
        self.wake.disable(self.recognizer.as_mut());
        self.dictation.stop(self.recognizer.as_mut());
        self.speech.stop(self.synthesizer.as_mut());
        self.wake.reset();
        self.dictation.reset();
        self.set_mode(ListeningMode::Off);
        self.transition(InteractionState::Idle);
        info!("interaction controller shut down");
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.dictation.restart_deadline(), self.wake.restart_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn poll_restarts(&mut self, now: Instant) {
        let speaking = self.speech.is_speaking();
        if let Some(Err(err)) = self.dictation.poll_restart(self.recognizer.as_mut(), speaking, now) {
            self.recognition_failed(err);
        }
        if let Some(Err(err)) = self.wake.poll_restart(self.recognizer.as_mut(), speaking, now) {
            self.recognition_failed(err);
        }
        self.check_exclusion();
    }

    fn is_busy(&self) -> bool {
        self.state == InteractionState::Speaking || self.in_flight.is_some()
    }

    fn on_key(&mut self, key: KeyCode) {
        if !self.hotkey.matches(key) {
            debug!(%key, "key press ignored");
            return;
        }
        if self.is_busy() {
            debug!(state = %self.state, "hotkey ignored while busy");
            return;
        }
        self.set_continuous(self.mode != ListeningMode::Continuous);
    }

    fn on_action(&mut self, action: UserAction) {
        match action {
            UserAction::PressMic => self.press_mic(),
            UserAction::SetAlwaysListening(enabled) => self.set_continuous(enabled),
            UserAction::ToggleAlwaysListening => {
                self.set_continuous(self.mode != ListeningMode::Continuous)
            }
            UserAction::SubmitText(text) => self.submit(&text, false),
            UserAction::SetHotkey(key) => {
                self.hotkey.rebind(key);
                info!(%key, "hotkey rebound");
                self.emit(StateEvent::HotkeyChanged { key: key.to_string() });
            }
            UserAction::SelectVoice(voice) => self.speech.select_voice(voice),
            UserAction::StopSpeaking => {
                if self.speech.is_speaking() {
                    self.speech.stop(self.synthesizer.as_mut());
                    self.speech_done();
                }
            }
        }
    }

    fn set_continuous(&mut self, enabled: bool) {
        if enabled == (self.mode == ListeningMode::Continuous) {
            return;
        }

        if enabled {
            self.dictation.stop(self.recognizer.as_mut());
            self.set_mode(ListeningMode::Continuous);
            // speech end arms the session instead
            if self.state != InteractionState::Speaking {
                self.arm_continuous();
            }
        } else {
            self.set_mode(ListeningMode::Off);
            self.wake.disable(self.recognizer.as_mut());
            self.dictation.stop(self.recognizer.as_mut());
            if self.state != InteractionState::Speaking {
                self.transition(InteractionState::Idle);
            }
        }
    }

    /// Listen for the next utterance in continuous mode
    fn arm_continuous(&mut self) {
        let speaking = self.speech.is_speaking();
        if self.wake_word_enabled {
            self.dictation.stop(self.recognizer.as_mut());
            match self.wake.watch(self.recognizer.as_mut(), speaking) {
                Ok(()) => self.transition(InteractionState::AwaitingWakeWord),
                Err(err) => self.recognition_failed(err),
            }
        } else if self.dictation.is_running() {
            self.transition(InteractionState::ListeningContinuous);
        } else {
            self.start_dictation(true, InteractionState::ListeningContinuous);
        }
    }

    fn start_dictation(&mut self, continuous: bool, target: InteractionState) {
        let speaking = self.speech.is_speaking();
        match self.dictation.start(self.recognizer.as_mut(), speaking, continuous) {
            Ok(_) => self.transition(target),
            Err(err) => self.recognition_failed(err),
        }
    }

    fn recognition_failed(&mut self, err: SessionError) {
        match err {
            SessionError::UnsupportedPlatform => {
                if !self.unsupported_reported {
                    warn!("speech recognition unavailable, voice input disabled");
                    self.unsupported_reported = true;
                    self.emit(StateEvent::RecognitionUnavailable);
                }
                self.wake.reset();
                self.dictation.reset();
                self.set_mode(ListeningMode::Off);
                if self.state != InteractionState::Speaking {
                    self.transition(InteractionState::Idle);
                }
            }
            SessionError::AlreadySpeaking => debug!("recognition deferred until speech ends"),
        }
    }

    fn press_mic(&mut self) {
        if self.is_busy() {
            debug!(state = %self.state, "mic press ignored while busy");
            return;
        }

        match self.state {
            InteractionState::Idle => {
                self.set_mode(ListeningMode::SingleShot);
                self.start_dictation(false, InteractionState::ListeningSingleShot);
            }
            InteractionState::ListeningSingleShot => {
                self.dictation.stop(self.recognizer.as_mut());
                self.set_mode(ListeningMode::Off);
                self.transition(InteractionState::Idle);
            }
            InteractionState::AwaitingWakeWord => {
                // skip the gate
                self.wake.disable(self.recognizer.as_mut());
                self.start_dictation(true, InteractionState::ListeningContinuous);
            }
            InteractionState::ListeningContinuous | InteractionState::Speaking => {
                debug!(state = %self.state, "mic press ignored");
            }
        }
    }

    fn on_platform(&mut self, event: PlatformEvent, now: Instant) {
        let speaking = self.speech.is_speaking();
        match event {
            PlatformEvent::RecognitionStarted { session, handle } => match session {
                SessionKind::Dictation => self.dictation.on_started(self.recognizer.as_mut(), handle, speaking),
                SessionKind::WakeWord => self.wake.on_started(self.recognizer.as_mut(), handle, speaking),
            },
            PlatformEvent::RecognitionResult {
                session,
                handle,
                transcript,
                is_final,
            } => self.on_transcript(session, handle, &transcript, is_final),
            PlatformEvent::RecognitionError { session, handle, code } => {
                let outcome = match session {
                    SessionKind::Dictation => self.dictation.on_error(handle, &code, speaking, now),
                    SessionKind::WakeWord => self.wake.on_error(handle, &code, speaking, now),
                };
                self.on_session_end(session, outcome);
            }
            PlatformEvent::RecognitionEnded { session, handle } => {
                let outcome = match session {
                    SessionKind::Dictation => self.dictation.on_end(handle, speaking, now),
                    SessionKind::WakeWord => self.wake.on_end(handle, speaking, now),
                };
                self.on_session_end(session, outcome);
            }
            PlatformEvent::SpeechEnded { speech_id } => {
                if self.speech.on_finished(speech_id) {
                    self.speech_done();
                }
            }
            PlatformEvent::SpeechFailed { speech_id, error } => {
                if self.speech.on_failed(speech_id, &error) {
                    self.speech_done();
                }
            }
            PlatformEvent::HostAttached { voices } => {
                info!(voices = voices.len(), "host attached");
                self.unsupported_reported = false;
                self.speech.set_voices(voices);
            }
            PlatformEvent::HostDetached => self.host_detached(),
        }
    }

    fn on_transcript(&mut self, session: SessionKind, handle: HandleId, transcript: &str, is_final: bool) {
        match session {
            SessionKind::WakeWord => {
                if self.wake.on_result(self.recognizer.as_mut(), handle, transcript) {
                    self.emit(StateEvent::WakeWordDetected);
                    self.start_dictation(true, InteractionState::ListeningContinuous);
                }
            }
            SessionKind::Dictation => {
                if !is_final || !self.dictation.accepts_result(handle) {
                    debug!(%handle, is_final, "dictation result ignored");
                    return;
                }

                match self.state {
                    InteractionState::ListeningSingleShot => {
                        self.dictation.stop(self.recognizer.as_mut());
                        self.set_mode(ListeningMode::Off);
                        self.transition(InteractionState::Idle);
                    }
                    InteractionState::ListeningContinuous => {
                        // one utterance per wake word
                        if self.wake_word_enabled {
                            self.dictation.stop(self.recognizer.as_mut());
                        }
                    }
                    _ => {
                        debug!(state = %self.state, "transcript outside a listening state ignored");
                        return;
                    }
                }

                self.submit(transcript, true);
            }
        }
    }

    fn on_session_end(&mut self, session: SessionKind, outcome: EndOutcome) {
        match outcome {
            EndOutcome::Ignored => {}
            EndOutcome::RestartScheduled(_) => debug!(%session, "recognition will restart"),
            EndOutcome::Stopped => {
                if session == SessionKind::Dictation && self.state == InteractionState::ListeningSingleShot {
                    self.set_mode(ListeningMode::Off);
                    self.transition(InteractionState::Idle);
                }
            }
        }
    }

    fn submit(&mut self, text: &str, is_voice: bool) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if self.in_flight.is_some() {
            warn!(is_voice, "request already in flight, input dropped");
            return;
        }

        let utterance = Utterance::user(text, is_voice);
        let utterance_id = utterance.id;
        self.conversation.push(utterance.clone());
        self.emit(StateEvent::UtteranceAdded { utterance });
        self.in_flight = Some(utterance_id);

        let backend = Arc::clone(&self.backend);
        let input_tx = self.input_tx.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            let reply = respond(backend, &text, is_voice).await;
            let pending = PendingReply {
                utterance_id,
                is_voice,
                reply,
            };
            if input_tx.send(ControllerInput::Reply(pending)).await.is_err() {
                debug!("controller gone, reply dropped");
            }
        });
    }

    fn on_reply(&mut self, pending: PendingReply) {
        if self.in_flight != Some(pending.utterance_id) {
            debug!(id = %pending.utterance_id, "reply for unknown request ignored");
            return;
        }
        self.in_flight = None;

        let PendingReply {
            utterance_id,
            is_voice,
            reply,
        } = pending;

        let status = if reply.is_error {
            DeliveryStatus::Failed
        } else {
            DeliveryStatus::Delivered
        };
        if self.conversation.set_status(utterance_id, status) {
            self.emit(StateEvent::UtteranceUpdated {
                id: utterance_id,
                status,
            });
        }

        let answer = Utterance::assistant(&reply.display, reply.is_command, reply.is_error);
        self.conversation.push(answer.clone());
        self.emit(StateEvent::UtteranceAdded { utterance: answer });

        match reply.speech.filter(|_| is_voice && self.speak_responses) {
            Some(text) => self.speak(&text),
            None => self.resume_listening(),
        }
    }

    fn speak(&mut self, text: &str) {
        self.dictation.stop(self.recognizer.as_mut());
        self.wake.disable(self.recognizer.as_mut());

        match self.speech.speak(self.synthesizer.as_mut(), text) {
            Some(_) => {
                self.emit(StateEvent::SpeakingStarted);
                self.transition(InteractionState::Speaking);
            }
            None => self.resume_listening(),
        }
    }

    fn resume_listening(&mut self) {
        if self.mode == ListeningMode::Continuous {
            self.arm_continuous();
        }
    }

    fn speech_done(&mut self) {
        self.emit(StateEvent::SpeakingFinished);
        if self.mode == ListeningMode::Continuous {
            self.arm_continuous();
        } else {
            self.set_mode(ListeningMode::Off);
            self.transition(InteractionState::Idle);
        }
    }

    fn host_detached(&mut self) {
        warn!("host detached, voice interaction reset");
        self.wake.reset();
        self.dictation.reset();
        self.speech.reset();
        self.set_mode(ListeningMode::Off);
        self.transition(InteractionState::Idle);
    }

    fn set_mode(&mut self, mode: ListeningMode) {
        if self.mode == mode {
            return;
        }
        debug!(from = %self.mode, to = %mode, "listening mode changed");
        self.mode = mode;
        self.emit(StateEvent::ListeningModeChanged { mode });
    }

    fn transition(&mut self, to: InteractionState) {
        let from = self.state;
        if from == to {
            return;
        }

        let duration_ms = self.state_entered_at.elapsed().as_millis() as u64;
        info!(from = %from, to = %to, duration_ms, "state transition");

        self.state = to;
        self.state_entered_at = Instant::now();
        self.emit(StateEvent::StateChanged { from, to, duration_ms });
    }

    fn emit(&self, event: StateEvent) {
        debug!(%event, "emitting event");
        let _ = self.event_tx.send(event);
    }

    fn check_exclusion(&self) {
        debug_assert!(
            !(self.speech.is_speaking()
                && (self.dictation.is_active() || self.wake.session().is_active())),
            "recognition active while speaking"
        );
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
