//! Wake word gate
//!
//! Runs its own continuous recognition session with interim results and
//! reports when the configured phrase appears in any transcript. Detection
//! disarms the gate so the dictation session can take over.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::platform::{HandleId, Recognizer, SessionKind};
use super::recognition::{EndOutcome, RecognitionSession, SessionError};

pub struct WakeWordGate {
    session: RecognitionSession,
    /// Lowercased activation phrase
    phrase: String,
    armed: bool,
}

impl WakeWordGate {
    pub fn new(phrase: &str, language: &str, cooldown: Duration) -> Self {
        Self {
            session: RecognitionSession::new(SessionKind::WakeWord, true, language, cooldown),
            phrase: phrase.trim().to_lowercase(),
            armed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn session(&self) -> &RecognitionSession {
        &self.session
    }

    /// Arm the gate and start listening if not already
    pub fn watch(&mut self, recognizer: &mut dyn Recognizer, speaking: bool) -> Result<(), SessionError> {
        self.armed = true;
        if self.session.is_running() {
            return Ok(());
        }
        match self.session.start(recognizer, speaking, true) {
            Ok(_) => {
                info!(phrase = %self.phrase, "waiting for wake word");
                Ok(())
            }
            Err(e) => {
                self.armed = false;
                Err(e)
            }
        }
    }

    /// Disarm and stop; no re-arming until the next `watch`
    pub fn disable(&mut self, recognizer: &mut dyn Recognizer) {
        self.armed = false;
        self.session.stop(recognizer);
    }

    /// Case-insensitive substring match against the phrase
    pub fn matches(&self, transcript: &str) -> bool {
        !self.phrase.is_empty() && transcript.to_lowercase().contains(&self.phrase)
    }

    pub fn on_started(&mut self, recognizer: &mut dyn Recognizer, handle: HandleId, speaking: bool) {
        self.session.on_started(recognizer, handle, speaking);
    }

    /// Inspect a transcript (interim or final); true on detection
    pub fn on_result(&mut self, recognizer: &mut dyn Recognizer, handle: HandleId, transcript: &str) -> bool {
        if !self.armed || !self.session.accepts_result(handle) {
            return false;
        }
        if !self.matches(transcript) {
            return false;
        }

        info!(phrase = %self.phrase, "wake word detected");
        self.disable(recognizer);
        true
    }

    pub fn on_error(&mut self, handle: HandleId, code: &str, speaking: bool, now: Instant) -> EndOutcome {
        let outcome = self.session.on_error(handle, code, speaking, now);
        self.rearm(outcome, speaking, now)
    }

    pub fn on_end(&mut self, handle: HandleId, speaking: bool, now: Instant) -> EndOutcome {
        let outcome = self.session.on_end(handle, speaking, now);
        self.rearm(outcome, speaking, now)
    }

    fn rearm(&mut self, outcome: EndOutcome, speaking: bool, now: Instant) -> EndOutcome {
        match outcome {
            EndOutcome::RestartScheduled(_) if !self.armed => {
                self.session.reset();
                EndOutcome::Stopped
            }
            EndOutcome::Stopped if self.armed && !speaking => {
                // re-armed while the previous handle was winding down
                self.session.schedule_restart(now);
                debug!("wake word session re-armed");
                self.session
                    .restart_deadline()
                    .map(EndOutcome::RestartScheduled)
                    .unwrap_or(EndOutcome::Stopped)
            }
            other => other,
        }
    }

    pub fn restart_deadline(&self) -> Option<Instant> {
        self.session.restart_deadline()
    }

    pub fn poll_restart(
        &mut self,
        recognizer: &mut dyn Recognizer,
        speaking: bool,
        now: Instant,
    ) -> Option<Result<HandleId, SessionError>> {
        if !self.armed {
            return None;
        }
        self.session.poll_restart(recognizer, speaking, now)
    }

    pub fn reset(&mut self) {
        self.armed = false;
        self.session.reset();
    }
}
