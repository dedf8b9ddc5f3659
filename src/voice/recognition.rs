//! Recognition session lifecycle
//!
//! A session owns at most one live platform handle and tracks it through
//! Idle -> Starting -> Active -> Stopping -> Idle. Events carrying a handle
//! other than the current one are stale and ignored, so a superseded handle
//! can never drive the state of its replacement.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::platform::{HandleId, RecognitionRequest, Recognizer, SessionKind};

/// Lifecycle state of a recognition session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

/// Errors returned when a session cannot start
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("speech recognition is not supported by the host")]
    UnsupportedPlatform,

    #[error("cannot listen while speech output is active")]
    AlreadySpeaking,
}

/// What happened when the platform ended a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOutcome {
    /// Event belonged to a superseded handle
    Ignored,
    /// Session is idle and stays idle
    Stopped,
    /// Session is idle and will restart at the given instant
    RestartScheduled(Instant),
}

/// One platform recognition session (dictation or wake word)
#[derive(Debug)]
pub struct RecognitionSession {
    kind: SessionKind,
    state: RecognitionState,
    handle: Option<HandleId>,
    next_handle: u64,
    continuous: bool,
    interim_results: bool,
    language: String,
    /// Desired terminal state is Idle even if the start is still pending
    stop_requested: bool,
    restart_at: Option<Instant>,
    cooldown: Duration,
    last_error: Option<String>,
}

impl RecognitionSession {
    pub fn new(kind: SessionKind, interim_results: bool, language: &str, cooldown: Duration) -> Self {
        Self {
            kind,
            state: RecognitionState::Idle,
            handle: None,
            next_handle: 0,
            continuous: false,
            interim_results,
            language: language.to_string(),
            stop_requested: false,
            restart_at: None,
            cooldown,
            last_error: None,
        }
    }

    pub fn state(&self) -> RecognitionState {
        self.state
    }

    pub fn handle(&self) -> Option<HandleId> {
        self.handle
    }

    pub fn is_active(&self) -> bool {
        self.state == RecognitionState::Active
    }

    /// Starting, active, or waiting on a restart; a handle already told to
    /// stop does not count
    pub fn is_running(&self) -> bool {
        let live = matches!(self.state, RecognitionState::Starting | RecognitionState::Active);
        (live && !self.stop_requested) || self.restart_at.is_some()
    }

    pub fn restart_deadline(&self) -> Option<Instant> {
        self.restart_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Request a new platform handle
    ///
    /// Any handle still starting or active is stopped first, so at most one
    /// handle per session is ever live.
    pub fn start(
        &mut self,
        recognizer: &mut dyn Recognizer,
        speaking: bool,
        continuous: bool,
    ) -> Result<HandleId, SessionError> {
        if !recognizer.recognition_supported() {
            return Err(SessionError::UnsupportedPlatform);
        }
        if speaking {
            debug!(session = %self.kind, "start refused while speaking");
            return Err(SessionError::AlreadySpeaking);
        }

        self.restart_at = None;
        if let Some(old) = self.handle.take() {
            let live = matches!(self.state, RecognitionState::Starting | RecognitionState::Active);
            if live && !self.stop_requested {
                debug!(session = %self.kind, handle = %old, "stopping previous handle");
                recognizer.stop_recognition(self.kind, old);
            }
        }

        self.next_handle += 1;
        let handle = HandleId(self.next_handle);
        self.handle = Some(handle);
        self.state = RecognitionState::Starting;
        self.continuous = continuous;
        self.stop_requested = false;

        info!(session = %self.kind, %handle, continuous, "starting recognition");
        recognizer.start_recognition(&RecognitionRequest {
            session: self.kind,
            handle,
            continuous,
            interim_results: self.interim_results,
            language: self.language.clone(),
        });

        Ok(handle)
    }

    /// Request cancellation; safe from any state
    pub fn stop(&mut self, recognizer: &mut dyn Recognizer) {
        self.restart_at = None;

        let Some(handle) = self.handle else {
            return;
        };

        match self.state {
            RecognitionState::Idle | RecognitionState::Stopping => {}
            RecognitionState::Starting => {
                if !self.stop_requested {
                    self.stop_requested = true;
                    recognizer.stop_recognition(self.kind, handle);
                }
            }
            RecognitionState::Active => {
                self.stop_requested = true;
                self.state = RecognitionState::Stopping;
                recognizer.stop_recognition(self.kind, handle);
            }
        }
    }

    /// Platform confirmed the handle is listening
    pub fn on_started(&mut self, recognizer: &mut dyn Recognizer, handle: HandleId, speaking: bool) {
        if self.handle != Some(handle) || self.state != RecognitionState::Starting {
            debug!(session = %self.kind, %handle, "stale start event ignored");
            return;
        }

        if self.stop_requested || speaking {
            // stop was requested before the platform caught up
            self.stop_requested = true;
            self.state = RecognitionState::Stopping;
            recognizer.stop_recognition(self.kind, handle);
        } else {
            self.state = RecognitionState::Active;
            debug!(session = %self.kind, %handle, "recognition active");
        }
    }

    /// Whether a transcript for `handle` should be routed
    pub fn accepts_result(&self, handle: HandleId) -> bool {
        self.handle == Some(handle) && self.state == RecognitionState::Active
    }

    /// Platform reported an error; never fatal, always ends the handle
    pub fn on_error(&mut self, handle: HandleId, code: &str, speaking: bool, now: Instant) -> EndOutcome {
        if self.handle != Some(handle) {
            debug!(session = %self.kind, %handle, code, "stale error event ignored");
            return EndOutcome::Ignored;
        }

        warn!(session = %self.kind, %handle, code, "recognition error");
        self.last_error = Some(code.to_string());
        self.on_end(handle, speaking, now)
    }

    /// Platform ended the handle, naturally or after an error
    pub fn on_end(&mut self, handle: HandleId, speaking: bool, now: Instant) -> EndOutcome {
        if self.handle != Some(handle) {
            debug!(session = %self.kind, %handle, "stale end event ignored");
            return EndOutcome::Ignored;
        }

        self.handle = None;
        self.state = RecognitionState::Idle;

        if self.continuous && !self.stop_requested && !speaking {
            let at = now + self.cooldown;
            self.restart_at = Some(at);
            debug!(session = %self.kind, cooldown_ms = self.cooldown.as_millis() as u64, "restart scheduled");
            EndOutcome::RestartScheduled(at)
        } else {
            self.stop_requested = false;
            debug!(session = %self.kind, "recognition ended");
            EndOutcome::Stopped
        }
    }

    /// Schedule a restart of an idle continuous session after the cooldown
    pub fn schedule_restart(&mut self, now: Instant) {
        if self.state == RecognitionState::Idle {
            self.continuous = true;
            self.restart_at = Some(now + self.cooldown);
        }
    }

    /// Fire a due restart; returns `None` when nothing was attempted
    pub fn poll_restart(
        &mut self,
        recognizer: &mut dyn Recognizer,
        speaking: bool,
        now: Instant,
    ) -> Option<Result<HandleId, SessionError>> {
        match self.restart_at {
            Some(at) if at <= now => {
                self.restart_at = None;
                if self.state != RecognitionState::Idle || speaking {
                    return None;
                }
                Some(self.start(recognizer, speaking, self.continuous))
            }
            _ => None,
        }
    }

    /// Forget all platform state without issuing platform calls
    pub fn reset(&mut self) {
        self.state = RecognitionState::Idle;
        self.handle = None;
        self.stop_requested = false;
        self.restart_at = None;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::voice::platform::PlatformCommand;

    /// Records every platform call
    #[derive(Default)]
    pub(crate) struct RecordingRecognizer {
        pub supported: bool,
        pub calls: Vec<PlatformCommand>,
    }

    impl RecordingRecognizer {
        pub fn supported() -> Self {
            Self {
                supported: true,
                calls: Vec::new(),
            }
        }

        fn starts(&self) -> usize {
            self.calls
                .iter()
                .filter(|c| matches!(c, PlatformCommand::StartRecognition(_)))
                .count()
        }

        fn stops(&self) -> usize {
            self.calls
                .iter()
                .filter(|c| matches!(c, PlatformCommand::StopRecognition { .. }))
                .count()
        }
    }

    impl Recognizer for RecordingRecognizer {
        fn recognition_supported(&self) -> bool {
            self.supported
        }

        fn start_recognition(&mut self, request: &RecognitionRequest) {
            self.calls.push(PlatformCommand::StartRecognition(request.clone()));
        }

        fn stop_recognition(&mut self, session: SessionKind, handle: HandleId) {
            self.calls.push(PlatformCommand::StopRecognition { session, handle });
        }
    }

    fn dictation() -> RecognitionSession {
        RecognitionSession::new(SessionKind::Dictation, false, "en-US", Duration::from_millis(500))
    }

    #[test]
    fn test_start_requests_final_results_only() {
        let mut rec = RecordingRecognizer::supported();
        let mut session = dictation();

        let handle = session.start(&mut rec, false, true).unwrap();
        assert_eq!(session.state(), RecognitionState::Starting);
        assert_eq!(
            rec.calls[0],
            PlatformCommand::StartRecognition(RecognitionRequest {
                session: SessionKind::Dictation,
                handle,
                continuous: true,
                interim_results: false,
                language: "en-US".to_string(),
            })
        );

        session.on_started(&mut rec, handle, false);
        assert_eq!(session.state(), RecognitionState::Active);
    }

    #[test]
    fn test_unsupported_platform() {
        let mut rec = RecordingRecognizer::default();
        let mut session = dictation();
        assert_eq!(
            session.start(&mut rec, false, false),
            Err(SessionError::UnsupportedPlatform)
        );
        assert!(rec.calls.is_empty());
    }

    #[test]
    fn test_refuses_start_while_speaking() {
        let mut rec = RecordingRecognizer::supported();
        let mut session = dictation();
        assert_eq!(session.start(&mut rec, true, false), Err(SessionError::AlreadySpeaking));
        assert_eq!(session.state(), RecognitionState::Idle);
        assert!(rec.calls.is_empty());
    }

    #[test]
    fn test_stop_on_idle_is_noop() {
        let mut rec = RecordingRecognizer::supported();
        let mut session = dictation();
        session.stop(&mut rec);
        session.stop(&mut rec);
        assert_eq!(session.state(), RecognitionState::Idle);
        assert!(rec.calls.is_empty());
    }

    #[test]
    fn test_stop_while_starting_reaches_idle() {
        let mut rec = RecordingRecognizer::supported();
        let mut session = dictation();
        let now = Instant::now();

        let handle = session.start(&mut rec, false, true).unwrap();
        session.stop(&mut rec);
        assert_eq!(session.state(), RecognitionState::Starting);

        // platform ignores the early stop and reports start anyway
        session.on_started(&mut rec, handle, false);
        assert_eq!(session.state(), RecognitionState::Stopping);
        assert_eq!(rec.stops(), 2);

        assert_eq!(session.on_end(handle, false, now), EndOutcome::Stopped);
        assert_eq!(session.state(), RecognitionState::Idle);
        assert!(session.restart_deadline().is_none());
    }

    #[test]
    fn test_pending_stop_is_not_running() {
        let mut rec = RecordingRecognizer::supported();
        let mut session = dictation();
        let now = Instant::now();

        let first = session.start(&mut rec, false, false).unwrap();
        session.stop(&mut rec);
        assert!(!session.is_running());

        // the replacement does not stop the old handle a second time
        let second = session.start(&mut rec, false, true).unwrap();
        assert_eq!(rec.stops(), 1);
        assert!(session.is_running());

        session.on_started(&mut rec, first, false);
        assert_eq!(session.on_end(first, false, now), EndOutcome::Ignored);
        assert_eq!(session.state(), RecognitionState::Starting);
        assert_eq!(session.handle(), Some(second));
    }

    #[test]
    fn test_start_while_active_stops_previous_handle() {
        let mut rec = RecordingRecognizer::supported();
        let mut session = dictation();
        let now = Instant::now();

        let first = session.start(&mut rec, false, false).unwrap();
        session.on_started(&mut rec, first, false);
        let second = session.start(&mut rec, false, false).unwrap();

        assert_ne!(first, second);
        assert_eq!(
            rec.calls[1],
            PlatformCommand::StopRecognition {
                session: SessionKind::Dictation,
                handle: first
            }
        );

        // the old handle's end must not touch the new one
        assert_eq!(session.on_end(first, false, now), EndOutcome::Ignored);
        assert_eq!(session.state(), RecognitionState::Starting);
        assert_eq!(session.handle(), Some(second));
    }

    #[test]
    fn test_continuous_restart_after_cooldown() {
        let mut rec = RecordingRecognizer::supported();
        let mut session = dictation();
        let now = Instant::now();

        let handle = session.start(&mut rec, false, true).unwrap();
        session.on_started(&mut rec, handle, false);

        let outcome = session.on_end(handle, false, now);
        assert_eq!(outcome, EndOutcome::RestartScheduled(now + Duration::from_millis(500)));

        assert!(session
            .poll_restart(&mut rec, false, now + Duration::from_millis(499))
            .is_none());
        assert_eq!(rec.starts(), 1);

        let restarted = session.poll_restart(&mut rec, false, now + Duration::from_millis(500));
        assert!(matches!(restarted, Some(Ok(_))));
        assert_eq!(rec.starts(), 2);
    }

    #[test]
    fn test_single_shot_end_stays_idle() {
        let mut rec = RecordingRecognizer::supported();
        let mut session = dictation();
        let handle = session.start(&mut rec, false, false).unwrap();
        session.on_started(&mut rec, handle, false);

        assert_eq!(session.on_end(handle, false, Instant::now()), EndOutcome::Stopped);
        assert!(!session.is_running());
    }

    #[test]
    fn test_error_routes_through_restart_policy() {
        let mut rec = RecordingRecognizer::supported();
        let mut session = dictation();
        let now = Instant::now();
        let handle = session.start(&mut rec, false, true).unwrap();
        session.on_started(&mut rec, handle, false);

        let outcome = session.on_error(handle, "network", false, now);
        assert!(matches!(outcome, EndOutcome::RestartScheduled(_)));
        assert_eq!(session.last_error(), Some("network"));

        // the end event that follows the error is now stale
        assert_eq!(session.on_end(handle, false, now), EndOutcome::Ignored);
    }

    #[test]
    fn test_no_restart_while_speaking() {
        let mut rec = RecordingRecognizer::supported();
        let mut session = dictation();
        let handle = session.start(&mut rec, false, true).unwrap();
        session.on_started(&mut rec, handle, false);
        assert_eq!(session.on_end(handle, true, Instant::now()), EndOutcome::Stopped);
    }

    #[test]
    fn test_stop_cancels_pending_restart() {
        let mut rec = RecordingRecognizer::supported();
        let mut session = dictation();
        let now = Instant::now();
        let handle = session.start(&mut rec, false, true).unwrap();
        session.on_started(&mut rec, handle, false);
        session.on_end(handle, false, now);
        assert!(session.restart_deadline().is_some());

        session.stop(&mut rec);
        assert!(session.restart_deadline().is_none());
        assert!(session
            .poll_restart(&mut rec, false, now + Duration::from_secs(5))
            .is_none());
        assert_eq!(rec.starts(), 1);
    }

    #[test]
    fn test_start_event_while_speaking_never_activates() {
        let mut rec = RecordingRecognizer::supported();
        let mut session = dictation();
        let handle = session.start(&mut rec, false, true).unwrap();
        session.on_started(&mut rec, handle, true);
        assert_eq!(session.state(), RecognitionState::Stopping);
        assert!(!session.accepts_result(handle));
    }
}
