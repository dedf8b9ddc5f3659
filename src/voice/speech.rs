//! Speech output
//!
//! At most one utterance is audible at a time. A new `speak` cancels the
//! current one (last call wins, nothing is queued).

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, info, warn};

use super::platform::{SpeechId, SpeechRequest, Synthesizer};

static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
/// Paired markers around a word or phrase; snake_case identifiers are left alone
static EMPHASIS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\*\*(.+?)\*\*|__(.+?)__|~~(.+?)~~|`([^`]+)`|\*([^*\s](?:[^*]*[^*\s])?)\*|\b_([^_\s](?:[^_]*[^_\s])?)_\b",
    )
    .unwrap()
});
static STRAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*~`]+").unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}(?:[ \t]+|$)").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strip markdown formatting so it is not read aloud
pub fn clean_for_speech(text: &str) -> String {
    let text = LINK.replace_all(text, "$1");
    let text = EMPHASIS.replace_all(&text, |caps: &Captures<'_>| {
        caps.iter()
            .skip(1)
            .flatten()
            .next()
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    });
    let text = STRAY.replace_all(&text, "");
    let text = HEADING.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Whether a host voice name carries a tag for `language` (e.g. "en-US")
fn speaks_language(voice: &str, language: &str) -> bool {
    let primary = language.split(['-', '_']).next().unwrap_or_default();
    if primary.is_empty() {
        return false;
    }
    voice
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .any(|tag| {
            tag == primary
                || tag
                    .strip_prefix(primary)
                    .is_some_and(|rest| rest.starts_with(['-', '_']))
        })
}

pub struct SpeechOutputController {
    speaking: bool,
    current: Option<SpeechId>,
    next_id: u64,
    voice: Option<String>,
    voices: Vec<String>,
    /// Lowercased BCP 47 tag used to pick a default voice
    language: String,
    rate: f32,
    pitch: f32,
}

impl SpeechOutputController {
    pub fn new(voice: Option<String>, language: &str, rate: f32, pitch: f32) -> Self {
        Self {
            speaking: false,
            current: None,
            next_id: 0,
            voice,
            voices: Vec::new(),
            language: language.to_lowercase(),
            rate,
            pitch,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }

    pub fn set_voices(&mut self, voices: Vec<String>) {
        if self.voice.is_none() {
            let exact = voices.iter().find(|v| v.to_lowercase().contains(&self.language));
            self.voice = exact
                .or_else(|| voices.iter().find(|v| speaks_language(v, &self.language)))
                .cloned();
        }
        self.voices = voices;
    }

    pub fn select_voice(&mut self, voice: Option<String>) {
        if let Some(name) = &voice {
            if !self.voices.is_empty() && !self.voices.contains(name) {
                warn!(voice = %name, "selected voice is not offered by the host");
            }
        }
        self.voice = voice;
    }

    /// Speak `text`, superseding anything in flight
    ///
    /// Returns `None` when there is nothing to say or no synthesizer.
    pub fn speak(&mut self, synthesizer: &mut dyn Synthesizer, text: &str) -> Option<SpeechId> {
        if !synthesizer.synthesis_supported() {
            debug!("speech synthesis unavailable, skipping");
            return None;
        }

        let clean = clean_for_speech(text);
        if clean.is_empty() {
            return None;
        }

        if self.speaking {
            synthesizer.cancel();
        }

        self.next_id += 1;
        let speech_id = SpeechId(self.next_id);
        self.current = Some(speech_id);
        self.speaking = true;

        info!(speech_id = speech_id.0, chars = clean.len(), "speaking");
        synthesizer.speak(&SpeechRequest {
            speech_id,
            text: clean,
            voice: self.voice.clone(),
            rate: self.rate,
            pitch: self.pitch,
        });

        Some(speech_id)
    }

    /// Cancel immediately; safe to call repeatedly
    pub fn stop(&mut self, synthesizer: &mut dyn Synthesizer) {
        if self.speaking {
            synthesizer.cancel();
        }
        self.speaking = false;
        self.current = None;
    }

    /// Utterance completed; true if it was the current one
    pub fn on_finished(&mut self, speech_id: SpeechId) -> bool {
        if self.current != Some(speech_id) {
            debug!(speech_id = speech_id.0, "stale speech end ignored");
            return false;
        }
        self.speaking = false;
        self.current = None;
        true
    }

    /// Utterance failed; clears state the same way completion does
    pub fn on_failed(&mut self, speech_id: SpeechId, error: &str) -> bool {
        if self.current == Some(speech_id) {
            warn!(speech_id = speech_id.0, error, "speech synthesis failed");
        }
        self.on_finished(speech_id)
    }

    pub fn reset(&mut self) {
        self.speaking = false;
        self.current = None;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Default)]
    pub(crate) struct RecordingSynthesizer {
        pub spoken: Vec<SpeechRequest>,
        pub cancels: usize,
    }

    impl Synthesizer for RecordingSynthesizer {
        fn synthesis_supported(&self) -> bool {
            true
        }

        fn speak(&mut self, request: &SpeechRequest) {
            self.spoken.push(request.clone());
        }

        fn cancel(&mut self) {
            self.cancels += 1;
        }
    }

    #[test]
    fn test_clean_for_speech() {
        let text = "## Result\n**Bold** and *italic* with `code`, ~~old~~ and [the docs](https://x.io/a_b).";
        assert_eq!(
            clean_for_speech(text),
            "Result Bold and italic with code, old and the docs."
        );
    }

    #[test]
    fn test_clean_keeps_identifiers() {
        assert_eq!(
            clean_for_speech("memory_used is high, C# and _this_ too"),
            "memory_used is high, C# and this too"
        );
        assert_eq!(clean_for_speech("# Title\nissue #42"), "Title issue #42");
    }

    #[test]
    fn test_clean_collapses_whitespace() {
        assert_eq!(clean_for_speech("  one\n\ntwo   three "), "one two three");
    }

    #[test]
    fn test_speak_sets_and_clears_state() {
        let mut synth = RecordingSynthesizer::default();
        let mut speech = SpeechOutputController::new(None, "en-US", 0.95, 1.0);

        let id = speech.speak(&mut synth, "hello").unwrap();
        assert!(speech.is_speaking());
        assert_eq!(synth.spoken[0].rate, 0.95);

        assert!(speech.on_finished(id));
        assert!(!speech.is_speaking());
    }

    #[test]
    fn test_failure_clears_state() {
        let mut synth = RecordingSynthesizer::default();
        let mut speech = SpeechOutputController::new(None, "en-US", 1.0, 1.0);
        let id = speech.speak(&mut synth, "hello").unwrap();
        assert!(speech.on_failed(id, "audio-busy"));
        assert!(!speech.is_speaking());
    }

    #[test]
    fn test_last_call_wins() {
        let mut synth = RecordingSynthesizer::default();
        let mut speech = SpeechOutputController::new(None, "en-US", 1.0, 1.0);

        let first = speech.speak(&mut synth, "first").unwrap();
        let second = speech.speak(&mut synth, "second").unwrap();
        assert_eq!(synth.cancels, 1);

        // the cancelled utterance reporting its end must not clear the flag
        assert!(!speech.on_finished(first));
        assert!(speech.is_speaking());
        assert!(speech.on_finished(second));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut synth = RecordingSynthesizer::default();
        let mut speech = SpeechOutputController::new(None, "en-US", 1.0, 1.0);
        speech.speak(&mut synth, "hello");
        speech.stop(&mut synth);
        speech.stop(&mut synth);
        assert_eq!(synth.cancels, 1);
        assert!(!speech.is_speaking());
    }

    #[test]
    fn test_markup_only_text_is_not_spoken() {
        let mut synth = RecordingSynthesizer::default();
        let mut speech = SpeechOutputController::new(None, "en-US", 1.0, 1.0);
        assert!(speech.speak(&mut synth, "** ##").is_none());
        assert!(synth.spoken.is_empty());
    }

    #[test]
    fn test_default_voice_from_host_list() {
        let mut speech = SpeechOutputController::new(None, "en-US", 1.0, 1.0);
        speech.set_voices(vec!["Thomas (fr-FR)".to_string(), "Samantha (en-US)".to_string()]);
        assert_eq!(speech.voice(), Some("Samantha (en-US)"));
    }

    #[test]
    fn test_default_voice_matches_language_tag() {
        let voices = vec![
            "Helena (de-DE)".to_string(),
            "Daniel (en-GB)".to_string(),
            "Karen (en-AU)".to_string(),
        ];

        let mut speech = SpeechOutputController::new(None, "en-AU", 1.0, 1.0);
        speech.set_voices(voices.clone());
        assert_eq!(speech.voice(), Some("Karen (en-AU)"));

        let mut speech = SpeechOutputController::new(None, "en-US", 1.0, 1.0);
        speech.set_voices(voices.clone());
        assert_eq!(speech.voice(), Some("Daniel (en-GB)"));

        let mut speech = SpeechOutputController::new(None, "ja-JP", 1.0, 1.0);
        speech.set_voices(voices);
        assert_eq!(speech.voice(), None);
    }
}
