use crate::error::VoiceError;
use crate::text::speech_text;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;

/// Maximum text input size for TTS (64 KiB).
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Speech rate used for assistant replies, slightly slower than normal.
const DEFAULT_RATE: f32 = 0.95;

/// espeak-ng speaking speed at rate 1.0, in words per minute.
const ESPEAK_BASE_WPM: f32 = 175.0;

/// A request to speak some text.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// BCP 47 language tag.
    pub language: String,
    /// Speed multiplier (1.0 is normal).
    pub rate: f32,
    /// Pitch multiplier (1.0 is normal).
    pub pitch: f32,
}

/// A text-to-speech backend.
pub trait SpeechSynthesizer: Send {
    /// Starts speaking. Returns once playback has begun, not when it ends.
    fn speak(&mut self, utterance: Utterance) -> Result<(), VoiceError>;

    /// Silences the current utterance, if any.
    fn cancel(&mut self);
}

/// Speech output for assistant messages.
///
/// At most one utterance is audible: every call to [`VoiceOutput::speak`]
/// cancels whatever was playing first.
pub struct VoiceOutput {
    synthesizer: Option<Box<dyn SpeechSynthesizer>>,
    rate: f32,
}

impl VoiceOutput {
    pub fn new(synthesizer: Option<Box<dyn SpeechSynthesizer>>) -> Self {
        Self {
            synthesizer,
            rate: DEFAULT_RATE,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.synthesizer.is_some()
    }

    /// Speaks `text` in `language` after stripping markdown.
    ///
    /// Returns `Ok(false)` without doing anything when no synthesizer is
    /// available.
    pub fn speak(&mut self, text: &str, language: &str) -> Result<bool, VoiceError> {
        let Some(synthesizer) = self.synthesizer.as_mut() else {
            return Ok(false);
        };

        synthesizer.cancel();
        synthesizer.speak(Utterance {
            text: speech_text(text),
            language: language.to_string(),
            rate: self.rate,
            pitch: 1.0,
        })?;
        Ok(true)
    }

    pub fn cancel(&mut self) {
        if let Some(synthesizer) = self.synthesizer.as_mut() {
            synthesizer.cancel();
        }
    }
}

/// Synthesizer that plays speech through `espeak-ng`.
#[derive(Debug)]
pub struct EspeakSynthesizer {
    binary_path: PathBuf,
    child: Option<Child>,
}

impl EspeakSynthesizer {
    pub fn new(binary_path: impl AsRef<Path>) -> Self {
        Self {
            binary_path: binary_path.as_ref().to_path_buf(),
            child: None,
        }
    }

    /// Looks for `espeak-ng` on `PATH`.
    pub fn system() -> Self {
        Self::new("espeak-ng")
    }
}

/// Maps a BCP 47 tag onto an espeak-ng voice name.
///
/// espeak-ng knows regional English voices but only base voices for most
/// other languages.
pub fn espeak_voice(language: &str) -> String {
    let lower = language.to_ascii_lowercase();
    match lower.as_str() {
        "en-us" | "en-gb" => lower,
        _ => lower.split('-').next().unwrap_or("en").to_string(),
    }
}

impl SpeechSynthesizer for EspeakSynthesizer {
    fn speak(&mut self, utterance: Utterance) -> Result<(), VoiceError> {
        if utterance.text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                utterance.text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }
        if utterance.rate < 0.1 || utterance.rate > 10.0 {
            return Err(VoiceError::Config(
                "Speed must be between 0.1 and 10.0".to_string(),
            ));
        }

        let wpm = (ESPEAK_BASE_WPM * utterance.rate).round() as u32;
        let pitch = (50.0 * utterance.pitch).clamp(0.0, 99.0).round() as u32;

        let mut command = Command::new(&self.binary_path);
        command
            .arg("-v")
            .arg(espeak_voice(&utterance.language))
            .arg("-s")
            .arg(wpm.to_string())
            .arg("-p")
            .arg(pitch.to_string())
            .arg("--")
            .arg(&utterance.text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| VoiceError::Tts(format!("Failed to spawn espeak-ng: {}", e)))?;
        self.child = Some(child);
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "utterance already finished");
            }
        }
    }
}
