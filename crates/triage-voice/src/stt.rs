use crate::error::VoiceError;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Settings for a single capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    /// BCP 47 language tag.
    pub language: String,
    /// Keep listening after the first final result.
    pub continuous: bool,
    /// Report partial hypotheses while the speaker is still talking.
    pub interim_results: bool,
}

impl RecognitionOptions {
    /// Options used by the chat client: one utterance, with interim results.
    pub fn single_utterance(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            continuous: false,
            interim_results: true,
        }
    }
}

/// Events emitted by a recognizer during a capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Start,
    /// Every result recognised so far in this session, in order.
    Result { fragments: Vec<String> },
    Error(String),
    End,
}

/// A speech-to-text backend.
pub trait SpeechRecognizer: Send {
    /// Begins a capture session. Events for the session arrive on the
    /// returned channel, which closes after [`RecognitionEvent::End`].
    fn start(
        &mut self,
        options: RecognitionOptions,
    ) -> Result<mpsc::UnboundedReceiver<RecognitionEvent>, VoiceError>;

    /// Ends the current capture session. Calling it with no session active
    /// does nothing.
    fn stop(&mut self);
}

/// User-facing notices raised by the voice layer instead of errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceNotice {
    RecognitionUnsupported,
}

impl VoiceNotice {
    pub fn message(self) -> &'static str {
        match self {
            Self::RecognitionUnsupported => "Speech recognition is not supported on this device.",
        }
    }
}

/// Microphone state for the chat client.
///
/// Holds the running transcript of the current capture session. Each result
/// event replaces the transcript rather than appending to it, since
/// recognizers report the whole hypothesis every time.
pub struct VoiceInput {
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    events: Option<mpsc::UnboundedReceiver<RecognitionEvent>>,
    listening: bool,
    transcript: String,
    unsupported_notified: bool,
}

impl VoiceInput {
    pub fn new(recognizer: Option<Box<dyn SpeechRecognizer>>) -> Self {
        Self {
            recognizer,
            events: None,
            listening: false,
            transcript: String::new(),
            unsupported_notified: false,
        }
    }

    /// A voice input with no recognition backend.
    pub fn unsupported() -> Self {
        Self::new(None)
    }

    pub fn is_supported(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn reset_transcript(&mut self) {
        self.transcript.clear();
    }

    /// Starts a non-continuous capture session with interim results.
    ///
    /// Without a backend this returns a notice the first time and nothing
    /// afterwards.
    pub fn start_listening(&mut self, language: &str) -> Result<Option<VoiceNotice>, VoiceError> {
        let Some(recognizer) = self.recognizer.as_mut() else {
            if self.unsupported_notified {
                return Ok(None);
            }
            self.unsupported_notified = true;
            return Ok(Some(VoiceNotice::RecognitionUnsupported));
        };

        if self.listening {
            recognizer.stop();
        }
        let rx = recognizer.start(RecognitionOptions::single_utterance(language))?;
        self.events = Some(rx);
        self.listening = true;
        debug!(language, "speech recognition started");
        Ok(None)
    }

    /// Ends capture immediately. Safe to call when not listening.
    pub fn stop_listening(&mut self) {
        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.stop();
        }
        self.listening = false;
    }

    /// Applies one recognizer event to the input state.
    pub fn apply(&mut self, event: &RecognitionEvent) {
        match event {
            RecognitionEvent::Start => self.listening = true,
            RecognitionEvent::Result { fragments } => self.transcript = fragments.concat(),
            RecognitionEvent::Error(message) => {
                warn!(error = %message, "speech recognition failed");
                self.listening = false;
            }
            RecognitionEvent::End => {
                self.listening = false;
                self.events = None;
            }
        }
    }

    /// Applies every event already queued without waiting.
    pub fn drain(&mut self) {
        while let Some(event) = self.events.as_mut().and_then(|rx| rx.try_recv().ok()) {
            self.apply(&event);
        }
    }

    /// Waits for the next recognizer event and applies it.
    ///
    /// Returns `None` when no session is active or its channel has closed;
    /// pending forever would stall a `select!` loop, so callers should only
    /// poll this while [`VoiceInput::has_session`] is true.
    pub async fn next_event(&mut self) -> Option<RecognitionEvent> {
        let event = match self.events.as_mut() {
            Some(rx) => rx.recv().await,
            None => return None,
        };
        match event {
            Some(event) => {
                self.apply(&event);
                Some(event)
            }
            None => {
                self.events = None;
                self.listening = false;
                None
            }
        }
    }

    /// Whether a capture session still has events to deliver.
    pub fn has_session(&self) -> bool {
        self.events.is_some()
    }
}

/// Recognizer backed by an external program.
///
/// The program receives the language tag as its last argument and is
/// expected to print its current hypothesis on one line whenever it changes,
/// exiting once the utterance is complete. A streaming whisper.cpp wrapper
/// fits this contract.
#[derive(Debug)]
pub struct CommandRecognizer {
    binary_path: PathBuf,
    args: Vec<String>,
    child: Option<Child>,
}

impl CommandRecognizer {
    pub fn new(binary_path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            args,
            child: None,
        }
    }

    /// Builds a recognizer from a whitespace-separated command line.
    pub fn from_command_line(command_line: &str) -> Result<Self, VoiceError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let binary = parts
            .next()
            .ok_or_else(|| VoiceError::Config("empty recognizer command".to_string()))?;
        Ok(Self::new(binary, parts.collect()))
    }
}

impl SpeechRecognizer for CommandRecognizer {
    fn start(
        &mut self,
        options: RecognitionOptions,
    ) -> Result<mpsc::UnboundedReceiver<RecognitionEvent>, VoiceError> {
        self.stop();

        let mut command = Command::new(&self.binary_path);
        command
            .args(&self.args)
            .arg(&options.language)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Stt(format!("Failed to spawn recognizer: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VoiceError::Stt("Failed to open stdout".to_string()))?;
        self.child = Some(child);

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(RecognitionEvent::Start);
        let interim = options.interim_results;

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut last = None;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        if interim {
                            let _ = tx.send(RecognitionEvent::Result {
                                fragments: vec![line.clone()],
                            });
                        }
                        last = Some(line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(RecognitionEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
            if !interim {
                if let Some(line) = last {
                    let _ = tx.send(RecognitionEvent::Result {
                        fragments: vec![line],
                    });
                }
            }
            let _ = tx.send(RecognitionEvent::End);
        });

        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "recognizer already exited");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    /// Recognizer that records how it was driven.
    #[derive(Default)]
    struct ScriptedRecognizer {
        started_with: Arc<Mutex<Vec<RecognitionOptions>>>,
        senders: Vec<mpsc::UnboundedSender<RecognitionEvent>>,
    }

    impl SpeechRecognizer for ScriptedRecognizer {
        fn start(
            &mut self,
            options: RecognitionOptions,
        ) -> Result<mpsc::UnboundedReceiver<RecognitionEvent>, VoiceError> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.push(tx);
            self.started_with.lock().unwrap().push(options);
            Ok(rx)
        }

        fn stop(&mut self) {
            self.senders.clear();
        }
    }

    #[test]
    fn missing_backend_notifies_once() {
        let mut input = VoiceInput::unsupported();
        assert_eq!(
            input.start_listening("en-US").unwrap(),
            Some(VoiceNotice::RecognitionUnsupported)
        );
        assert_eq!(input.start_listening("en-US").unwrap(), None);
        assert!(!input.is_listening());
    }

    #[test]
    fn results_replace_the_transcript() {
        let mut input = VoiceInput::unsupported();
        input.apply(&RecognitionEvent::Result {
            fragments: vec!["I have".into()],
        });
        input.apply(&RecognitionEvent::Result {
            fragments: vec!["I have a ".into(), "headache".into()],
        });
        assert_eq!(input.transcript(), "I have a headache");
    }

    #[test]
    fn start_uses_single_utterance_with_interim_results() {
        let recognizer = ScriptedRecognizer::default();
        let started_with = recognizer.started_with.clone();
        let mut input = VoiceInput::new(Some(Box::new(recognizer)));

        input.start_listening("hi-IN").unwrap();

        assert!(input.is_listening());
        assert!(input.has_session());
        assert_eq!(
            started_with.lock().unwrap().as_slice(),
            &[RecognitionOptions::single_utterance("hi-IN")]
        );
        assert!(!started_with.lock().unwrap()[0].continuous);
    }

    #[test]
    fn stopped_session_drains_to_closed() {
        let mut input = VoiceInput::new(Some(Box::new(ScriptedRecognizer::default())));
        input.start_listening("en-US").unwrap();
        input.stop_listening();
        assert!(!input.is_listening());
        // Senders were dropped by stop, so draining finds an empty closed queue.
        input.drain();
        assert_eq!(input.transcript(), "");
    }

    #[test]
    fn stop_is_idempotent() {
        let mut input = VoiceInput::unsupported();
        input.stop_listening();
        input.stop_listening();
        assert!(!input.is_listening());
    }

    #[test]
    fn error_and_end_clear_listening() {
        let mut input = VoiceInput::unsupported();
        input.apply(&RecognitionEvent::Start);
        input.apply(&RecognitionEvent::Error("no-speech".into()));
        assert!(!input.is_listening());
        input.apply(&RecognitionEvent::Start);
        input.apply(&RecognitionEvent::End);
        assert!(!input.is_listening());
    }

    #[test]
    fn empty_command_line_is_rejected() {
        assert!(matches!(
            CommandRecognizer::from_command_line("   "),
            Err(VoiceError::Config(_))
        ));
    }
}
