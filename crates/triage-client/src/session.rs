//! Conversation state for one chat session.
//!
//! [`ChatSession`] is a cheap handle; clones share the same state. State sits
//! behind `std::sync::Mutex` locks that are only held between awaits, so a
//! second [`ChatSession::send`] while a reply is streaming sees the
//! in-flight flag and is rejected.

use crate::error::ClientError;
use crate::transport::ChatTransport;
use futures_util::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use triage_types::{Language, Message, Role, DEFAULT_LANGUAGE};
use triage_voice::{VoiceInput, VoiceNotice, VoiceOutput};

/// Suggestions offered while the transcript is empty.
pub const STARTER_PROMPTS: [&str; 4] = [
    "I have a headache",
    "Chest pain",
    "Fever and cough",
    "मुझे बुखार है",
];

/// Disclaimer shown with the input box.
pub const FOOTER_DISCLAIMER: &str =
    "⚕️ Not a substitute for professional medical advice. In emergencies, call your local emergency number.";

const TOAST_FALLBACK: &str = "Something went wrong";
const EVENT_CAPACITY: usize = 64;

/// A transient error notice for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub title: String,
    pub description: String,
}

impl Toast {
    fn from_error(error: &ClientError) -> Self {
        let description = error.to_string();
        Self {
            title: "Error".to_string(),
            description: if description.trim().is_empty() {
                TOAST_FALLBACK.to_string()
            } else {
                description
            },
        }
    }
}

/// Notifications for whatever is displaying the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The transcript or loading state changed; the view should follow the
    /// newest content.
    ScrollToBottom,
    Toast(Toast),
    /// The pending input was replaced by a voice transcript.
    InputChanged(String),
    Voice(VoiceNotice),
}

/// Result of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The message was added and the reply has finished streaming or failed.
    Accepted,
    /// Blank text, or a reply was still streaming. Nothing changed.
    Rejected,
}

/// Result of pressing the microphone button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicToggle {
    Listening,
    /// Capture stopped with nothing recognised.
    Stopped,
    /// Capture stopped and the transcript was sent.
    Submitted(SendOutcome),
    /// Recognition is unavailable; carries the notice the first time only.
    Unavailable(Option<VoiceNotice>),
}

struct SessionState {
    messages: Vec<Message>,
    input: String,
    loading: bool,
    /// Index of the assistant message receiving the current reply.
    streaming_target: Option<usize>,
    language: &'static Language,
}

struct Inner {
    state: Mutex<SessionState>,
    voice_in: Mutex<VoiceInput>,
    voice_out: Mutex<VoiceOutput>,
    transport: Arc<dyn ChatTransport>,
    events: broadcast::Sender<SessionEvent>,
}

#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn default_language() -> &'static Language {
    Language::find(DEFAULT_LANGUAGE).unwrap_or(&triage_types::LANGUAGES[0])
}

impl ChatSession {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        voice_in: VoiceInput,
        voice_out: VoiceOutput,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState {
                    messages: Vec::new(),
                    input: String::new(),
                    loading: false,
                    streaming_target: None,
                    language: default_language(),
                }),
                voice_in: Mutex::new(voice_in),
                voice_out: Mutex::new(voice_out),
                transport,
                events,
            }),
        }
    }

    /// A session with no voice capabilities.
    pub fn text_only(transport: Arc<dyn ChatTransport>) -> Self {
        Self::new(transport, VoiceInput::unsupported(), VoiceOutput::new(None))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.inner.state).messages.clone()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.inner.state).loading
    }

    pub fn pending_input(&self) -> String {
        lock(&self.inner.state).input.clone()
    }

    pub fn set_input(&self, text: impl Into<String>) {
        lock(&self.inner.state).input = text.into();
    }

    /// True while waiting for the first token of a reply.
    pub fn show_typing_indicator(&self) -> bool {
        let state = lock(&self.inner.state);
        state.loading && state.messages.last().is_some_and(|m| m.role == Role::User)
    }

    pub fn can_submit(&self) -> bool {
        let state = lock(&self.inner.state);
        !state.loading && !state.input.trim().is_empty()
    }

    /// Starter prompts, offered only before the first message.
    pub fn starter_prompts(&self) -> Option<&'static [&'static str]> {
        lock(&self.inner.state)
            .messages
            .is_empty()
            .then_some(&STARTER_PROMPTS[..])
    }

    pub fn language(&self) -> &'static Language {
        lock(&self.inner.state).language
    }

    /// Selects the language used for voice input and output.
    pub fn set_language(&self, code: &str) -> Result<&'static Language, ClientError> {
        let language =
            Language::find(code).ok_or_else(|| ClientError::UnknownLanguage(code.to_string()))?;
        lock(&self.inner.state).language = language;
        tracing::debug!(language = language.code, "language changed");
        Ok(language)
    }

    /// Sends the pending input.
    pub async fn submit(&self) -> SendOutcome {
        let text = self.pending_input();
        self.send(&text).await
    }

    /// Adds a user message and streams the assistant's reply into the
    /// transcript.
    ///
    /// Resolves once the reply has finished or failed. Blank text, or a call
    /// made while another reply is streaming, changes nothing.
    pub async fn send(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        let history = {
            let mut state = lock(&self.inner.state);
            if text.is_empty() || state.loading {
                return SendOutcome::Rejected;
            }
            state.messages.push(Message::user(text));
            state.input.clear();
            state.loading = true;
            state.streaming_target = None;
            state.messages.clone()
        };
        lock(&self.inner.voice_in).reset_transcript();
        self.emit(SessionEvent::ScrollToBottom);

        match self.stream_reply(&history).await {
            Ok(()) => {
                self.finish_reply();
            }
            Err(e) => {
                tracing::error!(error = %e, "chat request failed");
                self.finish_reply();
                self.emit(SessionEvent::Toast(Toast::from_error(&e)));
            }
        }
        SendOutcome::Accepted
    }

    async fn stream_reply(&self, history: &[Message]) -> Result<(), ClientError> {
        let mut deltas = self.inner.transport.stream_chat(history).await?;
        let mut reply = String::new();

        while let Some(delta) = deltas.next().await {
            reply.push_str(&delta?);
            self.merge_reply(&reply);
        }
        Ok(())
    }

    /// Writes the reply so far into the streaming target, creating it on the
    /// first delta.
    fn merge_reply(&self, reply: &str) {
        {
            let mut state = lock(&self.inner.state);
            let last = state.messages.len().checked_sub(1);
            match state.streaming_target {
                Some(index) if Some(index) == last => {
                    state.messages[index].content = reply.to_string();
                }
                _ => {
                    state.messages.push(Message::assistant(reply));
                    state.streaming_target = Some(state.messages.len() - 1);
                }
            }
        }
        self.emit(SessionEvent::ScrollToBottom);
    }

    fn finish_reply(&self) {
        {
            let mut state = lock(&self.inner.state);
            state.loading = false;
            state.streaming_target = None;
        }
        self.emit(SessionEvent::ScrollToBottom);
    }

    /// Applies queued recognizer events and copies a non-empty transcript
    /// into the pending input.
    pub fn poll_voice(&self) {
        let transcript = {
            let mut voice = lock(&self.inner.voice_in);
            voice.drain();
            voice.transcript().to_string()
        };
        self.sync_transcript(&transcript);
    }

    /// Copies a voice transcript into the pending input unless it is empty.
    pub fn sync_transcript(&self, transcript: &str) {
        if transcript.is_empty() {
            return;
        }
        let changed = {
            let mut state = lock(&self.inner.state);
            if state.input == transcript {
                false
            } else {
                state.input = transcript.to_string();
                true
            }
        };
        if changed {
            self.emit(SessionEvent::InputChanged(transcript.to_string()));
        }
    }

    pub fn is_listening(&self) -> bool {
        let mut voice = lock(&self.inner.voice_in);
        voice.drain();
        voice.is_listening()
    }

    /// Microphone button: stops and sends what was heard, or starts a new
    /// capture in the selected language.
    pub async fn toggle_mic(&self) -> Result<MicToggle, ClientError> {
        let language = self.language().code;
        let heard = {
            let mut voice = lock(&self.inner.voice_in);
            voice.drain();
            if voice.is_listening() {
                voice.stop_listening();
                Some(voice.transcript().to_string())
            } else {
                if !voice.is_supported() {
                    let notice = voice.start_listening(language)?;
                    drop(voice);
                    if let Some(notice) = notice {
                        self.emit(SessionEvent::Voice(notice));
                    }
                    return Ok(MicToggle::Unavailable(notice));
                }
                voice.start_listening(language)?;
                None
            }
        };

        match heard {
            None => Ok(MicToggle::Listening),
            Some(text) if text.is_empty() => Ok(MicToggle::Stopped),
            Some(text) => Ok(MicToggle::Submitted(self.send(&text).await)),
        }
    }

    /// Reads the message at `index` aloud. Returns `Ok(false)` when there is
    /// no such message or no synthesizer.
    pub fn speak(&self, index: usize) -> Result<bool, ClientError> {
        let (content, language) = {
            let state = lock(&self.inner.state);
            match state.messages.get(index) {
                Some(message) => (message.content.clone(), state.language.code),
                None => return Ok(false),
            }
        };
        Ok(lock(&self.inner.voice_out).speak(&content, language)?)
    }

    /// Reads the newest assistant message aloud.
    pub fn speak_last_reply(&self) -> Result<bool, ClientError> {
        let index = lock(&self.inner.state)
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant);
        match index {
            Some(index) => self.speak(index),
            None => Ok(false),
        }
    }

    pub fn stop_speaking(&self) {
        lock(&self.inner.voice_out).cancel();
    }
}
