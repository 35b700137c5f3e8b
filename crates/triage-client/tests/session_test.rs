use async_trait::async_trait;
use futures_util::stream;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, oneshot, Notify};
use triage_client::session::STARTER_PROMPTS;
use triage_client::{
    render_message, CallState, ChatSession, ChatTransport, ClientError, DeltaStream, MicToggle,
    SendOutcome, SessionEvent, UrgencyCard,
};
use triage_types::{Message, Role, UrgencyLevel};
use triage_voice::{
    RecognitionEvent, RecognitionOptions, SpeechRecognizer, SpeechSynthesizer, Utterance,
    VoiceError, VoiceInput, VoiceNotice, VoiceOutput,
};

/// Replies with a fixed list of deltas and records every transcript sent.
struct ScriptedTransport {
    deltas: Vec<Result<String, ClientError>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedTransport {
    fn new(deltas: Vec<Result<String, ClientError>>) -> Arc<Self> {
        Arc::new(Self {
            deltas,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn replying(deltas: &[&str]) -> Arc<Self> {
        Self::new(deltas.iter().map(|d| Ok(d.to_string())).collect())
    }
}

fn clone_result(item: &Result<String, ClientError>) -> Result<String, ClientError> {
    match item {
        Ok(text) => Ok(text.clone()),
        Err(ClientError::Relay { status, message }) => Err(ClientError::Relay {
            status: *status,
            message: message.clone(),
        }),
        Err(other) => Err(ClientError::Stream(other.to_string())),
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn stream_chat(&self, messages: &[Message]) -> Result<DeltaStream, ClientError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let items: Vec<_> = self.deltas.iter().map(clone_result).collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

/// Holds the reply open until released, to observe the session mid-stream.
struct GatedTransport {
    opened: Notify,
    release: Mutex<Option<oneshot::Receiver<()>>>,
}

#[async_trait]
impl ChatTransport for GatedTransport {
    async fn stream_chat(&self, _messages: &[Message]) -> Result<DeltaStream, ClientError> {
        let gate = self.release.lock().unwrap().take().unwrap();
        self.opened.notify_one();
        let deltas = async_stream::stream! {
            let _ = gate.await;
            yield Ok::<_, ClientError>("done".to_string());
        };
        Ok(Box::pin(deltas))
    }
}

struct FailingTransport;

#[async_trait]
impl ChatTransport for FailingTransport {
    async fn stream_chat(&self, _messages: &[Message]) -> Result<DeltaStream, ClientError> {
        Err(ClientError::Relay {
            status: 500,
            message: String::new(),
        })
    }
}

fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn streamed_deltas_merge_into_one_reply() {
    let transport = ScriptedTransport::replying(&["Hel", "lo", " world"]);
    let session = ChatSession::text_only(transport.clone());
    let mut events = session.subscribe();

    assert_eq!(session.send("  hi  ").await, SendOutcome::Accepted);

    assert_eq!(
        session.messages(),
        vec![Message::user("hi"), Message::assistant("Hello world")]
    );
    assert!(!session.is_loading());
    assert_eq!(
        transport.seen.lock().unwrap().as_slice(),
        &[vec![Message::user("hi")]]
    );
    // user message, three deltas, completion
    let scrolls = drain_events(&mut events)
        .into_iter()
        .filter(|e| *e == SessionEvent::ScrollToBottom)
        .count();
    assert_eq!(scrolls, 5);
}

#[tokio::test]
async fn each_turn_gets_its_own_reply_and_full_history() {
    let transport = ScriptedTransport::replying(&["Noted."]);
    let session = ChatSession::text_only(transport.clone());

    session.send("I have a fever").await;
    session.send("Two days").await;

    let messages = session.messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[1], Message::assistant("Noted."));
    assert_eq!(messages[3], Message::assistant("Noted."));
    let seen = transport.seen.lock().unwrap();
    assert_eq!(seen[1].len(), 3);
    assert_eq!(seen[1][2], Message::user("Two days"));
}

#[tokio::test]
async fn blank_input_is_rejected_without_side_effects() {
    let transport = ScriptedTransport::replying(&["unused"]);
    let session = ChatSession::text_only(transport.clone());
    let mut events = session.subscribe();
    session.set_input(" \n ");

    assert!(!session.can_submit());
    assert_eq!(session.submit().await, SendOutcome::Rejected);
    assert!(session.messages().is_empty());
    assert!(drain_events(&mut events).is_empty());
    assert!(transport.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn send_while_streaming_is_rejected() {
    let (release, gate) = oneshot::channel();
    let transport = Arc::new(GatedTransport {
        opened: Notify::new(),
        release: Mutex::new(Some(gate)),
    });
    let session = ChatSession::text_only(transport.clone());

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.send("Chest pain").await }
    });
    transport.opened.notified().await;

    assert!(session.is_loading());
    assert!(session.show_typing_indicator());
    session.set_input("another");
    assert!(!session.can_submit());
    assert_eq!(session.send("another").await, SendOutcome::Rejected);
    assert_eq!(session.messages(), vec![Message::user("Chest pain")]);

    release.send(()).unwrap();
    assert_eq!(first.await.unwrap(), SendOutcome::Accepted);
    assert!(!session.show_typing_indicator());
    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.pending_input(), "another");
}

#[tokio::test]
async fn mid_stream_failure_keeps_partial_reply_and_raises_toast() {
    let transport = ScriptedTransport::new(vec![
        Ok("Partial".to_string()),
        Err(ClientError::Relay {
            status: 429,
            message: "Rate limit exceeded. Please try again shortly.".to_string(),
        }),
    ]);
    let session = ChatSession::text_only(transport);
    let mut events = session.subscribe();

    assert_eq!(session.send("hello").await, SendOutcome::Accepted);

    assert_eq!(
        session.messages(),
        vec![Message::user("hello"), Message::assistant("Partial")]
    );
    assert!(!session.is_loading());
    let toasts: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::Toast(toast) => Some(toast),
            _ => None,
        })
        .collect();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].title, "Error");
    assert_eq!(
        toasts[0].description,
        "Rate limit exceeded. Please try again shortly."
    );
}

#[tokio::test]
async fn failure_without_message_uses_generic_toast() {
    let session = ChatSession::text_only(Arc::new(FailingTransport));
    let mut events = session.subscribe();

    session.send("hello").await;

    assert_eq!(session.messages(), vec![Message::user("hello")]);
    assert!(!session.is_loading());
    let toast = drain_events(&mut events).into_iter().find_map(|e| match e {
        SessionEvent::Toast(toast) => Some(toast),
        _ => None,
    });
    assert_eq!(toast.unwrap().description, "Something went wrong");
}

#[tokio::test]
async fn chest_pain_reply_offers_emergency_call() {
    let reply = "These symptoms need immediate attention.\n\n```json\n{\"urgency\":\"emergency\",\"confidence\":0.95,\"red_flags\":[\"chest pain\"],\"symptoms_analyzed\":[\"chest pain\"],\"reasoning\":\"Possible cardiac event.\",\"recommendations\":[\"Call emergency services now\"],\"trigger_emergency_call\":true}\n```";
    let session = ChatSession::text_only(ScriptedTransport::replying(&[reply]));

    assert_eq!(session.starter_prompts(), Some(&STARTER_PROMPTS[..]));
    session.send(STARTER_PROMPTS[1]).await;
    assert_eq!(session.starter_prompts(), None);

    let messages = session.messages();
    let rendered = render_message(&messages[1]);
    let card = UrgencyCard::new(rendered.assessment().unwrap());
    assert_eq!(card.style.level, UrgencyLevel::Emergency);
    assert_eq!(card.header(), "🚨 Emergency Care — 95% confidence");
    let call = card.call.as_ref().unwrap();
    assert_eq!(call.state(), CallState::Idle);
    assert!(call.state().is_enabled());
}

struct FakeRecognizer {
    fragments: Vec<String>,
    sender: Option<mpsc::UnboundedSender<RecognitionEvent>>,
    started: Arc<Mutex<Vec<RecognitionOptions>>>,
}

impl SpeechRecognizer for FakeRecognizer {
    fn start(
        &mut self,
        options: RecognitionOptions,
    ) -> Result<mpsc::UnboundedReceiver<RecognitionEvent>, VoiceError> {
        self.started.lock().unwrap().push(options);
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(RecognitionEvent::Start).unwrap();
        tx.send(RecognitionEvent::Result {
            fragments: self.fragments.clone(),
        })
        .unwrap();
        self.sender = Some(tx);
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(tx) = self.sender.take() {
            let _ = tx.send(RecognitionEvent::End);
        }
    }
}

#[tokio::test]
async fn microphone_round_trip_sends_the_transcript() {
    let started = Arc::new(Mutex::new(Vec::new()));
    let recognizer = FakeRecognizer {
        fragments: vec!["Chest".into(), " pain".into()],
        sender: None,
        started: started.clone(),
    };
    let transport = ScriptedTransport::replying(&["Where is the pain?"]);
    let session = ChatSession::new(
        transport,
        VoiceInput::new(Some(Box::new(recognizer))),
        VoiceOutput::new(None),
    );
    session.set_language("hi-IN").unwrap();
    let mut events = session.subscribe();

    assert_eq!(session.toggle_mic().await.unwrap(), MicToggle::Listening);
    assert_eq!(
        started.lock().unwrap().as_slice(),
        &[RecognitionOptions::single_utterance("hi-IN")]
    );

    session.poll_voice();
    assert!(session.is_listening());
    assert_eq!(session.pending_input(), "Chest pain");
    assert!(drain_events(&mut events)
        .contains(&SessionEvent::InputChanged("Chest pain".to_string())));

    assert_eq!(
        session.toggle_mic().await.unwrap(),
        MicToggle::Submitted(SendOutcome::Accepted)
    );
    assert!(!session.is_listening());
    assert_eq!(session.messages()[0], Message::user("Chest pain"));

    // The transcript was reset by the send, so polling leaves input alone.
    session.poll_voice();
    assert_eq!(session.pending_input(), "");
}

#[tokio::test]
async fn missing_recognizer_gives_one_notice() {
    let session = ChatSession::text_only(ScriptedTransport::replying(&[]));
    let mut events = session.subscribe();

    assert_eq!(
        session.toggle_mic().await.unwrap(),
        MicToggle::Unavailable(Some(VoiceNotice::RecognitionUnsupported))
    );
    assert_eq!(
        session.toggle_mic().await.unwrap(),
        MicToggle::Unavailable(None)
    );
    assert_eq!(
        drain_events(&mut events),
        vec![SessionEvent::Voice(VoiceNotice::RecognitionUnsupported)]
    );
}

struct RecordingSynthesizer {
    spoken: Arc<Mutex<Vec<Utterance>>>,
}

impl SpeechSynthesizer for RecordingSynthesizer {
    fn speak(&mut self, utterance: Utterance) -> Result<(), VoiceError> {
        self.spoken.lock().unwrap().push(utterance);
        Ok(())
    }

    fn cancel(&mut self) {}
}

#[tokio::test]
async fn latest_reply_is_read_in_selected_language() {
    let spoken = Arc::new(Mutex::new(Vec::new()));
    let session = ChatSession::new(
        ScriptedTransport::replying(&["**Rest** and hydrate.\n```json\n{}\n```"]),
        VoiceInput::unsupported(),
        VoiceOutput::new(Some(Box::new(RecordingSynthesizer {
            spoken: spoken.clone(),
        }))),
    );

    assert!(!session.speak_last_reply().unwrap());

    session.set_language("es-ES").unwrap();
    session.send("tengo fiebre").await;
    assert!(session.speak_last_reply().unwrap());

    let spoken = spoken.lock().unwrap();
    assert_eq!(spoken.len(), 1);
    assert_eq!(spoken[0].language, "es-ES");
    assert!(spoken[0].text.starts_with("Rest and hydrate"));
    assert!(!spoken[0].text.contains("json"));
}

#[test]
fn unknown_language_is_rejected() {
    let session = ChatSession::text_only(ScriptedTransport::replying(&[]));
    assert!(matches!(
        session.set_language("xx-YY"),
        Err(ClientError::UnknownLanguage(_))
    ));
    assert_eq!(session.language().code, "en-US");
    assert_eq!(
        session.messages().iter().filter(|m| m.role == Role::User).count(),
        0
    );
}
