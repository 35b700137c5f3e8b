//! `triage-chat`: a terminal front-end for the triage assistant.
//!
//! Reads lines from stdin and drives a [`ChatSession`] against a running
//! `triage-server`. Lines starting with `/` are commands; see `/help`.

use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing_subscriber::EnvFilter;
use triage_client::session::FOOTER_DISCLAIMER;
use triage_client::{
    render_message, ChatSession, ClientConfig, EmergencyCall, MicToggle, RelayClient,
    SendOutcome, SessionEvent,
};
use triage_types::{Role, LANGUAGES};
use triage_voice::{CommandRecognizer, EspeakSynthesizer, VoiceInput, VoiceOutput};

const VOICE_POLL_INTERVAL: Duration = Duration::from_millis(200);

const HELP: &str = "\
Commands:
  /call        place the emergency call offered by the latest assessment
  /speak       read the latest reply aloud
  /stop        stop reading aloud
  /mic         start or stop voice input
  /lang [tag]  show languages, or switch to one (e.g. /lang hi-IN)
  /help        show this help
  /quit        exit";

fn voice_input(config: &ClientConfig) -> VoiceInput {
    let Some(command) = config.stt_command.as_deref() else {
        return VoiceInput::unsupported();
    };
    match CommandRecognizer::from_command_line(command) {
        Ok(recognizer) => VoiceInput::new(Some(Box::new(recognizer))),
        Err(e) => {
            tracing::warn!(error = %e, "voice input disabled");
            VoiceInput::unsupported()
        }
    }
}

fn print_welcome(session: &ChatSession) {
    println!("Welcome to Sevai, an AI health assessment.");
    println!(
        "Describe your symptoms and I'll help assess the urgency level. \
I support voice input and multiple languages."
    );
    if let Some(prompts) = session.starter_prompts() {
        println!("Try one of these (type its number):");
        for (i, prompt) in prompts.iter().enumerate() {
            println!("  {}. {prompt}", i + 1);
        }
    }
    println!("{FOOTER_DISCLAIMER}");
    println!("Type /help for commands.");
}

fn print_languages(session: &ChatSession) {
    let current = session.language().code;
    for language in LANGUAGES {
        let marker = if language.code == current { "*" } else { " " };
        println!(" {marker} {:<6} {}", language.code, language.label);
    }
}

fn spawn_send(session: &ChatSession, text: String, done: &mpsc::UnboundedSender<SendOutcome>) {
    let session = session.clone();
    let done = done.clone();
    tokio::spawn(async move {
        let outcome = session.send(&text).await;
        let _ = done.send(outcome);
    });
}

fn spawn_mic_toggle(session: &ChatSession, done: &mpsc::UnboundedSender<SendOutcome>) {
    let session = session.clone();
    let done = done.clone();
    tokio::spawn(async move {
        match session.toggle_mic().await {
            Ok(MicToggle::Listening) => println!("Listening... type /mic again to send."),
            Ok(MicToggle::Stopped) => println!("Stopped listening; nothing was heard."),
            Ok(MicToggle::Submitted(outcome)) => {
                let _ = done.send(outcome);
            }
            // The notice itself arrives as a session event.
            Ok(MicToggle::Unavailable(_)) => {}
            Err(e) => eprintln!("Voice input failed: {e}"),
        }
    });
}

/// Terminal state that outlives a single reply.
struct Frontend {
    session: ChatSession,
    relay: Arc<RelayClient>,
    done: mpsc::UnboundedSender<SendOutcome>,
    /// Call actions keyed by the index of the message that offered them.
    calls: BTreeMap<usize, EmergencyCall>,
    typing_shown: bool,
    ansi: bool,
}

impl Frontend {
    /// Handles one input line. Returns `false` to exit.
    async fn handle_line(&mut self, line: &str) -> bool {
        let line = line.trim();
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" | "/exit" => return false,
            "/help" => println!("{HELP}"),
            "/call" => self.place_call().await,
            "/speak" => match self.session.speak_last_reply() {
                Ok(true) => {}
                Ok(false) => println!("Nothing to read aloud."),
                Err(e) => eprintln!("Speech output failed: {e}"),
            },
            "/stop" => self.session.stop_speaking(),
            "/mic" => spawn_mic_toggle(&self.session, &self.done),
            "/lang" if arg.is_empty() => print_languages(&self.session),
            "/lang" => match self.session.set_language(arg) {
                Ok(language) => println!("Language: {}", language.label),
                Err(e) => eprintln!("{e}"),
            },
            _ => self.submit(line),
        }
        true
    }

    fn submit(&mut self, line: &str) {
        let starter = self.session.starter_prompts().and_then(|prompts| {
            line.parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| prompts.get(i))
        });
        let text = match starter {
            Some(prompt) => prompt.to_string(),
            None => line.to_string(),
        };

        self.session.set_input(text.clone());
        if !self.session.can_submit() {
            if self.session.is_loading() {
                println!("Please wait for the current reply to finish.");
            }
            return;
        }
        spawn_send(&self.session, text, &self.done);
    }

    /// Prints the reply that just finished streaming.
    fn show_reply(&mut self, outcome: SendOutcome) {
        self.typing_shown = false;
        if outcome == SendOutcome::Rejected {
            println!("Please wait for the current reply to finish.");
            return;
        }

        let messages = self.session.messages();
        let Some((index, message)) = messages.iter().enumerate().last() else {
            return;
        };
        if message.role != Role::Assistant {
            return;
        }

        let rendered = render_message(message);
        println!("\n{}\n", rendered.to_terminal(self.ansi));
        if let Some(call) = rendered.assessment().and_then(EmergencyCall::for_assessment) {
            self.calls.insert(index, call);
            println!("Type /call to place an emergency call.");
        }
    }

    async fn place_call(&mut self) {
        let Some(call) = self.calls.values_mut().next_back() else {
            println!("No emergency call is available.");
            return;
        };
        if !call.state().is_enabled() {
            println!("{}", call.state().label());
            return;
        }

        println!("🚑 Calling...");
        match call.trigger(self.relay.as_ref()).await {
            Some(call_sid) => println!("{} (call id {call_sid})", call.state().label()),
            None => println!("The call could not be placed. Type /call to try again."),
        }
    }

    fn show_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ScrollToBottom => {
                if self.session.show_typing_indicator() && !self.typing_shown {
                    self.typing_shown = true;
                    println!("MediTriage is typing...");
                }
            }
            SessionEvent::Toast(toast) => eprintln!("{}: {}", toast.title, toast.description),
            SessionEvent::InputChanged(text) => println!("🎤 {text}"),
            SessionEvent::Voice(notice) => println!("{}", notice.message()),
        }
    }
}

#[tokio::main]
async fn main() {
    let config = ClientConfig::from_env();

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(relay = %config.relay_url, "starting triage chat");

    let relay = Arc::new(RelayClient::new(config.relay_url.clone()));
    let session = ChatSession::new(
        relay.clone(),
        voice_input(&config),
        VoiceOutput::new(Some(Box::new(EspeakSynthesizer::system()))),
    );
    if let Err(e) = session.set_language(&config.language) {
        tracing::warn!(error = %e, "keeping default language");
    }

    print_welcome(&session);

    let (done, mut finished) = mpsc::unbounded_channel();
    let mut events = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut voice_tick = tokio::time::interval(VOICE_POLL_INTERVAL);

    let mut frontend = Frontend {
        session: session.clone(),
        relay,
        done,
        calls: BTreeMap::new(),
        typing_shown: false,
        ansi: std::io::stdout().is_terminal(),
    };

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !frontend.handle_line(&line).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read input");
                    break;
                }
            },
            Some(outcome) = finished.recv() => frontend.show_reply(outcome),
            event = events.recv() => match event {
                Ok(event) => frontend.show_event(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "dropped session events");
                }
                Err(RecvError::Closed) => break,
            },
            _ = voice_tick.tick() => session.poll_voice(),
        }
    }

    session.stop_speaking();
    tracing::info!("triage chat closed");
}

