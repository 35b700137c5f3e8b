//! Voice input and output for the triage client.
//!
//! Speech recognition and synthesis are platform capabilities that may be
//! missing entirely. Both sides are expressed as traits
//! ([`SpeechRecognizer`], [`SpeechSynthesizer`]) wrapped by small state
//! holders ([`VoiceInput`], [`VoiceOutput`]) that degrade to a notice or a
//! no-op when no backend is configured.
//!
//! Default backends run external programs: any command that prints interim
//! transcripts line by line for recognition, and `espeak-ng` for synthesis.

pub mod error;
pub mod stt;
pub mod text;
pub mod tts;

pub use error::VoiceError;
pub use stt::{
    CommandRecognizer, RecognitionEvent, RecognitionOptions, SpeechRecognizer, VoiceInput,
    VoiceNotice,
};
pub use text::speech_text;
pub use tts::{EspeakSynthesizer, SpeechSynthesizer, Utterance, VoiceOutput};
