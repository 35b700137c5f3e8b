//! Client side of the triage assistant.
//!
//! [`session::ChatSession`] owns the conversation and merges streamed
//! replies; [`render`] and [`markdown`] turn replies into displayable text
//! and an optional [`urgency::UrgencyCard`]; [`transport::RelayClient`]
//! talks to `triage-server`.

pub mod config;
pub mod error;
pub mod markdown;
pub mod render;
pub mod session;
pub mod transport;
pub mod urgency;

pub use config::ClientConfig;
pub use error::ClientError;
pub use render::{extract_assessment, render_message, strip_assessment, RenderedMessage};
pub use session::{ChatSession, MicToggle, SendOutcome, SessionEvent, Toast};
pub use transport::{ChatTransport, DeltaStream, EmergencyDispatcher, RelayClient};
pub use urgency::{CallState, EmergencyCall, UrgencyCard};
