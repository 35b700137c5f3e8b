//! View model for the urgency card shown under an assessed reply.

use crate::transport::EmergencyDispatcher;
use triage_types::{Assessment, UrgencyLevel};

/// Disclaimer printed under every urgency card.
pub const CARD_DISCLAIMER: &str =
    "This is not a medical diagnosis. Always consult a healthcare professional.";

/// Fixed presentation for one urgency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrgencyStyle {
    pub level: UrgencyLevel,
    pub label: &'static str,
    pub icon: &'static str,
}

pub fn style(level: UrgencyLevel) -> UrgencyStyle {
    let (label, icon) = match level {
        UrgencyLevel::Emergency => ("🚨 Emergency Care", "🚑"),
        UrgencyLevel::Clinic => ("🏥 Clinic Visit", "🏥"),
        UrgencyLevel::Telehealth => ("📱 Telehealth", "📱"),
        UrgencyLevel::SelfCare => ("🏠 Self-Care", "💚"),
    };
    UrgencyStyle { level, label, icon }
}

/// Confidence as a whole percentage, rounded half up.
pub fn confidence_percent(confidence: f64) -> i64 {
    (confidence * 100.0).round() as i64
}

/// Progress of the one-shot emergency call action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Calling,
    Triggered,
}

impl CallState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Trigger Emergency Call",
            Self::Calling => "Calling...",
            Self::Triggered => "Emergency Call Triggered ✓",
        }
    }

    pub fn is_enabled(self) -> bool {
        self == Self::Idle
    }
}

/// What gets sent to the call relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub symptoms: Vec<String>,
    pub urgency: Option<String>,
}

/// The emergency call button of one card.
///
/// Once a call succeeds the action stays disabled for the life of the card;
/// a failed attempt returns it to [`CallState::Idle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyCall {
    state: CallState,
    request: CallRequest,
}

impl EmergencyCall {
    /// Returns the call action for `assessment`, or `None` when the
    /// assessment does not ask for one.
    pub fn for_assessment(assessment: &Assessment) -> Option<Self> {
        assessment.requests_emergency_call().then(|| Self {
            state: CallState::Idle,
            request: CallRequest {
                symptoms: assessment.symptoms_analyzed.clone(),
                urgency: assessment.urgency.clone(),
            },
        })
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    /// Moves to [`CallState::Calling`] and hands out the request, or returns
    /// `None` when the action is not enabled.
    pub fn begin(&mut self) -> Option<CallRequest> {
        if !self.state.is_enabled() {
            return None;
        }
        self.state = CallState::Calling;
        Some(self.request.clone())
    }

    /// Records the outcome of the attempt started by [`EmergencyCall::begin`].
    pub fn finish(&mut self, succeeded: bool) {
        if self.state == CallState::Calling {
            self.state = if succeeded {
                CallState::Triggered
            } else {
                CallState::Idle
            };
        }
    }

    /// Places the call through `dispatcher`.
    ///
    /// Returns the provider's call id on success. Failures are logged and
    /// leave the action ready for another attempt.
    pub async fn trigger(&mut self, dispatcher: &dyn EmergencyDispatcher) -> Option<String> {
        let request = self.begin()?;
        match dispatcher
            .trigger_call(&request.symptoms, request.urgency.as_deref())
            .await
        {
            Ok(call_sid) => {
                tracing::info!(%call_sid, "emergency call triggered");
                self.finish(true);
                Some(call_sid)
            }
            Err(e) => {
                tracing::error!(error = %e, "emergency call failed");
                self.finish(false);
                None
            }
        }
    }
}

/// Everything the card shows for one assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct UrgencyCard {
    pub style: UrgencyStyle,
    pub confidence_percent: i64,
    pub red_flags: Vec<String>,
    pub reasoning: String,
    pub recommendations: Vec<String>,
    pub call: Option<EmergencyCall>,
}

impl UrgencyCard {
    pub fn new(assessment: &Assessment) -> Self {
        Self {
            style: style(assessment.urgency_level()),
            confidence_percent: confidence_percent(assessment.confidence),
            red_flags: assessment.red_flags.clone(),
            reasoning: assessment.reasoning.clone(),
            recommendations: assessment.recommendations.clone(),
            call: EmergencyCall::for_assessment(assessment),
        }
    }

    pub fn header(&self) -> String {
        format!(
            "{} — {}% confidence",
            self.style.label, self.confidence_percent
        )
    }

    /// The red-flags callout text, present only when flags were raised.
    pub fn red_flags_callout(&self) -> Option<String> {
        (!self.red_flags.is_empty()).then(|| self.red_flags.join(", "))
    }

    pub fn to_terminal(&self) -> String {
        let mut lines = vec![self.header()];
        if let Some(flags) = self.red_flags_callout() {
            lines.push(format!("⚠ Red Flags Detected: {flags}"));
        }
        lines.push("Why this recommendation:".to_string());
        lines.push(format!("  {}", self.reasoning));
        lines.push("Next Steps:".to_string());
        for (i, step) in self.recommendations.iter().enumerate() {
            lines.push(format!("  {}. {step}", i + 1));
        }
        if let Some(call) = &self.call {
            lines.push(format!("{} [{}]", self.style.icon, call.state().label()));
        }
        lines.push(CARD_DISCLAIMER.to_string());
        lines.join("\n")
    }
}
