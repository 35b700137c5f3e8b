//! Preparing assistant text for speech.

use regex::Regex;
use std::sync::OnceLock;

fn code_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```.*?```").expect("static regex"))
}

fn markdown_punctuation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[#*_`>\[\]]").expect("static regex"))
}

fn line_breaks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n+").expect("static regex"))
}

/// Strips code fences and markdown punctuation and turns line breaks into
/// sentence stops so a synthesizer reads the text naturally.
pub fn speech_text(text: &str) -> String {
    let without_code = code_fence().replace_all(text, "");
    let plain = markdown_punctuation().replace_all(&without_code, "");
    line_breaks().replace_all(&plain, ". ").into_owned()
}
