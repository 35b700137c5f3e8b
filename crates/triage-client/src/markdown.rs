//! A small markdown reader for assistant replies.
//!
//! Only the constructs the model actually produces are recognised: ATX
//! headings, bullet and numbered list items, fenced code, paragraphs, and
//! strong, emphasis and code spans. Anything else is kept as plain text.

use regex::Regex;
use std::sync::OnceLock;

/// A run of inline text with one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Text(String),
    Strong(String),
    Emphasis(String),
    Code(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, spans: Vec<Inline> },
    Bullet(Vec<Inline>),
    Ordered { number: u32, spans: Vec<Inline> },
    Paragraph(Vec<Inline>),
    Code(String),
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.*)$").expect("static regex"))
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[-*+]\s+(.*)$").expect("static regex"))
}

fn ordered_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,9})[.)]\s+(.*)$").expect("static regex"))
}

fn inline_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\*\*(.+?)\*\*|__(.+?)__|\*([^*\s][^*]*?)\*|\b_([^_]+?)_\b|`([^`]+)`")
            .expect("static regex")
    })
}

/// Splits inline text into styled spans. Unmatched markers stay literal.
pub fn parse_inline(text: &str) -> Vec<Inline> {
    let mut spans = Vec::new();
    let mut last = 0;

    for caps in inline_re().captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            spans.push(Inline::Text(text[last..whole.start()].to_string()));
        }
        let span = if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            Inline::Strong(m.as_str().to_string())
        } else if let Some(m) = caps.get(3).or_else(|| caps.get(4)) {
            Inline::Emphasis(m.as_str().to_string())
        } else if let Some(m) = caps.get(5) {
            Inline::Code(m.as_str().to_string())
        } else {
            Inline::Text(whole.as_str().to_string())
        };
        spans.push(span);
        last = whole.end();
    }

    if last < text.len() {
        spans.push(Inline::Text(text[last..].to_string()));
    }
    spans
}

/// Parses markdown prose into blocks.
///
/// Consecutive plain lines join into one paragraph; a blank line or any
/// other block ends it.
pub fn parse(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut code: Option<Vec<&str>> = None;

    fn flush(paragraph: &mut Vec<&str>, blocks: &mut Vec<Block>) {
        if !paragraph.is_empty() {
            blocks.push(Block::Paragraph(parse_inline(&paragraph.join(" "))));
            paragraph.clear();
        }
    }

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            match code.take() {
                Some(lines) => blocks.push(Block::Code(lines.join("\n"))),
                None => {
                    flush(&mut paragraph, &mut blocks);
                    code = Some(Vec::new());
                }
            }
            continue;
        }
        if let Some(lines) = code.as_mut() {
            lines.push(line);
            continue;
        }

        if trimmed.is_empty() {
            flush(&mut paragraph, &mut blocks);
        } else if let Some(caps) = heading_re().captures(trimmed) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Heading {
                level: caps[1].len() as u8,
                spans: parse_inline(&caps[2]),
            });
        } else if let Some(caps) = bullet_re().captures(trimmed) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Bullet(parse_inline(&caps[1])));
        } else if let Some(caps) = ordered_re().captures(trimmed) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Ordered {
                number: caps[1].parse().unwrap_or(1),
                spans: parse_inline(&caps[2]),
            });
        } else {
            paragraph.push(trimmed);
        }
    }

    flush(&mut paragraph, &mut blocks);
    // An unterminated fence still shows its contents.
    if let Some(lines) = code {
        blocks.push(Block::Code(lines.join("\n")));
    }
    blocks
}

const BOLD: &str = "\x1b[1m";
const ITALIC: &str = "\x1b[3m";
const CYAN: &str = "\x1b[36m";
const RESET: &str = "\x1b[0m";

fn write_spans(out: &mut String, spans: &[Inline], ansi: bool) {
    for span in spans {
        let (style, text) = match span {
            Inline::Text(t) => (None, t),
            Inline::Strong(t) => (Some(BOLD), t),
            Inline::Emphasis(t) => (Some(ITALIC), t),
            Inline::Code(t) => (Some(CYAN), t),
        };
        match style {
            Some(code) if ansi => {
                out.push_str(code);
                out.push_str(text);
                out.push_str(RESET);
            }
            _ => out.push_str(text),
        }
    }
}

/// Formats blocks for a terminal, one block per line. `ansi` enables
/// bold/italic/colour escapes.
pub fn to_terminal(blocks: &[Block], ansi: bool) -> String {
    let mut out = String::new();
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        match block {
            Block::Heading { spans, .. } => {
                if ansi {
                    out.push_str(BOLD);
                }
                write_spans(&mut out, spans, false);
                if ansi {
                    out.push_str(RESET);
                }
            }
            Block::Bullet(spans) => {
                out.push_str("  • ");
                write_spans(&mut out, spans, ansi);
            }
            Block::Ordered { number, spans } => {
                out.push_str(&format!("  {number}. "));
                write_spans(&mut out, spans, ansi);
            }
            Block::Paragraph(spans) => write_spans(&mut out, spans, ansi),
            Block::Code(text) => {
                let indented: Vec<String> = text.lines().map(|l| format!("    {l}")).collect();
                out.push_str(&indented.join("\n"));
            }
        }
    }
    out
}
