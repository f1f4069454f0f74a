//! Recognising the delegate's prompts.
//!
//! The prompt wording belongs to the delegate, so matching is a loose,
//! case-insensitive substring test against an ordered rule table. The first
//! rule that matches decides how the prompt is answered.
//!
//! Finding *where* a prompt is comes in two flavours. With sentinel framing
//! the delegate wraps every input request in `STX prompt ETX`, so boundaries
//! are exact. Without it, the scanner falls back to watching the delegate's
//! current unterminated output line.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum PromptKind {
    ImagePath,
    StopConfirmation,
    MouseAction,
    KeyboardAction,
}

#[derive(Debug, Clone, Copy)]
pub struct PromptRule {
    pub kind: PromptKind,
    /// Lowercase needles; any one of them selects the rule
    pub patterns: &'static [&'static str],
}

impl PromptRule {
    fn matches(&self, lowered: &str) -> bool {
        self.patterns.iter().any(|p| lowered.contains(p))
    }
}

pub const RULES: &[PromptRule] = &[
    PromptRule {
        kind: PromptKind::ImagePath,
        patterns: &["image path"],
    },
    PromptRule {
        kind: PromptKind::StopConfirmation,
        patterns: &["press `n` to stop", "press 'n' to stop"],
    },
    PromptRule {
        kind: PromptKind::MouseAction,
        patterns: &["mouse action"],
    },
    PromptRule {
        kind: PromptKind::KeyboardAction,
        patterns: &["keyboard action"],
    },
];

/// First matching rule wins; `None` means the prompt is not recognised
pub fn classify(prompt: &str) -> Option<PromptKind> {
    let lowered = prompt.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map(|rule| rule.kind)
}

/// Opens a framed prompt
pub const FRAME_START: u8 = 0x02;
/// Closes a framed prompt
pub const FRAME_END: u8 = 0x03;

/// How prompt boundaries are found in the delegate's output
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Framing {
    /// sentinel for python interpreters (via the input bootstrap), heuristic otherwise
    #[default]
    Auto,
    /// the delegate frames every prompt as STX prompt ETX
    Sentinel,
    /// watch the current unterminated output line for known prompts
    Heuristic,
}

/// Bytes of an unterminated line kept while waiting for a prompt
pub const WINDOW_LIMIT: usize = 8 * 1024;

/// Characters that end a line which looks like it is asking for input
const PROMPT_ENDINGS: &[char] = &[':', '?', '>', ']'];

/// Decodes UTF-8 across read boundaries, holding back an incomplete tail
#[derive(Debug, Clone, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::new();
        let mut rest = &bytes[..];
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        self.pending = rest.to_vec();
        out
    }
}

/// Follows the delegate's output and reports each input request once.
#[derive(Debug, Clone)]
pub struct PromptScanner {
    framed: bool,
    carry: Utf8Carry,
    /// heuristic: the current unterminated line since the last answer;
    /// framed: the prompt text of an open frame
    line: String,
    /// heuristic: a prompt on the current line was already answered
    line_answered: bool,
    /// framed: between FRAME_START and FRAME_END
    in_frame: bool,
    limit: usize,
}

impl Default for PromptScanner {
    fn default() -> Self {
        Self::heuristic()
    }
}

impl PromptScanner {
    pub fn heuristic() -> Self {
        Self::with_limit(WINDOW_LIMIT)
    }

    pub fn sentinel() -> Self {
        Self {
            framed: true,
            ..Self::heuristic()
        }
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            framed: false,
            carry: Utf8Carry::default(),
            line: String::new(),
            line_answered: false,
            in_frame: false,
            limit,
        }
    }

    pub fn window(&self) -> &str {
        &self.line
    }

    /// Add delegate output; returns the prompts that are now waiting, in order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let text = self.carry.decode(chunk);
        if self.framed {
            self.feed_framed(&text)
        } else {
            self.feed_heuristic(&text).into_iter().collect()
        }
    }

    /// Called when the delegate has gone quiet. Only the heuristic scanner
    /// answers here, and only for a fresh unterminated line that ends the
    /// way a question does.
    pub fn on_idle(&mut self) -> Option<String> {
        if self.framed || self.line_answered {
            return None;
        }
        let tail = self.line.trim_end();
        if tail.ends_with(PROMPT_ENDINGS) {
            self.line_answered = true;
            Some(std::mem::take(&mut self.line))
        } else {
            None
        }
    }

    /// Output to show on the terminal: frame markers are not for humans
    pub fn echo_bytes<'a>(&self, chunk: &'a [u8]) -> std::borrow::Cow<'a, [u8]> {
        if self.framed && chunk.iter().any(|b| *b == FRAME_START || *b == FRAME_END) {
            chunk
                .iter()
                .copied()
                .filter(|b| *b != FRAME_START && *b != FRAME_END)
                .collect::<Vec<u8>>()
                .into()
        } else {
            chunk.into()
        }
    }

    fn feed_framed(&mut self, text: &str) -> Vec<String> {
        let mut prompts = Vec::new();
        for c in text.chars() {
            match c {
                '\u{2}' => {
                    self.in_frame = true;
                    self.line.clear();
                }
                '\u{3}' if self.in_frame => {
                    self.in_frame = false;
                    prompts.push(std::mem::take(&mut self.line));
                }
                c if self.in_frame => self.line.push(c),
                _ => {}
            }
        }
        self.trim_front();
        prompts
    }

    fn feed_heuristic(&mut self, text: &str) -> Option<String> {
        // completed lines are plain output, never a pending request
        match text.rfind('\n') {
            Some(pos) => {
                self.line.clear();
                self.line.push_str(&text[pos + 1..]);
                self.line_answered = false;
            }
            None => self.line.push_str(text),
        }
        self.trim_front();

        classify(&self.line)?;
        self.line_answered = true;
        Some(std::mem::take(&mut self.line))
    }

    fn trim_front(&mut self) {
        if self.line.len() <= self.limit {
            return;
        }
        let mut cut = self.line.len() - self.limit;
        while !self.line.is_char_boundary(cut) {
            cut += 1;
        }
        self.line.drain(..cut);
    }
}
