//! Flattens an agent reply into text that reads naturally when spoken.
//!
//! The transform is best-effort: unbalanced or malformed markup is left as
//! plain characters rather than rejected. It is applied repeatedly until the
//! text stops changing, so cleaning already-clean text is a no-op.

use regex::Regex;
use std::sync::LazyLock;
use voxrelay_types::MessageRules;

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($re).expect("speech_text pattern must compile"));
    };
}

pattern!(BLANK_LINE, r"\n[ \t]*\n");
pattern!(FENCED_BLOCK, r"(?s)```.*?```");
pattern!(DIRECTIVE_TAG, r"\[\[[^\]\n]*\]\]");
pattern!(HORIZONTAL_RULE, r"(?m)^[ \t]*(?:[-*_][ \t]*){3,}$");
// Headings, quote markers and list bullets, however deeply stacked.
pattern!(
    LINE_PREFIX,
    r"(?m)^(?:[ \t]*(?:#{1,6}[ \t]+|>[ \t]?|(?:[-*+•]|\d{1,3}[.)])[ \t]+))+"
);
pattern!(IMAGE, r"!\[([^\]\n]*)\]\([^)\n]*\)");
pattern!(LINK, r"\[([^\]\n]+)\]\([^)\n]*\)");
pattern!(INLINE_CODE, r"`([^`\n]+)`");
pattern!(BOLD, r"\*\*([^*\n]+)\*\*");
pattern!(UNDERLINE, r"(^|[^\w])__([^_\n]+)__([^\w]|$)");
pattern!(STRIKE, r"~~([^~\n]+)~~");
pattern!(ITALIC_STAR, r"\*([^*\n]+)\*");
pattern!(ITALIC_UNDERSCORE, r"(^|[^\w])_([^_\n]+)_([^\w]|$)");
pattern!(WHITESPACE, r"\s+");

/// Characters after which a paragraph break needs no extra period.
const PAUSE_PUNCTUATION: &[char] = &['.', '!', '?', ':', ';', ','];

#[derive(Debug, Clone, Default)]
pub struct SpeechSanitizer {
    rules: MessageRules,
}

impl SpeechSanitizer {
    pub fn new(rules: MessageRules) -> Self {
        Self { rules }
    }

    pub fn sanitize(&self, text: &str) -> String {
        // After the first pass the text holds no line breaks, and every later
        // pass either leaves it unchanged or makes it strictly shorter.
        let mut current = self.pass(text);
        loop {
            let next = self.pass(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    fn pass(&self, text: &str) -> String {
        let text = text.replace("\r\n", "\n");
        let text = self.drop_echo_paragraphs(&text);

        let text = FENCED_BLOCK.replace_all(&text, "");
        let text = text.replace("```", "");

        let text = self.drop_media_lines(&text);
        let text = DIRECTIVE_TAG.replace_all(&text, "");
        let text = self
            .rules
            .sentinels()
            .fold(text.into_owned(), |acc, token| acc.replace(token, ""));

        let text = HORIZONTAL_RULE.replace_all(&text, "");
        let text = LINE_PREFIX.replace_all(&text, "");

        let text = IMAGE.replace_all(&text, "$1");
        let text = LINK.replace_all(&text, "$1");
        let text = INLINE_CODE.replace_all(&text, "$1");
        let text = BOLD.replace_all(&text, "$1");
        let text = UNDERLINE.replace_all(&text, "${1}${2}${3}");
        let text = STRIKE.replace_all(&text, "$1");
        let text = ITALIC_STAR.replace_all(&text, "$1");
        let text = ITALIC_UNDERSCORE.replace_all(&text, "${1}${2}${3}");

        flatten_paragraphs(&text)
    }

    fn drop_echo_paragraphs(&self, text: &str) -> String {
        let paragraphs: Vec<&str> = BLANK_LINE.split(text).collect();
        if paragraphs.len() == 1 {
            return if self.rules.is_echo(text) {
                String::new()
            } else {
                text.to_string()
            };
        }
        paragraphs
            .into_iter()
            .filter(|p| !self.rules.is_echo(p))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn drop_media_lines(&self, text: &str) -> String {
        if !text.lines().any(|l| self.rules.is_media_line(l)) {
            return text.to_string();
        }
        text.lines()
            .filter(|l| !self.rules.is_media_line(l))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Turns blank-line paragraph breaks into spoken pauses, remaining line
/// breaks into spaces, and collapses whitespace runs.
fn flatten_paragraphs(text: &str) -> String {
    let mut spoken = String::with_capacity(text.len());
    for paragraph in BLANK_LINE.split(text) {
        let paragraph = WHITESPACE.replace_all(paragraph, " ");
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if !spoken.is_empty() {
            if !spoken.ends_with(PAUSE_PUNCTUATION) {
                spoken.push('.');
            }
            spoken.push(' ');
        }
        spoken.push_str(paragraph);
    }
    spoken
}
