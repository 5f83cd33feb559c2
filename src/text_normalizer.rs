/*!
 * OCR output cleanup.
 *
 * OCR engines return text with layout artifacts: hard line breaks from
 * vertical columns, full-width punctuation, runs of whitespace and decorative
 * glyphs from bubble borders. The normalizer turns that into a single clean
 * string suitable both as translation input and as a cache key component.
 */

use once_cell::sync::Lazy;
use regex::Regex;

/// Decorative glyphs that OCR picks up from bubble borders and screentone
static DECORATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[•▪▫■□●○◆◇★☆♦♢※]").unwrap()
});

/// Runs of horizontal whitespace, including the ideographic space
static WHITESPACE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[ \t\u{3000}\u{00A0}]+").unwrap()
});

/// Three or more dots (ASCII or full-width) collapse to one ellipsis
static ELLIPSIS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\.{3,}|…{2,}|・{3,})").unwrap()
});

/// Full-width punctuation folded to ASCII
const PUNCTUATION_MAP: &[(char, char)] = &[
    ('．', '.'),
    ('，', ','),
    ('！', '!'),
    ('？', '?'),
    ('（', '('),
    ('）', ')'),
    ('：', ':'),
    ('；', ';'),
    ('～', '~'),
    ('“', '"'),
    ('”', '"'),
];

/// Whether a character belongs to a script written without word spaces
pub fn is_cjk_char(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |  // CJK Unified Ideographs
        '\u{3400}'..='\u{4DBF}' |  // CJK Extension A
        '\u{3040}'..='\u{309F}' |  // Hiragana
        '\u{30A0}'..='\u{30FF}' |  // Katakana
        '\u{FF66}'..='\u{FF9F}'    // Half-width Katakana
    )
}

/// Whether the text contains any CJK glyph
pub fn is_cjk_text(text: &str) -> bool {
    text.chars().any(is_cjk_char)
}

/// Cleans OCR text before translation
#[derive(Debug, Clone, Default)]
pub struct TextNormalizer {
    /// Keep the CJK full stop instead of folding it to '.'
    keep_ideographic_full_stop: bool,
}

impl TextNormalizer {
    /// Create a normalizer with default folding rules
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep '。' as-is (useful when the backend handles CJK punctuation better)
    pub fn keep_ideographic_full_stop(mut self, keep: bool) -> Self {
        self.keep_ideographic_full_stop = keep;
        self
    }

    /// Normalize raw OCR output.
    ///
    /// Line breaks are joined: with nothing between two CJK characters (the
    /// break comes from a vertical column), with a single space otherwise.
    /// Returns an empty string for input that holds no text.
    pub fn normalize(&self, raw: &str) -> String {
        if raw.trim().is_empty() {
            return String::new();
        }

        let folded: String = raw
            .chars()
            .map(|c| self.fold_char(c))
            .collect();

        let without_decoration = DECORATION_REGEX.replace_all(&folded, "");
        let joined = join_lines(&without_decoration);
        let collapsed = WHITESPACE_REGEX.replace_all(&joined, " ");
        let ellipsized = ELLIPSIS_REGEX.replace_all(&collapsed, "…");

        ellipsized.trim().to_string()
    }

    fn fold_char(&self, c: char) -> char {
        if c == '。' {
            return if self.keep_ideographic_full_stop { c } else { '.' };
        }
        PUNCTUATION_MAP
            .iter()
            .find(|(from, _)| *from == c)
            .map(|(_, to)| *to)
            .unwrap_or(c)
    }
}

fn join_lines(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let (Some(prev), Some(next)) = (result.chars().last(), line.chars().next()) {
            if !(is_cjk_char(prev) && is_cjk_char(next)) {
                result.push(' ');
            }
        }
        result.push_str(line);
    }
    result
}
