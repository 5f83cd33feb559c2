/*!
 * Parsing of raw backend responses.
 *
 * A batch response is free text that should hold one numbered line per
 * submitted string. Models add headers, separators, markdown and quotes, drop
 * lines, or merge them; this module recovers as much as it can and reports
 * exactly which positions are still missing.
 */

use once_cell::sync::Lazy;
use regex::Regex;
use log::{debug, warn};

/// Leading `12.` or `12)` numbering
static NUMBERING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\s*[.)]\s*").unwrap()
});

/// Markdown emphasis and inline code markers
static MARKDOWN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\*\*|__|`").unwrap()
});

/// Runs of the same ASCII sentence mark
static REPEATED_PUNCTUATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.{2,}|!{2,}|\?{2,}").unwrap()
});

/// Boilerplate that precedes the translations
const RESPONSE_PREFIXES: &[&str] = &[
    "here are the translations:",
    "here is the translation:",
    "here are the translated lines:",
    "translations:",
    "translation:",
    "output:",
    "result:",
];

/// Unnumbered lines starting with these are commentary, not translations
const META_PREFIXES: &[&str] = &[
    "note:",
    "notes:",
    "explanation:",
    "here are",
    "here is",
    "i hope",
    "let me know",
    "context:",
];

/// Labels a model may put in front of a single translation
const SINGLE_LABELS: &[&str] = &[
    "translation:",
    "translated text:",
    "translated:",
    "output:",
    "result:",
    "answer:",
];

/// Alternative delimiters tried when line splitting comes up short.
/// Sentence marks only count at the end of a line; inside a line they belong
/// to the translation.
const ALTERNATIVE_SEPARATORS: &[&str] = &["\n\n", "。\n", "！\n", "？\n"];

/// Outcome of parsing a batch response
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBatch {
    /// Exactly one translation per input
    Success(Vec<String>),

    /// Some positions are missing; `lines` holds `""` at each missing index
    Recoverable {
        lines: Vec<String>,
        missing: Vec<usize>,
    },

    /// Nothing usable
    Malformed(String),
}

impl ParsedBatch {
    /// Number of positions that carry a translation
    pub fn recovered_count(&self) -> usize {
        match self {
            Self::Success(lines) => lines.len(),
            Self::Recoverable { lines, missing } => lines.len() - missing.len(),
            Self::Malformed(_) => 0,
        }
    }
}

struct ResponseLine {
    number: Option<usize>,
    text: String,
}

/// Parse a batch response expected to carry `expected` translations.
///
/// Numbered responses are placed by their numbers, so reordered or missing
/// lines land in (or are reported for) the right slot. Unnumbered responses
/// are taken in order.
pub fn parse_batch_response(response: &str, expected: usize) -> ParsedBatch {
    if expected == 0 {
        return ParsedBatch::Success(Vec::new());
    }

    let body = strip_prefixes(response.trim(), RESPONSE_PREFIXES);
    if body.is_empty() {
        return ParsedBatch::Malformed("empty response".to_string());
    }

    let lines = collect_lines(body);
    if lines.is_empty() {
        return ParsedBatch::Malformed("response holds no translation lines".to_string());
    }

    if lines.iter().any(|line| line.number.is_some()) {
        return place_by_number(&lines, expected);
    }

    let mut texts: Vec<String> = lines.into_iter().map(|line| line.text).collect();

    if texts.len() == expected {
        return ParsedBatch::Success(texts);
    }

    if texts.len() > expected {
        warn!("Batch response has {} lines, expected {}; truncating", texts.len(), expected);
        texts.truncate(expected);
        return ParsedBatch::Success(texts);
    }

    if let Some(resplit) = resplit_with_separators(body, expected) {
        debug!("Alternative separators recovered all {} lines", expected);
        return ParsedBatch::Success(resplit);
    }

    warn!("Batch response has {} lines, expected {}; padding", texts.len(), expected);
    let missing = (texts.len()..expected).collect();
    texts.resize(expected, String::new());
    ParsedBatch::Recoverable { lines: texts, missing }
}

/// Tidy a translation before it is cached and rendered.
///
/// Collapses repeated `!`, `?` and `.` marks, turns three or more dots into
/// an ellipsis, `--` into a dash, and squeezes whitespace.
pub fn post_process_translation(text: &str) -> String {
    let squeezed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let punctuated = REPEATED_PUNCTUATION_REGEX.replace_all(&squeezed, |caps: &regex::Captures| {
        let run = &caps[0];
        match run.chars().next() {
            Some('.') if run.len() >= 3 => "\u{2026}".to_string(),
            Some(mark) => mark.to_string(),
            None => String::new(),
        }
    });
    punctuated.replace("--", "\u{2014}")
}

/// Clean a single-item response; `None` when nothing is left
pub fn clean_single_response(response: &str) -> Option<String> {
    let mut cleaned = strip_prefixes(response.trim(), SINGLE_LABELS);

    // Anything after a blank line is commentary
    if let Some((first, _)) = cleaned.split_once("\n\n") {
        if !first.trim().is_empty() {
            cleaned = first;
        }
    }

    let cleaned = NUMBERING_REGEX.replace(cleaned.trim(), "");
    let cleaned = MARKDOWN_REGEX.replace_all(&cleaned, "");
    let cleaned = strip_quotes(&cleaned);
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn strip_prefixes<'a>(text: &'a str, prefixes: &[&str]) -> &'a str {
    let mut current = text;
    loop {
        let lowered = current.to_lowercase();
        let matched = prefixes.iter().find(|prefix| lowered.starts_with(*prefix));
        match matched {
            // Prefixes are ASCII, so the byte length carries over
            Some(prefix) if current.is_char_boundary(prefix.len()) => {
                current = current[prefix.len()..].trim_start();
            }
            _ => return current,
        }
    }
}

fn strip_quotes(text: &str) -> &str {
    text.trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”' | '「' | '」'))
        .trim()
}

/// Number of a `12.` or `12)` line, markdown emphasis ignored
fn line_number(line: &str) -> Option<usize> {
    let plain = MARKDOWN_REGEX.replace_all(line, "");
    NUMBERING_REGEX
        .captures(plain.trim_start())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
}

fn collect_lines(body: &str) -> Vec<ResponseLine> {
    let raw_lines: Vec<&str> = body.lines().map(str::trim).collect();

    // Drop header text before the first numbered line
    let start = raw_lines
        .iter()
        .position(|line| line_number(line).is_some())
        .unwrap_or(0);

    let mut lines: Vec<ResponseLine> = Vec::new();
    for line in raw_lines[start..]
        .iter()
        .filter(|line| !line.is_empty() && !line.starts_with("---") && !line.starts_with("==="))
    {
        let number = line_number(line);
        let plain = MARKDOWN_REGEX.replace_all(line, "");
        let unnumbered = NUMBERING_REGEX.replace(plain.trim_start(), "");

        if number.is_none() && is_meta_line(&unnumbered) {
            continue;
        }

        let text = strip_quotes(&unnumbered);
        match (number, lines.last_mut()) {
            // A wrapped translation continues on the unnumbered lines below it
            (None, Some(previous)) if previous.number.is_some() => {
                if !text.is_empty() {
                    if !previous.text.is_empty() {
                        previous.text.push(' ');
                    }
                    previous.text.push_str(text);
                }
            }
            // A bare number still claims its slot
            (Some(_), _) => lines.push(ResponseLine {
                number,
                text: text.to_string(),
            }),
            (None, _) if !text.is_empty() => lines.push(ResponseLine {
                number,
                text: text.to_string(),
            }),
            (None, _) => {}
        }
    }

    lines
}

fn is_meta_line(line: &str) -> bool {
    let lowered = line.to_lowercase();
    META_PREFIXES.iter().any(|prefix| lowered.starts_with(prefix))
}

/// Place numbered lines into their slots.
///
/// Numbers outside `1..=expected` are dropped; a number used twice makes the
/// whole response untrustworthy.
fn place_by_number(lines: &[ResponseLine], expected: usize) -> ParsedBatch {
    let mut slots: Vec<Option<&str>> = vec![None; expected];
    let mut out_of_range = 0;

    for line in lines {
        let Some(number) = line.number else {
            continue;
        };
        if number == 0 || number > expected {
            out_of_range += 1;
            continue;
        }
        let slot = &mut slots[number - 1];
        if slot.is_some() {
            return ParsedBatch::Malformed(format!("line {} is numbered twice", number));
        }
        *slot = Some(line.text.as_str());
    }

    if out_of_range > 0 {
        warn!("Ignoring {} lines numbered outside 1..={}", out_of_range, expected);
    }

    let texts: Vec<String> = slots
        .into_iter()
        .map(|slot| slot.unwrap_or_default().to_string())
        .collect();
    let missing: Vec<usize> = texts
        .iter()
        .enumerate()
        .filter(|(_, text)| text.is_empty())
        .map(|(i, _)| i)
        .collect();

    if missing.len() == expected {
        ParsedBatch::Malformed(format!("no line is numbered within 1..={}", expected))
    } else if missing.is_empty() {
        ParsedBatch::Success(texts)
    } else {
        warn!("Batch response is missing {} of {} numbered lines", missing.len(), expected);
        ParsedBatch::Recoverable { lines: texts, missing }
    }
}

fn resplit_with_separators(body: &str, expected: usize) -> Option<Vec<String>> {
    ALTERNATIVE_SEPARATORS.iter().find_map(|separator| {
        let parts: Vec<String> = body
            .split_inclusive(separator)
            .map(|part| {
                let part = NUMBERING_REGEX.replace(part.trim(), "");
                let part = MARKDOWN_REGEX.replace_all(&part, "");
                part.split_whitespace().collect::<Vec<_>>().join(" ")
            })
            .filter(|part| !part.is_empty())
            .collect();

        if parts.len() >= expected {
            Some(parts.into_iter().take(expected).collect())
        } else {
            None
        }
    })
}
