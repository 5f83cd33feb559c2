//! Language code helpers for source/target handling.
//!
//! Comics arrive as Japanese (manga), Chinese (manhua), Korean (manhwa) or
//! English; the source may also be `auto`, which is never looked up in the
//! ISO tables.

use anyhow::{anyhow, Result};
use isolang::Language;

/// Sentinel for "let the backend detect the source language"
pub const AUTO_LANGUAGE: &str = "auto";

// ISO 639-2/B codes that differ from their 639-2/T form
fn bibliographic_to_terminology(code: &str) -> Option<&'static str> {
    match code {
        "chi" => Some("zho"),
        "fre" => Some("fra"),
        "ger" => Some("deu"),
        "dut" => Some("nld"),
        "gre" => Some("ell"),
        "cze" => Some("ces"),
        "per" => Some("fas"),
        "may" => Some("msa"),
        "rum" => Some("ron"),
        "slo" => Some("slk"),
        "bur" => Some("mya"),
        _ => None,
    }
}

fn lookup(code: &str) -> Option<Language> {
    let normalized = code.trim().to_lowercase();
    match normalized.len() {
        2 => Language::from_639_1(&normalized),
        3 => match bibliographic_to_terminology(&normalized) {
            Some(part2t) => Language::from_639_3(part2t),
            None => Language::from_639_3(&normalized),
        },
        _ => None,
    }
}

/// Normalize a language code to a canonical short form.
///
/// Returns the ISO 639-1 code when one exists, the 639-3 code otherwise, and
/// `auto` unchanged. Used so `ja` and `jpn` address the same cache entries.
pub fn normalize_code(code: &str) -> Result<String> {
    let trimmed = code.trim().to_lowercase();
    if trimmed == AUTO_LANGUAGE {
        return Ok(trimmed);
    }

    let lang = lookup(&trimmed).ok_or_else(|| anyhow!("Invalid language code: {}", code))?;
    Ok(lang
        .to_639_1()
        .map(|c| c.to_string())
        .unwrap_or_else(|| lang.to_639_3().to_string()))
}

/// Check if two language codes represent the same language
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (normalize_code(code1), normalize_code(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Get the English language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    let lang = lookup(code).ok_or_else(|| anyhow!("Invalid language code: {}", code))?;
    Ok(lang.to_name().to_string())
}

/// Name used inside prompts; falls back to the raw code for unknown input
pub fn prompt_language_name(code: &str) -> String {
    if code.trim().eq_ignore_ascii_case(AUTO_LANGUAGE) {
        return "the detected source language".to_string();
    }
    get_language_name(code).unwrap_or_else(|_| code.to_string())
}
