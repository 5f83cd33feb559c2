/*!
 * Prompt construction for comic dialogue translation.
 *
 * A batch prompt carries a shared instruction block, one context line and a
 * numbered list of source strings, and asks for exactly one output line per
 * input. The context line joins the caller's hints with what a quick read of
 * the texts suggests. The single-item prompt is used for per-item retries.
 */

use crate::language_utils;
use super::analysis;
use super::context::{BatchScope, TranslationContext};

/// Rules shared by every batch prompt.
pub const BATCH_INSTRUCTIONS: &str = r#"You are an expert translator of comic dialogue, translating from {source_language} to {target_language}.

## Rules
- Translate each numbered line independently but keep names and tone consistent across lines
- Keep translations short enough to fit inside a speech bubble
- Translate sound effects into natural {target_language} onomatopoeia
- Never add explanations, notes, alternatives or romanization
- Never merge or split lines

## Output
- Return exactly {count} lines, one translation per line, in the same order
- Prefix each line with its number followed by a dot, like the input"#;

/// Rules for translating a single bubble.
pub const SINGLE_INSTRUCTIONS: &str = r#"Translate the following comic dialogue from {source_language} to {target_language}.
Return only the translation, without quotes, labels or explanations."#;

/// Heading above the numbered source texts of a batch prompt
pub const TEXTS_HEADING: &str = "## Texts";

/// Label in front of the source text of a single prompt
pub const SINGLE_TEXT_LABEL: &str = "Text: ";

/// Builder for translation prompts
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    source_language: String,
    target_language: String,
    custom_prompt: Option<String>,
}

impl PromptBuilder {
    /// Create a builder for a language pair
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            custom_prompt: None,
        }
    }

    /// Extra user instructions appended after the shared rules
    pub fn with_custom_prompt(mut self, custom_prompt: Option<String>) -> Self {
        self.custom_prompt = custom_prompt.filter(|p| !p.trim().is_empty());
        self
    }

    /// Build the prompt for a list of texts sharing one context
    pub fn batch(&self, texts: &[&str], context: &TranslationContext, scope: BatchScope) -> String {
        let mut prompt = self.render(BATCH_INSTRUCTIONS).replace("{count}", &texts.len().to_string());

        if let Some(genre) = genre_hint(&self.source_language) {
            prompt.push_str("\n\n");
            prompt.push_str(genre);
        }

        let mut context_parts = Vec::new();
        if let Some(described) = context.describe() {
            context_parts.push(described);
        }
        if let Some(observed) = analysis::analyze_batch(texts) {
            context_parts.push(format!("observed: {}", observed));
        }
        if scope.is_mega_batch() {
            context_parts.push(format!(
                "mega batch: {} texts from {} pages, keep character voices consistent across pages",
                texts.len(),
                scope.page_count
            ));
        }
        if !context_parts.is_empty() {
            prompt.push_str("\n\n## Context\n");
            prompt.push_str(&context_parts.join("; "));
        }

        if let Some(custom) = &self.custom_prompt {
            prompt.push_str("\n\n## Additional instructions\n");
            prompt.push_str(custom.trim());
        }

        prompt.push_str("\n\n");
        prompt.push_str(TEXTS_HEADING);
        prompt.push('\n');
        for (i, text) in texts.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, flatten(text)));
        }

        prompt.push_str(&format!("\nReturn exactly {} lines.", texts.len()));
        prompt
    }

    /// Build the prompt for one text
    pub fn single(&self, text: &str, context: &TranslationContext) -> String {
        let mut prompt = self.render(SINGLE_INSTRUCTIONS);

        let hints: Vec<String> = context.describe().into_iter().chain(analysis::analyze_text(text)).collect();
        if !hints.is_empty() {
            prompt.push_str(&format!("\nContext: {}", hints.join("; ")));
        }
        if let Some(custom) = &self.custom_prompt {
            prompt.push('\n');
            prompt.push_str(custom.trim());
        }

        prompt.push_str("\n\n");
        prompt.push_str(SINGLE_TEXT_LABEL);
        prompt.push_str(&flatten(text));
        prompt
    }

    fn render(&self, template: &str) -> String {
        template
            .replace("{source_language}", &language_utils::prompt_language_name(&self.source_language))
            .replace("{target_language}", &language_utils::prompt_language_name(&self.target_language))
    }
}

/// Source-specific style guidance
fn genre_hint(source_language: &str) -> Option<&'static str> {
    match language_utils::normalize_code(source_language).ok()?.as_str() {
        "ja" => Some("The source is Japanese manga: honorifics like -san and -senpai may be kept when the target language has no equivalent."),
        "zh" => Some("The source is a Chinese manhua: cultivation and martial arts terms should use their established translations."),
        "ko" => Some("The source is a Korean manhwa: keep hyung, noona and similar kinship terms when they carry characterization."),
        _ => None,
    }
}

// One text per numbered line
fn flatten(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
