/*!
 * Translation context attached to fragments.
 *
 * Speech bubbles are short and ambiguous; the speaker's gender, the relation
 * between speakers and the register of the scene all change how a line
 * should read in the target language. The context is an explicit record so
 * that the prompt builder and the cache key agree on what it contains.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Grammatical gender of the speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerGender {
    Male,
    Female,
    #[default]
    Unspecified,
}

/// Register the translation should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Formality {
    Casual,
    #[default]
    Neutral,
    Polite,
    Formal,
}

impl fmt::Display for SpeakerGender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Male => write!(f, "male"),
            Self::Female => write!(f, "female"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

impl fmt::Display for Formality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Casual => write!(f, "casual"),
            Self::Neutral => write!(f, "neutral"),
            Self::Polite => write!(f, "polite"),
            Self::Formal => write!(f, "formal"),
        }
    }
}

/// Per-fragment translation hints
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct TranslationContext {
    #[serde(default)]
    pub gender: SpeakerGender,

    /// Relation between speaker and listener ("siblings", "boss")
    #[serde(default)]
    pub relationship: Option<String>,

    #[serde(default)]
    pub formality: Formality,

    /// Emotional tone of the line ("angry", "teasing")
    #[serde(default)]
    pub emotion: Option<String>,

    /// Inner monologue rather than spoken dialogue
    #[serde(default)]
    pub is_thought: bool,

    /// Sound effect lettering
    #[serde(default)]
    pub is_sfx: bool,

    /// Free-form description of the scene
    #[serde(default)]
    pub scene: Option<String>,
}

impl TranslationContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gender(mut self, gender: SpeakerGender) -> Self {
        self.gender = gender;
        self
    }

    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = Some(relationship.into());
        self
    }

    pub fn with_formality(mut self, formality: Formality) -> Self {
        self.formality = formality;
        self
    }

    pub fn with_emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }

    pub fn with_scene(mut self, scene: impl Into<String>) -> Self {
        self.scene = Some(scene.into());
        self
    }

    pub fn thought(mut self, is_thought: bool) -> Self {
        self.is_thought = is_thought;
        self
    }

    pub fn sfx(mut self, is_sfx: bool) -> Self {
        self.is_sfx = is_sfx;
        self
    }

    /// Stable string identifying every field that changes the translation.
    ///
    /// The fields are encoded as a JSON array, so free text in the
    /// relationship cannot imitate another field. Emotion and scene are
    /// prompt hints only and stay out of the fingerprint, so a scene
    /// description does not split the cache.
    pub fn fingerprint(&self) -> String {
        serde_json::json!([
            self.gender,
            self.relationship.as_deref().map(str::trim).unwrap_or(""),
            self.formality,
            self.is_thought,
            self.is_sfx,
        ])
        .to_string()
    }

    /// Whether any hint deviates from the defaults
    pub fn has_hints(&self) -> bool {
        self != &Self::default()
    }

    /// Human readable hint line for prompts, `None` when there is nothing to say
    pub fn describe(&self) -> Option<String> {
        let mut parts = Vec::new();
        if self.gender != SpeakerGender::Unspecified {
            parts.push(format!("speaker gender: {}", self.gender));
        }
        if let Some(relationship) = &self.relationship {
            parts.push(format!("relationship: {}", relationship));
        }
        if self.formality != Formality::Neutral {
            parts.push(format!("formality: {}", self.formality));
        }
        if let Some(emotion) = &self.emotion {
            parts.push(format!("emotion: {}", emotion));
        }
        if self.is_thought {
            parts.push("inner thought".to_string());
        }
        if self.is_sfx {
            parts.push("sound effect".to_string());
        }
        if let Some(scene) = &self.scene {
            parts.push(format!("scene: {}", scene));
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Facts about the run a batch belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchScope {
    /// Number of pages whose fragments share the batch
    pub page_count: usize,
}

impl BatchScope {
    pub fn pages(page_count: usize) -> Self {
        Self { page_count }
    }

    /// A batch spanning several pages
    pub fn is_mega_batch(&self) -> bool {
        self.page_count > 1
    }
}
