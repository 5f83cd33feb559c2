/*!
 * Mock backend for tests and dry runs.
 *
 * The mock reads the source texts back out of the prompt and answers with
 * tagged "translations", so callers can check that every result landed in
 * the right slot. Behaviors simulate the failure modes the coordinator has
 * to survive:
 * - `MockBackend::working()` - Always answers every line
 * - `MockBackend::failing()` - Always fails with an API error
 * - `MockBackend::fail_above(n)` - Fails prompts holding more than `n` texts
 * - `MockBackend::drop_last_line()` - Batch answers miss their last line
 * - `MockBackend::scripted(text)` - Batch answers are a fixed response text
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::key_rotation::Credential;
use crate::translation::prompts::{SINGLE_TEXT_LABEL, TEXTS_HEADING};
use super::TranslationBackend;

/// Behavior mode for the mock backend
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with one line per text
    Working,
    /// Always fails with an error
    Failing,
    /// Fails when the prompt holds more than this many texts
    FailAboveItems(usize),
    /// Batch prompts are answered without their last line
    DropLastLine,
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Simulates slow response (for timeout testing)
    Slow { delay_ms: u64 },
    /// Rejects calls backed by this secret, works for every other one
    RejectKey(String),
    /// Batch prompts get this exact response, single prompts are echoed
    ScriptedBatch(String),
}

/// A prompt as the mock saw it
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub key_secret: Option<String>,
    pub item_count: usize,
}

/// Mock backend for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockBackend {
    /// Behavior mode
    behavior: MockBehavior,
    /// Tag put in front of each echoed text
    tag: String,
    /// Whether calls must carry a credential
    needs_credential: bool,
    /// Request counter shared between clones
    request_count: Arc<AtomicUsize>,
    /// Every prompt received, shared between clones
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockBackend {
    /// Create a new mock backend with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            tag: "TL".to_string(),
            needs_credential: false,
            request_count: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a working mock backend that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a failing mock backend that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock that fails prompts with more than `max_items` texts
    pub fn fail_above(max_items: usize) -> Self {
        Self::new(MockBehavior::FailAboveItems(max_items))
    }

    /// Create a mock whose batch answers come one line short
    pub fn drop_last_line() -> Self {
        Self::new(MockBehavior::DropLastLine)
    }

    /// Create an intermittently failing mock backend
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every: fail_every.max(1) })
    }

    /// Create a mock that sleeps before answering
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Create a mock that rejects one credential
    pub fn reject_key(key_secret: impl Into<String>) -> Self {
        Self::new(MockBehavior::RejectKey(key_secret.into())).requiring_credential()
    }

    /// Create a mock answering every batch prompt with `response`
    pub fn scripted(response: impl Into<String>) -> Self {
        Self::new(MockBehavior::ScriptedBatch(response.into()))
    }

    /// Set the tag put in front of echoed texts
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Make the coordinator acquire a credential for every call
    pub fn requiring_credential(mut self) -> Self {
        self.needs_credential = true;
        self
    }

    /// The translation the mock produces for a text
    pub fn translate_text(&self, text: &str) -> String {
        format!("[{}] {}", self.tag, text)
    }

    /// Number of calls made so far, across clones
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Every call made so far, across clones
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Texts carried by a prompt, and whether it was a batch prompt
    pub fn extract_texts(prompt: &str) -> (Vec<String>, bool) {
        if let Some((_, listing)) = prompt.split_once(TEXTS_HEADING) {
            let texts = listing
                .lines()
                .map(str::trim)
                .filter_map(|line| {
                    let (number, text) = line.split_once(". ")?;
                    number.parse::<usize>().ok().map(|_| text.to_string())
                })
                .collect();
            return (texts, true);
        }

        let single = prompt
            .rsplit_once(SINGLE_TEXT_LABEL)
            .map(|(_, text)| vec![text.trim().to_string()])
            .unwrap_or_default();
        (single, false)
    }

    fn answer(&self, texts: &[String], is_batch: bool, drop_last: bool) -> String {
        if !is_batch {
            return texts.first().map(|t| self.translate_text(t)).unwrap_or_default();
        }

        let keep = if drop_last { texts.len().saturating_sub(1) } else { texts.len() };
        texts
            .iter()
            .take(keep)
            .enumerate()
            .map(|(i, text)| format!("{}. {}", i + 1, self.translate_text(text)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::working()
    }
}

#[async_trait]
impl TranslationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn requires_credential(&self) -> bool {
        self.needs_credential
    }

    async fn call(&self, credential: Option<&Credential>, prompt: &str) -> Result<String, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        let (texts, is_batch) = Self::extract_texts(prompt);

        self.calls.lock().push(RecordedCall {
            prompt: prompt.to_string(),
            key_secret: credential.map(|c| c.key_secret.clone()),
            item_count: texts.len(),
        });

        if self.needs_credential && credential.is_none() {
            return Err(ProviderError::NoCredential);
        }

        match &self.behavior {
            MockBehavior::Working => Ok(self.answer(&texts, is_batch, false)),

            MockBehavior::Failing => Err(ProviderError::ApiError {
                status_code: 500,
                message: "Simulated API failure".to_string(),
            }),

            MockBehavior::FailAboveItems(max_items) => {
                if texts.len() > *max_items {
                    Err(ProviderError::ApiError {
                        status_code: 500,
                        message: format!("Simulated failure for {} texts", texts.len()),
                    })
                } else {
                    Ok(self.answer(&texts, is_batch, false))
                }
            }

            MockBehavior::DropLastLine => Ok(self.answer(&texts, is_batch, true)),

            MockBehavior::Intermittent { fail_every } => {
                if count % fail_every == fail_every - 1 {
                    Err(ProviderError::ApiError {
                        status_code: 500,
                        message: format!("Simulated intermittent failure (request {})", count + 1),
                    })
                } else {
                    Ok(self.answer(&texts, is_batch, false))
                }
            }

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                Ok(self.answer(&texts, is_batch, false))
            }

            MockBehavior::RejectKey(rejected) => {
                if credential.map(|c| &c.key_secret == rejected).unwrap_or(false) {
                    Err(ProviderError::AuthenticationError("Simulated invalid API key".to_string()))
                } else {
                    Ok(self.answer(&texts, is_batch, false))
                }
            }

            MockBehavior::ScriptedBatch(response) if is_batch => Ok(response.clone()),
            MockBehavior::ScriptedBatch(_) => Ok(self.answer(&texts, is_batch, false)),
        }
    }
}
