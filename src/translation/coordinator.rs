/*!
 * Batch translation coordinator.
 *
 * Translates every fragment of a run with as few backend calls as possible:
 * cached and blank fragments are answered locally, everything else goes out
 * as one mega-batch. When that fails the coordinator walks down an ordered
 * strategy chain (smaller sub-batches, then one item at a time, then an
 * optional secondary backend) and finally hands back the source text.
 * Results always come back in input order, one per fragment; runtime
 * failures never surface as errors.
 */

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::app_config::Config;
use crate::errors::ProviderError;
use crate::key_rotation::KeyRotationPolicy;
use crate::providers::TranslationBackend;

use super::cache::{CacheKey, TranslationCache};
use super::context::{BatchScope, TranslationContext};
use super::parser::{self, ParsedBatch};
use super::prompts::PromptBuilder;

/// Where a fragment came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentOrigin {
    pub image_id: String,
    pub bubble_index: usize,
}

impl FragmentOrigin {
    pub fn new(image_id: impl Into<String>, bubble_index: usize) -> Self {
        Self {
            image_id: image_id.into(),
            bubble_index,
        }
    }
}

/// One piece of text to translate
#[derive(Debug, Clone)]
pub struct TranslationFragment {
    pub source_text: String,
    pub context: TranslationContext,
    pub origin: FragmentOrigin,
}

impl TranslationFragment {
    pub fn new(source_text: impl Into<String>, context: TranslationContext, origin: FragmentOrigin) -> Self {
        Self {
            source_text: source_text.into(),
            context,
            origin,
        }
    }

    /// Blank fragments are answered with an empty string without a backend call
    pub fn is_blank(&self) -> bool {
        self.source_text.trim().is_empty()
    }
}

/// How a result was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOutcome {
    /// Served from the cache
    Cached,
    /// Returned by the backend during this run
    Translated,
    /// Every strategy failed; the source text is returned unchanged
    Passthrough,
    /// The fragment held no text
    Empty,
}

/// Translation of one fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub translated_text: String,
    pub origin: FragmentOrigin,
    pub outcome: ResultOutcome,
}

/// One step of the degrade chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// All pending fragments in one call
    MegaBatch,
    /// Pending fragments in chunks of `chunk_size`
    SubBatch { chunk_size: usize },
    /// One call per pending fragment
    PerItem,
    /// The secondary backend, batch first and then per item
    Fallback,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MegaBatch => write!(f, "mega-batch"),
            Self::SubBatch { chunk_size } => write!(f, "sub-batch({})", chunk_size),
            Self::PerItem => write!(f, "per-item"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Result of running one strategy over the pending fragments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// Every pending fragment was translated
    Complete,
    /// These fragment indices are still untranslated
    Partial { missing: Vec<usize> },
    /// Nothing was translated
    Failed,
}

/// Counters over the coordinator's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Runs handled
    pub runs: usize,
    /// Backend calls made, retries included
    pub backend_calls: usize,
    pub cache_hits: usize,
    pub translated: usize,
    pub passthrough: usize,
    pub empty: usize,
    /// Strategy that finished the most recent run, `None` if nothing needed the backend
    pub last_strategy: Option<Strategy>,
}

/// Coordinator tuning
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Target language code
    pub target_language: String,
    /// Timeout for one backend call
    pub call_timeout: Duration,
    /// Retries of a failed call before the strategy gives up
    pub retry_count: u32,
    /// Base backoff between retries, doubled on each retry
    pub retry_backoff: Duration,
    /// Chunk size of the sub-batch strategy
    pub sub_batch_size: usize,
    /// Extra instructions for every prompt
    pub custom_prompt: Option<String>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl CoordinatorOptions {
    /// Options from the application config
    pub fn from_config(config: &Config) -> Self {
        let translation = &config.translation;
        Self {
            target_language: config.target_language.clone(),
            call_timeout: Duration::from_secs(translation.timeout_secs),
            retry_count: translation.retry_count,
            retry_backoff: Duration::from_millis(translation.retry_backoff_ms),
            sub_batch_size: translation.sub_batch_size.max(1),
            custom_prompt: translation.custom_prompt.clone(),
        }
    }
}

/// Texts obtained by one strategy, keyed by fragment index
type Obtained = Vec<(usize, String)>;

/// Translates runs of fragments through a backend
pub struct BatchTranslationCoordinator {
    backend: Arc<dyn TranslationBackend>,
    fallback: Option<Arc<dyn TranslationBackend>>,
    cache: TranslationCache,
    keys: Option<Arc<KeyRotationPolicy>>,
    options: CoordinatorOptions,
    stats: Mutex<CoordinatorStats>,
}

impl BatchTranslationCoordinator {
    /// Create a coordinator over a backend and a cache
    pub fn new(backend: Arc<dyn TranslationBackend>, cache: TranslationCache, options: CoordinatorOptions) -> Self {
        Self {
            backend,
            fallback: None,
            cache,
            keys: None,
            options,
            stats: Mutex::new(CoordinatorStats::default()),
        }
    }

    /// Back calls with credentials from a rotation policy
    pub fn with_key_rotation(mut self, keys: Arc<KeyRotationPolicy>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Try a second backend before handing back source text.
    ///
    /// The secondary shares the key rotation policy when it needs credentials.
    pub fn with_fallback_backend(mut self, fallback: Arc<dyn TranslationBackend>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats.lock().clone()
    }

    /// The degrade chain, tried in order
    pub fn strategy_chain(&self) -> Vec<Strategy> {
        let mut chain = vec![
            Strategy::MegaBatch,
            Strategy::SubBatch {
                chunk_size: self.options.sub_batch_size,
            },
            Strategy::PerItem,
        ];
        if self.fallback.is_some() {
            chain.push(Strategy::Fallback);
        }
        chain
    }

    /// Translate fragments, returning one result per fragment in input order.
    ///
    /// `context` describes the run in the batch prompt; each fragment's own
    /// context keys the cache and shapes its per-item retry.
    pub async fn translate_batch(
        &self,
        fragments: &[TranslationFragment],
        source_language: &str,
        context: &TranslationContext,
        scope: BatchScope,
    ) -> Vec<TranslationResult> {
        let start_time = Instant::now();
        let prompts = PromptBuilder::new(source_language, &self.options.target_language)
            .with_custom_prompt(self.options.custom_prompt.clone());

        let mut results: Vec<Option<TranslationResult>> = vec![None; fragments.len()];
        let mut pending = Vec::new();
        let mut cache_hits = 0;
        let mut empty = 0;

        for (index, fragment) in fragments.iter().enumerate() {
            if fragment.is_blank() {
                results[index] = Some(TranslationResult {
                    translated_text: String::new(),
                    origin: fragment.origin.clone(),
                    outcome: ResultOutcome::Empty,
                });
                empty += 1;
                continue;
            }

            let key = CacheKey::derive(&fragment.source_text, source_language, &fragment.context);
            match self.cache.get(&key) {
                Some(translation) => {
                    results[index] = Some(TranslationResult {
                        translated_text: translation,
                        origin: fragment.origin.clone(),
                        outcome: ResultOutcome::Cached,
                    });
                    cache_hits += 1;
                }
                None => pending.push(index),
            }
        }

        debug!(
            "Batch of {} fragments: {} cached, {} blank, {} to translate",
            fragments.len(),
            cache_hits,
            empty,
            pending.len()
        );

        let mut translated = 0;
        let mut last_strategy = None;
        let chain = self.strategy_chain();
        let mut step = 0;

        while step < chain.len() && !pending.is_empty() {
            let strategy = chain[step];
            if let Strategy::SubBatch { chunk_size } = strategy {
                if pending.len() <= chunk_size {
                    // One chunk would repeat the failed mega-batch
                    step += 1;
                    continue;
                }
            }

            let (obtained, outcome) = self
                .run_strategy(strategy, fragments, &pending, &prompts, context, scope)
                .await;
            last_strategy = Some(strategy);

            for (index, text) in obtained {
                let fragment = &fragments[index];
                let text = parser::post_process_translation(&text);
                let key = CacheKey::derive(&fragment.source_text, source_language, &fragment.context);
                self.cache.store(key, &text);
                results[index] = Some(TranslationResult {
                    translated_text: text,
                    origin: fragment.origin.clone(),
                    outcome: ResultOutcome::Translated,
                });
                translated += 1;
            }

            match outcome {
                StrategyOutcome::Complete => {
                    pending.clear();
                }
                StrategyOutcome::Partial { missing } => {
                    warn!("{} left {} fragments untranslated", strategy, missing.len());
                    pending = missing;
                    // Known gaps go straight to item-level retries
                    step = chain
                        .iter()
                        .position(|s| *s == Strategy::PerItem)
                        .map(|p| p.max(step + 1))
                        .unwrap_or(step + 1);
                }
                StrategyOutcome::Failed => {
                    warn!("{} failed for {} fragments", strategy, pending.len());
                    step += 1;
                }
            }
        }

        let passthrough = pending.len();
        if passthrough > 0 {
            warn!("Returning source text for {} untranslated fragments", passthrough);
        }
        for index in pending {
            let fragment = &fragments[index];
            results[index] = Some(TranslationResult {
                translated_text: fragment.source_text.clone(),
                origin: fragment.origin.clone(),
                outcome: ResultOutcome::Passthrough,
            });
        }

        {
            let mut stats = self.stats.lock();
            stats.runs += 1;
            stats.cache_hits += cache_hits;
            stats.translated += translated;
            stats.passthrough += passthrough;
            stats.empty += empty;
            stats.last_strategy = last_strategy;
        }

        info!(
            "Translated batch of {} fragments in {:?} ({} translated, {} cached, {} passthrough{})",
            fragments.len(),
            start_time.elapsed(),
            translated,
            cache_hits,
            passthrough,
            last_strategy.map(|s| format!(", finished by {}", s)).unwrap_or_default()
        );

        results
            .into_iter()
            .zip(fragments)
            .map(|(result, fragment)| {
                result.unwrap_or_else(|| TranslationResult {
                    translated_text: fragment.source_text.clone(),
                    origin: fragment.origin.clone(),
                    outcome: ResultOutcome::Passthrough,
                })
            })
            .collect()
    }

    async fn run_strategy(
        &self,
        strategy: Strategy,
        fragments: &[TranslationFragment],
        pending: &[usize],
        prompts: &PromptBuilder,
        context: &TranslationContext,
        scope: BatchScope,
    ) -> (Obtained, StrategyOutcome) {
        let primary = self.backend.as_ref();
        match strategy {
            Strategy::MegaBatch => {
                let (obtained, missing) =
                    self.translate_chunk(primary, fragments, pending, prompts, context, scope).await;
                (obtained, outcome_for(pending.len(), missing))
            }
            Strategy::SubBatch { chunk_size } => {
                let mut obtained = Vec::new();
                let mut missing = Vec::new();
                for chunk in pending.chunks(chunk_size.max(1)) {
                    let (chunk_obtained, chunk_missing) =
                        self.translate_chunk(primary, fragments, chunk, prompts, context, scope).await;
                    obtained.extend(chunk_obtained);
                    missing.extend(chunk_missing);
                }
                (obtained, outcome_for(pending.len(), missing))
            }
            Strategy::PerItem => {
                let (obtained, missing) = self.translate_items(primary, fragments, pending, prompts).await;
                (obtained, outcome_for(pending.len(), missing))
            }
            Strategy::Fallback => {
                let Some(secondary) = self.fallback.as_deref() else {
                    return (Vec::new(), StrategyOutcome::Failed);
                };
                info!("Trying {} for {} fragments", secondary.name(), pending.len());
                let (mut obtained, missing) =
                    self.translate_chunk(secondary, fragments, pending, prompts, context, scope).await;
                let missing = if missing.is_empty() {
                    missing
                } else {
                    let (item_obtained, item_missing) =
                        self.translate_items(secondary, fragments, &missing, prompts).await;
                    obtained.extend(item_obtained);
                    item_missing
                };
                (obtained, outcome_for(pending.len(), missing))
            }
        }
    }

    /// One single-text call per index; returns obtained texts and the indices still missing
    async fn translate_items(
        &self,
        backend: &dyn TranslationBackend,
        fragments: &[TranslationFragment],
        indices: &[usize],
        prompts: &PromptBuilder,
    ) -> (Obtained, Vec<usize>) {
        let mut obtained = Vec::new();
        let mut missing = Vec::new();
        for &index in indices {
            let fragment = &fragments[index];
            let prompt = prompts.single(&fragment.source_text, &fragment.context);
            let cleaned = match self.call_backend(backend, &prompt).await {
                Ok(response) => parser::clean_single_response(&response),
                Err(e) => {
                    debug!("Item {} failed on {}: {}", index, backend.name(), e);
                    None
                }
            };
            match cleaned {
                Some(text) => obtained.push((index, text)),
                None => missing.push(index),
            }
        }
        (obtained, missing)
    }

    /// Send one batch prompt; returns obtained texts and the indices still missing
    async fn translate_chunk(
        &self,
        backend: &dyn TranslationBackend,
        fragments: &[TranslationFragment],
        indices: &[usize],
        prompts: &PromptBuilder,
        context: &TranslationContext,
        scope: BatchScope,
    ) -> (Obtained, Vec<usize>) {
        let texts: Vec<&str> = indices.iter().map(|&i| fragments[i].source_text.as_str()).collect();
        let prompt = prompts.batch(&texts, context, scope);

        let response = match self.call_backend(backend, &prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!("{} batch call for {} texts failed: {}", backend.name(), indices.len(), e);
                return (Vec::new(), indices.to_vec());
            }
        };

        match parser::parse_batch_response(&response, indices.len()) {
            ParsedBatch::Success(lines) => (indices.iter().copied().zip(lines).collect(), Vec::new()),
            ParsedBatch::Recoverable { lines, missing } => {
                let obtained = indices
                    .iter()
                    .copied()
                    .zip(lines)
                    .enumerate()
                    .filter(|(position, _)| !missing.contains(position))
                    .map(|(_, pair)| pair)
                    .collect();
                let missing = missing.into_iter().map(|position| indices[position]).collect();
                (obtained, missing)
            }
            ParsedBatch::Malformed(reason) => {
                warn!("Unusable batch response: {}", reason);
                (Vec::new(), indices.to_vec())
            }
        }
    }

    /// One backend call with credential selection, timeout and retries
    async fn call_backend(&self, backend: &dyn TranslationBackend, prompt: &str) -> Result<String, ProviderError> {
        let mut last_error = ProviderError::RequestFailed("no attempt made".to_string());

        for attempt in 0..=self.options.retry_count {
            let credential = match (&self.keys, backend.requires_credential()) {
                (Some(keys), true) => match keys.acquire(true) {
                    Some(credential) => Some(credential),
                    None => return Err(ProviderError::NoCredential),
                },
                _ => None,
            };

            self.stats.lock().backend_calls += 1;
            let call = backend.call(credential.as_ref(), prompt);
            let error = match tokio::time::timeout(self.options.call_timeout, call).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(ProviderError::NoCredential)) => return Err(ProviderError::NoCredential),
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(self.options.call_timeout.as_secs()),
            };

            debug!(
                "{} call failed (attempt {}/{}): {}",
                backend.name(),
                attempt + 1,
                self.options.retry_count + 1,
                error
            );

            let credential_failure = error.is_credential_failure();
            if credential_failure {
                if let (Some(keys), Some(credential)) = (&self.keys, &credential) {
                    keys.quarantine(&credential.key_secret);
                }
            }
            last_error = error;

            // A rejected credential is replaced right away
            if attempt < self.options.retry_count && !credential_failure {
                let backoff = self.options.retry_backoff * 2u32.saturating_pow(attempt);
                tokio::time::sleep(backoff).await;
            }
        }

        Err(last_error)
    }
}

fn outcome_for(pending: usize, missing: Vec<usize>) -> StrategyOutcome {
    if missing.is_empty() {
        StrategyOutcome::Complete
    } else if missing.len() == pending {
        StrategyOutcome::Failed
    } else {
        StrategyOutcome::Partial { missing }
    }
}
