/*!
 * Translation caching functionality.
 *
 * Memoizes translations keyed by normalized text, source language and the
 * context fingerprint, so the same bubble text never costs a second backend
 * call within a session. The cache can optionally be written to and read
 * from a JSON file between sessions.
 */

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use log::{debug, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::language_utils::{self, AUTO_LANGUAGE};
use super::context::TranslationContext;
use super::phrases::COMMON_PHRASES;

/// Cache key combining normalized text, source language and context fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Trimmed, lowercased source text
    pub text: String,

    /// Canonical source language code
    pub source_language: String,

    /// Fingerprint of the translation context
    pub context: String,
}

impl CacheKey {
    /// The single key derivation used for both lookup and store
    pub fn derive(source_text: &str, source_language: &str, context: &TranslationContext) -> Self {
        let source_language = language_utils::normalize_code(source_language)
            .unwrap_or_else(|_| source_language.trim().to_lowercase());
        Self {
            text: source_text.trim().to_lowercase(),
            source_language,
            context: context.fingerprint(),
        }
    }

    /// Hex SHA-256 digest used as the key of the persisted file
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.source_language.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.context.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedEntry {
    key: CacheKey,
    translation: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCache {
    target_language: String,
    entries: HashMap<String, PersistedEntry>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<CacheKey, String>,
    // Insertion order, oldest first
    order: VecDeque<CacheKey>,
}

/// Translation cache for storing and retrieving translations.
///
/// Cloning yields another handle onto the same storage.
#[derive(Clone)]
pub struct TranslationCache {
    inner: Arc<RwLock<CacheInner>>,
    hits: Arc<AtomicUsize>,
    misses: Arc<AtomicUsize>,
    max_entries: usize,
    enabled: bool,
}

impl TranslationCache {
    /// Create a new translation cache holding at most `max_entries` translations
    pub fn new(enabled: bool, max_entries: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner::default())),
            hits: Arc::new(AtomicUsize::new(0)),
            misses: Arc::new(AtomicUsize::new(0)),
            max_entries: max_entries.max(1),
            enabled,
        }
    }

    /// Get a translation from the cache
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let inner = self.inner.read();
        match inner.entries.get(key) {
            Some(translation) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for '{}' ({})", truncate_text(&key.text, 30), key.source_language);
                Some(translation.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a translation in the cache, evicting the oldest entry when full
    pub fn store(&self, key: CacheKey, translation: &str) {
        if !self.enabled {
            return;
        }

        let mut inner = self.inner.write();
        if inner.entries.insert(key.clone(), translation.to_string()).is_none() {
            inner.order.push_back(key);
        }

        while inner.entries.len() > self.max_entries {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Pre-fill stock phrases of `source_language` translated into `target_language`.
    ///
    /// An `auto` source seeds every language of the table. Sound effects are
    /// stored under both the plain and the sound-effect context. Returns the
    /// number of entries stored.
    pub fn seed_common_phrases(&self, source_language: &str, target_language: &str) -> usize {
        if !self.enabled {
            return 0;
        }
        let Ok(target) = language_utils::normalize_code(target_language) else {
            return 0;
        };
        let source = language_utils::normalize_code(source_language)
            .unwrap_or_else(|_| source_language.trim().to_lowercase());

        let speech = TranslationContext::new();
        let sound = TranslationContext::new().sfx(true);
        let mut seeded = 0;
        for phrase in COMMON_PHRASES {
            if source != AUTO_LANGUAGE && source != phrase.source_language {
                continue;
            }
            let Some(translation) = phrase.translation_for(&target) else {
                continue;
            };
            self.store(CacheKey::derive(phrase.text, &source, &speech), translation);
            seeded += 1;
            if phrase.is_sfx {
                self.store(CacheKey::derive(phrase.text, &source, &sound), translation);
                seeded += 1;
            }
        }

        debug!("Seeded {} common phrases for {} -> {}", seeded, source, target);
        seeded
    }

    /// Get cache statistics as (hits, misses, hit rate)
    pub fn stats(&self) -> (usize, usize, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        (hits, misses, hit_rate)
    }

    /// Clear the cache and its counters
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.order.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!("Translation cache cleared");
    }

    /// Get the number of entries in the cache
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Check if the cache is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Write all entries to a JSON file
    pub fn save_to(&self, path: &Path, target_language: &str) -> Result<()> {
        let entries = {
            let inner = self.inner.read();
            inner
                .entries
                .iter()
                .map(|(key, translation)| {
                    (
                        key.digest(),
                        PersistedEntry {
                            key: key.clone(),
                            translation: translation.clone(),
                        },
                    )
                })
                .collect::<HashMap<_, _>>()
        };

        let persisted = PersistedCache {
            target_language: target_language.to_string(),
            entries,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
            }
        }

        let json = serde_json::to_string_pretty(&persisted).context("Failed to serialize cache")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write cache file: {}", path.display()))?;

        debug!("Saved {} cache entries to {}", persisted.entries.len(), path.display());
        Ok(())
    }

    /// Merge entries from a JSON file written by `save_to`.
    ///
    /// Entries recorded for another target language are ignored. Returns the
    /// number of entries loaded; a missing file loads nothing.
    pub fn load_from(&self, path: &Path, target_language: &str) -> Result<usize> {
        if !path.exists() {
            return Ok(0);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cache file: {}", path.display()))?;
        let persisted: PersistedCache = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse cache file: {}", path.display()))?;

        if !language_utils::language_codes_match(&persisted.target_language, target_language) {
            warn!(
                "Ignoring cache file {} written for target language '{}'",
                path.display(),
                persisted.target_language
            );
            return Ok(0);
        }

        let mut loaded = 0;
        for (digest, entry) in persisted.entries {
            if entry.key.digest() != digest {
                warn!("Skipping cache entry with mismatched digest {}", digest);
                continue;
            }
            self.store(entry.key, &entry.translation);
            loaded += 1;
        }

        debug!("Loaded {} cache entries from {}", loaded, path.display());
        Ok(loaded)
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new(true, 10_000)
    }
}

/// Truncate text to a maximum number of characters with ellipsis
fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
