use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app_config::{BackendKind, Config};
use crate::file_utils::FileManager;
use crate::key_rotation::KeyRotationPolicy;
use crate::layout::BubbleLayoutEngine;
use crate::pipeline::dump::{self, DumpReplay, JsonPlanCompositor};
use crate::pipeline::{MangaPipeline, PageImage, PageStatus, PipelineOptions, RunSummary};
use crate::providers::TranslationBackend;
use crate::providers::gemini::Gemini;
use crate::providers::mock::MockBackend;
use crate::translation::{BatchTranslationCoordinator, CoordinatorOptions, ResultOutcome, TranslationCache};

// @module: Application controller for OCR dump translation

/// Cache file kept in the output directory between runs
pub const CACHE_FILE_NAME: &str = "translation_cache.json";

/// Report written after every translate run
pub const SUMMARY_FILE_NAME: &str = "summary.json";

/// Per-page line of the run report
#[derive(Debug, Serialize)]
pub struct PageReport {
    pub image_id: String,
    pub status: String,
    pub bubbles: usize,
    pub translated: usize,
    pub cached: usize,
    pub passthrough: usize,
    pub overflowing: usize,
    pub error: Option<String>,
}

/// Report of a whole translate invocation
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub target_language: String,
    pub backend: String,
    pub runs: usize,
    pub backend_calls: usize,
    pub cache_hits: usize,
    pub pages: Vec<PageReport>,
}

impl RunReport {
    fn page(page: &crate::pipeline::PageOutcome) -> PageReport {
        let count = |outcome: ResultOutcome| page.translations.iter().filter(|t| t.outcome == outcome).count();
        let (status, error) = match &page.status {
            PageStatus::Completed => ("completed".to_string(), None),
            PageStatus::NoText => ("no_text".to_string(), None),
            PageStatus::Failed(e) => ("failed".to_string(), Some(e.to_string())),
        };
        PageReport {
            image_id: page.image_id.clone(),
            status,
            bubbles: page.regions.len(),
            translated: count(ResultOutcome::Translated),
            cached: count(ResultOutcome::Cached),
            passthrough: count(ResultOutcome::Passthrough),
            overflowing: page.plans.iter().filter(|p| p.overflow).count(),
            error,
        }
    }
}

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Backend selected by the configuration
    pub fn build_backend(&self) -> Arc<dyn TranslationBackend> {
        let translation = &self.config.translation;
        self.backend_of(&translation.backend, &translation.model)
    }

    /// Secondary backend, if one is configured
    pub fn build_fallback_backend(&self) -> Option<Arc<dyn TranslationBackend>> {
        let translation = &self.config.translation;
        let kind = translation.fallback_backend.as_ref()?;
        let model = translation.fallback_model.as_deref().unwrap_or(&translation.model);
        let backend: Arc<dyn TranslationBackend> = match kind {
            BackendKind::Mock => Arc::new(MockBackend::working().with_tag("FB")),
            other => self.backend_of(other, model),
        };
        Some(backend)
    }

    fn backend_of(&self, kind: &BackendKind, model: &str) -> Arc<dyn TranslationBackend> {
        let translation = &self.config.translation;
        match kind {
            BackendKind::Gemini => Arc::new(Gemini::new(
                translation.endpoint.clone(),
                model.to_string(),
                translation.temperature,
                translation.timeout_secs,
            )),
            BackendKind::Mock => Arc::new(MockBackend::working()),
        }
    }

    /// Credential store from the configured file
    pub fn load_keys(&self) -> Result<KeyRotationPolicy> {
        let credentials = &self.config.credentials;
        KeyRotationPolicy::load(&credentials.file, credentials.rotation_strategy)
            .with_context(|| format!("Failed to load credentials from {}", credentials.file.display()))
    }

    /// Translate every OCR dump under `input`, writing plans to `output_dir`
    pub async fn run(&self, input: PathBuf, output_dir: PathBuf) -> Result<RunReport> {
        let start_time = std::time::Instant::now();

        // Earlier output nested inside the input folder is not input
        let dumps: Vec<PathBuf> = FileManager::collect_dumps(&input)?
            .into_iter()
            .filter(|path| !path.starts_with(&output_dir))
            .collect();
        if dumps.is_empty() {
            return Err(anyhow!("No OCR dumps found in {:?}", input));
        }
        FileManager::ensure_dir(&output_dir)?;

        let mut pages: Vec<PageImage> = Vec::with_capacity(dumps.len());
        for path in &dumps {
            match dump::load_page(path) {
                Ok(page) => pages.push(page),
                Err(e) => error!("Skipping {}: {:#}", path.display(), e),
            }
        }
        if pages.is_empty() {
            return Err(anyhow!("None of the {} OCR dumps could be read", dumps.len()));
        }

        let backend = self.build_backend();
        let cache = TranslationCache::new(
            self.config.translation.cache_enabled,
            self.config.translation.cache_max_entries,
        );
        let cache_path = output_dir.join(CACHE_FILE_NAME);
        if cache.is_enabled() {
            if self.config.translation.seed_common_phrases {
                let seeded = cache.seed_common_phrases(&self.config.source_language, &self.config.target_language);
                debug!("Seeded {} common phrases", seeded);
            }
            match cache.load_from(&cache_path, &self.config.target_language) {
                Ok(0) => {}
                Ok(loaded) => info!("Loaded {} cached translations", loaded),
                Err(e) => warn!("Ignoring translation cache: {:#}", e),
            }
        }

        let mut coordinator =
            BatchTranslationCoordinator::new(backend.clone(), cache.clone(), CoordinatorOptions::from_config(&self.config));
        let fallback = self.build_fallback_backend();
        if let Some(fallback) = &fallback {
            info!("Falling back to {} when {} fails", fallback.name(), backend.name());
            coordinator = coordinator.with_fallback_backend(fallback.clone());
        }
        let needs_keys = backend.requires_credential() || fallback.as_ref().is_some_and(|f| f.requires_credential());
        if needs_keys {
            let keys = Arc::new(self.load_keys()?);
            if !keys.has_available() {
                warn!("No usable API key; bubbles will keep their original text");
            }
            coordinator = coordinator.with_key_rotation(keys);
        }
        let coordinator = Arc::new(coordinator);

        let replay = Arc::new(DumpReplay);
        let pipeline = MangaPipeline::new(
            replay.clone(),
            replay,
            Arc::new(JsonPlanCompositor::new(&output_dir)),
            coordinator.clone(),
            BubbleLayoutEngine::new(self.config.layout.clone()),
            PipelineOptions::from_config(&self.config),
        );

        info!(
            "mangatl: {} pages, {} -> {} with {}",
            pages.len(),
            self.config.source_language,
            self.config.target_language,
            backend.name()
        );

        let progress_bar = ProgressBar::new(pages.len() as u64);
        let template_result = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(template_result.progress_chars("█▓▒░"));

        let bar = progress_bar.clone();
        let summaries = pipeline
            .process_with_progress(pages, move |done, _| bar.set_position(done as u64))
            .await?;
        progress_bar.finish_and_clear();

        if cache.is_enabled() {
            if let Err(e) = cache.save_to(&cache_path, &self.config.target_language) {
                warn!("Could not save translation cache: {:#}", e);
            }
        }

        let report = self.build_report(&summaries, coordinator.as_ref(), backend.name());
        Self::write_report(&report, &output_dir)?;

        let (hits, misses, rate) = cache.stats();
        debug!("Cache: {} hits, {} misses ({:.1}%)", hits, misses, rate * 100.0);
        let failed = report.pages.iter().filter(|p| p.error.is_some()).count();
        info!(
            "Done in {:.1}s: {} pages, {} failed, {} backend calls",
            start_time.elapsed().as_secs_f64(),
            report.pages.len(),
            failed,
            report.backend_calls
        );

        Ok(report)
    }

    fn build_report(&self, summaries: &[RunSummary], coordinator: &BatchTranslationCoordinator, backend: &str) -> RunReport {
        let stats = coordinator.stats();
        RunReport {
            target_language: self.config.target_language.clone(),
            backend: backend.to_string(),
            runs: summaries.len(),
            backend_calls: stats.backend_calls,
            cache_hits: stats.cache_hits,
            pages: summaries
                .iter()
                .flat_map(|summary| summary.pages.iter().map(RunReport::page))
                .collect(),
        }
    }

    fn write_report(report: &RunReport, output_dir: &Path) -> Result<()> {
        let path = output_dir.join(SUMMARY_FILE_NAME);
        let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Send a test request for every quarantined credential
    pub async fn probe_keys(&self) -> Result<usize> {
        let keys = self.load_keys()?;
        let backend = self.build_backend();
        Ok(keys.reprobe_quarantined(backend.as_ref()).await)
    }
}
