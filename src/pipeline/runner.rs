/*!
 * Pipeline runner.
 *
 * Pages are grouped into runs. Within a run, extraction fans out over a
 * bounded pool, the whole run meets at one batch translation call, and
 * layout plus compositing fan out again. A failing page is recorded and its
 * siblings keep going.
 */

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::app_config::Config;
use crate::errors::PipelineError;
use crate::layout::{BubbleLayoutEngine, RenderPlan, Rgb};
use crate::text_normalizer::TextNormalizer;
use crate::translation::{
    BatchScope, BatchTranslationCoordinator, FragmentOrigin, ResultOutcome, TranslationContext, TranslationFragment,
    TranslationResult,
};

use super::{
    BubbleLocator, BubbleRegion, ImageCompositor, PageImage, PageOutcome, PageStatus, RunSummary, TextExtractor,
};

/// Runner settings
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Language hint for extraction and the source side of the batch
    pub source_language: String,
    pub extraction_workers: usize,
    pub compositing_workers: usize,
    pub max_pages_per_run: usize,
    /// Timeout for one detector, OCR or compositor call
    pub stage_timeout: Duration,
    /// Extra attempts after a failed stage call
    pub stage_retry_count: u32,
    /// Text colour handed to the compositor
    pub fill: Rgb,
    /// Context shared by every fragment of a run
    pub context: TranslationContext,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        let pipeline = &config.pipeline;
        Self {
            source_language: config.source_language.clone(),
            extraction_workers: pipeline.extraction_workers.max(1),
            compositing_workers: pipeline.compositing_workers.max(1),
            max_pages_per_run: pipeline.max_pages_per_run.max(1),
            stage_timeout: Duration::from_secs(pipeline.stage_timeout_secs),
            stage_retry_count: pipeline.stage_retry_count,
            fill: Rgb::BLACK,
            context: TranslationContext::default(),
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Detection,
    Extraction,
    Compositing,
}

impl Stage {
    fn error(self, message: String) -> PipelineError {
        match self {
            Stage::Detection => PipelineError::Detection(message),
            Stage::Extraction => PipelineError::Extraction(message),
            Stage::Compositing => PipelineError::Compositing(message),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Detection => write!(f, "detection"),
            Stage::Extraction => write!(f, "extraction"),
            Stage::Compositing => write!(f, "compositing"),
        }
    }
}

/// Result of the extraction half for one page
type Extracted = Result<Vec<BubbleRegion>, PipelineError>;

/// Detect, read, translate and repaint pages
pub struct MangaPipeline {
    locator: Arc<dyn BubbleLocator>,
    extractor: Arc<dyn TextExtractor>,
    compositor: Arc<dyn ImageCompositor>,
    coordinator: Arc<BatchTranslationCoordinator>,
    layout: BubbleLayoutEngine,
    normalizer: TextNormalizer,
    extraction_slots: Arc<Semaphore>,
    compositing_slots: Arc<Semaphore>,
    options: PipelineOptions,
}

impl MangaPipeline {
    pub fn new(
        locator: Arc<dyn BubbleLocator>,
        extractor: Arc<dyn TextExtractor>,
        compositor: Arc<dyn ImageCompositor>,
        coordinator: Arc<BatchTranslationCoordinator>,
        layout: BubbleLayoutEngine,
        options: PipelineOptions,
    ) -> Self {
        Self {
            locator,
            extractor,
            compositor,
            coordinator,
            layout,
            normalizer: TextNormalizer::new(),
            extraction_slots: Arc::new(Semaphore::new(options.extraction_workers.max(1))),
            compositing_slots: Arc::new(Semaphore::new(options.compositing_workers.max(1))),
            options,
        }
    }

    /// Replace the OCR text normalizer
    pub fn with_normalizer(mut self, normalizer: TextNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn coordinator(&self) -> &BatchTranslationCoordinator {
        &self.coordinator
    }

    /// Process pages in runs of at most `max_pages_per_run`
    pub async fn process(&self, pages: Vec<PageImage>) -> Result<Vec<RunSummary>, PipelineError> {
        self.process_with_progress(pages, |_, _| {}).await
    }

    /// Like `process`, reporting `(finished, total)` after every page
    pub async fn process_with_progress<F>(
        &self,
        pages: Vec<PageImage>,
        progress: F,
    ) -> Result<Vec<RunSummary>, PipelineError>
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        validate_pages(&pages)?;

        let total = pages.len();
        let finished = AtomicUsize::new(0);
        let report = || {
            let current = finished.fetch_add(1, Ordering::SeqCst) + 1;
            progress(current, total);
        };

        let run_size = self.options.max_pages_per_run.max(1);
        let run_count = pages.len().div_ceil(run_size);
        info!("Processing {} pages in {} runs", total, run_count);

        let mut summaries = Vec::with_capacity(run_count);
        for (run_index, run_pages) in pages.chunks(run_size).enumerate() {
            debug!("Starting run {} of {} ({} pages)", run_index + 1, run_count, run_pages.len());
            summaries.push(self.run(run_pages, &report).await);
        }

        Ok(summaries)
    }

    /// Process one group of pages with a single batch call
    pub async fn process_run(&self, pages: &[PageImage]) -> Result<RunSummary, PipelineError> {
        validate_pages(pages)?;
        Ok(self.run(pages, &|| {}).await)
    }

    async fn run(&self, pages: &[PageImage], report: &(dyn Fn() + Send + Sync)) -> RunSummary {
        let run_id = Uuid::new_v4();
        let start_time = Instant::now();

        // Stage 1: extraction, results back in page order
        let mut extracted = stream::iter(pages.iter().enumerate())
            .map(|(index, page)| async move {
                let page_start = Instant::now();
                let result = self.extract_page(page).await;
                (index, result, page_start.elapsed())
            })
            .buffer_unordered(self.options.extraction_workers.max(1))
            .collect::<Vec<(usize, Extracted, Duration)>>()
            .await;
        extracted.sort_by_key(|(index, _, _)| *index);

        // Stage 2: one batch for every region of the run
        let fragments: Vec<TranslationFragment> = extracted
            .iter()
            .filter_map(|(_, result, _)| result.as_ref().ok())
            .flatten()
            .map(|region| {
                TranslationFragment::new(
                    region.normalized_text.clone(),
                    self.options.context.clone(),
                    FragmentOrigin::new(&region.image_id, region.bubble_index),
                )
            })
            .collect();

        let pages_with_text: HashSet<&str> = fragments
            .iter()
            .filter(|f| !f.is_blank())
            .map(|f| f.origin.image_id.as_str())
            .collect();

        info!(
            "Run {}: {} text blocks from {} pages",
            run_id,
            fragments.iter().filter(|f| !f.is_blank()).count(),
            pages.len()
        );

        let calls_before = self.coordinator.stats().backend_calls;
        let results = if fragments.is_empty() {
            Vec::new()
        } else {
            self.coordinator
                .translate_batch(
                    &fragments,
                    &self.options.source_language,
                    &self.options.context,
                    BatchScope::pages(pages_with_text.len().max(1)),
                )
                .await
        };
        let after = self.coordinator.stats();
        let strategy = if after.backend_calls > calls_before {
            after.last_strategy
        } else {
            None
        };

        let mut by_origin: HashMap<FragmentOrigin, TranslationResult> =
            results.into_iter().map(|r| (r.origin.clone(), r)).collect();

        // Stage 3: layout and compositing
        let work: Vec<(usize, &PageImage, Extracted, Vec<TranslationResult>, Duration)> = extracted
            .into_iter()
            .map(|(index, result, elapsed)| {
                let page = &pages[index];
                let translations = match &result {
                    Ok(regions) => regions
                        .iter()
                        .map(|region| {
                            let origin = FragmentOrigin::new(&region.image_id, region.bubble_index);
                            by_origin.remove(&origin).unwrap_or_else(|| TranslationResult {
                                translated_text: region.normalized_text.clone(),
                                origin,
                                outcome: ResultOutcome::Passthrough,
                            })
                        })
                        .collect(),
                    Err(_) => Vec::new(),
                };
                (index, page, result, translations, elapsed)
            })
            .collect();

        let mut outcomes = stream::iter(work)
            .map(|(index, page, result, translations, elapsed)| async move {
                let outcome = match result {
                    Ok(regions) => self.composite_page(page, regions, translations, elapsed).await,
                    Err(e) => {
                        warn!("Page {} failed: {}", page.id, e);
                        PageOutcome::failed(&page.id, e, elapsed)
                    }
                };
                report();
                (index, outcome)
            })
            .buffer_unordered(self.options.compositing_workers.max(1))
            .collect::<Vec<_>>()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let summary = RunSummary {
            run_id,
            pages: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
            fragment_count: fragments.len(),
            strategy,
            elapsed: start_time.elapsed(),
        };

        info!(
            "Run {} finished in {:.2}s: {} completed, {} failed",
            run_id,
            summary.elapsed.as_secs_f64(),
            summary.completed_pages(),
            summary.failed_pages()
        );

        summary
    }

    /// Detect bubbles and read their text in reading order
    async fn extract_page(&self, page: &PageImage) -> Extracted {
        let _permit = self
            .extraction_slots
            .acquire()
            .await
            .map_err(|e| PipelineError::Extraction(e.to_string()))?;

        let mut detections = self
            .with_stage_retry(Stage::Detection, &page.id, || self.locator.detect(page))
            .await?;
        detections.sort_by(|a, b| a.rect.y1.total_cmp(&b.rect.y1));

        let (width, height) = (page.width as f32, page.height as f32);
        let mut regions = Vec::with_capacity(detections.len());

        for detection in detections {
            let rect = detection.rect.clamp_to(width, height);
            if rect.is_degenerate() {
                debug!("Skipping empty detection on {}: {:?}", page.id, detection.rect);
                continue;
            }

            let raw_text = match self
                .with_stage_retry(Stage::Extraction, &page.id, || {
                    self.extractor.extract(page, &rect, &self.options.source_language)
                })
                .await
            {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    warn!("Could not read bubble {} on {}: {}", regions.len(), page.id, e);
                    String::new()
                }
            };

            let normalized_text = self.normalizer.normalize(&raw_text);
            regions.push(BubbleRegion {
                image_id: page.id.clone(),
                rect,
                raw_text,
                normalized_text,
                bubble_index: regions.len(),
            });
        }

        debug!("Extracted {} bubbles from {}", regions.len(), page.id);
        Ok(regions)
    }

    /// Lay out translated regions and paint them
    async fn composite_page(
        &self,
        page: &PageImage,
        regions: Vec<BubbleRegion>,
        translations: Vec<TranslationResult>,
        extraction_time: Duration,
    ) -> PageOutcome {
        let start_time = Instant::now();

        let plans: Vec<RenderPlan> = regions
            .iter()
            .zip(&translations)
            .filter(|(_, result)| result.outcome == ResultOutcome::Translated || result.outcome == ResultOutcome::Cached)
            .map(|(region, result)| self.layout.plan(&result.translated_text, region.rect, self.options.fill))
            .filter(|plan| !plan.is_empty())
            .collect();

        let has_text = regions.iter().any(|r| !r.normalized_text.is_empty());
        let status = if !has_text {
            PageStatus::NoText
        } else if plans.is_empty() {
            PageStatus::Completed
        } else {
            match self.paint(page, &plans).await {
                Ok(()) => PageStatus::Completed,
                Err(e) => {
                    warn!("Page {} failed: {}", page.id, e);
                    PageStatus::Failed(e)
                }
            }
        };

        let overflowing = plans.iter().filter(|p| p.overflow).count();
        if overflowing > 0 {
            debug!("{} bubbles on {} overflow at minimum size", overflowing, page.id);
        }

        PageOutcome {
            image_id: page.id.clone(),
            regions,
            translations,
            plans,
            status,
            elapsed: extraction_time + start_time.elapsed(),
        }
    }

    async fn paint(&self, page: &PageImage, plans: &[RenderPlan]) -> Result<(), PipelineError> {
        let _permit = self
            .compositing_slots
            .acquire()
            .await
            .map_err(|e| PipelineError::Compositing(e.to_string()))?;

        self.with_stage_retry(Stage::Compositing, &page.id, || self.compositor.composite(page, plans))
            .await
    }

    /// Run a stage call under the stage timeout, retrying failures
    async fn with_stage_retry<T, F, Fut>(&self, stage: Stage, image_id: &str, mut call: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let attempts = self.options.stage_retry_count + 1;
        let mut last_error = stage.error("no attempt made".to_string());

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.options.stage_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => last_error = e,
                Err(_) => {
                    last_error = stage.error(format!("timed out after {:?}", self.options.stage_timeout));
                }
            }
            debug!("{} for {} failed (attempt {}/{}): {}", stage, image_id, attempt, attempts, last_error);
        }

        Err(last_error)
    }
}

/// Reject inputs that would break origin tracking
fn validate_pages(pages: &[PageImage]) -> Result<(), PipelineError> {
    let mut seen = HashSet::new();
    for page in pages {
        if page.id.trim().is_empty() {
            return Err(PipelineError::InvalidInput("page with an empty id".to_string()));
        }
        if page.width == 0 || page.height == 0 {
            return Err(PipelineError::InvalidInput(format!("page {} has no pixels", page.id)));
        }
        if !seen.insert(page.id.as_str()) {
            return Err(PipelineError::InvalidInput(format!("duplicate page id {}", page.id)));
        }
    }
    Ok(())
}
