/*!
 * End-to-end tests of the page pipeline with in-memory collaborators
 */

use std::sync::Arc;
use std::time::Duration;

use mangatl::errors::PipelineError;
use mangatl::layout::BubbleLayoutEngine;
use mangatl::pipeline::{MangaPipeline, PageImage, PageStatus, PipelineOptions};
use mangatl::providers::mock::MockBackend;
use mangatl::translation::{BatchTranslationCoordinator, ResultOutcome, TranslationCache};

use crate::common::fake_pages::{FakePages, RecordingCompositor};
use crate::common::{fast_options, init_logging};

fn options(max_pages_per_run: usize) -> PipelineOptions {
    PipelineOptions {
        source_language: "ja".to_string(),
        extraction_workers: 3,
        compositing_workers: 2,
        max_pages_per_run,
        stage_timeout: Duration::from_secs(2),
        stage_retry_count: 1,
        ..PipelineOptions::default()
    }
}

fn pipeline(pages: FakePages, backend: &MockBackend, compositor: &RecordingCompositor, run_size: usize) -> MangaPipeline {
    let pages = Arc::new(pages);
    let coordinator = BatchTranslationCoordinator::new(
        Arc::new(backend.clone()),
        TranslationCache::new(true, 1000),
        fast_options(10),
    );
    MangaPipeline::new(
        pages.clone(),
        pages,
        Arc::new(compositor.clone()),
        Arc::new(coordinator),
        BubbleLayoutEngine::default(),
        options(run_size),
    )
}

#[tokio::test]
async fn test_process_withSeveralPages_shouldUseOneBatchCall() {
    init_logging();
    let pages = FakePages::new()
        .with_page("p1", &["一", "二"])
        .with_page("p2", &["三"])
        .with_page("p3", &["四", "五", "六"]);
    let backend = MockBackend::working();
    let compositor = RecordingCompositor::new();
    let pipeline = pipeline(pages, &backend, &compositor, 20);

    let summaries = pipeline.process(FakePages::images(&["p1", "p2", "p3"])).await.unwrap();

    assert_eq!(summaries.len(), 1);
    assert_eq!(backend.request_count(), 1);
    assert_eq!(backend.calls()[0].item_count, 6);
    assert_eq!(summaries[0].fragment_count, 6);

    let ids: Vec<&str> = summaries[0].pages.iter().map(|p| p.image_id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p2", "p3"]);
    assert_eq!(compositor.painted_pages(), vec!["p1", "p2", "p3"]);
}

#[tokio::test]
async fn test_process_shouldRedistributeInReadingOrder() {
    // Bubbles are scripted bottom to top, so reading order reverses them
    let pages = FakePages::new().with_page("p1", &["下", "中", "上"]);
    let backend = MockBackend::working();
    let compositor = RecordingCompositor::new();
    let pipeline = pipeline(pages, &backend, &compositor, 20);

    let summaries = pipeline.process(FakePages::images(&["p1"])).await.unwrap();
    let page = &summaries[0].pages[0];

    let texts: Vec<&str> = page.regions.iter().map(|r| r.raw_text.as_str()).collect();
    assert_eq!(texts, vec!["上", "中", "下"]);
    for (region, translation) in page.regions.iter().zip(&page.translations) {
        assert_eq!(translation.origin.bubble_index, region.bubble_index);
        assert_eq!(translation.translated_text, backend.translate_text(&region.normalized_text));
    }
    assert!(page.regions.windows(2).all(|w| w[0].rect.y1 <= w[1].rect.y1));
    assert_eq!(compositor.plans_for("p1").len(), 3);
}

#[tokio::test]
async fn test_process_withFailingDetector_shouldIsolateThatPage() {
    let pages = FakePages::new()
        .with_page("p1", &["一"])
        .with_page("p2", &["二"])
        .with_page("p3", &["三"])
        .failing_on("p2");
    let backend = MockBackend::working();
    let compositor = RecordingCompositor::new();
    let pipeline = pipeline(pages, &backend, &compositor, 20);

    let summaries = pipeline.process(FakePages::images(&["p1", "p2", "p3"])).await.unwrap();
    let summary = &summaries[0];

    assert!(matches!(
        summary.pages[1].status,
        PageStatus::Failed(PipelineError::Detection(_))
    ));
    assert!(matches!(summary.pages[0].status, PageStatus::Completed));
    assert!(matches!(summary.pages[2].status, PageStatus::Completed));
    assert_eq!(summary.failed_pages(), 1);
    assert_eq!(compositor.painted_pages(), vec!["p1", "p3"]);
}

#[tokio::test]
async fn test_process_withManyPages_shouldGroupIntoRuns() {
    let ids = ["a", "b", "c", "d", "e"];
    let pages = ids
        .iter()
        .fold(FakePages::new(), |pages, id| pages.with_page(id, &[*id]));
    let backend = MockBackend::working();
    let compositor = RecordingCompositor::new();
    let pipeline = pipeline(pages, &backend, &compositor, 2);

    let mut reported = Vec::new();
    let summaries = pipeline
        .process_with_progress(FakePages::images(&ids), |done, total| {
            assert_eq!(total, 5);
            assert!(done <= total);
        })
        .await
        .unwrap();
    reported.extend(summaries.iter().map(|s| s.pages.len()));

    assert_eq!(reported, vec![2, 2, 1]);
    assert_eq!(backend.request_count(), 3);
    let run_ids: std::collections::HashSet<_> = summaries.iter().map(|s| s.run_id).collect();
    assert_eq!(run_ids.len(), 3);
}

#[tokio::test]
async fn test_process_withFailingBackend_shouldKeepOriginalBubbles() {
    let pages = FakePages::new().with_page("p1", &["助けて", "逃げろ"]);
    let backend = MockBackend::failing();
    let compositor = RecordingCompositor::new();
    let pipeline = pipeline(pages, &backend, &compositor, 20);

    let summaries = pipeline.process(FakePages::images(&["p1"])).await.unwrap();
    let page = &summaries[0].pages[0];

    assert!(matches!(page.status, PageStatus::Completed));
    assert!(page.translations.iter().all(|t| t.outcome == ResultOutcome::Passthrough));
    assert_eq!(page.translations[0].translated_text, page.regions[0].normalized_text);
    assert!(compositor.painted_pages().is_empty());
}

#[tokio::test]
async fn test_process_withEmptyBubbles_shouldSkipCompositor() {
    let pages = FakePages::new().with_page("p1", &["", "  "]).with_page("p2", &[]);
    let backend = MockBackend::working();
    let compositor = RecordingCompositor::new();
    let pipeline = pipeline(pages, &backend, &compositor, 20);

    let summaries = pipeline.process(FakePages::images(&["p1", "p2"])).await.unwrap();

    assert!(summaries[0].pages.iter().all(|p| matches!(p.status, PageStatus::NoText)));
    assert_eq!(backend.request_count(), 0);
    assert!(compositor.painted_pages().is_empty());
}

#[tokio::test]
async fn test_process_withDuplicatePageIds_shouldRejectInput() {
    let backend = MockBackend::working();
    let compositor = RecordingCompositor::new();
    let pipeline = pipeline(FakePages::new().with_page("p1", &["一"]), &backend, &compositor, 20);

    let pages = vec![
        PageImage::new("p1", 100, 100, Vec::<u8>::new()),
        PageImage::new("p1", 100, 100, Vec::<u8>::new()),
    ];
    let result = pipeline.process(pages).await;

    assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_process_withRepeatedPages_shouldServeSecondRunFromCache() {
    let pages = FakePages::new().with_page("p1", &["また明日"]);
    let backend = MockBackend::working();
    let compositor = RecordingCompositor::new();
    let pipeline = pipeline(pages, &backend, &compositor, 20);

    pipeline.process(FakePages::images(&["p1"])).await.unwrap();
    let second = pipeline.process(FakePages::images(&["p1"])).await.unwrap();

    assert_eq!(backend.request_count(), 1);
    assert_eq!(second[0].pages[0].translations[0].outcome, ResultOutcome::Cached);
    assert_eq!(second[0].strategy, None);
}
