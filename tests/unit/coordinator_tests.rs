/*!
 * Tests for batch translation with the degrade chain
 */

use std::sync::Arc;

use mangatl::providers::mock::MockBackend;
use mangatl::translation::{
    BatchScope, BatchTranslationCoordinator, Formality, FragmentOrigin, ResultOutcome, Strategy, TranslationCache,
    TranslationContext, TranslationFragment,
};

use crate::common::{fast_options, fragments, init_logging};

fn coordinator(backend: &MockBackend, sub_batch_size: usize) -> BatchTranslationCoordinator {
    BatchTranslationCoordinator::new(
        Arc::new(backend.clone()),
        TranslationCache::new(true, 1000),
        fast_options(sub_batch_size),
    )
}

#[tokio::test]
async fn test_translateBatch_withWorkingBackend_shouldPreserveLengthAndOrder() {
    init_logging();
    let backend = MockBackend::working();
    let coordinator = coordinator(&backend, 10);
    let input = fragments("page-1", &["おはよう", "行くぞ", "待って"]);

    let results = coordinator
        .translate_batch(&input, "ja", &TranslationContext::new(), BatchScope::pages(1))
        .await;

    assert_eq!(results.len(), input.len());
    for (fragment, result) in input.iter().zip(&results) {
        assert_eq!(result.origin, fragment.origin);
        assert_eq!(result.translated_text, backend.translate_text(&fragment.source_text));
        assert_eq!(result.outcome, ResultOutcome::Translated);
    }
    assert_eq!(backend.request_count(), 1);
}

#[tokio::test]
async fn test_translateBatch_withWarmCache_shouldNotCallBackend() {
    let backend = MockBackend::working();
    let coordinator = coordinator(&backend, 10);
    let input = fragments("page-1", &["一", "二", "三"]);
    let context = TranslationContext::new();

    let first = coordinator.translate_batch(&input, "ja", &context, BatchScope::pages(1)).await;
    assert_eq!(backend.request_count(), 1);

    let second = coordinator.translate_batch(&input, "ja", &context, BatchScope::pages(1)).await;
    assert_eq!(backend.request_count(), 1);
    assert!(second.iter().all(|r| r.outcome == ResultOutcome::Cached));

    let first_texts: Vec<_> = first.iter().map(|r| &r.translated_text).collect();
    let second_texts: Vec<_> = second.iter().map(|r| &r.translated_text).collect();
    assert_eq!(first_texts, second_texts);
    assert_eq!(coordinator.stats().cache_hits, 3);
}

#[tokio::test]
async fn test_translateBatch_withCacheDisabled_shouldRepeatIdenticalResults() {
    let backend = MockBackend::working();
    let coordinator =
        BatchTranslationCoordinator::new(Arc::new(backend.clone()), TranslationCache::new(false, 10), fast_options(10));
    let input = fragments("page-1", &["あ", "", "い"]);
    let context = TranslationContext::new();

    let first = coordinator.translate_batch(&input, "ja", &context, BatchScope::pages(1)).await;
    let second = coordinator.translate_batch(&input, "ja", &context, BatchScope::pages(1)).await;

    assert_eq!(first, second);
    assert_eq!(backend.request_count(), 2);
}

#[tokio::test]
async fn test_translateBatch_withBlankFragment_shouldNotSendIt() {
    let backend = MockBackend::working();
    let coordinator = coordinator(&backend, 10);
    let input = fragments("page-1", &["Hello", "", "World"]);

    let results = coordinator
        .translate_batch(&input, "en", &TranslationContext::new(), BatchScope::pages(1))
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[1].translated_text, "");
    assert_eq!(results[1].outcome, ResultOutcome::Empty);
    assert_eq!(results[0].translated_text, "[TL] Hello");
    assert_eq!(results[2].translated_text, "[TL] World");

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].item_count, 2);
}

#[tokio::test]
async fn test_translateBatch_withOnlyBlankFragments_shouldMakeNoCall() {
    let backend = MockBackend::working();
    let coordinator = coordinator(&backend, 10);
    let input = fragments("page-1", &["", "   "]);

    let results = coordinator
        .translate_batch(&input, "ja", &TranslationContext::new(), BatchScope::pages(1))
        .await;

    assert!(results.iter().all(|r| r.outcome == ResultOutcome::Empty));
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_translateBatch_withOversizedBatch_shouldFallBackToSubBatches() {
    let backend = MockBackend::fail_above(10);
    let coordinator = coordinator(&backend, 10);
    let texts: Vec<String> = (0..25).map(|i| format!("台詞{}", i)).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let input = fragments("page-1", &refs);

    let results = coordinator
        .translate_batch(&input, "ja", &TranslationContext::new(), BatchScope::pages(1))
        .await;

    assert_eq!(results.len(), 25);
    assert!(results.iter().all(|r| r.outcome == ResultOutcome::Translated));
    for (text, result) in texts.iter().zip(&results) {
        assert_eq!(result.translated_text, backend.translate_text(text));
    }

    // One failed mega batch, then chunks of 10, 10 and 5
    let sizes: Vec<usize> = backend.calls().iter().map(|c| c.item_count).collect();
    assert_eq!(sizes, vec![25, 10, 10, 5]);
    assert_eq!(
        coordinator.stats().last_strategy,
        Some(Strategy::SubBatch { chunk_size: 10 })
    );
}

#[tokio::test]
async fn test_translateBatch_withSmallSubBatchLimit_shouldReachPerItem() {
    let backend = MockBackend::fail_above(1);
    let coordinator = coordinator(&backend, 2);
    let input = fragments("page-1", &["a", "b", "c"]);

    let results = coordinator
        .translate_batch(&input, "en", &TranslationContext::new(), BatchScope::pages(1))
        .await;

    assert!(results.iter().all(|r| r.outcome == ResultOutcome::Translated));
    assert_eq!(coordinator.stats().last_strategy, Some(Strategy::PerItem));
}

#[tokio::test]
async fn test_translateBatch_withMissingLastLine_shouldRetryOnlyThatItem() {
    let backend = MockBackend::drop_last_line();
    let coordinator = coordinator(&backend, 10);
    let input = fragments("page-1", &["一つ", "二つ", "三つ"]);

    let results = coordinator
        .translate_batch(&input, "ja", &TranslationContext::new(), BatchScope::pages(1))
        .await;

    assert!(results.iter().all(|r| r.outcome == ResultOutcome::Translated));
    assert_eq!(results[2].translated_text, backend.translate_text("三つ"));

    let sizes: Vec<usize> = backend.calls().iter().map(|c| c.item_count).collect();
    assert_eq!(sizes, vec![3, 1]);
}

#[tokio::test]
async fn test_translateBatch_withFailingBackend_shouldPassOriginalTextThrough() {
    let backend = MockBackend::failing();
    let coordinator = coordinator(&backend, 2);
    let input = fragments("page-1", &["助けて", "", "逃げろ"]);

    let results = coordinator
        .translate_batch(&input, "ja", &TranslationContext::new(), BatchScope::pages(1))
        .await;

    assert_eq!(results[0].translated_text, "助けて");
    assert_eq!(results[0].outcome, ResultOutcome::Passthrough);
    assert_eq!(results[1].outcome, ResultOutcome::Empty);
    assert_eq!(results[2].translated_text, "逃げろ");
    assert!(coordinator.cache().is_empty());
    assert_eq!(coordinator.stats().passthrough, 2);
}

#[tokio::test]
async fn test_translateBatch_withDifferentContexts_shouldKeepSeparateCacheEntries() {
    let backend = MockBackend::working();
    let coordinator = coordinator(&backend, 10);
    let casual = TranslationContext::new().with_formality(Formality::Casual);
    let polite = TranslationContext::new().with_formality(Formality::Polite);
    let input = vec![
        TranslationFragment::new("ありがとう", casual, FragmentOrigin::new("p", 0)),
        TranslationFragment::new("ありがとう", polite, FragmentOrigin::new("p", 1)),
    ];

    coordinator
        .translate_batch(&input, "ja", &TranslationContext::new(), BatchScope::pages(1))
        .await;

    assert_eq!(coordinator.cache().len(), 2);
}

#[tokio::test]
async fn test_translateBatch_withMegaBatchScope_shouldMentionPageCount() {
    let backend = MockBackend::working();
    let coordinator = coordinator(&backend, 10);
    let mut input = fragments("page-1", &["一"]);
    input.extend(fragments("page-2", &["二"]));

    coordinator
        .translate_batch(&input, "ja", &TranslationContext::new(), BatchScope::pages(2))
        .await;

    let prompt = &backend.calls()[0].prompt;
    assert!(prompt.contains("2 pages"));
}

#[tokio::test]
async fn test_translateBatch_withFailingPrimary_shouldUseFallbackBackend() {
    init_logging();
    let primary = MockBackend::failing();
    let secondary = MockBackend::working().with_tag("FB");
    let coordinator = coordinator(&primary, 10).with_fallback_backend(Arc::new(secondary.clone()));
    let input = fragments("page-1", &["逃げろ", "", "待って"]);

    let results = coordinator
        .translate_batch(&input, "ja", &TranslationContext::new(), BatchScope::pages(1))
        .await;

    assert_eq!(results[0].translated_text, "[FB] 逃げろ");
    assert_eq!(results[1].outcome, ResultOutcome::Empty);
    assert_eq!(results[2].translated_text, "[FB] 待って");
    assert_eq!(results[0].outcome, ResultOutcome::Translated);
    assert_eq!(coordinator.stats().last_strategy, Some(Strategy::Fallback));
    assert_eq!(coordinator.stats().passthrough, 0);

    // Mega-batch plus two per-item calls on the primary, one batch on the secondary
    assert_eq!(primary.request_count(), 3);
    assert_eq!(secondary.request_count(), 1);
}

#[tokio::test]
async fn test_translateBatch_withBothBackendsFailing_shouldPassThrough() {
    let coordinator = coordinator(&MockBackend::failing(), 10).with_fallback_backend(Arc::new(MockBackend::failing()));
    let input = fragments("page-1", &["助けて"]);

    let results = coordinator
        .translate_batch(&input, "ja", &TranslationContext::new(), BatchScope::pages(1))
        .await;

    assert_eq!(results[0].outcome, ResultOutcome::Passthrough);
    assert_eq!(results[0].translated_text, "助けて");
}

#[tokio::test]
async fn test_translateBatch_withReorderedAndWrappedResponse_shouldPlaceEachLine() {
    let backend = MockBackend::scripted("3. Third\n1. First line\nwrapped onto two\n2. Second");
    let coordinator = coordinator(&backend, 10);
    let input = fragments("page-1", &["一", "二", "三"]);

    let results = coordinator
        .translate_batch(&input, "ja", &TranslationContext::new(), BatchScope::pages(1))
        .await;

    let texts: Vec<&str> = results.iter().map(|r| r.translated_text.as_str()).collect();
    assert_eq!(texts, vec!["First line wrapped onto two", "Second", "Third"]);
    assert!(results.iter().all(|r| r.outcome == ResultOutcome::Translated));
    assert_eq!(backend.request_count(), 1);
}

#[tokio::test]
async fn test_translateBatch_withWrappedLineAndMissingNumber_shouldRetryOnlyTheGap() {
    let backend = MockBackend::scripted("1. First\nstill first\n3. Third");
    let coordinator = coordinator(&backend, 10);
    let input = fragments("page-1", &["一", "二", "三"]);

    let results = coordinator
        .translate_batch(&input, "ja", &TranslationContext::new(), BatchScope::pages(1))
        .await;

    assert_eq!(results[0].translated_text, "First still first");
    assert_eq!(results[1].translated_text, backend.translate_text("二"));
    assert_eq!(results[2].translated_text, "Third");

    let sizes: Vec<usize> = backend.calls().iter().map(|c| c.item_count).collect();
    assert_eq!(sizes, vec![3, 1]);
    assert_eq!(coordinator.stats().last_strategy, Some(Strategy::PerItem));
}

#[tokio::test]
async fn test_translateBatch_withSentenceMarksInsideOneLine_shouldNotSpreadAcrossFragments() {
    let backend = MockBackend::scripted("それは。これは。");
    let coordinator = coordinator(&backend, 10);
    let input = fragments("page-1", &["甲", "乙"]);

    let results = coordinator
        .translate_batch(&input, "ja", &TranslationContext::new(), BatchScope::pages(1))
        .await;

    assert_eq!(results[0].translated_text, "それは。これは。");
    assert_eq!(results[1].translated_text, backend.translate_text("乙"));
    assert_ne!(results[1].translated_text, "これは。");
}

#[tokio::test]
async fn test_translateBatch_withNoisyPunctuation_shouldStoreCleanedText() {
    let backend = MockBackend::scripted("1. Wait!!\n2. Well...   fine");
    let coordinator = coordinator(&backend, 10);
    let input = fragments("page-1", &["待て", "まあ"]);
    let context = TranslationContext::new();

    let results = coordinator.translate_batch(&input, "ja", &context, BatchScope::pages(1)).await;
    assert_eq!(results[0].translated_text, "Wait!");
    assert_eq!(results[1].translated_text, "Well\u{2026} fine");

    let cached = coordinator.translate_batch(&input, "ja", &context, BatchScope::pages(1)).await;
    assert_eq!(cached[1].translated_text, "Well\u{2026} fine");
    assert_eq!(cached[1].outcome, ResultOutcome::Cached);
}
