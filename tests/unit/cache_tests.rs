/*!
 * Tests for translation cache functionality
 */

use mangatl::translation::{CacheKey, Formality, SpeakerGender, TranslationCache, TranslationContext};

use crate::common::create_temp_dir;

fn key(text: &str, context: &TranslationContext) -> CacheKey {
    CacheKey::derive(text, "ja", context)
}

#[test]
fn test_cache_store_withEnabledCache_shouldReturnTranslation() {
    let cache = TranslationCache::new(true, 100);
    let context = TranslationContext::new();
    cache.store(key("こんにちは", &context), "Hello");

    assert_eq!(cache.get(&key("こんにちは", &context)), Some("Hello".to_string()));
    assert_eq!(cache.get(&key("さようなら", &context)), None);
}

#[test]
fn test_cache_store_withDisabledCache_shouldReturnNone() {
    let cache = TranslationCache::new(false, 100);
    let context = TranslationContext::new();
    cache.store(key("こんにちは", &context), "Hello");
    assert!(cache.get(&key("こんにちは", &context)).is_none());
}

#[test]
fn test_cacheKey_withSurroundingWhitespace_shouldMatch() {
    let context = TranslationContext::new();
    assert_eq!(key("  Hello ", &context), key("hello", &context));
}

#[test]
fn test_cacheKey_withDifferentContext_shouldDiffer() {
    let base = TranslationContext::new();
    let variants = [
        TranslationContext::new().with_formality(Formality::Formal),
        TranslationContext::new().with_gender(SpeakerGender::Female),
        TranslationContext::new().with_relationship("siblings"),
        TranslationContext::new().sfx(true),
        TranslationContext::new().thought(true),
    ];
    for variant in &variants {
        assert_ne!(key("行こう", &base), key("行こう", variant));
    }
}

#[test]
fn test_cacheKey_withOnlyEmotionChanged_shouldMatch() {
    let calm = TranslationContext::new();
    let angry = TranslationContext::new().with_emotion("angry");
    assert_eq!(key("行こう", &calm), key("行こう", &angry));
}

#[test]
fn test_cache_withCapacity_shouldEvictOldestEntry() {
    let cache = TranslationCache::new(true, 2);
    let context = TranslationContext::new();
    cache.store(key("一", &context), "one");
    cache.store(key("二", &context), "two");
    cache.store(key("三", &context), "three");

    assert_eq!(cache.len(), 2);
    assert!(cache.get(&key("一", &context)).is_none());
    assert_eq!(cache.get(&key("三", &context)), Some("three".to_string()));
}

#[test]
fn test_cache_saveAndLoad_shouldRestoreEntries() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("cache.json");
    let context = TranslationContext::new().with_formality(Formality::Polite);

    let cache = TranslationCache::new(true, 100);
    cache.store(key("ありがとう", &context), "Thank you");
    cache.save_to(&path, "en").unwrap();

    let restored = TranslationCache::new(true, 100);
    assert_eq!(restored.load_from(&path, "en").unwrap(), 1);
    assert_eq!(restored.get(&key("ありがとう", &context)), Some("Thank you".to_string()));
}

#[test]
fn test_cache_load_withOtherTargetLanguage_shouldIgnoreFile() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("cache.json");
    let context = TranslationContext::new();

    let cache = TranslationCache::new(true, 100);
    cache.store(key("ありがとう", &context), "Thank you");
    cache.save_to(&path, "en").unwrap();

    let restored = TranslationCache::new(true, 100);
    assert_eq!(restored.load_from(&path, "fr").unwrap(), 0);
    assert!(restored.is_empty());
}

#[test]
fn test_cache_load_withMissingFile_shouldLoadNothing() {
    let dir = create_temp_dir().unwrap();
    let cache = TranslationCache::new(true, 100);
    assert_eq!(cache.load_from(&dir.path().join("absent.json"), "en").unwrap(), 0);
}
