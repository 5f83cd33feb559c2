/*!
 * Tests for API key rotation, quotas and quarantine
 */

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use mangatl::errors::CredentialError;
use mangatl::key_rotation::{Credential, KeyRotationPolicy, RotationStrategy};
use mangatl::providers::mock::MockBackend;
use mangatl::translation::{BatchScope, BatchTranslationCoordinator, ResultOutcome, TranslationCache, TranslationContext};

use crate::common::{create_temp_dir, create_test_file, fast_options, fragments};

fn keys(limit: u32) -> Vec<Credential> {
    (1..=3)
        .map(|i| Credential::new(format!("secret-{}", i), format!("key{}", i)).with_daily_limit(limit))
        .collect()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

#[test]
fn test_acquire_withExhaustedQuotas_shouldReturnNone() {
    let policy = KeyRotationPolicy::new(keys(1), RotationStrategy::RoundRobin);

    let names: Vec<String> = (0..3)
        .map(|_| policy.acquire(true).unwrap().display_name)
        .collect();
    assert_eq!(names, vec!["key1", "key2", "key3"]);
    assert!(policy.acquire(true).is_none());
    assert!(!policy.has_available());
}

#[test]
fn test_acquire_afterQuarantine_shouldContinueWithNextKeyInOrder() {
    let policy = KeyRotationPolicy::new(keys(10), RotationStrategy::RoundRobin);
    assert_eq!(policy.acquire(true).unwrap().display_name, "key1");
    assert!(policy.quarantine("secret-1"));

    let names: Vec<String> = (0..3)
        .map(|_| policy.acquire(true).unwrap().display_name)
        .collect();
    assert_eq!(names, vec!["key2", "key3", "key2"]);
}

#[test]
fn test_acquire_withQuarantinedNextKey_shouldWrapToFirst() {
    let policy = KeyRotationPolicy::new(keys(10), RotationStrategy::RoundRobin);
    policy.acquire(true);
    policy.acquire(true);
    assert!(policy.quarantine("secret-3"));

    assert_eq!(policy.acquire(true).unwrap().display_name, "key1");
    assert_eq!(policy.acquire(true).unwrap().display_name, "key2");
}

#[test]
fn test_acquire_fromManyThreads_shouldNeverExceedDailyLimits() {
    let policy = Arc::new(KeyRotationPolicy::new(keys(5), RotationStrategy::RoundRobin));
    let handed_out = Mutex::new(Vec::new());

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                while let Some(credential) = policy.acquire(true) {
                    handed_out.lock().unwrap().push(credential);
                }
            });
        }
    });

    let handed_out = handed_out.into_inner().unwrap();
    assert_eq!(handed_out.len(), 15);
    for name in ["key1", "key2", "key3"] {
        let picks: Vec<&Credential> = handed_out.iter().filter(|c| c.display_name == name).collect();
        assert_eq!(picks.len(), 5, "{} handed out {} times", name, picks.len());

        // Each pick saw a distinct usage count, so no two threads shared one slot
        let mut counts: Vec<u32> = picks.iter().map(|c| c.usage_count).collect();
        counts.sort_unstable();
        assert_eq!(counts, vec![1, 2, 3, 4, 5]);
    }
    assert!(policy.status().iter().all(|s| s.usage_count == s.daily_limit));
    assert!(policy.acquire(true).is_none());
}

#[test]
fn test_acquire_withoutConsume_shouldLeaveUsageUntouched() {
    let policy = KeyRotationPolicy::new(keys(1), RotationStrategy::RoundRobin);
    for _ in 0..10 {
        assert!(policy.acquire(false).is_some());
    }
    assert!(policy.status().iter().all(|s| s.usage_count == 0));
}

#[test]
fn test_acquire_withNewDay_shouldResetCountersAndQuarantine() {
    let today = Arc::new(Mutex::new(date(1)));
    let clock_date = today.clone();
    let policy = KeyRotationPolicy::new(keys(1), RotationStrategy::RoundRobin)
        .with_clock(Arc::new(move || *clock_date.lock().unwrap()));

    while policy.acquire(true).is_some() {}
    assert!(policy.quarantine("secret-1"));

    *today.lock().unwrap() = date(2);
    assert!(policy.acquire(true).is_some());
    let status = policy.status();
    assert!(status.iter().all(|s| !s.quarantined));
    assert_eq!(status.iter().map(|s| s.usage_count).sum::<u32>(), 1);
}

#[test]
fn test_resetIfNewDay_withSameDay_shouldDoNothing() {
    let policy = KeyRotationPolicy::new(keys(1), RotationStrategy::RoundRobin).with_clock(Arc::new(|| date(5)));
    policy.acquire(true);
    assert!(!policy.reset_if_new_day(date(5)));
    assert!(!policy.reset_if_new_day(date(4)));
    assert!(policy.reset_if_new_day(date(6)));
    assert!(policy.status().iter().all(|s| s.usage_count == 0));
}

#[tokio::test]
async fn test_reprobeQuarantined_withAcceptedKey_shouldRelease() {
    let policy = KeyRotationPolicy::new(keys(10), RotationStrategy::RoundRobin);
    policy.quarantine("secret-2");
    assert!(policy.status()[1].quarantined);

    let backend = MockBackend::working().requiring_credential();
    assert_eq!(policy.reprobe_quarantined(&backend).await, 1);
    assert!(!policy.status()[1].quarantined);
}

#[tokio::test]
async fn test_reprobeQuarantined_withRejectedKey_shouldKeepQuarantine() {
    let policy = KeyRotationPolicy::new(keys(10), RotationStrategy::RoundRobin);
    policy.quarantine("secret-1");

    let backend = MockBackend::reject_key("secret-1");
    assert_eq!(policy.reprobe_quarantined(&backend).await, 0);
    assert!(policy.status()[0].quarantined);
}

#[tokio::test]
async fn test_coordinator_withRejectedKey_shouldQuarantineAndContinue() {
    let policy = Arc::new(KeyRotationPolicy::new(keys(10), RotationStrategy::RoundRobin));
    let backend = MockBackend::reject_key("secret-1");
    let mut options = fast_options(10);
    options.retry_count = 1;
    let coordinator =
        BatchTranslationCoordinator::new(Arc::new(backend.clone()), TranslationCache::new(true, 100), options)
            .with_key_rotation(policy.clone());

    let results = coordinator
        .translate_batch(&fragments("p", &["はい"]), "ja", &TranslationContext::new(), BatchScope::pages(1))
        .await;

    assert_eq!(results[0].outcome, ResultOutcome::Translated);
    assert!(policy.status()[0].quarantined);

    let used: Vec<Option<String>> = backend.calls().into_iter().map(|c| c.key_secret).collect();
    assert_eq!(used.len(), 2);
    assert_eq!(used[0].as_deref(), Some("secret-1"));
    assert_eq!(used[1].as_deref(), Some("secret-2"));
}

#[tokio::test]
async fn test_coordinator_withNoUsableKey_shouldPassThrough() {
    let policy = Arc::new(KeyRotationPolicy::new(
        vec![Credential::new("YOUR_GEMINI_API_KEY", "placeholder")],
        RotationStrategy::RoundRobin,
    ));
    let backend = MockBackend::working().requiring_credential();
    let coordinator =
        BatchTranslationCoordinator::new(Arc::new(backend.clone()), TranslationCache::new(true, 100), fast_options(10))
            .with_key_rotation(policy);

    let results = coordinator
        .translate_batch(&fragments("p", &["はい"]), "ja", &TranslationContext::new(), BatchScope::pages(1))
        .await;

    assert_eq!(results[0].outcome, ResultOutcome::Passthrough);
    assert_eq!(results[0].translated_text, "はい");
    assert_eq!(backend.request_count(), 0);
}

#[test]
fn test_load_withExistingFile_shouldPersistUsage() {
    let dir = create_temp_dir().unwrap();
    let path = create_test_file(
        dir.path(),
        "api_keys.json",
        r#"{"credentials": [
            {"key": "secret-a", "name": "first", "daily_limit": 5},
            {"key": "secret-b", "name": "second", "daily_limit": 5, "is_active": false}
        ]}"#,
    )
    .unwrap();

    let policy = KeyRotationPolicy::load(&path, RotationStrategy::LeastUsed).unwrap();
    assert_eq!(policy.strategy(), RotationStrategy::LeastUsed);
    assert_eq!(policy.acquire(true).unwrap().display_name, "first");

    let reloaded = KeyRotationPolicy::load(&path, RotationStrategy::RoundRobin).unwrap();
    let status = reloaded.status();
    assert_eq!(status[0].usage_count, 1);
    assert!(status[0].last_used.is_some());
    assert!(!status[1].is_active);
    // The strategy written by the first load wins over the default
    assert_eq!(reloaded.strategy(), RotationStrategy::LeastUsed);
}

#[test]
fn test_load_withMissingFile_shouldCreateDefaultStore() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("nested").join("api_keys.json");

    let policy = KeyRotationPolicy::load(&path, RotationStrategy::RoundRobin).unwrap();
    assert!(path.exists());
    assert_eq!(policy.len(), 1);
    assert_eq!(policy.status()[0].name, "Default Key");
}

#[test]
fn test_manageCredentials_shouldValidateNames() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("api_keys.json");
    std::fs::write(&path, r#"{"credentials": []}"#).unwrap();
    let policy = KeyRotationPolicy::load(&path, RotationStrategy::RoundRobin).unwrap();

    policy.add_credential("secret-x", "main", 100).unwrap();
    assert!(matches!(
        policy.add_credential("secret-y", "main", 100),
        Err(CredentialError::Duplicate(_))
    ));
    assert!(!policy.toggle_credential("main").unwrap());
    assert!(matches!(policy.remove_credential("other"), Err(CredentialError::NotFound(_))));

    let reloaded = KeyRotationPolicy::load(&path, RotationStrategy::RoundRobin).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert!(!reloaded.status()[0].is_active);

    reloaded.remove_credential("main").unwrap();
    assert!(reloaded.is_empty());
}
