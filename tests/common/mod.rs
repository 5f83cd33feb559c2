/*!
 * Common test utilities for the mangatl test suite
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use mangatl::translation::{CoordinatorOptions, FragmentOrigin, TranslationContext, TranslationFragment};

// Re-export the in-memory pipeline collaborators
pub mod fake_pages;

/// Route library logs through env_logger; repeated calls are harmless
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Fragments for `texts` on one page, default context
pub fn fragments(image_id: &str, texts: &[&str]) -> Vec<TranslationFragment> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| TranslationFragment::new(*text, TranslationContext::new(), FragmentOrigin::new(image_id, i)))
        .collect()
}

/// Coordinator options with short timeouts and no retries
pub fn fast_options(sub_batch_size: usize) -> CoordinatorOptions {
    CoordinatorOptions {
        target_language: "en".to_string(),
        call_timeout: Duration::from_millis(500),
        retry_count: 0,
        retry_backoff: Duration::from_millis(1),
        sub_batch_size,
        custom_prompt: None,
    }
}

/// An OCR dump with one bubble per text, stacked top to bottom
pub fn dump_json(width: u32, height: u32, texts: &[&str]) -> String {
    let bubbles: Vec<String> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let top = 20 + i * 120;
            format!(
                r#"{{"x1": 20, "y1": {}, "x2": 220, "y2": {}, "text": {}}}"#,
                top,
                top + 100,
                serde_json::to_string(text).unwrap()
            )
        })
        .collect();
    format!(
        r#"{{"width": {}, "height": {}, "bubbles": [{}]}}"#,
        width,
        height,
        bubbles.join(", ")
    )
}
