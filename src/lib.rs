/*!
 * # mangatl - comic speech-bubble translation
 *
 * A Rust library that translates the text inside comic and manga speech
 * bubbles and fits the translation back into each bubble.
 *
 * ## Features
 *
 * - One consolidated translation call for every bubble of a run of pages
 * - Graceful degradation: mega batch, then sub-batches, then single items,
 *   then the original text
 * - Response parsing that recovers from numbering, boilerplate and
 *   missing lines
 * - Translation cache keyed by text, language and speaker context
 * - API key rotation with daily quotas and quarantine of rejected keys
 * - Font-size search that fits any translation into a fixed bubble
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `pipeline`: Detection, extraction, batching and compositing of pages
 * - `text_normalizer`: Cleanup of raw OCR output
 * - `translation`: Batch translation services:
 *   - `translation::coordinator`: The degrade chain
 *   - `translation::cache`: Memoized translations
 *   - `translation::prompts` / `translation::parser`: Prompt and response text
 * - `key_rotation`: Credential selection, quotas and quarantine
 * - `layout`: Bubble text layout and render plans
 * - `providers`: Translation backends:
 *   - `providers::gemini`: Google Gemini client
 *   - `providers::mock`: Offline backend
 * - `file_utils`: File system operations
 * - `app_controller`: Main application controller
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod file_utils;
pub mod key_rotation;
pub mod language_utils;
pub mod layout;
pub mod pipeline;
pub mod providers;
pub mod text_normalizer;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{AppError, CredentialError, PipelineError, ProviderError};
pub use key_rotation::{Credential, KeyRotationPolicy, RotationStrategy};
pub use language_utils::{get_language_name, language_codes_match};
pub use layout::{BubbleLayoutEngine, LayoutFit, RenderPlan};
pub use pipeline::{BubbleRegion, MangaPipeline, Rect};
pub use text_normalizer::TextNormalizer;
pub use translation::{BatchTranslationCoordinator, TranslationCache, TranslationFragment, TranslationResult};
