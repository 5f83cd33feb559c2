/*!
 * Translation of extracted bubble text.
 *
 * This module turns the fragments of a run into translations with as few
 * backend calls as possible. It is split into several submodules:
 *
 * - `coordinator`: Mega-batch translation with the degrade chain
 * - `analysis`: Tone and register hints read from the source texts
 * - `cache`: Memoization of translations
 * - `context`: Per-fragment translation hints
 * - `prompts`: Prompt builders for batch and single calls
 * - `parser`: Recovery of translations from raw responses
 * - `phrases`: Stock phrases seeded into the cache
 */

// Re-export main types for easier usage
pub use self::cache::{CacheKey, TranslationCache};
pub use self::context::{BatchScope, Formality, SpeakerGender, TranslationContext};
pub use self::coordinator::{
    BatchTranslationCoordinator, CoordinatorOptions, CoordinatorStats, FragmentOrigin, ResultOutcome,
    Strategy, StrategyOutcome, TranslationFragment, TranslationResult,
};
pub use self::parser::ParsedBatch;
pub use self::prompts::PromptBuilder;

// Submodules
pub mod analysis;
pub mod cache;
pub mod context;
pub mod coordinator;
pub mod parser;
pub mod phrases;
pub mod prompts;
