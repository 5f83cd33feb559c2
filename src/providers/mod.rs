/*!
 * Translation backends.
 *
 * A backend turns one prompt into raw response text and is fallible as a
 * unit. The coordinator never inspects the wire format; it only sees text or
 * a `ProviderError`.
 *
 * - `gemini`: Google Gemini `generateContent` over HTTP
 * - `mock`: scriptable offline backend used by tests and dry runs
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ProviderError;
use crate::key_rotation::Credential;

/// Prompt used to check that a credential is accepted
pub const PROBE_PROMPT: &str = "Reply with the single word OK.";

/// Common trait for all translation backends
#[async_trait]
pub trait TranslationBackend: Send + Sync + Debug {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Whether calls need a credential from the rotation policy
    fn requires_credential(&self) -> bool {
        true
    }

    /// Send a prompt and return the raw response text
    ///
    /// # Arguments
    /// * `credential` - The credential backing this call, if the backend needs one
    /// * `prompt` - The complete prompt
    async fn call(&self, credential: Option<&Credential>, prompt: &str) -> Result<String, ProviderError>;

    /// Minimal request checking that the backend accepts a credential
    async fn probe(&self, credential: Option<&Credential>) -> Result<(), ProviderError> {
        self.call(credential, PROBE_PROMPT).await.map(|_| ())
    }
}

pub mod gemini;
pub mod mock;
