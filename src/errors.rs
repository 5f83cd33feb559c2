/*!
 * Error types for the mangatl library.
 *
 * Library components report failures through these thiserror enums. The
 * translation coordinator never surfaces runtime failures to callers; these
 * types only travel between the backend, the credential store and the
 * pipeline, where they drive fallback and quarantine decisions.
 */

use thiserror::Error;

/// Errors that can occur when calling a translation backend
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The credential's quota is spent
    #[error("Quota exhausted: {0}")]
    QuotaExceeded(String),

    /// The call did not finish in time
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// No credential was available to back the call
    #[error("No usable credential available")]
    NoCredential,
}

impl ProviderError {
    /// Map an HTTP status and body to the matching error variant
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }

    /// Whether the failure is attributable to the credential that backed the call.
    ///
    /// Such failures quarantine the credential; everything else is treated as a
    /// transient backend failure.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationError(_) | Self::RateLimitExceeded(_) | Self::QuotaExceeded(_)
        )
    }
}

/// Errors raised by the persisted credential store
#[derive(Error, Debug)]
pub enum CredentialError {
    /// Reading or writing the credential file failed
    #[error("Credential file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The credential file is not valid JSON
    #[error("Credential file is malformed: {0}")]
    Parse(#[from] serde_json::Error),

    /// No credential carries the given display name
    #[error("No credential named '{0}'")]
    NotFound(String),

    /// A credential with this display name already exists
    #[error("A credential named '{0}' already exists")]
    Duplicate(String),
}

/// Errors surfaced by the image pipeline.
///
/// Only `InvalidInput` is ever returned from a whole run; the other variants
/// are recorded per image so sibling images keep going.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Caller contract violation (missing image, malformed fragment list)
    #[error("Invalid pipeline input: {0}")]
    InvalidInput(String),

    /// Bubble detection failed for an image
    #[error("Bubble detection failed: {0}")]
    Detection(String),

    /// Text extraction failed for a region
    #[error("Text extraction failed: {0}")]
    Extraction(String),

    /// Painting the translated text failed
    #[error("Compositing failed: {0}")]
    Compositing(String),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the credential store
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Error from the pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
