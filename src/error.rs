//! Typed errors for the generation and checkpoint boundaries

use thiserror::Error;

/// Failure of one text-generation call. Carries enough to distinguish a
/// rate-limit condition (escalating backoff) from other transient failures.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("rate limited by provider: {0}")]
    RateLimited(String),
    #[error("response did not match the expected schema: {0}")]
    SchemaInvalid(String),
    #[error("http transport error: {0}")]
    Http(String),
    #[error("provider returned an empty completion")]
    Empty,
}

impl GenerationError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GenerationError::RateLimited(_))
    }
}

/// Checkpoint store failures. `NotFound` on resume is the one condition the
/// workflow treats as fatal to the caller: there is no safe default state to
/// resume from.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("no checkpoint recorded for thread '{0}'")]
    NotFound(String),
    #[error("checkpoint io: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint decode: {0}")]
    Decode(#[from] serde_json::Error),
}
