// Custom error types for better error handling and debugging
//
// Using thiserror for ergonomic error definitions. Collaborator errors are
// always recoverable at the call site (the stage degrades); JobError is the
// unrecoverable class caught at the job's outer boundary.

use thiserror::Error;

/// AI analysis / dedup collaborator errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("API request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("all {key_count} API keys exhausted after {attempts} attempts")]
    AllKeysFailed { key_count: usize, attempts: usize },

    #[error("invalid response format: {0}")]
    InvalidResponse(String),

    #[error("collaborator circuit is open, failing fast")]
    CircuitOpen,

    #[error("rate limit exceeded (retry after {0}s)")]
    RateLimited(u64),
}

/// Object storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("storage returned status {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },
}

/// VIN decode collaborator errors
#[derive(Debug, Error)]
pub enum VinDecodeError {
    #[error("decode request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("invalid decode response: {0}")]
    InvalidResponse(String),
}

/// Unrecoverable job errors, caught at the job's outer boundary
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job has no images")]
    NoImages,

    #[error("a job with id {0} already exists")]
    DuplicateJob(String),

    #[error("upload failed for image {index} ({name}): {source}")]
    UploadFailed {
        index: usize,
        name: String,
        #[source]
        source: StorageError,
    },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("environment variable parsing failed: {0}")]
    EnvVarError(String),
}

// Convenience type aliases for Results
pub type AnalysisResult<T> = Result<T, AnalysisError>;
pub type StorageResult<T> = Result<T, StorageError>;
pub type VinDecodeResult<T> = Result<T, VinDecodeError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
