use thiserror::Error;

/// Result type alias for storefront operations
pub type Result<T> = std::result::Result<T, StorefrontError>;

/// Result type alias for persisted store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by the persisted store backends
#[derive(Error, Debug)]
pub enum StoreError {
    /// HTTP transport errors talking to the hosted backend
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Hosted backend answered with an unexpected status
    #[error("Backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    /// Hosted backend rules refused the operation
    #[error("Permission denied for '{path}'")]
    PermissionDenied { path: String },

    /// Local storage budget exhausted
    #[error("Storage quota exceeded: {used} bytes used, {quota} allowed")]
    QuotaExceeded { used: usize, quota: usize },

    /// Optimistic transaction never managed to commit
    #[error("Transaction on '{path}' aborted after {attempts} conflicting attempts")]
    Contention { path: String, attempts: u32 },

    /// Operation not offered by this backend
    #[error("Operation '{operation}' is not supported by the {backend} backend")]
    Unsupported {
        operation: &'static str,
        backend: &'static str,
    },

    /// Malformed store path
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Value (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local file persistence errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Create a new invalid path error
    pub fn invalid_path<P: ToString, R: ToString>(path: P, reason: R) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Check if the error is transient and the local backend may stand in
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Backend { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Domain errors surfaced to callers of the repository, ledger and facade
#[derive(Error, Debug)]
pub enum StorefrontError {
    /// Persisted store failures
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Input rejected before anything was persisted
    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    /// Anti-spam interval not yet elapsed
    #[error("Submitting too fast, retry in {retry_after_ms}ms")]
    RateLimited { retry_after_ms: i64 },

    /// Session lacks the privilege for the action
    #[error("Not authorized to {action}")]
    NotAuthorized { action: &'static str },

    /// Comment lookup failed
    #[error("Comment '{comment_id}' not found in entry '{entry_id}'")]
    CommentNotFound { entry_id: String, comment_id: String },

    /// Stored record could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorefrontError {
    /// Create a new validation error
    pub fn validation<T: ToString>(reason: T) -> Self {
        Self::Validation {
            reason: reason.to_string(),
        }
    }

    /// Create a new config error
    pub fn config_error<T: ToString>(message: T) -> Self {
        Self::Config(message.to_string())
    }

    /// Short message suitable for a transient, dismissible notice
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { reason } => reason.clone(),
            Self::RateLimited { retry_after_ms } => {
                let seconds = (retry_after_ms + 999) / 1000;
                format!("Please wait {seconds}s before commenting again")
            }
            Self::NotAuthorized { .. } => "Only administrators can do that".to_string(),
            Self::CommentNotFound { .. } => "That comment no longer exists".to_string(),
            Self::Store(e) if e.is_recoverable() => {
                "Connection problem, please try again".to_string()
            }
            _ => "Something went wrong".to_string(),
        }
    }
}
