//! Error types for Wayfinder
//!
//! `DiscoveryError` is the single taxonomy shared by the registry, the
//! reference tracker, the backends, and the bridges.

/// Discovery error kinds
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// `publish` on a record that already carries a registration id
    #[error("record already registered with id '{0}'")]
    AlreadyRegistered(String),

    #[error("record '{0}' not found")]
    NotFound(String),

    /// `update` (or a reference request) on a record that was never published
    #[error("no registration id in the record")]
    MissingRegistrationId,

    #[error("unsupported service type '{0}'")]
    UnsupportedType(String),

    /// Backend-level id collision on create
    #[error("duplicate registration id '{0}'")]
    DuplicateId(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("service object construction failed: {0}")]
    ServiceConstruction(String),

    /// External catalog could not be fetched
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl DiscoveryError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_) | Self::SourceUnavailable(_) | Self::Timeout(_) | Self::Io(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for DiscoveryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

impl From<std::io::Error> for DiscoveryError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

/// Result type for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;
