use thiserror::Error;

/// Failures surfaced by the ledger, the market-data providers and the
/// analysis pipeline.
///
/// `Clone` so one in-flight cache computation can hand the same failure to
/// every caller waiting on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Ledger node unreachable or the websocket handshake failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The node answered, but with an RPC error (e.g. `actNotFound`).
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// A third-party HTTP call failed or returned a non-success status.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The caller supplied an identifier that fails validation.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl AnalysisError {
    /// Whether this failure should reject the request instead of being
    /// absorbed into a null field.
    pub fn is_request_rejection(&self) -> bool {
        matches!(self, AnalysisError::MalformedInput(_))
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
