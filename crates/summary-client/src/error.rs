use analysis_core::AnalysisError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Summaries disabled: no API key configured")]
    Disabled,
}

pub type SummaryResult<T> = Result<T, SummaryError>;

impl From<SummaryError> for AnalysisError {
    fn from(e: SummaryError) -> Self {
        AnalysisError::Upstream(e.to_string())
    }
}
