use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("request to {endpoint} failed with status {status}")]
    Status { endpoint: String, status: u16 },
    #[error("{0}")]
    Config(String),
    #[error("enrichment worker is no longer running")]
    WorkerStopped,
}

impl AppError {
    /// Transport failures and non-success responses, i.e. the errors a page
    /// fetch surfaces as retryable.
    pub fn is_network(&self) -> bool {
        matches!(self, AppError::Http(_) | AppError::Status { .. })
    }
}
