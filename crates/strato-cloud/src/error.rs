use thiserror::Error;

/// Failure taxonomy for cloud API calls.
///
/// `InvalidParameter` is the transient class: parameter validation that
/// fails because a dependent resource created moments ago is not yet
/// visible. Callers retry it a bounded number of times. `AlreadyExists`
/// only escapes from non-idempotent call sites; idempotent creation
/// operations fold it into [`crate::Creation::AlreadyExists`] instead.
/// Everything else is fatal to the invoking stage.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("cloud API error: {0}")]
    Api(String),
}

impl CloudError {
    /// Transient-retryable errors: worth another attempt after a fixed
    /// delay because the cause is read-after-write lag, not the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, CloudError::InvalidParameter(_))
    }
}

pub type CloudResult<T> = Result<T, CloudError>;
