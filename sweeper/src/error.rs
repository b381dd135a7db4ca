use std::{fmt, time::Duration};

use derive_more::Display;
use reqwest::StatusCode;

use crate::email::DeletionOutcome;

pub type ApiResult<T> = Result<T, ApiError>;
pub type AuthResult<T> = Result<T, AuthError>;

/// Failures of the authorization step. All of them end the run.
#[derive(Debug)]
pub enum AuthError {
    ExchangeFailed(String),
    RefreshFailed(String),
    /// The callback arrived without a code; carries the provider's `error` value, if any.
    NoCodeInCallback(Option<String>),
    InvalidState,
    Timeout(Duration),
    ListenerFailed(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::ExchangeFailed(reason) => {
                write!(f, "cannot exchange authorization code: {reason}")
            }
            AuthError::RefreshFailed(reason) => {
                write!(f, "cannot refresh access token: {reason}")
            }
            AuthError::NoCodeInCallback(Some(error)) => {
                write!(f, "no code in callback (provider said: {error})")
            }
            AuthError::NoCodeInCallback(None) => write!(f, "no code in callback"),
            AuthError::InvalidState => write!(f, "callback state does not match the request"),
            AuthError::Timeout(after) => {
                write!(f, "no authorization callback received after {after:?}")
            }
            AuthError::ListenerFailed(reason) => {
                write!(f, "callback listener failed: {reason}")
            }
        }
    }
}

impl std::error::Error for AuthError {}

/// Failure of a single remote mailbox call.
#[derive(Debug, Display)]
pub enum ApiError {
    #[display("rate limit exceeded (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[display("unauthorized")]
    Unauthorized,
    #[display("{status}: {message}")]
    Status { status: StatusCode, message: String },
    #[display("network error: {_0}")]
    Network(reqwest::Error),
    #[display("unexpected response: {_0}")]
    Decode(String),
    #[display("{_0}")]
    Auth(AuthError),
}

impl std::error::Error for ApiError {}

/// Transport failures only; status codes are mapped from the response itself.
impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ApiError::Decode(error.to_string())
        } else {
            ApiError::Network(error)
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        ApiError::Auth(error)
    }
}

/// The harvest stops only when listing a page fails.
#[derive(Debug, Display)]
pub enum FetchError {
    #[display("cannot list page {page} of messages: {source}")]
    ListFailed { page: usize, source: ApiError },
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::ListFailed { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, Display)]
pub enum DeletionError {
    #[display("some deletions failed: {_0}")]
    Partial(DeletionOutcome),
}

impl DeletionError {
    pub fn into_outcome(self) -> DeletionOutcome {
        match self {
            DeletionError::Partial(outcome) => outcome,
        }
    }
}

impl std::error::Error for DeletionError {}
