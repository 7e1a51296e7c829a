use axum::http::StatusCode;
use std::fmt;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "authentication required".to_string(),
        }
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err)
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}

/// Startup configuration problems. Any of these aborts the process.
#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidVar { name: &'static str, value: String },
    PartnersFile { path: String, reason: String },
    InvalidPartners(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVar(name) => write!(f, "missing required environment variable {name}"),
            Self::InvalidVar { name, value } => write!(f, "invalid value for {name}: {value:?}"),
            Self::PartnersFile { path, reason } => {
                write!(f, "failed to load partner file {path}: {reason}")
            }
            Self::InvalidPartners(reason) => write!(f, "invalid partner configuration: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Why a single metric fetch produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Auth,
    Timeout,
    Status(u16),
    Transport(String),
    Malformed(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth => f.write_str("metabase authentication failed"),
            Self::Timeout => f.write_str("metabase request timed out"),
            Self::Status(code) => write!(f, "metabase returned status {code}"),
            Self::Transport(reason) => write!(f, "metabase request failed: {reason}"),
            Self::Malformed(reason) => write!(f, "unexpected metabase response: {reason}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
