//! Conversions from third-party error types.

use super::types::RelayError;

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::TimeoutError(err.to_string())
        } else if let Some(status) = err.status() {
            Self::api_error(status.as_u16(), err.to_string())
        } else {
            Self::HttpError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        Self::InternalError(format!("I/O error: {err}"))
    }
}
