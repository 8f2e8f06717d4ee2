use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::powerview::HubError;

/// Status codes used in integration API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 200,
    BadRequest = 400,
    NotFound = 404,
    ServerError = 500,
    NotImplemented = 501,
    ServiceUnavailable = 503,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.as_u16())
    }
}

/// Failure of an entity command
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommandError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CommandError::NotFound(_) => StatusCode::NotFound,
            CommandError::BadRequest(_) => StatusCode::BadRequest,
            CommandError::NotImplemented(_) => StatusCode::NotImplemented,
            CommandError::ServiceUnavailable(_) => StatusCode::ServiceUnavailable,
            CommandError::Internal(_) => StatusCode::ServerError,
        }
    }

    /// Log at a level matching the severity and return the response code
    pub fn into_status(self) -> StatusCode {
        match &self {
            CommandError::Internal(_) => tracing::error!(error = %self, "command failed"),
            CommandError::ServiceUnavailable(_) => tracing::warn!(error = %self, "hub unavailable"),
            _ => tracing::debug!(error = %self, "command rejected"),
        }
        self.status_code()
    }
}

impl From<HubError> for CommandError {
    fn from(error: HubError) -> Self {
        match error {
            HubError::NotFound { .. } => CommandError::NotFound(error.to_string()),
            HubError::NotConnected | HubError::Request(_) | HubError::Status { .. } => {
                CommandError::ServiceUnavailable(error.to_string())
            }
            HubError::Decode(_) => CommandError::Internal(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            CommandError::NotFound("test".to_string()).status_code(),
            StatusCode::NotFound
        );
        assert_eq!(
            CommandError::BadRequest("test".to_string()).status_code(),
            StatusCode::BadRequest
        );
        assert_eq!(
            CommandError::NotImplemented("test".to_string()).status_code(),
            StatusCode::NotImplemented
        );
        assert_eq!(
            CommandError::Internal("test".to_string()).into_status(),
            StatusCode::ServerError
        );
    }

    #[test]
    fn test_hub_error_conversion() {
        let err: CommandError = HubError::NotFound {
            kind: "shade",
            id: "12".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::NotFound);

        let err: CommandError = HubError::NotConnected.into();
        assert_eq!(err.status_code(), StatusCode::ServiceUnavailable);
    }

    #[test]
    fn test_status_code_serializes_as_number() {
        assert_eq!(serde_json::to_string(&StatusCode::NotFound).unwrap(), "404");
    }

    #[test]
    fn test_error_display() {
        let error = CommandError::NotFound("cover.hub.1".to_string());
        assert_eq!(error.to_string(), "Not found: cover.hub.1");
    }
}
