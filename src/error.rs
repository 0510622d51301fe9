use axum::http::StatusCode;
use thiserror::Error;

use crate::days::model::ScanType;

/// Failure of a day store operation. Every variant is recoverable: the
/// caller shows the message and may retry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("The analysis is taking too long. Please try again.")]
    Timeout,

    #[error("No day loaded")]
    NoCurrentRecord,

    #[error("Day was modified concurrently, please retry")]
    Conflict,

    #[error("No image available for {0} scan")]
    MissingImage(ScanType),

    #[error("{0}")]
    InvalidInput(String),
}

impl StoreError {
    pub fn remote(e: impl std::fmt::Display) -> Self {
        StoreError::RemoteUnavailable(e.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            StoreError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            StoreError::RemoteUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            StoreError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            StoreError::NoCurrentRecord | StoreError::Conflict => StatusCode::CONFLICT,
            StoreError::MissingImage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<StoreError> for (StatusCode, String) {
    fn from(e: StoreError) -> Self {
        (e.status(), e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_conditions_to_http_status() {
        assert_eq!(StoreError::NotAuthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(StoreError::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            StoreError::remote("connection refused").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let (status, msg): (StatusCode, String) = StoreError::MissingImage(ScanType::Back).into();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(msg, "No image available for back scan");
    }
}
