use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::error::AppError;

/// Wire shape of every HTTP error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    pub status: u16,
    pub code: &'static str,
}

pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let (error_type, code) = match err {
        AppError::Validation(_) => ("validation_error", "INVALID_REQUEST"),
        AppError::SelfConversation => ("validation_error", "SELF_CONVERSATION"),
        AppError::Unauthorized => ("authentication_error", "INVALID_CREDENTIALS"),
        AppError::NotAMember => ("authorization_error", "NOT_A_MEMBER"),
        AppError::NotFound => ("not_found_error", "NOT_FOUND"),
        AppError::Database(_) => ("server_error", "DATABASE_ERROR"),
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => {
            ("server_error", "INTERNAL_SERVER_ERROR")
        }
    };

    let body = ErrorResponse {
        error: error_type,
        message: err.to_string(),
        status: status.as_u16(),
        code,
    };

    (status, body)
}

pub fn into_response(err: AppError) -> impl IntoResponse {
    let (status, body) = map_error(&err);
    (status, Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        let (status, body) = map_error(&AppError::Validation("empty message".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "validation_error");
        assert!(body.message.contains("empty message"));
    }

    #[test]
    fn self_conversation_maps_to_400() {
        let (status, body) = map_error(&AppError::SelfConversation);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "SELF_CONVERSATION");
    }

    #[test]
    fn membership_violation_maps_to_403() {
        let (status, body) = map_error(&AppError::NotAMember);
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, "NOT_A_MEMBER");
    }

    #[test]
    fn missing_conversation_maps_to_404() {
        let (status, _) = map_error(&AppError::NotFound);
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn storage_failures_map_to_500_and_flag_retryability() {
        let err = AppError::Database(sqlx::Error::PoolTimedOut);
        let (status, body) = map_error(&err);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "DATABASE_ERROR");
        assert!(err.is_retryable());

        assert!(!AppError::NotAMember.is_retryable());
        assert!(!AppError::Validation("bad".into()).is_retryable());
    }
}
