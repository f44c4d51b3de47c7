use crate::application::lending::LendingError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::types::ErrorResponse;

/// API層のエラー型
///
/// アプリケーション層のエラーをラップし、HTTPレスポンスへのマッピングを提供する。
#[derive(Debug)]
pub struct ApiError(LendingError);

impl From<LendingError> for ApiError {
    fn from(err: LendingError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            // 404 Not Found - リクエストされたリソースが存在しない
            LendingError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),

            // 409 Conflict - 資料・待ち行列の現在の状態と衝突
            LendingError::AlreadyOnLoan => (StatusCode::CONFLICT, "ALREADY_ON_LOAN"),
            LendingError::QueueViolation => (StatusCode::CONFLICT, "QUEUE_VIOLATION"),
            LendingError::AlreadyReserved => (StatusCode::CONFLICT, "ALREADY_RESERVED"),
            LendingError::DuplicateCatalogNumber(_) => {
                (StatusCode::CONFLICT, "DUPLICATE_CATALOG_NUMBER")
            }
            LendingError::ItemOnLoan => (StatusCode::CONFLICT, "ITEM_ON_LOAN"),

            // 422 Unprocessable Entity - ビジネスルール違反
            LendingError::NotEligible => (StatusCode::UNPROCESSABLE_ENTITY, "NOT_ELIGIBLE"),
            LendingError::LimitExceeded { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "LIMIT_EXCEEDED")
            }
            LendingError::InvalidTransition(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_TRANSITION")
            }
            LendingError::TooEarly { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "TOO_EARLY"),
            LendingError::Overdue { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "OVERDUE"),
            LendingError::ItemAvailable => (StatusCode::UNPROCESSABLE_ENTITY, "ITEM_AVAILABLE"),

            // 503 Service Unavailable - 競合が続いた。時間をおいて再試行できる
            LendingError::Busy { .. } => (StatusCode::SERVICE_UNAVAILABLE, "BUSY"),

            // 500 Internal Server Error - システム障害
            LendingError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_code();

        // 内部エラーの詳細はログに記録し、クライアントには一般的なメッセージのみを返す
        let message = match &self.0 {
            LendingError::Store(e) => {
                tracing::error!(error = ?e, "Store error");
                "An unexpected error occurred".to_string()
            }
            LendingError::Busy { attempts } => {
                tracing::warn!(attempts, "Request abandoned after contention");
                self.0.to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ErrorResponse::new(error_type, message));
        (status, body).into_response()
    }
}
