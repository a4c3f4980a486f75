use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::LedgerError;

/// Everything a handler can fail with.
#[derive(Debug)]
pub enum ApiError {
    Ledger(LedgerError),
    BadRequest(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Status and machine-readable code for an engine failure.
pub fn status_for(err: &LedgerError) -> (StatusCode, &'static str) {
    match err {
        LedgerError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "invalid_amount"),
        LedgerError::InvalidAccountId(_) => (StatusCode::BAD_REQUEST, "invalid_account_id"),
        LedgerError::SameAccount(_) => (StatusCode::BAD_REQUEST, "same_account"),
        LedgerError::InsufficientBalance { .. } => {
            (StatusCode::BAD_REQUEST, "insufficient_balance")
        }
        LedgerError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        LedgerError::StorageUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable")
        }
        LedgerError::InvariantViolation(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "invariant_violation")
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Ledger(err) => {
                let (status, code) = status_for(&err);
                if status.is_server_error() {
                    tracing::error!(error = %err, code, "request failed");
                } else {
                    tracing::debug!(error = %err, code, "request rejected");
                }
                json_error(status, code, err.to_string())
            }
            ApiError::BadRequest(message) => {
                json_error(StatusCode::BAD_REQUEST, "bad_request", message)
            }
        }
    }
}

fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let insufficient = LedgerError::InsufficientBalance {
            account_id: 1,
            balance: 0,
            required: 5,
        };
        assert_eq!(status_for(&insufficient).0, StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&LedgerError::Conflict("busy".into())).0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&LedgerError::StorageUnavailable("io".into())).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&LedgerError::InvariantViolation("negative".into())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
