//! Centralized API error handling
//!
//! Maps every domain and boundary failure to an HTTP status code plus a
//! stable code string, wrapped in the shared [`ApiResponse`] envelope.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::loan::LoanError;
use crate::models::ApiResponse;

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Loan(#[from] LoanError),

    #[error("Invalid loan ID format")]
    InvalidId,

    #[error("Invalid JSON request body: {0}")]
    InvalidJson(String),

    #[error("Invalid form: {0}")]
    InvalidForm(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    #[error("Failed to save file: {0}")]
    StorageError(String),
}

impl ApiError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Loan(err) => match err {
                LoanError::LoanNotFound
                | LoanError::ApprovalNotFound
                | LoanError::DisbursementNotFound => "NOT_FOUND",
                LoanError::InvalidStateTransition => "INVALID_STATE_TRANSITION",
                LoanError::InvestmentExceedsLimit => "INVESTMENT_EXCEEDS_LIMIT",
                LoanError::LoanNotApproved => "LOAN_NOT_APPROVED",
                LoanError::LoanNotInvested => "LOAN_NOT_INVESTED",
                LoanError::LoanAlreadyApproved => "LOAN_ALREADY_APPROVED",
                LoanError::LoanAlreadyDisbursed => "LOAN_ALREADY_DISBURSED",
                LoanError::InvalidAmount => "INVALID_AMOUNT",
                LoanError::Validation(_) => "VALIDATION_ERROR",
                LoanError::Storage(_) => "DATABASE_ERROR",
            },
            ApiError::InvalidId => "INVALID_ID",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::InvalidForm(_) => "INVALID_FORM",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::StorageError(_) => "STORAGE_ERROR",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Loan(err) => match err {
                e if e.is_state_guard() => StatusCode::UNPROCESSABLE_ENTITY,
                e if e.is_not_found() => StatusCode::NOT_FOUND,
                LoanError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },
            ApiError::InvalidId
            | ApiError::InvalidJson(_)
            | ApiError::InvalidForm(_)
            | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client; server-side details stay in the logs
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Loan(LoanError::LoanNotFound) => "Loan not found".to_string(),
            ApiError::Loan(LoanError::InvalidAmount) => {
                "Amount must be greater than zero".to_string()
            }
            ApiError::Loan(LoanError::Storage(_)) => "An internal error occurred".to_string(),
            ApiError::StorageError(_) => "Failed to save file".to_string(),
            other => capitalize(&other.to_string()),
        }
    }
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        // Log server errors
        if status.is_server_error() {
            tracing::error!(error = %message, code = %error_code, "Server error occurred");
        } else {
            tracing::debug!(error = %message, code = %error_code, "Client error occurred");
        }

        let body = ApiResponse::<()>::failure(error_code, self.public_message());

        (status, Json(body)).into_response()
    }
}

// Convenience conversions from common error types

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = err
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        messages.sort();
        ApiError::ValidationError(messages.join(", "))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::InvalidJson(err.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(err: MultipartRejection) -> Self {
        ApiError::InvalidForm(err.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        ApiError::ValidationError(err.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.to_string())
        } else {
            ApiError::InvalidForm(err.to_string())
        }
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[test]
    fn test_error_codes() {
        assert_eq!(ApiError::from(LoanError::LoanNotFound).error_code(), "NOT_FOUND");
        assert_eq!(
            ApiError::from(LoanError::InvestmentExceedsLimit).error_code(),
            "INVESTMENT_EXCEEDS_LIMIT"
        );
        assert_eq!(
            ApiError::from(LoanError::LoanAlreadyApproved).error_code(),
            "LOAN_ALREADY_APPROVED"
        );
        assert_eq!(ApiError::from(LoanError::InvalidAmount).error_code(), "INVALID_AMOUNT");
        assert_eq!(ApiError::InvalidId.error_code(), "INVALID_ID");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::from(LoanError::DisbursementNotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        for guard in [
            LoanError::InvalidStateTransition,
            LoanError::InvestmentExceedsLimit,
            LoanError::LoanNotApproved,
            LoanError::LoanNotInvested,
            LoanError::LoanAlreadyApproved,
            LoanError::LoanAlreadyDisbursed,
        ] {
            assert_eq!(
                ApiError::from(guard).status_code(),
                StatusCode::UNPROCESSABLE_ENTITY
            );
        }
        assert_eq!(
            ApiError::from(LoanError::Validation("x".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(LoanError::Storage(StoreError::Unavailable("down".into())))
                .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_every_guard_maps_to_unprocessable_entity() {
        let errors = [
            LoanError::LoanNotFound,
            LoanError::ApprovalNotFound,
            LoanError::DisbursementNotFound,
            LoanError::InvalidStateTransition,
            LoanError::InvestmentExceedsLimit,
            LoanError::LoanNotApproved,
            LoanError::LoanNotInvested,
            LoanError::LoanAlreadyApproved,
            LoanError::LoanAlreadyDisbursed,
            LoanError::InvalidAmount,
            LoanError::Validation("x".into()),
        ];
        for err in errors {
            let is_guard = err.is_state_guard();
            let status = ApiError::from(err).status_code();
            assert_eq!(is_guard, status == StatusCode::UNPROCESSABLE_ENTITY);
            assert!(status.is_client_error());
        }
    }

    #[test]
    fn test_payload_too_large_status() {
        let err = ApiError::PayloadTooLarge("limit exceeded".into());
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.error_code(), "PAYLOAD_TOO_LARGE");
    }

    #[test]
    fn test_storage_details_are_not_leaked() {
        let err = ApiError::from(LoanError::Storage(StoreError::Unavailable(
            "password authentication failed".into(),
        )));
        assert_eq!(err.public_message(), "An internal error occurred");
    }

    #[test]
    fn test_guard_messages_are_verbatim() {
        let err = ApiError::from(LoanError::LoanNotApproved);
        assert_eq!(
            err.public_message(),
            "Loan must be in approved state to accept investments"
        );
    }
}
