use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body returned to API clients.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Gateway reference or authority for support reconciliation, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_reference: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    Unauthorized(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("No checkout session in progress")]
    NoActiveSession,

    #[error("Invalid or inactive discount code: {0}")]
    InvalidDiscountCode(String),

    #[error("Discount code {code} does not apply to the selected item")]
    DiscountScopeMismatch { code: String },

    #[error("A discount code has already been applied to this order")]
    DiscountAlreadyApplied,

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Payment gateway rejected the request: {0}")]
    GatewayRejected(String),

    #[error(
        "Payment was received but activating your purchase failed. \
         Contact support and quote payment reference {reference}"
    )]
    EntitlementGrantFailed { reference: String },

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) | ServiceError::NoActiveSession => StatusCode::NOT_FOUND,
            ServiceError::ValidationError(_)
            | ServiceError::InvalidOperation(_)
            | ServiceError::InvalidDiscountCode(_)
            | ServiceError::DiscountScopeMismatch { .. } => StatusCode::BAD_REQUEST,
            ServiceError::DiscountAlreadyApplied => StatusCode::CONFLICT,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::GatewayUnavailable(_) | ServiceError::GatewayRejected(_) => {
                StatusCode::BAD_GATEWAY
            }
            ServiceError::EntitlementGrantFailed { .. }
            | ServiceError::DatabaseError(_)
            | ServiceError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Gateway token carried by the error, if any, so support can reconcile.
    fn gateway_reference(&self) -> Option<String> {
        match self {
            ServiceError::EntitlementGrantFailed { reference } => Some(reference.clone()),
            _ => None,
        }
    }

    /// Gateway request errors are retryable without re-entering checkout data.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::GatewayUnavailable(_) | ServiceError::GatewayRejected(_)
        )
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(errors.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string(),
            message: self.to_string(),
            gateway_reference: self.gateway_reference(),
            timestamp: Utc::now().to_rfc3339(),
        };

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "request rejected");
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_failure_carries_reference() {
        let err = ServiceError::EntitlementGrantFailed {
            reference: "REF123".to_string(),
        };
        assert_eq!(err.gateway_reference().as_deref(), Some("REF123"));
        assert!(err.to_string().contains("REF123"));
    }

    #[test]
    fn gateway_errors_are_retryable() {
        assert!(ServiceError::GatewayUnavailable("timeout".into()).is_retryable());
        assert!(ServiceError::GatewayRejected("bad amount".into()).is_retryable());
        assert!(!ServiceError::NoActiveSession.is_retryable());
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            ServiceError::NoActiveSession.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::DiscountAlreadyApplied.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::GatewayUnavailable("down".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
