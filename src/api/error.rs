//! HTTP mapping for [`EcommerceError`].
//!
//! Client errors carry their message; storage failures are logged and answered
//! with a generic body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::store::StoreError;
use crate::EcommerceError;

#[derive(Debug)]
pub struct ApiError(pub EcommerceError);

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

impl From<EcommerceError> for ApiError {
    fn from(e: EcommerceError) -> Self { Self(e) }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self { Self(EcommerceError::Storage(e)) }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EcommerceError::Validation { .. } | EcommerceError::InvalidQuantity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EcommerceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            EcommerceError::Forbidden => StatusCode::FORBIDDEN,
            EcommerceError::OrderNotFound => StatusCode::NOT_FOUND,
            EcommerceError::CartNotActive(_) | EcommerceError::InvalidTransition { .. } | EcommerceError::OrderChanged => {
                StatusCode::CONFLICT
            }
            EcommerceError::OrderNotPlaced(_) => StatusCode::SERVICE_UNAVAILABLE,
            EcommerceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self.0 {
            EcommerceError::Validation { field, reason } => {
                ErrorBody { error: format!("Invalid {field}: {reason}"), field: Some(field) }
            }
            EcommerceError::OrderNotPlaced(ref cause) => {
                tracing::warn!(error = %cause, "order creation failed");
                ErrorBody { error: "order could not be created, retry".into(), field: None }
            }
            EcommerceError::Storage(ref cause) => {
                tracing::error!(error = %cause, "request failed on storage");
                ErrorBody { error: "Internal server error".into(), field: None }
            }
            other => ErrorBody { error: other.to_string(), field: None },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::OrderStatus;

    fn status(err: EcommerceError) -> StatusCode { ApiError(err).into_response().status() }

    #[test]
    fn test_status_codes() {
        assert_eq!(status(EcommerceError::validation("notes", "too long")), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status(EcommerceError::InvalidQuantity(0)), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status(EcommerceError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status(EcommerceError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status(EcommerceError::OrderNotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status(EcommerceError::InvalidTransition { from: OrderStatus::Delivered, to: OrderStatus::Pending }),
            StatusCode::CONFLICT
        );
        assert_eq!(status(EcommerceError::OrderChanged), StatusCode::CONFLICT);
        assert_eq!(
            status(EcommerceError::OrderNotPlaced(StoreError::Timeout(std::time::Duration::from_secs(5)))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::from(StoreError::Unavailable("down".into())).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_storage_details_are_hidden() {
        let response = ApiError::from(StoreError::DataCorruption("bad status column".into())).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Internal server error");
        assert!(body.get("field").is_none());
    }
}
