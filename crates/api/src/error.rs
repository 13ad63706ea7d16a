//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, OrderError};

/// Body returned for failures whose details must not leak.
const INTERNAL_ERROR: &str = "internal server error";

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// The route needs an identified caller.
    Unauthorized(String),
    /// Domain logic error.
    Domain(DomainError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match &err {
        DomainError::Order(order_err) => match order_err {
            OrderError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
            OrderError::ResourceNotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
            OrderError::InsufficientStock { .. } | OrderError::IllegalStateTransition { .. } => {
                (StatusCode::CONFLICT, err.to_string())
            }
            OrderError::AccessDenied(_) => (StatusCode::FORBIDDEN, err.to_string()),
            // Already carries a generic message.
            OrderError::OrderCreation(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        },
        DomainError::Store(store_err) => {
            tracing::error!(error = %store_err, "store failure");
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR.to_string())
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use common::OrderStatus;
    use store::StoreError;

    use super::*;

    fn status_of(err: impl Into<DomainError>) -> StatusCode {
        ApiError::Domain(err.into()).into_response().status()
    }

    #[test]
    fn test_order_errors_map_to_client_statuses() {
        assert_eq!(
            status_of(OrderError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(OrderError::ResourceNotFound {
                resource: "product",
                id: "9".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(OrderError::InsufficientStock {
                product_name: "Burger".into(),
                available: 1,
                requested: 2
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OrderError::IllegalStateTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Cancelled
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OrderError::AccessDenied("no".into())),
            StatusCode::FORBIDDEN
        );
    }

    #[tokio::test]
    async fn test_store_failure_hides_details() {
        let response = ApiError::Domain(StoreError::Unavailable("connection reset by peer".into()).into())
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], INTERNAL_ERROR);
    }
}
