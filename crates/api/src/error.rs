//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use projections::ProjectionError;
use record_store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Direct write error.
    Domain(DomainError),
    /// Read path error.
    Projection(ProjectionError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Projection(ProjectionError::Store(err)) => store_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match err {
        DomainError::Validation(_)
        | DomainError::InvalidField { .. }
        | DomainError::Malformed(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        DomainError::Store(store) => store_error_to_response(store),
        DomainError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    match &err {
        StoreError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        StoreError::InvalidUpdate { .. } | StoreError::InvalidCursor(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "store error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Projection(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ValidationError;

    #[test]
    fn validation_is_bad_request() {
        let err = ApiError::from(DomainError::from(ValidationError {
            entity: "product",
            missing: vec!["sku"],
        }));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn wrongly_shaped_field_is_bad_request() {
        let err = ApiError::from(DomainError::InvalidField {
            entity: "product",
            field: "variants",
            expected: "an array",
        });
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unavailable_store_is_service_unavailable() {
        let err = ApiError::from(ProjectionError::from(StoreError::Unavailable("down".into())));
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
