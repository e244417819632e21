use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mltrack::services::ServiceError;
use mltrack::wire::{ErrorBody, ErrorDetail};

/// An error rendered as `{"error": {"code", "message"}}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_input", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    /// Map a service error from the upload route, where bad input is a 400
    pub fn upload(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(msg) => Self::bad_request(msg),
            other => other.into(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::AlreadyExists(_) => StatusCode::CONFLICT,
            ServiceError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Internal(inner) => {
                tracing::error!("Internal error: {:#}", inner);
                StatusCode::INTERNAL_SERVER_ERROR
            },
        };
        Self::new(status, err.code(), err.message())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::unprocessable(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::unprocessable(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::bad_request(err.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_statuses() {
        let cases = [
            (ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                ServiceError::InvalidInput("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (ServiceError::AlreadyExists("x".into()), StatusCode::CONFLICT),
            (
                ServiceError::PayloadTooLarge("x".into()),
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                ServiceError::Internal(anyhow::anyhow!("x")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn upload_invalid_input_is_bad_request() {
        let err = ApiError::upload(ServiceError::InvalidInput("Invalid filename".into()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "invalid_input");

        let err = ApiError::upload(ServiceError::AlreadyExists("dup".into()));
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn internal_errors_hide_the_cause() {
        let inner = anyhow::anyhow!("open /srv/artifacts/abc/model.pt: permission denied")
            .context("Failed to create artifact file");
        let err = ApiError::from(ServiceError::Internal(inner));
        assert_eq!(err.message, "Failed to create artifact file");
        assert_eq!(err.code, "internal_error");
    }
}
