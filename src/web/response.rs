//! Mapping of library errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::Error;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AccessDenied(_) => StatusCode::FORBIDDEN,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Error::UpstreamRelayFailure(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Database(_)
            | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
            "internal server error".to_string()
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
            self.to_string()
        };

        let body = ErrorBody {
            error: self.kind(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::denied("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::UpstreamRelayFailure("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::Other("disk on fire".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
