//! Error → HTTP mapping.
//!
//! Every failure leaving a handler is serialized as
//! `{ "error": <stable kind>, "message": <human text> }`; transition
//! rejections additionally carry the session's current stage so clients
//! can recover. Internal detail (IO, JSON, config) never reaches the
//! wire beyond the `unavailable` kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use loom_domain::error::Error;

/// Wrapper turning a domain [`Error`] into an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::Expired(_) => StatusCode::GONE,
            Error::GenerationIncomplete(_) => StatusCode::BAD_GATEWAY,
            Error::GenerationTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Unavailable(_) | Error::Config(_) | Error::Io(_) | Error::Json(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = serde_json::json!({
            "error": self.0.kind(),
            "message": self.0.to_string(),
        });
        if let Error::InvalidTransition { stage, .. } = &self.0 {
            body["stage"] = serde_json::json!(stage);
        }
        tracing::debug!(status = status.as_u16(), kind = self.0.kind(), "request failed");
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use loom_domain::session::Stage;

    #[test]
    fn kinds_map_to_the_documented_status_codes() {
        let cases = [
            (Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                Error::invalid_transition(Stage::Kickoff, "x"),
                StatusCode::CONFLICT,
            ),
            (Error::Expired("x".into()), StatusCode::GONE),
            (
                Error::GenerationIncomplete("x".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                Error::GenerationTimeout("x".into()),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                Error::Unavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError(error).status(), status);
        }
    }
}
