//! HTTP error responses

use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::error;

use crate::error::{Error, ProviderError};

/// Gateway error rendered as `{"error": {"code", "category", "message"}}`.
///
/// Provider failures add the provider id and rate-limit rejections add the agent id.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    /// HTTP status for the wrapped error
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) | Error::Serialization(_) => StatusCode::BAD_REQUEST,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Provider {
                source: ProviderError::CircuitOpen,
                ..
            } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Provider { .. } => StatusCode::BAD_GATEWAY,
            Error::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            // Client closed request
            Error::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            Error::Config(_) | Error::Internal(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// The object under the `"error"` key of an error response or a failed stream event
pub(crate) fn error_body(err: &Error) -> Value {
    let mut body = json!({
        "code": err.code(),
        "category": err.category(),
        "message": err.to_string(),
    });
    match err {
        Error::Provider { provider, .. } => body["provider"] = json!(provider),
        Error::RateLimited { agent_id, .. } => body["agent_id"] = json!(agent_id),
        _ => {}
    }
    body
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, code = self.0.code(), "Request failed");
        }

        let body = Json(json!({ "error": error_body(&self.0) }));
        let mut response = (status, body).into_response();

        if let Error::RateLimited { retry_after, .. } = &self.0 {
            // Whole seconds, rounded up
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_validation_is_bad_request() {
        let response = ApiError(Error::validation("messages must not be empty")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "invalid_request");
        assert_eq!(body["error"]["category"], "request");
    }

    #[tokio::test]
    async fn test_provider_error_is_bad_gateway() {
        let err = Error::provider(
            "openai",
            ProviderError::Transport("connection refused".to_string()),
        );
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = body_json(response).await;
        assert_eq!(body["error"]["category"], "provider");
        assert_eq!(body["error"]["provider"], "openai");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("openai"));
    }

    #[tokio::test]
    async fn test_rate_limited_is_too_many_requests() {
        let err = Error::RateLimited {
            agent_id: "ada".to_string(),
            retry_after: std::time::Duration::from_millis(1500),
        };
        let response = ApiError(err).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "rate_limited");
        assert_eq!(body["error"]["category"], "rate_limit");
        assert_eq!(body["error"]["agent_id"], "ada");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError(Error::DeadlineExceeded).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(ApiError(Error::Cancelled).status().as_u16(), 499);
        assert_eq!(
            ApiError(Error::provider("openai", ProviderError::CircuitOpen)).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError(Error::not_found("agent", "x")).status(),
            StatusCode::NOT_FOUND
        );
    }
}
