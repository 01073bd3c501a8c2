use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use magforge_api_types::{ApiErrorBody, ApiErrorMessage};

use crate::application::error::{ErrorReport, GenerationError};
use crate::infra::store::StoreError;

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const UNKNOWN_KIND: &str = "unknown_kind";
    pub const UNKNOWN_FORMAT: &str = "unknown_format";
    pub const INVALID_FINGERPRINT: &str = "invalid_fingerprint";
    pub const CANONICALIZATION: &str = "canonicalization_error";
    pub const INVALID_GEOMETRY: &str = "invalid_geometry";
    pub const TIMEOUT: &str = "generation_timeout";
    pub const STORAGE: &str = "storage_error";
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            retry_after: None,
        }
    }

    pub fn bad_request(code: &'static str, message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message, hint)
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, None)
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(
            codes::BAD_REQUEST,
            "Request body is not a valid generation request",
            Some(rejection.body_text()),
        )
    }
}

pub fn generation_to_api(err: GenerationError, retry_after: u64) -> ApiError {
    match err {
        GenerationError::Canonicalization(err) => ApiError::bad_request(
            codes::CANONICALIZATION,
            "Request could not be canonicalized",
            Some(err.to_string()),
        ),
        GenerationError::InvalidGeometry { reason, .. } => ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            codes::INVALID_GEOMETRY,
            "Geometry cannot be generated",
            Some(reason),
        ),
        GenerationError::Timeout { attempts, .. } => ApiError::new(
            StatusCode::GATEWAY_TIMEOUT,
            codes::TIMEOUT,
            "Generation did not complete in time",
            Some(format!("gave up after {attempts} attempt(s)")),
        )
        .with_retry_after(retry_after),
        GenerationError::Storage(err) => store_to_api(err),
    }
}

pub fn store_to_api(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound { .. } => ApiError::not_found("Artifact not found"),
        other => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::STORAGE,
            "Artifact storage failure",
            Some(other.to_string()),
        ),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = self.hint.clone();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(seconds) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        // Attach a structured report so shared logging middleware can emit rich diagnostics.
        ErrorReport::from_message(
            "infra::http::api",
            self.status,
            format!("{}: {}", self.code, hint.as_deref().unwrap_or(self.message)),
        )
        .attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::domain::{error::CanonicalizationError, fingerprint::Fingerprint};

    fn fingerprint() -> Fingerprint {
        Fingerprint::from_str(&"5e".repeat(32)).expect("fingerprint")
    }

    #[test]
    fn generation_errors_map_to_documented_statuses() {
        let canonical = generation_to_api(
            CanonicalizationError::EmptyDimension {
                key: "A".to_string(),
            }
            .into(),
            5,
        );
        assert_eq!(canonical.status(), StatusCode::BAD_REQUEST);

        let invalid = generation_to_api(
            GenerationError::InvalidGeometry {
                fingerprint: fingerprint(),
                reason: "no solid".to_string(),
            },
            5,
        );
        assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(invalid.code(), codes::INVALID_GEOMETRY);
    }

    #[test]
    fn timeout_response_carries_retry_after() {
        let response = generation_to_api(
            GenerationError::Timeout {
                fingerprint: fingerprint(),
                attempts: 3,
            },
            30,
        )
        .into_response();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            response.headers().get(RETRY_AFTER),
            Some(&HeaderValue::from_static("30"))
        );
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }
}
