//! Wire types shared by the magforge HTTP API and its clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Body accepted by `POST /api/v1/generate/{kind}` and `POST /api/v1/fingerprint/{kind}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub payload: Value,
    #[serde(default)]
    pub options: RequestOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ModelFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    Stl,
    #[serde(alias = "stp")]
    Step,
}

/// How a generated artifact is returned over HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Binary,
    Base64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// JSON envelope returned when `encoding=base64`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactResponse {
    pub fingerprint: String,
    pub kind: String,
    pub format: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub cache: CacheStatus,
    pub attempts: u32,
    pub data_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintResponse {
    pub kind: String,
    pub fingerprint: String,
    pub canonical: Value,
    pub cached: bool,
}

/// Returned by `GET /api/v1/jobs/{fingerprint}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub fingerprint: String,
    /// `None` when no job is pending or running for the fingerprint.
    pub state: Option<String>,
    pub in_flight: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_when_absent() {
        let body: GenerateRequest =
            serde_json::from_str(r#"{"payload":{"family":"e"}}"#).expect("parse body");
        assert_eq!(body.options, RequestOptions::default());
    }

    #[test]
    fn model_format_uses_snake_case() {
        let options: RequestOptions =
            serde_json::from_str(r#"{"format":"step"}"#).expect("parse options");
        assert_eq!(options.format, Some(ModelFormat::Step));
    }

    #[test]
    fn stp_is_accepted_for_step() {
        let options: RequestOptions =
            serde_json::from_str(r#"{"format":"stp"}"#).expect("parse options");
        assert_eq!(options.format, Some(ModelFormat::Step));
    }
}
