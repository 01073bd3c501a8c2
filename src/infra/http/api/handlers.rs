use std::str::FromStr;

use axum::Json;
use axum::body::Body;
use axum::extract::{FromRequest, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use magforge_api_types::{
    self as api, ArtifactResponse, Encoding, FingerprintResponse, GenerateRequest,
    JobStatusResponse,
};
use serde::Deserialize;

use crate::application::assemble::{self, CacheStatus, GeneratedArtifact};
use crate::domain::entities::{GenerationOptions, GenerationRequest};
use crate::domain::fingerprint::Fingerprint;
use crate::domain::types::{ModelFormat, OperationKind};

use super::error::{ApiError, codes, generation_to_api, store_to_api};
use super::state::ApiState;

pub const FINGERPRINT_HEADER: HeaderName = HeaderName::from_static("x-magforge-fingerprint");
pub const CACHE_HEADER: HeaderName = HeaderName::from_static("x-magforge-cache");

/// JSON body whose rejections use the API error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, Default, Deserialize)]
pub struct EncodingQuery {
    #[serde(default)]
    pub encoding: Encoding,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArtifactQuery {
    pub format: Option<String>,
    #[serde(default)]
    pub encoding: Encoding,
}

pub async fn generate_artifact(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
    Query(query): Query<EncodingQuery>,
    ApiJson(body): ApiJson<GenerateRequest>,
) -> Result<Response, ApiError> {
    let request = generation_request(&kind, body)?;
    let artifact = state
        .generation
        .generate(&request)
        .await
        .map_err(|err| generation_to_api(err, state.retry_after_seconds))?;
    Ok(artifact_response(&artifact, query.encoding))
}

pub async fn fingerprint_request(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
    ApiJson(body): ApiJson<GenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = generation_request(&kind, body)?;
    let prepared = state.generation.prepare(&request).map_err(|err| {
        ApiError::bad_request(
            codes::CANONICALIZATION,
            "Request could not be canonicalized",
            Some(err.to_string()),
        )
    })?;
    let cached = state.generation.is_cached(&prepared).await;

    Ok(Json(FingerprintResponse {
        kind: prepared.request.kind().as_str().to_string(),
        fingerprint: prepared.fingerprint.to_string(),
        canonical: prepared.request.body().clone(),
        cached,
    }))
}

pub async fn get_artifact(
    State(state): State<ApiState>,
    Path((kind, fingerprint)): Path<(String, String)>,
    Query(query): Query<ArtifactQuery>,
) -> Result<Response, ApiError> {
    let kind = parse_kind(&kind)?;
    let fingerprint = parse_fingerprint(&fingerprint)?;
    let format = query
        .format
        .as_deref()
        .map(ModelFormat::from_str)
        .transpose()
        .map_err(|err| {
            ApiError::bad_request(
                codes::UNKNOWN_FORMAT,
                "Unknown model format",
                Some(err.to_string()),
            )
        })?;

    let stored = state
        .generation
        .store()
        .load(&fingerprint, kind.artifact_kind(format))
        .await
        .map_err(store_to_api)?;
    Ok(artifact_response(&assemble::hit(stored), query.encoding))
}

pub async fn job_status(
    State(state): State<ApiState>,
    Path(fingerprint): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let fingerprint = parse_fingerprint(&fingerprint)?;
    let dispatcher = state.generation.dispatcher();
    Ok(Json(JobStatusResponse {
        state: dispatcher
            .state(&fingerprint)
            .map(|state| state.as_str().to_string()),
        fingerprint: fingerprint.to_string(),
        in_flight: dispatcher.in_flight(),
    }))
}

pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

fn generation_request(kind: &str, body: GenerateRequest) -> Result<GenerationRequest, ApiError> {
    let kind = parse_kind(kind)?;
    Ok(GenerationRequest {
        kind,
        payload: body.payload,
        options: GenerationOptions {
            format: body.options.format.map(model_format),
        },
    })
}

fn parse_kind(kind: &str) -> Result<OperationKind, ApiError> {
    OperationKind::from_str(kind).map_err(|err| {
        ApiError::bad_request(
            codes::UNKNOWN_KIND,
            "Unknown operation kind",
            Some(err.to_string()),
        )
    })
}

fn parse_fingerprint(fingerprint: &str) -> Result<Fingerprint, ApiError> {
    Fingerprint::from_str(fingerprint).map_err(|err| {
        ApiError::bad_request(
            codes::INVALID_FINGERPRINT,
            "Invalid fingerprint",
            Some(err.to_string()),
        )
    })
}

fn model_format(format: api::ModelFormat) -> ModelFormat {
    match format {
        api::ModelFormat::Stl => ModelFormat::Stl,
        api::ModelFormat::Step => ModelFormat::Step,
    }
}

fn cache_status(cache: CacheStatus) -> api::CacheStatus {
    match cache {
        CacheStatus::Hit => api::CacheStatus::Hit,
        CacheStatus::Miss => api::CacheStatus::Miss,
    }
}

fn artifact_response(artifact: &GeneratedArtifact, encoding: Encoding) -> Response {
    match encoding {
        Encoding::Binary => binary_response(artifact),
        Encoding::Base64 => Json(ArtifactResponse {
            fingerprint: artifact.record.fingerprint.to_string(),
            kind: artifact.record.kind.operation.as_str().to_string(),
            format: artifact.record.kind.format.as_str().to_string(),
            file_name: artifact.file_name(),
            content_type: artifact.content_type(),
            size_bytes: artifact.record.size_bytes,
            created_at: artifact.record.created_at,
            cache: cache_status(artifact.cache),
            attempts: artifact.attempts,
            data_base64: STANDARD.encode(&artifact.bytes),
        })
        .into_response(),
    }
}

fn binary_response(artifact: &GeneratedArtifact) -> Response {
    let mut response = Response::new(Body::from(artifact.bytes.clone()));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&artifact.content_type()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&artifact.bytes.len().to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("inline; filename=\"{}\"", artifact.file_name()))
    {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(artifact.record.fingerprint.as_str()) {
        headers.insert(FINGERPRINT_HEADER, value);
    }
    headers.insert(
        CACHE_HEADER,
        HeaderValue::from_static(artifact.cache.as_str()),
    );

    response
}
