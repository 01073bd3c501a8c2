//! Request and record types exchanged between the generation layers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use super::{
    fingerprint::Fingerprint,
    types::{ArtifactKind, ModelFormat, OperationKind},
};

/// Options that may influence the produced artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ModelFormat>,
}

/// A raw, caller-supplied request for one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub kind: OperationKind,
    pub payload: Value,
    #[serde(default)]
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(kind: OperationKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_format(mut self, format: ModelFormat) -> Self {
        self.options.format = Some(format);
        self
    }
}

/// Metadata for an artifact visible under its public name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    pub fingerprint: Fingerprint,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub size_bytes: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
