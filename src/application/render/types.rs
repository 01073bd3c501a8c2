use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    canonical::CanonicalRequest,
    types::{ArtifactFormat, ArtifactKind, OperationKind},
};

use super::profile::RenderProfile;

/// Everything one renderer call needs; nothing is read from shared state.
#[derive(Debug, Clone)]
pub struct RenderInvocation {
    pub job_id: Uuid,
    pub request: Arc<CanonicalRequest>,
    pub profile: RenderProfile,
    /// Staging directory private to this attempt.
    pub output_dir: PathBuf,
}

impl RenderInvocation {
    pub fn artifact_kind(&self) -> ArtifactKind {
        self.request.artifact_kind()
    }

    /// Where the renderer is expected to leave its output.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(self.artifact_kind().file_name(&self.job_id.to_string()))
    }

    /// JSON document handed to out-of-process renderers.
    pub fn request_document(&self) -> Result<Vec<u8>, serde_json::Error> {
        let output_path = self.output_path();
        serde_json::to_vec_pretty(&RequestDocument {
            job_id: self.job_id,
            kind: self.request.kind(),
            format: self.artifact_kind().format,
            spec: self.request.body(),
            settings: &self.profile,
            output_path: &output_path,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestDocument<'a> {
    job_id: Uuid,
    kind: OperationKind,
    format: ArtifactFormat,
    spec: &'a Value,
    settings: &'a RenderProfile,
    output_path: &'a Path,
}

/// Failure signals a renderer can raise. Only [`RenderError::InvalidInput`]
/// is permanent; everything else may succeed on a fresh attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("renderer rejected the input: {reason}")]
    InvalidInput { reason: String },
    #[error("renderer timed out after {elapsed_ms} ms")]
    TimedOut { elapsed_ms: u64 },
    #[error("renderer exited abnormally (exit {exit_code:?}): {stderr}")]
    Crashed {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("renderer unavailable: {message}")]
    Unavailable { message: String },
    #[error("renderer i/o failure: {message}")]
    Io { message: String },
}

impl RenderError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, RenderError::InvalidInput { .. })
    }
}

/// External artifact engine. Returning `Ok` only means the call finished;
/// the output file may still be in flight and is confirmed by polling.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, invocation: &RenderInvocation) -> Result<(), RenderError>;
}
