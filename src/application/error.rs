use std::io;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{
    config::LoadError,
    domain::{error::CanonicalizationError, fingerprint::Fingerprint},
    infra::{error::InfraError, store::StoreError},
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Outcomes of `generate` other than a produced artifact.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),
    #[error("geometry for `{fingerprint}` cannot be generated: {reason}")]
    InvalidGeometry {
        fingerprint: Fingerprint,
        reason: String,
    },
    #[error("generation of `{fingerprint}` did not complete after {attempts} attempt(s)")]
    Timeout {
        fingerprint: Fingerprint,
        attempts: u32,
    },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl GenerationError {
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::Canonicalization(_) => "canonicalization",
            GenerationError::InvalidGeometry { .. } => "invalid_geometry",
            GenerationError::Timeout { .. } => "timeout",
            GenerationError::Storage(_) => "storage",
        }
    }
}

/// Failures surfaced by the binary's commands.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("failed to read `{path}`: {source}")]
    Input {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("request file `{path}` is not valid JSON: {source}")]
    MalformedInput {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) => 78,
            AppError::Generation(GenerationError::Canonicalization(_))
            | AppError::Generation(GenerationError::InvalidGeometry { .. })
            | AppError::MalformedInput { .. } => 65,
            AppError::Input { .. } => 66,
            AppError::Generation(GenerationError::Timeout { .. }) => 75,
            AppError::Generation(GenerationError::Storage(_))
            | AppError::Infra(_)
            | AppError::Unexpected(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn exit_codes_distinguish_caller_and_retry_failures() {
        let fingerprint = Fingerprint::from_str(&"0f".repeat(32)).expect("fingerprint");
        let invalid = AppError::from(GenerationError::InvalidGeometry {
            fingerprint: fingerprint.clone(),
            reason: "rejected".to_string(),
        });
        let timeout = AppError::from(GenerationError::Timeout {
            fingerprint,
            attempts: 3,
        });
        assert_eq!(invalid.exit_code(), 65);
        assert_eq!(timeout.exit_code(), 75);
    }
}
