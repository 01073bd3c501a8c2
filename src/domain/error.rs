use thiserror::Error;

use super::types::OperationKind;

/// Rejections raised while normalizing a request; no job is ever created for these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonicalizationError {
    #[error("{kind} payload must be a JSON object")]
    PayloadNotObject { kind: OperationKind },
    #[error("{kind} payload is missing required field `{field}`")]
    MissingField {
        kind: OperationKind,
        field: &'static str,
    },
    #[error("field `{path}` must be {expected}")]
    InvalidField {
        path: String,
        expected: &'static str,
    },
    #[error("dimension `{key}` has none of nominal, minimum or maximum")]
    EmptyDimension { key: String },
    #[error("dimension `{key}` must be a number or a tolerance object")]
    InvalidDimension { key: String },
    #[error("shape family `{family}` subtype `{subtype}` is not known to the dimension schema")]
    UnknownFamily { family: String, subtype: String },
    #[error("alias field `{path}` is an object without a string `name`")]
    MalformedAlias { path: String },
}

impl CanonicalizationError {
    pub fn invalid_field(path: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidField {
            path: path.into(),
            expected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operation kind `{0}`")]
pub struct UnknownKind(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown artifact format `{0}`")]
pub struct UnknownFormat(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{0}` is not a 64-character lowercase hex fingerprint")]
pub struct InvalidFingerprint(pub String);
