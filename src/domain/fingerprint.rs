use std::{fmt, str::FromStr};

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::{
    canonical::{CanonicalRequest, canonical_json},
    error::InvalidFingerprint,
};

/// Bumped whenever canonicalization changes in a way that must not reuse old keys.
pub const FINGERPRINT_VERSION: u64 = 1;

const FINGERPRINT_LEN: usize = 64;

/// Lowercase hex SHA-256 of a canonical request; cache key and filename stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(request: &CanonicalRequest) -> Self {
        let mut envelope = Map::new();
        envelope.insert("version".to_string(), Value::from(FINGERPRINT_VERSION));
        envelope.insert(
            "kind".to_string(),
            Value::String(request.kind().as_str().to_string()),
        );
        envelope.insert("request".to_string(), request.body().clone());
        envelope.insert("options".to_string(), request.options_value());

        let serialized = canonical_json(&Value::Object(envelope));
        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = InvalidFingerprint;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let valid = value.len() == FINGERPRINT_LEN
            && value
                .bytes()
                .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte));
        if valid {
            Ok(Self(value.to_string()))
        } else {
            Err(InvalidFingerprint(value.to_string()))
        }
    }
}
