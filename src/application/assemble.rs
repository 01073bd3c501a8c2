use bytes::Bytes;

use crate::{domain::entities::ArtifactRecord, infra::store::StoredArtifact};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
        }
    }
}

/// Result of a successful `generate`.
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub record: ArtifactRecord,
    pub bytes: Bytes,
    pub cache: CacheStatus,
    /// Render attempts made by this call; zero on a hit.
    pub attempts: u32,
}

impl GeneratedArtifact {
    pub fn file_name(&self) -> String {
        self.record.kind.file_name(self.record.fingerprint.as_str())
    }

    pub fn content_type(&self) -> String {
        mime_guess::from_path(self.file_name())
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

pub fn hit(stored: StoredArtifact) -> GeneratedArtifact {
    GeneratedArtifact {
        record: stored.record,
        bytes: stored.bytes,
        cache: CacheStatus::Hit,
        attempts: 0,
    }
}

pub fn generated(stored: StoredArtifact, attempts: u32) -> GeneratedArtifact {
    GeneratedArtifact {
        record: stored.record,
        bytes: stored.bytes,
        cache: CacheStatus::Miss,
        attempts,
    }
}
