//! Content-addressed, write-once artifact storage.
//!
//! Artifacts live at `<root>/<kind_dir>/<fingerprint><suffix>`. A file only
//! becomes visible under that name through an atomic rename of a fully
//! written temporary sibling, so readers never observe partial content.

use std::{
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use tempfile::NamedTempFile;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::fs;
use uuid::Uuid;

use crate::domain::{entities::ArtifactRecord, fingerprint::Fingerprint, types::ArtifactKind};

const STAGING_DIR: &str = ".staging";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact `{fingerprint}` ({kind}) not found")]
    NotFound {
        fingerprint: Fingerprint,
        kind: ArtifactKind,
    },
    #[error("artifact at `{path}` is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("artifact store i/o failure at `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Artifact bytes together with their record.
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub record: ArtifactRecord,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, io::Error> {
        std::fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self { root })
    }

    pub fn locate(&self, fingerprint: &Fingerprint, kind: ArtifactKind) -> PathBuf {
        self.root
            .join(kind.directory())
            .join(kind.file_name(fingerprint.as_str()))
    }

    /// Private per-job directory the renderer writes into.
    pub fn staging_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join(STAGING_DIR).join(job_id.to_string())
    }

    pub async fn exists(&self, fingerprint: &Fingerprint, kind: ArtifactKind) -> bool {
        match fs::metadata(self.locate(fingerprint, kind)).await {
            Ok(metadata) => metadata.is_file() && metadata.len() > 0,
            Err(_) => false,
        }
    }

    pub async fn stat(
        &self,
        fingerprint: &Fingerprint,
        kind: ArtifactKind,
    ) -> Result<ArtifactRecord, StoreError> {
        let path = self.locate(fingerprint, kind);
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    fingerprint: fingerprint.clone(),
                    kind,
                });
            }
            Err(err) => return Err(StoreError::io(&path, err)),
        };

        let created_at = metadata
            .modified()
            .map(OffsetDateTime::from)
            .unwrap_or_else(|_| OffsetDateTime::now_utc());

        Ok(ArtifactRecord {
            fingerprint: fingerprint.clone(),
            kind,
            path,
            size_bytes: metadata.len(),
            created_at,
        })
    }

    pub async fn read(
        &self,
        fingerprint: &Fingerprint,
        kind: ArtifactKind,
    ) -> Result<Bytes, StoreError> {
        let path = self.locate(fingerprint, kind);
        match fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Err(StoreError::Corrupt {
                path,
                reason: "file is empty".to_string(),
            }),
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                fingerprint: fingerprint.clone(),
                kind,
            }),
            Err(err) => Err(StoreError::Corrupt {
                path,
                reason: err.to_string(),
            }),
        }
    }

    /// Read bytes and record for a visible artifact.
    pub async fn load(
        &self,
        fingerprint: &Fingerprint,
        kind: ArtifactKind,
    ) -> Result<StoredArtifact, StoreError> {
        let bytes = self.read(fingerprint, kind).await?;
        let mut record = self.stat(fingerprint, kind).await?;
        record.size_bytes = bytes.len() as u64;
        Ok(StoredArtifact { record, bytes })
    }

    /// Publish `bytes` under the artifact's public name.
    ///
    /// Concurrent writers of the same fingerprint each rename a complete file
    /// into place; the last rename wins.
    pub async fn write(
        &self,
        fingerprint: &Fingerprint,
        kind: ArtifactKind,
        bytes: Bytes,
    ) -> Result<StoredArtifact, StoreError> {
        let path = self.locate(fingerprint, kind);
        let target = path.clone();
        let payload = bytes.clone();

        tokio::task::spawn_blocking(move || persist_atomically(&target, &payload))
            .await
            .map_err(|err| StoreError::io(&path, io::Error::other(err)))??;

        let record = ArtifactRecord {
            fingerprint: fingerprint.clone(),
            kind,
            path,
            size_bytes: bytes.len() as u64,
            created_at: OffsetDateTime::now_utc(),
        };
        Ok(StoredArtifact { record, bytes })
    }
}

fn persist_atomically(target: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let directory = target
        .parent()
        .ok_or_else(|| StoreError::io(target, io::Error::other("artifact path has no parent")))?;
    std::fs::create_dir_all(directory).map_err(|err| StoreError::io(directory, err))?;

    let mut staged = NamedTempFile::new_in(directory).map_err(|err| StoreError::io(directory, err))?;
    staged
        .write_all(bytes)
        .map_err(|err| StoreError::io(staged.path(), err))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|err| StoreError::io(staged.path(), err))?;
    staged
        .persist(target)
        .map_err(|err| StoreError::io(target, err.error))?;
    Ok(())
}
