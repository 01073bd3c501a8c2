//! File-backed shape-family dimension schema.

use std::{
    collections::{BTreeMap, BTreeSet},
    io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::schema::{ShapeSchema, normalize_subtype_text};

const BUNDLED_SCHEMA: &str = include_str!("../../config/shape_families.json");

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read shape schema `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse shape schema: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("shape schema lists no families")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    families: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

/// Permitted dimension keys keyed by lower-cased family and subtype.
#[derive(Debug, Clone)]
pub struct FileShapeSchema {
    families: BTreeMap<(String, String), BTreeSet<String>>,
}

impl FileShapeSchema {
    /// Schema shipped with the binary.
    pub fn bundled() -> Result<Self, SchemaError> {
        Self::from_json_str(BUNDLED_SCHEMA)
    }

    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, SchemaError> {
        let document: SchemaDocument = serde_json::from_str(raw)?;
        let mut families = BTreeMap::new();
        for (family, subtypes) in document.families {
            let family = family.trim().to_ascii_lowercase();
            for (subtype, keys) in subtypes {
                families.insert(
                    (family.clone(), normalize_subtype_text(&subtype)),
                    keys.into_iter().collect(),
                );
            }
        }
        if families.is_empty() {
            return Err(SchemaError::Empty);
        }
        Ok(Self { families })
    }

    pub fn family_count(&self) -> usize {
        self.families
            .keys()
            .map(|(family, _)| family.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

impl ShapeSchema for FileShapeSchema {
    fn dimension_keys(&self, family: &str, subtype: &str) -> Option<&BTreeSet<String>> {
        self.families
            .get(&(family.to_string(), subtype.to_string()))
    }
}
