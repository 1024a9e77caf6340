//! Persisted record of which fingerprints an index already holds.
//!
//! Stored as `ingested_meta.json` next to the vector files:
//!
//! ```json
//! {
//!   "rows": {
//!     "a.pdf::0:0": true
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

pub const METADATA_FILE: &str = "ingested_meta.json";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct MetadataFile {
    #[serde(default)]
    rows: BTreeMap<String, bool>,
}

/// Fingerprint set for one index directory.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
    rows: BTreeMap<String, bool>,
}

impl MetadataStore {
    /// Reads the metadata file in `dir`. A missing file yields an empty
    /// store; an unreadable or malformed one is logged and also reset to
    /// empty.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(METADATA_FILE);
        let rows = match read_rows(&path) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "resetting index metadata");
                BTreeMap::new()
            }
        };
        Self { path, rows }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.rows.contains_key(fingerprint)
    }

    /// Marks a fingerprint as ingested. Returns false if it was already present.
    pub fn insert(&mut self, fingerprint: String) -> bool {
        self.rows.insert(fingerprint, true).is_none()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Writes the whole mapping, keys sorted, via a temporary sibling file.
    pub fn save(&self) -> Result<()> {
        let file = MetadataFile {
            rows: self.rows.clone(),
        };
        let json = serde_json::to_vec_pretty(&file)?;
        write_atomic(&self.path, &json)
    }
}

/// Strict reader: `Ok(empty)` for a missing file, `CorruptMetadata` for
/// anything that does not parse.
pub fn read_rows(path: &Path) -> Result<BTreeMap<String, bool>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => {
            return Err(Error::CorruptMetadata {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };
    let file: MetadataFile = serde_json::from_slice(&bytes).map_err(|e| Error::CorruptMetadata {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(file.rows)
}

/// Writes `bytes` to `path.tmp` and renames it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes).map_err(|source| Error::VectorIndexIo {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| Error::VectorIndexIo {
        path: path.to_path_buf(),
        source,
    })
}
