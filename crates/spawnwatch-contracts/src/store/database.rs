use std::io::{ErrorKind, Write};
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::warn;

use super::ImageDigest;

const DIGESTS_KEY: &str = "image_hashes";
const NAMES_KEY: &str = "pokemon";

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("failed to read database {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("database is corrupt: {0}")]
    Corrupt(String),
    #[error("failed to write database {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode database: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Per-name statistics.
///
/// `count` is the number of learn events for the name, not the number of
/// digests currently mapping to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    pub count: u64,
    pub first_seen: String,
}

/// The whole identification database as persisted on disk:
///
/// ```json
/// {
///   "image_hashes": { "<digest>": "<name>" },
///   "pokemon": { "<name>": { "count": 1, "first_seen": "<rfc3339>" } }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Database {
    #[serde(rename = "image_hashes")]
    pub digests: IndexMap<ImageDigest, String>,
    #[serde(rename = "pokemon")]
    pub names: IndexMap<String, NameRecord>,
}

impl Database {
    /// Reads the database at `path`. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> Result<Option<Self>, DatabaseError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(DatabaseError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        Self::parse(&raw).map(Some)
    }

    pub fn parse(raw: &str) -> Result<Self, DatabaseError> {
        let payload: Value = serde_json::from_str(raw)
            .map_err(|err| DatabaseError::Corrupt(format!("invalid JSON: {err}")))?;
        let Some(obj) = payload.as_object() else {
            return Err(DatabaseError::Corrupt(
                "top-level value is not an object".to_string(),
            ));
        };
        for key in [DIGESTS_KEY, NAMES_KEY] {
            if !obj.get(key).is_some_and(Value::is_object) {
                return Err(DatabaseError::Corrupt(format!("missing `{key}` mapping")));
            }
        }

        // `Value` objects are key-sorted; decode the text itself to keep file order.
        let mut database: Database = serde_json::from_str(raw)
            .map_err(|err| DatabaseError::Corrupt(format!("malformed entries: {err}")))?;
        database.repair();
        Ok(database)
    }

    pub fn lookup(&self, digest: &ImageDigest) -> Option<&str> {
        self.digests.get(digest).map(String::as_str)
    }

    /// Maps `digest` to `name` and bumps the learn counter for `name`.
    ///
    /// Returns the name the digest mapped to before, if any.
    pub fn record(&mut self, digest: ImageDigest, name: &str) -> Option<String> {
        let previous = self.digests.insert(digest, name.to_string());
        self.names
            .entry(name.to_string())
            .and_modify(|record| record.count += 1)
            .or_insert_with(|| NameRecord {
                count: 1,
                first_seen: now_utc_iso(),
            });
        previous
    }

    /// Replaces the file at `path` with the full database.
    ///
    /// The document goes to a temporary file in the same directory first and
    /// is renamed over `path`, so readers never observe a partial write.
    pub fn save(&self, path: &Path) -> Result<(), DatabaseError> {
        let persist_err = |source: std::io::Error| DatabaseError::Persist {
            path: path.display().to_string(),
            source,
        };
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(persist_err)?;

        let mut file = NamedTempFile::new_in(parent).map_err(persist_err)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.write_all(b"\n").map_err(persist_err)?;
        file.as_file().sync_all().map_err(persist_err)?;
        file.persist(path).map_err(|err| persist_err(err.error))?;
        Ok(())
    }

    // Hand-edited files can reference names with no record, or zero counts.
    fn repair(&mut self) {
        let mut repaired = 0usize;
        for record in self.names.values_mut() {
            if record.count == 0 {
                record.count = 1;
                repaired += 1;
            }
        }
        let orphans = self
            .digests
            .values()
            .filter(|name| !self.names.contains_key(name.as_str()))
            .cloned()
            .collect::<Vec<String>>();
        for name in orphans {
            if self.names.contains_key(&name) {
                continue;
            }
            self.names.insert(
                name,
                NameRecord {
                    count: 1,
                    first_seen: now_utc_iso(),
                },
            );
            repaired += 1;
        }
        if repaired > 0 {
            warn!(repaired, "repaired inconsistent name records in database");
        }
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
