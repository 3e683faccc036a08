use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use spawnwatch_contracts::store::{Database, ImageDigest, NameRecord};
use tracing::{error, info, warn};

use crate::digest::digest_image;
use crate::error::WatchError;

pub(crate) const MSG_UNPROCESSABLE: &str = "Could not process the image.";
pub(crate) const MSG_UNRECOGNIZED: &str =
    "I don't recognize this Pokemon yet. Catch it and I'll learn it from the confirmation!";
pub(crate) const MSG_SAVE_FAILED: &str = "Failed to save the database.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub name: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnOutcome {
    pub success: bool,
    pub message: String,
}

/// Digest -> name lookup table backed by a single JSON file.
///
/// Lookups share a read lock; a learn holds the write lock across the
/// mutation and the file rewrite, so learns never interleave with each other
/// or with lookups. Hashing always happens before a lock is taken.
#[derive(Debug)]
pub struct IdentificationStore {
    path: PathBuf,
    database: RwLock<Database>,
}

impl IdentificationStore {
    /// Loads the database at `path`, or creates and persists an empty one.
    ///
    /// An unreadable or malformed file is logged and replaced by an empty
    /// in-memory database; the file itself is left alone until the next
    /// successful learn rewrites it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let database = match Database::load(&path) {
            Ok(Some(database)) => {
                info!(
                    path = %path.display(),
                    digests = database.digests.len(),
                    names = database.names.len(),
                    "loaded identification database"
                );
                database
            }
            Ok(None) => {
                let database = Database::default();
                match database.save(&path) {
                    Ok(()) => info!(path = %path.display(), "created identification database"),
                    Err(err) => error!(
                        path = %path.display(),
                        error = %WatchError::PersistenceFailure(err),
                        "could not create identification database; continuing in memory"
                    ),
                }
                database
            }
            Err(err) => {
                error!(
                    path = %path.display(),
                    error = %WatchError::DatabaseCorrupt(err),
                    "falling back to an empty identification database"
                );
                Database::default()
            }
        };
        Self {
            path,
            database: RwLock::new(database),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identify(&self, image_bytes: &[u8]) -> Identification {
        let digest = match digest_image(image_bytes) {
            Ok(digest) => digest,
            Err(err) => {
                warn!(error = %err, "could not fingerprint spawn image");
                return Identification {
                    name: None,
                    message: MSG_UNPROCESSABLE.to_string(),
                };
            }
        };
        match self.lookup_digest(&digest) {
            Some(name) => Identification {
                message: format!("I think this is a {name}!"),
                name: Some(name),
            },
            None => Identification {
                name: None,
                message: MSG_UNRECOGNIZED.to_string(),
            },
        }
    }

    pub fn lookup_digest(&self, digest: &ImageDigest) -> Option<String> {
        self.read().lookup(digest).map(str::to_string)
    }

    pub fn learn(&self, image_bytes: &[u8], name: &str) -> LearnOutcome {
        let result = digest_image(image_bytes)
            .map_err(WatchError::from)
            .and_then(|digest| self.learn_digest(digest, name));
        match result {
            Ok(()) => LearnOutcome {
                success: true,
                message: format!("Thanks! I've learned that this is a {name}."),
            },
            Err(err @ WatchError::PersistenceFailure(_)) => {
                error!(pokemon = name, error = %err, "learned in memory but not on disk");
                LearnOutcome {
                    success: false,
                    message: MSG_SAVE_FAILED.to_string(),
                }
            }
            Err(err) => {
                warn!(pokemon = name, error = %err, "could not learn spawn image");
                LearnOutcome {
                    success: false,
                    message: MSG_UNPROCESSABLE.to_string(),
                }
            }
        }
    }

    /// Records `digest -> name` and rewrites the backing file.
    ///
    /// On a write failure the in-memory mapping is kept and the error is
    /// returned, so later lookups in this process still see the name.
    pub fn learn_digest(&self, digest: ImageDigest, name: &str) -> Result<(), WatchError> {
        let mut database = self.write();
        if let Some(previous) = database.record(digest.clone(), name) {
            if previous != name {
                info!(%digest, from = %previous, to = name, "relearned digest under a new name");
            }
        }
        database
            .save(&self.path)
            .map_err(WatchError::PersistenceFailure)
    }

    pub fn known_names(&self) -> Vec<String> {
        self.read().names.keys().cloned().collect()
    }

    pub fn name_info(&self, name: &str) -> Option<NameRecord> {
        self.read().names.get(name).cloned()
    }

    fn read(&self) -> RwLockReadGuard<'_, Database> {
        self.database.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Database> {
        self.database.write().unwrap_or_else(PoisonError::into_inner)
    }
}
