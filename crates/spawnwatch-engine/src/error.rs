use spawnwatch_contracts::store::DatabaseError;
use thiserror::Error;

use crate::digest::DigestError;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("image unavailable: {0}")]
    ImageUnavailable(String),
    #[error("hash unavailable: {0}")]
    HashUnavailable(#[from] DigestError),
    #[error("identification database unreadable: {0}")]
    DatabaseCorrupt(#[source] DatabaseError),
    #[error("failed to save identification database: {0}")]
    PersistenceFailure(#[source] DatabaseError),
}
