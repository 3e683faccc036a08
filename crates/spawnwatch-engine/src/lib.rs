//! Spawn identification core.
//!
//! Raw image bytes are normalized and fingerprinted by [`digest_image`]; the
//! [`IdentificationStore`] maps fingerprints to names and persists them; the
//! [`SpawnWatcher`] turns chat messages into identify/learn jobs.

mod digest;
mod error;
mod fetch;
mod store;
mod watcher;

#[cfg(test)]
mod fixtures;

pub use digest::{digest_bitmap, digest_image, DigestError, NORMALIZED_EDGE, NORMALIZE_FILTER};
pub use error::WatchError;
pub use fetch::{ImageFetcher, ImageSource, MAX_IMAGE_BYTES};
pub use store::{Identification, IdentificationStore, LearnOutcome};
pub use watcher::{InboundMessage, Reply, SpawnWatcher, WatchJob, WatcherSettings};
