mod database;
mod digest;

pub use database::{Database, DatabaseError, NameRecord};
pub use digest::ImageDigest;
