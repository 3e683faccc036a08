use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One outcome of a spawn or catch, as written to `events.jsonl`.
///
/// Serialized with the variant name as `type`, e.g.
/// `{"type":"name_learned","channel_id":"..","location":"..","name":"Eevee",..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpawnEvent {
    SpawnIdentified {
        channel_id: String,
        location: String,
        name: String,
    },
    SpawnUnrecognized {
        channel_id: String,
        location: String,
        reason: String,
    },
    NameLearned {
        channel_id: String,
        location: String,
        name: String,
    },
    LearnFailed {
        channel_id: String,
        location: String,
        name: String,
        reason: String,
    },
}

impl SpawnEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SpawnIdentified { .. } => "spawn_identified",
            Self::SpawnUnrecognized { .. } => "spawn_unrecognized",
            Self::NameLearned { .. } => "name_learned",
            Self::LearnFailed { .. } => "learn_failed",
        }
    }
}

#[derive(Serialize)]
struct JournalLine<'a> {
    #[serde(flatten)]
    event: &'a SpawnEvent,
    ts: String,
}

/// Append-only writer for the spawn journal (`events.jsonl`).
///
/// Clones share one file lock, so lines from concurrent jobs never interleave.
#[derive(Debug, Clone)]
pub struct JournalWriter {
    inner: Arc<JournalTarget>,
}

#[derive(Debug)]
struct JournalTarget {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JournalWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(JournalTarget {
                path: path.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Appends `event` stamped with the current UTC time; returns the written line.
    pub fn record(&self, event: &SpawnEvent) -> anyhow::Result<Value> {
        let line = serde_json::to_value(JournalLine {
            event,
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
        })?;
        let encoded = serde_json::to_string(&line)?;

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let _guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        writeln!(file, "{encoded}")?;
        Ok(line)
    }
}
