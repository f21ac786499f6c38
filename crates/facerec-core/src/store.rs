//! Persisted feature database and LBPH label map.
//!
//! Both are small JSON files, loaded once at startup and rewritten whole on
//! save. Writes go through a temporary file in the destination directory and
//! a rename, so a failed save leaves the previous file untouched.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("corrupt data in {path}: {reason}")]
    CorruptData { path: String, reason: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Enrolled face embeddings as two index-aligned sequences.
///
/// Serialized as `{"encodings": [...], "names": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureDatabase {
    encodings: Vec<Vec<f32>>,
    names: Vec<String>,
}

impl FeatureDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a database from `path`.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let db: FeatureDatabase = read_json(path)?;
        if db.encodings.len() != db.names.len() {
            return Err(StoreError::CorruptData {
                path: path.display().to_string(),
                reason: format!(
                    "{} encodings but {} names",
                    db.encodings.len(),
                    db.names.len()
                ),
            });
        }
        tracing::info!(path = %path.display(), records = db.len(), "loaded feature database");
        Ok(db)
    }

    /// Load a database, falling back to an empty one if the file is missing
    /// or unreadable.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(db) => db,
            Err(StoreError::NotFound(_)) => {
                tracing::info!(path = %path.display(), "no feature database yet; starting empty");
                Self::new()
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "could not load feature database; starting empty"
                );
                Self::new()
            }
        }
    }

    /// Append one record. The same label may appear any number of times.
    pub fn append(&mut self, label: impl Into<String>, feature: Vec<f32>) {
        self.names.push(label.into());
        self.encodings.push(feature);
    }

    /// Write the whole database to `path`, replacing any previous file.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        write_json_atomic(path, self)?;
        tracing::info!(path = %path.display(), records = self.len(), "saved feature database");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate `(label, feature)` records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.encodings.iter().map(Vec::as_slice))
    }

    pub fn last(&self) -> Option<(&str, &[f32])> {
        self.records().last()
    }

    /// Distinct labels with their sample counts, in first-seen order.
    pub fn label_counts(&self) -> Vec<(&str, usize)> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for name in &self.names {
            match counts.iter_mut().find(|(label, _)| *label == name.as_str()) {
                Some((_, count)) => *count += 1,
                None => counts.push((name.as_str(), 1)),
            }
        }
        counts
    }
}

/// Bijective map from LBPH integer label IDs to display labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelMap {
    labels: BTreeMap<i32, String>,
}

impl LabelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the ID for `label`, assigning the next sequential ID the first
    /// time a label is seen.
    pub fn assign(&mut self, label: &str) -> i32 {
        if let Some((&id, _)) = self.labels.iter().find(|(_, l)| l.as_str() == label) {
            return id;
        }
        let id = self.labels.len() as i32;
        self.labels.insert(id, label.to_string());
        id
    }

    pub fn get(&self, id: i32) -> Option<&str> {
        self.labels.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &str)> {
        self.labels.iter().map(|(&id, label)| (id, label.as_str()))
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let map: LabelMap = read_json(path)?;
        tracing::info!(path = %path.display(), labels = map.len(), "loaded label map");
        Ok(map)
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        write_json_atomic(path, self)
    }
}

/// Read and deserialize a JSON file.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path.display().to_string())
        } else {
            StoreError::Io(e)
        }
    })?;

    serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptData {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Serialize `value` as JSON and atomically replace `path` with it.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec(value)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}
