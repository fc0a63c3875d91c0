//! Enrolled-face store: a flat label → embedding mapping persisted as a
//! single JSON object, overwritten wholesale on every save.
//!
//! The store distinguishes "no file yet" (valid, start empty) from "file
//! present but unreadable" (error), and save failures propagate instead of
//! vanishing. Insertion order is preserved both in memory and on disk so
//! the matcher's first-inserted tie-break survives a restart.

use crate::types::Embedding;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read store file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write store file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("store file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("embedding for '{label}' has dimension {got}, store holds {expected}")]
    DimensionMismatch {
        label: String,
        got: usize,
        expected: usize,
    },
}

/// In-memory gallery of enrolled faces, backed by a flat JSON file.
#[derive(Debug)]
pub struct FaceStore {
    path: PathBuf,
    entries: Vec<(String, Embedding)>,
}

impl FaceStore {
    /// Load the store from disk.
    ///
    /// A missing file is a valid empty store; an unreadable or unparseable
    /// file is an error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        if !path.exists() {
            tracing::info!(path = %path.display(), "no face store file yet, starting empty");
            return Ok(Self {
                path,
                entries: Vec::new(),
            });
        }

        let raw = std::fs::read_to_string(&path).map_err(|source| StoreError::Read {
            path: path.clone(),
            source,
        })?;

        // serde_json's preserve_order keeps the file's key order, which is
        // the enrollment order.
        let map: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?;

        let mut entries = Vec::with_capacity(map.len());
        let mut expected_dim: Option<usize> = None;

        for (label, value) in map {
            let values: Vec<f32> =
                serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
                    path: path.clone(),
                    source,
                })?;

            match expected_dim {
                None => expected_dim = Some(values.len()),
                Some(dim) if dim != values.len() => {
                    return Err(StoreError::DimensionMismatch {
                        label,
                        got: values.len(),
                        expected: dim,
                    });
                }
                Some(_) => {}
            }

            entries.push((label, Embedding::new(values)));
        }

        tracing::info!(path = %path.display(), faces = entries.len(), "face store loaded");
        Ok(Self { path, entries })
    }

    /// Create an empty store that will persist to `path`. Used by tests and
    /// first-run setups where `load` semantics are not wanted.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Insert or replace an enrolled face.
    ///
    /// Re-enrolling a label overwrites its embedding in place, keeping its
    /// original position in insertion order.
    pub fn insert(&mut self, label: &str, embedding: Embedding) -> Result<(), StoreError> {
        if let Some((_, existing)) = self.entries.first() {
            if existing.dim() != embedding.dim() {
                return Err(StoreError::DimensionMismatch {
                    label: label.to_string(),
                    got: embedding.dim(),
                    expected: existing.dim(),
                });
            }
        }

        match self.entries.iter_mut().find(|(l, _)| l == label) {
            Some((_, slot)) => *slot = embedding,
            None => self.entries.push((label.to_string(), embedding)),
        }
        Ok(())
    }

    /// Serialize the full mapping to disk, overwriting prior contents.
    pub fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }

        let mut map = serde_json::Map::with_capacity(self.entries.len());
        for (label, embedding) in &self.entries {
            let values = embedding
                .values
                .iter()
                .map(|&v| serde_json::Value::from(v as f64))
                .collect::<Vec<_>>();
            map.insert(label.clone(), serde_json::Value::Array(values));
        }

        // Building the Value by hand cannot fail to serialize.
        let body = serde_json::Value::Object(map).to_string();

        std::fs::write(&self.path, body).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;

        tracing::debug!(path = %self.path.display(), faces = self.entries.len(), "face store saved");
        Ok(())
    }

    /// Enrolled faces in insertion order.
    pub fn entries(&self) -> &[(String, Embedding)] {
        &self.entries
    }

    /// Enrolled labels in insertion order.
    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|(l, _)| l.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "argus-store-{tag}-{}-{:?}.json",
            std::process::id(),
            std::thread::current().id()
        ))
    }

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let store = FaceStore::load(temp_path("missing")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_errors() {
        let path = temp_path("corrupt");
        std::fs::write(&path, "not json {").unwrap();
        let err = FaceStore::load(&path).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_mixed_dimensions_errors() {
        let path = temp_path("mixed");
        std::fs::write(&path, r#"{"a": [1.0, 2.0], "b": [1.0]}"#).unwrap();
        let err = FaceStore::load(&path).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_insert_replace_keeps_size_and_position() {
        let mut store = FaceStore::empty(temp_path("replace"));
        store.insert("alice", emb(&[1.0, 0.0])).unwrap();
        store.insert("bob", emb(&[0.0, 1.0])).unwrap();
        assert_eq!(store.len(), 2);

        store.insert("alice", emb(&[0.5, 0.5])).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.entries()[0].0, "alice");
        assert_eq!(store.entries()[0].1, emb(&[0.5, 0.5]));
        assert_eq!(store.entries()[1].0, "bob");
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let mut store = FaceStore::empty(temp_path("dim"));
        store.insert("alice", emb(&[1.0, 0.0])).unwrap();
        let err = store.insert("bob", emb(&[1.0])).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_save_load_roundtrip_preserves_order() {
        let path = temp_path("roundtrip");
        let mut store = FaceStore::empty(&path);
        store.insert("zed", emb(&[1.0, 2.0])).unwrap();
        store.insert("amy", emb(&[3.0, 4.0])).unwrap();
        store.save().unwrap();

        let reloaded = FaceStore::load(&path).unwrap();
        assert_eq!(reloaded.labels(), vec!["zed".to_string(), "amy".to_string()]);
        assert_eq!(reloaded.entries()[0].1, emb(&[1.0, 2.0]));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_save_overwrites_whole_file() {
        let path = temp_path("overwrite");
        let mut store = FaceStore::empty(&path);
        store.insert("alice", emb(&[1.0])).unwrap();
        store.insert("bob", emb(&[2.0])).unwrap();
        store.save().unwrap();

        // Drop one entry in a fresh store and save again; the file must no
        // longer mention the other label.
        let mut store2 = FaceStore::empty(&path);
        store2.insert("alice", emb(&[9.0])).unwrap();
        store2.save().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("alice"));
        assert!(!raw.contains("bob"));
        std::fs::remove_file(&path).ok();
    }
}
