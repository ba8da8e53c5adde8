//! One-file-per-call persistence in an output directory.
//!
//! Files are created with `create_new`, so an existing file with the same
//! name is never overwritten and the existence check cannot race the write.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::record::RECORD_EXTENSION;

/// Errors from the record store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing file name that is not a plain name: {name:?}")]
    InvalidName { name: String },

    #[error("Write to {path} did not finish within {timeout:?}")]
    Timeout { path: PathBuf, timeout: Duration },

    #[error("Failed to list {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What a write attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file was created.
    Written,
    /// A file with that name already existed; nothing was written.
    AlreadyExists,
}

/// Directory that holds one text file per decoded call.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Use `dir` as the output directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// Use `dir` without touching the filesystem.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path for `file_name`, which must be a single plain component.
    pub fn record_path(&self, file_name: &str) -> Result<PathBuf, StorageError> {
        let mut components = Path::new(file_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.dir.join(file_name)),
            _ => Err(StorageError::InvalidName {
                name: file_name.to_string(),
            }),
        }
    }

    /// Write `content` to `file_name` unless that file already exists.
    pub fn write_if_absent(
        &self,
        file_name: &str,
        content: &str,
    ) -> Result<WriteOutcome, StorageError> {
        let path = self.record_path(file_name)?;
        let write_err = |source| StorageError::Write {
            path: path.clone(),
            source,
        };

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("Call file already exists, skipping: {}", path.display());
                return Ok(WriteOutcome::AlreadyExists);
            }
            Err(e) => return Err(write_err(e)),
        };

        file.write_all(content.as_bytes()).map_err(write_err)?;
        file.flush().map_err(write_err)?;

        info!("Wrote call file {}", path.display());
        Ok(WriteOutcome::Written)
    }

    /// Names of the call files in the directory, sorted.
    pub fn list_records(&self) -> Result<Vec<String>, StorageError> {
        let list_err = |source| StorageError::List {
            path: self.dir.clone(),
            source,
        };

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(list_err)? {
            let path = entry.map_err(list_err)?.path();
            if path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read back a stored call file.
    pub fn read_record(&self, file_name: &str) -> std::io::Result<String> {
        let path = self
            .record_path(file_name)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidInput, e.to_string()))?;
        fs::read_to_string(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_new_file() {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::open(tmp.path()).unwrap();

        let outcome = store
            .write_if_absent("Distress 01.01.2024 - 00-00-00.000.txt", "Type: Distress\n")
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(
            store
                .read_record("Distress 01.01.2024 - 00-00-00.000.txt")
                .unwrap(),
            "Type: Distress\n"
        );
    }

    #[test]
    fn test_never_overwrites() {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::open(tmp.path()).unwrap();

        store.write_if_absent("a.txt", "first").unwrap();
        let outcome = store.write_if_absent("a.txt", "second").unwrap();

        assert_eq!(outcome, WriteOutcome::AlreadyExists);
        assert_eq!(store.read_record("a.txt").unwrap(), "first");
    }

    #[test]
    fn test_creates_output_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested/calls");
        let store = RecordStore::open(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(store.dir(), dir.as_path());
    }

    #[test]
    fn test_write_failure_is_reported() {
        let tmp = TempDir::new().unwrap();
        let not_a_dir = tmp.path().join("file");
        fs::write(&not_a_dir, "x").unwrap();

        let store = RecordStore::new(&not_a_dir);
        let err = store.write_if_absent("a.txt", "content").unwrap_err();
        assert!(matches!(err, StorageError::Write { .. }));
    }

    #[test]
    fn test_rejects_names_leaving_the_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("calls");
        let store = RecordStore::open(&dir).unwrap();

        for name in ["../Escaped.txt", "Ship/Shore.txt", "..", "/tmp/abs.txt", ""] {
            let err = store.write_if_absent(name, "content").unwrap_err();
            assert!(matches!(err, StorageError::InvalidName { .. }), "{}", name);
        }

        assert!(!tmp.path().join("Escaped.txt").exists());
        assert!(store.list_records().unwrap().is_empty());
        assert!(store.read_record("../Escaped.txt").is_err());
    }

    #[test]
    fn test_list_records() {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::open(tmp.path()).unwrap();

        store.write_if_absent("b.txt", "").unwrap();
        store.write_if_absent("a.txt", "").unwrap();
        fs::write(tmp.path().join("audio.wav"), "").unwrap();
        fs::create_dir(tmp.path().join("sub.txt")).unwrap();

        assert_eq!(store.list_records().unwrap(), vec!["a.txt", "b.txt"]);
    }
}
