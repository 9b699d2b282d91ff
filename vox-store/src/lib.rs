//! Persistence for book scripts.
//!
//! Book scripts are stored one file per book, keyed by book code under a
//! per-text directory: human-readable JSON for project data and a compact
//! MessagePack snapshot format for bundles. [`FileBookSource`] adapts the
//! same layout to the alignment engine's [`BookSource`] seam and
//! fingerprints file modification times so the reference-text cache can
//! tell when a book was replaced on disk.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tracing::debug;
use vox_align::{BookSource, SourceError};
use vox_core::BookScript;

/// File extension of the JSON form.
const BOOK_EXTENSION: &str = "json";
/// File extension of the snapshot form.
const SNAPSHOT_EXTENSION: &str = "voxb";

/// Errors raised while reading or writing stored books.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The file could not be read or written.
    #[error("could not access {path}: {source}")]
    Io {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The JSON content could not be encoded or decoded.
    #[error("invalid book data in {path}: {source}")]
    Json {
        /// Path of the file.
        path: PathBuf,
        /// Underlying codec failure.
        source: serde_json::Error,
    },
    /// The snapshot could not be encoded.
    #[error("could not encode snapshot {path}: {source}")]
    SnapshotEncode {
        /// Path of the file.
        path: PathBuf,
        /// Underlying codec failure.
        source: rmp_serde::encode::Error,
    },
    /// The snapshot could not be decoded.
    #[error("invalid snapshot data in {path}: {source}")]
    SnapshotDecode {
        /// Path of the file.
        path: PathBuf,
        /// Underlying codec failure.
        source: rmp_serde::decode::Error,
    },
}

impl StoreError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_owned(),
            source,
        }
    }
}

/// Path of a book's JSON file under a directory.
#[must_use]
pub fn book_path(dir: &Path, book_id: &str) -> PathBuf {
    dir.join(format!("{book_id}.{BOOK_EXTENSION}"))
}

/// Path of a book's snapshot file under a directory.
#[must_use]
pub fn snapshot_path(dir: &Path, book_id: &str) -> PathBuf {
    dir.join(format!("{book_id}.{SNAPSHOT_EXTENSION}"))
}

/// Saves a book as JSON under `dir`, returning the file path.
///
/// # Errors
///
/// Returns a [`StoreError`] when the directory cannot be created or the
/// file cannot be written.
pub fn save_book(dir: &Path, book: &BookScript) -> Result<PathBuf, StoreError> {
    fs::create_dir_all(dir).map_err(StoreError::io(dir))?;
    let path = book_path(dir, book.id());
    let payload = serde_json::to_vec_pretty(book).map_err(|source| StoreError::Json {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, payload).map_err(StoreError::io(&path))?;
    Ok(path)
}

/// Loads a book from its JSON file.
///
/// # Errors
///
/// Returns a [`StoreError`] when the file cannot be read or its content
/// does not describe a book.
pub fn load_book(path: &Path) -> Result<BookScript, StoreError> {
    let payload = fs::read(path).map_err(StoreError::io(path))?;
    serde_json::from_slice(&payload).map_err(|source| StoreError::Json {
        path: path.to_owned(),
        source,
    })
}

/// Saves a book as a compact snapshot under `dir`, returning the file path.
///
/// # Errors
///
/// Returns a [`StoreError`] when the directory cannot be created or the
/// snapshot cannot be encoded or written.
pub fn save_book_snapshot(dir: &Path, book: &BookScript) -> Result<PathBuf, StoreError> {
    fs::create_dir_all(dir).map_err(StoreError::io(dir))?;
    let path = snapshot_path(dir, book.id());
    // Named fields: blocks omit empty optional fields, which the positional
    // representation cannot round-trip.
    let payload = rmp_serde::to_vec_named(book).map_err(|source| StoreError::SnapshotEncode {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, payload).map_err(StoreError::io(&path))?;
    Ok(path)
}

/// Loads a book from its snapshot file.
///
/// # Errors
///
/// Returns a [`StoreError`] when the file cannot be read or decoded.
pub fn load_book_snapshot(path: &Path) -> Result<BookScript, StoreError> {
    let payload = fs::read(path).map_err(StoreError::io(path))?;
    rmp_serde::from_slice(&payload).map_err(|source| StoreError::SnapshotDecode {
        path: path.to_owned(),
        source,
    })
}

/// File-backed [`BookSource`] laid out as `root/{text_id}/{BOOK}.json`.
///
/// Modification times are fingerprinted at load, so
/// [`BookSource::is_replaced`] can report books whose backing file changed
/// since the alignment cache last read them.
#[derive(Debug, Default)]
pub struct FileBookSource {
    root: PathBuf,
    fingerprints: RefCell<HashMap<(String, String), SystemTime>>,
}

impl FileBookSource {
    /// Builds a source rooted at a directory of reference texts.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fingerprints: RefCell::new(HashMap::new()),
        }
    }

    fn text_dir(&self, text_id: &str) -> PathBuf {
        self.root.join(text_id)
    }

    fn record_fingerprint(&self, text_id: &str, book_id: &str, path: &Path) {
        if let Ok(modified) = fs::metadata(path).and_then(|metadata| metadata.modified()) {
            self.fingerprints
                .borrow_mut()
                .insert((text_id.to_owned(), book_id.to_owned()), modified);
        }
    }

    fn unreadable(text_id: &str, error: &StoreError) -> SourceError {
        SourceError::Unreadable {
            text_id: text_id.to_owned(),
            detail: error.to_string(),
        }
    }
}

impl BookSource for FileBookSource {
    fn load_books(&self, text_id: &str) -> Result<Vec<BookScript>, SourceError> {
        let dir = self.text_dir(text_id);
        let entries = fs::read_dir(&dir).map_err(|_| SourceError::MissingText {
            text_id: text_id.to_owned(),
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .is_some_and(|extension| extension == BOOK_EXTENSION)
            })
            .collect();
        paths.sort();

        let mut books = Vec::with_capacity(paths.len());
        for path in paths {
            let book = load_book(&path).map_err(|error| Self::unreadable(text_id, &error))?;
            self.record_fingerprint(text_id, book.id(), &path);
            books.push(book);
        }
        debug!(text = text_id, count = books.len(), "loaded reference text");
        Ok(books)
    }

    fn load_book(
        &self,
        text_id: &str,
        book_code: &str,
    ) -> Result<Option<BookScript>, SourceError> {
        let path = book_path(&self.text_dir(text_id), book_code);
        if !path.exists() {
            return Ok(None);
        }
        let book = load_book(&path).map_err(|error| Self::unreadable(text_id, &error))?;
        self.record_fingerprint(text_id, book_code, &path);
        Ok(Some(book))
    }

    fn is_replaced(&self, text_id: &str, book_code: &str) -> bool {
        let key = (text_id.to_owned(), book_code.to_owned());
        let Some(recorded) = self.fingerprints.borrow().get(&key).copied() else {
            return false;
        };
        let path = book_path(&self.text_dir(text_id), book_code);
        fs::metadata(&path)
            .and_then(|metadata| metadata.modified())
            .is_ok_and(|current| current != recorded)
    }
}
