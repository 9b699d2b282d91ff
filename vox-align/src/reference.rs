//! Reference translations and their process-wide cache.
//!
//! A [`ReferenceText`] holds one reference translation's books. The books
//! are read-mostly: the alignment engine force-splits them to mirror each
//! vernacular project's segmentation, so every book it mutates is recorded
//! and reloaded from its [`BookSource`] before the next alignment pass.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::warn;
use vox_core::{
    BlockMatchup, BookNum, BookScript, CharacterCatalog, MatchupError, Versification,
};

use crate::engine;

/// Injected services every alignment entry point needs.
#[derive(Clone, Copy)]
pub struct AlignmentServices<'a> {
    /// Versification the vernacular project is numbered under.
    pub vernacular: &'a dyn Versification,
    /// Versification the reference text is numbered under.
    pub reference: &'a dyn Versification,
    /// Character classification.
    pub catalog: &'a dyn CharacterCatalog,
}

/// Outcome of aligning one vernacular book.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AlignmentOutcome {
    /// The book was aligned.
    Aligned {
        /// The reference book was force-split and must be reloaded before
        /// its next use.
        reference_modified: bool,
    },
    /// The reference text has no counterpart for this book; every block was
    /// left unpaired.
    NoReferenceBook,
}

/// Errors raised while loading reference books from their backing store.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The reference text does not exist in the store.
    #[error("reference text {text_id} is not available")]
    MissingText {
        /// Identity of the reference text.
        text_id: String,
    },
    /// The reference text exists but could not be read.
    #[error("reference text {text_id} could not be read: {detail}")]
    Unreadable {
        /// Identity of the reference text.
        text_id: String,
        /// Human-readable failure description.
        detail: String,
    },
}

/// Backing store for reference books.
///
/// `vox-store` provides the file-backed implementation; tests inject
/// in-memory ones.
pub trait BookSource {
    /// Loads every book of a reference text.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] when the text is missing or unreadable.
    fn load_books(&self, text_id: &str) -> Result<Vec<BookScript>, SourceError>;

    /// Loads a single book of a reference text, `None` when the text does
    /// not include it.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] when the text is missing or unreadable.
    fn load_book(&self, text_id: &str, book_code: &str)
    -> Result<Option<BookScript>, SourceError>;

    /// Reports whether the book's backing file was replaced since it was
    /// last loaded.
    fn is_replaced(&self, text_id: &str, book_code: &str) -> bool;
}

/// One reference translation: an identity plus its books.
#[derive(Debug, Default)]
pub struct ReferenceText {
    id: String,
    books: HashMap<String, BookScript>,
    modified_books: HashSet<String>,
}

impl ReferenceText {
    /// Builds a reference text from loaded books.
    #[must_use]
    pub fn new(id: impl Into<String>, books: impl IntoIterator<Item = BookScript>) -> Self {
        Self {
            id: id.into(),
            books: books
                .into_iter()
                .map(|book| (book.id().to_owned(), book))
                .collect(),
            modified_books: HashSet::new(),
        }
    }

    /// Returns the reference text identity.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns a book by code.
    #[must_use]
    pub fn book(&self, book_code: &str) -> Option<&BookScript> {
        self.books.get(book_code)
    }

    /// Returns the books the engine force-split since the last reload.
    #[must_use]
    pub const fn modified_books(&self) -> &HashSet<String> {
        &self.modified_books
    }

    /// Pairs every block of a vernacular book with reference material.
    ///
    /// Splits are forced into both scripts first so each breaks at the
    /// other's clean verse breaks; reference-side splits mark the book
    /// modified. Blocks whose pairing cannot be reconciled are left in an
    /// explicitly unmatched state rather than reported as errors.
    pub fn apply_to(
        &mut self,
        vernacular: &mut BookScript,
        services: &AlignmentServices<'_>,
    ) -> AlignmentOutcome {
        let Ok(book) = BookNum::from_code(vernacular.id()) else {
            warn!(book = vernacular.id(), "book id is not canonical");
            return AlignmentOutcome::NoReferenceBook;
        };
        let Some(reference_book) = self.books.get_mut(vernacular.id()) else {
            return AlignmentOutcome::NoReferenceBook;
        };
        let reference_modified = engine::align(vernacular, reference_book, book, services);
        if reference_modified {
            self.modified_books.insert(vernacular.id().to_owned());
        }
        AlignmentOutcome::Aligned { reference_modified }
    }

    /// Builds a [`BlockMatchup`] whose splitting step aligns just the
    /// window around `block_index` against this reference text.
    ///
    /// When the reference has no counterpart book the window is built
    /// without a splitting step, leaving its blocks unpaired.
    ///
    /// # Errors
    ///
    /// Returns a [`MatchupError`] when the starting index does not exist.
    pub fn matchup_for_verse(
        &mut self,
        vernacular: &BookScript,
        block_index: usize,
        services: &AlignmentServices<'_>,
    ) -> Result<BlockMatchup, MatchupError> {
        let book = BookNum::from_code(vernacular.id()).ok();
        let reference_book = book.and_then(|_| self.books.get_mut(vernacular.id()));
        let (Some(book), Some(reference_book)) = (book, reference_book) else {
            return BlockMatchup::new(vernacular, block_index, services.catalog);
        };

        let mut reference_modified = false;
        let matchup =
            BlockMatchup::with_splitter(vernacular, block_index, services.catalog, |portion| {
                reference_modified = engine::align(portion, reference_book, book, services);
            })?;
        if reference_modified {
            self.modified_books.insert(vernacular.id().to_owned());
        }
        Ok(matchup)
    }

    /// Reloads every book the engine modified, plus any book whose backing
    /// file was replaced on disk.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] when a stale book cannot be re-read; the
    /// book keeps its previous content in that case.
    pub fn reload_stale(&mut self, source: &dyn BookSource) -> Result<(), SourceError> {
        let mut stale: HashSet<String> = std::mem::take(&mut self.modified_books);
        for code in self.books.keys() {
            if source.is_replaced(&self.id, code) {
                stale.insert(code.clone());
            }
        }
        for code in stale {
            if let Some(fresh) = source.load_book(&self.id, &code)? {
                self.books.insert(code, fresh);
            }
        }
        Ok(())
    }
}

/// By-identity cache of reference texts.
///
/// Each reference text is loaded once and refreshed incrementally: on every
/// subsequent access the books the engine marked modified, and the books
/// whose backing files were replaced, are reloaded before the text is
/// handed out.
pub struct ReferenceTextCache {
    source: Box<dyn BookSource>,
    texts: HashMap<String, ReferenceText>,
}

impl ReferenceTextCache {
    /// Builds an empty cache over a backing store.
    #[must_use]
    pub fn new(source: Box<dyn BookSource>) -> Self {
        Self {
            source,
            texts: HashMap::new(),
        }
    }

    /// Returns the reference text, loading or refreshing it as needed.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] when the text cannot be loaded or a stale
    /// book cannot be refreshed.
    pub fn get_or_load(&mut self, text_id: &str) -> Result<&mut ReferenceText, SourceError> {
        match self.texts.entry(text_id.to_owned()) {
            Entry::Occupied(entry) => {
                let text = entry.into_mut();
                text.reload_stale(self.source.as_ref())?;
                Ok(text)
            }
            Entry::Vacant(entry) => {
                let books = self.source.load_books(text_id)?;
                Ok(entry.insert(ReferenceText::new(text_id, books)))
            }
        }
    }

    /// Drops a cached text, forcing the next access to reload it.
    pub fn evict(&mut self, text_id: &str) {
        self.texts.remove(text_id);
    }
}
