//! Error types for the splitting and matchup primitives.
//!
//! Invalid split requests are contract violations by the caller, so each
//! variant states the violated precondition. Alignment problems never
//! surface here; the engine degrades to explicit unmatched state instead.

use thiserror::Error;

/// Error raised when a split request cannot be honoured.
///
/// A failed split leaves the script completely unmodified; index mutation
/// happens only after the element-level split has succeeded.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SplitError {
    /// The named block index does not exist in the script.
    #[error("block index {index} is out of range for {book}")]
    BlockNotFound {
        /// The rejected index.
        index: usize,
        /// Book id of the script.
        book: String,
    },
    /// The block does not contain the requested verse.
    #[error("verse {verse} was not found in the block")]
    VerseNotFound {
        /// The verse label that was requested.
        verse: String,
    },
    /// The verse marker was found but no text run follows it.
    #[error("verse {verse} has no text run to split")]
    NoTextRun {
        /// The verse label that was requested.
        verse: String,
    },
    /// The character offset fell outside the text run.
    #[error("offset {offset} is outside the run of {length} characters")]
    OffsetOutOfRange {
        /// The rejected offset.
        offset: usize,
        /// Character length of the run.
        length: usize,
    },
    /// A boundary split was requested where no quote continuation follows.
    #[error("block {index} is not followed by a continuation of the same quote")]
    NoQuoteBoundary {
        /// Index of the block that was to end the first part.
        index: usize,
    },
    /// A multi-choice speaker id needs a versification to resolve, and none
    /// was supplied.
    #[error("resolving speaker {speaker:?} requires a versification")]
    VersificationRequired {
        /// The multi-choice speaker id.
        speaker: String,
    },
}

/// Error raised by [`crate::BlockMatchup`] construction and write-back.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum MatchupError {
    /// The starting block index does not exist in the book.
    #[error("block index {index} is out of range for {book}")]
    StartOutOfRange {
        /// The rejected index.
        index: usize,
        /// Book id of the script.
        book: String,
    },
    /// `apply` was handed a different book than the window was built from.
    #[error("matchup window belongs to {expected}, not {actual}")]
    WrongBook {
        /// Book the window was built from.
        expected: String,
        /// Book that was supplied.
        actual: String,
    },
    /// `apply` was invoked while blocks in the window remain unmatched.
    #[error("matchup window for {book} still contains unmatched blocks")]
    NotFullyMatched {
        /// Book id of the window.
        book: String,
    },
    /// The book shrank underneath the window between construction and apply.
    #[error("matchup window {start}..{end} no longer fits {book}")]
    WindowInvalidated {
        /// Window start index.
        start: usize,
        /// Window end index (exclusive).
        end: usize,
        /// Book id of the window.
        book: String,
    },
}
