//! Reference-text alignment for the Vox dramatised-script engine.
//!
//! Given a vernacular [`vox_core::BookScript`] and an independently
//! segmented reference translation of the same book, this crate pairs their
//! blocks verse by verse: it first forces splits into both sides so every
//! clean verse break in one text exists in the other, then walks the two
//! block lists with a pair of cursors, expanding each side to a common verse
//! chunk and pairing the chunks one-to-one or one-to-many. Alignment never
//! fails; whatever cannot be reconciled degrades to an explicit unmatched
//! state on the affected vernacular blocks for a human to resolve.

mod engine;
mod locations;
mod reference;

pub use locations::{VerseSplitLocation, verse_split_locations};
pub use reference::{
    AlignmentOutcome, AlignmentServices, BookSource, ReferenceText, ReferenceTextCache,
    SourceError,
};
