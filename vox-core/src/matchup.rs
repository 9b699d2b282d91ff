//! A verse-aligned, mutable working window over a book's blocks.
//!
//! A matchup clones the minimal window of contiguous blocks around a
//! starting block whose edges fall on clean verse breaks, lets callers
//! split and annotate the cloned window, and then commits the outcome back
//! to the exact original index range. The owning book is never touched
//! until [`BlockMatchup::apply`].

use std::ops::Range;

use crate::block::Block;
use crate::book::BookScript;
use crate::error::MatchupError;
use crate::portion::PortionScript;
use crate::speakers::{CharacterCatalog, StandardSpeaker};

/// Outcome of inspecting a matchup window.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MatchState {
    /// Every scripture block in the window carries a reference pairing.
    pub matched: bool,
    /// No block's speaker is still unresolved.
    pub complete: bool,
}

impl MatchState {
    /// Reports whether the window is ready to commit and record.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        self.matched && self.complete
    }
}

/// Verse-aligned working window over a [`BookScript`].
#[derive(Clone, Debug)]
pub struct BlockMatchup {
    book_id: String,
    window: Range<usize>,
    portion: PortionScript,
    added_by_splitter: usize,
}

impl BlockMatchup {
    /// Builds the window around `start_index` without running a splitter.
    ///
    /// # Errors
    ///
    /// Returns [`MatchupError::StartOutOfRange`] when the index does not
    /// exist in the book.
    pub fn new(
        book: &BookScript,
        start_index: usize,
        catalog: &dyn CharacterCatalog,
    ) -> Result<Self, MatchupError> {
        Self::with_splitter(book, start_index, catalog, |_| {})
    }

    /// Builds the window and runs a caller-supplied splitting step on the
    /// cloned blocks, recording how many blocks the step added.
    ///
    /// # Errors
    ///
    /// Returns [`MatchupError::StartOutOfRange`] when the index does not
    /// exist in the book.
    pub fn with_splitter(
        book: &BookScript,
        start_index: usize,
        catalog: &dyn CharacterCatalog,
        splitter: impl FnOnce(&mut PortionScript),
    ) -> Result<Self, MatchupError> {
        if start_index >= book.len() {
            return Err(MatchupError::StartOutOfRange {
                index: start_index,
                book: book.id().to_owned(),
            });
        }

        let blocks = book.blocks();
        let mut start = start_index;
        while start > 0 && !starts_clean(blocks, start, catalog) {
            start -= 1;
        }
        let mut end = start_index + 1;
        while end < blocks.len() && !starts_clean(blocks, end, catalog) {
            end += 1;
        }

        let window = start..end;
        let mut portion = PortionScript::new(book.id(), blocks[window.clone()].iter().cloned());
        let before = portion.len();
        splitter(&mut portion);
        let added_by_splitter = portion.len().saturating_sub(before);
        Ok(Self {
            book_id: book.id().to_owned(),
            window,
            portion,
            added_by_splitter,
        })
    }

    /// Returns the index range the window was cloned from.
    #[must_use]
    pub fn original_range(&self) -> Range<usize> {
        self.window.clone()
    }

    /// Returns the working copy.
    #[must_use]
    pub const fn portion(&self) -> &PortionScript {
        &self.portion
    }

    /// Returns a working-copy block mutably, for speaker edits.
    pub fn block_mut(&mut self, index: usize) -> Option<&mut Block> {
        self.portion.block_mut(index)
    }

    /// Returns how many blocks the splitting step added.
    #[must_use]
    pub const fn added_by_splitter(&self) -> usize {
        self.added_by_splitter
    }

    /// Inspects the working copy.
    ///
    /// The window is `matched` when every block carries a resolved
    /// reference pairing (extra-biblical blocks are exempt: the engine may
    /// leave them unpaired) and `complete` when no speaker remains
    /// unresolved.
    #[must_use]
    pub fn match_state(&self, catalog: &dyn CharacterCatalog) -> MatchState {
        let matched = self.portion.blocks().iter().all(|block| {
            block.matches_reference_text() || catalog.is_extra_biblical(block.speaker_in_script())
        });
        let complete = self
            .portion
            .blocks()
            .iter()
            .all(|block| !block.speaker().is_unclear());
        MatchState { matched, complete }
    }

    /// Commits the window back to the owning book.
    ///
    /// When the splitting step added blocks, the original window is
    /// replaced wholesale by the (longer) working copy. Otherwise each
    /// original block receives its working copy's reference pairing and,
    /// where the speaker was changed to follow the reference text, the new
    /// speaker and script override. Returns the number of blocks added.
    ///
    /// # Errors
    ///
    /// Returns [`MatchupError::WrongBook`] for a different book than the
    /// window was built from, [`MatchupError::WindowInvalidated`] when the
    /// book shrank underneath the window, and
    /// [`MatchupError::NotFullyMatched`] when unmatched blocks remain;
    /// invoking `apply` in that state is a programming error.
    pub fn apply(
        &self,
        book: &mut BookScript,
        catalog: &dyn CharacterCatalog,
    ) -> Result<usize, MatchupError> {
        if book.id() != self.book_id {
            return Err(MatchupError::WrongBook {
                expected: self.book_id.clone(),
                actual: book.id().to_owned(),
            });
        }
        if self.window.end > book.len() {
            return Err(MatchupError::WindowInvalidated {
                start: self.window.start,
                end: self.window.end,
                book: self.book_id.clone(),
            });
        }
        if !self.match_state(catalog).matched {
            return Err(MatchupError::NotFullyMatched {
                book: self.book_id.clone(),
            });
        }

        if self.added_by_splitter > 0 {
            book.replace_window(self.window.clone(), self.portion.blocks().to_vec());
            return Ok(self.added_by_splitter);
        }

        for (offset, working) in self.portion.blocks().iter().enumerate() {
            let Some(live) = book.block_mut(self.window.start + offset) else {
                continue;
            };
            if working.matches_reference_text() {
                live.set_matched_reference(working.reference_blocks().to_vec());
            } else if !working.reference_blocks().is_empty() {
                live.set_unmatched_reference(working.reference_blocks().to_vec());
            }
            if live.speaker() != working.speaker() {
                live.set_speaker(working.speaker().clone());
                match working.speaker_override() {
                    Some(choice) => live.set_speaker_override(choice),
                    None => live.clear_speaker_override(),
                }
            }
        }
        Ok(0)
    }
}

/// Reports whether the block at `index` opens on a clean verse break.
fn starts_clean(blocks: &[Block], index: usize, catalog: &dyn CharacterCatalog) -> bool {
    let Some(block) = blocks.get(index) else {
        return true;
    };
    block.starts_at_verse_start()
        || catalog.standard_kind(block.speaker_in_script())
            == Some(StandardSpeaker::ChapterAnnouncement)
}
