//! Ordered block list shared by working copies and full book scripts.
//!
//! A `PortionScript` is the substrate every splitting operation runs on: a
//! book id plus an ordered list of blocks, without the chapter acceleration
//! or persistence concerns of a full [`crate::BookScript`]. Working windows
//! and in-memory reference books are portion scripts that get discarded once
//! their changes are committed back.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::block::{Block, MultiBlockQuote, SplitId, SplitOffset};
use crate::error::SplitError;
use crate::refs::{BookNum, VerseSpan, Versification};
use crate::speakers::{CharacterCatalog, Speaker};

/// Upper bound on placeholder reference-chain depth. Chains deeper than
/// this indicate corrupted data rather than a legitimate reference stack.
const MAX_REFERENCE_CHAIN_DEPTH: usize = 8;

/// Where a split request cuts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SplitPoint {
    /// Record a split on the boundary between a block and the following
    /// continuation of the same multi-block quote.
    BetweenBlocks,
    /// Cut inside the named verse of the block.
    Within {
        /// Verse label as present in the block (`"5"` or `"5-7"`).
        verse: String,
        /// Character offset inside the verse's text run.
        offset: SplitOffset,
    },
}

/// Injected services consulted when a split must resolve a speaker.
#[derive(Clone, Copy)]
pub struct SplitServices<'a> {
    /// Character classification, needed to resolve multi-choice speakers.
    pub catalog: Option<&'a dyn CharacterCatalog>,
    /// Versification of the script, needed to resolve multi-choice speakers.
    pub versification: Option<&'a dyn Versification>,
}

impl SplitServices<'_> {
    /// Services for calls that never resolve speakers.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            catalog: None,
            versification: None,
        }
    }
}

/// A split request against a script.
///
/// Engine-driven splits inherit the original block's speaker state;
/// user-driven splits reset the new block to an unknown speaker unless a
/// resolved speaker id is supplied.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SplitRequest {
    /// Index of the block to split.
    pub block_index: usize,
    /// Where to cut.
    pub point: SplitPoint,
    /// Whether a user initiated the split (affects speaker and quote state
    /// on the new block).
    pub user_split: bool,
    /// Speaker to assign to the new block instead of the user-split
    /// default.
    pub speaker: Option<String>,
}

impl SplitRequest {
    /// Builds an engine-driven split request.
    #[must_use]
    pub const fn engine(block_index: usize, point: SplitPoint) -> Self {
        Self {
            block_index,
            point,
            user_split: false,
            speaker: None,
        }
    }

    /// Builds a user-driven split request.
    #[must_use]
    pub const fn user(block_index: usize, point: SplitPoint) -> Self {
        Self {
            block_index,
            point,
            user_split: true,
            speaker: None,
        }
    }

    /// Assigns a speaker for the new block.
    #[must_use]
    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }
}

/// Read/split access shared by portion and book scripts.
///
/// The alignment engine is generic over this trait so the same walk works
/// on a full book and on a matchup window.
pub trait ScriptAccess {
    /// Returns the book id.
    fn id(&self) -> &str;

    /// Returns the ordered blocks.
    fn blocks(&self) -> &[Block];

    /// Returns a block mutably.
    fn block_mut(&mut self, index: usize) -> Option<&mut Block>;

    /// Splits a block so it ends exactly at `verse`; `false` when the verse
    /// cannot be located or the block already ends there.
    fn try_split_block_at_end_of_verse(&mut self, index: usize, verse: u32) -> bool;
}

/// Lightweight ordered block list for one book.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PortionScript {
    id: String,
    blocks: Vec<Block>,
}

impl PortionScript {
    /// Builds a portion script over pre-existing blocks.
    #[must_use]
    pub fn new(id: impl Into<String>, blocks: impl IntoIterator<Item = Block>) -> Self {
        Self {
            id: id.into(),
            blocks: blocks.into_iter().collect(),
        }
    }

    /// Returns the book id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the ordered blocks.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        self.blocks.as_slice()
    }

    /// Returns a block by index.
    #[must_use]
    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Returns a block mutably.
    pub fn block_mut(&mut self, index: usize) -> Option<&mut Block> {
        self.blocks.get_mut(index)
    }

    /// Returns the block count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Reports whether the script holds no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Appends a block.
    pub fn push_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Replaces an index range with new blocks, returning the change in
    /// length.
    pub(crate) fn replace_range(
        &mut self,
        range: std::ops::Range<usize>,
        replacement: Vec<Block>,
    ) -> isize {
        let removed = range.len();
        let added = replacement.len();
        self.blocks.splice(range, replacement);
        added as isize - removed as isize
    }

    /// Splits a block, inserting the new block immediately after it.
    ///
    /// Returns the index of the block heading the second part: the inserted
    /// block for a [`SplitPoint::Within`] cut, or the existing following
    /// block for a [`SplitPoint::BetweenBlocks`] boundary. A `Within` cut
    /// that falls exactly at the block's existing end inserts nothing and
    /// returns the original index.
    ///
    /// # Errors
    ///
    /// Returns a [`SplitError`] when the request names a missing block or
    /// verse, the offset is out of range, no quote continuation follows a
    /// boundary split, or a multi-choice speaker cannot be resolved. A
    /// failed split leaves the script unmodified.
    pub fn split_block(
        &mut self,
        request: &SplitRequest,
        services: SplitServices<'_>,
    ) -> Result<usize, SplitError> {
        let index = request.block_index;
        if index >= self.blocks.len() {
            return Err(SplitError::BlockNotFound {
                index,
                book: self.id.clone(),
            });
        }

        // Resolve the speaker before any mutation so a failed resolution
        // leaves the script untouched.
        let assigned = match request.speaker.as_deref() {
            Some(speaker) => Some(self.resolve_split_speaker(index, speaker, services)?),
            None => None,
        };
        let split_id = self.next_split_id(index);

        match &request.point {
            SplitPoint::BetweenBlocks => {
                self.split_between_blocks(index, split_id, request.user_split, assigned)
            }
            SplitPoint::Within { verse, offset } => {
                self.split_within(index, verse, *offset, split_id, request.user_split, assigned)
            }
        }
    }

    /// Splits a block so it ends exactly at `verse`.
    ///
    /// The verse number is resolved to the bridge label actually present in
    /// the block first; a verse that falls strictly inside a bridge cannot
    /// be cut and yields `false`. When the block carries a reference
    /// pairing, the pairing is repartitioned across the two halves,
    /// splitting the paired reference block at the same verse where
    /// possible and synthesising an empty placeholder chain where not, so
    /// the new block is never left unpaired.
    pub fn try_split_block_at_end_of_verse(&mut self, index: usize, verse: u32) -> bool {
        let Some(block) = self.blocks.get(index) else {
            return false;
        };
        let Some(label) = block.resolve_verse_label(verse) else {
            return false;
        };
        let Ok(span) = label.parse::<VerseSpan>() else {
            return false;
        };
        if span.end() != verse {
            // The verse sits inside a bridge; there is no boundary to cut.
            return false;
        }
        let had_reference = !block.reference_blocks().is_empty();
        let request = SplitRequest::engine(
            index,
            SplitPoint::Within {
                verse: label,
                offset: SplitOffset::EndOfVerse,
            },
        );
        match self.split_block(&request, SplitServices::none()) {
            Ok(new_index) if new_index != index => {
                if had_reference {
                    self.mirror_reference_split(index, new_index, verse);
                }
                true
            }
            Ok(_) => false,
            Err(error) => {
                debug!(book = self.id.as_str(), index, verse, %error, "end-of-verse split rejected");
                false
            }
        }
    }

    fn split_between_blocks(
        &mut self,
        index: usize,
        split_id: SplitId,
        user_split: bool,
        assigned: Option<(Speaker, Option<String>)>,
    ) -> Result<usize, SplitError> {
        let follower = index + 1;
        if !self
            .blocks
            .get(follower)
            .is_some_and(|block| block.multi_block_quote().is_continuation())
        {
            return Err(SplitError::NoQuoteBoundary { index });
        }

        self.blocks[index].set_split_id(split_id);
        self.blocks[follower].set_split_id(split_id);

        // The boundary breaks one quote run into two; re-derive both sides.
        let run_start = self.quote_run_start(index);
        if run_start == index {
            self.blocks[index].set_multi_block_quote(MultiBlockQuote::None);
        }
        let follower_heads_run = self
            .blocks
            .get(follower + 1)
            .is_some_and(|block| block.multi_block_quote().is_continuation());
        self.blocks[follower].set_multi_block_quote(if follower_heads_run {
            MultiBlockQuote::Start
        } else {
            MultiBlockQuote::None
        });

        if user_split {
            self.assign_split_speaker(follower, assigned);
        }
        Ok(follower)
    }

    fn split_within(
        &mut self,
        index: usize,
        verse: &str,
        offset: SplitOffset,
        split_id: SplitId,
        user_split: bool,
        assigned: Option<(Speaker, Option<String>)>,
    ) -> Result<usize, SplitError> {
        let original_quote = self.blocks[index].multi_block_quote();
        let Some(mut tail) = self.blocks[index].split(verse, offset)? else {
            return Ok(index);
        };

        self.blocks[index].set_split_id(split_id);
        tail.set_split_id(split_id);
        tail.set_multi_block_quote(Self::tail_quote_state(
            original_quote,
            user_split,
            self.blocks
                .get(index + 1)
                .is_some_and(|next| next.multi_block_quote().is_continuation()),
        ));
        if user_split && original_quote == MultiBlockQuote::Start {
            self.blocks[index].set_multi_block_quote(MultiBlockQuote::None);
        }

        let new_index = index + 1;
        self.blocks.insert(new_index, tail);
        if user_split {
            self.assign_split_speaker(new_index, assigned);
        }
        Ok(new_index)
    }

    /// Quote state for the block created by a within-verse split.
    fn tail_quote_state(
        original: MultiBlockQuote,
        user_split: bool,
        followed_by_continuation: bool,
    ) -> MultiBlockQuote {
        if user_split {
            match original {
                MultiBlockQuote::None => MultiBlockQuote::None,
                MultiBlockQuote::Start => MultiBlockQuote::Start,
                MultiBlockQuote::Continuation | MultiBlockQuote::ChangeOfDelivery => {
                    if followed_by_continuation {
                        MultiBlockQuote::Start
                    } else {
                        MultiBlockQuote::None
                    }
                }
            }
        } else if original.is_part_of_quote() {
            MultiBlockQuote::Continuation
        } else {
            MultiBlockQuote::None
        }
    }

    fn assign_split_speaker(&mut self, index: usize, assigned: Option<(Speaker, Option<String>)>) {
        let block = &mut self.blocks[index];
        match assigned {
            Some((speaker, resolved)) => {
                block.set_speaker(speaker);
                match resolved {
                    Some(choice) => block.set_speaker_override(choice),
                    None => block.clear_speaker_override(),
                }
            }
            None => {
                block.set_speaker(Speaker::Unknown);
                block.clear_speaker_override();
                block.set_user_confirmed(false);
            }
        }
    }

    fn resolve_split_speaker(
        &self,
        index: usize,
        speaker: &str,
        services: SplitServices<'_>,
    ) -> Result<(Speaker, Option<String>), SplitError> {
        let speaker = Speaker::character(speaker);
        if !speaker.is_multi_choice() {
            return Ok((speaker, None));
        }
        let Some(versification) = services.versification else {
            return Err(SplitError::VersificationRequired {
                speaker: speaker.as_str().to_owned(),
            });
        };
        let first_choice = || {
            speaker
                .as_str()
                .split('/')
                .next()
                .unwrap_or(speaker.as_str())
                .to_owned()
        };
        let resolved = match (services.catalog, BookNum::from_code(self.id.as_str())) {
            (Some(catalog), Ok(book)) => {
                let block = &self.blocks[index];
                let candidates = catalog.matching_speakers(
                    book,
                    block.chapter(),
                    block.initial_verses(),
                    versification,
                );
                candidates
                    .into_iter()
                    .find(|candidate| {
                        speaker
                            .as_str()
                            .split('/')
                            .any(|part| part == candidate.as_str())
                    })
                    .unwrap_or_else(first_choice)
            }
            _ => first_choice(),
        };
        Ok((speaker, Some(resolved)))
    }

    /// Allocates or reuses the split id for a block about to be split.
    fn next_split_id(&self, index: usize) -> SplitId {
        if let Some(existing) = self.blocks[index].split_id() {
            return existing;
        }
        let next = self
            .blocks
            .iter()
            .filter_map(Block::split_id)
            .map(SplitId::value)
            .max()
            .map_or(0, |max| max + 1);
        SplitId::new(next)
    }

    /// Index of the `Start` block of the quote run containing `index`.
    fn quote_run_start(&self, index: usize) -> usize {
        let mut start = index;
        while start > 0 && self.blocks[start].multi_block_quote().is_continuation() {
            start -= 1;
        }
        start
    }

    /// Repartitions a reference pairing across a freshly split block pair.
    fn mirror_reference_split(&mut self, head_index: usize, tail_index: usize, verse: u32) {
        let (reference_blocks, matched) = self.blocks[head_index].take_reference_blocks();
        let chain_depth = reference_blocks
            .first()
            .map_or(0, Self::reference_chain_depth);

        let mut head_refs = Vec::new();
        let mut tail_refs = Vec::new();
        for mut reference in reference_blocks {
            if reference.last_verse() <= verse {
                head_refs.push(reference);
            } else if reference.initial_start_verse() > verse {
                tail_refs.push(reference);
            } else {
                // The paired block spans the cut; split it at the same verse
                // when its own segmentation allows.
                let cut = reference
                    .resolve_verse_label(verse)
                    .filter(|label| {
                        label
                            .parse::<VerseSpan>()
                            .is_ok_and(|span| span.end() == verse)
                    })
                    .and_then(|label| {
                        reference
                            .split(&label, SplitOffset::EndOfVerse)
                            .ok()
                            .flatten()
                    });
                match cut {
                    Some(reference_tail) => {
                        head_refs.push(reference);
                        tail_refs.push(reference_tail);
                    }
                    None => {
                        warn!(
                            book = self.id.as_str(),
                            verse, "reference block could not mirror a vernacular split"
                        );
                        head_refs.push(reference);
                    }
                }
            }
        }

        if tail_refs.is_empty() {
            let tail_block = &self.blocks[tail_index];
            tail_refs.push(Self::placeholder_reference_chain(
                tail_block.style_tag(),
                tail_block.chapter(),
                tail_block.initial_verses(),
                chain_depth,
            ));
        }

        self.blocks[head_index].set_reference_blocks_raw(head_refs, matched);
        self.blocks[tail_index].set_reference_blocks_raw(tail_refs, true);
    }

    /// Depth of the chain reached by following each first reference block.
    fn reference_chain_depth(reference: &Block) -> usize {
        let mut depth = 0;
        let mut cursor = Some(reference);
        while let Some(block) = cursor {
            depth += 1;
            if depth >= MAX_REFERENCE_CHAIN_DEPTH {
                warn!("reference chain exceeds supported depth");
                break;
            }
            cursor = block.reference_blocks().first();
        }
        depth
    }

    /// Builds an empty reference block chained to the requested depth.
    fn placeholder_reference_chain(
        style_tag: &str,
        chapter: u32,
        initial: VerseSpan,
        depth: usize,
    ) -> Block {
        let mut placeholder = Block::new(style_tag, chapter, initial);
        if depth > 1 {
            placeholder.set_matched_reference(vec![Self::placeholder_reference_chain(
                style_tag,
                chapter,
                initial,
                depth - 1,
            )]);
        }
        placeholder
    }
}

impl ScriptAccess for PortionScript {
    fn id(&self) -> &str {
        self.id()
    }

    fn blocks(&self) -> &[Block] {
        self.blocks()
    }

    fn block_mut(&mut self, index: usize) -> Option<&mut Block> {
        self.block_mut(index)
    }

    fn try_split_block_at_end_of_verse(&mut self, index: usize, verse: u32) -> bool {
        self.try_split_block_at_end_of_verse(index, verse)
    }
}
