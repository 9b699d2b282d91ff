//! Common testing utilities shared across workspace crates.
//!
//! The helpers here let integration and unit tests build realistic block
//! fixtures without duplicating small but noisy setup code: a block
//! builder, two fixture versifications, and an in-memory character
//! catalogue.

use std::collections::HashMap;

use vox_core::{
    Block, BlockElement, BookNum, BookScript, MultiBlockQuote, PortionScript, Speaker,
    SplitError, StandardSpeaker, VerseRef, VerseSpan, Versification,
};

/// Fluent builder for test blocks.
///
/// # Examples
///
/// ```
/// use vox_test_helpers::BlockBuilder;
///
/// let block = BlockBuilder::new("p", 1)
///     .verse("2", "As it is written, ")
///     .verse("3", "a voice cries out. ")
///     .speaker("narrator-MRK")
///     .build();
/// assert_eq!(block.initial_start_verse(), 2);
/// assert_eq!(block.last_verse(), 3);
/// ```
#[derive(Clone, Debug)]
pub struct BlockBuilder {
    block: Block,
    positioned: bool,
}

impl BlockBuilder {
    /// Starts a paragraph-opening block in the given chapter.
    #[must_use]
    pub fn new(style_tag: &str, chapter: u32) -> Self {
        let mut block = Block::new(style_tag, chapter, VerseSpan::single(1));
        block.set_paragraph_start(true);
        Self {
            block,
            positioned: false,
        }
    }

    /// Appends a verse marker followed by its text.
    ///
    /// # Panics
    ///
    /// Panics when the label is not a valid verse number or bridge; test
    /// fixtures must be well-formed.
    #[must_use]
    pub fn verse(mut self, label: &str, words: &str) -> Self {
        let marker = BlockElement::verse(label)
            .unwrap_or_else(|error| panic!("fixture verse label {label:?} invalid: {error}"));
        if !self.positioned {
            if let Some(number) = marker.as_verse() {
                self.block = reposition(&self.block, number.span());
            }
            self.positioned = true;
        }
        self.block.push_element(marker);
        self.block.push_element(BlockElement::text(words));
        self
    }

    /// Opens the block with marker-less text inherited from `span`.
    ///
    /// # Panics
    ///
    /// Panics when the label is not a valid verse number or bridge.
    #[must_use]
    pub fn leading_text(mut self, span: &str, words: &str) -> Self {
        let span: VerseSpan = span
            .parse()
            .unwrap_or_else(|error| panic!("fixture span {span:?} invalid: {error}"));
        self.block = reposition(&self.block, span);
        self.positioned = true;
        self.block.push_element(BlockElement::text(words));
        self
    }

    /// Assigns the speaker.
    #[must_use]
    pub fn speaker(mut self, speaker_id: &str) -> Self {
        self.block.set_speaker(Speaker::from(speaker_id.to_owned()));
        self
    }

    /// Assigns a delivery note.
    #[must_use]
    pub fn delivery(mut self, delivery: &str) -> Self {
        self.block.set_delivery(Some(delivery.to_owned()));
        self
    }

    /// Marks the speaker decision as user confirmed.
    #[must_use]
    pub fn confirmed(mut self) -> Self {
        self.block.set_user_confirmed(true);
        self
    }

    /// Clears the paragraph-start flag set by [`BlockBuilder::new`].
    #[must_use]
    pub fn flowing(mut self) -> Self {
        self.block.set_paragraph_start(false);
        self
    }

    /// Assigns the multi-block quote state.
    #[must_use]
    pub fn quote(mut self, state: MultiBlockQuote) -> Self {
        self.block.set_multi_block_quote(state);
        self
    }

    /// Returns the finished block.
    #[must_use]
    pub fn build(self) -> Block {
        self.block
    }
}

/// Rebuilds a block at a new initial span, preserving metadata so the
/// builder can defer positioning until the first content call.
fn reposition(block: &Block, span: VerseSpan) -> Block {
    let mut repositioned = Block::new(block.style_tag(), block.chapter(), span);
    repositioned.set_paragraph_start(block.is_paragraph_start());
    repositioned
}

/// Builds a book script from finished blocks.
#[must_use]
pub fn book_of(book_id: &str, blocks: impl IntoIterator<Item = Block>) -> BookScript {
    BookScript::new(book_id, blocks)
}

/// Builds a portion script from finished blocks.
#[must_use]
pub fn portion_of(book_id: &str, blocks: impl IntoIterator<Item = Block>) -> PortionScript {
    PortionScript::new(book_id, blocks)
}

/// Unwraps a split result, panicking with context on failure.
///
/// # Panics
///
/// Panics when the split was rejected; tests call this when the split must
/// succeed for the scenario to proceed.
#[must_use]
pub fn expect_split(result: Result<usize, SplitError>, context: &str) -> usize {
    match result {
        Ok(index) => index,
        Err(error) => panic!("{context}: split must succeed: {error}"),
    }
}

/// Returns the spoken text of each paired reference block.
#[must_use]
pub fn paired_text(block: &Block) -> Vec<String> {
    block
        .reference_blocks()
        .iter()
        .map(Block::text)
        .collect()
}

/// Versification that maps every reference to itself.
#[derive(Clone, Debug)]
pub struct OneToOneVersification {
    name: String,
}

impl OneToOneVersification {
    /// Builds the scheme under a display name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
        }
    }
}

impl Versification for OneToOneVersification {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn to_canonical(&self, reference: VerseRef) -> VerseRef {
        reference
    }

    fn from_canonical(&self, reference: VerseRef) -> VerseRef {
        reference
    }
}

/// Versification that numbers a short run of verses from the end of a book
/// at an earlier position, the way some schemes number the doxology of
/// Romans as 14:24-26 rather than 16:25-27.
#[derive(Clone, Debug)]
pub struct RelocatedEndVersification {
    name: String,
    book: BookNum,
    local_chapter: u32,
    local_first: u32,
    canonical_chapter: u32,
    canonical_first: u32,
    count: u32,
}

impl RelocatedEndVersification {
    /// Builds the scheme: verses `local_first..local_first + count` of
    /// `local_chapter` stand for the canonical verses starting at
    /// `canonical_chapter:canonical_first`.
    #[must_use]
    pub fn new(
        name: &str,
        book: BookNum,
        (local_chapter, local_first): (u32, u32),
        (canonical_chapter, canonical_first): (u32, u32),
        count: u32,
    ) -> Self {
        Self {
            name: name.to_owned(),
            book,
            local_chapter,
            local_first,
            canonical_chapter,
            canonical_first,
            count,
        }
    }
}

impl Versification for RelocatedEndVersification {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn to_canonical(&self, reference: VerseRef) -> VerseRef {
        if reference.book() == self.book
            && reference.chapter() == self.local_chapter
            && reference.verse() >= self.local_first
            && reference.verse() < self.local_first + self.count
        {
            return VerseRef::new(
                self.book,
                self.canonical_chapter,
                self.canonical_first + reference.verse() - self.local_first,
            );
        }
        reference
    }

    fn from_canonical(&self, reference: VerseRef) -> VerseRef {
        if reference.book() == self.book
            && reference.chapter() == self.canonical_chapter
            && reference.verse() >= self.canonical_first
            && reference.verse() < self.canonical_first + self.count
        {
            return VerseRef::new(
                self.book,
                self.local_chapter,
                self.local_first + reference.verse() - self.canonical_first,
            );
        }
        reference
    }
}

/// In-memory character catalogue for fixtures.
///
/// Standard speakers follow the `"{role}-{BOOK}"` convention, e.g.
/// `"chapter-MRK"`. Candidate speakers for verse ranges are registered per
/// test with [`FixtureCatalog::with_candidates`].
#[derive(Clone, Debug, Default)]
pub struct FixtureCatalog {
    candidates: HashMap<(u32, u32), Vec<(VerseSpan, Vec<String>)>>,
}

impl FixtureCatalog {
    /// Builds an empty catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers candidate speakers for a verse range.
    #[must_use]
    pub fn with_candidates(
        mut self,
        book: BookNum,
        chapter: u32,
        span: VerseSpan,
        speakers: &[&str],
    ) -> Self {
        self.candidates
            .entry((book.value(), chapter))
            .or_default()
            .push((span, speakers.iter().map(|id| (*id).to_owned()).collect()));
        self
    }
}

impl vox_core::CharacterCatalog for FixtureCatalog {
    fn standard_kind(&self, speaker_id: &str) -> Option<StandardSpeaker> {
        let role = [
            ("book-title-", StandardSpeaker::BookTitle),
            ("chapter-", StandardSpeaker::ChapterAnnouncement),
            ("section-", StandardSpeaker::SectionHead),
            ("intro-", StandardSpeaker::Intro),
            ("narrator-", StandardSpeaker::Narrator),
        ];
        role.into_iter()
            .find(|(prefix, _)| speaker_id.starts_with(prefix))
            .map(|(_, kind)| kind)
    }

    fn standard_speaker(&self, book: BookNum, kind: StandardSpeaker) -> String {
        let prefix = match kind {
            StandardSpeaker::BookTitle => "book-title",
            StandardSpeaker::ChapterAnnouncement => "chapter",
            StandardSpeaker::SectionHead => "section",
            StandardSpeaker::Intro => "intro",
            StandardSpeaker::Narrator => "narrator",
        };
        format!("{prefix}-{}", book.code())
    }

    fn matching_speakers(
        &self,
        book: BookNum,
        chapter: u32,
        span: VerseSpan,
        _versification: &dyn Versification,
    ) -> Vec<String> {
        self.candidates
            .get(&(book.value(), chapter))
            .into_iter()
            .flatten()
            .filter(|(candidate_span, _)| {
                candidate_span.start() <= span.end() && span.start() <= candidate_span.end()
            })
            .flat_map(|(_, speakers)| speakers.iter().cloned())
            .collect()
    }
}
