//! One paragraph-level unit of script text with a single speaker.
//!
//! A block owns an ordered list of [`BlockElement`]s plus the speaker, style,
//! and quote-state metadata editors work with. Verse and chapter metadata is
//! derived from the element list on demand; the stored initial span is only
//! consulted when the block begins mid-verse and therefore inherits its
//! position from the preceding block.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::element::BlockElement;
use crate::error::SplitError;
use crate::refs::VerseSpan;
use crate::speakers::Speaker;

/// Position of a block within a quotation spanning several blocks.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiBlockQuote {
    /// The block is not part of a multi-block quotation.
    #[default]
    None,
    /// The block opens a multi-block quotation.
    Start,
    /// The block continues the quotation opened by an earlier `Start`.
    Continuation,
    /// The block continues the quotation with a different delivery.
    ChangeOfDelivery,
}

impl MultiBlockQuote {
    /// Reports whether the block belongs to a multi-block quotation.
    #[must_use]
    pub const fn is_part_of_quote(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Reports whether the block continues a quotation opened earlier.
    #[must_use]
    pub const fn is_continuation(self) -> bool {
        matches!(self, Self::Continuation | Self::ChangeOfDelivery)
    }
}

/// Identifier shared by the blocks produced from one original block.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct SplitId(u32);

impl SplitId {
    /// Builds an identifier from its raw value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

/// Where inside a verse an element-level split should cut.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SplitOffset {
    /// Cut immediately before the next verse marker.
    EndOfVerse,
    /// Cut after this many characters of the verse's text run.
    At(usize),
}

/// Rendering options for [`Block::text_with`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TextOptions {
    /// Render verse markers as `{N}`.
    pub include_verse_numbers: bool,
    /// Render production annotations through their script formatter.
    pub include_annotations: bool,
}

/// One paragraph/run-level unit of script text.
///
/// Cloning is a deep copy: the element list and any reference pairing are
/// owned, so working copies can be mutated freely without corrupting the
/// source script.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    style_tag: String,
    #[serde(default)]
    paragraph_start: bool,
    chapter: u32,
    initial_verses: VerseSpan,
    #[serde(default)]
    elements: Vec<BlockElement>,
    #[serde(default)]
    speaker: Speaker,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    speaker_override: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delivery: Option<String>,
    #[serde(default)]
    user_confirmed: bool,
    #[serde(default)]
    multi_block_quote: MultiBlockQuote,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    split_id: Option<SplitId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    reference_blocks: Vec<Block>,
    #[serde(default)]
    matches_reference_text: bool,
}

impl Block {
    /// Builds an empty block positioned at the given chapter and verse span.
    #[must_use]
    pub fn new(style_tag: impl Into<String>, chapter: u32, initial_verses: VerseSpan) -> Self {
        Self {
            style_tag: style_tag.into(),
            paragraph_start: false,
            chapter,
            initial_verses,
            elements: Vec::new(),
            speaker: Speaker::Unknown,
            speaker_override: None,
            delivery: None,
            user_confirmed: false,
            multi_block_quote: MultiBlockQuote::None,
            split_id: None,
            reference_blocks: Vec::new(),
            matches_reference_text: false,
        }
    }

    /// Returns the paragraph/run style identifier.
    #[must_use]
    pub fn style_tag(&self) -> &str {
        self.style_tag.as_str()
    }

    /// Reports whether the block opens a paragraph.
    #[must_use]
    pub const fn is_paragraph_start(&self) -> bool {
        self.paragraph_start
    }

    /// Marks or clears the paragraph-start flag.
    pub fn set_paragraph_start(&mut self, paragraph_start: bool) {
        self.paragraph_start = paragraph_start;
    }

    /// Returns the chapter the block belongs to.
    #[must_use]
    pub const fn chapter(&self) -> u32 {
        self.chapter
    }

    /// Returns the verse span the block begins in.
    ///
    /// When the block opens with a verse marker the span comes from that
    /// marker; otherwise the block begins mid-verse and the span inherited
    /// from the preceding block applies.
    #[must_use]
    pub fn initial_verses(&self) -> VerseSpan {
        self.leading_marker()
            .map_or(self.initial_verses, |marker| marker.span())
    }

    /// Returns the first verse the block begins in.
    #[must_use]
    pub fn initial_start_verse(&self) -> u32 {
        self.initial_verses().start()
    }

    /// Returns the last verse of the span the block begins in.
    #[must_use]
    pub fn initial_end_verse(&self) -> u32 {
        self.initial_verses().end()
    }

    /// Returns the last verse the block touches.
    #[must_use]
    pub fn last_verse(&self) -> u32 {
        self.last_verse_span().end()
    }

    /// Returns the span of the last verse marker, or the initial span when
    /// the block contains no markers.
    #[must_use]
    pub fn last_verse_span(&self) -> VerseSpan {
        self.elements
            .iter()
            .rev()
            .find_map(|element| element.as_verse())
            .map_or_else(|| self.initial_verses(), |marker| marker.span())
    }

    /// Reports whether the block starts exactly at a verse boundary.
    #[must_use]
    pub fn starts_at_verse_start(&self) -> bool {
        self.leading_marker().is_some()
    }

    /// Returns the stored elements.
    #[must_use]
    pub fn elements(&self) -> &[BlockElement] {
        self.elements.as_slice()
    }

    /// Appends an element, warning when verse-marker alternation is broken.
    ///
    /// A marker directly following another marker indicates a malformed
    /// source; the element is still recorded so no content is lost.
    pub fn push_element(&mut self, element: BlockElement) {
        if element.as_verse().is_some()
            && self
                .elements
                .last()
                .is_some_and(|last| last.as_verse().is_some())
        {
            warn!(
                style = self.style_tag.as_str(),
                chapter = self.chapter,
                "adjacent verse markers in block element list"
            );
        }
        self.elements.push(element);
    }

    /// Returns the speaker.
    #[must_use]
    pub const fn speaker(&self) -> &Speaker {
        &self.speaker
    }

    /// Assigns the speaker.
    pub fn set_speaker(&mut self, speaker: Speaker) {
        self.speaker = speaker;
    }

    /// Returns the resolved script speaker when the speaker id is a
    /// multi-choice group.
    #[must_use]
    pub fn speaker_override(&self) -> Option<&str> {
        self.speaker_override.as_deref()
    }

    /// Records a resolved choice for a multi-choice speaker id.
    pub fn set_speaker_override(&mut self, speaker: impl Into<String>) {
        self.speaker_override = Some(speaker.into());
    }

    /// Clears the resolved speaker choice.
    pub fn clear_speaker_override(&mut self) {
        self.speaker_override = None;
    }

    /// Returns the identity the recording script should use: the resolved
    /// override when present, else the speaker itself.
    #[must_use]
    pub fn speaker_in_script(&self) -> &str {
        self.speaker_override
            .as_deref()
            .unwrap_or_else(|| self.speaker.as_str())
    }

    /// Returns the delivery note, e.g. `"whispering"`.
    #[must_use]
    pub fn delivery(&self) -> Option<&str> {
        self.delivery.as_deref()
    }

    /// Assigns a delivery note.
    pub fn set_delivery(&mut self, delivery: Option<String>) {
        self.delivery = delivery;
    }

    /// Reports whether a user confirmed the speaker decision.
    #[must_use]
    pub const fn is_user_confirmed(&self) -> bool {
        self.user_confirmed
    }

    /// Records or clears user confirmation.
    pub fn set_user_confirmed(&mut self, confirmed: bool) {
        self.user_confirmed = confirmed;
    }

    /// Returns the multi-block quote state.
    #[must_use]
    pub const fn multi_block_quote(&self) -> MultiBlockQuote {
        self.multi_block_quote
    }

    /// Assigns the multi-block quote state.
    pub fn set_multi_block_quote(&mut self, state: MultiBlockQuote) {
        self.multi_block_quote = state;
    }

    /// Returns the split linkage, when the block was produced by a split.
    #[must_use]
    pub const fn split_id(&self) -> Option<SplitId> {
        self.split_id
    }

    /// Links the block to a split group.
    pub fn set_split_id(&mut self, split_id: SplitId) {
        self.split_id = Some(split_id);
    }

    /// Returns the paired reference blocks.
    #[must_use]
    pub fn reference_blocks(&self) -> &[Block] {
        self.reference_blocks.as_slice()
    }

    /// Reports whether the reference pairing was fully resolved.
    #[must_use]
    pub const fn matches_reference_text(&self) -> bool {
        self.matches_reference_text
    }

    /// Records a resolved reference pairing.
    pub fn set_matched_reference(&mut self, reference_blocks: Vec<Block>) {
        self.reference_blocks = reference_blocks;
        self.matches_reference_text = true;
    }

    /// Records candidate reference blocks the engine could not reconcile.
    pub fn set_unmatched_reference(&mut self, reference_blocks: Vec<Block>) {
        self.reference_blocks = reference_blocks;
        self.matches_reference_text = false;
    }

    /// Drops any recorded reference pairing.
    pub fn clear_reference(&mut self) {
        self.reference_blocks.clear();
        self.matches_reference_text = false;
    }

    /// Appends another block's elements during a join.
    pub(crate) fn extend_elements(&mut self, elements: impl IntoIterator<Item = BlockElement>) {
        self.elements.extend(elements);
    }

    /// Detaches the reference pairing for repartitioning after a split.
    pub(crate) fn take_reference_blocks(&mut self) -> (Vec<Self>, bool) {
        let matched = self.matches_reference_text;
        self.matches_reference_text = false;
        (std::mem::take(&mut self.reference_blocks), matched)
    }

    /// Reattaches a repartitioned reference pairing.
    pub(crate) fn set_reference_blocks_raw(&mut self, reference_blocks: Vec<Self>, matched: bool) {
        self.reference_blocks = reference_blocks;
        self.matches_reference_text = matched;
    }

    /// Renders the spoken text: no verse numbers, no annotations.
    #[must_use]
    pub fn text(&self) -> String {
        self.text_with(TextOptions::default())
    }

    /// Renders the block's text with the requested extras.
    ///
    /// # Examples
    ///
    /// ```
    /// use vox_core::{Block, BlockElement, TextOptions, VerseSpan};
    ///
    /// let mut block = Block::new("p", 3, VerseSpan::single(5));
    /// block.push_element(BlockElement::verse("5")?);
    /// block.push_element(BlockElement::text("Jesus wept."));
    /// assert_eq!(block.text(), "Jesus wept.");
    /// let options = TextOptions { include_verse_numbers: true, ..TextOptions::default() };
    /// assert_eq!(block.text_with(options), "{5}Jesus wept.");
    /// # Ok::<(), vox_core::RefError>(())
    /// ```
    #[must_use]
    pub fn text_with(&self, options: TextOptions) -> String {
        let mut rendered = String::new();
        for element in &self.elements {
            match element {
                BlockElement::Text { content } => rendered.push_str(content),
                BlockElement::Verse { number } => {
                    if options.include_verse_numbers {
                        rendered.push('{');
                        rendered.push_str(number.label());
                        rendered.push('}');
                    }
                }
                BlockElement::Annotation { cue } => {
                    if options.include_annotations {
                        rendered.push_str(&cue.script_text());
                    }
                }
            }
        }
        rendered
    }

    /// Resolves a verse number to the marker label actually present.
    ///
    /// Returns the bridge label when the verse falls inside one, or the
    /// inherited initial label when the verse is covered by the block's
    /// leading, marker-less text. `None` when the block never touches the
    /// verse.
    #[must_use]
    pub fn resolve_verse_label(&self, verse: u32) -> Option<String> {
        if self.leading_marker().is_none() && self.initial_verses.contains(verse) {
            return Some(self.initial_verses.to_string());
        }
        self.elements
            .iter()
            .filter_map(BlockElement::as_verse)
            .find(|marker| marker.span().contains(verse))
            .map(|marker| marker.label().to_owned())
    }

    /// Splits the block's content at a character offset inside a verse.
    ///
    /// Elements after the cut move into the returned block, which copies the
    /// original's style, chapter, speaker, delivery, and confirmation state.
    /// Quote state and split linkage are left for the owning script to
    /// re-derive. Returns `Ok(None)` when the cut falls exactly at the
    /// block's existing end with nothing to move; the caller must instead
    /// record a boundary split between whole blocks.
    ///
    /// # Errors
    ///
    /// Returns [`SplitError::VerseNotFound`] when no marker (or inherited
    /// initial span) carries `verse_label`, [`SplitError::NoTextRun`] when a
    /// character offset was given but the verse has no text run, and
    /// [`SplitError::OffsetOutOfRange`] when the offset is zero or beyond
    /// the run.
    pub fn split(
        &mut self,
        verse_label: &str,
        offset: SplitOffset,
    ) -> Result<Option<Self>, SplitError> {
        let region = self.verse_region(verse_label)?;
        let cut = match offset {
            SplitOffset::EndOfVerse => Cut {
                element: region.end,
                chars: None,
            },
            SplitOffset::At(chars) => self.resolve_char_cut(&region, verse_label, chars)?,
        };

        let moved = self.take_tail(cut);
        if moved.is_empty() {
            return Ok(None);
        }

        let initial = moved
            .first()
            .and_then(BlockElement::as_verse)
            .map_or_else(|| region.span, |marker| marker.span());
        let mut tail = Self::new(self.style_tag.clone(), self.chapter, initial);
        tail.elements = moved;
        tail.speaker = self.speaker.clone();
        tail.speaker_override = self.speaker_override.clone();
        tail.delivery = self.delivery.clone();
        tail.user_confirmed = self.user_confirmed;
        Ok(Some(tail))
    }

    /// Character count of text after the final verse marker.
    ///
    /// Used when replaying a recorded split: the first part's contribution
    /// to its last verse tells the replayer where inside that verse the cut
    /// fell.
    #[must_use]
    pub fn text_len_in_last_verse(&self) -> usize {
        let start = self
            .elements
            .iter()
            .rposition(|element| element.as_verse().is_some())
            .map_or(0, |index| index + 1);
        self.elements[start..]
            .iter()
            .filter_map(BlockElement::as_text)
            .map(|content| content.chars().count())
            .sum()
    }

    fn leading_marker(&self) -> Option<&crate::element::VerseNum> {
        self.elements
            .iter()
            .find(|element| !element.is_annotation())
            .and_then(BlockElement::as_verse)
    }

    /// Locates the element range belonging to `verse_label`.
    fn verse_region(&self, verse_label: &str) -> Result<VerseRegion, SplitError> {
        let not_found = || SplitError::VerseNotFound {
            verse: verse_label.to_owned(),
        };
        let span: VerseSpan = verse_label.parse().map_err(|_| not_found())?;

        let start = if self.leading_marker().is_none() && self.initial_verses == span {
            0
        } else {
            let marker = self
                .elements
                .iter()
                .position(|element| {
                    element
                        .as_verse()
                        .is_some_and(|number| number.span() == span)
                })
                .ok_or_else(not_found)?;
            marker + 1
        };
        let end = self.elements[start..]
            .iter()
            .position(|element| element.as_verse().is_some())
            .map_or(self.elements.len(), |relative| start + relative);
        Ok(VerseRegion { start, end, span })
    }

    fn resolve_char_cut(
        &self,
        region: &VerseRegion,
        verse_label: &str,
        chars: usize,
    ) -> Result<Cut, SplitError> {
        let run_index = self.elements[region.start..region.end]
            .iter()
            .position(|element| element.as_text().is_some())
            .map(|relative| region.start + relative)
            .ok_or_else(|| SplitError::NoTextRun {
                verse: verse_label.to_owned(),
            })?;
        let run = self.elements[run_index]
            .as_text()
            .unwrap_or_default();
        let length = run.chars().count();
        if chars == 0 || chars > length {
            return Err(SplitError::OffsetOutOfRange {
                offset: chars,
                length,
            });
        }
        if chars == length {
            return Ok(Cut {
                element: run_index + 1,
                chars: None,
            });
        }
        Ok(Cut {
            element: run_index,
            chars: Some(chars),
        })
    }

    /// Removes and returns everything after the cut point.
    fn take_tail(&mut self, cut: Cut) -> Vec<BlockElement> {
        match cut.chars {
            None => self.elements.split_off(cut.element),
            Some(chars) => {
                let mut moved = self.elements.split_off(cut.element);
                // First moved element is the run being divided.
                if let Some(BlockElement::Text { content }) = moved.first_mut() {
                    let byte = content
                        .char_indices()
                        .nth(chars)
                        .map_or(content.len(), |(index, _)| index);
                    let rest = content.split_off(byte);
                    self.elements.push(BlockElement::text(content.clone()));
                    *content = rest;
                }
                moved
            }
        }
    }
}

/// Element range belonging to one verse.
struct VerseRegion {
    start: usize,
    end: usize,
    span: VerseSpan,
}

/// Resolved cut position: an element boundary, optionally inside a text run.
struct Cut {
    element: usize,
    chars: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn text_block(pairs: &[(&str, &str)]) -> Block {
        let first: VerseSpan = pairs[0].0.parse().expect("valid label");
        let mut block = Block::new("p", 1, first);
        for (label, words) in pairs {
            block.push_element(BlockElement::verse(*label).expect("valid label"));
            block.push_element(BlockElement::text(*words));
        }
        block
    }

    #[fixture]
    fn two_verse_block() -> Block {
        text_block(&[("5", "Jesus said, "), ("6", "\u{201c}Peace be with you.\u{201d}")])
    }

    #[rstest]
    fn renders_text_per_options(two_verse_block: Block) {
        assert_eq!(
            two_verse_block.text(),
            "Jesus said, \u{201c}Peace be with you.\u{201d}"
        );
        let options = TextOptions {
            include_verse_numbers: true,
            include_annotations: false,
        };
        assert_eq!(
            two_verse_block.text_with(options),
            "{5}Jesus said, {6}\u{201c}Peace be with you.\u{201d}"
        );
    }

    #[rstest]
    fn split_at_end_of_verse_moves_following_verses(mut two_verse_block: Block) {
        let tail = two_verse_block
            .split("5", SplitOffset::EndOfVerse)
            .expect("split succeeds")
            .expect("material moves");
        assert_eq!(two_verse_block.text(), "Jesus said, ");
        assert_eq!(tail.text(), "\u{201c}Peace be with you.\u{201d}");
        assert_eq!(tail.initial_start_verse(), 6);
        assert!(tail.starts_at_verse_start());
    }

    #[rstest]
    fn split_mid_run_reconstructs_original_text(mut two_verse_block: Block) {
        let original = two_verse_block.text();
        let tail = two_verse_block
            .split("5", SplitOffset::At(6))
            .expect("split succeeds")
            .expect("material moves");
        assert_eq!(two_verse_block.text(), "Jesus ");
        assert_eq!(tail.initial_start_verse(), 5);
        assert!(!tail.starts_at_verse_start());
        assert_eq!(format!("{}{}", two_verse_block.text(), tail.text()), original);
    }

    #[rstest]
    fn split_copies_speaker_state(mut two_verse_block: Block) {
        two_verse_block.set_speaker(Speaker::character("Jesus"));
        two_verse_block.set_delivery(Some("gentle".to_owned()));
        two_verse_block.set_user_confirmed(true);
        let tail = two_verse_block
            .split("5", SplitOffset::EndOfVerse)
            .expect("split succeeds")
            .expect("material moves");
        assert_eq!(tail.speaker(), &Speaker::character("Jesus"));
        assert_eq!(tail.delivery(), Some("gentle"));
        assert!(tail.is_user_confirmed());
        assert!(!tail.is_paragraph_start());
    }

    #[rstest]
    fn split_at_block_end_is_a_no_op(mut two_verse_block: Block) {
        let result = two_verse_block
            .split("6", SplitOffset::EndOfVerse)
            .expect("split succeeds");
        assert!(result.is_none());
        assert_eq!(two_verse_block.elements().len(), 4);
    }

    #[rstest]
    #[case(0)]
    #[case(13)]
    fn split_rejects_out_of_range_offsets(mut two_verse_block: Block, #[case] offset: usize) {
        let error = two_verse_block
            .split("5", SplitOffset::At(offset))
            .expect_err("offset outside run");
        assert!(matches!(error, SplitError::OffsetOutOfRange { .. }));
    }

    #[rstest]
    fn split_rejects_missing_verse(mut two_verse_block: Block) {
        let error = two_verse_block
            .split("9", SplitOffset::EndOfVerse)
            .expect_err("verse absent");
        assert_eq!(
            error,
            SplitError::VerseNotFound {
                verse: "9".to_owned()
            }
        );
    }

    #[test]
    fn splits_inherited_leading_text() {
        let mut block = Block::new("p", 2, VerseSpan::single(3));
        block.push_element(BlockElement::text("carried over from verse three. "));
        block.push_element(BlockElement::verse("4").expect("valid label"));
        block.push_element(BlockElement::text("A new verse."));
        let tail = block
            .split("3", SplitOffset::EndOfVerse)
            .expect("split succeeds")
            .expect("material moves");
        assert_eq!(block.text(), "carried over from verse three. ");
        assert_eq!(tail.initial_start_verse(), 4);
    }

    #[test]
    fn resolves_bridge_labels() {
        let block = text_block(&[("10-12", "bridged text")]);
        assert_eq!(block.resolve_verse_label(11), Some("10-12".to_owned()));
        assert_eq!(block.resolve_verse_label(13), None);
    }

    #[test]
    fn last_verse_falls_back_to_initial_span() {
        let mut block = Block::new("p", 7, VerseSpan::single(9));
        block.push_element(BlockElement::text("no markers here"));
        assert_eq!(block.last_verse(), 9);
    }

    #[test]
    fn text_len_in_last_verse_counts_trailing_run() {
        let block = text_block(&[("5", "abcde"), ("6", "xyz")]);
        assert_eq!(block.text_len_in_last_verse(), 3);
    }
}
