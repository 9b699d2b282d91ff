//! The indexed, mutable block collection for one book.
//!
//! A `BookScript` wraps a [`PortionScript`] with the chapter acceleration
//! cache and the machinery for carrying editorial decisions forward when the
//! book is re-parsed. The cache is a derived projection: every insertion
//! shifts it, and window write-backs rebuild it outright.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::{Block, MultiBlockQuote, SplitId, SplitOffset, TextOptions};
use crate::error::SplitError;
use crate::portion::{PortionScript, ScriptAccess, SplitPoint, SplitRequest, SplitServices};
use crate::speakers::Speaker;

const MATCH_TEXT: TextOptions = TextOptions {
    include_verse_numbers: true,
    include_annotations: false,
};

/// Ordered, index-stable block collection for one book.
///
/// Created from a fresh parse (blocks initially unconfirmed) or
/// deserialised from a stored project; mutated by splitting and by decision
/// propagation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BookScript {
    script: PortionScript,
    #[serde(skip)]
    chapter_index: HashMap<u32, usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    unapplied_splits: Vec<Vec<Block>>,
}

impl BookScript {
    /// Builds a book script over pre-existing blocks.
    #[must_use]
    pub fn new(book_id: impl Into<String>, blocks: impl IntoIterator<Item = Block>) -> Self {
        Self {
            script: PortionScript::new(book_id, blocks),
            chapter_index: HashMap::new(),
            unapplied_splits: Vec::new(),
        }
    }

    /// Returns the book id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.script.id()
    }

    /// Returns the ordered blocks.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        self.script.blocks()
    }

    /// Returns a block by index.
    #[must_use]
    pub fn block(&self, index: usize) -> Option<&Block> {
        self.script.block(index)
    }

    /// Returns a block mutably.
    pub fn block_mut(&mut self, index: usize) -> Option<&mut Block> {
        self.script.block_mut(index)
    }

    /// Returns the block count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.script.len()
    }

    /// Reports whether the book holds no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }

    /// Returns split groups recorded earlier that could not be re-matched
    /// into the current block list.
    #[must_use]
    pub fn unapplied_splits(&self) -> &[Vec<Block>] {
        self.unapplied_splits.as_slice()
    }

    /// Returns a read-only view with adjacent same-speaker blocks merged.
    ///
    /// Adjacent blocks that do not open a paragraph and share an identical
    /// effective speaker and delivery are merged: element lists appended and
    /// confirmation ANDed. The underlying list is never mutated.
    #[must_use]
    pub fn blocks_joined(&self) -> Vec<Block> {
        let mut joined: Vec<Block> = Vec::with_capacity(self.len());
        for block in self.blocks() {
            let mergeable = !block.is_paragraph_start()
                && joined.last().is_some_and(|last: &Block| {
                    last.speaker_in_script() == block.speaker_in_script()
                        && last.delivery() == block.delivery()
                });
            if let Some(last) = joined.last_mut().filter(|_| mergeable) {
                last.extend_elements(block.elements().iter().cloned());
                last.set_user_confirmed(last.is_user_confirmed() && block.is_user_confirmed());
            } else {
                joined.push(block.clone());
            }
        }
        joined
    }

    /// Returns the index of the first block whose verse range covers the
    /// requested verse.
    ///
    /// The chapter cache supplies the starting point; the scan then walks
    /// forward, recording the first block of every newly visited chapter.
    pub fn first_block_index_for_verse(&mut self, chapter: u32, verse: u32) -> Option<usize> {
        let start = self.chapter_start_index(chapter)?;
        self.blocks()[start..]
            .iter()
            .take_while(|block| block.chapter() == chapter)
            .position(|block| {
                block.initial_start_verse() <= verse && block.last_verse() >= verse
            })
            .map(|relative| start + relative)
    }

    /// Rebuilds the chapter cache from scratch.
    pub fn rebuild_chapter_index(&mut self) {
        self.chapter_index.clear();
        let mut seen: Option<u32> = None;
        for (index, block) in self.script.blocks().iter().enumerate() {
            let chapter = block.chapter();
            if seen != Some(chapter) {
                self.chapter_index.entry(chapter).or_insert(index);
                seen = Some(chapter);
            }
        }
    }

    /// Splits a block, keeping the chapter cache aligned.
    ///
    /// # Errors
    ///
    /// Propagates the underlying [`SplitError`]; the book and its cache are
    /// untouched on failure.
    pub fn split_block(
        &mut self,
        request: &SplitRequest,
        services: SplitServices<'_>,
    ) -> Result<usize, SplitError> {
        let before = self.script.len();
        let result = self.script.split_block(request, services)?;
        if self.script.len() > before {
            self.shift_chapter_index(result);
        }
        Ok(result)
    }

    /// Splits a block so it ends exactly at `verse`; `false` when the verse
    /// cannot be located or the boundary is already clean.
    pub fn try_split_block_at_end_of_verse(&mut self, index: usize, verse: u32) -> bool {
        let before = self.script.len();
        let split = self.script.try_split_block_at_end_of_verse(index, verse);
        if split && self.script.len() > before {
            self.shift_chapter_index(index + 1);
        }
        split
    }

    /// Replays splits and confirmed speaker decisions recorded on an older
    /// parse of the same book onto this freshly parsed block list.
    ///
    /// Decisions are matched by chapter, initial verse, and element-content
    /// equality. Split groups that no longer match any block are retained in
    /// [`Self::unapplied_splits`] so the decision is not silently lost.
    /// Afterwards every multi-block quote run is re-normalised.
    pub fn apply_user_decisions(&mut self, source: &Self, services: SplitServices<'_>) {
        self.unapplied_splits.clear();
        self.replay_splits(source, services);
        self.replay_assignments(source);
        self.clean_up_multi_block_quotes();
    }

    /// Re-normalises speaker state across every multi-block quote run.
    ///
    /// For each `Start…Continuation*` run: one distinct speaker/delivery
    /// pair is left alone; two or more real speakers mark the run
    /// ambiguous; one real speaker with several deliveries marks the
    /// delivery-change boundaries; one real speaker mixed with unclear
    /// entries is normalised across the run.
    pub fn clean_up_multi_block_quotes(&mut self) {
        let mut start = 0;
        while start < self.len() {
            if self.blocks()[start].multi_block_quote() != MultiBlockQuote::Start {
                start += 1;
                continue;
            }
            let mut end = start + 1;
            while end < self.len() && self.blocks()[end].multi_block_quote().is_continuation() {
                end += 1;
            }
            self.normalise_quote_run(start, end);
            start = end;
        }
    }

    pub(crate) fn replace_window(&mut self, range: std::ops::Range<usize>, blocks: Vec<Block>) {
        self.script.replace_range(range, blocks);
        self.rebuild_chapter_index();
    }

    /// Returns the cached (populating on demand) index of the chapter's
    /// first block.
    fn chapter_start_index(&mut self, chapter: u32) -> Option<usize> {
        if let Some(&index) = self.chapter_index.get(&chapter) {
            return Some(index);
        }
        // Resume the scan from the latest chapter already cached before the
        // requested one.
        let (mut index, mut seen) = self
            .chapter_index
            .iter()
            .filter(|&(&cached, _)| cached < chapter)
            .max_by_key(|&(&cached, _)| cached)
            .map_or((0, None), |(&cached, &at)| (at, Some(cached)));
        while let Some(block) = self.script.block(index) {
            let current = block.chapter();
            if seen != Some(current) {
                self.chapter_index.entry(current).or_insert(index);
                seen = Some(current);
                if current == chapter {
                    return Some(index);
                }
            }
            index += 1;
        }
        None
    }

    /// Shifts cached chapter starts at or past a freshly inserted index.
    fn shift_chapter_index(&mut self, inserted: usize) {
        for start in self.chapter_index.values_mut() {
            if *start >= inserted {
                *start += 1;
            }
        }
    }

    fn replay_splits(&mut self, source: &Self, services: SplitServices<'_>) {
        for group in split_groups(source.blocks()) {
            if !self.replay_split_group(&group, services) {
                debug!(
                    book = self.id(),
                    chapter = group[0].chapter(),
                    verse = group[0].initial_start_verse(),
                    "recorded split no longer matches; retaining"
                );
                self.unapplied_splits
                    .push(group.into_iter().cloned().collect());
            }
        }
    }

    /// Replays one recorded split group; `false` when it cannot be matched.
    fn replay_split_group(&mut self, group: &[&Block], services: SplitServices<'_>) -> bool {
        let chapter = group[0].chapter();
        let start_verse = group[0].initial_start_verse();
        let combined: String = group
            .iter()
            .map(|block| block.text_with(MATCH_TEXT))
            .collect();

        let Some(found) = self.first_block_index_for_verse(chapter, start_verse) else {
            return false;
        };
        let Some(target) = self.blocks()[found..]
            .iter()
            .take_while(|block| block.chapter() == chapter)
            .position(|block| {
                block.initial_start_verse() == start_verse
                    && block.text_with(MATCH_TEXT) == combined
            })
            .map(|relative| found + relative)
        else {
            return false;
        };

        let mut cursor = target;
        for (part, next) in group.iter().zip(group.iter().skip(1)) {
            let verse = part.last_verse_span().to_string();
            // Each cut applies to the block that begins where this part
            // begins, so the offset is the part's own contribution to its
            // final verse.
            let point = if next.starts_at_verse_start() {
                SplitPoint::Within {
                    verse,
                    offset: SplitOffset::EndOfVerse,
                }
            } else {
                SplitPoint::Within {
                    verse,
                    offset: SplitOffset::At(part.text_len_in_last_verse()),
                }
            };
            match self.split_block(&SplitRequest::user(cursor, point), services) {
                Ok(new_index) if new_index != cursor => cursor = new_index,
                _ => return false,
            }
        }
        true
    }

    fn replay_assignments(&mut self, source: &Self) {
        for decided in source.blocks() {
            if !decided.is_user_confirmed() || decided.speaker().is_unclear() {
                continue;
            }
            let chapter = decided.chapter();
            let verse = decided.initial_start_verse();
            let Some(found) = self.first_block_index_for_verse(chapter, verse) else {
                continue;
            };
            let matched = self.blocks()[found..]
                .iter()
                .take_while(|block| {
                    block.chapter() == chapter && block.initial_start_verse() <= verse
                })
                .position(|block| {
                    block.initial_verses() == decided.initial_verses()
                        && block.text_with(MATCH_TEXT) == decided.text_with(MATCH_TEXT)
                })
                .map(|relative| found + relative);
            if let Some(block) = matched.and_then(|index| self.script.block_mut(index)) {
                block.set_speaker(decided.speaker().clone());
                match decided.speaker_override() {
                    Some(choice) => block.set_speaker_override(choice),
                    None => block.clear_speaker_override(),
                }
                block.set_delivery(decided.delivery().map(str::to_owned));
                block.set_user_confirmed(true);
            }
        }
    }

    fn normalise_quote_run(&mut self, start: usize, end: usize) {
        let run = &self.blocks()[start..end];
        let mut pairs: Vec<(Speaker, Option<String>)> = Vec::new();
        for block in run {
            let pair = (
                block.speaker().clone(),
                block.delivery().map(str::to_owned),
            );
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
        if pairs.len() <= 1 {
            return;
        }

        let mut real: Vec<Speaker> = Vec::new();
        for (speaker, _) in &pairs {
            if !speaker.is_unclear() && !real.contains(speaker) {
                real.push(speaker.clone());
            }
        }

        match real.as_slice() {
            [] => {}
            [only] => {
                let speaker = only.clone();
                let deliveries: Vec<Option<String>> = {
                    let mut seen = Vec::new();
                    for block in run {
                        if block.speaker() == &speaker {
                            let delivery = block.delivery().map(str::to_owned);
                            if !seen.contains(&delivery) {
                                seen.push(delivery);
                            }
                        }
                    }
                    seen
                };
                if deliveries.len() > 1 {
                    self.mark_delivery_changes(start, end, &speaker);
                } else {
                    self.normalise_run_to(start, end, &speaker, deliveries.into_iter().flatten().next());
                }
            }
            _ => {
                for index in start..end {
                    if let Some(block) = self.script.block_mut(index) {
                        block.set_speaker(Speaker::Ambiguous);
                        block.clear_speaker_override();
                        block.set_user_confirmed(false);
                    }
                }
            }
        }
    }

    /// One speaker, several deliveries: keep the speaker everywhere and mark
    /// each boundary where the delivery changes.
    fn mark_delivery_changes(&mut self, start: usize, end: usize, speaker: &Speaker) {
        for index in start..end {
            if let Some(block) = self.script.block_mut(index) {
                block.set_speaker(speaker.clone());
            }
        }
        for index in start + 1..end {
            let previous = self.blocks()[index - 1].delivery().map(str::to_owned);
            if let Some(block) = self.script.block_mut(index) {
                let changed = block.delivery().map(str::to_owned) != previous;
                block.set_multi_block_quote(if changed {
                    MultiBlockQuote::ChangeOfDelivery
                } else {
                    MultiBlockQuote::Continuation
                });
            }
        }
    }

    /// One real speaker amid unclear entries: normalise the whole run.
    fn normalise_run_to(
        &mut self,
        start: usize,
        end: usize,
        speaker: &Speaker,
        delivery: Option<String>,
    ) {
        let exemplar_override = self.blocks()[start..end]
            .iter()
            .find(|block| block.speaker() == speaker)
            .and_then(|block| block.speaker_override().map(str::to_owned));
        for index in start..end {
            if let Some(block) = self.script.block_mut(index) {
                block.set_speaker(speaker.clone());
                match exemplar_override.as_deref() {
                    Some(choice) => block.set_speaker_override(choice),
                    None => block.clear_speaker_override(),
                }
                block.set_delivery(delivery.clone());
                if index > start && block.multi_block_quote() == MultiBlockQuote::ChangeOfDelivery {
                    block.set_multi_block_quote(MultiBlockQuote::Continuation);
                }
            }
        }
    }
}

impl ScriptAccess for BookScript {
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

/// Groups a block list by split id, preserving block order.
fn split_groups(blocks: &[Block]) -> Vec<Vec<&Block>> {
    let mut order: Vec<SplitId> = Vec::new();
    let mut groups: HashMap<SplitId, Vec<&Block>> = HashMap::new();
    for block in blocks {
        if let Some(split_id) = block.split_id() {
            let group = groups.entry(split_id).or_default();
            if group.is_empty() {
                order.push(split_id);
            }
            group.push(block);
        }
    }
    order
        .into_iter()
        .filter_map(|split_id| {
            let group = groups.remove(&split_id)?;
            (group.len() > 1).then_some(group)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::BlockElement;
    use crate::refs::VerseSpan;
    use rstest::{fixture, rstest};

    fn verse_block(chapter: u32, pairs: &[(&str, &str)]) -> Block {
        let first: VerseSpan = pairs[0].0.parse().expect("valid label");
        let mut block = Block::new("p", chapter, first);
        block.set_paragraph_start(true);
        for (label, words) in pairs {
            block.push_element(BlockElement::verse(*label).expect("valid label"));
            block.push_element(BlockElement::text(*words));
        }
        block
    }

    #[fixture]
    fn book() -> BookScript {
        BookScript::new(
            "MRK",
            [
                verse_block(1, &[("1", "In the beginning. ")]),
                verse_block(1, &[("2", "As it is written, "), ("3", "a voice cries. ")]),
                verse_block(2, &[("1", "Days later, ")]),
                verse_block(2, &[("2", "many gathered. ")]),
            ],
        )
    }

    #[rstest]
    fn finds_first_block_for_verse(mut book: BookScript) {
        assert_eq!(book.first_block_index_for_verse(1, 3), Some(1));
        assert_eq!(book.first_block_index_for_verse(2, 2), Some(3));
        assert_eq!(book.first_block_index_for_verse(3, 1), None);
        assert_eq!(book.first_block_index_for_verse(1, 9), None);
    }

    #[rstest]
    fn split_shifts_later_chapter_cache(mut book: BookScript) {
        // Prime the cache for both chapters.
        assert_eq!(book.first_block_index_for_verse(2, 1), Some(2));
        let request = SplitRequest::user(
            1,
            SplitPoint::Within {
                verse: "2".to_owned(),
                offset: SplitOffset::EndOfVerse,
            },
        );
        book.split_block(&request, SplitServices::none())
            .expect("split succeeds");
        assert_eq!(book.first_block_index_for_verse(2, 1), Some(3));
        assert_eq!(book.first_block_index_for_verse(1, 3), Some(2));
    }

    #[rstest]
    fn join_merges_same_speaker_flow(mut book: BookScript) {
        for index in [2usize, 3] {
            let block = book.block_mut(index).expect("block exists");
            block.set_speaker(Speaker::character("narrator-MRK"));
        }
        book.block_mut(3)
            .expect("block exists")
            .set_paragraph_start(false);
        let joined = book.blocks_joined();
        assert_eq!(joined.len(), 3);
        assert_eq!(joined[2].text(), "Days later, many gathered. ");
        // The read-side view never mutates the underlying list.
        assert_eq!(book.len(), 4);
    }

    #[rstest]
    fn join_respects_paragraph_starts(mut book: BookScript) {
        for index in 0..book.len() {
            let block = book.block_mut(index).expect("block exists");
            block.set_speaker(Speaker::character("narrator-MRK"));
        }
        assert_eq!(book.blocks_joined().len(), 4);
    }

    #[rstest]
    fn replays_recorded_split_onto_fresh_parse(mut book: BookScript) {
        let mut earlier = book.clone();
        let request = SplitRequest::user(
            1,
            SplitPoint::Within {
                verse: "2".to_owned(),
                offset: SplitOffset::At(6),
            },
        );
        earlier
            .split_block(&request, SplitServices::none())
            .expect("split succeeds");
        earlier
            .block_mut(1)
            .expect("block exists")
            .set_speaker(Speaker::character("narrator-MRK"));
        earlier
            .block_mut(1)
            .expect("block exists")
            .set_user_confirmed(true);

        book.apply_user_decisions(&earlier, SplitServices::none());
        assert_eq!(book.len(), 5);
        assert_eq!(book.blocks()[1].text(), "As it ");
        assert_eq!(book.blocks()[2].text(), "is written, a voice cries. ");
        assert_eq!(
            book.blocks()[1].speaker(),
            &Speaker::character("narrator-MRK")
        );
        assert!(book.blocks()[1].is_user_confirmed());
        assert!(book.unapplied_splits().is_empty());
    }

    #[rstest]
    fn replays_repeated_cuts_inside_one_verse(mut book: BookScript) {
        let mut earlier = book.clone();
        for offset in [6, 3] {
            let request = SplitRequest::user(
                1,
                SplitPoint::Within {
                    verse: "2".to_owned(),
                    offset: SplitOffset::At(offset),
                },
            );
            earlier
                .split_block(&request, SplitServices::none())
                .expect("split succeeds");
        }
        assert_eq!(earlier.blocks()[1].text(), "As ");
        assert_eq!(earlier.blocks()[2].text(), "it ");

        book.apply_user_decisions(&earlier, SplitServices::none());
        assert_eq!(book.len(), 6);
        assert_eq!(book.blocks()[1].text(), "As ");
        assert_eq!(book.blocks()[2].text(), "it ");
        assert_eq!(book.blocks()[3].text(), "is written, a voice cries. ");
        assert!(book.unapplied_splits().is_empty());
    }

    #[rstest]
    fn unmatched_split_is_retained(mut book: BookScript) {
        let mut earlier = book.clone();
        let request = SplitRequest::user(
            1,
            SplitPoint::Within {
                verse: "2".to_owned(),
                offset: SplitOffset::At(6),
            },
        );
        earlier
            .split_block(&request, SplitServices::none())
            .expect("split succeeds");

        // The fresh parse reads differently, so the split cannot re-match.
        let reworded = BookScript::new(
            "MRK",
            [
                verse_block(1, &[("1", "In the beginning. ")]),
                verse_block(1, &[("2", "It stands written, "), ("3", "a voice cries. ")]),
            ],
        );
        book = reworded;
        book.apply_user_decisions(&earlier, SplitServices::none());
        assert_eq!(book.len(), 2);
        assert_eq!(book.unapplied_splits().len(), 1);
        assert_eq!(book.unapplied_splits()[0].len(), 2);
    }

    fn quote_run_book(speakers: &[(&str, Option<&str>, bool)]) -> BookScript {
        let labels = ["1", "2", "3", "4"];
        let blocks: Vec<Block> = speakers
            .iter()
            .enumerate()
            .map(|(index, (speaker, delivery, confirmed))| {
                let mut block = verse_block(1, &[(labels[index], "quoted words ")]);
                block.set_multi_block_quote(if index == 0 {
                    MultiBlockQuote::Start
                } else {
                    MultiBlockQuote::Continuation
                });
                block.set_speaker(Speaker::from((*speaker).to_owned()));
                block.set_delivery(delivery.map(str::to_owned));
                block.set_user_confirmed(*confirmed);
                block
            })
            .collect();
        BookScript::new("MRK", blocks)
    }

    #[test]
    fn quote_run_with_two_real_speakers_becomes_ambiguous() {
        let mut book = quote_run_book(&[
            ("Jesus", None, true),
            ("Peter", None, true),
            ("unknown", None, false),
        ]);
        book.clean_up_multi_block_quotes();
        for block in book.blocks() {
            assert_eq!(block.speaker(), &Speaker::Ambiguous);
            assert!(!block.is_user_confirmed());
        }
    }

    #[test]
    fn quote_run_with_one_real_speaker_is_normalised() {
        let mut book = quote_run_book(&[
            ("Jesus", Some("gentle"), true),
            ("unknown", None, false),
            ("ambiguous", None, false),
        ]);
        book.clean_up_multi_block_quotes();
        for block in book.blocks() {
            assert_eq!(block.speaker(), &Speaker::character("Jesus"));
            assert_eq!(block.delivery(), Some("gentle"));
        }
    }

    #[test]
    fn quote_run_with_delivery_changes_is_marked() {
        let mut book = quote_run_book(&[
            ("Jesus", Some("gentle"), true),
            ("Jesus", Some("stern"), true),
            ("Jesus", Some("stern"), true),
        ]);
        book.clean_up_multi_block_quotes();
        assert_eq!(
            book.blocks()[1].multi_block_quote(),
            MultiBlockQuote::ChangeOfDelivery
        );
        assert_eq!(
            book.blocks()[2].multi_block_quote(),
            MultiBlockQuote::Continuation
        );
    }

    #[test]
    fn consistent_quote_run_is_left_alone() {
        let mut book = quote_run_book(&[
            ("Jesus", Some("gentle"), true),
            ("Jesus", Some("gentle"), true),
        ]);
        let before = book.clone();
        book.clean_up_multi_block_quotes();
        assert_eq!(book, before);
    }
}
