//! The two-cursor block matcher.
//!
//! After forced cross-splitting, the vernacular and reference block lists
//! break at the same verses wherever their content allows, so the matcher
//! can walk both lists in order: skip or pair extra-biblical material,
//! expand both sides to a chunk covering the same verses, and pair the
//! chunks. Everything that cannot be reconciled is recorded as unmatched
//! state rather than an error.

use std::ops::Range;

use tracing::{debug, warn};
use vox_core::{Block, BookNum, ScriptAccess, VerseRef, Versification};

use crate::locations::{force_splits, verse_split_locations};
use crate::reference::AlignmentServices;

#[cfg(test)]
mod tests;

/// Aligns a vernacular script against a reference script.
///
/// Returns whether the reference script was modified by a forced split, so
/// the owning cache can reload it before its next use.
pub(crate) fn align<V: ScriptAccess, R: ScriptAccess>(
    vern: &mut V,
    reference: &mut R,
    book: BookNum,
    services: &AlignmentServices<'_>,
) -> bool {
    let reference_locations = verse_split_locations(reference.blocks(), book, services.reference);
    let vernacular_locations = verse_split_locations(vern.blocks(), book, services.vernacular);

    // Cross-split both sides so each text breaks where the other does. The
    // reference side is shared across projects, so its mutations are
    // reported to the caller for reload tracking.
    let reference_modified = force_splits(reference, &vernacular_locations, services.reference);
    force_splits(vern, &reference_locations, services.vernacular);

    match_blocks(vern, reference, book, services);
    reference_modified
}

/// Pairs every vernacular block with reference material where possible.
fn match_blocks<V: ScriptAccess, R: ScriptAccess>(
    vern: &mut V,
    reference: &R,
    book: BookNum,
    services: &AlignmentServices<'_>,
) {
    let mut vern_i = 0;
    let mut ref_i = 0;
    let mut resume: Option<usize> = None;

    while vern_i < vern.blocks().len() {
        let speaker = vern.blocks()[vern_i].speaker_in_script().to_owned();
        if let Some(kind) = services
            .catalog
            .standard_kind(&speaker)
            .filter(|kind| kind.is_extra_biblical())
        {
            // Extra-biblical material pairs only when the reference cursor
            // sits on the same kind of material; otherwise it is skipped
            // without consuming a reference block.
            let counterpart = reference.blocks().get(ref_i).filter(|candidate| {
                services.catalog.standard_kind(candidate.speaker_in_script()) == Some(kind)
            });
            if let Some(matched) = counterpart.cloned() {
                if let Some(block) = vern.block_mut(vern_i) {
                    block.set_matched_reference(vec![matched]);
                }
                ref_i += 1;
            }
            vern_i += 1;
            continue;
        }

        let v_start = canonical_start(&vern.blocks()[vern_i], book, services.vernacular);
        let Some(found) = seek_reference(vern, vern_i, reference, ref_i, book, services, v_start, &mut resume)
        else {
            // The reference ran out of scripture; the rest of the book
            // stays unpaired.
            debug!(book = %book, "reference exhausted; abandoning remainder");
            return;
        };
        ref_i = found;

        let (v_end, r_end) = expand_chunks(vern, vern_i, reference, ref_i, book, services);
        let consumed = pair_chunks(vern, vern_i..v_end, reference, ref_i..r_end, book, services);
        vern_i = v_end;
        ref_i += consumed;
        if let Some(back) = resume.take() {
            ref_i = back;
        }
    }
}

/// Advances the reference cursor to the vernacular block's start verse.
///
/// Extra-biblical reference blocks are stepped over. When the vernacular
/// material was relocated from the end of the book by its versification,
/// the cursor jumps there instead and the prior position is remembered in
/// `resume` so matching continues from it afterwards.
#[expect(
    clippy::too_many_arguments,
    reason = "Cursor state threads through one call site only."
)]
fn seek_reference<V: ScriptAccess, R: ScriptAccess>(
    vern: &V,
    vern_i: usize,
    reference: &R,
    mut cursor: usize,
    book: BookNum,
    services: &AlignmentServices<'_>,
    target: VerseRef,
    resume: &mut Option<usize>,
) -> Option<usize> {
    loop {
        let candidate = reference.blocks().get(cursor)?;
        if services
            .catalog
            .is_extra_biblical(candidate.speaker_in_script())
        {
            cursor += 1;
            continue;
        }
        let r_start = canonical_start(candidate, book, services.reference);
        if r_start.ordinal() >= target.ordinal() {
            return Some(cursor);
        }
        if let Some(jump) = pulled_forward_target(vern, vern_i, reference, cursor, book, services, target) {
            *resume = Some(cursor);
            return Some(jump);
        }
        cursor += 1;
    }
}

/// Detects material the vernacular versification relocated from the end of
/// the book.
///
/// The vernacular block addresses canonical material far past the
/// reference cursor while the following vernacular block returns to
/// earlier material. The reference list is searched from its end, which
/// restricts the special case to relocations from the end of the book; no
/// more general reordering is recognised.
#[expect(
    clippy::too_many_arguments,
    reason = "Detection reads both cursors plus the shared services."
)]
fn pulled_forward_target<V: ScriptAccess, R: ScriptAccess>(
    vern: &V,
    vern_i: usize,
    reference: &R,
    cursor: usize,
    book: BookNum,
    services: &AlignmentServices<'_>,
    target: VerseRef,
) -> Option<usize> {
    let next_start = vern.blocks()[vern_i + 1..].iter().find_map(|block| {
        if services
            .catalog
            .is_extra_biblical(block.speaker_in_script())
        {
            None
        } else {
            Some(canonical_start(block, book, services.vernacular))
        }
    })?;
    if next_start.ordinal() >= target.ordinal() {
        return None;
    }
    let jump = reference
        .blocks()
        .iter()
        .enumerate()
        .rev()
        .find(|(index, block)| {
            *index > cursor
                && !services
                    .catalog
                    .is_extra_biblical(block.speaker_in_script())
                && canonical_start(block, book, services.reference).ordinal() == target.ordinal()
        })
        .map(|(index, _)| index)?;
    debug!(
        book = %book,
        from = cursor,
        to = jump,
        "following material relocated from the end of the book"
    );
    Some(jump)
}

/// Expands both sides to chunks covering the same verse range.
///
/// Each side first grows past blocks that do not start a clean verse
/// break, then the side whose coverage ends earlier keeps growing until
/// the two ends agree or a side runs out of blocks.
fn expand_chunks<V: ScriptAccess, R: ScriptAccess>(
    vern: &V,
    vern_i: usize,
    reference: &R,
    ref_i: usize,
    book: BookNum,
    services: &AlignmentServices<'_>,
) -> (usize, usize) {
    let mut v_end = extend_past_unclean(vern.blocks(), vern_i + 1, services);
    let mut r_end = extend_past_unclean(reference.blocks(), ref_i + 1, services);
    loop {
        let v_last = canonical_end(&vern.blocks()[v_end - 1], book, services.vernacular);
        let r_last = canonical_end(&reference.blocks()[r_end - 1], book, services.reference);
        if v_last.ordinal() < r_last.ordinal() && v_end < vern.blocks().len() {
            v_end = extend_past_unclean(vern.blocks(), v_end + 1, services);
        } else if r_last.ordinal() < v_last.ordinal() && r_end < reference.blocks().len() {
            r_end = extend_past_unclean(reference.blocks(), r_end + 1, services);
        } else {
            return (v_end, r_end);
        }
    }
}

/// Extends `end` forward while the next block neither starts a new verse
/// nor belongs to a standard speaker.
fn extend_past_unclean(blocks: &[Block], mut end: usize, services: &AlignmentServices<'_>) -> usize {
    while end < blocks.len() {
        let block = &blocks[end];
        if block.starts_at_verse_start()
            || services
                .catalog
                .standard_kind(block.speaker_in_script())
                .is_some()
        {
            break;
        }
        end += 1;
    }
    end
}

/// Pairs one vernacular chunk against one reference chunk.
///
/// Returns how many reference blocks were consumed.
fn pair_chunks<V: ScriptAccess, R: ScriptAccess>(
    vern: &mut V,
    v_range: Range<usize>,
    reference: &R,
    r_range: Range<usize>,
    book: BookNum,
    services: &AlignmentServices<'_>,
) -> usize {
    let vn = v_range.len();
    let rn = r_range.len();
    if rn == 0 {
        return 0;
    }

    if vn == 1 {
        return pair_single_vernacular(vern, v_range.start, reference, r_range, book, services);
    }

    if rn == 1 {
        // A reference bridge overlaps several vernacular blocks; each of
        // them shares the one reference block.
        let shared = reference.blocks()[r_range.start].clone();
        for v in v_range.clone() {
            if let Some(block) = vern.block_mut(v) {
                block.set_matched_reference(vec![shared.clone()]);
            }
        }
        return 1;
    }

    // Positional pairing: every pair must agree on start and end verse.
    if vn == rn
        && v_range
            .clone()
            .zip(r_range.clone())
            .all(|(v, r)| verses_agree(&vern.blocks()[v], &reference.blocks()[r], book, services))
    {
        for (v, r) in v_range.clone().zip(r_range.clone()) {
            let matched = reference.blocks()[r].clone();
            if let Some(block) = vern.block_mut(v) {
                block.set_matched_reference(vec![matched]);
            }
        }
        return rn;
    }

    // Retry from the end of the chunk backward for as long as pairs agree.
    let mut tail = 0;
    while tail < vn.min(rn) {
        let v = v_range.end - 1 - tail;
        let r = r_range.end - 1 - tail;
        if !verses_agree(&vern.blocks()[v], &reference.blocks()[r], book, services) {
            break;
        }
        let matched = reference.blocks()[r].clone();
        if let Some(block) = vern.block_mut(v) {
            block.set_matched_reference(vec![matched]);
        }
        tail += 1;
    }
    pair_chunk_front(
        vern,
        v_range.start..v_range.end - tail,
        reference,
        r_range.start..r_range.end - tail,
    );
    rn
}

/// One vernacular block absorbing however much reference material covers
/// its verses.
fn pair_single_vernacular<V: ScriptAccess, R: ScriptAccess>(
    vern: &mut V,
    v_index: usize,
    reference: &R,
    r_range: Range<usize>,
    book: BookNum,
    services: &AlignmentServices<'_>,
) -> usize {
    let chunk_end = canonical_end(&vern.blocks()[v_index], book, services.vernacular);
    // Reference content whose ordinal lies past the chunk belongs later in
    // the book and must stay unconsumed.
    let mut take = 0;
    for r in r_range.clone() {
        let start = canonical_start(&reference.blocks()[r], book, services.reference);
        if start.ordinal() > chunk_end.ordinal() {
            break;
        }
        take += 1;
    }
    if take == 0 {
        warn!(book = %book, "no reference material covers the vernacular chunk");
        if let Some(block) = vern.block_mut(v_index) {
            block.set_unmatched_reference(Vec::new());
        }
        return 0;
    }

    if take == 1 {
        let candidate = reference.blocks()[r_range.start].clone();
        let agrees = ends_agree(&vern.blocks()[v_index], &candidate, book, services);
        if let Some(block) = vern.block_mut(v_index) {
            if agrees {
                block.set_matched_reference(vec![candidate]);
            } else {
                block.set_unmatched_reference(vec![candidate]);
            }
        }
        return 1;
    }

    let combined: Vec<Block> = r_range
        .take(take)
        .map(|r| reference.blocks()[r].clone())
        .collect();
    if let Some(block) = vern.block_mut(v_index) {
        block.set_matched_reference(combined);
    }
    take
}

/// Resolves whatever the tail retry left at the front of the chunk.
fn pair_chunk_front<V: ScriptAccess, R: ScriptAccess>(
    vern: &mut V,
    v_rest: Range<usize>,
    reference: &R,
    r_rest: Range<usize>,
) {
    let vr = v_rest.len();
    let rr = r_rest.len();
    let gather = |range: Range<usize>| -> Vec<Block> {
        range.map(|r| reference.blocks()[r].clone()).collect()
    };
    match (vr, rr) {
        (0, 0) => {}
        (0, _) => {
            // Leftover reference material at the front joins the first
            // already-paired vernacular block.
            if let Some(block) = vern.block_mut(v_rest.end) {
                let mut list = gather(r_rest);
                list.extend(block.reference_blocks().iter().cloned());
                block.set_matched_reference(list);
            }
        }
        (_, 0) => {
            for v in v_rest {
                if let Some(block) = vern.block_mut(v) {
                    block.set_unmatched_reference(Vec::new());
                }
            }
        }
        (1, _) => {
            let list = gather(r_rest);
            if let Some(block) = vern.block_mut(v_rest.start) {
                block.set_matched_reference(list);
            }
        }
        (_, 1) => {
            // A bridge on the reference side overlaps several vernacular
            // blocks; each of them shares the one reference block.
            let shared = gather(r_rest);
            for v in v_rest {
                if let Some(block) = vern.block_mut(v) {
                    block.set_matched_reference(shared.clone());
                }
            }
        }
        _ => {
            // The counts cannot be reconciled; surface the candidates on
            // the first block and leave the rest explicitly unmatched.
            warn!(
                vern_blocks = vr,
                reference_blocks = rr,
                "verse chunk could not be reconciled positionally"
            );
            let candidates = gather(r_rest);
            let mut rest = v_rest;
            if let Some(first) = rest.next() {
                if let Some(block) = vern.block_mut(first) {
                    block.set_unmatched_reference(candidates);
                }
            }
            for v in rest {
                if let Some(block) = vern.block_mut(v) {
                    block.set_unmatched_reference(Vec::new());
                }
            }
        }
    }
}

fn canonical_start(
    block: &Block,
    book: BookNum,
    versification: &dyn Versification,
) -> VerseRef {
    versification.to_canonical(VerseRef::new(
        book,
        block.chapter(),
        block.initial_start_verse(),
    ))
}

fn canonical_end(block: &Block, book: BookNum, versification: &dyn Versification) -> VerseRef {
    versification.to_canonical(VerseRef::new(book, block.chapter(), block.last_verse()))
}

fn verses_agree(
    vern: &Block,
    reference: &Block,
    book: BookNum,
    services: &AlignmentServices<'_>,
) -> bool {
    canonical_start(vern, book, services.vernacular).ordinal()
        == canonical_start(reference, book, services.reference).ordinal()
        && ends_agree(vern, reference, book, services)
}

fn ends_agree(
    vern: &Block,
    reference: &Block,
    book: BookNum,
    services: &AlignmentServices<'_>,
) -> bool {
    canonical_end(vern, book, services.vernacular).ordinal()
        == canonical_end(reference, book, services.reference).ordinal()
}
