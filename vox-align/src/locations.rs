//! Clean verse breaks and the forced splits they drive.
//!
//! A verse split location is the boundary between two adjacent blocks where
//! the second starts exactly at a verse boundary. The locations harvested
//! from one text are forced into the other before matching, so both block
//! lists break at the same verses wherever their content allows.

use vox_core::{Block, BookNum, ScriptAccess, VerseRef, Versification};

/// The boundary between two adjacent blocks, expressed in canonical form.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VerseSplitLocation {
    /// Last verse of the block before the boundary.
    pub after: VerseRef,
    /// First verse of the block after the boundary.
    pub before: VerseRef,
}

/// Harvests every clean verse break from a block list.
///
/// Blocks that begin mid-verse do not produce a location; neither do
/// boundaries involving verse-less material such as titles.
#[must_use]
pub fn verse_split_locations(
    blocks: &[Block],
    book: BookNum,
    versification: &dyn Versification,
) -> Vec<VerseSplitLocation> {
    let mut locations = Vec::new();
    for pair in blocks.windows(2) {
        let [previous, next] = pair else {
            continue;
        };
        if !next.starts_at_verse_start() {
            continue;
        }
        if previous.last_verse() == 0 || next.initial_start_verse() == 0 {
            continue;
        }
        locations.push(VerseSplitLocation {
            after: versification
                .to_canonical(VerseRef::new(book, previous.chapter(), previous.last_verse())),
            before: versification.to_canonical(VerseRef::new(
                book,
                next.chapter(),
                next.initial_start_verse(),
            )),
        });
    }
    locations
}

/// Forces a script to break at each of the given locations.
///
/// Locations the script already breaks at, and locations that fall inside a
/// verse bridge, are skipped. Returns whether any split was made.
pub(crate) fn force_splits<S: ScriptAccess>(
    script: &mut S,
    locations: &[VerseSplitLocation],
    versification: &dyn Versification,
) -> bool {
    let mut modified = false;
    for location in locations {
        let local = versification.from_canonical(location.after);
        let mut index = 0;
        while index < script.blocks().len() {
            let block = &script.blocks()[index];
            let spans_boundary = block.chapter() == local.chapter()
                && block.initial_start_verse() <= local.verse()
                && block.last_verse() > local.verse();
            if spans_boundary {
                modified |= script.try_split_block_at_end_of_verse(index, local.verse());
                break;
            }
            index += 1;
        }
    }
    modified
}
