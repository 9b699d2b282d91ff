//! End-to-end behaviour of the reference-text seam.

use anyhow::{Context, Result, ensure};
use rstest::rstest;
use vox_align::{AlignmentOutcome, AlignmentServices, ReferenceText};
use vox_core::{BookScript, Speaker};
use vox_test_helpers::{BlockBuilder, FixtureCatalog, OneToOneVersification, book_of, paired_text};

fn vernacular() -> BookScript {
    book_of(
        "MRK",
        [
            BlockBuilder::new("p", 1)
                .verse("1", "vern one and ")
                .verse("2", "vern two together ")
                .build(),
            BlockBuilder::new("p", 1).verse("3", "vern three ").build(),
        ],
    )
}

fn reference_book() -> BookScript {
    book_of(
        "MRK",
        [
            BlockBuilder::new("p", 1).verse("1", "ref one ").speaker("narrator-MRK").build(),
            BlockBuilder::new("p", 1).verse("2", "ref two ").speaker("narrator-MRK").build(),
            BlockBuilder::new("p", 1).verse("3", "ref three ").speaker("narrator-MRK").build(),
        ],
    )
}

#[rstest]
fn apply_to_pairs_a_whole_book() -> Result<()> {
    let scheme = OneToOneVersification::new("fixture");
    let catalog = FixtureCatalog::new();
    let services = AlignmentServices {
        vernacular: &scheme,
        reference: &scheme,
        catalog: &catalog,
    };
    let mut text = ReferenceText::new("english", [reference_book()]);
    let mut vern = vernacular();

    let outcome = text.apply_to(&mut vern, &services);
    ensure!(
        outcome == AlignmentOutcome::Aligned { reference_modified: false },
        "alignment runs without touching the reference: {outcome:?}"
    );
    ensure!(vern.len() == 3, "the forced split created a block");
    ensure!(paired_text(&vern.blocks()[0]) == ["ref one "], "verse one pairs");
    ensure!(paired_text(&vern.blocks()[1]) == ["ref two "], "verse two pairs");
    ensure!(paired_text(&vern.blocks()[2]) == ["ref three "], "verse three pairs");

    // A second pass changes nothing.
    let again = vern.clone();
    text.apply_to(&mut vern, &services);
    ensure!(vern == again, "alignment is idempotent");
    ensure!(
        text.modified_books().is_empty(),
        "no reference book was modified"
    );
    Ok(())
}

#[rstest]
fn forced_reference_split_is_tracked_for_reload() -> Result<()> {
    let scheme = OneToOneVersification::new("fixture");
    let catalog = FixtureCatalog::new();
    let services = AlignmentServices {
        vernacular: &scheme,
        reference: &scheme,
        catalog: &catalog,
    };
    // The reference keeps verses 1 and 2 in one block; the vernacular has
    // them split, so the engine must cut the reference.
    let reference = book_of(
        "MRK",
        [BlockBuilder::new("p", 1)
            .verse("1", "ref one and ")
            .verse("2", "ref two together ")
            .build()],
    );
    let mut text = ReferenceText::new("english", [reference]);
    let mut vern = book_of(
        "MRK",
        [
            BlockBuilder::new("p", 1).verse("1", "vern one ").build(),
            BlockBuilder::new("p", 1).verse("2", "vern two ").build(),
        ],
    );

    let outcome = text.apply_to(&mut vern, &services);
    ensure!(
        outcome == AlignmentOutcome::Aligned { reference_modified: true },
        "the forced reference split must be reported: {outcome:?}"
    );
    ensure!(
        text.modified_books().contains("MRK"),
        "the modified book is tracked for reload"
    );
    Ok(())
}

#[rstest]
fn matchup_for_verse_aligns_and_commits_a_window() -> Result<()> {
    let scheme = OneToOneVersification::new("fixture");
    let catalog = FixtureCatalog::new();
    let services = AlignmentServices {
        vernacular: &scheme,
        reference: &scheme,
        catalog: &catalog,
    };
    let mut text = ReferenceText::new("english", [reference_book()]);
    let mut vern = vernacular();

    let matchup = text
        .matchup_for_verse(&vern, 1, &services)
        .context("window builds")?;
    ensure!(
        matchup.added_by_splitter() == 0,
        "the verse-three window needs no splits"
    );
    let state = matchup.match_state(&catalog);
    ensure!(state.matched, "the window aligned against the reference");

    let added = matchup
        .apply(&mut vern, &catalog)
        .context("apply succeeds")?;
    ensure!(added == 0, "no blocks were added");
    ensure!(
        paired_text(&vern.blocks()[1]) == ["ref three "],
        "the pairing landed on the live book"
    );
    ensure!(
        vern.blocks()[0].reference_blocks().is_empty(),
        "blocks outside the window stay untouched"
    );
    Ok(())
}

#[rstest]
fn matchup_window_splitter_growth_is_committed() -> Result<()> {
    let scheme = OneToOneVersification::new("fixture");
    let catalog = FixtureCatalog::new();
    let services = AlignmentServices {
        vernacular: &scheme,
        reference: &scheme,
        catalog: &catalog,
    };
    let mut text = ReferenceText::new("english", [reference_book()]);
    let mut vern = vernacular();

    // The first window covers verses 1-2 in one block; aligning it forces
    // a split inside the working copy.
    let matchup = text
        .matchup_for_verse(&vern, 0, &services)
        .context("window builds")?;
    ensure!(
        matchup.added_by_splitter() == 1,
        "the alignment split the working copy"
    );
    let added = matchup
        .apply(&mut vern, &catalog)
        .context("apply succeeds")?;
    ensure!(added == 1, "the extra block reaches the book");
    ensure!(vern.len() == 3, "the book grew by one block");
    ensure!(paired_text(&vern.blocks()[0]) == ["ref one "], "verse one pairs");
    ensure!(paired_text(&vern.blocks()[1]) == ["ref two "], "verse two pairs");
    Ok(())
}

#[rstest]
fn missing_reference_book_leaves_blocks_unpaired() -> Result<()> {
    let scheme = OneToOneVersification::new("fixture");
    let catalog = FixtureCatalog::new();
    let services = AlignmentServices {
        vernacular: &scheme,
        reference: &scheme,
        catalog: &catalog,
    };
    let mut text = ReferenceText::new("english", [reference_book()]);
    let mut luke = book_of(
        "LUK",
        [BlockBuilder::new("p", 1)
            .verse("1", "Many have undertaken ")
            .speaker("narrator-LUK")
            .build()],
    );
    let outcome = text.apply_to(&mut luke, &services);
    ensure!(
        outcome == AlignmentOutcome::NoReferenceBook,
        "a missing book is a first-class outcome: {outcome:?}"
    );
    ensure!(
        luke.blocks()[0].reference_blocks().is_empty()
            && luke.blocks()[0].speaker() == &Speaker::character("narrator-LUK"),
        "the vernacular book is untouched"
    );
    Ok(())
}
