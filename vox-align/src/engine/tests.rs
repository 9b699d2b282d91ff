//! Behavioural tests for the block matcher.

use rstest::{fixture, rstest};
use vox_core::{BookNum, PortionScript, Speaker};
use vox_test_helpers::{
    BlockBuilder, FixtureCatalog, OneToOneVersification, RelocatedEndVersification, paired_text,
    portion_of,
};

use super::align;
use crate::reference::AlignmentServices;

fn mark() -> BookNum {
    BookNum::from_code("MRK").expect("canonical code")
}

fn romans() -> BookNum {
    BookNum::from_code("ROM").expect("canonical code")
}

#[fixture]
fn catalog() -> FixtureCatalog {
    FixtureCatalog::new()
}

#[fixture]
fn scheme() -> OneToOneVersification {
    OneToOneVersification::new("fixture")
}

fn run_align(
    vern: &mut PortionScript,
    reference: &mut PortionScript,
    book: BookNum,
    catalog: &FixtureCatalog,
    scheme: &OneToOneVersification,
) -> bool {
    let services = AlignmentServices {
        vernacular: scheme,
        reference: scheme,
        catalog,
    };
    align(vern, reference, book, &services)
}

#[rstest]
fn pairs_identically_segmented_books(catalog: FixtureCatalog, scheme: OneToOneVersification) {
    let mut vern = portion_of(
        "MRK",
        [
            BlockBuilder::new("p", 1).verse("1", "vern one ").build(),
            BlockBuilder::new("p", 1).verse("2", "vern two ").build(),
        ],
    );
    let mut reference = portion_of(
        "MRK",
        [
            BlockBuilder::new("p", 1).verse("1", "ref one ").build(),
            BlockBuilder::new("p", 1).verse("2", "ref two ").build(),
        ],
    );
    let modified = run_align(&mut vern, &mut reference, mark(), &catalog, &scheme);
    assert!(!modified);
    assert_eq!(paired_text(&vern.blocks()[0]), ["ref one "]);
    assert_eq!(paired_text(&vern.blocks()[1]), ["ref two "]);
    assert!(vern.blocks().iter().all(|b| b.matches_reference_text()));
}

#[rstest]
fn forces_reference_splits_into_vernacular(
    catalog: FixtureCatalog,
    scheme: OneToOneVersification,
) {
    let mut vern = portion_of(
        "MRK",
        [BlockBuilder::new("p", 1)
            .verse("1", "vern one and ")
            .verse("2", "vern two together ")
            .build()],
    );
    let mut reference = portion_of(
        "MRK",
        [
            BlockBuilder::new("p", 1).verse("1", "ref one ").build(),
            BlockBuilder::new("p", 1).verse("2", "ref two ").build(),
        ],
    );
    run_align(&mut vern, &mut reference, mark(), &catalog, &scheme);
    assert_eq!(vern.len(), 2);
    assert_eq!(paired_text(&vern.blocks()[0]), ["ref one "]);
    assert_eq!(paired_text(&vern.blocks()[1]), ["ref two "]);
}

#[rstest]
fn forces_vernacular_splits_into_reference(
    catalog: FixtureCatalog,
    scheme: OneToOneVersification,
) {
    let mut vern = portion_of(
        "MRK",
        [
            BlockBuilder::new("p", 1).verse("1", "vern one ").build(),
            BlockBuilder::new("p", 1).verse("2", "vern two ").build(),
        ],
    );
    let mut reference = portion_of(
        "MRK",
        [BlockBuilder::new("p", 1)
            .verse("1", "ref one and ")
            .verse("2", "ref two together ")
            .build()],
    );
    let modified = run_align(&mut vern, &mut reference, mark(), &catalog, &scheme);
    assert!(modified, "the reference book must report its forced split");
    assert_eq!(reference.len(), 2);
    assert_eq!(paired_text(&vern.blocks()[0]), ["ref one and "]);
    assert_eq!(paired_text(&vern.blocks()[1]), ["ref two together "]);
}

#[rstest]
fn combines_reference_blocks_for_a_vernacular_bridge(
    catalog: FixtureCatalog,
    scheme: OneToOneVersification,
) {
    let mut vern = portion_of(
        "MRK",
        [BlockBuilder::new("p", 1)
            .verse("3-4", "vern bridge of three and four ")
            .build()],
    );
    let mut reference = portion_of(
        "MRK",
        [
            BlockBuilder::new("p", 1).verse("3", "ref three ").build(),
            BlockBuilder::new("p", 1).verse("4", "ref four ").build(),
        ],
    );
    run_align(&mut vern, &mut reference, mark(), &catalog, &scheme);
    assert_eq!(vern.len(), 1, "a bridge cannot be split");
    assert_eq!(
        paired_text(&vern.blocks()[0]),
        ["ref three ", "ref four "]
    );
    assert!(vern.blocks()[0].matches_reference_text());
}

#[rstest]
fn shares_a_reference_bridge_across_vernacular_blocks(
    catalog: FixtureCatalog,
    scheme: OneToOneVersification,
) {
    let mut vern = portion_of(
        "MRK",
        [
            BlockBuilder::new("p", 1).verse("10", "vern ten ").build(),
            BlockBuilder::new("p", 1)
                .verse("11-12", "vern eleven twelve ")
                .build(),
        ],
    );
    let mut reference = portion_of(
        "MRK",
        [BlockBuilder::new("p", 1)
            .verse("10-12", "ref ten through twelve ")
            .build()],
    );
    run_align(&mut vern, &mut reference, mark(), &catalog, &scheme);
    assert_eq!(
        paired_text(&vern.blocks()[0]),
        ["ref ten through twelve "]
    );
    assert_eq!(
        paired_text(&vern.blocks()[1]),
        ["ref ten through twelve "]
    );
    assert!(vern.blocks().iter().all(|b| b.matches_reference_text()));
}

#[rstest]
fn pairs_chapter_announcements_and_skips_missing_ones(
    catalog: FixtureCatalog,
    scheme: OneToOneVersification,
) {
    let mut vern = portion_of(
        "MRK",
        [
            BlockBuilder::new("c", 1)
                .leading_text("0", "Chapter 1")
                .speaker("chapter-MRK")
                .build(),
            BlockBuilder::new("p", 1).verse("1", "vern one ").build(),
            BlockBuilder::new("s", 1)
                .leading_text("1", "A heading with no counterpart")
                .speaker("section-MRK")
                .build(),
            BlockBuilder::new("p", 1).verse("2", "vern two ").build(),
        ],
    );
    let mut reference = portion_of(
        "MRK",
        [
            BlockBuilder::new("c", 1)
                .leading_text("0", "Chapter 1")
                .speaker("chapter-MRK")
                .build(),
            BlockBuilder::new("p", 1).verse("1", "ref one ").build(),
            BlockBuilder::new("p", 1).verse("2", "ref two ").build(),
        ],
    );
    run_align(&mut vern, &mut reference, mark(), &catalog, &scheme);
    assert_eq!(paired_text(&vern.blocks()[0]), ["Chapter 1"]);
    assert_eq!(paired_text(&vern.blocks()[1]), ["ref one "]);
    assert!(
        vern.blocks()[2].reference_blocks().is_empty(),
        "a heading without a counterpart is skipped, not mismatched"
    );
    assert_eq!(paired_text(&vern.blocks()[3]), ["ref two "]);
}

#[rstest]
fn abandons_remainder_when_reference_is_exhausted(
    catalog: FixtureCatalog,
    scheme: OneToOneVersification,
) {
    let mut vern = portion_of(
        "MRK",
        [
            BlockBuilder::new("p", 1).verse("1", "vern one ").build(),
            BlockBuilder::new("p", 2).verse("1", "vern chapter two ").build(),
        ],
    );
    let mut reference = portion_of(
        "MRK",
        [BlockBuilder::new("p", 1).verse("1", "ref one ").build()],
    );
    run_align(&mut vern, &mut reference, mark(), &catalog, &scheme);
    assert_eq!(paired_text(&vern.blocks()[0]), ["ref one "]);
    assert!(vern.blocks()[1].reference_blocks().is_empty());
    assert!(!vern.blocks()[1].matches_reference_text());
}

#[rstest]
fn irreconcilable_chunk_degrades_to_unmatched_state(
    catalog: FixtureCatalog,
    scheme: OneToOneVersification,
) {
    // Vernacular bridges 7-8; the reference bridges 8-9. Neither side can
    // be split to agree, and the chunk pairs disagree on both ends.
    let mut vern = portion_of(
        "MRK",
        [
            BlockBuilder::new("p", 1).verse("7-8", "vern seven eight ").build(),
            BlockBuilder::new("p", 1).verse("9", "vern nine ").build(),
        ],
    );
    let mut reference = portion_of(
        "MRK",
        [
            BlockBuilder::new("p", 1).verse("7", "ref seven ").build(),
            BlockBuilder::new("p", 1).verse("8-9", "ref eight nine ").build(),
        ],
    );
    run_align(&mut vern, &mut reference, mark(), &catalog, &scheme);
    assert!(!vern.blocks()[0].matches_reference_text());
    assert_eq!(
        paired_text(&vern.blocks()[0]),
        ["ref seven ", "ref eight nine "],
        "the candidates surface on the first block of the chunk"
    );
    assert!(!vern.blocks()[1].matches_reference_text());
    assert!(vern.blocks()[1].reference_blocks().is_empty());
}

#[rstest]
fn alignment_is_idempotent(catalog: FixtureCatalog, scheme: OneToOneVersification) {
    let mut vern = portion_of(
        "MRK",
        [
            BlockBuilder::new("p", 1)
                .verse("1", "vern one and ")
                .verse("2", "vern two together ")
                .build(),
            BlockBuilder::new("p", 1).verse("3-4", "vern bridge ").build(),
        ],
    );
    let mut reference = portion_of(
        "MRK",
        [
            BlockBuilder::new("p", 1).verse("1", "ref one ").build(),
            BlockBuilder::new("p", 1).verse("2", "ref two ").build(),
            BlockBuilder::new("p", 1).verse("3", "ref three ").build(),
            BlockBuilder::new("p", 1).verse("4", "ref four ").build(),
        ],
    );
    run_align(&mut vern, &mut reference, mark(), &catalog, &scheme);
    let first_pass = vern.clone();
    let modified = run_align(&mut vern, &mut reference, mark(), &catalog, &scheme);
    assert!(!modified, "a second pass must not split the reference again");
    assert_eq!(vern, first_pass);
}

#[rstest]
fn preserves_clean_verse_breaks_across_texts(
    catalog: FixtureCatalog,
    scheme: OneToOneVersification,
) {
    let mut vern = portion_of(
        "MRK",
        [BlockBuilder::new("p", 1)
            .verse("1", "one ")
            .verse("2", "two ")
            .verse("3", "three ")
            .build()],
    );
    let mut reference = portion_of(
        "MRK",
        [
            BlockBuilder::new("p", 1).verse("1", "ref one ").build(),
            BlockBuilder::new("p", 1).verse("2", "ref two ").verse("3", "ref three ").build(),
        ],
    );
    run_align(&mut vern, &mut reference, mark(), &catalog, &scheme);
    let vern_breaks: Vec<u32> = vern
        .blocks()
        .iter()
        .skip(1)
        .map(|block| block.initial_start_verse())
        .collect();
    // Every clean verse break in the reference is now a clean break in the
    // vernacular as well.
    assert_eq!(vern_breaks, [2]);
    assert!(vern.blocks().iter().skip(1).all(|b| b.starts_at_verse_start()));
}

#[rstest]
fn follows_material_relocated_from_the_end_of_the_book(catalog: FixtureCatalog) {
    // The vernacular numbers the doxology as 14:24-26; the reference keeps
    // it at 16:25-27, at the very end of the book.
    let vern_scheme =
        RelocatedEndVersification::new("relocated", romans(), (14, 24), (16, 25), 3);
    let ref_scheme = OneToOneVersification::new("canonical");
    let services = AlignmentServices {
        vernacular: &vern_scheme,
        reference: &ref_scheme,
        catalog: &catalog,
    };

    let mut vern = portion_of(
        "ROM",
        [
            BlockBuilder::new("p", 14).verse("23", "vern judgement ").build(),
            BlockBuilder::new("p", 14)
                .verse("24", "vern doxology begins ")
                .verse("25", "vern doxology middle ")
                .verse("26", "vern doxology ends ")
                .build(),
            BlockBuilder::new("p", 15).verse("1", "vern the strong ").build(),
        ],
    );
    let mut reference = portion_of(
        "ROM",
        [
            BlockBuilder::new("p", 14).verse("23", "ref judgement ").build(),
            BlockBuilder::new("p", 15).verse("1", "ref the strong ").build(),
            BlockBuilder::new("p", 16).verse("24", "ref greeting ").build(),
            BlockBuilder::new("p", 16)
                .verse("25", "ref doxology begins ")
                .verse("26", "ref doxology middle ")
                .verse("27", "ref doxology ends ")
                .build(),
        ],
    );

    align(&mut vern, &mut reference, romans(), &services);
    assert_eq!(paired_text(&vern.blocks()[0]), ["ref judgement "]);
    assert_eq!(
        paired_text(&vern.blocks()[1]),
        ["ref doxology begins ref doxology middle ref doxology ends "]
    );
    assert!(vern.blocks()[1].matches_reference_text());
    // The cursor resumes where it left off, so chapter 15 still pairs.
    assert_eq!(paired_text(&vern.blocks()[2]), ["ref the strong "]);
}

#[rstest]
fn speakers_do_not_affect_pairing(catalog: FixtureCatalog, scheme: OneToOneVersification) {
    let mut vern = portion_of(
        "MRK",
        [BlockBuilder::new("p", 1).verse("1", "vern one ").build()],
    );
    vern.block_mut(0)
        .expect("block exists")
        .set_speaker(Speaker::character("Jesus"));
    let mut reference = portion_of(
        "MRK",
        [BlockBuilder::new("p", 1).verse("1", "ref one ").build()],
    );
    run_align(&mut vern, &mut reference, mark(), &catalog, &scheme);
    assert!(vern.blocks()[0].matches_reference_text());
    assert_eq!(vern.blocks()[0].speaker(), &Speaker::character("Jesus"));
}
