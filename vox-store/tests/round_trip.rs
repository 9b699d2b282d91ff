//! Round-trip tests for stored book scripts.

use anyhow::{Context, Result, ensure};
use rstest::rstest;
use vox_align::BookSource;
use vox_core::{BookScript, MultiBlockQuote, Speaker};
use vox_store::{FileBookSource, load_book, load_book_snapshot, save_book, save_book_snapshot};
use vox_test_helpers::{BlockBuilder, book_of};

fn fixture_book() -> BookScript {
    let mut quoted = BlockBuilder::new("p", 1)
        .verse("2", "He said, ")
        .speaker("Jesus")
        .delivery("gentle")
        .confirmed()
        .quote(MultiBlockQuote::Start)
        .build();
    quoted.set_speaker_override("Jesus");
    book_of(
        "MRK",
        [
            BlockBuilder::new("p", 1).verse("1", "The beginning. ").build(),
            quoted,
            BlockBuilder::new("p", 1)
                .leading_text("2", "go in peace.")
                .flowing()
                .quote(MultiBlockQuote::Continuation)
                .build(),
        ],
    )
}

#[rstest]
fn json_round_trip_preserves_every_field() -> Result<()> {
    let dir = tempfile::tempdir().context("temp dir")?;
    let book = fixture_book();
    let path = save_book(dir.path(), &book).context("save")?;
    let restored = load_book(&path).context("load")?;
    ensure!(restored == book, "JSON round trip must be lossless");
    ensure!(
        restored.blocks()[1].speaker() == &Speaker::character("Jesus"),
        "speaker survives the trip"
    );
    Ok(())
}

#[rstest]
fn snapshot_round_trip_preserves_every_field() -> Result<()> {
    let dir = tempfile::tempdir().context("temp dir")?;
    let book = fixture_book();
    let path = save_book_snapshot(dir.path(), &book).context("save")?;
    let restored = load_book_snapshot(&path).context("load")?;
    ensure!(restored == book, "snapshot round trip must be lossless");
    Ok(())
}

#[rstest]
fn file_source_loads_texts_and_detects_replacement() -> Result<()> {
    let dir = tempfile::tempdir().context("temp dir")?;
    let text_dir = dir.path().join("english");
    save_book(&text_dir, &fixture_book()).context("seed book")?;

    let source = FileBookSource::new(dir.path());
    let books = source.load_books("english").context("load text")?;
    ensure!(books.len() == 1, "one book stored");
    ensure!(books[0].id() == "MRK", "book id preserved");
    ensure!(
        !source.is_replaced("english", "MRK"),
        "freshly loaded book is current"
    );

    // Replace the file on disk with a bumped modification time.
    let path = save_book(&text_dir, &fixture_book()).context("rewrite book")?;
    let file = std::fs::File::options()
        .write(true)
        .open(&path)
        .context("open for touch")?;
    file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(5))
        .context("bump mtime")?;
    ensure!(
        source.is_replaced("english", "MRK"),
        "replaced file must be detected"
    );

    let missing = source.load_books("nonexistent");
    ensure!(missing.is_err(), "unknown text is an error");
    Ok(())
}
