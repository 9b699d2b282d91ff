//! Verse addressing shared by every script type.
//!
//! References are compared through a canonical `BBBCCCVVV` ordinal so that
//! two texts numbered under different versification schemes can still be
//! ordered against each other once each side is mapped to canonical form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical book codes in canon order, 1-based.
const BOOK_CODES: [&str; 66] = [
    "GEN", "EXO", "LEV", "NUM", "DEU", "JOS", "JDG", "RUT", "1SA", "2SA", "1KI", "2KI", "1CH",
    "2CH", "EZR", "NEH", "EST", "JOB", "PSA", "PRO", "ECC", "SNG", "ISA", "JER", "LAM", "EZK",
    "DAN", "HOS", "JOL", "AMO", "OBA", "JON", "MIC", "NAM", "HAB", "ZEP", "HAG", "ZEC", "MAL",
    "MAT", "MRK", "LUK", "JHN", "ACT", "ROM", "1CO", "2CO", "GAL", "EPH", "PHP", "COL", "1TH",
    "2TH", "1TI", "2TI", "TIT", "PHM", "HEB", "JAS", "1PE", "2PE", "1JN", "2JN", "3JN", "JUD",
    "REV",
];

/// Errors raised when normalising verse references and book identifiers.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RefError {
    /// A canonical book number fell outside the 1..=66 range.
    #[error("book number {number} is outside the canon")]
    BookNumberOutOfRange {
        /// The rejected number.
        number: u32,
    },
    /// A book code did not name a canonical book.
    #[error("unknown book code {code:?}")]
    UnknownBookCode {
        /// The rejected code.
        code: String,
    },
    /// A verse label trimmed to an empty string.
    #[error("verse labels must not be empty")]
    EmptyVerseLabel,
    /// A verse label contained something other than a number or bridge.
    #[error("verse label {label:?} is not a number or bridge")]
    MalformedVerseLabel {
        /// The rejected label.
        label: String,
    },
    /// A bridge label ran backwards, e.g. `"7-5"`.
    #[error("bridge {label:?} must not run backwards")]
    ReversedBridge {
        /// The rejected label.
        label: String,
    },
}

/// Validated 1-based canonical book number.
///
/// # Examples
///
/// ```
/// use vox_core::BookNum;
///
/// let romans = BookNum::from_code("ROM")?;
/// assert_eq!(romans.value(), 45);
/// assert_eq!(romans.code(), "ROM");
/// # Ok::<(), vox_core::RefError>(())
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BookNum(u32);

impl BookNum {
    /// Builds a book number after validating the canon range.
    ///
    /// # Errors
    ///
    /// Returns [`RefError::BookNumberOutOfRange`] for numbers outside
    /// `1..=66`.
    pub fn new(number: u32) -> Result<Self, RefError> {
        if number == 0 || number as usize > BOOK_CODES.len() {
            return Err(RefError::BookNumberOutOfRange { number });
        }
        Ok(Self(number))
    }

    /// Resolves a canonical book code such as `"MRK"`.
    ///
    /// # Errors
    ///
    /// Returns [`RefError::UnknownBookCode`] when the code is not part of the
    /// canon table.
    pub fn from_code(code: &str) -> Result<Self, RefError> {
        BOOK_CODES
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(code))
            .map_or_else(
                || {
                    Err(RefError::UnknownBookCode {
                        code: code.to_owned(),
                    })
                },
                |index| Ok(Self(index as u32 + 1)),
            )
    }

    /// Returns the 1-based canonical number.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns the canonical book code.
    #[must_use]
    pub fn code(self) -> &'static str {
        BOOK_CODES[(self.0 - 1) as usize]
    }
}

impl fmt::Display for BookNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl TryFrom<u32> for BookNum {
    type Error = RefError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BookNum> for u32 {
    fn from(value: BookNum) -> Self {
        value.0
    }
}

/// A single verse address.
///
/// Ordering is by the canonical `BBBCCCVVV` ordinal, which is what the
/// alignment engine compares after mapping each side to canonical form.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct VerseRef {
    book: BookNum,
    chapter: u32,
    verse: u32,
}

impl VerseRef {
    /// Builds a reference from its parts.
    #[must_use]
    pub const fn new(book: BookNum, chapter: u32, verse: u32) -> Self {
        Self {
            book,
            chapter,
            verse,
        }
    }

    /// Returns the book.
    #[must_use]
    pub const fn book(self) -> BookNum {
        self.book
    }

    /// Returns the chapter number.
    #[must_use]
    pub const fn chapter(self) -> u32 {
        self.chapter
    }

    /// Returns the verse number.
    #[must_use]
    pub const fn verse(self) -> u32 {
        self.verse
    }

    /// Returns the `BBBCCCVVV` ordinal used for cross-text ordering.
    #[must_use]
    pub const fn ordinal(self) -> u32 {
        self.book.value() * 1_000_000 + self.chapter * 1_000 + self.verse
    }

    /// Returns a copy addressing a different verse in the same chapter.
    #[must_use]
    pub const fn with_verse(self, verse: u32) -> Self {
        Self { verse, ..self }
    }
}

impl PartialOrd for VerseRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VerseRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

impl fmt::Display for VerseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.book, self.chapter, self.verse)
    }
}

/// A verse number or bridge, e.g. `5` or `5-7`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct VerseSpan {
    start: u32,
    end: u32,
}

impl VerseSpan {
    /// Builds a span covering a single verse.
    #[must_use]
    pub const fn single(verse: u32) -> Self {
        Self {
            start: verse,
            end: verse,
        }
    }

    /// Builds a bridge span.
    ///
    /// # Errors
    ///
    /// Returns [`RefError::ReversedBridge`] when `end` precedes `start`.
    pub fn bridge(start: u32, end: u32) -> Result<Self, RefError> {
        if end < start {
            return Err(RefError::ReversedBridge {
                label: format!("{start}-{end}"),
            });
        }
        Ok(Self { start, end })
    }

    /// Returns the first verse of the span.
    #[must_use]
    pub const fn start(self) -> u32 {
        self.start
    }

    /// Returns the last verse of the span.
    #[must_use]
    pub const fn end(self) -> u32 {
        self.end
    }

    /// Reports whether the span bridges more than one verse.
    #[must_use]
    pub const fn is_bridge(self) -> bool {
        self.end > self.start
    }

    /// Reports whether the span covers `verse`.
    #[must_use]
    pub const fn contains(self, verse: u32) -> bool {
        self.start <= verse && verse <= self.end
    }
}

impl FromStr for VerseSpan {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RefError::EmptyVerseLabel);
        }
        let malformed = || RefError::MalformedVerseLabel {
            label: trimmed.to_owned(),
        };
        match trimmed.split_once('-') {
            None => {
                let verse = trimmed.parse::<u32>().map_err(|_| malformed())?;
                Ok(Self::single(verse))
            }
            Some((start, end)) => {
                let start = start.trim().parse::<u32>().map_err(|_| malformed())?;
                let end = end.trim().parse::<u32>().map_err(|_| malformed())?;
                Self::bridge(start, end)
            }
        }
    }
}

impl fmt::Display for VerseSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bridge() {
            write!(f, "{}-{}", self.start, self.end)
        } else {
            write!(f, "{}", self.start)
        }
    }
}

/// Maps verse references between a named scheme and canonical form.
///
/// Implementations are injected into every entry point that compares
/// references across texts; nothing in the workspace consults a global
/// scheme registry. A scheme maps only the verses it relocates; everything
/// else passes through unchanged.
pub trait Versification {
    /// Returns the scheme name, e.g. `"English"`.
    fn name(&self) -> &str;

    /// Maps a reference expressed in this scheme to canonical form.
    fn to_canonical(&self, reference: VerseRef) -> VerseRef;

    /// Maps a canonical reference into this scheme.
    fn from_canonical(&self, reference: VerseRef) -> VerseRef;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("5", 5, 5)]
    #[case("5-7", 5, 7)]
    #[case(" 11-12 ", 11, 12)]
    fn parses_verse_labels(#[case] label: &str, #[case] start: u32, #[case] end: u32) {
        let span: VerseSpan = label.parse().expect("valid label");
        assert_eq!(span.start(), start);
        assert_eq!(span.end(), end);
    }

    #[rstest]
    #[case("")]
    #[case("five")]
    #[case("5-")]
    fn rejects_malformed_labels(#[case] label: &str) {
        assert!(label.parse::<VerseSpan>().is_err());
    }

    #[test]
    fn rejects_backwards_bridge() {
        let result = "7-5".parse::<VerseSpan>();
        assert!(matches!(result, Err(RefError::ReversedBridge { .. })));
    }

    #[test]
    fn ordinal_orders_across_chapters() {
        let book = BookNum::from_code("ROM").expect("canonical code");
        let earlier = VerseRef::new(book, 14, 23);
        let later = VerseRef::new(book, 16, 25);
        assert!(earlier < later);
        assert_eq!(earlier.ordinal(), 45_014_023);
    }

    #[test]
    fn book_codes_round_trip() {
        for number in 1..=66 {
            let book = BookNum::new(number).expect("in canon");
            assert_eq!(BookNum::from_code(book.code()), Ok(book));
        }
    }
}
