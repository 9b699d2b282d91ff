//! Speaker identity and the injected character-classification seam.
//!
//! A block's speaker is either a named character or one of two explicit
//! "unclear" states. The legacy string sentinels survive only at the serde
//! boundary so persisted projects keep their on-disk vocabulary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::refs::{BookNum, VerseSpan, Versification};

const UNKNOWN_ID: &str = "unknown";
const AMBIGUOUS_ID: &str = "ambiguous";

/// Speaker identity attached to a block.
///
/// # Examples
///
/// ```
/// use vox_core::Speaker;
///
/// let peter = Speaker::character("Peter");
/// assert_eq!(peter.as_str(), "Peter");
/// assert!(!peter.is_unclear());
/// assert!(Speaker::Ambiguous.is_unclear());
/// ```
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Speaker {
    /// No decision has been made yet; the block needs confirmation.
    #[default]
    Unknown,
    /// More than one real speaker was proposed and none was chosen.
    Ambiguous,
    /// A resolved character identity.
    Character(String),
}

impl Speaker {
    /// Builds a named character identity.
    #[must_use]
    pub fn character(id: impl Into<String>) -> Self {
        Self::Character(id.into())
    }

    /// Returns the identity string, using the legacy sentinels for the
    /// unclear states.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unknown => UNKNOWN_ID,
            Self::Ambiguous => AMBIGUOUS_ID,
            Self::Character(id) => id.as_str(),
        }
    }

    /// Reports whether the speaker still needs a human decision.
    #[must_use]
    pub const fn is_unclear(&self) -> bool {
        matches!(self, Self::Unknown | Self::Ambiguous)
    }

    /// Reports whether the identity names several candidate characters at
    /// once, e.g. `"Peter/Andrew"`.
    #[must_use]
    pub fn is_multi_choice(&self) -> bool {
        match self {
            Self::Character(id) => id.contains('/'),
            _ => false,
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Speaker {
    fn from(value: String) -> Self {
        match value.as_str() {
            UNKNOWN_ID => Self::Unknown,
            AMBIGUOUS_ID => Self::Ambiguous,
            _ => Self::Character(value),
        }
    }
}

impl From<Speaker> for String {
    fn from(value: Speaker) -> Self {
        match value {
            Speaker::Character(id) => id,
            other => other.as_str().to_owned(),
        }
    }
}

/// Standard (non-dialogue) speaker roles a book always carries.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StandardSpeaker {
    /// The voice reading the book title.
    BookTitle,
    /// The voice announcing each chapter.
    ChapterAnnouncement,
    /// The voice reading section headings.
    SectionHead,
    /// The voice reading introductory material.
    Intro,
    /// The narrator of the book body.
    Narrator,
}

impl StandardSpeaker {
    /// Reports whether material spoken in this role is extra-biblical,
    /// i.e. not part of the translated scripture text itself.
    #[must_use]
    pub const fn is_extra_biblical(self) -> bool {
        !matches!(self, Self::Narrator)
    }
}

/// Injected read-only character classification service.
///
/// The engine never consults process-wide character tables; every entry
/// point that needs classification receives an implementation of this
/// trait, which keeps splitting and alignment testable against fixture
/// data.
pub trait CharacterCatalog {
    /// Returns the standard role a speaker id denotes, if any.
    fn standard_kind(&self, speaker_id: &str) -> Option<StandardSpeaker>;

    /// Returns the speaker id for a standard role in the given book.
    fn standard_speaker(&self, book: BookNum, kind: StandardSpeaker) -> String;

    /// Returns the ordered candidate speakers for a verse range, used when
    /// resolving a multi-choice id during a user-initiated split.
    fn matching_speakers(
        &self,
        book: BookNum,
        chapter: u32,
        span: VerseSpan,
        versification: &dyn Versification,
    ) -> Vec<String>;

    /// Reports whether a speaker id denotes a standard role.
    fn is_standard(&self, speaker_id: &str) -> bool {
        self.standard_kind(speaker_id).is_some()
    }

    /// Reports whether a speaker id denotes extra-biblical material.
    fn is_extra_biblical(&self, speaker_id: &str) -> bool {
        self.standard_kind(speaker_id)
            .is_some_and(StandardSpeaker::is_extra_biblical)
    }
}
