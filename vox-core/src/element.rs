//! Atomic content units stored inside a block.
//!
//! Mixed content is modelled as a [`BlockElement`] enum so a block can hold
//! literal text runs, verse markers, and non-spoken production cues in one
//! ordered list. Verse markers carry their original label so bridges such as
//! `"11-12"` survive round-tripping.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::refs::{RefError, VerseSpan};

/// Content occurring inside a block.
///
/// # Examples
///
/// ```
/// use vox_core::BlockElement;
///
/// let marker = BlockElement::verse("5")?;
/// let words = BlockElement::text("Jesus wept.");
/// assert_eq!(words.as_text(), Some("Jesus wept."));
/// assert!(marker.as_text().is_none());
/// # Ok::<(), vox_core::RefError>(())
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockElement {
    /// Literal rendered text.
    Text {
        /// The text run.
        content: String,
    },
    /// A verse number or bridge marker.
    Verse {
        /// The validated marker.
        number: VerseNum,
    },
    /// A non-spoken production cue.
    Annotation {
        /// The cue itself.
        cue: Annotation,
    },
}

impl BlockElement {
    /// Builds a plain text run.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Builds a verse marker from a label such as `"5"` or `"5-7"`.
    ///
    /// # Errors
    ///
    /// Returns [`RefError`] when the label is not a verse number or bridge.
    pub fn verse(label: impl Into<String>) -> Result<Self, RefError> {
        Ok(Self::Verse {
            number: VerseNum::new(label)?,
        })
    }

    /// Builds a pause cue.
    #[must_use]
    pub const fn pause(millis: u32) -> Self {
        Self::Annotation {
            cue: Annotation::Pause { millis },
        }
    }

    /// Builds a sound-effect cue.
    #[must_use]
    pub fn sound(effect: impl Into<String>) -> Self {
        Self::Annotation {
            cue: Annotation::Sound {
                effect: effect.into(),
            },
        }
    }

    /// Returns the contained text when this is a [`BlockElement::Text`] run.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { content } => Some(content.as_str()),
            _ => None,
        }
    }

    /// Returns the verse marker when this is a [`BlockElement::Verse`].
    #[must_use]
    pub const fn as_verse(&self) -> Option<&VerseNum> {
        match self {
            Self::Verse { number } => Some(number),
            _ => None,
        }
    }

    /// Reports whether this element is a production annotation.
    #[must_use]
    pub const fn is_annotation(&self) -> bool {
        matches!(self, Self::Annotation { .. })
    }
}

/// Validated verse marker label.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VerseNum {
    label: String,
    span: VerseSpan,
}

impl VerseNum {
    /// Builds a marker from a label such as `"5"` or `"5-7"`.
    ///
    /// # Errors
    ///
    /// Returns [`RefError`] when the label is empty, malformed, or a
    /// backwards bridge.
    pub fn new(label: impl Into<String>) -> Result<Self, RefError> {
        let label = label.into();
        let span: VerseSpan = label.parse()?;
        // Store the normalised rendering so "5 - 7" and "5-7" compare equal.
        Ok(Self {
            label: span.to_string(),
            span,
        })
    }

    /// Returns the marker label.
    #[must_use]
    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    /// Returns the covered span.
    #[must_use]
    pub const fn span(&self) -> VerseSpan {
        self.span
    }

    /// Returns the first verse the marker covers.
    #[must_use]
    pub const fn start_verse(&self) -> u32 {
        self.span.start()
    }

    /// Returns the last verse the marker covers.
    #[must_use]
    pub const fn end_verse(&self) -> u32 {
        self.span.end()
    }

    /// Returns the bridge end, or `None` when the marker is a single verse.
    #[must_use]
    pub const fn bridge_end(&self) -> Option<u32> {
        if self.span.is_bridge() {
            Some(self.span.end())
        } else {
            None
        }
    }
}

impl fmt::Display for VerseNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label.as_str())
    }
}

impl TryFrom<String> for VerseNum {
    type Error = RefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VerseNum> for String {
    fn from(value: VerseNum) -> Self {
        value.label
    }
}

/// Non-spoken production cue.
///
/// Cues never contribute to spoken text; they render through
/// [`Annotation::script_text`] only when a caller asks for annotations.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "cue", rename_all = "snake_case")]
pub enum Annotation {
    /// A timed pause.
    Pause {
        /// Pause length in milliseconds.
        millis: u32,
    },
    /// A sound effect.
    Sound {
        /// Free-text effect description.
        effect: String,
    },
}

impl Annotation {
    /// Renders the cue the way it appears in a recording script.
    #[must_use]
    pub fn script_text(&self) -> String {
        match self {
            Self::Pause { millis } => format!("||| pause {millis}ms |||"),
            Self::Sound { effect } => format!("{{SFX: {effect}}}"),
        }
    }
}
