use std::fmt;

/// A value that was either recognized as a known variant `T`, or is an
/// unrecognized raw value `Raw` read straight from the file.
///
/// Model files carry enumerations (texture formats, sound effects, layout
/// commands) whose full value space is not documented. Unknown values are kept
/// so callers can still inspect or report them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Recognized<T, Raw = u32> {
    Known(T),
    Unknown(Raw),
}

impl<T: Copy, Raw: Copy> Copy for Recognized<T, Raw> {}

impl<T, Raw> Recognized<T, Raw> {
    /// Classify `raw` with a fallible conversion, keeping it on failure.
    pub fn from_raw(raw: Raw, recognize: impl FnOnce(&Raw) -> Option<T>) -> Self {
        match recognize(&raw) {
            Some(known) => Recognized::Known(known),
            None => Recognized::Unknown(raw),
        }
    }

    pub fn known(&self) -> Option<&T> {
        match self {
            Recognized::Known(t) => Some(t),
            Recognized::Unknown(_) => None,
        }
    }

    pub fn unknown(&self) -> Option<&Raw> {
        match self {
            Recognized::Known(_) => None,
            Recognized::Unknown(raw) => Some(raw),
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Recognized::Known(_))
    }
}

impl<T, Raw> From<T> for Recognized<T, Raw> {
    fn from(value: T) -> Self {
        Recognized::Known(value)
    }
}

impl<T: fmt::Debug, Raw: fmt::LowerHex> fmt::Display for Recognized<T, Raw> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recognized::Known(t) => write!(f, "{t:?}"),
            Recognized::Unknown(raw) => write!(f, "unknown(0x{raw:x})"),
        }
    }
}
