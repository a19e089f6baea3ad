use std::fmt;

use thiserror::Error;

use crate::data::compression::CompressionError;
use crate::data::parser_utils::ReadError;

/// The segments a model file's header points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SegmentKind {
    Header,
    GeoLayout,
    Texture,
    DisplayList,
    Vertex,
    Bone,
    Collision,
    Effects,
    AnimatedTexture,
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SegmentKind::Header => "header",
            SegmentKind::GeoLayout => "geometry layout",
            SegmentKind::Texture => "texture",
            SegmentKind::DisplayList => "display list",
            SegmentKind::Vertex => "vertex",
            SegmentKind::Bone => "bone",
            SegmentKind::Collision => "collision",
            SegmentKind::Effects => "effects",
            SegmentKind::AnimatedTexture => "animated texture",
        };
        f.write_str(name)
    }
}

/// Which element of the model a dangling reference was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ElementRef {
    /// A triangle drawn by the display-list command at this byte offset
    /// into the command area.
    DrawnTriangle { command_offset: usize },
    /// A triangle at this index of the collision triangle table.
    CollisionTriangle { index: usize },
    /// A display-list command at this byte offset into the command area.
    Command { offset: usize },
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementRef::DrawnTriangle { command_offset } => {
                write!(f, "triangle drawn at command 0x{command_offset:X}")
            }
            ElementRef::CollisionTriangle { index } => write!(f, "collision triangle {index}"),
            ElementRef::Command { offset } => write!(f, "command at 0x{offset:X}"),
        }
    }
}

/// An out-of-range cross-segment reference found during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[error("{element} references {target} entry {index}, but only {bound} exist")]
pub struct DanglingReference {
    pub element: ElementRef,
    pub target: SegmentKind,
    pub index: usize,
    pub bound: usize,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown model id: {0}")]
    UnknownModelId(String),
    #[error("read of 0x{len:X} bytes at 0x{offset:X} is out of bounds (have 0x{available:X})")]
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },
    #[error(
        "{segment} segment read of 0x{len:X} bytes at 0x{offset:X} is out of bounds (have 0x{available:X})"
    )]
    SegmentOutOfBounds {
        segment: SegmentKind,
        offset: usize,
        len: usize,
        available: usize,
    },
    #[error("corrupt compressed stream")]
    CorruptStream(#[from] CompressionError),
    #[error("model header truncated: need 0x{need:X} bytes, have 0x{have:X}")]
    TruncatedHeader { need: usize, have: usize },
    #[error("{segment} segment length 0x{len:X} is not a multiple of its 0x{element_width:X}-byte elements")]
    MisalignedSegment {
        segment: SegmentKind,
        len: usize,
        element_width: usize,
    },
    #[error("dangling reference: {0}")]
    DanglingReference(#[from] DanglingReference),
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl From<ReadError> for DecodeError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::OutOfBounds { offset, width, len } => DecodeError::OutOfBounds {
                offset,
                len: width,
                available: len,
            },
            ReadError::UnsupportedWidth(width) => {
                DecodeError::InvalidOption(format!("unsupported integer width {width}"))
            }
        }
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;
