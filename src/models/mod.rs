//! The model BIN format: header, per-segment decoders, and the assembled model.

pub mod collision;
pub mod display_list;
pub mod geo_layout;
pub mod header;
pub mod model;
pub mod texture;
pub mod vertex;

#[cfg(test)]
pub(crate) mod test_support;

use crate::data::parser_utils::{self, ReadError};
use crate::error::{DecodeError, DecodeResult, SegmentKind};

/// A byte range of the model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SegmentSpan {
    pub offset: usize,
    pub len: usize,
}

impl SegmentSpan {
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.len)
    }
}

/// Bounds-checked view of one segment. Offsets given to its readers are relative to
/// the segment start, and every failed read reports the segment it happened in.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SegmentView<'a> {
    kind: SegmentKind,
    base: usize,
    data: &'a [u8],
}

impl<'a> SegmentView<'a> {
    pub fn new(buffer: &'a [u8], kind: SegmentKind, span: SegmentSpan) -> DecodeResult<Self> {
        let data = parser_utils::window(buffer, span.offset, span.len).map_err(|_| {
            DecodeError::SegmentOutOfBounds {
                segment: kind,
                offset: span.offset,
                len: span.len,
                available: buffer.len(),
            }
        })?;
        Ok(Self {
            kind,
            base: span.offset,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    fn out_of_bounds(&self, offset: usize, len: usize) -> DecodeError {
        DecodeError::SegmentOutOfBounds {
            segment: self.kind,
            offset: self.base.saturating_add(offset),
            len,
            available: self.base + self.data.len(),
        }
    }

    fn map_read<T>(&self, result: Result<T, ReadError>, offset: usize, len: usize) -> DecodeResult<T> {
        result.map_err(|_| self.out_of_bounds(offset, len))
    }

    pub fn bytes(&self, offset: usize, len: usize) -> DecodeResult<&'a [u8]> {
        let data = self.data;
        self.map_read(parser_utils::window(data, offset, len), offset, len)
    }

    pub fn u8(&self, offset: usize) -> DecodeResult<u8> {
        self.map_read(parser_utils::read_u8(self.data, offset), offset, 1)
    }

    pub fn u16(&self, offset: usize) -> DecodeResult<u16> {
        self.map_read(parser_utils::read_u16(self.data, offset), offset, 2)
    }

    pub fn i16(&self, offset: usize) -> DecodeResult<i16> {
        self.map_read(parser_utils::read_i16(self.data, offset), offset, 2)
    }

    pub fn u32(&self, offset: usize) -> DecodeResult<u32> {
        self.map_read(parser_utils::read_u32(self.data, offset), offset, 4)
    }

    pub fn f32(&self, offset: usize) -> DecodeResult<f32> {
        self.map_read(parser_utils::read_f32(self.data, offset), offset, 4)
    }

    pub fn i16x3(&self, offset: usize) -> DecodeResult<[i16; 3]> {
        Ok([
            self.i16(offset)?,
            self.i16(offset + 2)?,
            self.i16(offset + 4)?,
        ])
    }

    pub fn f32x3(&self, offset: usize) -> DecodeResult<[f32; 3]> {
        Ok([
            self.f32(offset)?,
            self.f32(offset + 4)?,
            self.f32(offset + 8)?,
        ])
    }

    /// Number of `width`-byte elements from `start` to the segment end.
    pub fn element_count(&self, start: usize, width: usize) -> DecodeResult<usize> {
        let Some(remaining) = self.data.len().checked_sub(start) else {
            return Err(self.out_of_bounds(start, 0));
        };
        if remaining % width != 0 {
            return Err(DecodeError::MisalignedSegment {
                segment: self.kind,
                len: remaining,
                element_width: width,
            });
        }
        Ok(remaining / width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn views_reject_spans_past_the_buffer() {
        let buffer = [0u8; 16];
        let err = SegmentView::new(
            &buffer,
            SegmentKind::Vertex,
            SegmentSpan {
                offset: 12,
                len: 8,
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::SegmentOutOfBounds {
                segment: SegmentKind::Vertex,
                offset: 12,
                len: 8,
                available: 16
            }
        ));
    }

    #[test]
    fn reads_are_segment_relative() {
        let buffer = [0, 0, 0, 0, 0x12, 0x34, 0xFF, 0xFE];
        let view = SegmentView::new(
            &buffer,
            SegmentKind::Texture,
            SegmentSpan { offset: 4, len: 4 },
        )
        .unwrap();
        assert_eq!(view.u16(0).unwrap(), 0x1234);
        assert_eq!(view.i16(2).unwrap(), -2);
        assert!(matches!(
            view.u32(2),
            Err(DecodeError::SegmentOutOfBounds {
                segment: SegmentKind::Texture,
                offset: 6,
                ..
            })
        ));
    }

    #[test]
    fn element_counts_must_divide_evenly() {
        let buffer = [0u8; 20];
        let view = SegmentView::new(
            &buffer,
            SegmentKind::DisplayList,
            SegmentSpan { offset: 0, len: 20 },
        )
        .unwrap();
        assert_eq!(view.element_count(4, 8).unwrap(), 2);
        assert!(matches!(
            view.element_count(0, 8),
            Err(DecodeError::MisalignedSegment {
                segment: SegmentKind::DisplayList,
                len: 20,
                element_width: 8
            })
        ));
    }
}
