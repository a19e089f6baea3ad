//! Offset-addressed big-endian reads shared by the ROM, header, and segment parsers.
//!
//! Segment data is pointer-directed, so there is no cursor: every read names its offset.

use thiserror::Error;
use winnow::Parser;
use winnow::binary::{be_f32, be_i8, be_i16, be_i32, be_i64, be_u8, be_u16, be_u32, be_u64};
use winnow::error::{ContextError, ErrMode};

/// Common result type for winnow parsers.
pub type WResult<T> = Result<T, ErrMode<ContextError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("read of {width} bytes at 0x{offset:X} is out of bounds (have 0x{len:X})")]
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },
    #[error("unsupported integer width {0}")]
    UnsupportedWidth(usize),
}

/// Slice exactly `width` bytes at `offset`, or fail without reading.
pub fn window(buffer: &[u8], offset: usize, width: usize) -> Result<&[u8], ReadError> {
    offset
        .checked_add(width)
        .filter(|end| *end <= buffer.len())
        .map(|end| &buffer[offset..end])
        .ok_or(ReadError::OutOfBounds {
            offset,
            width,
            len: buffer.len(),
        })
}

fn check_width(width: usize) -> Result<(), ReadError> {
    match width {
        1 | 2 | 4 | 8 => Ok(()),
        _ => Err(ReadError::UnsupportedWidth(width)),
    }
}

fn uint_be(input: &mut &[u8], width: usize) -> WResult<u64> {
    match width {
        1 => be_u8.parse_next(input).map(u64::from),
        2 => be_u16.parse_next(input).map(u64::from),
        4 => be_u32.parse_next(input).map(u64::from),
        8 => be_u64.parse_next(input),
        _ => Err(ErrMode::Cut(ContextError::new())),
    }
}

fn int_be(input: &mut &[u8], width: usize) -> WResult<i64> {
    match width {
        1 => be_i8.parse_next(input).map(i64::from),
        2 => be_i16.parse_next(input).map(i64::from),
        4 => be_i32.parse_next(input).map(i64::from),
        8 => be_i64.parse_next(input),
        _ => Err(ErrMode::Cut(ContextError::new())),
    }
}

/// Read an unsigned big-endian integer of `width` bytes (1, 2, 4 or 8) at `offset`.
pub fn read_uint(buffer: &[u8], offset: usize, width: usize) -> Result<u64, ReadError> {
    check_width(width)?;
    let input = &mut window(buffer, offset, width)?;
    uint_be(input, width).map_err(|_| ReadError::OutOfBounds {
        offset,
        width,
        len: buffer.len(),
    })
}

/// Read a signed big-endian integer of `width` bytes (1, 2, 4 or 8) at `offset`.
pub fn read_int(buffer: &[u8], offset: usize, width: usize) -> Result<i64, ReadError> {
    check_width(width)?;
    let input = &mut window(buffer, offset, width)?;
    int_be(input, width).map_err(|_| ReadError::OutOfBounds {
        offset,
        width,
        len: buffer.len(),
    })
}

/// Read a signed 16.16 fixed-point value at `offset`.
pub fn read_fixed_point(buffer: &[u8], offset: usize) -> Result<f32, ReadError> {
    let raw = read_int(buffer, offset, 4)?;
    Ok(raw as f32 / 65536.0)
}

pub fn read_f32(buffer: &[u8], offset: usize) -> Result<f32, ReadError> {
    let input = &mut window(buffer, offset, 4)?;
    let value: WResult<f32> = be_f32.parse_next(input);
    value.map_err(|_| ReadError::OutOfBounds {
        offset,
        width: 4,
        len: buffer.len(),
    })
}

pub fn read_u8(buffer: &[u8], offset: usize) -> Result<u8, ReadError> {
    read_uint(buffer, offset, 1).map(|v| v as u8)
}

pub fn read_u16(buffer: &[u8], offset: usize) -> Result<u16, ReadError> {
    read_uint(buffer, offset, 2).map(|v| v as u16)
}

pub fn read_u32(buffer: &[u8], offset: usize) -> Result<u32, ReadError> {
    read_uint(buffer, offset, 4).map(|v| v as u32)
}

pub fn read_i16(buffer: &[u8], offset: usize) -> Result<i16, ReadError> {
    read_int(buffer, offset, 2).map(|v| v as i16)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: [u8; 8] = [0xFF, 0xFE, 0x00, 0x01, 0x80, 0x00, 0x00, 0x00];

    #[test]
    fn reads_are_big_endian_and_offset_addressed() {
        assert_eq!(read_uint(&DATA, 2, 2).unwrap(), 1);
        assert_eq!(read_uint(&DATA, 0, 2).unwrap(), 0xFFFE);
        assert_eq!(read_int(&DATA, 0, 2).unwrap(), -2);
        assert_eq!(read_int(&DATA, 0, 1).unwrap(), -1);
        assert_eq!(read_uint(&DATA, 0, 8).unwrap(), 0xFFFE_0001_8000_0000);
        // Reads do not depend on any previous read.
        assert_eq!(read_u16(&DATA, 2).unwrap(), 1);
    }

    #[test]
    fn fixed_point_is_16_16() {
        let one_and_a_half = [0x00, 0x01, 0x80, 0x00];
        assert_eq!(read_fixed_point(&one_and_a_half, 0).unwrap(), 1.5);
        let minus_one = (-65536i32).to_be_bytes();
        assert_eq!(read_fixed_point(&minus_one, 0).unwrap(), -1.0);
    }

    #[test]
    fn float_reads() {
        let bytes = 100.0f32.to_be_bytes();
        assert_eq!(read_f32(&bytes, 0).unwrap(), 100.0);
    }

    #[test]
    fn out_of_bounds_reads_fail() {
        assert_eq!(
            read_uint(&DATA, 7, 2),
            Err(ReadError::OutOfBounds {
                offset: 7,
                width: 2,
                len: 8
            })
        );
        assert!(read_int(&DATA, usize::MAX, 4).is_err());
        assert!(read_f32(&DATA, 6).is_err());
    }

    #[test]
    fn odd_widths_are_rejected() {
        assert_eq!(read_uint(&DATA, 0, 3), Err(ReadError::UnsupportedWidth(3)));
    }
}
