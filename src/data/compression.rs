//! Decompression of model payloads pulled out of the ROM.
//!
//! Two encodings show up in asset payloads: "rarezip" (a small header in front of a
//! raw DEFLATE stream) and a flag-byte LZ token stream. [`decompress`] picks one from
//! the leading bytes.

use std::io::{Cursor, Read};

use flate2::read::DeflateDecoder;
use thiserror::Error;
use tracing::{debug, trace};

/// Leading bytes of a rarezip payload.
pub const RAREZIP_MAGIC: [u8; 2] = [0x11, 0x72];
/// Magic plus the big-endian decompressed length.
pub const RAREZIP_HEADER_SIZE: usize = 6;

const MIN_MATCH_LENGTH: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompressionError {
    #[error("stream ended inside a back-reference at input offset 0x{offset:X}")]
    TruncatedToken { offset: usize },
    #[error("back-reference distance {distance} exceeds the {produced} bytes produced so far")]
    DistanceTooFar { distance: usize, produced: usize },
    #[error("decompressed output exceeds the sanity bound of 0x{limit:X} bytes")]
    ExceedsLimit { limit: usize },
    #[error("rarezip payload is shorter than its 6-byte header")]
    TruncatedHeader,
    #[error("rarezip payload declared 0x{declared:X} bytes but inflated to 0x{actual:X}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("DEFLATE stream error: {0}")]
    Inflate(String),
}

/// Why the LZ token stream stopped producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A back-reference with both operand bytes zero.
    EndMarker,
    /// The input ran out on a token boundary.
    InputExhausted,
}

/// Which encoding a payload uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Rarezip,
    LzTokens,
}

impl Encoding {
    pub fn detect(payload: &[u8]) -> Self {
        if payload.starts_with(&RAREZIP_MAGIC) {
            Encoding::Rarezip
        } else {
            Encoding::LzTokens
        }
    }
}

/// Upper bound on how large a decompressed model may get. The decompressed length
/// is never taken on trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecompressLimits {
    /// Maximum output size as a multiple of the compressed input size.
    pub max_ratio: usize,
    /// Absolute maximum output size in bytes.
    pub max_output: usize,
}

impl Default for DecompressLimits {
    fn default() -> Self {
        Self {
            max_ratio: 64,
            max_output: 16 * 1024 * 1024,
        }
    }
}

impl DecompressLimits {
    pub fn limit_for(&self, compressed_len: usize) -> usize {
        compressed_len
            .saturating_mul(self.max_ratio)
            .min(self.max_output)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decompressed {
    pub data: Vec<u8>,
    pub stop: StopReason,
}

/// Decompress a payload of either encoding.
pub fn decompress(payload: &[u8], limits: &DecompressLimits) -> Result<Vec<u8>, CompressionError> {
    match Encoding::detect(payload) {
        Encoding::Rarezip => inflate_rarezip(payload, limits),
        Encoding::LzTokens => decompress_lz(payload, limits).map(|out| out.data),
    }
}

/// Inflate a rarezip payload and check it against its declared length.
pub fn inflate_rarezip(
    payload: &[u8],
    limits: &DecompressLimits,
) -> Result<Vec<u8>, CompressionError> {
    if payload.len() < RAREZIP_HEADER_SIZE {
        return Err(CompressionError::TruncatedHeader);
    }
    let declared = u32::from_be_bytes([payload[2], payload[3], payload[4], payload[5]]) as usize;
    let limit = limits.limit_for(payload.len());
    if declared > limit {
        return Err(CompressionError::ExceedsLimit { limit });
    }

    let cursor = Cursor::new(&payload[RAREZIP_HEADER_SIZE..]);
    // Read one byte past the declared size so overlong streams are caught.
    let mut decoder = DeflateDecoder::new(cursor).take(declared as u64 + 1);
    let mut out = Vec::with_capacity(declared);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CompressionError::Inflate(e.to_string()))?;

    if out.len() != declared {
        return Err(CompressionError::LengthMismatch {
            declared,
            actual: out.len(),
        });
    }
    debug!(declared, compressed = payload.len(), "inflated rarezip payload");
    Ok(out)
}

/// Decompress an LZ token stream.
///
/// Each control byte covers up to eight tokens, most significant bit first. A clear
/// bit copies one literal byte. A set bit reads two bytes `b0 b1` and copies
/// `(b0 >> 4) + 3` bytes from `((b0 & 0xF) << 8 | b1) + 1` bytes back in the output.
/// `00 00` ends the stream, as does running out of input between tokens when the
/// last control byte has no set bits left.
pub fn decompress_lz(
    payload: &[u8],
    limits: &DecompressLimits,
) -> Result<Decompressed, CompressionError> {
    let limit = limits.limit_for(payload.len());
    let mut out: Vec<u8> = Vec::with_capacity(payload.len() * 2);
    let mut pos = 0usize;

    loop {
        let Some(&control) = payload.get(pos) else {
            return Ok(finish(out, StopReason::InputExhausted));
        };
        pos += 1;

        for bit in (0..8).rev() {
            if pos >= payload.len() {
                // Unused bits of the last control byte must not promise back-references.
                let remaining = control as u16 & ((1u16 << (bit + 1)) - 1);
                if remaining != 0 {
                    return Err(CompressionError::TruncatedToken { offset: pos });
                }
                return Ok(finish(out, StopReason::InputExhausted));
            }

            if control & (1 << bit) == 0 {
                if out.len() >= limit {
                    return Err(CompressionError::ExceedsLimit { limit });
                }
                out.push(payload[pos]);
                pos += 1;
                continue;
            }

            let b0 = payload[pos];
            let Some(&b1) = payload.get(pos + 1) else {
                return Err(CompressionError::TruncatedToken { offset: pos });
            };
            pos += 2;

            if b0 == 0 && b1 == 0 {
                return Ok(finish(out, StopReason::EndMarker));
            }

            let length = (b0 >> 4) as usize + MIN_MATCH_LENGTH;
            let distance = (((b0 & 0x0F) as usize) << 8 | b1 as usize) + 1;
            if distance > out.len() {
                return Err(CompressionError::DistanceTooFar {
                    distance,
                    produced: out.len(),
                });
            }
            if out.len() + length > limit {
                return Err(CompressionError::ExceedsLimit { limit });
            }

            // Byte-wise so a run may overlap the bytes it is producing.
            let start = out.len() - distance;
            for i in 0..length {
                let byte = out[start + i];
                out.push(byte);
            }
            trace!(distance, length, "back-reference");
        }
    }
}

fn finish(data: Vec<u8>, stop: StopReason) -> Decompressed {
    debug!(len = data.len(), ?stop, "LZ stream finished");
    Decompressed { data, stop }
}
