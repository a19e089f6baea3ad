//! Texture segment: descriptors followed by N64 pixel data, decoded to RGBA8.

use tracing::{debug, warn};

use crate::error::{DecodeResult, SegmentKind};
use crate::models::{SegmentSpan, SegmentView};
use crate::recognized::Recognized;

pub const TEXTURE_HEADER_SIZE: usize = 8;
pub const TEXTURE_DESCRIPTOR_SIZE: usize = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TextureFormat {
    /// 4bpp indices into a 16-entry RGBA5551 palette.
    Ci4,
    /// 8bpp indices into a 256-entry RGBA5551 palette.
    Ci8,
    Rgba16,
    Rgba32,
    /// 4-bit intensity, 4-bit alpha.
    Ia8,
}

impl TextureFormat {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0x01 => Some(TextureFormat::Ci4),
            0x02 => Some(TextureFormat::Ci8),
            0x04 => Some(TextureFormat::Rgba16),
            0x08 => Some(TextureFormat::Rgba32),
            0x10 => Some(TextureFormat::Ia8),
            _ => None,
        }
    }

    fn palette_size(self) -> usize {
        match self {
            TextureFormat::Ci4 => 0x20,
            TextureFormat::Ci8 => 0x200,
            _ => 0,
        }
    }

    /// Bytes of palette plus pixels for a `width` x `height` image.
    pub fn byte_size(self, width: usize, height: usize) -> usize {
        let pixels = width * height;
        self.palette_size()
            + match self {
                TextureFormat::Ci4 => pixels.div_ceil(2),
                TextureFormat::Ci8 | TextureFormat::Ia8 => pixels,
                TextureFormat::Rgba16 => pixels * 2,
                TextureFormat::Rgba32 => pixels * 4,
            }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Texture {
    pub format: Recognized<TextureFormat, u16>,
    pub width: u32,
    pub height: u32,
    /// Offset of the texture's data from the start of the pixel data.
    pub data_offset: usize,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub raw: Vec<u8>,
    /// RGBA8, row-major from the top-left. `None` for unknown formats.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub rgba: Option<Vec<u8>>,
}

impl Texture {
    /// Whether `data_offset` (relative to the pixel data) falls inside this texture.
    pub fn contains(&self, data_offset: usize) -> bool {
        data_offset >= self.data_offset && data_offset < self.data_offset + self.raw.len().max(1)
    }

    #[cfg(feature = "png")]
    pub fn to_png(&self) -> Result<Vec<u8>, rootcause::Report<TextureError>> {
        use image::{ExtendedColorType, ImageEncoder, codecs::png::PngEncoder};
        use rootcause::Report;

        let rgba = self
            .rgba
            .as_ref()
            .ok_or_else(|| Report::new(TextureError::Undecoded(self.format.to_string())))?;

        let mut png_buf = Vec::new();
        PngEncoder::new(&mut png_buf)
            .write_image(rgba, self.width, self.height, ExtendedColorType::Rgba8)
            .map_err(|e| Report::new(TextureError::PngEncode(e.to_string())))?;
        Ok(png_buf)
    }
}

#[cfg(feature = "png")]
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("texture format {0} has no decoded pixels")]
    Undecoded(String),
    #[error("failed to encode PNG: {0}")]
    PngEncode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TextureSegment {
    pub data_size: u32,
    pub textures: Vec<Texture>,
}

impl TextureSegment {
    /// Index of the texture whose data contains `data_offset`.
    pub fn texture_at(&self, data_offset: usize) -> Option<usize> {
        self.textures.iter().position(|t| t.contains(data_offset))
    }
}

fn expand5(c: u16) -> u8 {
    let c = (c & 0x1F) as u8;
    (c << 3) | (c >> 2)
}

fn rgba5551(pixel: u16) -> [u8; 4] {
    [
        expand5(pixel >> 11),
        expand5(pixel >> 6),
        expand5(pixel >> 1),
        if pixel & 1 != 0 { 0xFF } else { 0 },
    ]
}

fn palette(raw: &[u8]) -> Vec<[u8; 4]> {
    raw.chunks_exact(2)
        .map(|c| rgba5551(u16::from_be_bytes([c[0], c[1]])))
        .collect()
}

/// Decode `raw` (palette included) to RGBA8. `raw` must be exactly
/// [`TextureFormat::byte_size`] long.
pub fn decode_pixels(format: TextureFormat, width: usize, height: usize, raw: &[u8]) -> Vec<u8> {
    let pixels = width * height;
    let (pal, data) = raw.split_at(format.palette_size());
    let mut out = Vec::with_capacity(pixels * 4);
    match format {
        TextureFormat::Ci4 => {
            let pal = palette(pal);
            for i in 0..pixels {
                let byte = data[i / 2];
                let index = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
                out.extend(pal[index as usize]);
            }
        }
        TextureFormat::Ci8 => {
            let pal = palette(pal);
            for &index in &data[..pixels] {
                out.extend(pal[index as usize]);
            }
        }
        TextureFormat::Rgba16 => {
            for c in data.chunks_exact(2) {
                out.extend(rgba5551(u16::from_be_bytes([c[0], c[1]])));
            }
        }
        TextureFormat::Rgba32 => out.extend_from_slice(data),
        TextureFormat::Ia8 => {
            for &b in data {
                let intensity = (b >> 4) * 0x11;
                out.extend([intensity, intensity, intensity, (b & 0x0F) * 0x11]);
            }
        }
    }
    out
}

struct Descriptor {
    data_offset: usize,
    format: u16,
    width: u8,
    height: u8,
}

pub fn decode(buffer: &[u8], span: SegmentSpan) -> DecodeResult<TextureSegment> {
    let view = SegmentView::new(buffer, SegmentKind::Texture, span)?;
    let data_size = view.u32(0)?;
    let count = view.u16(4)? as usize;
    let pixel_start = TEXTURE_HEADER_SIZE + count * TEXTURE_DESCRIPTOR_SIZE;

    let descriptors = (0..count)
        .map(|i| {
            let at = TEXTURE_HEADER_SIZE + i * TEXTURE_DESCRIPTOR_SIZE;
            Ok(Descriptor {
                data_offset: view.u32(at)? as usize,
                format: view.u16(at + 4)?,
                width: view.u8(at + 8)?,
                height: view.u8(at + 9)?,
            })
        })
        .collect::<DecodeResult<Vec<_>>>()?;

    let pixel_len = view.len().saturating_sub(pixel_start);
    if data_size as usize != pixel_len {
        warn!(data_size, pixel_len, "texture data size disagrees with segment length");
    }

    let mut textures = Vec::with_capacity(count);
    for (index, d) in descriptors.iter().enumerate() {
        let format = Recognized::from_raw(d.format, |raw| TextureFormat::from_raw(*raw));
        let (width, height) = (d.width as usize, d.height as usize);
        let len = match format.known() {
            Some(known) => known.byte_size(width, height),
            None => {
                // Unknown formats run to the next texture's data.
                let next = descriptors
                    .iter()
                    .map(|other| other.data_offset)
                    .filter(|&offset| offset > d.data_offset)
                    .min()
                    .unwrap_or(pixel_len);
                warn!(index, raw_format = d.format, "unknown texture format, keeping raw data");
                next.saturating_sub(d.data_offset)
            }
        };
        let raw = view.bytes(pixel_start + d.data_offset, len)?.to_vec();
        let rgba = format
            .known()
            .map(|known| decode_pixels(*known, width, height, &raw));
        textures.push(Texture {
            format,
            width: d.width as u32,
            height: d.height as u32,
            data_offset: d.data_offset,
            raw,
            rgba,
        });
    }
    debug!(count, "decoded texture segment");

    Ok(TextureSegment {
        data_size,
        textures,
    })
}
