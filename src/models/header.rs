//! Parser for the fixed 0x38-byte model file header.
//!
//! The header only stores where each segment starts. Segments are laid out back to
//! back, so a segment's length is the distance to the next boundary after it.

use std::collections::BTreeMap;

use itertools::Itertools;
use tracing::{debug, warn};
use winnow::Parser;
use winnow::binary::{be_f32, be_u16, be_u32};

use crate::data::parser_utils::WResult;
use crate::error::{DecodeError, DecodeResult, SegmentKind};
use crate::models::SegmentSpan;

pub const HEADER_SIZE: usize = 0x38;
pub const MODEL_MAGIC: u32 = 0x0000_000B;
/// Size of the display-list sub-header in front of the first command.
pub const DISPLAY_LIST_HEADER_SIZE: usize = 8;

/// Every segment kind that has an offset field in the header.
pub const SEGMENT_KINDS: [SegmentKind; 8] = [
    SegmentKind::GeoLayout,
    SegmentKind::Texture,
    SegmentKind::DisplayList,
    SegmentKind::Vertex,
    SegmentKind::Bone,
    SegmentKind::Collision,
    SegmentKind::Effects,
    SegmentKind::AnimatedTexture,
];

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ModelHeader {
    pub magic: u32,
    pub geo_type: u16,
    pub tri_count: u16,
    pub vtx_count: u16,
    pub scale: f32,
    pub effects_end: usize,
    offsets: BTreeMap<SegmentKind, usize>,
    lengths: BTreeMap<SegmentKind, usize>,
}

impl ModelHeader {
    /// Absolute offset of a segment, if the model has one.
    pub fn offset(&self, kind: SegmentKind) -> Option<usize> {
        self.offsets.get(&kind).copied()
    }

    /// Derived length of a segment, if the model has one.
    pub fn length(&self, kind: SegmentKind) -> Option<usize> {
        self.lengths.get(&kind).copied()
    }

    pub fn segment(&self, kind: SegmentKind) -> Option<SegmentSpan> {
        Some(SegmentSpan {
            offset: self.offset(kind)?,
            len: self.length(kind)?,
        })
    }

    /// Absolute offset of the first display-list command.
    pub fn display_list_entry_offset(&self) -> Option<usize> {
        self.offset(SegmentKind::DisplayList)
            .map(|offset| offset + DISPLAY_LIST_HEADER_SIZE)
    }
}

/// Header fields parsed by winnow, before segment lengths are derived.
struct HeaderFields {
    magic: u32,
    geo_offset: u32,
    tex_offset: u16,
    geo_type: u16,
    dl_offset: u32,
    vtx_offset: u32,
    bone_offset: u32,
    coll_offset: u32,
    fx_end: u32,
    fx_offset: u32,
    anim_tex_offset: u32,
    tri_count: u16,
    vtx_count: u16,
    scale: f32,
}

fn parse_header_fields(input: &mut &[u8]) -> WResult<HeaderFields> {
    let magic = be_u32.parse_next(input)?;
    let geo_offset = be_u32.parse_next(input)?;
    let tex_offset = be_u16.parse_next(input)?;
    let geo_type = be_u16.parse_next(input)?;
    let dl_offset = be_u32.parse_next(input)?;
    let vtx_offset = be_u32.parse_next(input)?;
    let _unused_14 = be_u32.parse_next(input)?;
    let bone_offset = be_u32.parse_next(input)?;
    let coll_offset = be_u32.parse_next(input)?;
    let fx_end = be_u32.parse_next(input)?;
    let fx_offset = be_u32.parse_next(input)?;
    let _unused_28 = be_u32.parse_next(input)?;
    let anim_tex_offset = be_u32.parse_next(input)?;
    let tri_count = be_u16.parse_next(input)?;
    let vtx_count = be_u16.parse_next(input)?;
    let scale = be_f32.parse_next(input)?;
    Ok(HeaderFields {
        magic,
        geo_offset,
        tex_offset,
        geo_type,
        dl_offset,
        vtx_offset,
        bone_offset,
        coll_offset,
        fx_end,
        fx_offset,
        anim_tex_offset,
        tri_count,
        vtx_count,
        scale,
    })
}

/// Parse the header and derive segment spans. Segment offsets are not checked
/// against the buffer here; each segment decoder does that for its own span.
pub fn parse_header(buffer: &[u8]) -> DecodeResult<ModelHeader> {
    if buffer.len() < HEADER_SIZE {
        return Err(DecodeError::TruncatedHeader {
            need: HEADER_SIZE,
            have: buffer.len(),
        });
    }

    let input = &mut &buffer[..HEADER_SIZE];
    let fields = parse_header_fields(input).map_err(|_| DecodeError::TruncatedHeader {
        need: HEADER_SIZE,
        have: buffer.len(),
    })?;

    if fields.magic != MODEL_MAGIC {
        warn!(magic = fields.magic, "unexpected model magic");
    }

    let raw_offsets = [
        (SegmentKind::GeoLayout, fields.geo_offset as usize),
        (SegmentKind::Texture, fields.tex_offset as usize),
        (SegmentKind::DisplayList, fields.dl_offset as usize),
        (SegmentKind::Vertex, fields.vtx_offset as usize),
        (SegmentKind::Bone, fields.bone_offset as usize),
        (SegmentKind::Collision, fields.coll_offset as usize),
        (SegmentKind::Effects, fields.fx_offset as usize),
        (SegmentKind::AnimatedTexture, fields.anim_tex_offset as usize),
    ];
    let offsets: BTreeMap<SegmentKind, usize> = raw_offsets
        .into_iter()
        .filter(|(_, offset)| *offset != 0)
        .collect();

    let boundaries: Vec<usize> = offsets
        .values()
        .copied()
        .chain((fields.fx_end != 0).then_some(fields.fx_end as usize))
        .sorted_unstable()
        .dedup()
        .collect();

    let lengths = offsets
        .iter()
        .map(|(kind, offset)| {
            let end = boundaries
                .iter()
                .copied()
                .find(|boundary| boundary > offset)
                .unwrap_or(buffer.len());
            (*kind, end.saturating_sub(*offset))
        })
        .collect();

    let header = ModelHeader {
        magic: fields.magic,
        geo_type: fields.geo_type,
        tri_count: fields.tri_count,
        vtx_count: fields.vtx_count,
        scale: fields.scale,
        effects_end: fields.fx_end as usize,
        offsets,
        lengths,
    };
    debug!(?header, "parsed model header");
    Ok(header)
}
