//! Vertex segment: a bounds sub-header followed by 16-byte vertices.

use tracing::{debug, warn};

use crate::error::{DecodeResult, SegmentKind};
use crate::models::{SegmentSpan, SegmentView};

pub const VERTEX_HEADER_SIZE: usize = 0x18;
pub const VERTEX_SIZE: usize = 0x10;

/// UV coordinates are S10.5 fixed point texels.
pub const UV_FRACTION: f32 = 32.0;

/// A vertex as stored. Positions are raw model units; [`Vertex::position`] scales them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Vertex {
    pub position: [i16; 3],
    pub flag: u16,
    /// Raw S10.5 texel coordinates.
    pub uv: [i16; 2],
    /// Vertex colour, or a signed normal in the RGB bytes on lit geometry.
    pub rgba: [u8; 4],
}

impl Vertex {
    /// Position divided by `scale_factor`.
    pub fn position(&self, scale_factor: f32) -> [f32; 3] {
        self.position.map(|c| c as f32 / scale_factor)
    }

    /// UV in texels.
    pub fn texel_uv(&self) -> [f32; 2] {
        self.uv.map(|c| c as f32 / UV_FRACTION)
    }

    /// The RGB bytes read as a normal, for models drawn with lighting enabled.
    pub fn normal(&self) -> [f32; 3] {
        [self.rgba[0], self.rgba[1], self.rgba[2]].map(|c| c as i8 as f32 / 127.0)
    }
}

/// Axis-aligned bounds stored in a segment sub-header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Bounds {
    pub min: [i16; 3],
    pub max: [i16; 3],
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VertexSegment {
    pub bounds: Bounds,
    pub center: [i16; 3],
    pub max_distance: i16,
    pub vertices: Vec<Vertex>,
}

fn parse_vertex(view: &SegmentView<'_>, offset: usize) -> DecodeResult<Vertex> {
    Ok(Vertex {
        position: view.i16x3(offset)?,
        flag: view.u16(offset + 6)?,
        uv: [view.i16(offset + 8)?, view.i16(offset + 10)?],
        rgba: [
            view.u8(offset + 12)?,
            view.u8(offset + 13)?,
            view.u8(offset + 14)?,
            view.u8(offset + 15)?,
        ],
    })
}

pub fn decode(buffer: &[u8], span: SegmentSpan) -> DecodeResult<VertexSegment> {
    let view = SegmentView::new(buffer, SegmentKind::Vertex, span)?;

    let bounds = Bounds {
        min: view.i16x3(0x00)?,
        max: view.i16x3(0x06)?,
    };
    let center = view.i16x3(0x0C)?;
    let max_distance = view.i16(0x12)?;
    let declared = view.u16(0x16)? as usize;

    let count = view.element_count(VERTEX_HEADER_SIZE, VERTEX_SIZE)?;
    if declared != count {
        warn!(declared, count, "vertex segment count disagrees with its length");
    }

    let vertices = (0..count)
        .map(|i| parse_vertex(&view, VERTEX_HEADER_SIZE + i * VERTEX_SIZE))
        .collect::<DecodeResult<Vec<_>>>()?;
    debug!(count, "decoded vertex segment");

    Ok(VertexSegment {
        bounds,
        center,
        max_distance,
        vertices,
    })
}
