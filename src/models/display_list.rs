//! Display-list segment: F3DEX graphics commands.
//!
//! The command area is split into lists. Every list found by a linear scan (a new
//! list starts after each `End` or jump) is decoded, and so is every branch target.
//! Lists are keyed by their start offset, which doubles as the visited set, so
//! self-referencing branches cannot cause repeated decoding.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace, warn};

use crate::error::{DecodeResult, SegmentKind};
use crate::models::header::DISPLAY_LIST_HEADER_SIZE;
use crate::models::{SegmentSpan, SegmentView};

pub const COMMAND_SIZE: usize = 8;

pub const G_NOOP: u8 = 0x00;
pub const G_VTX: u8 = 0x04;
pub const G_DL: u8 = 0x06;
pub const G_TRI2: u8 = 0xB1;
pub const G_ENDDL: u8 = 0xB8;
pub const G_TEXTURE: u8 = 0xBB;
pub const G_TRI1: u8 = 0xBF;
pub const G_NOOP_RDP: u8 = 0xC0;
pub const G_SETTILESIZE: u8 = 0xF2;
pub const G_SETTILE: u8 = 0xF5;
pub const G_SETTIMG: u8 = 0xFD;

/// Segment numbers used in segmented addresses.
pub const SEGMENT_VERTEX: u8 = 0x01;
pub const SEGMENT_TEXTURE: u8 = 0x02;
pub const SEGMENT_DISPLAY_LIST: u8 = 0x03;

/// Number of vertices the RSP vertex cache holds.
pub const VERTEX_CACHE_SIZE: usize = 32;

/// A segmented RSP address: segment number in the top byte, offset below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SegmentAddress {
    pub segment: u8,
    pub offset: u32,
}

impl From<u32> for SegmentAddress {
    fn from(word: u32) -> Self {
        Self {
            segment: (word >> 24) as u8,
            offset: word & 0x00FF_FFFF,
        }
    }
}

/// Wrap behaviour of one texture axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AxisWrap {
    pub mirror: bool,
    pub clamp: bool,
    pub mask: u8,
    pub shift: u8,
}

impl AxisWrap {
    fn from_bits(cm: u32, mask: u32, shift: u32) -> Self {
        Self {
            mirror: cm & 1 != 0,
            clamp: cm & 2 != 0,
            mask: mask as u8,
            shift: shift as u8,
        }
    }

    /// Texture-coordinate multiplier for this axis' shift. Shifts 1..=10 divide by
    /// a power of two, 11..=15 multiply.
    pub fn shift_factor(&self) -> f32 {
        match self.shift {
            0 => 1.0,
            s @ 1..=10 => 1.0 / (1u32 << s) as f32,
            s @ 11..=15 => (1u32 << (16 - s as u32)) as f32,
            // G_SETTILE only has four shift bits.
            _ => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct WrapParams {
    pub s: AxisWrap,
    pub t: AxisWrap,
}

/// Tile bounds in 10.2 fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TileSize {
    pub uls: u16,
    pub ult: u16,
    pub lrs: u16,
    pub lrt: u16,
}

impl TileSize {
    pub fn width(&self) -> u32 {
        (self.lrs.saturating_sub(self.uls) >> 2) as u32 + 1
    }

    pub fn height(&self) -> u32 {
        (self.lrt.saturating_sub(self.ult) >> 2) as u32 + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Command {
    NoOp,
    LoadVertices {
        address: SegmentAddress,
        count: u8,
        cache_start: u8,
    },
    /// One or two triangles of vertex-cache indices.
    DrawTriangleBatch {
        first: [u8; 3],
        second: Option<[u8; 3]>,
    },
    LoadTexture {
        format: u8,
        size: u8,
        address: SegmentAddress,
    },
    SetTile {
        tile: u8,
        palette: u8,
        wrap: WrapParams,
    },
    SetTileSize {
        tile: u8,
        size: TileSize,
    },
    SetTextureScale {
        s: u16,
        t: u16,
    },
    Branch {
        target: SegmentAddress,
        jump: bool,
    },
    End,
    Other {
        opcode: u8,
        w0: u32,
        w1: u32,
    },
}

fn tri_indices(word: u32) -> [u8; 3] {
    [
        ((word >> 16) & 0xFF) as u8 / 2,
        ((word >> 8) & 0xFF) as u8 / 2,
        (word & 0xFF) as u8 / 2,
    ]
}

impl Command {
    pub fn parse(w0: u32, w1: u32) -> Self {
        let opcode = (w0 >> 24) as u8;
        match opcode {
            G_NOOP | G_NOOP_RDP => Command::NoOp,
            G_VTX => Command::LoadVertices {
                address: w1.into(),
                count: ((w0 >> 10) & 0x3F) as u8,
                cache_start: ((w0 >> 16) & 0xFF) as u8 / 2,
            },
            G_TRI1 => Command::DrawTriangleBatch {
                first: tri_indices(w1),
                second: None,
            },
            G_TRI2 => Command::DrawTriangleBatch {
                first: tri_indices(w0),
                second: Some(tri_indices(w1)),
            },
            G_SETTIMG => Command::LoadTexture {
                format: ((w0 >> 21) & 0x7) as u8,
                size: ((w0 >> 19) & 0x3) as u8,
                address: w1.into(),
            },
            G_SETTILE => Command::SetTile {
                tile: ((w1 >> 24) & 0x7) as u8,
                palette: ((w1 >> 20) & 0xF) as u8,
                wrap: WrapParams {
                    s: AxisWrap::from_bits((w1 >> 8) & 0x3, (w1 >> 4) & 0xF, w1 & 0xF),
                    t: AxisWrap::from_bits((w1 >> 18) & 0x3, (w1 >> 14) & 0xF, (w1 >> 10) & 0xF),
                },
            },
            G_SETTILESIZE => Command::SetTileSize {
                tile: ((w1 >> 24) & 0x7) as u8,
                size: TileSize {
                    uls: ((w0 >> 12) & 0xFFF) as u16,
                    ult: (w0 & 0xFFF) as u16,
                    lrs: ((w1 >> 12) & 0xFFF) as u16,
                    lrt: (w1 & 0xFFF) as u16,
                },
            },
            G_TEXTURE => Command::SetTextureScale {
                s: (w1 >> 16) as u16,
                t: (w1 & 0xFFFF) as u16,
            },
            G_DL => Command::Branch {
                target: w1.into(),
                jump: (w0 >> 16) & 0xFF == 1,
            },
            G_ENDDL => Command::End,
            _ => Command::Other { opcode, w0, w1 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DisplayListEntry {
    /// Byte offset of the command within the command area.
    pub offset: usize,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DisplayList {
    pub start: usize,
    /// Offset just past the last command.
    pub end: usize,
    pub commands: Vec<DisplayListEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DisplayListSegment {
    /// Size of the command area in bytes.
    pub area_len: usize,
    pub lists: BTreeMap<usize, DisplayList>,
    /// Lists found by the linear scan that no branch targets, in offset order.
    pub roots: Vec<usize>,
}

impl DisplayListSegment {
    pub fn command_count(&self) -> usize {
        self.area_len / COMMAND_SIZE
    }

    pub fn list(&self, start: usize) -> Option<&DisplayList> {
        self.lists.get(&start)
    }
}

/// Offset into the command area of a branch target, if it is a usable one.
pub fn branch_target(target: SegmentAddress, area_len: usize) -> Option<usize> {
    let offset = target.offset as usize;
    (target.segment == SEGMENT_DISPLAY_LIST && offset % COMMAND_SIZE == 0 && offset < area_len)
        .then_some(offset)
}

fn decode_list(
    view: &SegmentView<'_>,
    area_len: usize,
    start: usize,
    pending: &mut Vec<usize>,
) -> DecodeResult<DisplayList> {
    let mut commands = Vec::new();
    let mut offset = start;
    while offset < area_len {
        let at = DISPLAY_LIST_HEADER_SIZE + offset;
        let command = Command::parse(view.u32(at)?, view.u32(at + 4)?);
        offset += COMMAND_SIZE;

        let stop = match &command {
            Command::End => true,
            Command::Branch { target, jump } => {
                match branch_target(*target, area_len) {
                    Some(target) => pending.push(target),
                    None => warn!(
                        command = offset - COMMAND_SIZE,
                        ?target,
                        "branch target outside the command area"
                    ),
                }
                *jump
            }
            Command::Other { opcode, .. } => {
                trace!(opcode, offset = offset - COMMAND_SIZE, "unhandled display-list command");
                false
            }
            _ => false,
        };
        commands.push(DisplayListEntry {
            offset: offset - COMMAND_SIZE,
            command,
        });
        if stop {
            break;
        }
    }
    Ok(DisplayList {
        start,
        end: offset,
        commands,
    })
}

/// In-area branch targets of one list.
fn list_targets(list: &DisplayList, area_len: usize) -> impl Iterator<Item = usize> + '_ {
    list.commands.iter().filter_map(move |entry| match entry.command {
        Command::Branch { target, .. } => branch_target(target, area_len),
        _ => None,
    })
}

/// Pick the linear lists to interpret. A list that another list branches to is drawn
/// through that branch, unless nothing chosen so far reaches it, which happens when
/// lists only reach each other in a cycle.
fn select_roots(
    lists: &BTreeMap<usize, DisplayList>,
    linear: &[usize],
    area_len: usize,
) -> Vec<usize> {
    let called: BTreeSet<usize> = lists
        .values()
        .flat_map(|list| list_targets(list, area_len).filter(move |&t| t != list.start))
        .collect();
    let mut roots: Vec<usize> = linear
        .iter()
        .copied()
        .filter(|start| !called.contains(start))
        .collect();

    let mut reached = BTreeSet::new();
    let reach = |from: usize, reached: &mut BTreeSet<usize>| {
        let mut stack = vec![from];
        while let Some(start) = stack.pop() {
            if !reached.insert(start) {
                continue;
            }
            if let Some(list) = lists.get(&start) {
                stack.extend(list_targets(list, area_len));
            }
        }
    };
    for &root in &roots {
        reach(root, &mut reached);
    }
    for &start in linear {
        if !reached.contains(&start) {
            trace!(start, "list only reachable through a cycle, drawing it as a root");
            reach(start, &mut reached);
            roots.push(start);
        }
    }
    roots.sort_unstable();
    roots
}

pub fn decode(buffer: &[u8], span: SegmentSpan) -> DecodeResult<DisplayListSegment> {
    let view = SegmentView::new(buffer, SegmentKind::DisplayList, span)?;
    let declared = view.u32(0)? as usize;
    let count = view.element_count(DISPLAY_LIST_HEADER_SIZE, COMMAND_SIZE)?;
    if declared != count {
        warn!(declared, count, "display-list command count disagrees with segment length");
    }
    let area_len = count * COMMAND_SIZE;

    let mut lists = BTreeMap::new();
    let mut pending = Vec::new();
    let mut linear = Vec::new();

    let mut offset = 0;
    while offset < area_len {
        let list = decode_list(&view, area_len, offset, &mut pending)?;
        linear.push(offset);
        offset = list.end;
        lists.insert(list.start, list);
    }

    while let Some(start) = pending.pop() {
        if lists.contains_key(&start) {
            continue;
        }
        let list = decode_list(&view, area_len, start, &mut pending)?;
        lists.insert(start, list);
    }

    let roots = select_roots(&lists, &linear, area_len);
    debug!(count, lists = lists.len(), roots = roots.len(), "decoded display-list segment");

    Ok(DisplayListSegment {
        area_len,
        lists,
        roots,
    })
}
