//! Geometry-layout segment: a command graph describing the model hierarchy.
//!
//! Commands form sibling chains, and some commands own child chains. The same command
//! may be reached more than once (instancing), so nodes live in an arena keyed by
//! segment offset and every traversal is bounded by a visited set.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use tracing::{debug, trace};

use crate::error::{DecodeError, DecodeResult, SegmentKind};
use crate::models::display_list::COMMAND_SIZE;
use crate::models::{SegmentSpan, SegmentView};

pub const GEO_ALIGNMENT: usize = 8;

pub const GEO_SORT: u32 = 0x01;
pub const GEO_BONE: u32 = 0x02;
pub const GEO_LOAD_DL: u32 = 0x03;
pub const GEO_SKINNING: u32 = 0x05;
pub const GEO_LOD: u32 = 0x08;
pub const GEO_REFERENCE_POINT: u32 = 0x0A;
pub const GEO_SELECTOR: u32 = 0x0C;
pub const GEO_DRAW_DISTANCE: u32 = 0x0D;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum GeoCommand {
    /// Draws its two children in an order chosen by the camera's side of a plane.
    Sort {
        a: [f32; 3],
        b: [f32; 3],
    },
    Bone {
        bone: u8,
    },
    LoadDisplayList {
        first_command: u16,
        command_count: u16,
    },
    Skinning {
        first_command: u16,
    },
    Lod {
        max_distance: f32,
        min_distance: f32,
        pivot: [f32; 3],
    },
    ReferencePoint {
        index: u16,
        bone: u16,
        position: [f32; 3],
    },
    Selector {
        selector: u16,
    },
    DrawDistance {
        min: [i16; 3],
        max: [i16; 3],
    },
    Unknown {
        kind: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GeoNode {
    /// Offset of the command within the segment.
    pub offset: usize,
    pub command: GeoCommand,
    /// Child chains, as arena indices.
    pub children: Vec<usize>,
    /// Next sibling, as an arena index.
    pub next: Option<usize>,
}

/// A run of display-list commands drawn under a bone.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DrawRange {
    /// Byte offsets into the display-list command area.
    pub commands: Range<usize>,
    pub bone: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GeoLayout {
    /// Arena of decoded nodes. Index 0 is the root when the layout is non-empty.
    pub nodes: Vec<GeoNode>,
}

impl GeoLayout {
    pub fn root(&self) -> Option<&GeoNode> {
        self.nodes.first()
    }

    pub fn node_at_offset(&self, offset: usize) -> Option<&GeoNode> {
        self.nodes.iter().find(|node| node.offset == offset)
    }

    /// Display-list ranges drawn by LOAD_DL commands, each with the nearest enclosing
    /// bone. Sorted by start offset.
    pub fn draw_ranges(&self) -> Vec<DrawRange> {
        let mut ranges = Vec::new();
        if self.nodes.is_empty() {
            return ranges;
        }

        let mut visited = HashSet::new();
        let mut stack = vec![(0usize, None::<u8>)];
        while let Some((index, bone)) = stack.pop() {
            if !visited.insert((index, bone)) {
                continue;
            }
            let node = &self.nodes[index];
            let inner_bone = match node.command {
                GeoCommand::Bone { bone } => Some(bone),
                _ => bone,
            };
            if let GeoCommand::LoadDisplayList {
                first_command,
                command_count,
            } = node.command
            {
                let start = first_command as usize * COMMAND_SIZE;
                let end = start + command_count as usize * COMMAND_SIZE;
                ranges.push(DrawRange {
                    commands: start..end,
                    bone: inner_bone,
                });
            }
            if let Some(next) = node.next {
                stack.push((next, bone));
            }
            stack.extend(node.children.iter().map(|&child| (child, inner_bone)));
        }

        ranges.sort_by_key(|range| (range.commands.start, range.commands.end));
        ranges.dedup();
        ranges
    }

    /// Bone drawing the display-list command at `command_offset`, if any range covers it.
    pub fn bone_for_command(ranges: &[DrawRange], command_offset: usize) -> Option<u8> {
        ranges
            .iter()
            .find(|range| range.commands.contains(&command_offset))
            .and_then(|range| range.bone)
    }
}

/// Resolve a child or sibling offset relative to the owning command. Zero means none.
fn relative(view: &SegmentView<'_>, owner: usize, delta: i64) -> DecodeResult<Option<usize>> {
    if delta == 0 {
        return Ok(None);
    }
    let target = owner as i64 + delta;
    if target < 0 || target as usize >= view.len() {
        return Err(DecodeError::SegmentOutOfBounds {
            segment: SegmentKind::GeoLayout,
            offset: target.max(0) as usize,
            len: 8,
            available: view.len(),
        });
    }
    let target = target as usize;
    if target % GEO_ALIGNMENT != 0 {
        return Err(DecodeError::MisalignedSegment {
            segment: SegmentKind::GeoLayout,
            len: target,
            element_width: GEO_ALIGNMENT,
        });
    }
    Ok(Some(target))
}

struct Arena {
    nodes: Vec<GeoNode>,
    by_offset: HashMap<usize, usize>,
    pending: Vec<usize>,
}

impl Arena {
    /// Arena index for the command at `offset`, queueing it for parsing when new.
    fn node_at(&mut self, offset: usize) -> usize {
        if let Some(&index) = self.by_offset.get(&offset) {
            return index;
        }
        let index = self.nodes.len();
        self.nodes.push(GeoNode {
            offset,
            command: GeoCommand::Unknown { kind: 0 },
            children: Vec::new(),
            next: None,
        });
        self.by_offset.insert(offset, index);
        self.pending.push(index);
        index
    }
}

fn parse_command(
    view: &SegmentView<'_>,
    at: usize,
) -> DecodeResult<(GeoCommand, Vec<Option<usize>>)> {
    let kind = view.u32(at)?;
    let child16 = |field: usize| -> DecodeResult<Option<usize>> {
        relative(view, at, view.u16(at + field)? as i64)
    };
    let child32 = |field: usize| -> DecodeResult<Option<usize>> {
        relative(view, at, view.u32(at + field)? as i32 as i64)
    };

    Ok(match kind {
        GEO_SORT => (
            GeoCommand::Sort {
                a: view.f32x3(at + 0x08)?,
                b: view.f32x3(at + 0x14)?,
            },
            vec![child16(0x20)?, child32(0x24)?],
        ),
        GEO_BONE => (
            GeoCommand::Bone {
                bone: view.u8(at + 0x0A)?,
            },
            vec![child16(0x08)?],
        ),
        GEO_LOAD_DL => (
            GeoCommand::LoadDisplayList {
                first_command: view.u16(at + 0x08)?,
                command_count: view.u16(at + 0x0A)?,
            },
            Vec::new(),
        ),
        GEO_SKINNING => (
            GeoCommand::Skinning {
                first_command: view.u16(at + 0x08)?,
            },
            Vec::new(),
        ),
        GEO_LOD => (
            GeoCommand::Lod {
                max_distance: view.f32(at + 0x08)?,
                min_distance: view.f32(at + 0x0C)?,
                pivot: view.f32x3(at + 0x10)?,
            },
            vec![child32(0x1C)?],
        ),
        GEO_REFERENCE_POINT => (
            GeoCommand::ReferencePoint {
                index: view.u16(at + 0x08)?,
                bone: view.u16(at + 0x0A)?,
                position: view.f32x3(at + 0x0C)?,
            },
            Vec::new(),
        ),
        GEO_SELECTOR => {
            let count = view.u16(at + 0x08)? as usize;
            let children = (0..count)
                .map(|i| child32(0x0C + i * 4))
                .collect::<DecodeResult<Vec<_>>>()?;
            (
                GeoCommand::Selector {
                    selector: view.u16(at + 0x0A)?,
                },
                children,
            )
        }
        GEO_DRAW_DISTANCE => (
            GeoCommand::DrawDistance {
                min: view.i16x3(at + 0x08)?,
                max: view.i16x3(at + 0x0E)?,
            },
            vec![child16(0x14)?],
        ),
        kind => {
            trace!(kind, offset = at, "unknown geometry-layout command");
            (GeoCommand::Unknown { kind }, Vec::new())
        }
    })
}

pub fn decode(buffer: &[u8], span: SegmentSpan) -> DecodeResult<GeoLayout> {
    let view = SegmentView::new(buffer, SegmentKind::GeoLayout, span)?;
    if view.len() == 0 {
        return Ok(GeoLayout::default());
    }

    let mut arena = Arena {
        nodes: Vec::new(),
        by_offset: HashMap::new(),
        pending: Vec::new(),
    };
    arena.node_at(0);

    while let Some(index) = arena.pending.pop() {
        let at = arena.nodes[index].offset;
        let (command, child_offsets) = parse_command(&view, at)?;
        let next = relative(&view, at, view.u32(at + 4)? as i64)?;

        let children = child_offsets
            .into_iter()
            .flatten()
            .map(|offset| arena.node_at(offset))
            .collect();
        let next = next.map(|offset| arena.node_at(offset));

        let node = &mut arena.nodes[index];
        node.command = command;
        node.children = children;
        node.next = next;
    }
    debug!(nodes = arena.nodes.len(), "decoded geometry layout");

    Ok(GeoLayout { nodes: arena.nodes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::header::parse_header;
    use crate::models::test_support::{GeoBuilder, ModelFileBuilder};

    fn decode_geo(geo: Vec<u8>) -> DecodeResult<GeoLayout> {
        let file = ModelFileBuilder::new().geo(geo).build();
        let header = parse_header(&file).unwrap();
        decode(&file, header.segment(SegmentKind::GeoLayout).unwrap())
    }

    fn load_dl(first: u16, count: u16) -> Vec<u8> {
        [first.to_be_bytes(), count.to_be_bytes()].concat()
    }

    #[test]
    fn bones_apply_to_their_child_chains() {
        let geo = GeoBuilder::new()
            .command(GEO_BONE, &[0, 32, 5, 0], false)
            .command(GEO_LOAD_DL, &load_dl(2, 1), true)
            .command(GEO_LOAD_DL, &load_dl(0, 2), true)
            .build();
        let layout = decode_geo(geo).unwrap();

        assert_eq!(layout.nodes.len(), 3);
        assert_eq!(layout.root().unwrap().command, GeoCommand::Bone { bone: 5 });
        assert_eq!(
            layout.draw_ranges(),
            vec![
                DrawRange {
                    commands: 0..16,
                    bone: Some(5)
                },
                DrawRange {
                    commands: 16..24,
                    bone: None
                },
            ]
        );
        let ranges = layout.draw_ranges();
        assert_eq!(GeoLayout::bone_for_command(&ranges, 8), Some(5));
        assert_eq!(GeoLayout::bone_for_command(&ranges, 24), None);
    }

    #[test]
    fn cycles_terminate() {
        // The selector's only child points back at the chain head.
        let mut selector = vec![0, 1, 0, 0];
        selector.extend((-16i32).to_be_bytes());
        let geo = GeoBuilder::new()
            .command(GEO_LOAD_DL, &load_dl(0, 1), false)
            .command(GEO_SELECTOR, &selector, true)
            .build();
        let layout = decode_geo(geo).unwrap();

        assert_eq!(layout.nodes.len(), 2);
        assert_eq!(layout.node_at_offset(16).unwrap().children, vec![0]);
        assert_eq!(layout.draw_ranges().len(), 1);
    }

    #[test]
    fn unaligned_children_are_misaligned() {
        let geo = GeoBuilder::new()
            .command(GEO_BONE, &[0, 4, 1, 0], true)
            .command(GEO_LOAD_DL, &load_dl(0, 1), true)
            .build();
        assert!(matches!(
            decode_geo(geo),
            Err(DecodeError::MisalignedSegment {
                segment: SegmentKind::GeoLayout,
                ..
            })
        ));
    }

    #[test]
    fn unknown_commands_are_kept() {
        let geo = GeoBuilder::new().command(0x0E, &[0; 8], true).build();
        let layout = decode_geo(geo).unwrap();
        assert_eq!(layout.nodes[0].command, GeoCommand::Unknown { kind: 0x0E });
    }
}
