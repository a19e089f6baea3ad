//! Collision segment decoding and collision classification.
//!
//! Collision semantics come from two places. Newer files carry a structured flag
//! word per collision triangle. Older tooling encoded the same information in
//! material names, so [`classify_name`] recognises the keywords artists used.

use bitflags::bitflags;
use tracing::{debug, warn};

use crate::error::{DecodeResult, SegmentKind};
use crate::models::vertex::Bounds;
use crate::models::{SegmentSpan, SegmentView};
use crate::recognized::Recognized;

pub const COLLISION_HEADER_SIZE: usize = 0x18;
pub const GEO_CUBE_SIZE: usize = 4;
pub const COLLISION_TRI_SIZE: usize = 0x0C;

const TYPE_MASK: u32 = 0x00FF_FFFF;
const SFX_SHIFT: u32 = 24;

bitflags! {
    /// Collision-type bits 0..=23 of a collision triangle's flag word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize))]
    pub struct CollisionFlags: u32 {
        const SLIPPERY = 1 << 0;
        const UNCLIMBABLE = 1 << 1;
        const WATER = 1 << 2;
        const DAMAGE = 1 << 3;
        const DEATH = 1 << 4;
        const TALON_TROT_ONLY = 1 << 5;
        const NO_SHADOW = 1 << 6;
        const USE_DEFAULT_SFX = 1 << 7;
    }
}

/// Footstep sound played on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CollisionSfx {
    #[default]
    Normal,
    Metal,
    Wood,
    Grass,
    Snow,
    Sand,
    Stone,
    Mud,
    Carpet,
    Ice,
    Splash,
}

impl CollisionSfx {
    pub fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            0 => CollisionSfx::Normal,
            1 => CollisionSfx::Metal,
            2 => CollisionSfx::Wood,
            3 => CollisionSfx::Grass,
            4 => CollisionSfx::Snow,
            5 => CollisionSfx::Sand,
            6 => CollisionSfx::Stone,
            7 => CollisionSfx::Mud,
            8 => CollisionSfx::Carpet,
            9 => CollisionSfx::Ice,
            10 => CollisionSfx::Splash,
            _ => return None,
        })
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Keyword used for this sound in material names.
    pub fn keyword(self) -> &'static str {
        match self {
            CollisionSfx::Normal => "NORMAL",
            CollisionSfx::Metal => "METAL",
            CollisionSfx::Wood => "WOOD",
            CollisionSfx::Grass => "GRASS",
            CollisionSfx::Snow => "SNOW",
            CollisionSfx::Sand => "SAND",
            CollisionSfx::Stone => "STONE",
            CollisionSfx::Mud => "MUD",
            CollisionSfx::Carpet => "CARPET",
            CollisionSfx::Ice => "ICE",
            CollisionSfx::Splash => "SPLASH",
        }
    }
}

/// Collision-type keywords, checked as substrings of upper-cased names.
pub const TYPE_KEYWORDS: [(&str, CollisionFlags); 7] = [
    ("SLIP", CollisionFlags::SLIPPERY),
    ("UNCLIMB", CollisionFlags::UNCLIMBABLE),
    ("WATER", CollisionFlags::WATER),
    ("DAMAGE", CollisionFlags::DAMAGE),
    ("DEATH", CollisionFlags::DEATH),
    ("TROT", CollisionFlags::TALON_TROT_ONLY),
    ("NOSHADOW", CollisionFlags::NO_SHADOW),
];

/// Sound keywords. The first match in table order wins.
pub const SFX_KEYWORDS: [(&str, CollisionSfx); 11] = [
    ("METAL", CollisionSfx::Metal),
    ("WOOD", CollisionSfx::Wood),
    ("GRASS", CollisionSfx::Grass),
    ("SNOW", CollisionSfx::Snow),
    ("SAND", CollisionSfx::Sand),
    ("ROCK", CollisionSfx::Stone),
    ("STONE", CollisionSfx::Stone),
    ("MUD", CollisionSfx::Mud),
    ("CARPET", CollisionSfx::Carpet),
    ("ICE", CollisionSfx::Ice),
    ("SPLASH", CollisionSfx::Splash),
];

pub const NO_COLLISION_KEYWORD: &str = "NOCOLL";
pub const INVISIBLE_KEYWORD: &str = "INVIS";

/// Collision semantics of one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CollisionInfo {
    pub collision_disabled: bool,
    pub visibility_disabled: bool,
    pub flags: CollisionFlags,
    pub sfx: Recognized<CollisionSfx, u8>,
}

impl Default for CollisionInfo {
    fn default() -> Self {
        Self {
            collision_disabled: false,
            visibility_disabled: false,
            flags: CollisionFlags::empty(),
            sfx: Recognized::Known(CollisionSfx::Normal),
        }
    }
}

/// Classify a structured flag word. `None` when undefined type bits are set,
/// meaning the word does not carry collision semantics.
pub fn classify_flags(raw: u32) -> Option<CollisionInfo> {
    let flags = CollisionFlags::from_bits(raw & TYPE_MASK)?;
    let sfx_id = (raw >> SFX_SHIFT) as u8;
    Some(CollisionInfo {
        collision_disabled: false,
        visibility_disabled: false,
        flags,
        sfx: Recognized::from_raw(sfx_id, |id| CollisionSfx::from_id(*id)),
    })
}

/// Infer collision semantics from a material name.
pub fn classify_name(name: &str) -> CollisionInfo {
    let upper = name.to_ascii_uppercase();
    let flags = TYPE_KEYWORDS
        .iter()
        .filter(|(keyword, _)| upper.contains(keyword))
        .fold(CollisionFlags::empty(), |acc, (_, flag)| acc | *flag);
    let sfx = SFX_KEYWORDS
        .iter()
        .find(|(keyword, _)| upper.contains(keyword))
        .map(|(_, sfx)| *sfx)
        .unwrap_or_default();

    CollisionInfo {
        collision_disabled: upper.contains(NO_COLLISION_KEYWORD),
        visibility_disabled: upper.contains(INVISIBLE_KEYWORD),
        flags,
        sfx: Recognized::Known(sfx),
    }
}

/// Combine both paths. A present, valid flag word decides the collision fields;
/// visibility always comes from the name.
pub fn classify(name: &str, structured: Option<u32>) -> CollisionInfo {
    let from_name = classify_name(name);
    match structured.and_then(classify_flags) {
        Some(info) => CollisionInfo {
            visibility_disabled: from_name.visibility_disabled,
            ..info
        },
        None => from_name,
    }
}

/// A spatial bucket listing a contiguous run of collision triangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct GeoCube {
    pub first_triangle: u16,
    pub triangle_count: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CollisionTriangle {
    pub vertices: [u16; 3],
    pub flags: u32,
}

impl CollisionTriangle {
    /// Vertex indices in ascending order, used to match drawn triangles.
    pub fn sorted_vertices(&self) -> [u16; 3] {
        let mut v = self.vertices;
        v.sort_unstable();
        v
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CollisionSegment {
    pub bounds: Bounds,
    pub stride: [i16; 2],
    pub cube_scale: u16,
    pub cubes: Vec<GeoCube>,
    pub triangles: Vec<CollisionTriangle>,
}

pub fn decode(buffer: &[u8], span: SegmentSpan) -> DecodeResult<CollisionSegment> {
    let view = SegmentView::new(buffer, SegmentKind::Collision, span)?;

    let bounds = Bounds {
        min: view.i16x3(0x00)?,
        max: view.i16x3(0x06)?,
    };
    let stride = [view.i16(0x0C)?, view.i16(0x0E)?];
    let cube_count = view.u16(0x10)? as usize;
    let cube_scale = view.u16(0x12)?;
    let declared = view.u16(0x14)? as usize;

    let cubes = (0..cube_count)
        .map(|i| {
            let at = COLLISION_HEADER_SIZE + i * GEO_CUBE_SIZE;
            Ok(GeoCube {
                first_triangle: view.u16(at)?,
                triangle_count: view.u16(at + 2)?,
            })
        })
        .collect::<DecodeResult<Vec<_>>>()?;

    let tri_start = COLLISION_HEADER_SIZE + cube_count * GEO_CUBE_SIZE;
    let count = view.element_count(tri_start, COLLISION_TRI_SIZE)?;
    if declared != count {
        warn!(declared, count, "collision triangle count disagrees with segment length");
    }

    let triangles = (0..count)
        .map(|i| {
            let at = tri_start + i * COLLISION_TRI_SIZE;
            Ok(CollisionTriangle {
                vertices: [view.u16(at)?, view.u16(at + 2)?, view.u16(at + 4)?],
                flags: view.u32(at + 8)?,
            })
        })
        .collect::<DecodeResult<Vec<_>>>()?;
    debug!(cube_count, count, "decoded collision segment");

    Ok(CollisionSegment {
        bounds,
        stride,
        cube_scale,
        cubes,
        triangles,
    })
}
