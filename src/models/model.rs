//! Assembly of decoded segments into a resolved [`Model`].
//!
//! The display lists are interpreted with the RSP state they depend on (vertex
//! cache, bound texture, tile 0 parameters, texture scale). Each triangle they draw
//! is matched against the collision table by its vertex triple, and materials are
//! synthesised from the distinct draw states. Collision triangles that are never
//! drawn are kept as invisible geometry.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::error::{DanglingReference, DecodeError, DecodeResult, ElementRef, SegmentKind};
use crate::handler::DecodeOptions;
use crate::models::collision::{
    self, CollisionInfo, CollisionSegment, CollisionSfx, GeoCube, TYPE_KEYWORDS,
};
use crate::models::display_list::{
    self, Command, DisplayList, DisplayListSegment, SEGMENT_TEXTURE, SEGMENT_VERTEX,
    SegmentAddress, TileSize, VERTEX_CACHE_SIZE, WrapParams,
};
use crate::models::geo_layout::{DrawRange, GeoLayout};
use crate::models::header::ModelHeader;
use crate::models::texture::{Texture, TextureSegment};
use crate::models::vertex::{Bounds, UV_FRACTION, VERTEX_SIZE, Vertex, VertexSegment};
use crate::recognized::Recognized;

/// Depth of the F3DEX display-list call stack.
pub const MAX_CALL_DEPTH: usize = 18;

/// Fallback texture size for UV normalisation when nothing better is bound.
const DEFAULT_TEXTURE_SIZE: u32 = 32;

/// What to do with references that point outside their target collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DanglingPolicy {
    /// Fail the whole assembly.
    Strict,
    /// Drop the offending element, record it, and continue. A drawn triangle that
    /// references a missing vertex or texture is dropped; its collision triangle, if
    /// any, is kept as invisible collision geometry.
    #[default]
    Lenient,
}

/// Output of the segment decoders. Absent segments decode to their defaults.
#[derive(Debug, Clone, Default)]
pub struct DecodedSegments {
    pub vertex: VertexSegment,
    pub texture: TextureSegment,
    pub collision: CollisionSegment,
    pub display_list: DisplayListSegment,
    pub geo_layout: GeoLayout,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResolvedVertex {
    /// Index into [`Model::vertices`].
    pub index: usize,
    pub position: [f32; 3],
    pub raw_uv: [i16; 2],
    /// UV normalised by the texture bound when the triangle was drawn.
    pub uv: [f32; 2],
    pub rgba: [u8; 4],
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResolvedTriangle {
    pub vertex_indices: [usize; 3],
    pub vertices: [ResolvedVertex; 3],
    pub material: usize,
    /// Index into the collision triangle table, if this triangle has collision.
    pub collision: Option<usize>,
    /// Offset of the drawing command in the display-list area. `None` for
    /// collision-only triangles.
    pub command_offset: Option<usize>,
    pub bone: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Material {
    pub name: String,
    /// Index into [`Model::textures`].
    pub texture: Option<usize>,
    pub wrap: WrapParams,
    /// The collision flag word the material was built from.
    pub collision_flags: Option<u32>,
    pub collision: CollisionInfo,
}

impl Material {
    pub fn visible(&self) -> bool {
        !self.collision.visibility_disabled
    }

    pub fn collidable(&self) -> bool {
        !self.collision.collision_disabled
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Model {
    pub header: ModelHeader,
    pub scale_factor: f32,
    pub bounds: Bounds,
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<ResolvedTriangle>,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub geometry: GeoLayout,
    pub collision_cubes: Vec<GeoCube>,
    /// References dropped under [`DanglingPolicy::Lenient`].
    pub diagnostics: Vec<DanglingReference>,
}

impl Model {
    pub fn material(&self, triangle: &ResolvedTriangle) -> &Material {
        &self.materials[triangle.material]
    }

    pub fn texture(&self, material: &Material) -> Option<&Texture> {
        material.texture.and_then(|index| self.textures.get(index))
    }

    pub fn visible_triangles(&self) -> impl Iterator<Item = &ResolvedTriangle> {
        self.triangles
            .iter()
            .filter(|tri| self.materials[tri.material].visible())
    }
}

struct Diagnostics {
    policy: DanglingPolicy,
    dropped: Vec<DanglingReference>,
}

impl Diagnostics {
    fn report(&mut self, reference: DanglingReference) -> DecodeResult<()> {
        match self.policy {
            DanglingPolicy::Strict => Err(DecodeError::DanglingReference(reference)),
            DanglingPolicy::Lenient => {
                warn!(%reference, "dropping dangling reference");
                self.dropped.push(reference);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TextureBinding {
    None,
    Bound(usize),
    Missing(SegmentAddress),
}

#[derive(Debug, Clone, Copy)]
struct DrawState {
    cache: [Option<usize>; VERTEX_CACHE_SIZE],
    texture: TextureBinding,
    wrap: WrapParams,
    tile_size: Option<TileSize>,
    scale: [f32; 2],
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            cache: [None; VERTEX_CACHE_SIZE],
            texture: TextureBinding::None,
            wrap: WrapParams::default(),
            tile_size: None,
            scale: [1.0, 1.0],
        }
    }
}

struct DrawnTriangle {
    command_offset: usize,
    vertices: [usize; 3],
    texture: Option<usize>,
    wrap: WrapParams,
    tile_size: Option<TileSize>,
    scale: [f32; 2],
}

/// G_TEXTURE scale: 0xFFFF is 1.0, anything else is a 0.16 fraction.
fn texture_scale(raw: u16) -> f32 {
    if raw == 0xFFFF {
        1.0
    } else {
        raw as f32 / 65536.0
    }
}

struct Interpreter<'a> {
    display_list: &'a DisplayListSegment,
    textures: &'a TextureSegment,
    texture_data_len: usize,
    vertex_count: usize,
    state: DrawState,
    active: Vec<usize>,
    drawn: Vec<DrawnTriangle>,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Interpreter<'a> {
    fn run(&mut self, start: usize) -> DecodeResult<()> {
        let display_list = self.display_list;
        let Some(list) = display_list.list(start) else {
            return Ok(());
        };
        self.active.push(start);
        let result = self.run_commands(list);
        self.active.pop();
        result
    }

    fn run_commands(&mut self, list: &'a DisplayList) -> DecodeResult<()> {
        for entry in &list.commands {
            match &entry.command {
                Command::LoadVertices {
                    address,
                    count,
                    cache_start,
                } => self.load_vertices(*address, *count, *cache_start),
                Command::DrawTriangleBatch { first, second } => {
                    self.draw(entry.offset, *first)?;
                    if let Some(second) = second {
                        self.draw(entry.offset, *second)?;
                    }
                }
                Command::LoadTexture { address, .. } => self.bind_texture(*address),
                Command::SetTile { tile: 0, wrap, .. } => self.state.wrap = *wrap,
                Command::SetTileSize { tile: 0, size } => self.state.tile_size = Some(*size),
                Command::SetTextureScale { s, t } => {
                    self.state.scale = [texture_scale(*s), texture_scale(*t)];
                }
                Command::Branch { target, jump } => {
                    self.branch(entry.offset, *target)?;
                    if *jump {
                        break;
                    }
                }
                Command::End => break,
                _ => {}
            }
        }
        Ok(())
    }

    fn load_vertices(&mut self, address: SegmentAddress, count: u8, cache_start: u8) {
        let first = address.offset as usize / VERTEX_SIZE;
        let valid = address.segment == SEGMENT_VERTEX && address.offset as usize % VERTEX_SIZE == 0;
        if !valid {
            warn!(?address, "vertex load from an unexpected address");
        }
        for i in 0..count as usize {
            let slot = cache_start as usize + i;
            let Some(entry) = self.state.cache.get_mut(slot) else {
                warn!(slot, "vertex load overflows the vertex cache");
                break;
            };
            *entry = valid.then_some(first + i);
        }
    }

    fn bind_texture(&mut self, address: SegmentAddress) {
        self.state.texture = if address.segment == SEGMENT_TEXTURE {
            match self.textures.texture_at(address.offset as usize) {
                Some(index) => TextureBinding::Bound(index),
                None => TextureBinding::Missing(address),
            }
        } else {
            TextureBinding::Missing(address)
        };
    }

    fn draw(&mut self, command_offset: usize, slots: [u8; 3]) -> DecodeResult<()> {
        let mut vertices = [0usize; 3];
        for (vertex, slot) in vertices.iter_mut().zip(slots) {
            let (index, bound) = match self.state.cache.get(slot as usize).copied().flatten() {
                Some(index) if index < self.vertex_count => {
                    *vertex = index;
                    continue;
                }
                Some(index) => (index, self.vertex_count),
                None => (slot as usize, VERTEX_CACHE_SIZE),
            };
            return self.diagnostics.report(DanglingReference {
                element: ElementRef::DrawnTriangle { command_offset },
                target: SegmentKind::Vertex,
                index,
                bound,
            });
        }

        let texture = match self.state.texture {
            TextureBinding::None => None,
            TextureBinding::Bound(index) => Some(index),
            TextureBinding::Missing(address) => {
                return self.diagnostics.report(DanglingReference {
                    element: ElementRef::DrawnTriangle { command_offset },
                    target: SegmentKind::Texture,
                    index: address.offset as usize,
                    bound: self.texture_data_len,
                });
            }
        };

        self.drawn.push(DrawnTriangle {
            command_offset,
            vertices,
            texture,
            wrap: self.state.wrap,
            tile_size: self.state.tile_size,
            scale: self.state.scale,
        });
        Ok(())
    }

    fn branch(&mut self, offset: usize, target: SegmentAddress) -> DecodeResult<()> {
        let area_len = self.display_list.area_len;
        let Some(start) = display_list::branch_target(target, area_len) else {
            return self.diagnostics.report(DanglingReference {
                element: ElementRef::Command { offset },
                target: SegmentKind::DisplayList,
                index: target.offset as usize,
                bound: area_len,
            });
        };
        if self.active.contains(&start) {
            trace!(offset, start, "skipping branch into an active display list");
            return Ok(());
        }
        if self.active.len() >= MAX_CALL_DEPTH {
            warn!(offset, start, "display-list call stack overflow");
            return Ok(());
        }
        self.run(start)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MaterialKey {
    texture: Option<usize>,
    wrap: WrapParams,
    collision: Option<u32>,
    drawn: bool,
}

/// Name in the add-on convention. The keywords mirror what [`collision::classify_name`]
/// recognises, so the name and the stored fields always agree.
fn material_name(index: usize, key: &MaterialKey) -> String {
    let mut name = match key.texture {
        Some(texture) => format!("M{index:03}_TEX{texture:02}"),
        None => format!("M{index:03}_NOTEX"),
    };
    if !key.drawn {
        name.push_str("_INVIS");
    }
    match key.collision.and_then(collision::classify_flags) {
        None if key.collision.is_none() => name.push_str("_NOCOLL"),
        None => {}
        Some(info) => {
            for (keyword, flag) in TYPE_KEYWORDS {
                if info.flags.contains(flag) {
                    name.push('_');
                    name.push_str(keyword);
                }
            }
            if let Recognized::Known(sfx) = info.sfx
                && sfx != CollisionSfx::Normal
            {
                name.push('_');
                name.push_str(sfx.keyword());
            }
        }
    }
    name
}

struct MaterialTable {
    materials: Vec<Material>,
    by_key: HashMap<MaterialKey, usize>,
}

impl MaterialTable {
    fn intern(&mut self, key: MaterialKey) -> usize {
        if let Some(&index) = self.by_key.get(&key) {
            return index;
        }
        let index = self.materials.len();
        let name = material_name(index, &key);
        let collision = collision::classify(&name, key.collision);
        trace!(index, %name, "synthesised material");
        self.materials.push(Material {
            name,
            texture: key.texture,
            wrap: key.wrap,
            collision_flags: key.collision,
            collision,
        });
        self.by_key.insert(key, index);
        index
    }
}

fn sorted(mut v: [usize; 3]) -> [usize; 3] {
    v.sort_unstable();
    v
}

fn resolve_vertex(
    vertices: &[Vertex],
    index: usize,
    scale_factor: f32,
    uv_scale: [f32; 2],
) -> ResolvedVertex {
    let vertex = &vertices[index];
    ResolvedVertex {
        index,
        position: vertex.position(scale_factor),
        raw_uv: vertex.uv,
        uv: [
            vertex.uv[0] as f32 * uv_scale[0],
            vertex.uv[1] as f32 * uv_scale[1],
        ],
        rgba: vertex.rgba,
    }
}

/// Per-axis multiplier taking raw S10.5 UVs to normalised texture coordinates.
fn uv_scale(tri: &DrawnTriangle, textures: &[Texture]) -> [f32; 2] {
    let bound = tri
        .texture
        .and_then(|index| textures.get(index))
        .filter(|t| t.width > 0 && t.height > 0)
        .map(|t| (t.width, t.height));
    let (width, height) = bound
        .or_else(|| tri.tile_size.map(|size| (size.width(), size.height())))
        .unwrap_or((DEFAULT_TEXTURE_SIZE, DEFAULT_TEXTURE_SIZE));
    [
        tri.wrap.s.shift_factor() * tri.scale[0] / (UV_FRACTION * width as f32),
        tri.wrap.t.shift_factor() * tri.scale[1] / (UV_FRACTION * height as f32),
    ]
}

/// Resolve cross-segment references and build the model.
pub fn assemble(
    header: &ModelHeader,
    segments: DecodedSegments,
    options: &DecodeOptions,
) -> DecodeResult<Model> {
    let DecodedSegments {
        vertex,
        texture,
        collision,
        display_list,
        geo_layout,
    } = segments;
    let vertices = vertex.vertices;
    let mut diagnostics = Diagnostics {
        policy: options.policy,
        dropped: Vec::new(),
    };

    let texture_data_len = texture
        .textures
        .iter()
        .map(|t| t.data_offset + t.raw.len())
        .max()
        .unwrap_or(0);
    let mut interpreter = Interpreter {
        display_list: &display_list,
        textures: &texture,
        texture_data_len,
        vertex_count: vertices.len(),
        state: DrawState::default(),
        active: Vec::new(),
        drawn: Vec::new(),
        diagnostics: &mut diagnostics,
    };
    for &root in &display_list.roots {
        interpreter.run(root)?;
    }
    let drawn = interpreter.drawn;

    // Collision triangles by sorted vertex triple, in table order.
    let mut by_triple: HashMap<[usize; 3], Vec<usize>> = HashMap::new();
    let mut usable = vec![false; collision.triangles.len()];
    for (index, tri) in collision.triangles.iter().enumerate() {
        let v = tri.vertices.map(usize::from);
        if let Some(&bad) = v.iter().find(|&&i| i >= vertices.len()) {
            diagnostics.report(DanglingReference {
                element: ElementRef::CollisionTriangle { index },
                target: SegmentKind::Vertex,
                index: bad,
                bound: vertices.len(),
            })?;
            continue;
        }
        usable[index] = true;
        by_triple.entry(sorted(v)).or_default().push(index);
    }
    let mut matched = vec![false; collision.triangles.len()];

    let textures = texture.textures;
    let ranges: Vec<DrawRange> = geo_layout.draw_ranges();
    let mut table = MaterialTable {
        materials: Vec::new(),
        by_key: HashMap::new(),
    };
    let mut triangles = Vec::with_capacity(drawn.len());

    for tri in &drawn {
        let candidates = by_triple.get(&sorted(tri.vertices));
        let collision_index = candidates.and_then(|candidates| {
            candidates
                .iter()
                .copied()
                .find(|&c| !matched[c])
                .or_else(|| candidates.first().copied())
        });
        if let Some(c) = collision_index {
            matched[c] = true;
        }

        let key = MaterialKey {
            texture: tri.texture,
            wrap: tri.wrap,
            collision: collision_index.map(|c| collision.triangles[c].flags),
            drawn: true,
        };
        let material = table.intern(key);

        let scale = uv_scale(tri, &textures);
        triangles.push(ResolvedTriangle {
            vertex_indices: tri.vertices,
            vertices: tri
                .vertices
                .map(|i| resolve_vertex(&vertices, i, options.scale_factor, scale)),
            material,
            collision: collision_index,
            command_offset: Some(tri.command_offset),
            bone: GeoLayout::bone_for_command(&ranges, tri.command_offset),
        });
    }

    let untextured = 1.0 / (UV_FRACTION * DEFAULT_TEXTURE_SIZE as f32);
    for (index, tri) in collision.triangles.iter().enumerate() {
        if !usable[index] || matched[index] {
            continue;
        }
        let key = MaterialKey {
            texture: None,
            wrap: WrapParams::default(),
            collision: Some(tri.flags),
            drawn: false,
        };
        let material = table.intern(key);
        let vertex_indices = tri.vertices.map(usize::from);
        triangles.push(ResolvedTriangle {
            vertex_indices,
            vertices: vertex_indices.map(|i| {
                resolve_vertex(&vertices, i, options.scale_factor, [untextured, untextured])
            }),
            material,
            collision: Some(index),
            command_offset: None,
            bone: None,
        });
    }

    if header.tri_count as usize != collision.triangles.len() {
        debug!(
            declared = header.tri_count,
            collision = collision.triangles.len(),
            "header triangle count differs from collision table"
        );
    }
    debug!(
        triangles = triangles.len(),
        materials = table.materials.len(),
        dropped = diagnostics.dropped.len(),
        "assembled model"
    );

    Ok(Model {
        header: header.clone(),
        scale_factor: options.scale_factor,
        bounds: vertex.bounds,
        vertices,
        triangles,
        materials: table.materials,
        textures,
        geometry: geo_layout,
        collision_cubes: collision.cubes,
        diagnostics: diagnostics.dropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::decode_segments;
    use crate::models::collision::CollisionFlags;
    use crate::models::geo_layout::{GEO_BONE, GEO_LOAD_DL};
    use crate::models::header::parse_header;
    use crate::models::test_support::{self as ts, GeoBuilder, ModelFileBuilder};

    fn triangle_file() -> ModelFileBuilder {
        ModelFileBuilder::new()
            .vertex(0, 0, 0, 0, 0, [255; 4])
            .vertex(100, 0, 0, 1024, 0, [255; 4])
            .vertex(0, 100, 0, 0, 512, [255; 4])
    }

    fn assemble_file(file: &[u8], options: &DecodeOptions) -> DecodeResult<Model> {
        let header = parse_header(file)?;
        let segments = decode_segments(file, &header)?;
        assemble(&header, segments, options)
    }

    #[test]
    fn dangling_vertex_drops_one_triangle_when_lenient() {
        let file = triangle_file()
            .command(ts::vtx(0, 4, 0))
            .command(ts::tri2([0, 1, 2], [0, 1, 3]))
            .command(ts::end())
            .build();
        let model = assemble_file(&file, &DecodeOptions::default()).unwrap();

        assert_eq!(model.triangles.len(), 1);
        assert_eq!(
            model.diagnostics,
            vec![DanglingReference {
                element: ElementRef::DrawnTriangle { command_offset: 8 },
                target: SegmentKind::Vertex,
                index: 3,
                bound: 3,
            }]
        );
    }

    #[test]
    fn dangling_vertex_fails_when_strict() {
        let file = triangle_file()
            .command(ts::vtx(0, 4, 0))
            .command(ts::tri2([0, 1, 2], [0, 1, 3]))
            .build();
        let options = DecodeOptions::builder().policy(DanglingPolicy::Strict).build();
        assert!(matches!(
            assemble_file(&file, &options),
            Err(DecodeError::DanglingReference(DanglingReference {
                index: 3,
                bound: 3,
                ..
            }))
        ));
    }

    #[test]
    fn drawn_triangles_pick_up_collision_flags() {
        let flags = (2 << 24) | CollisionFlags::SLIPPERY.bits();
        let file = triangle_file()
            .collision_tri([2, 1, 0], flags)
            .command(ts::vtx(0, 3, 0))
            .command(ts::tri1(0, 1, 2))
            .build();
        let model = assemble_file(&file, &DecodeOptions::default()).unwrap();

        assert_eq!(model.triangles.len(), 1);
        let material = model.material(&model.triangles[0]);
        assert_eq!(material.name, "M000_NOTEX_SLIP_WOOD");
        assert_eq!(material.collision.flags, CollisionFlags::SLIPPERY);
        assert_eq!(material.collision.sfx, Recognized::Known(CollisionSfx::Wood));
        assert!(material.visible() && material.collidable());
        assert_eq!(model.triangles[0].collision, Some(0));
    }

    #[test]
    fn undrawn_collision_becomes_invisible() {
        let file = triangle_file().collision_tri([0, 1, 2], 0).build();
        let model = assemble_file(&file, &DecodeOptions::default()).unwrap();

        assert_eq!(model.triangles.len(), 1);
        let material = model.material(&model.triangles[0]);
        assert_eq!(material.name, "M000_NOTEX_INVIS");
        assert!(!material.visible());
        assert!(material.collidable());
        assert_eq!(model.visible_triangles().count(), 0);
    }

    #[test]
    fn drawn_triangles_without_collision_are_nocoll() {
        let file = triangle_file()
            .command(ts::vtx(0, 3, 0))
            .command(ts::tri1(0, 1, 2))
            .build();
        let model = assemble_file(&file, &DecodeOptions::default()).unwrap();
        let material = model.material(&model.triangles[0]);
        assert_eq!(material.name, "M000_NOTEX_NOCOLL");
        assert!(!material.collidable());
    }

    #[test]
    fn uvs_are_normalised_by_the_bound_texture() {
        let file = triangle_file()
            .texture(0x04, 32, 16, vec![0; 32 * 16 * 2])
            .command(ts::settimg(0, 2, 0))
            .command(ts::texture(0xFFFF, 0xFFFF))
            .command(ts::vtx(0, 3, 0))
            .command(ts::tri1(0, 1, 2))
            .build();
        let model = assemble_file(&file, &DecodeOptions::default()).unwrap();

        let tri = &model.triangles[0];
        assert_eq!(model.material(tri).name, "M000_TEX00_NOCOLL");
        assert_eq!(model.material(tri).texture, Some(0));
        // 1024 / 32 = 32 texels across a 32-wide texture.
        assert_eq!(tri.vertices[1].uv, [1.0, 0.0]);
        // 512 / 32 = 16 texels down a 16-high texture.
        assert_eq!(tri.vertices[2].uv, [0.0, 1.0]);
        assert_eq!(tri.vertices[1].raw_uv, [1024, 0]);
    }

    #[test]
    fn scale_factor_applies_to_resolved_positions() {
        let file = ModelFileBuilder::new()
            .vertex(12800, 25600, -3200, 0, 0, [0; 4])
            .vertex(0, 0, 0, 0, 0, [0; 4])
            .vertex(1, 0, 0, 0, 0, [0; 4])
            .collision_tri([0, 1, 2], 0)
            .build();
        let model = assemble_file(&file, &DecodeOptions::default()).unwrap();
        assert_eq!(model.triangles[0].vertices[0].position, [128.0, 256.0, -32.0]);
    }

    #[test]
    fn triangles_with_missing_textures_are_dropped() {
        let file = triangle_file()
            .collision_tri([0, 1, 2], 0)
            .command(ts::settimg(0, 2, 0x40))
            .command(ts::vtx(0, 3, 0))
            .command(ts::tri1(0, 1, 2))
            .build();
        let model = assemble_file(&file, &DecodeOptions::default()).unwrap();

        assert_eq!(
            model.diagnostics,
            vec![DanglingReference {
                element: ElementRef::DrawnTriangle { command_offset: 16 },
                target: SegmentKind::Texture,
                index: 0x40,
                bound: 0,
            }]
        );
        // Only the collision triangle survives, as invisible geometry.
        assert_eq!(model.triangles.len(), 1);
        assert_eq!(model.triangles[0].command_offset, None);
        assert!(!model.material(&model.triangles[0]).visible());

        let strict = DecodeOptions::builder()
            .policy(DanglingPolicy::Strict)
            .build();
        assert!(matches!(
            assemble_file(&file, &strict),
            Err(DecodeError::DanglingReference(DanglingReference {
                target: SegmentKind::Texture,
                ..
            }))
        ));
    }

    #[test]
    fn called_lists_draw_once_with_caller_state() {
        let file = triangle_file()
            .command(ts::vtx(0, 3, 0))
            .command(ts::branch(false, 24))
            .command(ts::end())
            .command(ts::tri1(0, 1, 2))
            .command(ts::end())
            .build();
        let model = assemble_file(&file, &DecodeOptions::default()).unwrap();
        assert_eq!(model.triangles.len(), 1);
        assert_eq!(model.triangles[0].command_offset, Some(24));
    }

    #[test]
    fn a_list_calling_itself_still_draws() {
        let file = triangle_file()
            .command(ts::vtx(0, 3, 0))
            .command(ts::tri1(0, 1, 2))
            .command(ts::branch(false, 0))
            .command(ts::end())
            .build();
        let model = assemble_file(&file, &DecodeOptions::default()).unwrap();
        assert_eq!(model.triangles.len(), 1);
        assert!(model.diagnostics.is_empty());
    }

    #[test]
    fn lists_jumping_back_to_the_first_still_draw() {
        let file = triangle_file()
            .command(ts::vtx(0, 3, 0))
            .command(ts::tri1(0, 1, 2))
            .command(ts::branch(true, 24))
            .command(ts::tri1(2, 1, 0))
            .command(ts::branch(true, 0))
            .build();
        let model = assemble_file(&file, &DecodeOptions::default()).unwrap();
        let offsets: Vec<_> = model.triangles.iter().map(|t| t.command_offset).collect();
        assert_eq!(offsets, vec![Some(8), Some(24)]);
        assert!(model.diagnostics.is_empty());
    }

    #[test]
    fn geometry_bones_are_assigned_to_triangles() {
        let load_dl = [0u16.to_be_bytes(), 3u16.to_be_bytes()].concat();
        let geo = GeoBuilder::new()
            .command(GEO_BONE, &[0, 16, 7, 0], true)
            .command(GEO_LOAD_DL, &load_dl, true)
            .build();
        let file = triangle_file()
            .geo(geo)
            .command(ts::vtx(0, 3, 0))
            .command(ts::tri1(0, 1, 2))
            .command(ts::end())
            .command(ts::tri1(2, 1, 0))
            .build();
        let model = assemble_file(&file, &DecodeOptions::default()).unwrap();

        assert_eq!(model.triangles.len(), 2);
        assert_eq!(model.triangles[0].bone, Some(7));
        assert_eq!(model.triangles[1].bone, None);
    }
}
