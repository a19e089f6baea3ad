//! Synthetic model files for unit tests.

use crate::models::display_list::{
    G_DL, G_ENDDL, G_SETTILE, G_SETTILESIZE, G_SETTIMG, G_TEXTURE, G_TRI1, G_TRI2, G_VTX,
    SEGMENT_DISPLAY_LIST, SEGMENT_TEXTURE, SEGMENT_VERTEX,
};
use crate::models::header::{HEADER_SIZE, MODEL_MAGIC};

fn segment_address(segment: u8, offset: u32) -> u32 {
    ((segment as u32) << 24) | (offset & 0x00FF_FFFF)
}

/// Load `count` vertices starting at vertex-array index `src` into cache slot `dst`.
pub fn vtx(src: u32, count: u32, dst: u32) -> (u32, u32) {
    let w0 = ((G_VTX as u32) << 24) | ((dst * 2) << 16) | (count << 10) | (count * 16 - 1);
    (w0, segment_address(SEGMENT_VERTEX, src * 16))
}

fn packed_tri(a: u32, b: u32, c: u32) -> u32 {
    ((a * 2) << 16) | ((b * 2) << 8) | (c * 2)
}

pub fn tri1(a: u32, b: u32, c: u32) -> (u32, u32) {
    ((G_TRI1 as u32) << 24, packed_tri(a, b, c))
}

pub fn tri2(first: [u32; 3], second: [u32; 3]) -> (u32, u32) {
    (
        ((G_TRI2 as u32) << 24) | packed_tri(first[0], first[1], first[2]),
        packed_tri(second[0], second[1], second[2]),
    )
}

/// Bind the texture whose pixel data starts at `data_offset`.
pub fn settimg(fmt: u32, size: u32, data_offset: u32) -> (u32, u32) {
    let w0 = ((G_SETTIMG as u32) << 24) | (fmt << 21) | (size << 19);
    (w0, segment_address(SEGMENT_TEXTURE, data_offset))
}

/// Tile 0 wrap state. `s` and `t` are `(clamp/mirror bits, mask, shift)`.
pub fn settile(s: (u32, u32, u32), t: (u32, u32, u32)) -> (u32, u32) {
    let w1 = (t.0 << 18) | (t.1 << 14) | (t.2 << 10) | (s.0 << 8) | (s.1 << 4) | s.2;
    ((G_SETTILE as u32) << 24, w1)
}

/// Tile 0 size in texels.
pub fn settilesize(width: u32, height: u32) -> (u32, u32) {
    let lrs = (width - 1) << 2;
    let lrt = (height - 1) << 2;
    ((G_SETTILESIZE as u32) << 24, (lrs << 12) | lrt)
}

pub fn texture(s: u16, t: u16) -> (u32, u32) {
    (((G_TEXTURE as u32) << 24) | 1, ((s as u32) << 16) | t as u32)
}

/// Branch to the command at byte `target` of the command area.
pub fn branch(jump: bool, target: u32) -> (u32, u32) {
    (
        ((G_DL as u32) << 24) | ((jump as u32) << 16),
        segment_address(SEGMENT_DISPLAY_LIST, target),
    )
}

pub fn end() -> (u32, u32) {
    ((G_ENDDL as u32) << 24, 0)
}

struct TestVertex {
    position: [i16; 3],
    uv: [i16; 2],
    rgba: [u8; 4],
}

struct TestTexture {
    format: u16,
    width: u8,
    height: u8,
    data: Vec<u8>,
}

/// Builds a model file with contiguous, exactly sized segments in the order
/// geometry layout, texture, display list, vertex, collision.
#[derive(Default)]
pub struct ModelFileBuilder {
    vertices: Vec<TestVertex>,
    textures: Vec<TestTexture>,
    collision: Vec<([u16; 3], u32)>,
    commands: Vec<(u32, u32)>,
    geo: Vec<u8>,
}

impl ModelFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex(mut self, x: i16, y: i16, z: i16, u: i16, v: i16, rgba: [u8; 4]) -> Self {
        self.vertices.push(TestVertex {
            position: [x, y, z],
            uv: [u, v],
            rgba,
        });
        self
    }

    pub fn texture(mut self, format: u16, width: u8, height: u8, data: Vec<u8>) -> Self {
        self.textures.push(TestTexture {
            format,
            width,
            height,
            data,
        });
        self
    }

    pub fn collision_tri(mut self, v: [u16; 3], flags: u32) -> Self {
        self.collision.push((v, flags));
        self
    }

    pub fn command(mut self, (w0, w1): (u32, u32)) -> Self {
        self.commands.push((w0, w1));
        self
    }

    pub fn geo(mut self, bytes: Vec<u8>) -> Self {
        self.geo = bytes;
        self
    }

    fn texture_segment(&self) -> Vec<u8> {
        let pixel_bytes: usize = self.textures.iter().map(|t| t.data.len()).sum();
        let mut out = Vec::new();
        out.extend((pixel_bytes as u32).to_be_bytes());
        out.extend((self.textures.len() as u16).to_be_bytes());
        out.extend([0, 0]);
        let mut data_offset = 0u32;
        for texture in &self.textures {
            out.extend(data_offset.to_be_bytes());
            out.extend(texture.format.to_be_bytes());
            out.extend([0, 0, texture.width, texture.height]);
            out.extend([0; 6]);
            data_offset += texture.data.len() as u32;
        }
        for texture in &self.textures {
            out.extend(&texture.data);
        }
        out
    }

    fn display_list_segment(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend((self.commands.len() as u32).to_be_bytes());
        out.extend([0; 4]);
        for (w0, w1) in &self.commands {
            out.extend(w0.to_be_bytes());
            out.extend(w1.to_be_bytes());
        }
        out
    }

    fn vertex_segment(&self) -> Vec<u8> {
        let mut min = [0i16; 3];
        let mut max = [0i16; 3];
        for v in &self.vertices {
            for axis in 0..3 {
                min[axis] = min[axis].min(v.position[axis]);
                max[axis] = max[axis].max(v.position[axis]);
            }
        }
        let mut out = Vec::new();
        for c in min.iter().chain(&max).chain(&[0i16; 3]) {
            out.extend(c.to_be_bytes());
        }
        out.extend(0i16.to_be_bytes());
        out.extend(0u16.to_be_bytes());
        out.extend((self.vertices.len() as u16).to_be_bytes());
        for v in &self.vertices {
            for c in v.position {
                out.extend(c.to_be_bytes());
            }
            out.extend(0u16.to_be_bytes());
            out.extend(v.uv[0].to_be_bytes());
            out.extend(v.uv[1].to_be_bytes());
            out.extend(v.rgba);
        }
        out
    }

    fn collision_segment(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend([0; 12]);
        out.extend(0i16.to_be_bytes());
        out.extend(0i16.to_be_bytes());
        out.extend(1u16.to_be_bytes());
        out.extend(1000u16.to_be_bytes());
        out.extend((self.collision.len() as u16).to_be_bytes());
        out.extend([0, 0]);
        out.extend(0u16.to_be_bytes());
        out.extend((self.collision.len() as u16).to_be_bytes());
        for (v, flags) in &self.collision {
            for index in v {
                out.extend(index.to_be_bytes());
            }
            out.extend([0, 0]);
            out.extend(flags.to_be_bytes());
        }
        out
    }

    pub fn build(self) -> Vec<u8> {
        let mut file = vec![0u8; HEADER_SIZE];
        let put = |file: &mut Vec<u8>, field: usize, segment: &[u8]| {
            let offset = file.len() as u32;
            file.extend_from_slice(segment);
            if field == 0x08 {
                file[field..field + 2].copy_from_slice(&(offset as u16).to_be_bytes());
            } else {
                file[field..field + 4].copy_from_slice(&offset.to_be_bytes());
            }
        };

        if !self.geo.is_empty() {
            put(&mut file, 0x04, &self.geo);
        }
        if !self.textures.is_empty() {
            put(&mut file, 0x08, &self.texture_segment());
        }
        if !self.commands.is_empty() {
            put(&mut file, 0x0C, &self.display_list_segment());
        }
        put(&mut file, 0x10, &self.vertex_segment());
        if !self.collision.is_empty() {
            put(&mut file, 0x1C, &self.collision_segment());
        }

        file[0x00..0x04].copy_from_slice(&MODEL_MAGIC.to_be_bytes());
        file[0x30..0x32].copy_from_slice(&(self.collision.len() as u16).to_be_bytes());
        file[0x32..0x34].copy_from_slice(&(self.vertices.len() as u16).to_be_bytes());
        file[0x34..0x38].copy_from_slice(&1.0f32.to_be_bytes());
        file
    }
}

/// Geometry-layout command builder. Each command is padded to a multiple of 8.
pub struct GeoBuilder {
    bytes: Vec<u8>,
}

impl GeoBuilder {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Append a command with the given body (after the 8-byte kind/next prefix).
    /// `last` leaves its next-sibling offset at 0.
    pub fn command(mut self, kind: u32, body: &[u8], last: bool) -> Self {
        let len = (8 + body.len()).next_multiple_of(8);
        let next = if last { 0 } else { len as u32 };
        self.bytes.extend(kind.to_be_bytes());
        self.bytes.extend(next.to_be_bytes());
        self.bytes.extend(body);
        self.bytes.resize(self.bytes.len() + len - 8 - body.len(), 0);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}
