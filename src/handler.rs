//! Entry points tying the pipeline together: ROM or file bytes in, [`Model`] out.

use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

use bon::Builder;
use tracing::{debug, info, instrument};

use crate::catalog::{self, CatalogEntry};
use crate::data::compression::{self, DecompressLimits};
use crate::data::rom::{RomImage, RomIndexEntry};
use crate::error::{DecodeError, DecodeResult, SegmentKind};
use crate::models::header::{ModelHeader, parse_header};
use crate::models::model::{DanglingPolicy, DecodedSegments, Model, assemble};
use crate::models::{SegmentSpan, collision, display_list, geo_layout, texture, vertex};

pub const DEFAULT_SCALE_FACTOR: f32 = 100.0;
pub const SCALE_FACTOR_RANGE: RangeInclusive<f32> = 1.0..=1000.0;

/// Caller-selected decoding behaviour.
#[derive(Debug, Clone, Builder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecodeOptions {
    /// Model units per output unit. Vertex positions are divided by this.
    #[builder(default = DEFAULT_SCALE_FACTOR)]
    pub scale_factor: f32,
    #[builder(default)]
    pub policy: DanglingPolicy,
    #[builder(default)]
    pub limits: DecompressLimits,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl DecodeOptions {
    pub fn validate(&self) -> DecodeResult<()> {
        if !SCALE_FACTOR_RANGE.contains(&self.scale_factor) {
            return Err(DecodeError::InvalidOption(format!(
                "scale factor {} is outside {}..={}",
                self.scale_factor,
                SCALE_FACTOR_RANGE.start(),
                SCALE_FACTOR_RANGE.end()
            )));
        }
        if self.limits.max_ratio == 0 || self.limits.max_output == 0 {
            return Err(DecodeError::InvalidOption(
                "decompression limits must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Decode one segment, or produce its empty default when the header has no offset for it.
fn decode_segment<T: Default>(
    header: &ModelHeader,
    kind: SegmentKind,
    decode: impl FnOnce(SegmentSpan) -> DecodeResult<T>,
) -> DecodeResult<T> {
    match header.segment(kind) {
        Some(span) => decode(span),
        None => {
            debug!(%kind, "segment absent");
            Ok(T::default())
        }
    }
}

/// Run the five segment decoders. They only share the read-only buffer, so with the
/// `rayon` feature they run concurrently.
pub fn decode_segments(buffer: &[u8], header: &ModelHeader) -> DecodeResult<DecodedSegments> {
    let decode_vertex =
        || decode_segment(header, SegmentKind::Vertex, |s| vertex::decode(buffer, s));
    let decode_texture =
        || decode_segment(header, SegmentKind::Texture, |s| texture::decode(buffer, s));
    let decode_collision =
        || decode_segment(header, SegmentKind::Collision, |s| collision::decode(buffer, s));
    let decode_display_list = || {
        decode_segment(header, SegmentKind::DisplayList, |s| {
            display_list::decode(buffer, s)
        })
    };
    let decode_geo_layout =
        || decode_segment(header, SegmentKind::GeoLayout, |s| geo_layout::decode(buffer, s));

    #[cfg(feature = "rayon")]
    let ((vertex, texture), ((collision, display_list), geo_layout)) = rayon::join(
        || rayon::join(decode_vertex, decode_texture),
        || {
            rayon::join(
                || rayon::join(decode_collision, decode_display_list),
                decode_geo_layout,
            )
        },
    );
    #[cfg(not(feature = "rayon"))]
    let ((vertex, texture), ((collision, display_list), geo_layout)) = (
        (decode_vertex(), decode_texture()),
        ((decode_collision(), decode_display_list()), decode_geo_layout()),
    );

    Ok(DecodedSegments {
        vertex: vertex?,
        texture: texture?,
        collision: collision?,
        display_list: display_list?,
        geo_layout: geo_layout?,
    })
}

/// Decode an already decompressed model file.
#[instrument(skip_all, fields(len = buffer.len()))]
pub fn load_model_bytes(buffer: &[u8], options: &DecodeOptions) -> DecodeResult<Model> {
    options.validate()?;
    let header = parse_header(buffer)?;
    let segments = decode_segments(buffer, &header)?;
    assemble(&header, segments, options)
}

/// Decode a model file from disk. The caller says whether it is still compressed.
pub fn load_model_file<P: AsRef<Path>>(
    path: P,
    compressed: bool,
    options: &DecodeOptions,
) -> DecodeResult<Model> {
    options.validate()?;
    let data = fs::read(path.as_ref())?;
    let buffer = if compressed {
        compression::decompress(&data, &options.limits)?
    } else {
        data
    };
    load_model_bytes(&buffer, options)
}

/// Decode the model behind one ROM asset.
pub fn load_asset(
    rom: &RomImage,
    entry: &RomIndexEntry,
    options: &DecodeOptions,
) -> DecodeResult<Model> {
    let buffer = rom.model_file(entry, &options.limits)?;
    load_model_bytes(&buffer, options)
}

/// The A model of a map and, for larger maps, its B model.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MapModels {
    pub entry: &'static CatalogEntry,
    pub a: Model,
    pub b: Option<Model>,
}

impl MapModels {
    pub fn models(&self) -> impl Iterator<Item = &Model> {
        std::iter::once(&self.a).chain(self.b.as_ref())
    }
}

/// Decode a catalog model by name.
#[instrument(skip(rom, options))]
pub fn load_from_rom(
    rom: &RomImage,
    model_id: &str,
    options: &DecodeOptions,
) -> DecodeResult<MapModels> {
    options.validate()?;
    let location = rom.locate(model_id)?;
    let a = load_asset(rom, &location.a, options)?;
    let b = location
        .b
        .map(|entry| load_asset(rom, &entry, options))
        .transpose()?;
    info!(
        triangles = a.triangles.len() + b.as_ref().map_or(0, |b| b.triangles.len()),
        "loaded map model"
    );
    Ok(MapModels {
        entry: location.entry,
        a,
        b,
    })
}

/// Outcome of one catalog entry in a batch import.
#[derive(Debug)]
pub struct CatalogImport {
    pub entry: &'static CatalogEntry,
    pub result: DecodeResult<MapModels>,
}

/// Decode every catalog model. Failures are reported per entry and do not stop the run.
pub fn import_catalog(rom: &RomImage, options: &DecodeOptions) -> Vec<CatalogImport> {
    let import = |entry: &'static CatalogEntry| CatalogImport {
        entry,
        result: load_from_rom(rom, entry.name, options),
    };

    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        catalog::entries().par_iter().map(import).collect()
    }
    #[cfg(not(feature = "rayon"))]
    {
        catalog::entries().iter().map(import).collect()
    }
}
