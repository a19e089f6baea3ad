/// Static catalog of map models and their ROM slots
pub mod catalog;
/// Container-level plumbing: reads, decompression, and ROM access
pub mod data;
/// Error definitions
pub mod error;
/// High-level decode entry points and options
pub mod handler;
/// The model-file format: header, segments, and assembly
pub mod models;
/// Generic wrapper for values that may or may not match a known variant.
pub mod recognized;

pub use error::{DecodeError, DecodeResult};
pub use handler::{
    CatalogImport, DecodeOptions, MapModels, import_catalog, load_from_rom, load_model_bytes,
    load_model_file,
};
pub use models::model::{DanglingPolicy, Model};
