/// Decompression of stored model assets
pub mod compression;
/// Offset-addressed big-endian reads
pub mod parser_utils;
/// ROM image access and the asset table
pub mod rom;
