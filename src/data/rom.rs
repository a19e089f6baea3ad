//! ROM image access: byte-order normalisation, the asset table, and payload extraction.
//!
//! The asset table describes every asset blob in the ROM. It contains:
//! - An 8-byte header holding the entry count
//! - `count` 8-byte entries (data offset, flags, kind)
//! - The asset data itself, starting right after the entries
//!
//! An asset's length is the distance to the next entry's data offset, so the final
//! entry is only a terminator.

use std::fs::{self, File};
use std::ops::Deref;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use tracing::{debug, warn};

use crate::catalog::{self, CatalogEntry};
use crate::data::compression::{self, DecompressLimits};
use crate::data::parser_utils::{read_u16, read_u32};
use crate::error::{DecodeError, DecodeResult};

const TABLE_HEADER_SIZE: usize = 8;
const TABLE_ENTRY_SIZE: usize = 8;
const ASSET_FLAG_COMPRESSED: u16 = 0x0001;

/// Where the model assets live inside the ROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RomLayout {
    /// Absolute ROM offset of the asset table header.
    pub asset_table_offset: usize,
    /// Asset index of catalog slot 0.
    pub map_model_base: u16,
}

impl Default for RomLayout {
    fn default() -> Self {
        Self {
            asset_table_offset: 0x5E90,
            map_model_base: 0x14A0,
        }
    }
}

/// Byte order of a ROM dump, told apart by the first word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomByteOrder {
    /// `.z64`, native big-endian.
    BigEndian,
    /// `.v64`, 16-bit byte-swapped.
    ByteSwapped,
    /// `.n64`, 32-bit little-endian words.
    LittleEndian,
}

impl RomByteOrder {
    pub fn detect(rom: &[u8]) -> Self {
        match rom.get(..4) {
            Some([0x37, 0x80, 0x40, 0x12]) => RomByteOrder::ByteSwapped,
            Some([0x40, 0x12, 0x37, 0x80]) => RomByteOrder::LittleEndian,
            _ => RomByteOrder::BigEndian,
        }
    }

    /// Rewrite `rom` in place to big-endian order.
    pub fn normalize(self, rom: &mut [u8]) {
        match self {
            RomByteOrder::BigEndian => {}
            RomByteOrder::ByteSwapped => rom.chunks_exact_mut(2).for_each(|c| c.swap(0, 1)),
            RomByteOrder::LittleEndian => rom.chunks_exact_mut(4).for_each(|c| c.reverse()),
        }
    }
}

/// Where one model asset sits in the ROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RomIndexEntry {
    /// Index into the asset table.
    pub model_index: u16,
    /// Absolute byte offset of the payload.
    pub rom_offset: usize,
    /// Payload length as stored (compressed if `compressed`).
    pub compressed_length: usize,
    pub compressed: bool,
}

#[derive(Debug, Clone, Copy)]
struct AssetSlot {
    data_offset: u32,
    flags: u16,
    _kind: u16,
}

/// The parsed asset table.
#[derive(Debug, Clone)]
pub struct AssetTable {
    slots: Vec<AssetSlot>,
    data_base: usize,
}

impl AssetTable {
    pub fn parse(rom: &[u8], table_offset: usize) -> DecodeResult<Self> {
        let count = read_u32(rom, table_offset)? as usize;
        let entries_offset = table_offset + TABLE_HEADER_SIZE;
        let data_base = count
            .checked_mul(TABLE_ENTRY_SIZE)
            .and_then(|size| entries_offset.checked_add(size))
            .filter(|end| *end <= rom.len())
            .ok_or(DecodeError::OutOfBounds {
                offset: entries_offset,
                len: count.saturating_mul(TABLE_ENTRY_SIZE),
                available: rom.len(),
            })?;

        let mut slots = Vec::with_capacity(count);
        for i in 0..count {
            let entry_offset = entries_offset + i * TABLE_ENTRY_SIZE;
            slots.push(AssetSlot {
                data_offset: read_u32(rom, entry_offset)?,
                flags: read_u16(rom, entry_offset + 4)?,
                _kind: read_u16(rom, entry_offset + 6)?,
            });
        }
        debug!(count, data_base, "parsed asset table");

        Ok(Self { slots, data_base })
    }

    /// Number of assets that can be located; the final entry is a terminator.
    pub fn len(&self) -> usize {
        self.slots.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn locate(&self, model_index: u16) -> DecodeResult<RomIndexEntry> {
        let index = model_index as usize;
        let (Some(slot), Some(next)) = (self.slots.get(index), self.slots.get(index + 1)) else {
            return Err(DecodeError::UnknownModelId(format!(
                "asset 0x{model_index:04X} (table has {} assets)",
                self.len()
            )));
        };

        let compressed_length = next.data_offset.checked_sub(slot.data_offset).ok_or_else(|| {
            DecodeError::UnknownModelId(format!(
                "asset 0x{model_index:04X} has a decreasing data offset"
            ))
        })?;

        Ok(RomIndexEntry {
            model_index,
            rom_offset: self.data_base + slot.data_offset as usize,
            compressed_length: compressed_length as usize,
            compressed: slot.flags & ASSET_FLAG_COMPRESSED != 0,
        })
    }
}

/// Borrow `length` bytes at `offset` out of the ROM.
pub fn extract(rom: &[u8], offset: usize, length: usize) -> DecodeResult<&[u8]> {
    offset
        .checked_add(length)
        .filter(|end| *end <= rom.len())
        .map(|end| &rom[offset..end])
        .ok_or(DecodeError::OutOfBounds {
            offset,
            len: length,
            available: rom.len(),
        })
}

#[derive(Debug)]
enum RomBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for RomBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            RomBytes::Mapped(mmap) => mmap,
            RomBytes::Owned(bytes) => bytes,
        }
    }
}

/// Both asset locations of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelLocation {
    pub entry: &'static CatalogEntry,
    pub a: RomIndexEntry,
    pub b: Option<RomIndexEntry>,
}

/// A ROM image with its asset table parsed. Read-only.
#[derive(Debug)]
pub struct RomImage {
    bytes: RomBytes,
    layout: RomLayout,
    table: AssetTable,
}

impl RomImage {
    /// Map a ROM file from disk. Byte-swapped dumps are copied and normalised.
    pub fn open<P: AsRef<Path>>(path: P, layout: RomLayout) -> DecodeResult<Self> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        let bytes = match RomByteOrder::detect(&mmap) {
            RomByteOrder::BigEndian => RomBytes::Mapped(mmap),
            order => {
                debug!(?order, "normalising ROM byte order");
                let mut owned = mmap.to_vec();
                order.normalize(&mut owned);
                RomBytes::Owned(owned)
            }
        };
        Self::with_bytes(bytes, layout)
    }

    pub fn from_bytes(mut rom: Vec<u8>, layout: RomLayout) -> DecodeResult<Self> {
        RomByteOrder::detect(&rom).normalize(&mut rom);
        Self::with_bytes(RomBytes::Owned(rom), layout)
    }

    fn with_bytes(bytes: RomBytes, layout: RomLayout) -> DecodeResult<Self> {
        let table = AssetTable::parse(&bytes, layout.asset_table_offset)?;
        Ok(Self {
            bytes,
            layout,
            table,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn layout(&self) -> &RomLayout {
        &self.layout
    }

    pub fn table(&self) -> &AssetTable {
        &self.table
    }

    /// Locate the asset behind a catalog slot.
    pub fn locate_slot(&self, slot: u8) -> DecodeResult<RomIndexEntry> {
        let index = self
            .layout
            .map_model_base
            .checked_add(slot as u16)
            .ok_or_else(|| DecodeError::UnknownModelId(format!("slot 0x{slot:02X}")))?;
        self.table.locate(index)
    }

    /// Locate the A (and B, when present) assets of a catalog model.
    pub fn locate(&self, model_id: &str) -> DecodeResult<ModelLocation> {
        let entry = catalog::lookup(model_id)?;
        let a = self.locate_slot(entry.a_slot)?;
        let b = entry.b_slot().map(|slot| self.locate_slot(slot)).transpose()?;
        Ok(ModelLocation { entry, a, b })
    }

    /// The stored (possibly compressed) payload of an asset.
    pub fn payload(&self, entry: &RomIndexEntry) -> DecodeResult<&[u8]> {
        extract(&self.bytes, entry.rom_offset, entry.compressed_length)
    }

    /// The decompressed model file of an asset.
    pub fn model_file(
        &self,
        entry: &RomIndexEntry,
        limits: &DecompressLimits,
    ) -> DecodeResult<Vec<u8>> {
        let payload = self.payload(entry)?;
        if !entry.compressed {
            warn!(
                asset = entry.model_index,
                "asset is stored uncompressed, using it as-is"
            );
            return Ok(payload.to_vec());
        }
        Ok(compression::decompress(payload, limits)?)
    }

    /// Write the decompressed model file of an asset to `dir`, returning its path.
    pub fn extract_to_dir<P: AsRef<Path>>(
        &self,
        entry: &RomIndexEntry,
        dir: P,
        limits: &DecompressLimits,
    ) -> DecodeResult<PathBuf> {
        let data = self.model_file(entry, limits)?;
        fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(format!("{:04X}.bin", entry.model_index));
        fs::write(&path, data)?;
        debug!(path = %path.display(), "extracted model file");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A ROM with a three-entry table at 0x10: two assets and a terminator.
    fn tiny_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x10];
        rom.extend_from_slice(&3u32.to_be_bytes());
        rom.extend_from_slice(&[0; 4]);
        for (offset, flags) in [(0u32, 1u16), (4, 0), (10, 0)] {
            rom.extend_from_slice(&offset.to_be_bytes());
            rom.extend_from_slice(&flags.to_be_bytes());
            rom.extend_from_slice(&3u16.to_be_bytes());
        }
        // LZ stream "ABC" followed by a raw 6-byte asset.
        rom.extend_from_slice(&[0x00, b'A', b'B', b'C']);
        rom.extend_from_slice(b"raw!!!");
        rom
    }

    fn layout() -> RomLayout {
        RomLayout {
            asset_table_offset: 0x10,
            map_model_base: 0,
        }
    }

    #[test]
    fn locate_reads_offsets_and_lengths() {
        let rom = tiny_rom();
        let table = AssetTable::parse(&rom, 0x10).unwrap();
        assert_eq!(table.len(), 2);

        let first = table.locate(0).unwrap();
        assert_eq!(
            first,
            RomIndexEntry {
                model_index: 0,
                rom_offset: 0x10 + 8 + 3 * 8,
                compressed_length: 4,
                compressed: true,
            }
        );
        let second = table.locate(1).unwrap();
        assert_eq!(second.compressed_length, 6);
        assert!(!second.compressed);

        assert!(matches!(table.locate(2), Err(DecodeError::UnknownModelId(_))));
    }

    #[test]
    fn extract_checks_bounds() {
        let rom = tiny_rom();
        assert_eq!(extract(&rom, rom.len() - 6, 6).unwrap(), b"raw!!!");
        assert!(matches!(
            extract(&rom, rom.len() - 2, 6),
            Err(DecodeError::OutOfBounds { .. })
        ));
        assert!(matches!(
            extract(&rom, usize::MAX, 2),
            Err(DecodeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn model_files_are_decompressed() {
        let image = RomImage::from_bytes(tiny_rom(), layout()).unwrap();
        let limits = DecompressLimits::default();
        let first = image.locate_slot(0).unwrap();
        assert_eq!(image.model_file(&first, &limits).unwrap(), b"ABC");
        let second = image.locate_slot(1).unwrap();
        assert_eq!(image.model_file(&second, &limits).unwrap(), b"raw!!!");
    }

    #[test]
    fn unknown_catalog_names_fail() {
        let image = RomImage::from_bytes(tiny_rom(), layout()).unwrap();
        assert!(matches!(
            image.locate("Nowhere"),
            Err(DecodeError::UnknownModelId(_))
        ));
    }

    #[test]
    fn byte_orders_normalise() {
        let mut v64 = vec![0x37, 0x80, 0x40, 0x12];
        assert_eq!(RomByteOrder::detect(&v64), RomByteOrder::ByteSwapped);
        RomByteOrder::ByteSwapped.normalize(&mut v64);
        assert_eq!(v64, [0x80, 0x37, 0x12, 0x40]);

        let mut n64 = vec![0x40, 0x12, 0x37, 0x80];
        assert_eq!(RomByteOrder::detect(&n64), RomByteOrder::LittleEndian);
        RomByteOrder::LittleEndian.normalize(&mut n64);
        assert_eq!(n64, [0x80, 0x37, 0x12, 0x40]);
    }

    #[test]
    fn opened_dumps_are_normalised_in_any_byte_order() {
        let mut z64 = tiny_rom();
        z64[..4].copy_from_slice(&[0x80, 0x37, 0x12, 0x40]);
        z64.resize(z64.len().next_multiple_of(4), 0);

        let mut v64 = z64.clone();
        v64.chunks_exact_mut(2).for_each(|c| c.swap(0, 1));
        let mut n64 = z64.clone();
        n64.chunks_exact_mut(4).for_each(|c| c.reverse());

        let dir = tempfile::tempdir().unwrap();
        let limits = DecompressLimits::default();
        for (name, dump) in [("rom.z64", &z64), ("rom.v64", &v64), ("rom.n64", &n64)] {
            let path = dir.path().join(name);
            fs::write(&path, dump).unwrap();

            let image = RomImage::open(&path, layout()).unwrap();
            assert_eq!(image.bytes(), z64.as_slice(), "{name}");
            let first = image.locate_slot(0).unwrap();
            assert_eq!(image.model_file(&first, &limits).unwrap(), b"ABC", "{name}");
            let second = image.locate_slot(1).unwrap();
            assert_eq!(image.model_file(&second, &limits).unwrap(), b"raw!!!", "{name}");
        }
    }

    #[test]
    fn extract_to_dir_writes_the_model() {
        let image = RomImage::from_bytes(tiny_rom(), layout()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let entry = image.locate_slot(0).unwrap();
        let path = image
            .extract_to_dir(&entry, dir.path().join("models"), &DecompressLimits::default())
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "0000.bin");
        assert_eq!(fs::read(&path).unwrap(), b"ABC");
    }
}
