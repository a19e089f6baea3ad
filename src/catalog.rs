//! Static catalog of the game's map models.
//!
//! Every playable level, lair room, and cutscene map has an "A" model and, for the
//! larger maps, a "B" model holding the second half of the geometry. Slots index the
//! map-model region of the ROM asset table (see [`crate::data::rom::RomLayout`]).
//! The few "B" files with no named "A" counterpart are listed on their own.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::{DecodeError, DecodeResult};

/// Slot value marking a map without a "B" model.
pub const NO_B_MODEL: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CatalogEntry {
    pub name: &'static str,
    pub a_slot: u8,
    b_slot: u8,
}

impl CatalogEntry {
    pub fn b_slot(&self) -> Option<u8> {
        (self.b_slot != NO_B_MODEL).then_some(self.b_slot)
    }

    /// Slots in load order: A first, then B when present.
    pub fn slots(&self) -> impl Iterator<Item = u8> {
        std::iter::once(self.a_slot).chain(self.b_slot())
    }
}

const fn entry(name: &'static str, a_slot: u8, b_slot: u8) -> CatalogEntry {
    CatalogEntry {
        name,
        a_slot,
        b_slot,
    }
}

static ENTRIES: &[CatalogEntry] = &[
    entry("Unknown 01", 0x00, NO_B_MODEL),
    entry("TTC - Treasure Trove Cove", 0x01, 0x02),
    entry("TTC - Crab Shell", 0x03, 0x04),
    entry("TTC - Pirate Ship", 0x05, 0x06),
    entry("TTC - Sand Castle", 0x07, 0x08),
    entry("TTC - Sharkfood Island", 0x09, NO_B_MODEL),
    entry("GV - Gobi's Valley", 0x0A, 0x0B),
    entry("GV - Match Game", 0x0C, NO_B_MODEL),
    entry("Unknown 02", 0x0D, NO_B_MODEL),
    entry("GV - Maze", 0x0E, 0x0F),
    entry("GV - Water Pyramid", 0x10, 0x11),
    entry("GV - Rupee's House", 0x12, NO_B_MODEL),
    entry("GV - Inside the Sphinx", 0x13, NO_B_MODEL),
    entry("GV - Blue Egg Chamber", 0x14, NO_B_MODEL),
    entry("MMM - Mad Monster Mansion", 0x15, 0x16),
    entry("MMM - Drainpipe", 0x17, 0x2D),
    entry("MMM - Cellar", 0x18, 0x31),
    entry("MMM - Secret Church Room", 0x19, 0x1A),
    entry("MMM - Dining Room", 0x1B, 0x30),
    entry("MMM - Church", 0x1C, 0x1D),
    entry("MMM - Tumbler's Shed", 0x1E, NO_B_MODEL),
    entry("MMM - Egg Room", 0x1F, 0x20),
    entry("MMM - Note Room", 0x21, 0x22),
    entry("MMM - Feather Room", 0x23, 0x24),
    entry("MMM - Bathroom", 0x25, 0x26),
    entry("MMM - Bedroom", 0x27, 0x28),
    entry("MMM - Gold Feather Room", 0x29, 0x2A),
    entry("MMM - Well", 0x2B, 0x2C),
    entry("MMM - Septic Tank", 0x2E, 0x2F),
    entry("??? Dark Room", 0x32, NO_B_MODEL),
    entry("CS - Intro", 0x33, 0x37),
    entry("CS - Ncube", 0x34, 0x36),
    entry("CS - Grunty's Final Words", 0x35, 0x39),
    entry("CS - Banjo's House", 0x38, 0x3A),
    entry("CS - With Falling twords Ground", 0x3C, NO_B_MODEL),
    entry("Unknown 03", 0x3D, NO_B_MODEL),
    entry("CS - Floor 5 B", 0x3E, NO_B_MODEL),
    entry("CS - Beach Ending", 0x3F, 0x3B),
    entry("MM - Mumbo's Mountain", 0x40, 0x41),
    entry("MM - Termite Hill", 0x42, 0x43),
    entry("Mumbo's Skull", 0x44, NO_B_MODEL),
    entry("Unknown 04", 0x45, NO_B_MODEL),
    entry("RBB - Rusty Bucket Bay", 0x46, 0x47),
    entry("RBB - Machine Room", 0x48, 0x49),
    entry("RBB - Big Fish Warehouse", 0x4A, 0x4B),
    entry("RBB - Boat Room", 0x4C, 0x4D),
    entry("RBB - Container 1", 0x4E, NO_B_MODEL),
    entry("RBB - Container 2", 0x4F, NO_B_MODEL),
    entry("RBB - Container 3", 0x50, NO_B_MODEL),
    entry("RBB - Captain's Cabin", 0x51, 0x52),
    entry("RBB - Sea Grublin's Cabin", 0x53, NO_B_MODEL),
    entry("RBB - Boss Boom Box Room", 0x54, 0x55),
    entry("RBB - Boss Boom Box Room (2)", 0x56, 0x57),
    entry("RBB - Navigation Room", 0x58, 0x5F),
    entry("RBB - Boom Box Room (Pipe)", 0x59, 0x5A),
    entry("RBB - Kitchen", 0x5B, 0x5C),
    entry("RBB - Anchor Room", 0x5D, 0x5E),
    entry("FP - Freezeezy Peak", 0x60, 0x61),
    entry("FP - Igloo", 0x62, 0x66),
    entry("FP - Christmas Tree", 0x63, NO_B_MODEL),
    entry("FP - Wozza's Cave", 0x64, 0x65),
    entry("SM - Spiral Mountain", 0x67, 0x68),
    entry("BGS - Bubblegloop Swamp", 0x69, 0x6A),
    entry("BGS - Mr. Vile", 0x6B, NO_B_MODEL),
    entry("BGS - Tiptup Quior", 0x6C, 0x6D),
    entry("?? - Test Map", 0x6E, 0x6F),
    entry("CCW - Click Clock Woods", 0x70, 0x7B),
    entry("CCW - Spring", 0x71, 0x7C),
    entry("CCW - Summer", 0x72, 0x7D),
    entry("CCW - Autumn", 0x73, 0x7E),
    entry("CCW - Winter", 0x74, 0x7F),
    entry("CCW - Wasp Hive", 0x75, NO_B_MODEL),
    entry("CCW - Nabnut's House", 0x76, NO_B_MODEL),
    entry("CCW - Whiplash Room", 0x77, NO_B_MODEL),
    entry("CCW - Nabnut's Attic 1", 0x78, NO_B_MODEL),
    entry("CCW - Nabnut's Attic 2", 0x79, 0x7A),
    entry("GL - Quiz Room", 0x80, NO_B_MODEL),
    entry("Unknown 05", 0x81, NO_B_MODEL),
    entry("Unknown 06", 0x82, NO_B_MODEL),
    entry("Unknown 07", 0x83, NO_B_MODEL),
    entry("Unknown 08", 0x84, NO_B_MODEL),
    entry("CC - Clanker's Cavern", 0x85, 0x86),
    entry("CC - Inside Clanker Witch Switch", 0x87, NO_B_MODEL),
    entry("CC - Inside Clanker", 0x88, 0x89),
    entry("CC - Inside Clanker Gold Feathers", 0x8A, NO_B_MODEL),
    entry("GL - Floor 1", 0x8B, 0xA3),
    entry("GL - Floor 2", 0x8C, 0xA4),
    entry("GL - Floor 3", 0x8D, 0xAA),
    entry("GL - Floor 3 - Pipe Room", 0x8E, 0xA5),
    entry("GL - Floor 3 - TTC Entrance", 0x8F, NO_B_MODEL),
    entry("GL - Floor 5", 0x90, NO_B_MODEL),
    entry("GL - Floor 6", 0x91, 0x92),
    entry("GL - Floor 3 - CC Entrance", 0x93, 0x9F),
    entry("GL - Boss", 0x94, 0xAD),
    entry("GL - Lava Room", 0x95, NO_B_MODEL),
    entry("GL - Floor 6 - MMM Entrance", 0x96, NO_B_MODEL),
    entry("GL - Floor 6 - Coffin Room", 0x97, NO_B_MODEL),
    entry("GL - Floor 4", 0x98, 0xA6),
    entry("GL - Floor 4 - BGS Entrance", 0x99, NO_B_MODEL),
    entry("GL - Floor 7", 0x9A, 0xA0),
    entry("GL - Floor 7 - RBB Entrance", 0x9B, 0xA1),
    entry("GL - Floor 7 - MMM Puzzle", 0x9C, 0xA2),
    entry("GL - Floor 9", 0x9D, 0xAB),
    entry("GL - Floor 8 - Path to Quiz", 0x9E, 0xAC),
    entry("GL - First Cutscene Inside", 0xA7, NO_B_MODEL),
    entry("GL - Floor 4 - TTC Entrance B", 0xA8, NO_B_MODEL),
    entry("GL - Floor 3 - BGS Entrance B", 0xA9, NO_B_MODEL),
];

static BY_NAME: LazyLock<HashMap<&'static str, &'static CatalogEntry>> =
    LazyLock::new(|| ENTRIES.iter().map(|entry| (entry.name, entry)).collect());

/// All known map models, in catalog order.
pub fn entries() -> &'static [CatalogEntry] {
    ENTRIES
}

/// Look up a map model by its catalog name.
pub fn lookup(name: &str) -> DecodeResult<&'static CatalogEntry> {
    BY_NAME
        .get(name)
        .copied()
        .ok_or_else(|| DecodeError::UnknownModelId(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_model_file_slot_is_listed_once() {
        let names: HashSet<_> = ENTRIES.iter().map(|e| e.name).collect();
        assert_eq!(names.len(), ENTRIES.len());

        let mut slots = HashSet::new();
        for entry in ENTRIES {
            for slot in entry.slots() {
                assert_ne!(slot, NO_B_MODEL);
                assert!(slots.insert(slot), "slot 0x{slot:02X} used twice");
            }
        }
        assert_eq!(slots, (0x00..=0xAD).collect());
    }

    #[test]
    fn known_pairs() {
        for (name, a, b) in [
            ("TTC - Treasure Trove Cove", 0x01, Some(0x02)),
            ("MM - Mumbo's Mountain", 0x40, Some(0x41)),
            ("SM - Spiral Mountain", 0x67, Some(0x68)),
            ("CC - Clanker's Cavern", 0x85, Some(0x86)),
            ("CS - Beach Ending", 0x3F, Some(0x3B)),
            ("GV - Rupee's House", 0x12, None),
            ("CS - Floor 5 B", 0x3E, None),
        ] {
            let entry = lookup(name).unwrap();
            assert_eq!((entry.a_slot, entry.b_slot()), (a, b), "{name}");
        }
    }

    #[test]
    fn lookup_by_name() {
        let rupee = lookup("GV - Rupee's House").unwrap();
        assert_eq!(rupee.slots().collect::<Vec<_>>(), vec![0x12]);

        assert!(matches!(
            lookup("Nowhere"),
            Err(DecodeError::UnknownModelId(name)) if name == "Nowhere"
        ));
    }
}
