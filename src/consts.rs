//! Shared constants: sentinels, version flags, mstore file format.

// -------- Sentinels --------
pub const NO_VERSION: u32 = u32::MAX;
pub const NO_TAG: u32 = u32::MAX;

// -------- Version flags --------
pub const VF_LINKED: u32 = 0x1;
pub const VF_ATTACHED: u32 = 0x2;
pub const VF_SNAPSHOT: u32 = 0x4;

// -------- Limits --------
// Lifetime cap on record allocations (root + bootstrap + create).
pub const DEF_MAX_VERSIONS: u32 = 900;

// -------- Mstore --------
pub const MSTORE_MAGIC: &[u8; 8] = b"L1MSTORE";
pub const MSTORE_FORMAT_VERSION: u32 = 1;
pub const MSTORE_FILE_PREFIX: &str = "mstore-";
pub const MSTORE_FILE_EXT: &str = "bin";

// Store ids (one logical store per metadata family).
pub const MSTORE_VERSIONS_ID: u32 = 1;

// Header: [MAGIC8][format_version u32][store_id u32][record_size u32]
pub const MSTORE_HDR_SIZE: usize = 20;

// Version-list entry (payload, LE):
// [id u32][parent u32][size u64][tag u32]
// The root serializes parent = 0.
pub const VLIST_ENTRY_SIZE: usize = 20;
pub const VLIST_OFF_ID: usize = 0;
pub const VLIST_OFF_PARENT: usize = 4;
pub const VLIST_OFF_SIZE: usize = 8;
pub const VLIST_OFF_TAG: usize = 16;

// On-disk record = payload + crc32 over the payload.
pub const VLIST_REC_SIZE: usize = VLIST_ENTRY_SIZE + 4;
