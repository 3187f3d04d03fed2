// Globe Constants
// ===============
//
// This module defines constant values used by the Globe consensus rules.
// Values that governance can adjust at runtime live in `limits` instead.

/// The scale factor used to calculate weight for witness data
///
/// Non-witness (base) data is multiplied by 4 when calculating weight, while
/// witness data is counted directly. The weight functions are fixed to this
/// factor.
pub const WITNESS_SCALE_FACTOR: u64 = 4;

/// Witness scale factor used by the legacy (non-Globe) transaction mode.
pub const WITNESS_SCALE_FACTOR_PART: u64 = 2;

/// Coinbase transaction outputs can only be spent after this number of new blocks
pub const COINBASE_MATURITY: u32 = 100;

/// Maximum serialized size of a transaction without witness data
pub const MAX_TRANSACTION_BASE_SIZE: usize = 1_000_000;

/// Maximum size of the payload of a data output
pub const MAX_DATA_OUTPUT_SIZE: usize = 512;

/// Interpret sequence numbers as relative lock-time constraints.
pub const LOCKTIME_VERIFY_SEQUENCE: u32 = 1 << 0;

/// Minimum size of a witness commitment output script. Defined in BIP-141.
pub const MINIMUM_WITNESS_COMMITMENT: usize = 38;

/// Prefix of a witness commitment output script
///
/// `OP_RETURN`, a 36 byte push, and the 4 byte commitment header
/// `0xaa21a9ed`. The 32 byte commitment hash follows.
pub const WITNESS_COMMITMENT_HEADER: [u8; 6] = [0x6a, 0x24, 0xaa, 0x21, 0xa9, 0xed];

// Script verification flags
//
// Bit positions match the flags the script interpreter consumes. Only the
// flags referenced by script-flag exceptions are listed here.
pub const SCRIPT_VERIFY_NONE: u32 = 0;
pub const SCRIPT_VERIFY_P2SH: u32 = 1 << 0;
pub const SCRIPT_VERIFY_DERSIG: u32 = 1 << 2;
pub const SCRIPT_VERIFY_NULLDUMMY: u32 = 1 << 4;
pub const SCRIPT_VERIFY_CHECKLOCKTIMEVERIFY: u32 = 1 << 9;
pub const SCRIPT_VERIFY_CHECKSEQUENCEVERIFY: u32 = 1 << 10;
pub const SCRIPT_VERIFY_WITNESS: u32 = 1 << 11;
pub const SCRIPT_VERIFY_TAPROOT: u32 = 1 << 17;

/// What block version to use for new blocks (pre versionbits)
pub const VERSIONBITS_TOP_BITS: u32 = 0x2000_0000;

/// What bitmask determines whether versionbits is in use
pub const VERSIONBITS_TOP_MASK: u32 = 0xE000_0000;

/// Total bits available for versionbits
pub const VERSIONBITS_NUM_BITS: u8 = 29;
