//! Difficulty target conversion and comparison.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::DifficultyError;
use crate::hash::Hash256;

/// Compact bits of the "difficulty 1" target.
pub const DIFFICULTY_ONE_BITS: u32 = 0x1d00ffff;

/// Largest valid compact encoding.
pub const MAX_COMPACT_BITS: u32 = 0x207fffff;

/// A 256-bit proof-of-work target, stored big-endian.
///
/// A header hash satisfies the target when, read as a big-endian 256-bit
/// integer, it is less than or equal to the target.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target([u8; 32]);

impl Target {
    /// All bits set: every hash satisfies it.
    pub const MAX: Target = Target([0xff; 32]);

    /// Zero: only the all-zero hash satisfies it.
    pub const ZERO: Target = Target([0x00; 32]);

    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Target(bytes)
    }

    pub fn to_be_bytes(self) -> [u8; 32] {
        self.0
    }

    /// Expand compact "bits".
    pub fn from_compact(bits: u32) -> Result<Self, DifficultyError> {
        if bits & 0x0080_0000 != 0 {
            return Err(DifficultyError::NegativeCompact(bits));
        }
        let exponent = bits >> 24;
        let mantissa = bits & 0x007f_ffff;
        if exponent > 32 && mantissa != 0 {
            return Err(DifficultyError::CompactOverflow(bits));
        }
        Ok(Target(bits_to_target(bits)))
    }

    /// Parse 64 hex digits, most significant first.
    pub fn from_hex(s: &str) -> Result<Self, DifficultyError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes).map_err(|_| DifficultyError::InvalidHex)?;
        Ok(Target(bytes))
    }

    /// Compact encoding. Lossy: only the top three significant bytes survive.
    pub fn to_compact(&self) -> u32 {
        target_to_bits(&self.0)
    }

    /// The largest target at or below `self` that compact bits can express.
    ///
    /// `Target::from_compact(t.to_compact())` equals `t.to_representable()`.
    pub fn to_representable(&self) -> Target {
        Target(bits_to_target(self.to_compact()))
    }

    /// Whether `hash` (read big-endian) is at or below this target.
    #[inline]
    pub fn is_met_by(&self, hash: &Hash256) -> bool {
        hash_meets_target(hash, &self.0)
    }

    /// Difficulty relative to [`DIFFICULTY_ONE_BITS`].
    pub fn difficulty(&self) -> f64 {
        let current = target_to_f64(&self.0);
        if current == 0.0 {
            return f64::INFINITY;
        }
        target_to_f64(&bits_to_target(DIFFICULTY_ONE_BITS)) / current
    }
}

impl Ord for Target {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_be(&self.0, &other.0)
    }
}

impl PartialOrd for Target {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({})", self)
    }
}

impl FromStr for Target {
    type Err = DifficultyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::from_hex(s)
    }
}

/// Convert compact "bits" representation to a 256-bit target.
///
/// The bits format is: [exponent (1 byte)][mantissa (3 bytes)]
/// Target = mantissa * 256^(exponent - 3)
///
/// The result is a 32-byte big-endian representation of the target.
/// Negative or overflowing encodings yield zero; use
/// [`Target::from_compact`] to have them reported.
pub fn bits_to_target(bits: u32) -> [u8; 32] {
    let exponent = ((bits >> 24) & 0xFF) as usize;
    let mantissa = bits & 0x007FFFFF;

    let mut target = [0u8; 32];

    if bits & 0x00800000 != 0 || exponent == 0 {
        return target;
    }

    if exponent <= 3 {
        // Mantissa fits in fewer bytes than specified
        let value = mantissa >> (8 * (3 - exponent));
        target[29] = ((value >> 16) & 0xFF) as u8;
        target[30] = ((value >> 8) & 0xFF) as u8;
        target[31] = (value & 0xFF) as u8;
        return target;
    }

    if exponent > 32 {
        return target;
    }

    // Mantissa's most significant byte lands at position (32 - exponent)
    let pos = 32 - exponent;
    target[pos] = ((mantissa >> 16) & 0xFF) as u8;
    if pos + 1 < 32 {
        target[pos + 1] = ((mantissa >> 8) & 0xFF) as u8;
    }
    if pos + 2 < 32 {
        target[pos + 2] = (mantissa & 0xFF) as u8;
    }

    target
}

/// Convert a 256-bit target back to compact "bits" representation.
///
/// This is the inverse of `bits_to_target` up to mantissa truncation, which
/// always rounds down. Targets above `0x7fffff << 232` clamp to `0x207fffff`.
pub fn target_to_bits(target: &[u8; 32]) -> u32 {
    let first_nonzero = match target.iter().position(|b| *b != 0) {
        Some(index) => index,
        None => return 0,
    };

    // Number of significant bytes
    let exponent = (32 - first_nonzero) as u32;

    let mut mantissa: u32 = 0;
    for offset in 0..3 {
        mantissa <<= 8;
        if let Some(byte) = target.get(first_nonzero + offset) {
            mantissa |= *byte as u32;
        }
    }

    // If the high bit of mantissa is set, shift right to avoid the sign flag
    let (exponent, mantissa) = if mantissa & 0x00800000 != 0 {
        (exponent + 1, mantissa >> 8)
    } else {
        (exponent, mantissa)
    };

    if exponent > 32 {
        return MAX_COMPACT_BITS;
    }

    (exponent << 24) | (mantissa & 0x007FFFFF)
}

/// Check if a hash meets the difficulty target.
///
/// Both are 32-byte big-endian numbers; returns true if hash <= target.
#[inline]
pub fn hash_meets_target(hash: &Hash256, target: &[u8; 32]) -> bool {
    compare_be(hash, target) != Ordering::Greater
}

/// Numeric comparison of two big-endian 256-bit integers.
fn compare_be(a: &[u8; 32], b: &[u8; 32]) -> Ordering {
    for i in 0..32 {
        match a[i].cmp(&b[i]) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Convert a 256-bit target to an approximate f64 value.
fn target_to_f64(target: &[u8; 32]) -> f64 {
    target
        .iter()
        .fold(0.0f64, |acc, byte| acc * 256.0 + *byte as f64)
}

/// Format difficulty for display (e.g., "1.23T" for trillion).
pub fn format_difficulty(difficulty: f64) -> String {
    if difficulty >= 1e15 {
        format!("{:.2}P", difficulty / 1e15)
    } else if difficulty >= 1e12 {
        format!("{:.2}T", difficulty / 1e12)
    } else if difficulty >= 1e9 {
        format!("{:.2}G", difficulty / 1e9)
    } else if difficulty >= 1e6 {
        format!("{:.2}M", difficulty / 1e6)
    } else if difficulty >= 1e3 {
        format!("{:.2}K", difficulty / 1e3)
    } else {
        format!("{:.2}", difficulty)
    }
}

/// Estimate average hashes needed to satisfy `target`.
pub fn expected_hashes(target: &Target) -> f64 {
    let value = target_to_f64(&target.0);
    // 2^256 / (target + 1)
    2f64.powi(256) / (value + 1.0)
}
