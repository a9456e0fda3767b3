//! Unit conversion at the backend boundary.
//!
//! The engine works in bytes. GPFS and Lustre both take block limits in KiB.
//! Conversion rounds up so a non-zero byte limit never becomes a zero
//! (unlimited) KiB limit.

/// Bytes per KiB.
pub const KIB: u64 = 1024;

/// Bytes to KiB, rounding up.
#[must_use]
pub fn bytes_to_kib(bytes: u64) -> u64 {
    bytes.div_ceil(KIB)
}

/// KiB to bytes, saturating.
#[must_use]
pub fn kib_to_bytes(kib: u64) -> u64 {
    kib.saturating_mul(KIB)
}

/// Soft and hard byte limits as backend KiB limits.
///
/// Rounding is monotone, so `soft <= hard` in bytes implies the same in KiB.
#[must_use]
pub fn block_limits_kib(soft: u64, hard: u64) -> (u64, u64) {
    (bytes_to_kib(soft), bytes_to_kib(hard))
}
