//! Allocation Size
//!
//! Maps a requested byte count to storage pool allocation units (KiB).

use crate::error::{Error, Result};

/// Size of one allocation unit in bytes
pub const ALLOCATION_UNIT_BYTES: u64 = 1024;

/// Smallest allocation, in units
pub const MIN_ALLOCATION_UNITS: u64 = 4;

/// Allocation size in KiB for `requested_bytes`, bounded by `limit_bytes`
///
/// Rounds up to whole units and to at least [`MIN_ALLOCATION_UNITS`]. A zero
/// limit means no limit; otherwise the rounded size must still fit in it.
pub fn allocation_size_kib(requested_bytes: u64, limit_bytes: u64) -> Result<u64> {
    let units = requested_bytes
        .div_ceil(ALLOCATION_UNIT_BYTES)
        .max(MIN_ALLOCATION_UNITS);
    let allocated_bytes = units.saturating_mul(ALLOCATION_UNIT_BYTES);

    if limit_bytes != 0 && allocated_bytes > limit_bytes {
        return Err(Error::CapacityLimit {
            requested_bytes,
            allocated_bytes,
            limit_bytes,
        });
    }

    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_allocation_size_kib() {
        let cases = [(1024, 0, 4), (4096, 4096, 4), (4097, 0, 5), (0, 0, 4)];
        for (requested, limit, expected) in cases {
            assert_eq!(
                allocation_size_kib(requested, limit).unwrap(),
                expected,
                "requested {} limit {}",
                requested,
                limit
            );
        }
    }

    #[test]
    fn test_limit_respected() {
        // Rounding to whole KiB would exceed the limit
        assert_matches!(
            allocation_size_kib(4097, 40),
            Err(Error::CapacityLimit {
                allocated_bytes: 5120,
                ..
            })
        );
        assert_matches!(allocation_size_kib(4097, 4096), Err(Error::CapacityLimit { .. }));
        assert_matches!(allocation_size_kib(1, 4095), Err(Error::CapacityLimit { .. }));
    }

    #[test]
    fn test_smallest_covering_size() {
        for requested in (0..20_000u64).step_by(97) {
            let units = allocation_size_kib(requested, 0).unwrap();
            assert!(units >= MIN_ALLOCATION_UNITS);
            assert!(units * ALLOCATION_UNIT_BYTES >= requested);
            if units > MIN_ALLOCATION_UNITS {
                assert!((units - 1) * ALLOCATION_UNIT_BYTES < requested);
            }

            let limit = units * ALLOCATION_UNIT_BYTES;
            assert_eq!(allocation_size_kib(requested, limit).unwrap(), units);
            assert!(allocation_size_kib(requested, limit - 1).is_err());
        }
    }
}
