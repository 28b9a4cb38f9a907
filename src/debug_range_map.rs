//! Brute-force checks over a manager's ranges, for contracts in debug
//! builds.  These scans never consult the manager's `FreeList`.
use std::collections::HashSet;

use crate::range::AddressRange;
use crate::range::Span;
use crate::Address;

/// Returns Ok if `ranges` have unique non-empty names, are naturally
/// aligned, lie inside `bound`, and are pairwise disjoint.
pub fn check_ranges(ranges: &[AddressRange], bound: Span) -> Result<(), &'static str> {
    let mut names = HashSet::new();

    for range in ranges {
        if range.name().is_empty() {
            return Err("Range with empty name");
        }

        if !names.insert(range.name()) {
            return Err("Duplicate range name");
        }

        if range.size() == 0 {
            return Err("Zero-sized range");
        }

        if range.base_address() % range.alignment() != 0 {
            return Err("Range is misaligned");
        }

        if !bound.encloses(&range.span()) {
            return Err("Range is out of bounds");
        }
    }

    for (i, a) in ranges.iter().enumerate() {
        for b in &ranges[i + 1..] {
            if a.overlaps(&b.span()) {
                return Err("Overlapping ranges");
            }
        }
    }

    Ok(())
}

/// Returns Ok if `found` is the one range in `ranges` that contains
/// `address`, or `None` if no range does.
pub fn check_lookup(
    ranges: &[AddressRange],
    address: Address,
    found: Option<&AddressRange>,
) -> Result<(), &'static str> {
    let expected = ranges.iter().find(|range| range.contains(address));

    if expected != found {
        return Err("Address lookup disagrees with linear scan");
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn range(name: &str, base: Address, size: u64) -> AddressRange {
        AddressRange::new(name.into(), Span { base, size }, false, None)
    }

    const BOUND: Span = Span {
        base: 0,
        size: 0x10000,
    };

    #[test]
    fn accepts_valid_ranges() {
        let ranges = vec![range("a", 0, 0x1000), range("b", 0x1000, 0x1000)];

        assert_eq!(check_ranges(&ranges, BOUND), Ok(()));
    }

    #[test]
    fn rejects_bad_ranges() {
        let dup = vec![range("a", 0, 0x1000), range("a", 0x1000, 0x1000)];
        assert!(check_ranges(&dup, BOUND).is_err());

        let overlap = vec![range("a", 0, 0x2000), range("b", 0x1000, 0x1000)];
        assert!(check_ranges(&overlap, BOUND).is_err());

        let misaligned = vec![range("a", 0x800, 0x1000)];
        assert!(check_ranges(&misaligned, BOUND).is_err());

        let outside = vec![range("a", 0x10000, 0x1000)];
        assert!(check_ranges(&outside, BOUND).is_err());
    }

    #[test]
    fn lookup() {
        let ranges = vec![range("a", 0, 0x1000), range("b", 0x2000, 0x100)];

        assert!(check_lookup(&ranges, 0x2010, Some(&ranges[1])).is_ok());
        assert!(check_lookup(&ranges, 0x1800, None).is_ok());
        assert!(check_lookup(&ranges, 0x1800, Some(&ranges[0])).is_err());
    }
}
