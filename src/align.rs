//! Alignment arithmetic for address ranges.
//!
//! Every range is naturally aligned: its base address is a multiple
//! of its size rounded up to the next power of two.  Simple address
//! decoders can then test membership with a single mask-and-compare
//! instead of a full range comparison.
#[cfg(any(
    all(test, feature = "check_contracts_in_tests"),
    feature = "check_contracts"
))]
use contracts::*;
#[cfg(not(any(
    all(test, feature = "check_contracts_in_tests"),
    feature = "check_contracts"
)))]
use disabled_contracts::*;

use crate::Address;

/// Returns the natural alignment for a range of `size` bytes, i.e.,
/// the smallest power of two greater than or equal to `size`.
///
/// Returns `None` when that power of two does not fit in 64 bits.
/// The alignment of a zero-sized range is undefined; callers must
/// reject those first.
#[requires(size > 0, "zero-sized ranges have no alignment")]
#[ensures(ret.is_some() -> ret.unwrap().is_power_of_two())]
#[ensures(ret.is_some() -> ret.unwrap() >= size)]
#[inline]
pub fn align(size: u64) -> Option<u64> {
    size.checked_next_power_of_two()
}

/// Rounds `value` up to the next multiple of `alignment`, which must
/// be a power of two.  Returns `None` on overflow.
#[requires(alignment.is_power_of_two())]
#[ensures(ret.is_some() -> ret.unwrap() >= value)]
#[ensures(ret.is_some() -> ret.unwrap() % alignment == 0)]
#[inline]
pub fn align_up(value: Address, alignment: u64) -> Option<Address> {
    let mask = alignment - 1;

    value.checked_add(mask).map(|bumped| bumped & !mask)
}

/// Returns whether `address` is a multiple of `alignment` (a power of
/// two).
#[inline]
pub fn is_aligned(address: Address, alignment: u64) -> bool {
    address & (alignment - 1) == 0
}

#[test]
fn test_align() {
    assert_eq!(align(1), Some(1));
    assert_eq!(align(2), Some(2));
    assert_eq!(align(3), Some(4));
    assert_eq!(align(256), Some(256));
    assert_eq!(align(4095), Some(4096));
    assert_eq!(align(4096), Some(4096));
    assert_eq!(align(4097), Some(8192));
    assert_eq!(align(1 << 63), Some(1 << 63));
    assert_eq!(align((1 << 63) + 1), None);
    assert_eq!(align(u64::MAX), None);
}

#[test]
fn test_align_up() {
    assert_eq!(align_up(0, 0x1000), Some(0));
    assert_eq!(align_up(1, 0x1000), Some(0x1000));
    assert_eq!(align_up(0x1000, 0x1000), Some(0x1000));
    assert_eq!(align_up(0x1001, 0x1000), Some(0x2000));
    assert_eq!(align_up(0x1100, 1), Some(0x1100));

    // Rounding up past the top of the address space must not wrap.
    assert_eq!(align_up(u64::MAX - 0xfff, 0x1000), Some(u64::MAX - 0xfff));
    assert_eq!(align_up(u64::MAX - 0xffe, 0x1000), None);
}

#[test]
fn test_is_aligned() {
    assert!(is_aligned(0, 0x1000));
    assert!(is_aligned(0x2000, 0x1000));
    assert!(!is_aligned(0x800, 0x1000));
    assert!(is_aligned(0x800, 0x100));
    assert!(is_aligned(0x1234_5677, 1));
}
