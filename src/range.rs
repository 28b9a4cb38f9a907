//! Address ranges handed out by an `AddressSpaceManager`.
use std::fmt;

use crate::align;
use crate::Address;

/// A half-open span of addresses, `[base, base + size)`.
///
/// We track the exclusive end of each span, so a span may not include
/// the last byte of the 64-bit address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub base: Address,
    pub size: u64,
}

impl Span {
    /// Returns a span for `[base, base + size)`, or `None` if the end
    /// address does not fit in 64 bits.
    pub fn new(base: Address, size: u64) -> Option<Span> {
        base.checked_add(size)?;
        Some(Span { base, size })
    }

    /// Returns the first address past the span.
    #[inline]
    pub fn end(&self) -> Address {
        self.base + self.size
    }

    #[inline]
    pub fn contains(&self, address: Address) -> bool {
        address >= self.base && address < self.end()
    }

    /// Returns whether the two spans share at least one address.
    #[inline]
    pub fn overlaps(&self, other: &Span) -> bool {
        self.base < other.end() && other.base < self.end()
    }

    /// Returns whether `other` lies entirely inside `self`.
    #[inline]
    pub fn encloses(&self, other: &Span) -> bool {
        other.base >= self.base && other.end() <= self.end()
    }
}

/// How a caller picks the base address of a new range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Base {
    /// Let the manager pick the lowest free, naturally aligned address.
    Auto,
    /// Use exactly this address.
    At(Address),
}

/// Sentinel for "pick the base address for me".
pub const AUTO: Base = Base::Auto;

impl From<Address> for Base {
    fn from(address: Address) -> Self {
        Base::At(address)
    }
}

impl From<Option<Address>> for Base {
    fn from(address: Option<Address>) -> Self {
        address.map_or(Base::Auto, Base::At)
    }
}

/// Identifies the slave device behind a range.  The topology builder
/// resolves these; the manager stores them without looking inside.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlaveRef {
    /// A handle to an already instantiated slave.
    Resolved(u64),
    /// A path to a slave that has not been resolved yet.
    Unresolved(String),
}

/// A named, naturally aligned range of addresses owned by a manager.
///
/// Ranges are immutable: to move or resize one, remove it and add it
/// again.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AddressRange {
    name: String,
    span: Span,
    is_sub: bool,
    target: Option<SlaveRef>,
}

impl AddressRange {
    /// Only the manager builds ranges, after checking alignment and
    /// overlap.
    pub(crate) fn new(name: String, span: Span, is_sub: bool, target: Option<SlaveRef>) -> Self {
        debug_assert!(span.size > 0);
        Self {
            name,
            span,
            is_sub,
            target,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_address(&self) -> Address {
        self.span.base
    }

    pub fn size(&self) -> u64 {
        self.span.size
    }

    /// Whether this range holds a nested sub-region rather than a
    /// slave in the top-level map.
    pub fn is_sub(&self) -> bool {
        self.is_sub
    }

    pub fn target(&self) -> Option<&SlaveRef> {
        self.target.as_ref()
    }

    pub fn span(&self) -> Span {
        self.span
    }

    /// Returns the first address past the range.
    pub fn end(&self) -> Address {
        self.span.end()
    }

    pub fn contains(&self, address: Address) -> bool {
        self.span.contains(address)
    }

    pub fn overlaps(&self, span: &Span) -> bool {
        self.span.overlaps(span)
    }

    /// Returns the natural alignment of the range.
    pub fn alignment(&self) -> u64 {
        // The manager never builds ranges whose size can't be aligned.
        align::align(self.span.size).unwrap_or(1 << 63)
    }

    /// Returns the mask a mask-and-compare decoder uses for this
    /// range: `address & mask == base_address` holds for every
    /// address in the aligned block that contains the range.
    pub fn decode_mask(&self) -> Address {
        !(self.alignment() - 1)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:#x}..{:#x})", self.name, self.base_address(), self.end())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn range(name: &str, base: Address, size: u64) -> AddressRange {
        AddressRange::new(
            name.into(),
            Span::new(base, size).expect("span should fit"),
            false,
            None,
        )
    }

    #[test]
    fn span_end_overflow() {
        assert!(Span::new(u64::MAX - 0x1000, 0x1000).is_some());
        assert!(Span::new(u64::MAX - 0xfff, 0x1000).is_none());
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(0, 0x1000).unwrap();
        let b = Span::new(0x1000, 0x1000).unwrap();
        let c = Span::new(0x1800, 0x100).unwrap();

        // Adjacent spans don't overlap.
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));

        assert!(b.overlaps(&c));
        assert!(c.overlaps(&b));
        assert!(b.encloses(&c));
        assert!(!c.encloses(&b));
    }

    #[test]
    fn range_accessors() {
        let r = range("uart", 0x2000, 0x100);

        assert_eq!(r.name(), "uart");
        assert_eq!(r.base_address(), 0x2000);
        assert_eq!(r.size(), 0x100);
        assert_eq!(r.end(), 0x2100);
        assert!(!r.is_sub());
        assert_eq!(r.target(), None);

        assert!(r.contains(0x2000));
        assert!(r.contains(0x20ff));
        assert!(!r.contains(0x2100));
        assert!(!r.contains(0x1fff));

        assert_eq!(r.to_string(), "uart [0x2000..0x2100)");
    }

    #[test]
    fn decode_mask_matches_aligned_block() {
        // 0x300 bytes round up to a 0x400-byte decoded block.
        let r = range("gpio", 0x400, 0x300);

        assert_eq!(r.alignment(), 0x400);
        assert_eq!(r.decode_mask(), !0x3ffu64);
        for address in (0x400..0x800).step_by(0x40) {
            assert_eq!(address & r.decode_mask(), r.base_address());
        }

        assert_ne!(0x800 & r.decode_mask(), r.base_address());
        assert_ne!(0x3ff & r.decode_mask(), r.base_address());
    }

    #[test]
    fn base_conversions() {
        assert_eq!(Base::from(0x1000u64), Base::At(0x1000));
        assert_eq!(Base::from(None::<Address>), AUTO);
        assert_eq!(Base::from(Some(0x40u64)), Base::At(0x40));
    }
}
