//! The `FreeList` tracks which parts of a bounded address space are
//! occupied, and finds the lowest free, aligned slot for new ranges.
//!
//! We only store the occupied spans, sorted by base address, in a
//! `BTreeMap` from base to exclusive end.  The free-list proper is the
//! complement of these spans within the bound; `gaps()` enumerates it
//! lazily.  Nothing here is larger than O(n) in the number of occupied
//! spans.
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

use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::align;
use crate::range::Span;
use crate::Address;

#[derive(Clone, Debug)]
pub struct FreeList {
    bound: Span,
    /// Maps the base of each occupied span to its exclusive end.
    occupied: BTreeMap<Address, Address>,
}

impl FreeList {
    pub fn new(bound: Span) -> Self {
        Self {
            bound,
            occupied: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn bound(&self) -> Span {
        self.bound
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.occupied.len()
    }

    /// Returns the base of an occupied span that overlaps `span`, if
    /// any.
    pub fn first_overlap(&self, span: &Span) -> Option<Address> {
        if span.size == 0 {
            return None;
        }

        // Occupied spans are disjoint, so the last one to start before
        // `span` ends is also the last one to end: if it doesn't reach
        // into `span`, nothing does.
        let (&base, &end) = self.occupied.range(..span.end()).next_back()?;
        if end > span.base {
            Some(base)
        } else {
            None
        }
    }

    /// Returns the occupied span that contains `address`.
    pub fn owner(&self, address: Address) -> Option<Span> {
        let (&base, &end) = self.occupied.range(..=address).next_back()?;

        if address < end {
            Some(Span {
                base,
                size: end - base,
            })
        } else {
            None
        }
    }

    /// Marks `span` as occupied.  The span must be inside the bound,
    /// and must not overlap any occupied span.
    #[requires(span.size > 0)]
    #[requires(self.bound.encloses(&span), "occupied spans stay in bounds")]
    #[requires(self.first_overlap(&span).is_none(), "occupied spans are disjoint")]
    #[ensures(self.len() == old(self.len()) + 1)]
    pub fn reserve(&mut self, span: Span) {
        self.occupied.insert(span.base, span.end());
    }

    /// Frees the occupied span starting at `base`, and returns it.
    #[ensures(ret.is_some() -> self.len() + 1 == old(self.len()))]
    #[ensures(ret.is_none() -> self.len() == old(self.len()))]
    pub fn release(&mut self, base: Address) -> Option<Span> {
        let end = self.occupied.remove(&base)?;

        Some(Span {
            base,
            size: end - base,
        })
    }

    /// Returns the lowest address that is a multiple of `alignment`,
    /// and leaves `size` free bytes before the next occupied span or
    /// the end of the bound.
    ///
    /// This is a plain first-fit scan: start at the bottom of the
    /// bound, and every time the candidate slot hits an occupied span,
    /// bump the candidate past that span.
    #[requires(size > 0)]
    #[requires(alignment.is_power_of_two())]
    #[ensures(ret.is_some() -> ret.unwrap() % alignment == 0)]
    #[ensures(ret.is_some() -> self.bound.encloses(&Span { base: ret.unwrap(), size }))]
    #[ensures(ret.is_some() -> self.first_overlap(&Span { base: ret.unwrap(), size }).is_none())]
    pub fn first_fit(&self, size: u64, alignment: u64) -> Option<Address> {
        let upper = self.bound.end();
        let mut candidate = align::align_up(self.bound.base, alignment)?;

        for (&base, &end) in self.occupied.iter() {
            let candidate_end = candidate.checked_add(size)?;
            if candidate_end > upper {
                return None;
            }

            // Spans entirely below the candidate don't matter.
            if end <= candidate {
                continue;
            }

            // Spans are sorted, so once one starts past the candidate
            // slot, they all do.
            if base >= candidate_end {
                break;
            }

            candidate = align::align_up(end, alignment)?;
        }

        let candidate_end = candidate.checked_add(size)?;
        if candidate_end > upper {
            return None;
        }

        Some(candidate)
    }

    /// Returns the free gaps in the bound, in ascending order.
    pub fn gaps(&self) -> Gaps<'_> {
        Gaps {
            cursor: self.bound.base,
            upper: self.bound.end(),
            occupied: self.occupied.iter(),
        }
    }

    /// Iterates over occupied spans, in ascending order.
    pub fn occupied(&self) -> impl Iterator<Item = Span> + '_ {
        self.occupied.iter().map(|(&base, &end)| Span {
            base,
            size: end - base,
        })
    }
}

/// Lazily enumerates the complement of the occupied spans.
#[derive(Clone, Debug)]
pub struct Gaps<'a> {
    cursor: Address,
    upper: Address,
    occupied: btree_map::Iter<'a, Address, Address>,
}

impl<'a> Iterator for Gaps<'a> {
    type Item = Span;

    fn next(&mut self) -> Option<Span> {
        for (&base, &end) in self.occupied.by_ref() {
            let gap_base = self.cursor;

            self.cursor = end;
            if base > gap_base {
                return Some(Span {
                    base: gap_base,
                    size: base - gap_base,
                });
            }
        }

        if self.cursor < self.upper {
            let gap = Span {
                base: self.cursor,
                size: self.upper - self.cursor,
            };

            self.cursor = self.upper;
            return Some(gap);
        }

        None
    }
}

#[cfg(test)]
mod test {
    use proptest::collection::vec;
    use proptest::prelude::*;

    use super::*;

    fn span(base: Address, size: u64) -> Span {
        Span::new(base, size).expect("span should fit")
    }

    #[test]
    fn first_fit_empty() {
        let free = FreeList::new(span(0, 0x10000));

        assert_eq!(free.first_fit(0x1000, 0x1000), Some(0));
        assert_eq!(free.first_fit(0x10000, 0x10000), Some(0));
        assert_eq!(free.first_fit(0x10001, 0x20000), None);
    }

    #[test]
    fn first_fit_skips_occupied() {
        let mut free = FreeList::new(span(0, 0x10000));

        free.reserve(span(0, 0x1000));
        free.reserve(span(0x2000, 0x100));

        // [0x1000, 0x2000) is the first hole large enough.
        assert_eq!(free.first_fit(0x1000, 0x1000), Some(0x1000));
        // Smaller ranges land in the same hole.
        assert_eq!(free.first_fit(0x100, 0x100), Some(0x1000));
        // A 0x2000 range must be aligned to 0x2000, and 0x2000 is taken.
        assert_eq!(free.first_fit(0x2000, 0x2000), Some(0x4000));
    }

    #[test]
    fn first_fit_respects_bound() {
        let mut free = FreeList::new(span(0x1800, 0x2800));

        // The bound starts misaligned for 0x1000-byte ranges.
        assert_eq!(free.first_fit(0x1000, 0x1000), Some(0x2000));
        free.reserve(span(0x2000, 0x1000));
        assert_eq!(free.first_fit(0x1000, 0x1000), Some(0x3000));
        free.reserve(span(0x3000, 0x1000));

        assert_eq!(free.first_fit(0x1000, 0x1000), None);
        assert_eq!(free.first_fit(0x800, 0x800), Some(0x1800));
    }

    #[test]
    fn first_fit_near_top_of_address_space() {
        let free = FreeList::new(span(0, u64::MAX));

        // The last aligned 2^63 block would end at 2^64, which we
        // can't represent.
        assert_eq!(free.first_fit(1 << 63, 1 << 63), Some(0));

        let mut free = FreeList::new(span(0, u64::MAX));
        free.reserve(span(0, 1 << 63));
        assert_eq!(free.first_fit(1 << 63, 1 << 63), None);
        assert_eq!(free.first_fit(1 << 62, 1 << 62), Some(1 << 63));
    }

    #[test]
    fn overlap_and_owner() {
        let mut free = FreeList::new(span(0, 0x10000));

        free.reserve(span(0x1000, 0x1000));
        free.reserve(span(0x4000, 0x100));

        assert_eq!(free.first_overlap(&span(0x1000, 0x100)), Some(0x1000));
        assert_eq!(free.first_overlap(&span(0, 0x1001)), Some(0x1000));
        assert_eq!(free.first_overlap(&span(0x1fff, 0x2800)), Some(0x4000));
        assert_eq!(free.first_overlap(&span(0, 0x1000)), None);
        assert_eq!(free.first_overlap(&span(0x2000, 0x2000)), None);

        assert_eq!(free.owner(0x1800), Some(span(0x1000, 0x1000)));
        assert_eq!(free.owner(0x40ff), Some(span(0x4000, 0x100)));
        assert_eq!(free.owner(0x4100), None);
        assert_eq!(free.owner(0xfff), None);
    }

    #[test]
    fn release_frees_slot() {
        let mut free = FreeList::new(span(0, 0x10000));

        free.reserve(span(0, 0x1000));
        free.reserve(span(0x1000, 0x1000));
        assert_eq!(free.first_fit(0x1000, 0x1000), Some(0x2000));

        assert_eq!(free.release(0), Some(span(0, 0x1000)));
        assert_eq!(free.release(0), None);
        assert_eq!(free.first_fit(0x1000, 0x1000), Some(0));
    }

    #[test]
    fn gaps_tile_the_bound() {
        let mut free = FreeList::new(span(0x100, 0xf00));

        assert_eq!(free.gaps().collect::<Vec<_>>(), vec![span(0x100, 0xf00)]);

        free.reserve(span(0x100, 0x100));
        free.reserve(span(0x400, 0x100));
        free.reserve(span(0xf00, 0x100));

        assert_eq!(
            free.gaps().collect::<Vec<_>>(),
            vec![span(0x200, 0x200), span(0x500, 0xa00)]
        );
    }

    /// Brute-force reference for `first_fit`: try every aligned slot,
    /// lowest first.
    fn reference_first_fit(free: &FreeList, size: u64, alignment: u64) -> Option<Address> {
        let bound = free.bound();
        let mut candidate = align::align_up(bound.base, alignment)?;

        loop {
            let slot = Span::new(candidate, size)?;
            if !bound.encloses(&slot) {
                return None;
            }

            if free.occupied().all(|taken| !taken.overlaps(&slot)) {
                return Some(candidate);
            }

            candidate = candidate.checked_add(alignment)?;
        }
    }

    proptest! {
        // Reserve a random set of aligned spans, and compare the
        // scan against trying each aligned slot in turn.
        #[test]
        fn first_fit_matches_reference(
            requests in vec((0..8u32, 0..64u64), 0..20),
            query in 0..8u32,
        ) {
            let mut free = FreeList::new(span(0, 1 << 16));

            for (shift, slot) in requests.iter().cloned() {
                let size = 1u64 << (shift + 4);
                let slot = Span::new(slot * size, size).unwrap();

                if free.bound().encloses(&slot) && free.first_overlap(&slot).is_none() {
                    free.reserve(slot);
                }
            }

            let size = 1u64 << (query + 4);
            prop_assert_eq!(free.first_fit(size, size), reference_first_fit(&free, size, size));

            // The gaps and occupied spans exactly tile the bound.
            let mut tiles: Vec<Span> = free.gaps().chain(free.occupied()).collect();
            tiles.sort();
            let mut cursor = 0;
            for tile in tiles {
                prop_assert_eq!(tile.base, cursor);
                cursor = tile.end();
            }
            prop_assert_eq!(cursor, 1 << 16);
        }
    }
}
