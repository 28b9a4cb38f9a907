//! An `AddressSpaceManager` owns the named ranges of one address map
//! (typically one bus segment): it hands out naturally aligned base
//! addresses, rejects overlapping or misaligned requests, and maps
//! addresses back to the range that owns them.
//!
//! Each manager is an independent, single-owner object.  Nested
//! address maps are modelled as a stack of managers, one per level:
//! `nested()` builds the child manager for a range of its parent.
//!
//! Every operation either succeeds with a fully valid result, or
//! fails without changing the manager.
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

use std::collections::HashSet;

#[cfg(any(
    all(test, feature = "check_contracts_in_tests"),
    feature = "check_contracts"
))]
use crate::debug_range_map;

use crate::align;
use crate::config::AddressSpaceConfig;
use crate::config::RangeConfig;
use crate::config::UNBOUNDED;
use crate::error::AddressSpaceError;
use crate::error::Result;
use crate::free_list::FreeList;
use crate::free_list::Gaps;
use crate::range::AddressRange;
use crate::range::Base;
use crate::range::Span;
use crate::Address;

#[derive(Clone, Debug)]
pub struct AddressSpaceManager {
    name: Option<String>,
    default_range_size: u64,
    /// Ranges in insertion order.
    ranges: Vec<AddressRange>,
    /// Occupancy of `ranges`, sorted by address.
    free: FreeList,
}

impl Default for AddressSpaceManager {
    /// Returns an empty, unbounded manager with the default range size.
    fn default() -> Self {
        Self {
            name: None,
            default_range_size: crate::config::DEFAULT_RANGE_SIZE,
            ranges: Vec::new(),
            free: FreeList::new(UNBOUNDED),
        }
    }
}

impl AddressSpaceManager {
    /// Returns an empty manager for `config`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSize` if the default range size or the parent
    /// size is zero (or the default size can't be aligned), and
    /// `OutOfBounds` if the parent bound runs past the end of the
    /// address space.
    pub fn new(config: AddressSpaceConfig) -> Result<Self> {
        let default_range_size = config.default_range_size;
        if default_range_size == 0 || align::align(default_range_size).is_none() {
            return Err(AddressSpaceError::InvalidSize {
                size: default_range_size,
            });
        }

        let bound = match config.parent {
            None => UNBOUNDED,
            Some(parent) if parent.size == 0 => {
                return Err(AddressSpaceError::InvalidSize { size: 0 })
            }
            Some(parent) => {
                Span::new(parent.base, parent.size).ok_or(AddressSpaceError::OutOfBounds {
                    base: parent.base,
                    size: parent.size,
                })?
            }
        };

        Ok(Self {
            name: config.name,
            default_range_size,
            ranges: Vec::new(),
            free: FreeList::new(bound),
        })
    }

    /// Returns a manager bounded to `[base, base + size)`, with the
    /// default range size.
    pub fn bounded(base: Address, size: u64) -> Result<Self> {
        Self::new(AddressSpaceConfig::bounded(base, size))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn default_range_size(&self) -> u64 {
        self.default_range_size
    }

    /// Returns the span all ranges must fit in.
    pub fn bound(&self) -> Span {
        self.free.bound()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.find_by_name(name).is_some()
    }

    /// Adds a range called `name` of `size` bytes (or the default
    /// range size), at `base`, or at the lowest free aligned address
    /// if `base` is `AUTO`.
    ///
    /// On success, returns a copy of the new range.
    ///
    /// # Errors
    ///
    /// - `DuplicateName` if `name` is empty or already in use,
    /// - `InvalidSize` if the size is zero,
    /// - `MisalignedAddress` if an explicit `base` isn't a multiple of
    ///   the size rounded up to a power of two,
    /// - `OutOfBounds` if an explicit range doesn't fit in the bound,
    /// - `Overlap` if an explicit range intersects an existing one,
    /// - `OutOfSpace` if no free slot can hold an `AUTO` range.
    pub fn add_range(
        &mut self,
        name: impl Into<String>,
        base: impl Into<Base>,
        size: Option<u64>,
    ) -> Result<AddressRange> {
        self.insert(RangeConfig::new(name, base, size))
    }

    /// Same as `add_range`, but tags the new range as holding a nested
    /// sub-region.
    pub fn add_sub_range(
        &mut self,
        name: impl Into<String>,
        base: impl Into<Base>,
        size: Option<u64>,
    ) -> Result<AddressRange> {
        self.insert(RangeConfig {
            is_sub: true,
            ..RangeConfig::new(name, base, size)
        })
    }

    /// Adds the range described by `config`.  See `add_range`.
    #[ensures(ret.is_ok() -> self.len() == old(self.len()) + 1,
              "On success, we add exactly one range.")]
    #[ensures(ret.is_err() -> self.len() == old(self.len()),
              "Failures leave the manager unchanged.")]
    #[ensures(ret.is_ok() -> self.find_by_name(ret.as_ref().unwrap().name()) == ret.as_ref().ok(),
              "On success, the new range can be found by name.")]
    #[ensures(ret.is_ok() ->
              self.find_by_address(ret.as_ref().unwrap().base_address()) == ret.as_ref().ok(),
              "On success, the new range owns its base address.")]
    #[ensures(debug_range_map::check_ranges(&self.ranges, self.bound()).is_ok(),
              "Ranges are always unique, aligned, in bounds, and disjoint.")]
    pub fn insert(&mut self, config: RangeConfig) -> Result<AddressRange> {
        let RangeConfig {
            name,
            base,
            size,
            is_sub,
            target,
        } = config;

        let span = self.place(&name, base, size).map_err(|e| {
            log::trace!("{}: rejected range {:?}: {}", self.display_name(), name, e);
            e
        })?;

        self.free.reserve(span);
        let range = AddressRange::new(name, span, is_sub, target);

        log::debug!(
            "{}: added {}{}{}",
            self.display_name(),
            range,
            if base == Base::Auto { " (auto)" } else { "" },
            if is_sub { " (sub)" } else { "" },
        );

        self.ranges.push(range.clone());
        Ok(range)
    }

    /// Validates a request for range `name`, and returns the span it
    /// should occupy.  Does not mutate anything.
    fn place(&self, name: &str, base: Base, size: Option<u64>) -> Result<Span> {
        if name.is_empty() || self.contains_name(name) {
            return Err(AddressSpaceError::DuplicateName { name: name.into() });
        }

        let size = size.unwrap_or(self.default_range_size);
        if size == 0 {
            return Err(AddressSpaceError::InvalidSize { size });
        }

        let alignment = align::align(size).ok_or(AddressSpaceError::InvalidSize { size })?;

        match base {
            Base::Auto => {
                let base = self
                    .free
                    .first_fit(size, alignment)
                    .ok_or(AddressSpaceError::OutOfSpace { size, alignment })?;

                Ok(Span { base, size })
            }
            Base::At(base) => {
                if !align::is_aligned(base, alignment) {
                    return Err(AddressSpaceError::MisalignedAddress { base, alignment });
                }

                let span = Span::new(base, size)
                    .filter(|span| self.bound().encloses(span))
                    .ok_or(AddressSpaceError::OutOfBounds { base, size })?;

                if let Some(existing) = self.free.first_overlap(&span) {
                    return Err(AddressSpaceError::Overlap {
                        name: name.into(),
                        base,
                        size,
                        existing: self
                            .range_at(existing)
                            .map(|range| range.name().to_owned())
                            .unwrap_or_default(),
                    });
                }

                Ok(span)
            }
        }
    }

    /// Removes the range called `name`, freeing its span for later
    /// `AUTO` allocations, and returns it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such range.
    #[ensures(ret.is_ok() -> self.len() + 1 == old(self.len()),
              "On success, we remove exactly one range.")]
    #[ensures(ret.is_err() -> self.len() == old(self.len()),
              "Failures leave the manager unchanged.")]
    #[ensures(self.find_by_name(name).is_none())]
    #[ensures(ret.is_ok() -> self.find_by_address(ret.as_ref().unwrap().base_address()).is_none(),
              "The removed span is free again.")]
    pub fn remove_range(&mut self, name: &str) -> Result<AddressRange> {
        let index = match self.ranges.iter().position(|range| range.name() == name) {
            Some(index) => index,
            None => {
                log::trace!("{}: no range {:?} to remove", self.display_name(), name);
                return Err(AddressSpaceError::NotFound { name: name.into() });
            }
        };

        let range = self.ranges.remove(index);
        let released = self.free.release(range.base_address());
        assert_eq!(
            released,
            Some(range.span()),
            "occupancy out of sync with ranges"
        );

        log::debug!("{}: removed {}", self.display_name(), range);
        Ok(range)
    }

    /// Returns the range called `name`, if any.
    pub fn find_by_name(&self, name: &str) -> Option<&AddressRange> {
        self.ranges.iter().find(|range| range.name() == name)
    }

    /// Returns the range that contains `address`, if any.
    #[ensures(debug_range_map::check_lookup(&self.ranges, address, ret).is_ok())]
    pub fn find_by_address(&self, address: Address) -> Option<&AddressRange> {
        let owner = self.free.owner(address)?;

        self.range_at(owner.base)
    }

    /// Iterates over all ranges in insertion order.  Call again to
    /// restart.
    pub fn list_ranges(&self) -> std::slice::Iter<'_, AddressRange> {
        self.ranges.iter()
    }

    /// Iterates over the free gaps inside the bound, in ascending
    /// address order.
    pub fn free_ranges(&self) -> Gaps<'_> {
        self.free.gaps()
    }

    /// Returns an empty manager for the nested address map inside the
    /// range called `name`.  The child is independent of `self`: it
    /// only inherits the range's span as its bound, and our default
    /// range size.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no such range.
    pub fn nested(&self, name: &str) -> Result<AddressSpaceManager> {
        let range = self
            .find_by_name(name)
            .ok_or_else(|| AddressSpaceError::NotFound { name: name.into() })?;

        let child_name = match &self.name {
            Some(parent) => format!("{}.{}", parent, range.name()),
            None => range.name().to_owned(),
        };

        AddressSpaceManager::new(AddressSpaceConfig {
            name: Some(child_name),
            default_range_size: self.default_range_size,
            parent: Some(range.span()),
        })
    }

    /// Asserts against internal invariants.
    pub fn check_rep(&self) {
        assert_eq!(self.ranges.len(), self.free.len(), "self: {:?}", self);

        let mut names = HashSet::new();
        for range in &self.ranges {
            assert!(!range.name().is_empty(), "self: {:?}", self);
            assert!(names.insert(range.name()), "duplicate {:?}", range.name());

            assert!(range.size() > 0, "range: {:?}", range);
            assert!(
                align::is_aligned(range.base_address(), range.alignment()),
                "range: {:?}",
                range
            );
            assert!(self.bound().encloses(&range.span()), "range: {:?}", range);
            assert_eq!(
                self.free.owner(range.base_address()),
                Some(range.span()),
                "range: {:?}",
                range
            );
        }

        // The occupancy list is sorted, so adjacent pairs are enough
        // to check that everything is disjoint.
        let occupied: Vec<Span> = self.free.occupied().collect();
        for pair in occupied.windows(2) {
            assert!(pair[0].end() <= pair[1].base, "self: {:?}", self);
        }
    }

    /// Returns the range that starts at `base`.
    fn range_at(&self, base: Address) -> Option<&AddressRange> {
        self.ranges.iter().find(|range| range.base_address() == base)
    }

    fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("addrspace")
    }
}
