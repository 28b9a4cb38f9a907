use thiserror::Error;

use crate::Address;

pub type Result<T> = std::result::Result<T, AddressSpaceError>;

/// Every way an address space operation can fail.
///
/// All failures are local validation errors: retrying the same call
/// against the same manager fails the same way.  The manager's state
/// is unchanged whenever one of these is returned.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AddressSpaceError {
    /// The requested size is zero, or too large to align.
    #[error("invalid range size {size:#x}")]
    InvalidSize { size: u64 },

    /// The name is empty, or already names a range in this manager.
    #[error("range name {name:?} is empty or already in use")]
    DuplicateName { name: String },

    #[error("base address {base:#x} is not aligned to {alignment:#x}")]
    MisalignedAddress { base: Address, alignment: u64 },

    #[error("range {name:?} [{base:#x}..+{size:#x}) overlaps existing range {existing:?}")]
    Overlap {
        name: String,
        base: Address,
        size: u64,
        existing: String,
    },

    /// No free gap can hold an AUTO range of this size and alignment.
    #[error("no free space for {size:#x} bytes aligned to {alignment:#x}")]
    OutOfSpace { size: u64, alignment: u64 },

    #[error("no range named {name:?}")]
    NotFound { name: String },

    /// An explicit range falls outside the manager's bound, or past
    /// the last representable address.
    #[error("range [{base:#x}..+{size:#x}) is out of bounds")]
    OutOfBounds { base: Address, size: u64 },
}

impl AddressSpaceError {
    /// Returns the status code reported through the C interface.
    /// Codes are negative and distinct per error kind; `0` means
    /// success.
    pub fn code(&self) -> i32 {
        match self {
            AddressSpaceError::InvalidSize { .. } => -1,
            AddressSpaceError::DuplicateName { .. } => -2,
            AddressSpaceError::MisalignedAddress { .. } => -3,
            AddressSpaceError::Overlap { .. } => -4,
            AddressSpaceError::OutOfSpace { .. } => -5,
            AddressSpaceError::NotFound { .. } => -6,
            AddressSpaceError::OutOfBounds { .. } => -7,
        }
    }
}

#[test]
fn test_messages() {
    let err = AddressSpaceError::MisalignedAddress {
        base: 0x800,
        alignment: 0x1000,
    };
    assert_eq!(
        err.to_string(),
        "base address 0x800 is not aligned to 0x1000"
    );

    let err = AddressSpaceError::Overlap {
        name: "D".into(),
        base: 0x1000,
        size: 0x100,
        existing: "B".into(),
    };
    assert_eq!(
        err.to_string(),
        "range \"D\" [0x1000..+0x100) overlaps existing range \"B\""
    );
}

#[test]
fn test_codes_are_distinct() {
    use std::collections::HashSet;

    let errors = vec![
        AddressSpaceError::InvalidSize { size: 0 },
        AddressSpaceError::DuplicateName { name: "a".into() },
        AddressSpaceError::MisalignedAddress {
            base: 1,
            alignment: 2,
        },
        AddressSpaceError::Overlap {
            name: "a".into(),
            base: 0,
            size: 1,
            existing: "b".into(),
        },
        AddressSpaceError::OutOfSpace {
            size: 1,
            alignment: 1,
        },
        AddressSpaceError::NotFound { name: "a".into() },
        AddressSpaceError::OutOfBounds { base: 0, size: 1 },
    ];

    let codes: HashSet<i32> = errors.iter().map(|e| e.code()).collect();
    assert_eq!(codes.len(), errors.len());
    assert!(codes.iter().all(|&code| code < 0));
}
