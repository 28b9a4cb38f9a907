//! Configuration for address space managers and the ranges they hand
//! out.  Managers are configured entirely through these structs; there
//! is no environment or file-based configuration.
use std::ffi::CStr;
use std::os::raw::c_char;

use crate::range::Base;
use crate::range::SlaveRef;
use crate::range::Span;
use crate::Address;

/// Ranges added without an explicit size get this many bytes, which
/// matches the usual 4 KB slave window on AMBA peripheral buses.
pub const DEFAULT_RANGE_SIZE: u64 = 4096;

static_assertions::const_assert!(DEFAULT_RANGE_SIZE > 0);
static_assertions::const_assert!(DEFAULT_RANGE_SIZE.is_power_of_two());

/// An unbounded manager covers everything but the last byte of the
/// 64-bit address space (we track exclusive ends).
pub const UNBOUNDED: Span = Span {
    base: 0,
    size: u64::MAX,
};

/// When created, a manager is configured with a default range size,
/// an optional parent bound, and an optional name for logging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressSpaceConfig {
    pub name: Option<String>,
    pub default_range_size: u64,
    /// Ranges must lie inside `[parent.base, parent.base + parent.size)`.
    /// `None` means the whole address space.
    pub parent: Option<Span>,
}

impl Default for AddressSpaceConfig {
    fn default() -> Self {
        Self {
            name: None,
            default_range_size: DEFAULT_RANGE_SIZE,
            parent: None,
        }
    }
}

impl AddressSpaceConfig {
    /// Returns the default configuration, bounded to `size` bytes at
    /// `base`.
    pub fn bounded(base: Address, size: u64) -> Self {
        Self {
            parent: Some(Span { base, size }),
            ..Default::default()
        }
    }
}

/// The extern "C" interface uses this version of
/// `AddressSpaceConfig`.  Zero sizes select the defaults.
#[repr(C)]
pub struct ForeignAddressSpaceConfig {
    pub name: *const c_char,
    pub default_range_size: u64,
    pub parent_base: u64,
    pub parent_size: u64,
}

impl AddressSpaceConfig {
    /// Attempts to convert a `ForeignAddressSpaceConfig` pointer to a
    /// native `AddressSpaceConfig`.  A NULL pointer yields the default
    /// configuration.
    ///
    /// # Safety
    ///
    /// This function assumes `config_ptr` is NULL or valid, and that
    /// its `name` is NULL or a valid NUL-terminated string.
    pub unsafe fn from_c(config_ptr: *const ForeignAddressSpaceConfig) -> Option<Self> {
        if config_ptr.is_null() {
            return Some(Self::default());
        }

        let config: &ForeignAddressSpaceConfig = &*config_ptr;
        let name = if config.name.is_null() {
            None
        } else {
            Some(CStr::from_ptr(config.name).to_str().ok()?.to_owned())
        };

        Some(Self {
            name,
            default_range_size: match config.default_range_size {
                0 => DEFAULT_RANGE_SIZE,
                size => size,
            },
            parent: match config.parent_size {
                0 => None,
                size => Some(Span {
                    base: config.parent_base,
                    size,
                }),
            },
        })
    }
}

/// Describes one range to add to a manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeConfig {
    pub name: String,
    pub base: Base,
    /// `None` means the manager's default range size.
    pub size: Option<u64>,
    pub is_sub: bool,
    pub target: Option<SlaveRef>,
}

impl RangeConfig {
    /// Returns the configuration for a plain (not sub) range with no
    /// target.
    pub fn new(name: impl Into<String>, base: impl Into<Base>, size: Option<u64>) -> Self {
        Self {
            name: name.into(),
            base: base.into(),
            size,
            is_sub: false,
            target: None,
        }
    }
}

#[cfg(test)]
mod test {
    use std::ffi::CString;

    use super::*;
    use crate::range::AUTO;

    #[test]
    fn null_foreign_config_is_default() {
        let config = unsafe { AddressSpaceConfig::from_c(std::ptr::null()) };

        assert_eq!(config, Some(AddressSpaceConfig::default()));
    }

    #[test]
    fn foreign_config_fields() {
        let name = CString::new("apb0").unwrap();
        let foreign = ForeignAddressSpaceConfig {
            name: name.as_ptr(),
            default_range_size: 0x100,
            parent_base: 0x4000_0000,
            parent_size: 0x1_0000,
        };

        let config = unsafe { AddressSpaceConfig::from_c(&foreign) }.expect("should convert");
        assert_eq!(config.name.as_deref(), Some("apb0"));
        assert_eq!(config.default_range_size, 0x100);
        assert_eq!(
            config.parent,
            Some(Span {
                base: 0x4000_0000,
                size: 0x1_0000
            })
        );
    }

    #[test]
    fn foreign_config_zeroes_select_defaults() {
        let foreign = ForeignAddressSpaceConfig {
            name: std::ptr::null(),
            default_range_size: 0,
            parent_base: 0x1000,
            parent_size: 0,
        };

        let config = unsafe { AddressSpaceConfig::from_c(&foreign) }.expect("should convert");
        assert_eq!(config, AddressSpaceConfig::default());
    }

    #[test]
    fn range_config_new() {
        let config = RangeConfig::new("timer", AUTO, Some(0x100));

        assert_eq!(config.name, "timer");
        assert_eq!(config.base, AUTO);
        assert_eq!(config.size, Some(0x100));
        assert!(!config.is_sub);
        assert_eq!(config.target, None);

        assert_eq!(RangeConfig::new("x", 0x2000u64, None).base, Base::At(0x2000));
    }
}
