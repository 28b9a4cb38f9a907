mod align;
mod config;
mod error;
mod free_list;
mod manager;
mod range;

#[cfg(any(
    all(test, feature = "check_contracts_in_tests"),
    feature = "check_contracts"
))]
mod debug_range_map;

use std::ffi::CStr;
use std::os::raw::c_char;

pub use config::AddressSpaceConfig;
pub use config::ForeignAddressSpaceConfig;
pub use config::RangeConfig;
pub use config::DEFAULT_RANGE_SIZE;
pub use error::AddressSpaceError;
pub use error::Result;
pub use free_list::Gaps;
pub use manager::AddressSpaceManager;
pub use range::AddressRange;
pub use range::Base;
pub use range::SlaveRef;
pub use range::Span;
pub use range::AUTO;

/// Addresses are 64-bit on every bus we model.
pub type Address = u64;

/// Passing this as the `base` to `addrspace_add_range` requests an
/// automatically assigned base address.
pub const ADDRSPACE_AUTO: u64 = u64::MAX;

/// Converts a C string to a range name.  NULL or non-UTF-8 names
/// become the empty name, which the manager rejects.
unsafe fn name_from_c(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }

    CStr::from_ptr(ptr)
        .to_str()
        .map(|name| name.to_owned())
        .unwrap_or_default()
}

/// Creates a new address space manager, or returns NULL if the
/// configuration is invalid.  A NULL `config_ptr` selects the
/// defaults.
///
/// # Safety
///
/// This function assumes `config_ptr` is NULL or valid.
#[no_mangle]
pub unsafe extern "C" fn addrspace_create(
    config_ptr: *const ForeignAddressSpaceConfig,
) -> *mut AddressSpaceManager {
    match AddressSpaceConfig::from_c(config_ptr).map(AddressSpaceManager::new) {
        Some(Ok(manager)) => Box::into_raw(Box::new(manager)),
        _ => std::ptr::null_mut(),
    }
}

/// Destroys a manager returned by `addrspace_create`.
///
/// # Safety
///
/// This function assumes `manager` is NULL, or came from
/// `addrspace_create` and hasn't been destroyed yet.
#[no_mangle]
pub unsafe extern "C" fn addrspace_destroy(manager: *mut AddressSpaceManager) {
    if !manager.is_null() {
        drop(Box::from_raw(manager));
    }
}

/// Adds a range called `name` of `size` bytes (0 for the default size)
/// at `base` (`ADDRSPACE_AUTO` to pick one).  On success, returns 0 and
/// writes the base address to `out_base` if it is non-NULL; otherwise
/// returns `AddressSpaceError::code()`.
///
/// # Safety
///
/// This function assumes `manager` is valid, `name` is NULL or a valid
/// C string, and `out_base` is NULL or valid.
#[no_mangle]
pub unsafe extern "C" fn addrspace_add_range(
    manager: *mut AddressSpaceManager,
    name: *const c_char,
    base: u64,
    size: u64,
    out_base: *mut u64,
) -> i32 {
    let manager = manager.as_mut().expect("addrspace manager must be valid");
    let base = if base == ADDRSPACE_AUTO {
        Base::Auto
    } else {
        Base::At(base)
    };
    let size = if size == 0 { None } else { Some(size) };

    match manager.add_range(name_from_c(name), base, size) {
        Ok(range) => {
            if let Some(out) = out_base.as_mut() {
                *out = range.base_address();
            }

            0
        }
        Err(e) => e.code(),
    }
}

/// Removes the range called `name`.  Returns 0 on success, and
/// `AddressSpaceError::code()` otherwise.
///
/// # Safety
///
/// This function assumes `manager` is valid, and `name` is NULL or a
/// valid C string.
#[no_mangle]
pub unsafe extern "C" fn addrspace_remove_range(
    manager: *mut AddressSpaceManager,
    name: *const c_char,
) -> i32 {
    let manager = manager.as_mut().expect("addrspace manager must be valid");

    match manager.remove_range(&name_from_c(name)) {
        Ok(_) => 0,
        Err(e) => e.code(),
    }
}

/// Looks up the range that contains `address`.  Returns true and fills
/// in the non-NULL out parameters if there is one.
///
/// # Safety
///
/// This function assumes `manager` is valid, and the out parameters
/// are NULL or valid.
#[no_mangle]
pub unsafe extern "C" fn addrspace_find_by_address(
    manager: *const AddressSpaceManager,
    address: u64,
    out_base: *mut u64,
    out_size: *mut u64,
) -> bool {
    let manager = manager.as_ref().expect("addrspace manager must be valid");

    match manager.find_by_address(address) {
        Some(range) => {
            if let Some(out) = out_base.as_mut() {
                *out = range.base_address();
            }

            if let Some(out) = out_size.as_mut() {
                *out = range.size();
            }

            true
        }
        None => false,
    }
}

#[test]
fn test_c_round_trip() {
    use std::ffi::CString;

    let manager = unsafe { addrspace_create(std::ptr::null()) };
    assert!(!manager.is_null());

    let uart = CString::new("uart").unwrap();
    let timer = CString::new("timer").unwrap();
    let mut base = 0u64;
    let mut size = 0u64;

    unsafe {
        assert_eq!(
            addrspace_add_range(manager, uart.as_ptr(), ADDRSPACE_AUTO, 0, &mut base),
            0
        );
        assert_eq!(base, 0);

        assert_eq!(
            addrspace_add_range(manager, timer.as_ptr(), ADDRSPACE_AUTO, 0x100, &mut base),
            0
        );
        assert_eq!(base, 0x1000);

        // Same name twice.
        assert_eq!(
            addrspace_add_range(manager, uart.as_ptr(), 0x8000, 0, std::ptr::null_mut()),
            AddressSpaceError::DuplicateName { name: "uart".into() }.code()
        );
        // NULL names are never valid.
        assert_eq!(
            addrspace_add_range(manager, std::ptr::null(), ADDRSPACE_AUTO, 0, &mut base),
            AddressSpaceError::DuplicateName {
                name: String::new()
            }
            .code()
        );

        assert!(addrspace_find_by_address(
            manager,
            0x10ff,
            &mut base,
            &mut size
        ));
        assert_eq!((base, size), (0x1000, 0x100));
        assert!(!addrspace_find_by_address(
            manager,
            0x1100,
            std::ptr::null_mut(),
            std::ptr::null_mut()
        ));

        assert_eq!(addrspace_remove_range(manager, uart.as_ptr()), 0);
        assert_eq!(
            addrspace_remove_range(manager, uart.as_ptr()),
            AddressSpaceError::NotFound { name: "uart".into() }.code()
        );
        assert!(!addrspace_find_by_address(
            manager,
            0,
            std::ptr::null_mut(),
            std::ptr::null_mut()
        ));

        addrspace_destroy(manager);
    }
}

#[test]
fn test_c_invalid_config() {
    // The parent bound runs off the end of the address space.
    let config = ForeignAddressSpaceConfig {
        name: std::ptr::null(),
        default_range_size: 0,
        parent_base: u64::MAX,
        parent_size: 2,
    };

    assert!(unsafe { addrspace_create(&config) }.is_null());
}
