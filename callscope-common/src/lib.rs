//! # Shared Constants and Layouts (Capture ↔ Decoding)
//!
//! Defines the limits, sentinel strings and raw buffer layout shared between
//! the code that captures call stacks and the code that decodes them later,
//! possibly in another process. Nothing here allocates, so an external
//! decoder can depend on this crate without pulling in the resolver.
//!
//! ## Key Items
//!
//! - [`MAX_CALLSTACK_ENTRIES`] - Upper bound of entries produced for one address
//! - [`UNKNOWN`], [`KERNEL`], [`ERROR`] - Sentinel names used instead of real data
//! - [`is_kernel_address`] - Kernel-space marker test
//! - [`raw_frames`] - Decodes the `[count, addr, addr, ...]` slot layout

#![no_std]

// ============================================================================
// Resolution Limits
// ============================================================================

/// Maximum number of entries a single address can resolve into
///
/// One entry for the containing function plus inline frames. Resolution stops
/// silently once this many entries exist, even if the debug info has more.
pub const MAX_CALLSTACK_ENTRIES: usize = 16;

/// Capacity in bytes of the fast resolver's name buffer
pub const FAST_NAME_CAPACITY: usize = 1024;

/// Capacity in bytes of the demangling buffer used by the full resolver
pub const DEMANGLE_CAPACITY: usize = 64 * 1024;

/// Capacity in bytes of a module display name, brackets included
pub const MODULE_NAME_CAPACITY: usize = 1024;

// ============================================================================
// Sentinel Values
// ============================================================================

/// Placeholder for a name, file or module that could not be discovered
pub const UNKNOWN: &str = "[unknown]";

/// Name and location of every kernel-space address
pub const KERNEL: &str = "[kernel]";

/// Name and location of the single entry returned after a resolution error
pub const ERROR: &str = "[error]";

// ============================================================================
// Address Classes
// ============================================================================

/// High bit marking an address as kernel-space
///
/// Windows kernel addresses and Linux kernel addresses (`0xffff...`) both
/// carry it on 64-bit targets; user-space addresses never do.
pub const KERNEL_ADDRESS_BIT: u64 = 1 << 63;

/// Returns true if `addr` carries the kernel-space marker
#[inline]
#[must_use]
pub const fn is_kernel_address(addr: u64) -> bool {
    addr & KERNEL_ADDRESS_BIT != 0
}

// ============================================================================
// Raw Callstack Layout
// ============================================================================

/// Slot holding the number of captured frames
pub const FRAME_COUNT_SLOT: usize = 0;

/// Number of address-sized slots needed to capture `max_depth` frames
///
/// `None` when the count slot no longer fits in `usize`.
#[inline]
#[must_use]
pub const fn raw_slot_count(max_depth: usize) -> Option<usize> {
    max_depth.checked_add(1)
}

/// Decodes a raw callstack buffer into its captured addresses
///
/// The count slot is clamped to the buffer length, so a corrupted count can
/// never read past the end.
#[must_use]
pub fn raw_frames(slots: &[usize]) -> &[usize] {
    match slots.split_first() {
        Some((&count, rest)) => &rest[..count.min(rest.len())],
        None => &[],
    }
}
