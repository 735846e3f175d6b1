//! Allocator contract for heap-owned output
//!
//! Every buffer handed to a caller (raw callstacks, entry names and
//! locations) is allocated through an [`Allocator`] and released through the
//! same instance when the owning value is dropped. Embedders that route all
//! profiler memory through their own allocator plug it in here.

#![allow(unsafe_code)] // raw allocation and owned byte buffers

use std::alloc::Layout;
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// An allocate/free pair
///
/// # Safety
/// `allocate` must return memory valid for `layout` (or `None`), and `free`
/// must accept every pointer previously returned by `allocate` on the same
/// instance, or on a clone of it, with the same layout.
pub unsafe trait Allocator: Clone {
    /// Allocate a block for `layout`; `None` when out of memory
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Release a block obtained from [`Allocator::allocate`]
    ///
    /// # Safety
    /// `ptr` must come from `allocate` on this allocator with this `layout`
    /// and must not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The process's global Rust allocator
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAllocator;

unsafe impl Allocator for SystemAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        NonNull::new(unsafe { std::alloc::alloc(layout) })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        std::alloc::dealloc(ptr.as_ptr(), layout);
    }
}

#[derive(Debug, Default)]
struct Counters {
    live_allocations: AtomicUsize,
    live_bytes: AtomicUsize,
    total_allocations: AtomicUsize,
}

/// System allocator that tracks live allocations
///
/// Clones share the same counters, so a test can hand one clone to a
/// resolver and inspect another.
#[derive(Debug, Clone, Default)]
pub struct CountingAllocator {
    counters: Arc<Counters>,
}

impl CountingAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks allocated and not yet freed
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        self.counters.live_allocations.load(Ordering::Relaxed)
    }

    /// Bytes allocated and not yet freed
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.counters.live_bytes.load(Ordering::Relaxed)
    }

    /// Blocks allocated since creation
    #[must_use]
    pub fn total_allocations(&self) -> usize {
        self.counters.total_allocations.load(Ordering::Relaxed)
    }
}

unsafe impl Allocator for CountingAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = SystemAllocator.allocate(layout)?;
        self.counters.live_allocations.fetch_add(1, Ordering::Relaxed);
        self.counters.live_bytes.fetch_add(layout.size(), Ordering::Relaxed);
        self.counters.total_allocations.fetch_add(1, Ordering::Relaxed);
        Some(ptr)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        self.counters.live_allocations.fetch_sub(1, Ordering::Relaxed);
        self.counters.live_bytes.fetch_sub(layout.size(), Ordering::Relaxed);
        SystemAllocator.free(ptr, layout);
    }
}

/// Owned UTF-8 string stored in allocator memory
///
/// An empty string owns no block. If the allocator runs out of memory the
/// string is empty rather than failing.
pub struct AllocStr<A: Allocator> {
    ptr: NonNull<u8>,
    len: usize,
    alloc: A,
}

// SAFETY: the block is uniquely owned; sharing follows the allocator handle.
unsafe impl<A: Allocator + Send> Send for AllocStr<A> {}
unsafe impl<A: Allocator + Sync> Sync for AllocStr<A> {}

impl<A: Allocator> AllocStr<A> {
    /// Copy `s` into a block from `alloc`
    pub fn new_in(s: &str, alloc: A) -> Self {
        let len = s.len();
        let block = if len == 0 {
            None
        } else {
            Layout::array::<u8>(len).ok().and_then(|layout| alloc.allocate(layout))
        };
        let Some(ptr) = block else {
            return Self { ptr: NonNull::dangling(), len: 0, alloc };
        };
        unsafe { std::ptr::copy_nonoverlapping(s.as_ptr(), ptr.as_ptr(), len) };
        Self { ptr, len, alloc }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        // SAFETY: the block holds `len` bytes copied from a `&str`.
        unsafe {
            std::str::from_utf8_unchecked(std::slice::from_raw_parts(self.ptr.as_ptr(), self.len))
        }
    }

    /// The allocator this string releases its block through
    pub fn allocator(&self) -> &A {
        &self.alloc
    }
}

impl<A: Allocator> Drop for AllocStr<A> {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        // SAFETY: allocated in `new_in` with exactly this layout.
        unsafe {
            self.alloc.free(self.ptr, Layout::from_size_align_unchecked(self.len, 1));
        }
    }
}

impl<A: Allocator> Deref for AllocStr<A> {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl<A: Allocator> fmt::Debug for AllocStr<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<A: Allocator> fmt::Display for AllocStr<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<A: Allocator> PartialEq<str> for AllocStr<A> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<A: Allocator> PartialEq<&str> for AllocStr<A> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_str_round_trips_through_allocator() {
        let alloc = CountingAllocator::new();
        {
            let s = AllocStr::new_in("tokio::runtime::park", alloc.clone());
            assert_eq!(s, "tokio::runtime::park");
            assert_eq!(alloc.live_allocations(), 1);
            assert_eq!(alloc.live_bytes(), "tokio::runtime::park".len());
        }
        assert_eq!(alloc.live_allocations(), 0);
        assert_eq!(alloc.live_bytes(), 0);
        assert_eq!(alloc.total_allocations(), 1);
    }

    #[test]
    fn test_empty_alloc_str_owns_nothing() {
        let alloc = CountingAllocator::new();
        let s = AllocStr::new_in("", alloc.clone());
        assert_eq!(s.as_str(), "");
        assert_eq!(alloc.total_allocations(), 0);
    }

    #[test]
    fn test_system_allocator_rejects_zero_size() {
        assert!(SystemAllocator.allocate(Layout::new::<()>()).is_none());
    }
}
