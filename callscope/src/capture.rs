//! Stack capture
//!
//! Walks the current thread's frames into a freshly allocated buffer of raw
//! return addresses. Nothing is symbolized here: capture sits on the hot path
//! and resolution happens later, possibly much later and in another process.
//!
//! The buffer layout is `[count, addr_0, addr_1, ...]` with `max_depth + 1`
//! slots (see [`callscope_common::raw_frames`]). The innermost frames belong
//! to the frame walker and to [`capture_stack_in`] itself.

#![allow(unsafe_code)] // raw slot buffer owned through the allocator contract

use std::alloc::Layout;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

use callscope_common::{raw_frames, raw_slot_count, FRAME_COUNT_SLOT};

use crate::alloc::{Allocator, SystemAllocator};

/// Raw addresses captured from one thread, owned through an allocator
pub struct RawCallstack<A: Allocator = SystemAllocator> {
    slots: Option<NonNull<usize>>,
    slot_count: usize,
    alloc: A,
}

// SAFETY: the slot buffer is uniquely owned plain data.
unsafe impl<A: Allocator + Send> Send for RawCallstack<A> {}
unsafe impl<A: Allocator + Sync> Sync for RawCallstack<A> {}

impl<A: Allocator> RawCallstack<A> {
    /// Allocate room for `max_depth` frames, every slot zeroed
    ///
    /// A depth whose layout does not fit, or an allocation failure, yields a
    /// buffer-less callstack with no frames.
    fn allocate(max_depth: usize, alloc: A) -> Self {
        let Some((block, slot_count)) = raw_slot_count(max_depth).and_then(|slot_count| {
            let layout = Layout::array::<usize>(slot_count).ok()?;
            Some((alloc.allocate(layout)?, slot_count))
        }) else {
            return Self { slots: None, slot_count: 0, alloc };
        };
        let slots = block.cast::<usize>();
        // SAFETY: freshly allocated for `slot_count` slots.
        unsafe { slots.as_ptr().write_bytes(0, slot_count) };
        Self { slots: Some(slots), slot_count, alloc }
    }

    fn slots_mut(&mut self) -> Option<&mut [usize]> {
        let slots = self.slots?;
        // SAFETY: the block holds `slot_count` zero-initialized slots and we
        // hold `&mut self`.
        Some(unsafe { std::slice::from_raw_parts_mut(slots.as_ptr(), self.slot_count) })
    }

    /// All slots, count slot first
    #[must_use]
    pub fn as_slots(&self) -> &[usize] {
        match self.slots {
            // SAFETY: the block holds `slot_count` slots, all zeroed on
            // allocation.
            Some(slots) => unsafe {
                std::slice::from_raw_parts(slots.as_ptr(), 1 + self.len())
            },
            None => &[],
        }
    }

    /// Captured addresses, innermost first
    #[must_use]
    pub fn frames(&self) -> &[usize] {
        raw_frames(self.as_slots())
    }

    /// Number of captured frames
    #[must_use]
    pub fn len(&self) -> usize {
        match self.slots {
            // SAFETY: the count slot is always initialized.
            Some(slots) => unsafe { *slots.as_ptr().add(FRAME_COUNT_SLOT) }
                .min(self.slot_count.saturating_sub(1)),
            None => 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames this buffer was allocated for
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.slot_count.saturating_sub(1)
    }

    /// Captured addresses widened to `u64`, the resolver's address type
    pub fn addresses(&self) -> impl Iterator<Item = u64> + '_ {
        self.frames().iter().map(|&ip| ip as u64)
    }

    /// Release ownership of the slot buffer to a transport layer
    ///
    /// Returns the buffer (if any), its slot count and the allocator it must
    /// be freed through. Use [`RawCallstack::from_raw`] to take it back.
    pub fn into_raw(self) -> (Option<NonNull<usize>>, usize, A) {
        let this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the allocator is moved out once.
        let alloc = unsafe { std::ptr::read(&this.alloc) };
        (this.slots, this.slot_count, alloc)
    }

    /// Rebuild a callstack from the parts returned by [`RawCallstack::into_raw`]
    ///
    /// # Safety
    /// The parts must come from one `into_raw` call and the buffer must not
    /// have been freed or handed to another owner.
    pub unsafe fn from_raw(slots: Option<NonNull<usize>>, slot_count: usize, alloc: A) -> Self {
        Self { slots, slot_count: if slots.is_some() { slot_count } else { 0 }, alloc }
    }
}

impl<A: Allocator> Drop for RawCallstack<A> {
    fn drop(&mut self) {
        let Some(slots) = self.slots else {
            return;
        };
        // SAFETY: allocated in `allocate` with this exact layout.
        unsafe {
            let layout = Layout::array::<usize>(self.slot_count).unwrap_unchecked();
            self.alloc.free(slots.cast(), layout);
        }
    }
}

impl<A: Allocator> fmt::Debug for RawCallstack<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.frames().iter().map(|ip| format!("0x{ip:x}"))).finish()
    }
}

/// Capture up to `max_depth` frames of the calling thread
///
/// Uses the process's global allocator. See [`capture_stack_in`].
#[inline(never)]
#[must_use]
pub fn capture_stack(max_depth: usize) -> RawCallstack {
    capture_stack_in(max_depth, SystemAllocator)
}

/// Capture up to `max_depth` frames of the calling thread into a buffer
/// allocated through `alloc`
///
/// Never fails: if the buffer cannot be allocated or the platform cannot walk
/// frames, the result has zero frames. Safe to call from several threads at
/// once since it touches no shared state.
#[inline(never)]
pub fn capture_stack_in<A: Allocator>(max_depth: usize, alloc: A) -> RawCallstack<A> {
    let mut stack = RawCallstack::allocate(max_depth, alloc);
    let Some((count, addrs)) = stack.slots_mut().and_then(|s| s.split_first_mut()) else {
        return stack;
    };

    let mut written = 0;
    if !addrs.is_empty() {
        backtrace::trace(|frame| {
            addrs[written] = frame.ip() as usize;
            written += 1;
            written < addrs.len()
        });
    }
    *count = written;
    stack
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::CountingAllocator;

    #[test]
    fn test_capture_respects_depth() {
        for depth in [0, 1, 3, 16, 64] {
            let stack = capture_stack(depth);
            assert!(stack.len() <= depth, "depth {depth} captured {}", stack.len());
            assert_eq!(stack.as_slots()[FRAME_COUNT_SLOT], stack.frames().len());
            assert_eq!(stack.max_depth(), depth);
        }
    }

    #[test]
    fn test_capture_unrepresentable_depth_is_empty() {
        let alloc = CountingAllocator::new();
        for depth in [usize::MAX, usize::MAX / 2] {
            let stack = capture_stack_in(depth, alloc.clone());
            assert!(stack.is_empty());
            assert!(stack.as_slots().is_empty());
            assert_eq!(stack.max_depth(), 0);
        }
        assert_eq!(alloc.live_allocations(), 0);
    }

    #[test]
    fn test_unused_slots_are_zeroed() {
        let stack = capture_stack(256);
        let (slots, slot_count, alloc) = stack.into_raw();
        let slots = slots.expect("slot buffer not allocated");
        // SAFETY: the buffer holds `slot_count` slots until rebuilt below.
        let all = unsafe { std::slice::from_raw_parts(slots.as_ptr(), slot_count) };
        let count = all[FRAME_COUNT_SLOT];
        assert!(all[1 + count..].iter().all(|&slot| slot == 0));
        drop(unsafe { RawCallstack::from_raw(Some(slots), slot_count, alloc) });
    }

    #[test]
    fn test_capture_records_nonzero_addresses() {
        let stack = capture_stack(8);
        assert!(!stack.is_empty(), "frame walker produced no frames");
        assert!(stack.frames().iter().all(|&ip| ip != 0));
    }

    #[test]
    fn test_capture_frees_through_allocator() {
        let alloc = CountingAllocator::new();
        let stack = capture_stack_in(32, alloc.clone());
        assert_eq!(alloc.live_allocations(), 1);
        assert_eq!(alloc.live_bytes(), 33 * std::mem::size_of::<usize>());
        drop(stack);
        assert_eq!(alloc.live_allocations(), 0);
    }

    #[test]
    fn test_into_raw_and_back() {
        let alloc = CountingAllocator::new();
        let stack = capture_stack_in(4, alloc.clone());
        let frames = stack.frames().to_vec();

        let (slots, slot_count, handle) = stack.into_raw();
        assert_eq!(alloc.live_allocations(), 1);

        let stack = unsafe { RawCallstack::from_raw(slots, slot_count, handle) };
        assert_eq!(stack.frames(), frames.as_slice());
        drop(stack);
        assert_eq!(alloc.live_allocations(), 0);
    }
}
