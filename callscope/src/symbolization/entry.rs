use std::fmt;
use std::ops::Deref;

use crate::alloc::{AllocStr, Allocator, SystemAllocator};

/// One resolved frame of an address
///
/// Name and file are owned through the resolver's allocator. Missing data is
/// `[unknown]` and line `0`, never absent.
pub struct CallstackEntry<A: Allocator = SystemAllocator> {
    pub name: AllocStr<A>,
    /// Source file, or `<module> [0x<address>]` without debug info
    pub file: AllocStr<A>,
    pub line: u32,
}

impl<A: Allocator> CallstackEntry<A> {
    pub fn new_in(name: &str, file: &str, line: u32, alloc: &A) -> Self {
        Self {
            name: AllocStr::new_in(name, alloc.clone()),
            file: AllocStr::new_in(file, alloc.clone()),
            line,
        }
    }
}

impl<A: Allocator> fmt::Debug for CallstackEntry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallstackEntry")
            .field("name", &self.name)
            .field("file", &self.file)
            .field("line", &self.line)
            .finish()
    }
}

impl<A: Allocator> fmt::Display for CallstackEntry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.name, self.file)?;
        if self.line != 0 {
            write!(f, ":{}", self.line)?;
        }
        Ok(())
    }
}

/// Entries produced for one address, innermost inline frame first
///
/// Borrows the resolver's reused buffer, so it lives only until the next
/// resolution. Use [`CallstackEntryData::into_entries`] to keep them.
pub struct CallstackEntryData<'a, A: Allocator = SystemAllocator> {
    entries: &'a mut Vec<CallstackEntry<A>>,
}

impl<'a, A: Allocator> CallstackEntryData<'a, A> {
    pub(crate) fn new(entries: &'a mut Vec<CallstackEntry<A>>) -> Self {
        Self { entries }
    }

    /// Move the entries out; the resolver's buffer is left empty
    #[must_use]
    pub fn into_entries(self) -> Vec<CallstackEntry<A>> {
        self.entries.drain(..).collect()
    }
}

impl<A: Allocator> Deref for CallstackEntryData<'_, A> {
    type Target = [CallstackEntry<A>];

    fn deref(&self) -> &Self::Target {
        self.entries
    }
}

impl<A: Allocator> fmt::Debug for CallstackEntryData<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}
