//! Address-range cache of loaded modules
//!
//! Maps an address to the display name of the module containing it, such as
//! `[libc.so.6]`. The cache only grows: entries are never evicted, so a
//! module unloaded and replaced at the same base keeps its first name.
//! Misses trigger one enumeration of the process's modules through the
//! backend before giving up with `[unknown]`.

use callscope_common::{is_kernel_address, KERNEL, MODULE_NAME_CAPACITY, UNKNOWN};
use log::{debug, info};

use crate::domain::MemoryRange;
use crate::platform::Backend;

/// Initial room for entries, enough for most processes without regrowth
const INITIAL_ENTRIES: usize = 512;

/// A loaded module's address range and display name
#[derive(Debug, Clone)]
pub struct ModuleCacheEntry {
    pub range: MemoryRange,
    name: String,
}

impl ModuleCacheEntry {
    /// Build an entry from a module path
    #[must_use]
    pub fn new(range: MemoryRange, path: &str) -> Self {
        Self { range, name: module_display_name(path) }
    }

    /// Bracketed base name, e.g. `[libc.so.6]`
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Append-only set of module ranges
#[derive(Debug)]
pub struct ModuleCache {
    entries: Vec<ModuleCacheEntry>,
    enumerations: usize,
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleCache {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::with_capacity(INITIAL_ENTRIES), enumerations: 0 }
    }

    /// Entry whose range contains `addr`
    #[must_use]
    pub fn lookup(&self, addr: u64) -> Option<&ModuleCacheEntry> {
        self.entries.iter().find(|entry| entry.range.contains(addr))
    }

    fn position(&self, addr: u64) -> Option<usize> {
        self.entries.iter().position(|entry| entry.range.contains(addr))
    }

    /// Add one entry unless a module with the same base is already cached
    ///
    /// Returns true if the entry was added.
    pub fn insert(&mut self, range: MemoryRange, path: &str) -> bool {
        if range.is_empty() || self.entries.iter().any(|e| e.range.start == range.start) {
            return false;
        }
        self.entries.push(ModuleCacheEntry::new(range, path));
        true
    }

    /// Enumerate the process's modules and cache the ones not seen before
    ///
    /// Returns the number of entries added.
    pub fn enumerate_and_cache<B: Backend>(&mut self, backend: &mut B) -> usize {
        self.enumerations += 1;
        let before = self.entries.len();
        backend.enumerate_modules(|module| {
            self.insert(module.range, module.path);
        });
        let added = self.entries.len() - before;

        info!(
            "Module enumeration #{}: {added} new, {} cached",
            self.enumerations,
            self.entries.len()
        );
        added
    }

    /// Display name of the module containing `addr`
    ///
    /// Kernel addresses map to `[kernel]` without touching the cache. On a
    /// miss the modules are enumerated once and the lookup retried; an
    /// address still uncovered maps to `[unknown]`.
    pub fn display_name<B: Backend>(&mut self, addr: u64, backend: &mut B) -> &str {
        if is_kernel_address(addr) {
            return KERNEL;
        }
        if let Some(idx) = self.position(addr) {
            return &self.entries[idx].name;
        }

        debug!("Module cache miss for 0x{addr:x}");
        self.enumerate_and_cache(backend);
        match self.position(addr) {
            Some(idx) => &self.entries[idx].name,
            None => UNKNOWN,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[ModuleCacheEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many times the modules have been enumerated
    #[must_use]
    pub fn enumerations(&self) -> usize {
        self.enumerations
    }
}

/// `[basename]` for a module path, bounded to the module name capacity
///
/// Both `/` and `\` separate path components.
#[must_use]
pub fn module_display_name(path: &str) -> String {
    let base = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let mut cut = base.len().min(MODULE_NAME_CAPACITY - 2);
    while !base.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("[{}]", &base[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CallstackConfig;
    use crate::domain::SourceError;
    use crate::platform::{DebugFrame, LoadedModule, SymbolHit};
    use std::ops::ControlFlow;

    #[derive(Default)]
    struct FixedModules {
        modules: Vec<(MemoryRange, &'static str)>,
    }

    impl Backend for FixedModules {
        fn init(_config: &CallstackConfig) -> Self {
            Self::default()
        }

        fn for_each_frame<F>(&mut self, _addr: u64, _visit: F) -> Result<(), SourceError>
        where
            F: FnMut(DebugFrame<'_>) -> ControlFlow<()>,
        {
            Ok(())
        }

        fn lookup_symbol(&mut self, _addr: u64) -> Option<SymbolHit<'_>> {
            None
        }

        fn enumerate_modules<F>(&mut self, mut visit: F)
        where
            F: FnMut(LoadedModule<'_>),
        {
            for &(range, path) in &self.modules {
                visit(LoadedModule { range, path });
            }
        }
    }

    #[test]
    fn test_display_name_brackets_base_name() {
        assert_eq!(module_display_name("/usr/lib/libc.so.6"), "[libc.so.6]");
        assert_eq!(module_display_name(r"C:\Windows\System32\ntdll.dll"), "[ntdll.dll]");
        assert_eq!(module_display_name("plain"), "[plain]");
    }

    #[test]
    fn test_display_name_is_bounded() {
        let long = "x".repeat(MODULE_NAME_CAPACITY * 2);
        assert_eq!(module_display_name(&long).len(), MODULE_NAME_CAPACITY);
    }

    #[test]
    fn test_miss_enumerates_once_then_hits() {
        let mut backend = FixedModules {
            modules: vec![(MemoryRange::new(0x1000, 0x2000), "/lib/libfoo.so")],
        };
        let mut cache = ModuleCache::new();

        assert_eq!(cache.display_name(0x1800, &mut backend), "[libfoo.so]");
        assert_eq!(cache.enumerations(), 1);
        assert_eq!(cache.display_name(0x1100, &mut backend), "[libfoo.so]");
        assert_eq!(cache.enumerations(), 1);
    }

    #[test]
    fn test_uncovered_address_is_unknown() {
        let mut backend = FixedModules::default();
        let mut cache = ModuleCache::new();

        assert_eq!(cache.display_name(0x4000, &mut backend), UNKNOWN);
        assert_eq!(cache.enumerations(), 1);
    }

    #[test]
    fn test_kernel_address_bypasses_cache() {
        let mut backend = FixedModules {
            modules: vec![(MemoryRange::new(0xffff_0000_0000_0000, u64::MAX), "vmlinux")],
        };
        let mut cache = ModuleCache::new();

        assert_eq!(cache.display_name(0xffff_8000_0000_1000, &mut backend), KERNEL);
        assert_eq!(cache.enumerations(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_enumeration_skips_known_bases() {
        let mut backend = FixedModules {
            modules: vec![
                (MemoryRange::new(0x1000, 0x2000), "/lib/a.so"),
                (MemoryRange::new(0x3000, 0x4000), "/lib/b.so"),
            ],
        };
        let mut cache = ModuleCache::new();

        assert_eq!(cache.enumerate_and_cache(&mut backend), 2);
        assert_eq!(cache.enumerate_and_cache(&mut backend), 0);
        assert_eq!(cache.len(), 2);

        // A module loaded later is picked up by the next enumeration
        backend.modules.push((MemoryRange::new(0x5000, 0x6000), "/lib/c.so"));
        assert_eq!(cache.enumerate_and_cache(&mut backend), 1);
        assert_eq!(cache.lookup(0x5800).unwrap().name(), "[c.so]");
    }
}
