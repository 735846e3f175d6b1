//! ELF/DWARF backend
//!
//! Objects are discovered with `dl_iterate_phdr` and their debug info is
//! loaded lazily, the first time an address inside them is resolved. Runtime
//! addresses are turned into file addresses by subtracting the load bias:
//!
//! ```text
//! file address = runtime address - bias
//! ```
//!
//! Objects whose file cannot be read or parsed (the vDSO, deleted
//! libraries) are remembered as failed and fall back to `dladdr`.

use std::ops::ControlFlow;

use log::{debug, info};

use crate::config::CallstackConfig;
use crate::domain::{MemoryRange, SourceError};
use crate::symbolization::Symbolizer;

use super::dladdr::{dladdr, main_executable_path};
use super::{phdr, Backend, DebugFrame, LoadedModule, SymbolHit};

struct ObjectSlot {
    range: MemoryRange,
    bias: u64,
    path: String,
    /// `None` until first use, `Some(None)` if loading failed
    symbolizer: Option<Option<Symbolizer>>,
}

/// Backend resolving through DWARF line tables and ELF symbol tables
pub struct DwarfBackend {
    objects: Vec<ObjectSlot>,
    main_path: Option<String>,
    debug_info: bool,
}

impl DwarfBackend {
    /// Record objects loaded since the last refresh
    fn refresh_objects(&mut self) {
        let main_path = self.main_path.as_deref().unwrap_or("");
        let objects = &mut self.objects;
        phdr::for_each_object(|object| {
            if objects.iter().any(|slot| slot.range.start == object.range.start) {
                return;
            }
            objects.push(ObjectSlot {
                range: object.range,
                bias: object.bias,
                path: object.path.unwrap_or(main_path).to_owned(),
                symbolizer: None,
            });
        });
    }

    fn slot_index(&mut self, addr: u64) -> Option<usize> {
        let find = |objects: &[ObjectSlot]| objects.iter().position(|s| s.range.contains(addr));
        if let Some(idx) = find(&self.objects) {
            return Some(idx);
        }
        self.refresh_objects();
        find(&self.objects)
    }

    /// Symbolizer for the object containing `addr`, with its bias and path
    fn symbolizer_for(&mut self, addr: u64) -> Option<(&Symbolizer, u64, &str)> {
        if !self.debug_info {
            return None;
        }
        let idx = self.slot_index(addr)?;
        let slot = &mut self.objects[idx];
        let symbolizer = slot.symbolizer.get_or_insert_with(|| load(&slot.path));
        symbolizer.as_ref().map(|s| (s, slot.bias, slot.path.as_str()))
    }
}

fn load(path: &str) -> Option<Symbolizer> {
    if path.is_empty() {
        return None;
    }
    match Symbolizer::new(path) {
        Ok(symbolizer) => Some(symbolizer),
        Err(err) => {
            debug!("No ELF symbols for {path}: {err}");
            None
        }
    }
}

impl Backend for DwarfBackend {
    fn init(config: &CallstackConfig) -> Self {
        let mut backend =
            Self { objects: Vec::new(), main_path: main_executable_path(), debug_info: config.debug_info };
        backend.refresh_objects();
        info!(
            "DWARF symbolizer ready: {} objects mapped, debug info {}",
            backend.objects.len(),
            if backend.debug_info { "enabled" } else { "disabled" }
        );
        backend
    }

    fn for_each_frame<F>(&mut self, addr: u64, visit: F) -> Result<(), SourceError>
    where
        F: FnMut(DebugFrame<'_>) -> ControlFlow<()>,
    {
        let Some((symbolizer, bias, _)) = self.symbolizer_for(addr) else {
            return Ok(());
        };
        symbolizer.for_each_frame(addr.wrapping_sub(bias), visit)?;
        Ok(())
    }

    fn lookup_symbol(&mut self, addr: u64) -> Option<SymbolHit<'_>> {
        if let Some((symbolizer, bias, path)) = self.symbolizer_for(addr) {
            if let Some(symbol) = symbolizer.symbol_at(addr.wrapping_sub(bias)) {
                return Some(SymbolHit {
                    name: Some(&symbol.name),
                    address: symbol.address.wrapping_add(bias),
                    module: Some(path),
                });
            }
        }
        dladdr(addr)
    }

    fn enumerate_modules<F>(&mut self, mut visit: F)
    where
        F: FnMut(LoadedModule<'_>),
    {
        let main_path = self.main_path.as_deref().unwrap_or("");
        phdr::for_each_object(|object| {
            visit(LoadedModule { range: object.range, path: object.path.unwrap_or(main_path) });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[inline(never)]
    fn marker_function() -> u64 {
        std::hint::black_box(7)
    }

    #[test]
    fn test_lookup_symbol_in_own_executable() {
        let mut backend = DwarfBackend::init(&CallstackConfig::default());
        let addr = marker_function as usize as u64;

        let hit = backend.lookup_symbol(addr).expect("no symbol for marker_function");
        assert!(hit.name.is_some_and(|name| name.contains("marker_function")));
        assert_eq!(hit.address, addr);
    }

    #[test]
    fn test_disabled_debug_info_skips_frames() {
        let config = CallstackConfig { debug_info: false, ..CallstackConfig::default() };
        let mut backend = DwarfBackend::init(&config);
        let mut visited = 0;
        backend
            .for_each_frame(marker_function as usize as u64, |_| {
                visited += 1;
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(visited, 0);
    }

    #[test]
    fn test_enumeration_covers_own_executable() {
        let mut backend = DwarfBackend::init(&CallstackConfig::default());
        let addr = marker_function as usize as u64;
        let mut covering = Vec::new();
        backend.enumerate_modules(|module| {
            if module.range.contains(addr) {
                covering.push(module.path.to_owned());
            }
        });
        assert_eq!(covering.len(), 1);
        assert!(!covering[0].is_empty());
    }
}
