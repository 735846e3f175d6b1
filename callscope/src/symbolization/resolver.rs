//! Address resolution: the fast name-only path and the full path
//!
//! Full resolution of one address produces at most
//! [`MAX_CALLSTACK_ENTRIES`] entries:
//!
//! ```text
//! kernel address       -> [kernel] / [kernel] / 0
//! debug info frames    -> one entry per frame, inline frames first
//! no debug info        -> symbol (+ offset) / <module> [0x<address>] / 0
//! backend error        -> [error] / [error] / 0, partial entries dropped
//! ```

use std::fmt::Write;
use std::ops::ControlFlow;

use callscope_common::{is_kernel_address, ERROR, KERNEL, MAX_CALLSTACK_ENTRIES, UNKNOWN};
use log::debug;

use crate::alloc::Allocator;
use crate::callstack::Callstack;
use crate::platform::Backend;

use super::demangle::demangle_into;
use super::entry::{CallstackEntry, CallstackEntryData};

impl<B: Backend, A: Allocator> Callstack<B, A> {
    /// Function name of `addr`, or an empty string if none is known
    ///
    /// Takes the innermost debug-info frame, else the dynamic symbol. The
    /// result lives in a reused buffer and is cut at its capacity.
    pub fn resolve_fast(&mut self, addr: u64) -> &str {
        self.fast_name.clear();
        if !is_kernel_address(addr) && !self.backend.fast_name(addr, &mut self.fast_name) {
            self.fast_name.clear();
        }
        self.fast_name.as_str()
    }

    /// Resolve `addr` into its frames, innermost inline frame first
    ///
    /// Never fails: missing data becomes `[unknown]` and backend failures
    /// become a single `[error]` entry.
    pub fn resolve(&mut self, addr: u64) -> CallstackEntryData<'_, A> {
        self.entries.clear();

        if is_kernel_address(addr) {
            self.entries.push(CallstackEntry::new_in(KERNEL, KERNEL, 0, &self.alloc));
            return CallstackEntryData::new(&mut self.entries);
        }

        let Self { backend, entries, alloc, demangled, .. } = &mut *self;
        let outcome = backend.for_each_frame(addr, |frame| {
            if entries.len() >= MAX_CALLSTACK_ENTRIES {
                return ControlFlow::Break(());
            }
            let name = match frame.function {
                Some(function) => {
                    demangle_into(function, demangled);
                    demangled.as_str()
                }
                None => UNKNOWN,
            };
            entries.push(CallstackEntry::new_in(
                name,
                frame.file.unwrap_or(UNKNOWN),
                frame.line,
                alloc,
            ));
            if entries.len() >= MAX_CALLSTACK_ENTRIES {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        match outcome {
            Err(err) => {
                debug!(
                    "Resolving 0x{addr:x} failed after {} frames: {err}",
                    self.entries.len()
                );
                self.entries.clear();
                self.entries.push(CallstackEntry::new_in(ERROR, ERROR, 0, &self.alloc));
            }
            Ok(()) if self.entries.is_empty() => self.push_symbol_entry(addr),
            Ok(()) => {}
        }
        CallstackEntryData::new(&mut self.entries)
    }

    /// Entry for an address without debug info
    fn push_symbol_entry(&mut self, addr: u64) {
        self.demangled.clear();
        self.location.clear();

        let mut has_name = false;
        if let Some(hit) = self.backend.lookup_symbol(addr) {
            if let Some(name) = hit.name {
                demangle_into(name, &mut self.demangled);
                let offset = addr.wrapping_sub(hit.address);
                if hit.address != 0 && offset != 0 {
                    let _ = write!(self.demangled, " + {offset}");
                }
                has_name = true;
            }
            if let Some(module) = hit.module {
                self.location.push_str(module);
            }
        }

        let module = self.modules.display_name(addr, &mut self.backend);
        if module != UNKNOWN || self.location.is_empty() {
            self.location.clear();
            self.location.push_str(module);
        }
        let _ = write!(self.location, " [0x{addr:x}]");

        let name = if has_name { self.demangled.as_str() } else { module };
        self.entries.push(CallstackEntry::new_in(name, self.location.as_str(), 0, &self.alloc));
    }
}
