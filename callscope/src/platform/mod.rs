//! # Platform Backends
//!
//! Each target has exactly one native facility for turning addresses into
//! symbols, and exactly one of these modules is compiled into a build:
//!
//! | Backend            | Targets                                          | Facility                           |
//! |--------------------|--------------------------------------------------|------------------------------------|
//! | [`DbgHelpBackend`] | Windows                                          | DbgHelp (inline-aware) + PSAPI     |
//! | [`DwarfBackend`]   | Linux, Android, FreeBSD (without `minimal`)      | ELF/DWARF via `addr2line` + `dladdr` |
//! | [`DladdrBackend`]  | Other Unix, or any Unix with feature `minimal`   | `dladdr` only                      |
//! | `NullBackend`      | Anything else                                    | None, everything degrades          |
//!
//! The resolver is generic over [`Backend`] and defaults to [`NativeBackend`],
//! so the choice is made at compile time and calls are statically dispatched.
//! Tests substitute scripted backends through the same trait.

use std::fmt;
use std::ops::ControlFlow;

use crate::config::CallstackConfig;
use crate::domain::{MemoryRange, SourceError};
use crate::symbolization::demangle::write_name_fast;

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
mod phdr;

#[cfg(unix)]
mod dladdr;
#[cfg(unix)]
pub use dladdr::DladdrBackend;

#[cfg(all(
    not(feature = "minimal"),
    any(target_os = "linux", target_os = "android", target_os = "freebsd")
))]
mod dwarf;
#[cfg(all(
    not(feature = "minimal"),
    any(target_os = "linux", target_os = "android", target_os = "freebsd")
))]
pub use dwarf::DwarfBackend;

#[cfg(windows)]
mod dbghelp;
#[cfg(windows)]
pub use dbghelp::DbgHelpBackend;

/// Backend compiled into this build
#[cfg(windows)]
pub type NativeBackend = DbgHelpBackend;

/// Backend compiled into this build
#[cfg(all(
    not(feature = "minimal"),
    any(target_os = "linux", target_os = "android", target_os = "freebsd")
))]
pub type NativeBackend = DwarfBackend;

/// Backend compiled into this build
#[cfg(all(
    unix,
    not(all(
        not(feature = "minimal"),
        any(target_os = "linux", target_os = "android", target_os = "freebsd")
    ))
))]
pub type NativeBackend = DladdrBackend;

/// Backend compiled into this build
#[cfg(not(any(unix, windows)))]
pub type NativeBackend = NullBackend;

/// One frame reported by debug information for an address
///
/// Inline frames come first, the containing function last.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugFrame<'a> {
    /// Raw (possibly mangled) function name
    pub function: Option<&'a str>,
    pub file: Option<&'a str>,
    /// Line number, 0 when unknown
    pub line: u32,
}

/// Result of a dynamic-symbol lookup (`dladdr`, `SymFromAddr`)
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolHit<'a> {
    /// Raw (possibly mangled) symbol name
    pub name: Option<&'a str>,
    /// Start address of the symbol, 0 when unknown
    pub address: u64,
    /// Path of the module containing the address
    pub module: Option<&'a str>,
}

/// A module currently loaded in the process
#[derive(Debug, Clone, Copy)]
pub struct LoadedModule<'a> {
    pub range: MemoryRange,
    pub path: &'a str,
}

/// Native capability set behind capture-time symbolication
///
/// Implementations are not expected to be thread-safe; the resolver holds
/// them behind `&mut self`.
pub trait Backend {
    /// One-time native setup
    fn init(config: &CallstackConfig) -> Self
    where
        Self: Sized;

    /// Report the debug-info frames covering `addr`, innermost first
    ///
    /// Stops as soon as `visit` breaks. Reports nothing when no debug
    /// information covers the address. An `Err` means frames already
    /// reported must be discarded.
    ///
    /// # Errors
    /// Returns an error if the native facility fails mid-lookup.
    fn for_each_frame<F>(&mut self, addr: u64, visit: F) -> Result<(), SourceError>
    where
        F: FnMut(DebugFrame<'_>) -> ControlFlow<()>;

    /// Look up the symbol containing `addr` without debug information
    fn lookup_symbol(&mut self, addr: u64) -> Option<SymbolHit<'_>>;

    /// Visit every module currently loaded in the process
    fn enumerate_modules<F>(&mut self, visit: F)
    where
        F: FnMut(LoadedModule<'_>);

    /// Write the cheapest available function name for `addr` into `out`
    ///
    /// Returns false when nothing was found. The default takes the function
    /// of the innermost debug-info frame and falls back to
    /// [`Backend::lookup_symbol`].
    fn fast_name<W: fmt::Write>(&mut self, addr: u64, out: &mut W) -> bool {
        let mut found = false;
        let walked = self.for_each_frame(addr, |frame| match frame.function {
            Some(function) => {
                let _ = write_name_fast(function, out);
                found = true;
                ControlFlow::Break(())
            }
            None => ControlFlow::Continue(()),
        });
        if found {
            return true;
        }
        if let Err(err) = walked {
            log::debug!("Frame walk for 0x{addr:x} failed: {err}");
        }
        write_symbol_name(self.lookup_symbol(addr), out)
    }
}

/// Write the name of a symbol hit; truncation by `out` still counts as found
pub(crate) fn write_symbol_name<W: fmt::Write>(hit: Option<SymbolHit<'_>>, out: &mut W) -> bool {
    match hit.and_then(|hit| hit.name) {
        Some(name) => {
            let _ = write_name_fast(name, out);
            true
        }
        None => false,
    }
}

/// Backend for targets without any supported native facility
///
/// Every lookup misses, so capture still works and resolution yields
/// sentinel entries.
#[derive(Debug, Default)]
pub struct NullBackend;

impl Backend for NullBackend {
    fn init(_config: &CallstackConfig) -> Self {
        log::warn!("No symbolication facility on this target, frames will resolve to sentinels");
        Self
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

    fn enumerate_modules<F>(&mut self, _visit: F)
    where
        F: FnMut(LoadedModule<'_>),
    {
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_backend_misses_everything() {
        let mut backend = NullBackend::init(&CallstackConfig::default());
        let mut visited = 0;
        backend
            .for_each_frame(0x1000, |_| {
                visited += 1;
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(visited, 0);
        assert!(backend.lookup_symbol(0x1000).is_none());

        let mut name = String::new();
        assert!(!backend.fast_name(0x1000, &mut name));
        assert!(name.is_empty());
    }

    #[test]
    fn test_write_symbol_name_demangles() {
        let hit = SymbolHit {
            name: Some("_ZN5tokio4park17h0123456789abcdefE"),
            address: 0x1000,
            module: None,
        };
        let mut name = String::new();
        assert!(write_symbol_name(Some(hit), &mut name));
        assert_eq!(name, "tokio::park");
    }
}
