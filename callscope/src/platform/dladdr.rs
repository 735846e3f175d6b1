//! Dynamic-symbol lookup through `dladdr`
//!
//! `dladdr` only sees exported symbols, so names inside a stripped or
//! statically linked executable usually come back empty. Good enough for
//! shared libraries; the DWARF backend covers the rest where available.

#![allow(unsafe_code)] // libc::dladdr

use std::ffi::{c_void, CStr};
use std::mem::MaybeUninit;
use std::ops::ControlFlow;

use crate::config::CallstackConfig;
use crate::domain::SourceError;

use super::{Backend, DebugFrame, LoadedModule, SymbolHit};

/// Look up `addr` in the dynamic loader's symbol tables
///
/// The returned strings are owned by the loader and stay valid while the
/// containing object is loaded; callers copy what they keep.
pub(crate) fn dladdr<'a>(addr: u64) -> Option<SymbolHit<'a>> {
    let addr = usize::try_from(addr).ok()?;
    let mut info = MaybeUninit::<libc::Dl_info>::zeroed();
    // SAFETY: `info` is a valid out-pointer; dladdr never dereferences `addr`.
    if unsafe { libc::dladdr(addr as *const c_void, info.as_mut_ptr()) } == 0 {
        return None;
    }
    // SAFETY: zero-initialized and filled in by a successful dladdr.
    let info = unsafe { info.assume_init() };

    // SAFETY: non-null pointers from dladdr are NUL-terminated strings.
    let text = |ptr: *const libc::c_char| {
        (!ptr.is_null())
            .then(|| unsafe { CStr::from_ptr(ptr) }.to_str().ok())
            .flatten()
            .filter(|s| !s.is_empty())
    };

    let name = text(info.dli_sname);
    Some(SymbolHit {
        name,
        address: if name.is_some() { info.dli_saddr as usize as u64 } else { 0 },
        module: text(info.dli_fname),
    })
}

/// Backend using only `dladdr`
///
/// There is no debug information, so every address takes the symbol
/// fallback path. Modules are listed with `dl_iterate_phdr` where it exists.
#[derive(Debug, Default)]
pub struct DladdrBackend {
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    main_path: Option<String>,
}

impl Backend for DladdrBackend {
    fn init(_config: &CallstackConfig) -> Self {
        log::info!("Symbolizing with dladdr, no debug info");
        Self {
            #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
            main_path: main_executable_path(),
        }
    }

    fn for_each_frame<F>(&mut self, _addr: u64, _visit: F) -> Result<(), SourceError>
    where
        F: FnMut(DebugFrame<'_>) -> ControlFlow<()>,
    {
        Ok(())
    }

    fn lookup_symbol(&mut self, addr: u64) -> Option<SymbolHit<'_>> {
        dladdr(addr)
    }

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    fn enumerate_modules<F>(&mut self, mut visit: F)
    where
        F: FnMut(LoadedModule<'_>),
    {
        let main_path = self.main_path.as_deref().unwrap_or("");
        super::phdr::for_each_object(|object| {
            visit(LoadedModule { range: object.range, path: object.path.unwrap_or(main_path) });
        });
    }

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    fn enumerate_modules<F>(&mut self, _visit: F)
    where
        F: FnMut(LoadedModule<'_>),
    {
    }
}

/// Path of the running executable, reported by the loader as an empty name
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub(crate) fn main_executable_path() -> Option<String> {
    match std::env::current_exe() {
        Ok(path) => path.to_str().map(str::to_owned),
        Err(err) => {
            log::warn!("Cannot locate the running executable: {err}");
            None
        }
    }
}
