//! Windows backend: DbgHelp through `backtrace`, PSAPI for modules
//!
//! `backtrace::resolve` serializes access to DbgHelp internally and reports
//! inline frames before the containing function, which is the order the
//! resolver expects.

#![allow(unsafe_code)] // PSAPI calls

use std::ffi::c_void;
use std::mem::size_of;
use std::ops::ControlFlow;

use log::info;
use windows_sys::Win32::Foundation::HMODULE;
use windows_sys::Win32::System::LibraryLoader::GetModuleFileNameA;
use windows_sys::Win32::System::ProcessStatus::{
    EnumProcessModules, GetModuleInformation, MODULEINFO,
};
use windows_sys::Win32::System::Threading::GetCurrentProcess;

use crate::config::CallstackConfig;
use crate::domain::{MemoryRange, SourceError};

use super::{Backend, DebugFrame, LoadedModule, SymbolHit};

/// Upper bound of modules listed per enumeration
const MAX_MODULES: usize = 1024;

/// Backend backed by the Windows debug-help library
#[derive(Debug, Default)]
pub struct DbgHelpBackend {
    /// Storage for the last symbol name handed out by `lookup_symbol`
    name: String,
    /// Scratch for module paths during enumeration
    module: String,
}

impl Backend for DbgHelpBackend {
    fn init(_config: &CallstackConfig) -> Self {
        info!("Symbolizing with DbgHelp");
        Self::default()
    }

    fn for_each_frame<F>(&mut self, addr: u64, mut visit: F) -> Result<(), SourceError>
    where
        F: FnMut(DebugFrame<'_>) -> ControlFlow<()>,
    {
        let Ok(ip) = usize::try_from(addr) else {
            return Err(SourceError::Native(format!("address 0x{addr:x} out of range")));
        };

        let mut done = false;
        backtrace::resolve(ip as *mut c_void, |symbol| {
            if done {
                return;
            }
            // Frames without line info belong to the symbol fallback
            let Some(file) = symbol.filename().and_then(|path| path.to_str()) else {
                return;
            };
            let frame = DebugFrame {
                function: symbol.name().and_then(|name| name.as_str()),
                file: Some(file),
                line: symbol.lineno().unwrap_or(0),
            };
            done = visit(frame).is_break();
        });
        Ok(())
    }

    fn lookup_symbol(&mut self, addr: u64) -> Option<SymbolHit<'_>> {
        let ip = usize::try_from(addr).ok()?;
        let mut found = None;
        self.name.clear();

        backtrace::resolve(ip as *mut c_void, |symbol| {
            if found.is_some() {
                return;
            }
            if let Some(name) = symbol.name().and_then(|name| name.as_str()) {
                self.name.push_str(name);
                found = Some(symbol.addr().map_or(0, |start| start as usize as u64));
            }
        });

        let address = found?;
        Some(SymbolHit { name: Some(&self.name), address, module: None })
    }

    fn enumerate_modules<F>(&mut self, mut visit: F)
    where
        F: FnMut(LoadedModule<'_>),
    {
        let mut handles: Vec<HMODULE> = vec![std::ptr::null_mut(); MAX_MODULES];
        let mut needed = 0u32;
        // SAFETY: the handle buffer is valid for the byte count passed.
        let ok = unsafe {
            let process = GetCurrentProcess();
            EnumProcessModules(
                process,
                handles.as_mut_ptr(),
                u32::try_from(handles.len() * size_of::<HMODULE>()).unwrap_or(u32::MAX),
                &mut needed,
            )
        };
        if ok == 0 {
            log::warn!("EnumProcessModules failed");
            return;
        }

        let count = (needed as usize / size_of::<HMODULE>()).min(handles.len());
        let mut path = [0u8; 1024];
        for &module in &handles[..count] {
            let mut info = MODULEINFO {
                lpBaseOfDll: std::ptr::null_mut(),
                SizeOfImage: 0,
                EntryPoint: std::ptr::null_mut(),
            };
            // SAFETY: `info` and `path` are valid out-buffers of the sizes given.
            let len = unsafe {
                if GetModuleInformation(
                    GetCurrentProcess(),
                    module,
                    &mut info,
                    size_of::<MODULEINFO>() as u32,
                ) == 0
                {
                    continue;
                }
                GetModuleFileNameA(module, path.as_mut_ptr(), path.len() as u32) as usize
            };
            if len == 0 {
                continue;
            }

            self.module.clear();
            self.module.push_str(&String::from_utf8_lossy(&path[..len]));
            visit(LoadedModule {
                range: MemoryRange::from_base_size(
                    info.lpBaseOfDll as usize as u64,
                    u64::from(info.SizeOfImage),
                ),
                path: &self.module,
            });
        }
    }
}
