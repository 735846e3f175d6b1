//! Loaded-object listing through `dl_iterate_phdr`

#![allow(unsafe_code)] // FFI callback over the dynamic loader's object list

use std::ffi::{c_int, c_void, CStr};

use crate::domain::MemoryRange;

/// One object reported by the dynamic loader
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoadedObject<'a> {
    /// Path as the loader knows it; `None` for the main executable
    pub path: Option<&'a str>,
    /// Difference between runtime and file virtual addresses
    pub bias: u64,
    /// Runtime range covered by the object's `PT_LOAD` segments
    pub range: MemoryRange,
}

/// Visit every object currently mapped by the dynamic loader
///
/// Objects without loadable segments are skipped. The loader holds its lock
/// while `visit` runs, so `visit` must not load or unload libraries.
pub(crate) fn for_each_object<F>(mut visit: F)
where
    F: FnMut(LoadedObject<'_>),
{
    unsafe extern "C" fn callback<F>(
        info: *mut libc::dl_phdr_info,
        _size: libc::size_t,
        data: *mut c_void,
    ) -> c_int
    where
        F: FnMut(LoadedObject<'_>),
    {
        // SAFETY: `data` is the `&mut F` passed below and `info` is valid for
        // the duration of the callback.
        let (visit, info) = unsafe { (&mut *data.cast::<F>(), &*info) };
        if let Some(object) = unsafe { describe(info) } {
            visit(object);
        }
        0
    }

    let data = std::ptr::addr_of_mut!(visit).cast::<c_void>();
    // SAFETY: the callback only runs during this call, while `visit` is alive.
    unsafe {
        libc::dl_iterate_phdr(Some(callback::<F>), data);
    }
}

/// # Safety
/// `info` must come from `dl_iterate_phdr`.
unsafe fn describe<'a>(info: &'a libc::dl_phdr_info) -> Option<LoadedObject<'a>> {
    if info.dlpi_phdr.is_null() {
        return None;
    }
    let headers = std::slice::from_raw_parts(info.dlpi_phdr, usize::from(info.dlpi_phnum));

    let mut low = u64::MAX;
    let mut high = 0;
    for header in headers.iter().filter(|h| h.p_type == libc::PT_LOAD) {
        let start = u64::from(header.p_vaddr);
        low = low.min(start);
        high = high.max(start.saturating_add(u64::from(header.p_memsz)));
    }
    if low >= high {
        return None;
    }

    let bias = u64::from(info.dlpi_addr);
    let path = if info.dlpi_name.is_null() {
        None
    } else {
        CStr::from_ptr(info.dlpi_name).to_str().ok().filter(|name| !name.is_empty())
    };

    Some(LoadedObject {
        path,
        bias,
        range: MemoryRange::new(bias.wrapping_add(low), bias.wrapping_add(high)),
    })
}
