//! Demangling into fixed-capacity buffers
//!
//! Names that start with `_` are candidates: `_R` and `_ZN...E` go through
//! `rustc-demangle`, any other `_Z` name through the C++ demangler bundled in
//! `addr2line`. Anything that fails keeps its raw form.

use std::fmt::{self, Write};

/// String with a hard capacity, reused across calls
///
/// Writes past the capacity are cut at the last character boundary that fits
/// and every later write is ignored. The backing storage is allocated once.
pub struct BoundedString {
    buf: String,
    capacity: usize,
    truncated: bool,
}

impl BoundedString {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: String::with_capacity(capacity), capacity, truncated: false }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.truncated = false;
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns true if a write was cut short since the last `clear`
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Append as much of `s` as fits
    pub fn push_str(&mut self, s: &str) {
        let _ = self.write_str(s);
    }
}

impl Write for BoundedString {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Err(fmt::Error);
        }
        let room = self.capacity - self.buf.len();
        if s.len() <= room {
            self.buf.push_str(s);
            return Ok(());
        }
        let mut cut = room;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        self.buf.push_str(&s[..cut]);
        self.truncated = true;
        Err(fmt::Error)
    }
}

impl fmt::Debug for BoundedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.buf, f)
    }
}

/// Returns true if `name` looks mangled and is worth a demangling attempt
#[must_use]
pub fn is_mangled(name: &str) -> bool {
    name.starts_with('_')
}

/// Replace the contents of `out` with `name`, demangled when possible
///
/// Rust names lose their hash suffix. Failure silently keeps the raw name.
pub fn demangle_into(name: &str, out: &mut BoundedString) {
    out.clear();
    if is_mangled(name) {
        if let Ok(demangled) = rustc_demangle::try_demangle(name) {
            let _ = write!(out, "{demangled:#}");
            return;
        }
        if name.starts_with("_Z") {
            if let Some(demangled) = addr2line::demangle(name, gimli::DW_LANG_C_plus_plus) {
                out.push_str(&demangled);
                return;
            }
        }
    }
    out.push_str(name);
}

/// Write `name` into `out` without allocating
///
/// Only Rust names are demangled here; the C++ demangler allocates, so C++
/// names stay raw. Used by the fast resolver.
pub fn write_name_fast<W: Write>(name: &str, out: &mut W) -> fmt::Result {
    match rustc_demangle::try_demangle(name) {
        Ok(demangled) => write!(out, "{demangled:#}"),
        Err(_) => out.write_str(name),
    }
}
