//! Resolver configuration

/// Options applied when a [`Callstack`](crate::Callstack) is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallstackConfig {
    /// Enumerate loaded modules at init instead of on the first cache miss
    ///
    /// On by default on Windows, where PSAPI enumeration is cheap and DbgHelp
    /// wants modules registered up front.
    pub eager_module_scan: bool,

    /// Load DWARF from object files
    ///
    /// When off, the DWARF backend resolves through dynamic symbols only.
    pub debug_info: bool,
}

impl Default for CallstackConfig {
    fn default() -> Self {
        Self { eager_module_scan: cfg!(windows), debug_info: true }
    }
}
