//! Resolver context and the process-wide instance
//!
//! A [`Callstack`] owns everything resolution needs: the platform backend,
//! the module cache and the scratch buffers that resolution results borrow.
//! Resolving methods take `&mut self`, so sharing one across threads means
//! putting it behind a lock. [`init_callstack`] does that once for the whole
//! process.

use std::sync::{Mutex, OnceLock};

use callscope_common::{DEMANGLE_CAPACITY, FAST_NAME_CAPACITY, MAX_CALLSTACK_ENTRIES};
use log::{info, warn};

use crate::alloc::{Allocator, SystemAllocator};
use crate::capture::{capture_stack_in, RawCallstack};
use crate::config::CallstackConfig;
use crate::platform::{Backend, NativeBackend};
use crate::symbolization::demangle::BoundedString;
use crate::symbolization::{CallstackEntry, ModuleCache};

/// Capacity of the location buffer: a module name plus ` [0x<address>]`
const LOCATION_CAPACITY: usize = callscope_common::MODULE_NAME_CAPACITY + 32;

/// Symbolication context
///
/// Generic over the native [`Backend`] and the [`Allocator`] that owns
/// returned strings; both default to the platform's own.
pub struct Callstack<B: Backend = NativeBackend, A: Allocator = SystemAllocator> {
    pub(crate) backend: B,
    pub(crate) modules: ModuleCache,
    pub(crate) alloc: A,
    pub(crate) entries: Vec<CallstackEntry<A>>,
    pub(crate) fast_name: BoundedString,
    pub(crate) demangled: BoundedString,
    pub(crate) location: BoundedString,
}

impl Callstack {
    /// Initialize the native backend with default options
    #[must_use]
    pub fn init() -> Self {
        Self::with_config(&CallstackConfig::default())
    }

    #[must_use]
    pub fn with_config(config: &CallstackConfig) -> Self {
        Self::with_backend(NativeBackend::init(config), SystemAllocator, config)
    }
}

impl<B: Backend, A: Allocator> Callstack<B, A> {
    /// Build a context around an initialized backend
    ///
    /// Enumerates modules right away when `config.eager_module_scan` is set.
    pub fn with_backend(backend: B, alloc: A, config: &CallstackConfig) -> Self {
        let mut callstack = Self {
            backend,
            modules: ModuleCache::new(),
            alloc,
            entries: Vec::with_capacity(MAX_CALLSTACK_ENTRIES),
            fast_name: BoundedString::with_capacity(FAST_NAME_CAPACITY),
            demangled: BoundedString::with_capacity(DEMANGLE_CAPACITY),
            location: BoundedString::with_capacity(LOCATION_CAPACITY),
        };
        if config.eager_module_scan {
            callstack.modules.enumerate_and_cache(&mut callstack.backend);
        }
        callstack
    }

    /// Capture the calling thread's stack into this context's allocator
    #[inline(never)]
    pub fn capture_stack(&self, max_depth: usize) -> RawCallstack<A> {
        capture_stack_in(max_depth, self.alloc.clone())
    }

    /// Enumerate loaded modules now instead of on the next cache miss
    ///
    /// Returns the number of modules added to the cache.
    pub fn enumerate_modules(&mut self) -> usize {
        self.modules.enumerate_and_cache(&mut self.backend)
    }

    #[must_use]
    pub fn module_cache(&self) -> &ModuleCache {
        &self.modules
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.alloc
    }
}

static CALLSTACK: OnceLock<Mutex<Callstack>> = OnceLock::new();

/// Initialize the process-wide context with default options
///
/// See [`init_callstack_with`].
pub fn init_callstack() -> &'static Mutex<Callstack> {
    init_callstack_with(&CallstackConfig::default())
}

/// Initialize the process-wide context
///
/// Only the first call initializes the native facilities. Later calls log a
/// warning, ignore `config` and return the existing instance.
pub fn init_callstack_with(config: &CallstackConfig) -> &'static Mutex<Callstack> {
    let mut created = false;
    let callstack = CALLSTACK.get_or_init(|| {
        created = true;
        Mutex::new(Callstack::with_config(config))
    });
    if created {
        info!("Callstack initialized");
    } else {
        warn!("Callstack already initialized, reusing the existing instance");
    }
    callstack
}

/// The process-wide context, if [`init_callstack`] has run
#[must_use]
pub fn callstack() -> Option<&'static Mutex<Callstack>> {
    CALLSTACK.get()
}
