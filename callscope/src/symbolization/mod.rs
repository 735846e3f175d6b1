//! # Symbol Resolution
//!
//! Turns raw instruction pointers captured by [`capture_stack`] into
//! function names, source files and line numbers, including frames the
//! compiler inlined.
//!
//! ## Resolution Paths
//!
//! - **Fast** ([`Callstack::resolve_fast`]): function name only, written into
//!   a reused 1 KiB buffer without allocating. Used where a name is needed
//!   on a warm path, e.g. labelling a sampled frame.
//! - **Full** ([`Callstack::resolve`]): up to 16 entries per address. When
//!   debug info covers the address, one entry per inline frame followed by
//!   the containing function. Otherwise a single entry from the dynamic
//!   symbol tables, annotated with the module and address.
//!
//! ## Address Translation
//!
//! Debug info uses file virtual addresses while captured stacks hold runtime
//! addresses. With ASLR every object is loaded at a random bias:
//!
//! ```text
//! Runtime Address = Bias + File Address
//! File Address    = Runtime Address - Bias
//! ```
//!
//! The ELF backend takes the bias of each object from the dynamic loader.
//!
//! ## Module Names
//!
//! Addresses without a symbol are labelled with the module that contains
//! them, e.g. `[libc.so.6] [0x7f8b3c1a2f10]`. [`ModuleCache`] keeps the
//! address ranges of loaded modules and re-enumerates only on a miss.
//!
//! ## Example
//!
//! ```rust,no_run
//! use callscope::{capture_stack, Callstack};
//!
//! let mut callstack = Callstack::init();
//! let stack = capture_stack(32);
//! for addr in stack.addresses() {
//!     for entry in callstack.resolve(addr).iter() {
//!         println!("0x{addr:x} {entry}");
//!     }
//! }
//! ```
//!
//! ## Limitations
//!
//! - **Debug info**: source locations need `debug = true` (or split DWARF
//!   next to the binary); without it only symbol names are available
//! - **Exported symbols**: `dladdr` only sees exported symbols, so the
//!   minimal backend names few frames inside executables
//! - **No eviction**: the module cache keeps the first name seen for a base
//!   address even after the module is unloaded
//!
//! [`capture_stack`]: crate::capture_stack
//! [`Callstack::resolve_fast`]: crate::Callstack::resolve_fast
//! [`Callstack::resolve`]: crate::Callstack::resolve

pub mod demangle;
pub mod entry;
pub mod module_cache;
mod resolver;
pub mod symbolizer;

pub use entry::{CallstackEntry, CallstackEntryData};
pub use module_cache::{ModuleCache, ModuleCacheEntry};
pub use symbolizer::{ElfSymbol, Symbolizer};
