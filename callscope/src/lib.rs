//! # callscope - Call Stack Capture and Symbolication
//!
//! callscope records the return addresses of the running thread and, on
//! demand, turns each one into function names, source files and line
//! numbers, inline frames included. It is meant to be embedded in
//! instrumentation code: capture is cheap, resolution happens later, and
//! nothing ever fails the caller. Missing data comes back as `[unknown]`,
//! kernel addresses as `[kernel]` and native failures as `[error]`.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Instrumented Program                      │
//! └───────────────┬───────────────────────────────┬──────────────┘
//!                 │ capture_stack()               │ resolve(addr)
//!                 ▼                               ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │   Stack Capturer         │   │   Callstack (context)        │
//! │   [count, ip, ip, ...]   │──▶│   resolve / resolve_fast     │
//! │   allocator-owned        │   │        │          │          │
//! └──────────────────────────┘   │        ▼          ▼          │
//!                                │   ┌─────────┐ ┌───────────┐  │
//!                                │   │ Backend │ │  Module   │  │
//!                                │   │ (cfg)   │◀│  Cache    │  │
//!                                │   └─────────┘ └───────────┘  │
//!                                └──────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`capture`]: Walks the current thread into a [`RawCallstack`]
//! - [`symbolization`]: Fast and full resolution, demangling, module cache,
//!   ELF/DWARF symbolizer
//! - [`platform`]: The [`Backend`](platform::Backend) trait and one native
//!   implementation per target (DbgHelp, DWARF, `dladdr`)
//! - [`alloc`]: The [`Allocator`] contract every returned buffer is owned by
//! - [`callstack`]: The [`Callstack`] context and the process-wide instance
//! - [`config`]: [`CallstackConfig`]
//! - [`report`]: Serializable snapshots of resolved frames
//! - [`domain`]: Address ranges and internal error types
//! - [`cli`]: Arguments of the `callscope` binary
//!
//! ## Typical Usage
//!
//! ```rust,no_run
//! use callscope::{capture_stack, init_callstack};
//!
//! let stack = capture_stack(32);
//!
//! let mut callstack = init_callstack().lock().unwrap();
//! for addr in stack.addresses() {
//!     println!("{}", callstack.resolve_fast(addr));
//! }
//! ```
//!
//! ## Backends
//!
//! | Target                         | Backend  | Inline frames | Source lines |
//! |--------------------------------|----------|---------------|--------------|
//! | Windows                        | DbgHelp  | yes           | yes          |
//! | Linux, Android, FreeBSD        | DWARF    | yes           | yes          |
//! | Other Unix / feature `minimal` | `dladdr` | no            | no           |

pub mod alloc;
pub mod callstack;
pub mod capture;
pub mod cli;
pub mod config;
pub mod domain;
pub mod platform;
pub mod report;
pub mod symbolization;

pub use alloc::{AllocStr, Allocator, CountingAllocator, SystemAllocator};
pub use callstack::{callstack, init_callstack, init_callstack_with, Callstack};
pub use capture::{capture_stack, capture_stack_in, RawCallstack};
pub use config::CallstackConfig;
pub use symbolization::{CallstackEntry, CallstackEntryData, ModuleCache, ModuleCacheEntry};

pub use callscope_common::{ERROR, KERNEL, MAX_CALLSTACK_ENTRIES, UNKNOWN};
