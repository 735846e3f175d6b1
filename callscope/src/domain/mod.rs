//! Domain model for callscope
//!
//! This module contains the core domain types and errors:
//! - Address ranges of loaded modules
//! - Structured errors raised by native facilities before they are
//!   converted into sentinel entries

pub mod errors;
pub mod types;

pub use types::MemoryRange;

pub use errors::{SourceError, SymbolizerError};
