//! Structured error types for callscope
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! None of these reach the caller of a resolving operation: they are logged
//! and replaced by sentinel entries.

use std::path::PathBuf;
use thiserror::Error;

/// Error reported by a native facility while it is producing frames
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("DWARF lookup failed: {0}")]
    Dwarf(#[from] gimli::Error),

    #[error("Native symbol facility failed: {0}")]
    Native(String),
}

/// Error raised while loading debug information for one module
#[derive(Error, Debug)]
pub enum SymbolizerError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse object file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: object::Error,
    },

    #[error("Failed to load DWARF debug information: {0}")]
    Dwarf(#[from] gimli::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_display() {
        let err = SourceError::Native("SymFromInlineContext failed".to_string());
        assert_eq!(err.to_string(), "Native symbol facility failed: SymFromInlineContext failed");
    }

    #[test]
    fn test_dwarf_error_conversion() {
        let err: SourceError = gimli::Error::Io.into();
        assert!(err.to_string().starts_with("DWARF lookup failed"));
    }

    #[test]
    fn test_read_error_mentions_path() {
        let err = SymbolizerError::Read {
            path: PathBuf::from("/usr/lib/libmissing.so"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/usr/lib/libmissing.so"));
    }
}
