//! Command-line interface of the `callscope` binary

pub mod args;

pub use args::{Args, Command, OutputFormat};
