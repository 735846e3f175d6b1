//! CLI argument definitions

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::CallstackConfig;

#[derive(Parser)]
#[command(
    name = "callscope",
    about = "Capture and symbolize call stacks of the running process",
    after_help = "\
EXAMPLES:
    callscope trace                          Capture and resolve this process's stack
    callscope trace --fast --depth 8         Function names only, 8 frames
    callscope --format json modules          Loaded modules as JSON
    callscope resolve 0x55f3a2b4c780         Resolve an address of this process

Set RUST_LOG=debug to see backend and module cache activity."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    /// Enumerate loaded modules at startup instead of on first miss
    #[arg(long, global = true)]
    pub eager: bool,

    /// Resolve through dynamic symbols only, without loading DWARF
    #[arg(long, global = true)]
    pub no_debug_info: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Capture this process's own stack and print it resolved
    Trace {
        /// Maximum number of frames to capture
        #[arg(short, long, default_value = "64")]
        depth: usize,

        /// Print function names only (fast resolver)
        #[arg(long)]
        fast: bool,
    },

    /// Enumerate loaded modules and print the module cache
    Modules,

    /// Resolve addresses inside this process
    Resolve {
        /// Addresses, hexadecimal with 0x prefix or decimal
        #[arg(value_name = "ADDR", required = true, value_parser = parse_address)]
        addresses: Vec<u64>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Args {
    /// Resolver configuration selected by the flags
    #[must_use]
    pub fn callstack_config(&self) -> CallstackConfig {
        let defaults = CallstackConfig::default();
        CallstackConfig {
            eager_module_scan: self.eager || defaults.eager_module_scan,
            debug_info: !self.no_debug_info,
        }
    }
}

/// Parse `0x`-prefixed hexadecimal or plain decimal addresses
///
/// # Errors
/// Returns a message suitable for clap when the text is not a number.
pub fn parse_address(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|err| format!("invalid address {text:?}: {err}"))
}
