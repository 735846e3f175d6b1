//! Owned, serializable snapshots of resolution results
//!
//! Entries returned by the resolver borrow its scratch buffer. These types
//! copy them out so a whole stack can be printed or written as JSON.

// Report formatting builds strings piecewise
#![allow(clippy::format_push_string)]

use serde::{Serialize, Serializer};

use crate::alloc::Allocator;
use crate::callstack::Callstack;
use crate::platform::Backend;
use crate::symbolization::{CallstackEntry, ModuleCacheEntry};

/// One frame of a resolved address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub name: String,
    pub file: String,
    /// 0 when unknown
    pub line: u32,
}

/// A resolved address with its inline frames, innermost first
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedFrame {
    #[serde(serialize_with = "hex_address")]
    pub addr: u64,
    pub entries: Vec<ReportEntry>,
}

impl ResolvedFrame {
    #[must_use]
    pub fn from_entries<A: Allocator>(addr: u64, entries: &[CallstackEntry<A>]) -> Self {
        let entries = entries
            .iter()
            .map(|entry| ReportEntry {
                name: entry.name.to_string(),
                file: entry.file.to_string(),
                line: entry.line,
            })
            .collect();
        Self { addr, entries }
    }

    /// Format the frame for display
    ///
    /// ```text
    /// #3  0x000055f3a2b4c780 tokio::runtime::park::Inner::park
    ///                       at src/runtime/park.rs:42
    /// ```
    #[must_use]
    pub fn format(&self, frame_num: usize) -> String {
        let mut output = String::new();

        let number = format!("#{frame_num:<2}");
        let indent = " ".repeat(number.len());
        for (idx, entry) in self.entries.iter().enumerate() {
            let prefix = if idx == 0 { &number } else { &indent };
            output.push_str(&format!("{} 0x{:016x} {}", prefix, self.addr, entry.name));
            output.push_str(&format!("\n                      at {}", entry.file));
            if entry.line != 0 {
                output.push_str(&format!(":{}", entry.line));
            }

            if idx < self.entries.len() - 1 {
                output.push('\n');
            }
        }

        output
    }
}

/// A module cache entry as reported by `callscope modules`
#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    #[serde(serialize_with = "hex_address")]
    pub start: u64,
    #[serde(serialize_with = "hex_address")]
    pub end: u64,
    pub name: String,
}

impl From<&ModuleCacheEntry> for ModuleReport {
    fn from(entry: &ModuleCacheEntry) -> Self {
        Self { start: entry.range.start, end: entry.range.end, name: entry.name().to_string() }
    }
}

/// Fully resolve every address, preserving order
pub fn resolve_all<B, A, I>(callstack: &mut Callstack<B, A>, addrs: I) -> Vec<ResolvedFrame>
where
    B: Backend,
    A: Allocator,
    I: IntoIterator<Item = u64>,
{
    addrs
        .into_iter()
        .map(|addr| ResolvedFrame::from_entries(addr, &callstack.resolve(addr)))
        .collect()
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's serialize_with signature
fn hex_address<S: Serializer>(addr: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{addr:x}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> ResolvedFrame {
        ResolvedFrame {
            addr: 0x55f3_a2b4_c780,
            entries: vec![
                ReportEntry { name: "inner".into(), file: "src/lib.rs".into(), line: 12 },
                ReportEntry { name: "outer".into(), file: "[app] [0x55f3a2b4c780]".into(), line: 0 },
            ],
        }
    }

    #[test]
    fn test_format_lists_inline_frames() {
        let text = frame().format(3);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "#3  0x000055f3a2b4c780 inner");
        assert_eq!(lines[1].trim(), "at src/lib.rs:12");
        assert_eq!(lines[2], "    0x000055f3a2b4c780 outer");
        assert_eq!(lines[3].trim(), "at [app] [0x55f3a2b4c780]");
    }

    #[test]
    fn test_inline_frames_align_with_frame_number() {
        for frame_num in [0, 7, 42, 1234] {
            let text = frame().format(frame_num);
            let lines: Vec<&str> = text.lines().collect();
            assert_eq!(lines[0].find("0x"), lines[2].find("0x"), "{text}");
        }
    }

    #[test]
    fn test_json_uses_hex_addresses() {
        let json = serde_json::to_value(frame()).unwrap();
        assert_eq!(json["addr"], "0x55f3a2b4c780");
        assert_eq!(json["entries"][0]["line"], 12);
        assert_eq!(json["entries"][1]["name"], "outer");
    }
}
