use std::borrow::Cow;
use std::fs;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use addr2line::Context;
use gimli::{EndianArcSlice, RunTimeEndian};
use object::{Object, ObjectSection, ObjectSymbol, SymbolKind};

use crate::domain::SymbolizerError;
use crate::platform::DebugFrame;

/// Symbolizer for one ELF object: DWARF frames plus its symbol table
///
/// Probes are file virtual addresses. Callers subtract the load bias of the
/// object before asking. Lookups are uncached; the resolver above keeps no
/// per-address state either.
pub struct Symbolizer {
    ctx: Context<EndianArcSlice<RunTimeEndian>>,
    /// Text symbols sorted by address
    symbols: Vec<ElfSymbol>,
    has_debug_info: bool,
}

/// A function symbol from `.symtab` (or `.dynsym` for stripped objects)
#[derive(Debug, Clone)]
pub struct ElfSymbol {
    pub name: String,
    pub address: u64,
    pub size: u64,
}

impl Symbolizer {
    /// Load DWARF and symbols for the object at `binary_path`
    ///
    /// A missing `.debug_info` section is not an error: frame lookups then
    /// report nothing and only the symbol table is used.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not an object file.
    pub fn new<P: AsRef<Path>>(binary_path: P) -> Result<Self, SymbolizerError> {
        let path = binary_path.as_ref();
        let binary_data =
            fs::read(path).map_err(|source| SymbolizerError::Read { path: path.into(), source })?;
        let obj_file = object::File::parse(&*binary_data)
            .map_err(|source| SymbolizerError::Parse { path: path.into(), source })?;

        let endian =
            if obj_file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

        let load_section =
            |id: gimli::SectionId| -> Result<EndianArcSlice<RunTimeEndian>, gimli::Error> {
                let data = obj_file
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(Cow::Borrowed(&[][..]));
                Ok(EndianArcSlice::new(Arc::from(&*data), endian))
            };

        let dwarf = gimli::Dwarf::load(&load_section)?;
        let ctx = Context::from_dwarf(dwarf)?;
        let has_debug_info = obj_file.section_by_name(".debug_info").is_some();
        let symbols = collect_symbols(&obj_file);

        log::debug!(
            "Loaded {} ({} symbols, debug info: {has_debug_info})",
            path.display(),
            symbols.len()
        );

        Ok(Self { ctx, symbols, has_debug_info })
    }

    #[must_use]
    pub fn has_debug_info(&self) -> bool {
        self.has_debug_info
    }

    /// Visit the DWARF frames at `probe`, inline frames first
    ///
    /// Frames with neither a function name nor a file are skipped.
    ///
    /// # Errors
    /// Returns the DWARF error that interrupted the walk. Frames visited
    /// before the error were already reported.
    pub fn for_each_frame<F>(&self, probe: u64, mut visit: F) -> Result<(), gimli::Error>
    where
        F: FnMut(DebugFrame<'_>) -> ControlFlow<()>,
    {
        if !self.has_debug_info {
            return Ok(());
        }

        let mut frames = self.ctx.find_frames(probe).skip_all_loads()?;
        while let Some(frame) = frames.next()? {
            let function = frame.function.as_ref().and_then(|f| f.raw_name().ok());
            let (file, line) = match &frame.location {
                Some(loc) => (loc.file, loc.line.unwrap_or(0)),
                None => (None, 0),
            };
            if function.is_none() && file.is_none() {
                continue;
            }

            let frame = DebugFrame { function: function.as_deref(), file, line };
            if visit(frame).is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Symbol containing `probe`, with its start address
    ///
    /// Symbols without a recorded size claim everything up to the next one.
    #[must_use]
    pub fn symbol_at(&self, probe: u64) -> Option<&ElfSymbol> {
        let idx = match self.symbols.binary_search_by_key(&probe, |s| s.address) {
            Ok(idx) => idx,
            Err(0) => return None,
            Err(idx) => idx - 1,
        };
        let symbol = &self.symbols[idx];
        if symbol.size > 0 && probe >= symbol.address.saturating_add(symbol.size) {
            return None;
        }
        Some(symbol)
    }

    /// All text symbols, ordered by address
    pub fn symbols(&self) -> impl Iterator<Item = &ElfSymbol> {
        self.symbols.iter()
    }
}

fn collect_symbols(obj_file: &object::File<'_>) -> Vec<ElfSymbol> {
    let mut symbols: Vec<ElfSymbol> = obj_file
        .symbols()
        .filter_map(text_symbol)
        .collect();
    if symbols.is_empty() {
        symbols = obj_file.dynamic_symbols().filter_map(text_symbol).collect();
    }

    symbols.sort_by_key(|s| s.address);
    symbols.dedup_by_key(|s| s.address);
    symbols
}

fn text_symbol<'data, S: ObjectSymbol<'data>>(symbol: S) -> Option<ElfSymbol> {
    if symbol.kind() != SymbolKind::Text || symbol.address() == 0 {
        return None;
    }
    let name = symbol.name().ok().filter(|name| !name.is_empty())?;
    Some(ElfSymbol { name: name.to_string(), address: symbol.address(), size: symbol.size() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    fn symbolizer_with(symbols: Vec<ElfSymbol>) -> Symbolizer {
        let exe = std::env::current_exe().unwrap();
        let mut symbolizer = Symbolizer::new(exe).unwrap();
        symbolizer.symbols = symbols;
        symbolizer
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_symbol_at_respects_sizes() {
        let symbolizer = symbolizer_with(vec![
            ElfSymbol { name: "first".into(), address: 0x1000, size: 0x10 },
            ElfSymbol { name: "second".into(), address: 0x2000, size: 0 },
        ]);

        assert!(symbolizer.symbol_at(0xfff).is_none());
        assert_eq!(symbolizer.symbol_at(0x1000).unwrap().name, "first");
        assert_eq!(symbolizer.symbol_at(0x100f).unwrap().name, "first");
        assert!(symbolizer.symbol_at(0x1010).is_none());
        assert_eq!(symbolizer.symbol_at(0x2500).unwrap().name, "second");
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = Symbolizer::new("/nonexistent/callscope/binary").err().unwrap();
        assert!(matches!(err, SymbolizerError::Read { .. }));
    }
}
