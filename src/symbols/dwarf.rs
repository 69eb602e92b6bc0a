//! DWARF-backed symbol provider for a binary on disk
//!
//! Maps function addresses to names and source file:line using the binary's
//! `.debug_info`/`.debug_line` sections. Addresses are translated by a load
//! bias, so identities captured from a relocated (PIE) process can be looked
//! up against the file.
//!
//! Uses addr2line crate for robust DWARF parsing

use super::{SourceLocation, SymbolProvider};
use crate::error::{ProfilerError, Result};
use crate::event::FuncId;
use anyhow::Context as _;
use object::{Object, ObjectSection};
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};

type DwarfReader = gimli::EndianArcSlice<gimli::RunTimeEndian>;

/// DWARF debug info context for a binary
pub struct DwarfProvider {
    /// addr2line context for DWARF lookups
    context: Mutex<addr2line::Context<DwarfReader>>,
    /// Subtracted from every identity before lookup
    bias: u64,
}

impl std::fmt::Debug for DwarfProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DwarfProvider")
            .field("bias", &format_args!("0x{:x}", self.bias))
            .finish_non_exhaustive()
    }
}

impl DwarfProvider {
    /// Load DWARF debug info from an ELF binary
    pub fn load(binary_path: &Path, bias: u64) -> anyhow::Result<Self> {
        if !binary_path.exists() {
            anyhow::bail!("Binary does not exist: {}", binary_path.display());
        }

        let file = File::open(binary_path)
            .with_context(|| format!("Failed to open binary: {}", binary_path.display()))?;

        // SAFETY: the mapping is only read while parsing; section data is
        // copied out before the map is dropped.
        let mmap = unsafe { memmap2::Mmap::map(&file) }.context("Failed to memory-map binary")?;

        let object = object::File::parse(&*mmap).context("Failed to parse binary")?;

        let endian = if object.is_little_endian() {
            gimli::RunTimeEndian::Little
        } else {
            gimli::RunTimeEndian::Big
        };

        let load_section = |id: gimli::SectionId| -> std::result::Result<DwarfReader, gimli::Error> {
            let data = object
                .section_by_name(id.name())
                .and_then(|section| section.uncompressed_data().ok())
                .unwrap_or(std::borrow::Cow::Borrowed(&[][..]));
            let bytes: Arc<[u8]> = Arc::from(data.into_owned());
            Ok(gimli::EndianArcSlice::new(bytes, endian))
        };

        let dwarf = gimli::Dwarf::load(&load_section).context(
            "Failed to load DWARF sections - binary may not have debug symbols. Compile with -g flag.",
        )?;

        let context =
            addr2line::Context::from_dwarf(dwarf).context("Failed to create DWARF context")?;

        Ok(Self {
            context: Mutex::new(context),
            bias,
        })
    }

    /// Like [`DwarfProvider::load`], reporting failure as a provider
    /// initialization error
    pub fn open(binary_path: &Path, bias: u64) -> Result<Self> {
        Self::load(binary_path, bias).map_err(|e| ProfilerError::ProviderInit(format!("{:#}", e)))
    }

    pub fn bias(&self) -> u64 {
        self.bias
    }

    fn probe(&self, func: FuncId) -> u64 {
        func.as_u64().wrapping_sub(self.bias)
    }
}

impl SymbolProvider for DwarfProvider {
    fn symbol_name(&self, func: FuncId) -> Result<String> {
        let context = self.context.lock().unwrap_or_else(|e| e.into_inner());
        let not_found = |reason: &str| ProfilerError::SymbolLookup {
            func,
            reason: reason.to_string(),
        };

        let mut frames = context
            .find_frames(self.probe(func))
            .skip_all_loads()
            .map_err(|e| not_found(&e.to_string()))?;

        // The last frame is the outermost, non-inlined function
        let mut name = None;
        while let Ok(Some(frame)) = frames.next() {
            if let Some(function) = frame.function {
                if let Ok(raw) = function.raw_name() {
                    name = Some(raw.to_string());
                }
            }
        }
        name.ok_or_else(|| not_found("no DWARF subprogram at address"))
    }

    fn source_location(&self, func: FuncId) -> Result<SourceLocation> {
        let context = self.context.lock().unwrap_or_else(|e| e.into_inner());
        let location = context
            .find_location(self.probe(func))
            .map_err(|e| ProfilerError::LineLookup {
                func,
                reason: e.to_string(),
            })?;

        let location = location.ok_or_else(|| ProfilerError::LineLookup {
            func,
            reason: "no line information at address".to_string(),
        })?;
        match (location.file, location.line) {
            (Some(file), Some(line)) if line != 0 => Ok(SourceLocation {
                file: file.to_string(),
                line,
            }),
            _ => Err(ProfilerError::LineLookup {
                func,
                reason: "incomplete line information at address".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::ObjectSymbol;
    use std::fs;
    use std::process::Command;
    use tempfile::TempDir;

    fn compile_test_binary() -> (TempDir, std::path::PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let src_file = temp_dir.path().join("test.rs");
        let bin_file = temp_dir.path().join("test_bin");

        fs::write(
            &src_file,
            "#[inline(never)]\nfn compute() -> u32 { 42 }\nfn main() { println!(\"{}\", compute()); }\n",
        )
        .unwrap();

        Command::new("rustc")
            .arg(&src_file)
            .arg("-o")
            .arg(&bin_file)
            .arg("-g")
            .status()
            .unwrap();

        (temp_dir, bin_file)
    }

    fn symbol_address(binary: &Path, needle: &str) -> u64 {
        let data = fs::read(binary).unwrap();
        let object = object::File::parse(&*data).unwrap();
        object
            .symbols()
            .find(|s| s.name().map(|n| n.contains(needle)).unwrap_or(false))
            .map(|s| s.address())
            .unwrap()
    }

    #[test]
    fn test_dwarf_provider_loads() {
        let (_temp_dir, bin_file) = compile_test_binary();
        let result = DwarfProvider::load(&bin_file, 0);
        assert!(result.is_ok(), "Should load DWARF context: {:?}", result.err());
    }

    #[test]
    fn test_missing_binary_is_init_error() {
        let err = DwarfProvider::open(Path::new("/nonexistent/binary"), 0).unwrap_err();
        assert!(matches!(err, ProfilerError::ProviderInit(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_resolves_function_and_line() {
        let (_temp_dir, bin_file) = compile_test_binary();
        let provider = DwarfProvider::load(&bin_file, 0).unwrap();
        let func = FuncId::new(symbol_address(&bin_file, "7compute"));

        let name = provider.symbol_name(func).unwrap();
        assert!(name.contains("compute"), "name: {}", name);

        let location = provider.source_location(func).unwrap();
        assert!(location.file.ends_with("test.rs"), "file: {}", location.file);
        assert_eq!(location.line, 2);
    }

    #[test]
    fn test_bias_is_subtracted() {
        let (_temp_dir, bin_file) = compile_test_binary();
        let bias = 0x5555_0000_0000;
        let provider = DwarfProvider::load(&bin_file, bias).unwrap();
        let func = FuncId::new(symbol_address(&bin_file, "7compute") + bias);
        assert!(provider.symbol_name(func).unwrap().contains("compute"));
    }

    #[test]
    fn test_unknown_address_fails_softly() {
        let (_temp_dir, bin_file) = compile_test_binary();
        let provider = DwarfProvider::load(&bin_file, 0).unwrap();
        assert!(provider.symbol_name(FuncId::new(0x10)).is_err());
        assert!(provider.source_location(FuncId::new(0x10)).is_err());
    }
}
