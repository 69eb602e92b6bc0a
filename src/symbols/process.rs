//! In-process symbol provider
//!
//! Resolves identities that are live code addresses of the running process,
//! using the `backtrace` crate's symbolizer (which accounts for ASLR).

use super::{SourceLocation, SymbolProvider};
use crate::error::{ProfilerError, Result};
use crate::event::FuncId;
use std::ffi::c_void;

/// Provider for entry addresses in the current process
#[derive(Debug)]
pub struct ProcessProvider {
    _private: (),
}

impl ProcessProvider {
    /// Check that the running executable carries usable symbols
    pub fn new() -> Result<Self> {
        std::env::current_exe()
            .map_err(|e| ProfilerError::ProviderInit(format!("cannot locate executable: {}", e)))?;

        let provider = Self { _private: () };
        let probe = FuncId::from_addr(ProcessProvider::new as usize);
        provider.symbol_name(probe).map_err(|_| {
            ProfilerError::ProviderInit(
                "no symbols available for the running executable".to_string(),
            )
        })?;
        Ok(provider)
    }
}

fn resolve_first<T>(func: FuncId, mut pick: impl FnMut(&backtrace::Symbol) -> Option<T>) -> Option<T> {
    let mut found = None;
    backtrace::resolve(func.as_u64() as usize as *mut c_void, |symbol| {
        if found.is_none() {
            found = pick(symbol);
        }
    });
    found
}

impl SymbolProvider for ProcessProvider {
    fn symbol_name(&self, func: FuncId) -> Result<String> {
        resolve_first(func, |symbol| {
            symbol
                .name()
                .map(|name| String::from_utf8_lossy(name.as_bytes()).into_owned())
        })
        .ok_or(ProfilerError::SymbolLookup {
            func,
            reason: "no symbol at address".to_string(),
        })
    }

    fn source_location(&self, func: FuncId) -> Result<SourceLocation> {
        resolve_first(func, |symbol| {
            let file = symbol.filename()?;
            let line = symbol.lineno()?;
            Some(SourceLocation {
                file: file.display().to_string(),
                line,
            })
        })
        .ok_or(ProfilerError::LineLookup {
            func,
            reason: "no line information at address".to_string(),
        })
    }
}
