//! Symbol resolution: function identity → human-readable descriptor
//!
//! A process-wide [`SymbolProvider`] is installed once with [`initialize`] and
//! removed with [`shutdown`]. Each thread keeps its own [`SymbolCache`] (the
//! info table), so a given identity pays the provider cost at most once per
//! thread, including when the lookup fails.
//!
//! Lookup failures never abort: the descriptor carries a placeholder in the
//! affected field and is cached like any other. Provider lifecycle failures
//! are fatal and go through [`fatal`].

pub mod dwarf;
pub mod process;

use crate::error::{ProfilerError, Result};
use crate::event::FuncId;
use crate::registry;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

pub use dwarf::DwarfProvider;
pub use process::ProcessProvider;

/// Resolved metadata for a function identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub func: FuncId,
    /// Undecorated display name
    pub name: String,
    /// Name as reported by the provider
    pub raw_name: String,
    pub file: String,
    /// Source line, 0 when unknown
    pub line: u32,
}

impl FunctionDescriptor {
    /// Descriptor whose every field explains why it is missing
    pub fn unresolved(func: FuncId, reason: &str) -> Self {
        Self {
            func,
            name: name_placeholder(reason),
            raw_name: name_placeholder(reason),
            file: line_placeholder(reason),
            line: 0,
        }
    }
}

/// Source file and line of a function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

/// Debug-symbol oracle consulted on cache misses
///
/// Implementations must be cheap to share between threads; lookups happen
/// only on the cold path.
pub trait SymbolProvider: Send + Sync {
    /// Raw (possibly decorated) name of the function at `func`
    fn symbol_name(&self, func: FuncId) -> Result<String>;

    /// Source location of the function at `func`
    fn source_location(&self, func: FuncId) -> Result<SourceLocation>;

    /// Release provider resources
    fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

type ErrorCallback = Arc<dyn Fn(&ProfilerError) + Send + Sync>;

static PROVIDER: RwLock<Option<Arc<dyn SymbolProvider>>> = RwLock::new(None);
static ERROR_CALLBACK: RwLock<Option<ErrorCallback>> = RwLock::new(None);

/// Install the process-wide symbol provider
pub fn initialize<P: SymbolProvider + 'static>(provider: P) -> Result<()> {
    let mut slot = PROVIDER.write().unwrap_or_else(|e| e.into_inner());
    if slot.is_some() {
        return Err(ProfilerError::AlreadyInitialized);
    }
    *slot = Some(Arc::new(provider));
    info!("symbol provider initialized");
    Ok(())
}

/// Install a provider built by the host, terminating the process if it could
/// not be constructed or installed
pub fn initialize_or_exit<P: SymbolProvider + 'static>(provider: Result<P>) {
    match provider.and_then(|p| initialize(p)) {
        Ok(()) => {}
        Err(ProfilerError::AlreadyInitialized) => {
            warn!("symbol provider already initialized, keeping the existing one")
        }
        Err(err) => fatal(err),
    }
}

/// Remove the process-wide provider and release its resources
pub fn shutdown() -> Result<()> {
    let provider = PROVIDER
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .take()
        .ok_or(ProfilerError::NotInitialized)?;
    provider
        .shutdown()
        .map_err(|e| ProfilerError::ProviderShutdown(e.to_string()))?;
    info!("symbol provider shut down");
    Ok(())
}

pub fn is_initialized() -> bool {
    PROVIDER.read().unwrap_or_else(|e| e.into_inner()).is_some()
}

fn current_provider() -> Option<Arc<dyn SymbolProvider>> {
    PROVIDER.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Register the process-wide error callback
pub fn on_error<F>(callback: F)
where
    F: Fn(&ProfilerError) + Send + Sync + 'static,
{
    *ERROR_CALLBACK.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(callback));
}

/// Remove the process-wide error callback
pub fn clear_on_error() {
    *ERROR_CALLBACK.write().unwrap_or_else(|e| e.into_inner()) = None;
}

/// Hand `err` to the error callback, if any
pub fn report_error(err: &ProfilerError) {
    let callback = ERROR_CALLBACK
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone();
    if let Some(callback) = callback {
        callback(err);
    }
}

/// Report an unrecoverable error and terminate the process
pub fn fatal(err: ProfilerError) -> ! {
    report_error(&err);
    error!("fatal profiler error: {}", err);
    eprintln!("Profiling error: {}", err);
    std::process::exit(err.exit_code())
}

/// Demangle a Rust symbol into its display form; other names pass through
pub fn undecorate(raw: &str) -> String {
    match rustc_demangle::try_demangle(raw) {
        Ok(demangled) => format!("{:#}", demangled),
        Err(_) => raw.to_string(),
    }
}

fn name_placeholder(reason: &str) -> String {
    format!("symbol resolution failed ({})", reason)
}

fn line_placeholder(reason: &str) -> String {
    format!("line resolution failed ({})", reason)
}

/// Build a descriptor by asking `provider`, substituting placeholders for
/// whatever it cannot answer
pub fn describe(func: FuncId, provider: &dyn SymbolProvider) -> FunctionDescriptor {
    let (name, raw_name) = match provider.symbol_name(func) {
        Ok(raw) => (undecorate(&raw), raw),
        Err(err) => {
            warn!("{}", err);
            report_error(&err);
            let text = name_placeholder(&lookup_reason(&err));
            (text.clone(), text)
        }
    };

    let (file, line) = match provider.source_location(func) {
        Ok(location) => (location.file, location.line),
        Err(err) => {
            warn!("{}", err);
            report_error(&err);
            (line_placeholder(&lookup_reason(&err)), 0)
        }
    };

    FunctionDescriptor {
        func,
        name,
        raw_name,
        file,
        line,
    }
}

fn lookup_reason(err: &ProfilerError) -> String {
    match err {
        ProfilerError::SymbolLookup { reason, .. } | ProfilerError::LineLookup { reason, .. } => {
            reason.clone()
        }
        other => other.to_string(),
    }
}

/// Per-thread info table
///
/// Resolves through the registry for registered identities, otherwise
/// through its own provider if one was given, otherwise through the
/// process-wide provider. A tagged identity the registry does not know goes
/// to the provider like any other.
#[derive(Default)]
pub struct SymbolCache {
    entries: FnvHashMap<FuncId, Arc<FunctionDescriptor>>,
    provider: Option<Arc<dyn SymbolProvider>>,
}

impl std::fmt::Debug for SymbolCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolCache")
            .field("entries", &self.entries.len())
            .field("own_provider", &self.provider.is_some())
            .finish()
    }
}

impl SymbolCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache that bypasses the process-wide provider
    pub fn with_provider(provider: Arc<dyn SymbolProvider>) -> Self {
        Self {
            entries: FnvHashMap::default(),
            provider: Some(provider),
        }
    }

    /// Descriptor for `func`, resolving and caching it on first use
    pub fn resolve(&mut self, func: FuncId) -> Arc<FunctionDescriptor> {
        if let Some(found) = self.entries.get(&func) {
            return Arc::clone(found);
        }

        let (descriptor, cacheable) = self.lookup(func);
        let descriptor = Arc::new(descriptor);
        if cacheable {
            self.entries.insert(func, Arc::clone(&descriptor));
        }
        descriptor
    }

    fn lookup(&self, func: FuncId) -> (FunctionDescriptor, bool) {
        if let Some(descriptor) = registry::descriptor(func) {
            return (descriptor, true);
        }

        match self.provider.clone().or_else(current_provider) {
            Some(provider) => (describe(func, provider.as_ref()), true),
            None => {
                // Not cached, so a provider installed later still takes effect
                report_error(&ProfilerError::NotInitialized);
                (
                    FunctionDescriptor::unresolved(func, "symbol provider not initialized"),
                    false,
                )
            }
        }
    }

    /// Cached descriptor, without resolving
    pub fn get(&self, func: FuncId) -> Option<&Arc<FunctionDescriptor>> {
        self.entries.get(&func)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FuncId, &Arc<FunctionDescriptor>)> {
        self.entries.iter().map(|(func, d)| (*func, d))
    }
}
