//! Error taxonomy for the profiler
//!
//! Only symbol-provider lifecycle failures are meant to surface to callers.
//! Per-event and per-lookup failures are absorbed where they happen and end
//! up encoded in the returned data (placeholder text, skipped events).

use crate::event::FuncId;
use thiserror::Error;

/// Errors produced by the profiler and its symbol providers
#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("Failed to initialize symbol provider: {0}")]
    ProviderInit(String),

    #[error("Failed to shut down symbol provider: {0}")]
    ProviderShutdown(String),

    #[error("Symbol provider is already initialized")]
    AlreadyInitialized,

    #[error("Symbol provider is not initialized")]
    NotInitialized,

    #[error("Symbol lookup failed for {func}: {reason}")]
    SymbolLookup { func: FuncId, reason: String },

    #[error("Line lookup failed for {func}: {reason}")]
    LineLookup { func: FuncId, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProfilerError {
    /// Whether this error leaves the profiler unable to do anything useful
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProfilerError::ProviderInit(_) | ProfilerError::ProviderShutdown(_)
        )
    }

    /// Process exit status used when a fatal error terminates the process
    pub fn exit_code(&self) -> i32 {
        match self {
            ProfilerError::ProviderInit(_) => 70,
            ProfilerError::ProviderShutdown(_) => 71,
            _ => 1,
        }
    }
}

/// Result type for profiler operations
pub type Result<T> = std::result::Result<T, ProfilerError>;
