//! Function identities assigned by registration
//!
//! Instead of relying on raw code addresses, a call site can register its
//! name and location once and receive a stable [`FuncId`]. Identities are
//! handed out monotonically and carry [`FuncId::REGISTERED_TAG`], so they
//! never collide with addresses and resolve without a symbol provider.

use crate::error::{ProfilerError, Result};
use crate::event::FuncId;
use crate::symbols::{FunctionDescriptor, SourceLocation, SymbolProvider};
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

#[derive(Debug, Clone)]
struct Registered {
    name: String,
    file: String,
    line: u32,
}

#[derive(Debug, Default)]
struct Registry {
    entries: Vec<Registered>,
    index: HashMap<(String, String, u32), FuncId>,
}

fn registry() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Registry::default()))
}

/// Register a function and return its identity
///
/// Registering the same name/file/line again returns the same identity.
pub fn register(name: impl Into<String>, file: impl Into<String>, line: u32) -> FuncId {
    let key = (name.into(), file.into(), line);
    let mut registry = registry().write().unwrap_or_else(|e| e.into_inner());
    if let Some(&func) = registry.index.get(&key) {
        return func;
    }

    let func = FuncId::new(FuncId::REGISTERED_TAG | registry.entries.len() as u64);
    registry.entries.push(Registered {
        name: key.0.clone(),
        file: key.1.clone(),
        line,
    });
    registry.index.insert(key, func);
    func
}

fn lookup(func: FuncId) -> Option<Registered> {
    if !func.is_registered() {
        return None;
    }
    let slot = (func.as_u64() & !FuncId::REGISTERED_TAG) as usize;
    registry()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .entries
        .get(slot)
        .cloned()
}

/// Descriptor of a registered identity
pub fn descriptor(func: FuncId) -> Option<FunctionDescriptor> {
    lookup(func).map(|entry| FunctionDescriptor {
        func,
        raw_name: entry.name.clone(),
        name: entry.name,
        file: entry.file,
        line: entry.line,
    })
}

/// Number of registered functions
pub fn len() -> usize {
    registry()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .entries
        .len()
}

/// Provider answering only from the registry
///
/// Useful as the process-wide provider when every traced function is
/// registered rather than identified by address.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryProvider;

impl SymbolProvider for RegistryProvider {
    fn symbol_name(&self, func: FuncId) -> Result<String> {
        lookup(func)
            .map(|entry| entry.name)
            .ok_or(ProfilerError::SymbolLookup {
                func,
                reason: "unregistered identity".to_string(),
            })
    }

    fn source_location(&self, func: FuncId) -> Result<SourceLocation> {
        lookup(func)
            .map(|entry| SourceLocation {
                file: entry.file,
                line: entry.line,
            })
            .ok_or(ProfilerError::LineLookup {
                func,
                reason: "unregistered identity".to_string(),
            })
    }
}

/// Profile the rest of the enclosing block under a registered identity
///
/// The identity is registered on first execution of the call site; the
/// scope's Exit fires when the block is left, including early returns and
/// unwinding.
///
/// ```
/// fn tick() {
///     hookprof::profile_scope!("tick");
///     // ...
/// }
/// # tick();
/// ```
#[macro_export]
macro_rules! profile_scope {
    ($name:expr) => {
        let _hookprof_scope = {
            static FUNC: ::std::sync::OnceLock<$crate::FuncId> = ::std::sync::OnceLock::new();
            $crate::hooks::scope(*FUNC.get_or_init(|| {
                $crate::registry::register($name, ::std::file!(), ::std::line!())
            }))
        };
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_ids_are_tagged_and_distinct() {
        let a = register("registry_test_a", "a.rs", 1);
        let b = register("registry_test_b", "b.rs", 2);
        assert!(a.is_registered());
        assert!(b.is_registered());
        assert_ne!(a, b);
    }

    #[test]
    fn test_register_is_idempotent() {
        let first = register("registry_test_same", "same.rs", 10);
        let again = register("registry_test_same", "same.rs", 10);
        assert_eq!(first, again);
    }

    #[test]
    fn test_descriptor_round_trip() {
        let func = register("registry_test_desc", "desc.rs", 42);
        let d = descriptor(func).unwrap();
        assert_eq!(d.func, func);
        assert_eq!(d.name, "registry_test_desc");
        assert_eq!(d.file, "desc.rs");
        assert_eq!(d.line, 42);
        assert!(len() >= 1);
    }

    #[test]
    fn test_unknown_ids() {
        assert!(descriptor(FuncId::new(0x1234)).is_none());
        let far = FuncId::new(FuncId::REGISTERED_TAG | (u32::MAX as u64));
        assert!(descriptor(far).is_none());
        assert!(RegistryProvider.symbol_name(far).is_err());
        assert!(RegistryProvider.source_location(far).is_err());
    }
}
