//! The redirection table: one immutable entry per tracked system function,
//! built fresh for every attach cycle and released on detach.

use std::ffi::c_void;
use std::sync::Arc;
use std::sync::atomic::AtomicPtr;

use super::RedirectError;
use super::targets::RedirectionTargets;

/// A registration triple for one tracked function: its export name, the
/// address of our trampoline, and the slot the trampoline calls through to
/// reach the original. The full list is data, iterated at table-build time.
pub struct HookDef {
    pub name: &'static str,
    pub replacement: *mut c_void,
    pub slot: &'static AtomicPtr<c_void>,
}

/// One intercepted function.
///
/// `original` is resolved once at table-build time and owned by the table for
/// the attached session; `replacement` is a compile-time constant. Entries are
/// immutable once built -- the table as a whole is rebuilt when redirection
/// targets change. An unresolvable export leaves `original` null; the engine
/// treats that as a fatal attach failure rather than patching a null target.
#[derive(Clone, Copy)]
pub struct RedirectionEntry {
    /// Display identifier, diagnostics only.
    pub name: &'static str,
    /// Address of the real system function.
    pub original: *mut c_void,
    /// Address of our trampoline for this function.
    pub replacement: *mut c_void,
    /// Receives the call-through address once the patch is committed.
    pub slot: &'static AtomicPtr<c_void>,
}

// The pointers are to process-global code, valid for the process lifetime.
unsafe impl Send for RedirectionEntry {}
unsafe impl Sync for RedirectionEntry {}

/// Resolves tracked export names to addresses in the loaded system module.
/// Returns null for exports that cannot be located.
pub trait SymbolResolver {
    fn resolve(&self, symbol: &str) -> *mut c_void;
}

/// The table for one attach cycle: the resolved entries plus the target paths
/// (and their cached encodings) they redirect to.
pub struct RedirectionTable {
    entries: Vec<RedirectionEntry>,
    targets: Arc<RedirectionTargets>,
}

impl RedirectionTable {
    pub fn build(
        targets: RedirectionTargets,
        defs: Vec<HookDef>,
        resolver: &dyn SymbolResolver,
    ) -> Self {
        let entries = defs
            .into_iter()
            .map(|def| RedirectionEntry {
                name: def.name,
                original: resolver.resolve(def.name),
                replacement: def.replacement,
                slot: def.slot,
            })
            .collect();

        RedirectionTable {
            entries,
            targets: Arc::new(targets),
        }
    }

    pub fn entries(&self) -> &[RedirectionEntry] {
        &self.entries
    }

    pub fn targets(&self) -> Arc<RedirectionTargets> {
        Arc::clone(&self.targets)
    }

    /// The first entry whose original address is unresolved, if any.
    pub fn unresolved(&self) -> Option<&RedirectionEntry> {
        self.entries.iter().find(|e| e.original.is_null())
    }
}

/// Builds the table for the current configuration; the engine calls this
/// lazily on first use after every release.
pub trait TableBuilder: Send {
    fn build(&self) -> Result<RedirectionTable, RedirectError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedirectionConfig;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::ptr;

    struct MapResolver(HashMap<&'static str, usize>);

    impl SymbolResolver for MapResolver {
        fn resolve(&self, symbol: &str) -> *mut c_void {
            self.0
                .get(symbol)
                .map(|&addr| addr as *mut c_void)
                .unwrap_or(ptr::null_mut())
        }
    }

    fn leaked_slot() -> &'static AtomicPtr<c_void> {
        Box::leak(Box::new(AtomicPtr::new(ptr::null_mut())))
    }

    fn targets() -> RedirectionTargets {
        RedirectionTargets::new(&RedirectionConfig {
            ini: PathBuf::from("C:\\E\\Enderal.ini"),
            prefs_ini: PathBuf::from("C:\\E\\EnderalPrefs.ini"),
            plugins: PathBuf::from("C:\\E\\plugins.txt"),
        })
    }

    fn defs() -> Vec<HookDef> {
        vec![
            HookDef {
                name: "CreateFileW",
                replacement: 0x2000 as *mut c_void,
                slot: leaked_slot(),
            },
            HookDef {
                name: "DeleteFileW",
                replacement: 0x2001 as *mut c_void,
                slot: leaked_slot(),
            },
        ]
    }

    #[test]
    fn build_resolves_every_entry() {
        let resolver = MapResolver(HashMap::from([
            ("CreateFileW", 0x1000usize),
            ("DeleteFileW", 0x1001usize),
        ]));
        let table = RedirectionTable::build(targets(), defs(), &resolver);

        assert_eq!(table.entries().len(), 2);
        assert_eq!(table.entries()[0].name, "CreateFileW");
        assert_eq!(table.entries()[0].original as usize, 0x1000);
        assert_eq!(table.entries()[1].original as usize, 0x1001);
        assert!(table.unresolved().is_none());
    }

    #[test]
    fn missing_export_leaves_null_original() {
        let resolver = MapResolver(HashMap::from([("CreateFileW", 0x1000usize)]));
        let table = RedirectionTable::build(targets(), defs(), &resolver);

        let unresolved = table.unresolved().expect("DeleteFileW is unresolved");
        assert_eq!(unresolved.name, "DeleteFileW");
        assert!(unresolved.original.is_null());
    }
}
