//! Path redirection core: the interception engine and its collaborators.
//!
//! The engine is a two-state machine (detached / attached) driven once each
//! from the host's load and unload lifecycle callbacks. Attaching builds the
//! redirection table from current configuration, then installs a trampoline
//! for every tracked function under a single all-or-nothing patch
//! transaction; detaching reverses the patches and releases the table so the
//! next attach observes fresh configuration.

pub mod backend;
pub mod matcher;
pub mod table;
pub mod targets;

#[cfg(windows)]
pub mod detours;
#[cfg(windows)]
pub mod hooks;

use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use thiserror::Error;

pub use backend::{PatchBackend, PatchError};
pub use matcher::PathRef;
pub use table::{HookDef, RedirectionEntry, RedirectionTable, SymbolResolver, TableBuilder};
pub use targets::{RedirectionTargets, TRACKED_FILES};

/// Errors surfaced by attach and detach. All of them are terminal at the
/// transition where they occur; there is no retry logic anywhere in the core.
#[derive(Debug, Error)]
pub enum RedirectError {
    #[error("kernel32.dll is not loaded in this process")]
    SystemModuleNotFound,

    #[error("could not resolve the address of {0}")]
    Unresolved(&'static str),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// The interception engine.
///
/// Owns the attachment state, the lazily built redirection table, and the
/// patch backend. Both transitions are idempotent: a redundant attach or
/// detach logs a warning and reports success.
pub struct Redirector<B, T> {
    backend: B,
    builder: T,
    table: Option<RedirectionTable>,
    attached: bool,
}

impl<B: PatchBackend, T: TableBuilder> Redirector<B, T> {
    pub fn new(backend: B, builder: T) -> Self {
        Redirector {
            backend,
            builder,
            table: None,
            attached: false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// The current table, building it from current configuration on first
    /// use after a release.
    pub fn table(&mut self) -> Result<&RedirectionTable, RedirectError> {
        if self.table.is_none() {
            self.table = Some(self.builder.build()?);
        }
        Ok(self.table.as_ref().expect("table built above"))
    }

    /// Installs every trampoline under one patch transaction.
    ///
    /// On success the engine is attached and the active targets are returned
    /// for publication to the trampolines. On any failure -- an unresolved
    /// export, or a commit that does not go through -- no patch is left
    /// installed and the engine stays detached.
    pub fn attach(&mut self) -> Result<Arc<RedirectionTargets>, RedirectError> {
        if self.attached {
            warn!("tried to attach redirections, but we are already attached; ignoring");
            return Ok(self.table()?.targets());
        }

        debug!("attaching all redirections");
        self.table()?;
        let (entries, targets) = match &self.table {
            Some(table) => (table.entries().to_vec(), table.targets()),
            None => unreachable!("table built above"),
        };

        if let Some(entry) = entries.iter().find(|e| e.original.is_null()) {
            error!("could not resolve {}, plugin failed to load", entry.name);
            return Err(RedirectError::Unresolved(entry.name));
        }

        self.backend.begin()?;
        for entry in &entries {
            self.backend.install(entry)?;
            trace!("attached {}", entry.name);
        }

        if let Err(err) = self.backend.commit() {
            error!("unable to attach redirections, plugin failed to load: {err}");
            return Err(err.into());
        }

        self.attached = true;
        info!("redirections attached successfully, plugin loaded");
        Ok(targets)
    }

    /// Removes every trampoline under one patch transaction and releases the
    /// table and its cached path mirrors.
    ///
    /// A commit failure here is terminal: the hosting module is unloading
    /// regardless, so the failure is reported but resources are released and
    /// the state still transitions to detached.
    pub fn detach(&mut self) -> Result<(), RedirectError> {
        if !self.attached {
            warn!("tried to detach redirections, but we are already detached; ignoring");
            return Ok(());
        }

        debug!("detaching all redirections");
        let entries: Vec<RedirectionEntry> = match &self.table {
            Some(table) => table.entries().to_vec(),
            None => Vec::new(),
        };

        self.backend.begin()?;
        for entry in &entries {
            self.backend.remove(entry)?;
            trace!("detached {}", entry.name);
        }

        let result = self.backend.commit();
        self.table = None;
        self.attached = false;

        if let Err(err) = result {
            error!("unable to detach redirections, plugin failed to unload: {err}");
            return Err(err.into());
        }

        info!("redirections detached successfully, plugin unloaded");
        Ok(())
    }
}
