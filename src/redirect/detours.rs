//! The Windows patch backend, built on inline detours.
//!
//! `retour` rewrites the target's prologue and hands back a trampoline that
//! reaches the original code. Commit ordering matters: each entry's
//! call-through slot is published *before* its patch is enabled, so a host
//! thread can never enter a trampoline whose slot is stale. A failed enable
//! rolls back everything enabled in the same transaction, which keeps commit
//! all-or-nothing.

use std::ffi::c_void;
use std::sync::atomic::Ordering;

use retour::RawDetour;

use super::backend::{PatchBackend, PatchError};
use super::table::RedirectionEntry;

enum PendingOp {
    Install(RedirectionEntry),
    Remove(RedirectionEntry),
}

/// Patch backend state: the queued transaction plus the live detours keyed by
/// the original function address.
pub struct RetourBackend {
    in_transaction: bool,
    pending: Vec<PendingOp>,
    active: Vec<(usize, RawDetour)>,
}

impl RetourBackend {
    pub fn new() -> Self {
        RetourBackend {
            in_transaction: false,
            pending: Vec::new(),
            active: Vec::new(),
        }
    }

    fn rollback(&mut self, enabled: &[RedirectionEntry]) {
        for entry in enabled {
            if let Some(i) = self
                .active
                .iter()
                .position(|(addr, _)| *addr == entry.original as usize)
            {
                let (_, detour) = self.active.remove(i);
                let _ = unsafe { detour.disable() };
            }
        }
    }
}

impl Default for RetourBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchBackend for RetourBackend {
    fn begin(&mut self) -> Result<(), PatchError> {
        if self.in_transaction {
            return Err(PatchError::TransactionInProgress);
        }
        self.in_transaction = true;
        self.pending.clear();
        Ok(())
    }

    fn install(&mut self, entry: &RedirectionEntry) -> Result<(), PatchError> {
        if !self.in_transaction {
            return Err(PatchError::NoTransaction);
        }
        self.pending.push(PendingOp::Install(*entry));
        Ok(())
    }

    fn remove(&mut self, entry: &RedirectionEntry) -> Result<(), PatchError> {
        if !self.in_transaction {
            return Err(PatchError::NoTransaction);
        }
        if !self
            .active
            .iter()
            .any(|(addr, _)| *addr == entry.original as usize)
        {
            return Err(PatchError::NotPatched(entry.name));
        }
        self.pending.push(PendingOp::Remove(*entry));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), PatchError> {
        if !self.in_transaction {
            return Err(PatchError::NoTransaction);
        }
        self.in_transaction = false;
        let ops = std::mem::take(&mut self.pending);

        let mut enabled: Vec<RedirectionEntry> = Vec::new();
        for op in ops {
            match op {
                PendingOp::Install(entry) => {
                    let detour = match unsafe {
                        RawDetour::new(entry.original as *const (), entry.replacement as *const ())
                    } {
                        Ok(detour) => detour,
                        Err(err) => {
                            self.rollback(&enabled);
                            return Err(PatchError::Commit(format!("{}: {err}", entry.name)));
                        }
                    };

                    let trampoline: *const () = detour.trampoline();
                    entry
                        .slot
                        .store(trampoline as *mut c_void, Ordering::Release);

                    if let Err(err) = unsafe { detour.enable() } {
                        self.rollback(&enabled);
                        return Err(PatchError::Commit(format!("{}: {err}", entry.name)));
                    }

                    self.active.push((entry.original as usize, detour));
                    enabled.push(entry);
                }
                PendingOp::Remove(entry) => {
                    let Some(i) = self
                        .active
                        .iter()
                        .position(|(addr, _)| *addr == entry.original as usize)
                    else {
                        return Err(PatchError::NotPatched(entry.name));
                    };

                    let (_, detour) = self.active.remove(i);
                    if let Err(err) = unsafe { detour.disable() } {
                        return Err(PatchError::Commit(format!("{}: {err}", entry.name)));
                    }
                    entry.slot.store(entry.original, Ordering::Release);
                }
            }
        }

        Ok(())
    }
}
