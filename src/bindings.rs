//! Which program a target path resolves to while tests run.
//!
//! Test modules never see a mutant directly. They import the target from its
//! path in the sandbox; each path is a slot in the registry and the controller
//! swaps the slot contents for one mutant at a time.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

#[derive(Debug)]
struct Slot {
    path: PathBuf,
    original: String,
    active: Option<usize>,
}

#[derive(Debug, Default)]
pub struct BindingRegistry {
    slots: Mutex<Vec<Slot>>,
}

/// Held for as long as a mutant's binding is in use. Only one can exist.
pub struct ActiveBinding<'r> {
    _slots: MutexGuard<'r, Vec<Slot>>,
    pub slot: SlotId,
    pub mutant: usize,
}

/// Puts the original program back into a slot when dropped.
pub struct RestoreGuard {
    registry: Arc<BindingRegistry>,
    slot: SlotId,
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        if let Err(e) = self.registry.restore(self.slot) {
            tracing::error!(slot = self.slot.0, error = %e, "failed to restore original target");
        }
    }
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a target path, or return the slot it already has.
    pub fn register(&self, path: &Path, original: &str) -> SlotId {
        let mut slots = self.lock();
        if let Some(i) = slots.iter().position(|s| s.path == path) {
            return SlotId(i);
        }
        slots.push(Slot {
            path: path.to_path_buf(),
            original: original.to_string(),
            active: None,
        });
        SlotId(slots.len() - 1)
    }

    /// Point `slot` at `text`. Any other slot still bound is restored first.
    pub fn bind(&self, slot: SlotId, text: &str, mutant: usize) -> std::io::Result<ActiveBinding<'_>> {
        let mut slots = self.lock();
        for (i, other) in slots.iter_mut().enumerate() {
            if i != slot.0 && other.active.is_some() {
                write_source(&other.path, &other.original)?;
                other.active = None;
            }
        }
        let target = slots
            .get_mut(slot.0)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "unknown binding slot"))?;
        write_source(&target.path, text)?;
        target.active = Some(mutant);
        Ok(ActiveBinding {
            _slots: slots,
            slot,
            mutant,
        })
    }

    pub fn restore(&self, slot: SlotId) -> std::io::Result<()> {
        let mut slots = self.lock();
        let Some(target) = slots.get_mut(slot.0) else {
            return Ok(());
        };
        if target.active.take().is_some() {
            write_source(&target.path, &target.original)?;
        }
        Ok(())
    }

    /// Mutant currently bound to `slot`, if any.
    pub fn active(&self, slot: SlotId) -> Option<usize> {
        self.lock().get(slot.0).and_then(|s| s.active)
    }

    pub fn restore_on_drop(self: &Arc<Self>, slot: SlotId) -> RestoreGuard {
        RestoreGuard {
            registry: Arc::clone(self),
            slot,
        }
    }
}

fn write_source(path: &Path, text: &str) -> std::io::Result<()> {
    std::fs::write(path, text)?;
    clear_pycache(path);
    Ok(())
}

/// Remove stale `__pycache__` entries so Python re-reads the source.
fn clear_pycache(source_file: &Path) {
    let (Some(parent), Some(stem)) = (source_file.parent(), source_file.file_stem()) else {
        return;
    };
    let Ok(entries) = std::fs::read_dir(parent.join("__pycache__")) else {
        return;
    };
    let stem = stem.to_string_lossy();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&*stem) && name.ends_with(".pyc") {
            let _ = std::fs::remove_file(entry.path());
        }
    }
}
