//! Backup and restore of the templates a run mutates.
//!
//! `LifecycleGuard` backs each template up to a sibling `<file>_` when the
//! run starts and moves the backups back when it is dropped. The same
//! restore runs from the Ctrl+C handler, so every exit path leaves the
//! checkout as it was.
//!
//! Edits to a guarded template go through [`TemplateBackup`] and hold its
//! lock, so a restore never interleaves with a half-finished rewrite.

use crate::error::BuildError;
use crate::patch::{self, Markers, Patched};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Sibling path a template is backed up to.
pub fn backup_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push("_");
    PathBuf::from(name)
}

/// Templates under backup plus the transient files a patch may leave.
#[derive(Debug)]
pub struct TemplateBackup {
    files: Vec<PathBuf>,
    transient: Vec<PathBuf>,
    lock: Mutex<()>,
    interrupted: AtomicBool,
}

impl TemplateBackup {
    pub fn new(files: Vec<PathBuf>, transient: Vec<PathBuf>) -> Self {
        Self {
            files,
            transient,
            lock: Mutex::new(()),
            interrupted: AtomicBool::new(false),
        }
    }

    fn hold(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flag the run as interrupted; later edits are refused.
    pub fn mark_interrupted(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Copy every template to its backup path.
    pub fn backup(&self) -> Result<(), BuildError> {
        let _held = self.hold();
        for file in &self.files {
            if !file.is_file() {
                return Err(BuildError::FileNotFound(file.clone()));
            }
            let backup = backup_path(file);
            fs::copy(file, &backup).map_err(|e| BuildError::write_failed(&backup, e))?;
            log::debug!("backed up {} -> {}", file.display(), backup.display());
        }
        Ok(())
    }

    /// Overwrite `file` with its pristine backup copy.
    pub fn reset(&self, file: &Path) -> Result<(), BuildError> {
        let _held = self.hold();
        self.check_editable(file)?;
        reset_from_backup(file)
    }

    /// Reset `file` from its backup, then replace its marker region.
    pub fn patch(&self, file: &Path, markers: Markers<'_>, block: &str) -> Result<Patched, BuildError> {
        let _held = self.hold();
        self.check_editable(file)?;
        reset_from_backup(file)?;
        patch::patch_file(file, markers, block)
    }

    /// Stamp `version` into `file` in place of `placeholder`.
    pub fn stamp(&self, file: &Path, placeholder: &str, version: &str) -> Result<usize, BuildError> {
        let _held = self.hold();
        self.check_editable(file)?;
        patch::stamp_version(file, placeholder, version)
    }

    /// An edit needs a backup to come back to and a run still going.
    fn check_editable(&self, file: &Path) -> Result<(), BuildError> {
        if self.is_interrupted() {
            return Err(BuildError::InterruptedByUser);
        }
        let backup = backup_path(file);
        if !backup.is_file() {
            return Err(BuildError::FileNotFound(backup));
        }
        Ok(())
    }

    /// Move backups back over the templates and drop transient files.
    ///
    /// Idempotent: once a backup is moved back there is nothing left to do,
    /// and a missing backup is not an error. Every file is attempted; the
    /// first failure is returned.
    pub fn restore(&self) -> Result<(), BuildError> {
        let _held = self.hold();
        let mut errors = Vec::new();

        for file in &self.files {
            let backup = backup_path(file);
            if !backup.exists() {
                continue;
            }
            match fs::rename(&backup, file) {
                Ok(()) => log::debug!("restored {}", file.display()),
                Err(e) => {
                    log::error!("failed to restore {}: {e}", file.display());
                    errors.push(BuildError::write_failed(file, e));
                }
            }
        }

        for path in &self.transient {
            match fs::remove_file(path) {
                Ok(()) => log::debug!("removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    log::error!("failed to remove {}: {e}", path.display());
                    errors.push(BuildError::write_failed(path, e));
                }
            }
        }

        errors.into_iter().next().map_or(Ok(()), Err)
    }
}

fn reset_from_backup(file: &Path) -> Result<(), BuildError> {
    fs::copy(backup_path(file), file).map_err(|e| BuildError::write_failed(file, e))?;
    Ok(())
}

/// Scoped owner of a [`TemplateBackup`]; restores on drop.
#[derive(Debug)]
pub struct LifecycleGuard {
    backup: Arc<TemplateBackup>,
}

impl LifecycleGuard {
    /// Recover leftovers of an interrupted earlier run, then back up.
    pub fn acquire(files: Vec<PathBuf>, transient: Vec<PathBuf>) -> Result<Self, BuildError> {
        let guard = Self {
            backup: Arc::new(TemplateBackup::new(files, transient)),
        };
        guard.backup.restore()?;
        // A partial backup is undone by the guard's drop.
        guard.backup.backup()?;
        Ok(guard)
    }

    /// Shared handle for the interrupt handler and for per-device resets.
    pub fn backup(&self) -> Arc<TemplateBackup> {
        Arc::clone(&self.backup)
    }

    /// Restore now and report the outcome instead of only logging it.
    pub fn release(self) -> Result<(), BuildError> {
        self.backup.restore()
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        if let Err(e) = self.backup.restore() {
            log::error!("template restore failed: {e}");
        }
    }
}

/// On Ctrl+C: restore templates and exit 1. The in-flight build is not
/// signalled; it gets the terminal's SIGINT itself.
pub fn install_interrupt_handler(backup: Arc<TemplateBackup>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        log::warn!("You pressed Ctrl+C! Restoring templates");
        backup.mark_interrupted();
        if let Err(e) = backup.restore() {
            log::error!("{e}");
        }
        std::process::exit(BuildError::InterruptedByUser.exit_code());
    })
}
