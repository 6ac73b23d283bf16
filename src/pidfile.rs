//! Single-line PID file whose lifetime tracks the process.
//!
//! Ownership is a single atomic pointer to a leaked, NUL-terminated copy of
//! the path. Whoever swaps it to null owns the removal, which lets the
//! signal handler unlink the file with nothing but an atomic swap and
//! `unlink(2)`, and guarantees the normal and emergency paths never both
//! remove it.

use std::ffi::{CString, OsStr, c_char};
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use log::{error, info};

use crate::error::PidFileError;

static PID_FILE: PidFileManager = PidFileManager::new();

/// The process-wide PID file record, shared with the signal handler.
pub fn global() -> &'static PidFileManager {
    &PID_FILE
}

/// Creates and removes the process's PID file.
pub struct PidFileManager {
    owned: AtomicPtr<c_char>,
}

impl PidFileManager {
    pub const fn new() -> Self {
        Self {
            owned: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Write the current process id followed by a newline to `path`.
    ///
    /// An empty path means no PID file was requested and succeeds without
    /// touching the filesystem.
    pub fn create(&self, path: impl AsRef<Path>) -> Result<(), PidFileError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Ok(());
        }

        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
            PidFileError::InvalidPath {
                path: path.to_path_buf(),
            }
        })?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| PidFileError::Create {
                path: path.to_path_buf(),
                source,
            })?;

        let pid = std::process::id();
        writeln!(file, "{pid}")
            .and_then(|()| file.flush())
            .and_then(|()| file.sync_all())
            .map_err(|source| PidFileError::Write {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Created PID file: {} with PID: {pid}", path.display());

        // Ownership is only published here. A second signal landing between
        // the write above and this swap exits without unlinking the file.
        let previous = self.owned.swap(c_path.into_raw(), Ordering::AcqRel);
        if !previous.is_null() {
            // SAFETY: every non-null pointer stored here came from
            // `CString::into_raw`, and the swap made us its only holder.
            drop(unsafe { CString::from_raw(previous) });
        }
        Ok(())
    }

    /// Whether a PID file is currently owned by this process.
    pub fn is_owned(&self) -> bool {
        !self.owned.load(Ordering::Acquire).is_null()
    }

    /// Unlink the owned PID file and log the outcome.
    ///
    /// Ownership is released whether or not the unlink succeeds. Not for use
    /// from a signal handler.
    pub fn remove_normal(&self) {
        let raw = self.owned.swap(ptr::null_mut(), Ordering::AcqRel);
        if raw.is_null() {
            return;
        }

        // SAFETY: see `create`; the swap transferred ownership to us.
        let c_path = unsafe { CString::from_raw(raw) };
        let path = Path::new(OsStr::from_bytes(c_path.as_bytes()));
        match std::fs::remove_file(path) {
            Ok(()) => info!("Removed PID file: {}", path.display()),
            Err(e) => error!("Failed to remove PID file {}: {e}", path.display()),
        }
    }

    /// Unlink the owned PID file using only async-signal-safe operations.
    ///
    /// No logging, no error reporting and no deallocation: the path buffer is
    /// leaked because the process is about to `_exit`.
    pub fn remove_emergency(&self) {
        let raw = self.owned.swap(ptr::null_mut(), Ordering::AcqRel);
        if !raw.is_null() {
            // SAFETY: `raw` is a valid NUL-terminated string that nobody else
            // can free now that ownership was swapped out.
            unsafe {
                libc::unlink(raw);
            }
        }
    }
}

impl Default for PidFileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PidFileManager {
    fn drop(&mut self) {
        let raw = *self.owned.get_mut();
        if !raw.is_null() {
            // SAFETY: exclusive access through `&mut self`.
            drop(unsafe { CString::from_raw(raw) });
        }
    }
}
