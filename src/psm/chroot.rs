// src/psm/chroot.rs

//! Scoped root-directory switching
//!
//! The chroot bracket is acquired in PRE and released in POST/FINI.
//! Acquisition and release are both idempotent, and the guard's Drop is
//! a last-resort release so a panicking stage cannot leave the process
//! jailed. The transaction-wide latch is observed on entry so nested
//! state machine invocations never chroot twice.

use crate::error::{Error, Result};
use crate::transaction::Transaction;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::warn;

/// Primes the name-service libraries once per process, before the first
/// chroot can hide them.
static NSS_PRIMED: Once = Once::new();

/// Guard for one state machine scope's chroot bracket
#[derive(Debug, Default)]
pub struct ChrootGuard {
    active: bool,
    return_dir: PathBuf,
}

impl ChrootGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Enter the transaction root. A no-op when the root is "/", when
    /// the transaction latch says someone already entered, or when this
    /// guard is already active.
    pub fn enter(&mut self, ts: &mut Transaction) -> Result<()> {
        if self.active || ts.chroot_done() {
            return Ok(());
        }
        let root = ts.root().to_path_buf();
        if root == Path::new("/") {
            return Ok(());
        }

        NSS_PRIMED.call_once(|| {
            let _ = nix::unistd::User::from_name("root");
        });

        let return_dir = ts.current_dir().to_path_buf();
        nix::unistd::chdir("/")
            .map_err(|e| Error::IoError(std::io::Error::from_raw_os_error(e as i32)))?;
        nix::unistd::chroot(&root)
            .map_err(|e| Error::IoError(std::io::Error::from_raw_os_error(e as i32)))?;

        self.active = true;
        self.return_dir = return_dir;
        ts.set_chroot_done(true);
        Ok(())
    }

    /// Leave the chroot and restore the recorded working directory.
    /// Idempotent: a second call does nothing.
    pub fn leave(&mut self, ts: &mut Transaction) -> Result<()> {
        if !self.active {
            return Ok(());
        }

        nix::unistd::chroot(".")
            .map_err(|e| Error::IoError(std::io::Error::from_raw_os_error(e as i32)))?;
        self.active = false;
        ts.set_chroot_done(false);
        nix::unistd::chdir(&self.return_dir)
            .map_err(|e| Error::IoError(std::io::Error::from_raw_os_error(e as i32)))?;
        Ok(())
    }
}

impl Drop for ChrootGuard {
    fn drop(&mut self) {
        // Last-resort release on panic paths. The transaction latch
        // cannot be reached from here; stages release through leave().
        if self.active {
            if let Err(e) = nix::unistd::chroot(".") {
                warn!("cannot restore root directory: {}", e);
            }
            let _ = nix::unistd::chdir(&self.return_dir);
            self.active = false;
        }
    }
}
