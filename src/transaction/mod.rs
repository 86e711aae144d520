// src/transaction/mod.rs

//! Transaction context shared by package state machine invocations
//!
//! A [`Transaction`] owns the target root directory, the transaction id,
//! behavior flags, the chroot-done latch, the package database, the file
//! state machine, the notification callback, and the ordered list of
//! package elements being operated on. Planning and ordering of elements
//! belong to an external planner; this type only carries state the
//! per-package driver needs.

use crate::db::PackageDb;
use crate::error::Result;
use crate::fileinfo::FileInfo;
use crate::fsm::{FileStateMachine, NullFsm};
use crate::header::Header;
use crate::macros;
use crate::progress::{CallbackWhat, LogNotifier, Notifier};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Behavior switches for a transaction.
///
/// `test` dry-runs everything after INIT; `justdb` touches only the
/// database; `apply_only` suppresses record removal and replaced-file
/// marking; the `no_*` family disables individual scriptlet and trigger
/// passes; `script_debug` keeps scriptlet temp files and traces shell
/// scripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransFlags {
    pub test: bool,
    pub justdb: bool,
    pub apply_only: bool,
    pub no_pre: bool,
    pub no_post: bool,
    pub no_preun: bool,
    pub no_postun: bool,
    pub no_trigger_prein: bool,
    pub no_trigger_in: bool,
    pub no_trigger_un: bool,
    pub no_trigger_postun: bool,
    pub multilib: bool,
    pub pkg_commit: bool,
    pub repackage: bool,
    pub script_debug: bool,
}

/// One package within a transaction
pub struct TransactionElement {
    /// Package metadata; replaced by the database copy for erase and
    /// repackage
    pub header: Header,
    /// Open payload stream for installs, positioned at the archive
    pub payload: Option<File>,
    /// Per-file working state
    pub files: FileInfo,
}

/// Shared state for one transactional run
pub struct Transaction {
    pub(crate) root: PathBuf,
    pub(crate) cwd: PathBuf,
    pub(crate) id: u32,
    pub flags: TransFlags,
    pub(crate) chroot_done: bool,
    pub(crate) script_output: Option<File>,
    pub elements: Vec<TransactionElement>,
    pub(crate) db: PackageDb,
    pub(crate) fsm: Box<dyn FileStateMachine>,
    pub(crate) notifier: Box<dyn Notifier>,
}

impl Transaction {
    /// Create a transaction rooted at `root` over an open database.
    ///
    /// The current directory is recorded now so it can be restored when
    /// the chroot bracket closes.
    pub fn new(root: impl Into<PathBuf>, db: PackageDb) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            cwd: std::env::current_dir()?,
            id: 0,
            flags: TransFlags::default(),
            chroot_done: false,
            script_output: None,
            elements: Vec::new(),
            db,
            fsm: Box::new(NullFsm),
            notifier: Box::new(LogNotifier),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory to return to after leaving the chroot
    pub fn current_dir(&self) -> &Path {
        &self.cwd
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Set the monotonic transaction id
    pub fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub fn chroot_done(&self) -> bool {
        self.chroot_done
    }

    /// Flip the chroot-done latch. Callers that have already entered the
    /// target root set this so nested scopes never double-chroot.
    pub fn set_chroot_done(&mut self, done: bool) {
        self.chroot_done = done;
    }

    pub fn db(&self) -> &PackageDb {
        &self.db
    }

    /// Attach the file state machine implementation
    pub fn set_fsm(&mut self, fsm: Box<dyn FileStateMachine>) {
        self.fsm = fsm;
    }

    /// Attach the notification callback
    pub fn set_notifier(&mut self, notifier: Box<dyn Notifier>) {
        self.notifier = notifier;
    }

    /// Capture scriptlet stdout/stderr into this file
    pub fn set_script_output(&mut self, out: Option<File>) {
        self.script_output = out;
    }

    pub fn script_output(&self) -> Option<&File> {
        self.script_output.as_ref()
    }

    /// Queue a package for installation; returns its element index
    pub fn add_install_element(&mut self, header: Header, payload: Option<File>) -> Result<usize> {
        let files = FileInfo::from_header(&header)?;
        self.elements.push(TransactionElement {
            header,
            payload,
            files,
        });
        Ok(self.elements.len() - 1)
    }

    /// Queue an installed package (by database record) for erase or
    /// repackage; returns its element index
    pub fn add_erase_element(&mut self, header: Header, record: u64) -> Result<usize> {
        let mut files = FileInfo::from_header(&header)?;
        files.record = record;
        self.elements.push(TransactionElement {
            header,
            payload: None,
            files,
        });
        Ok(self.elements.len() - 1)
    }

    /// Deliver a notification for an element. Callbacks are opaque; the
    /// state machine never inspects the outcome.
    pub fn notify(&self, element: usize, what: CallbackWhat, amount: u64, total: u64) {
        let name = self
            .elements
            .get(element)
            .map(|e| e.header.nevr())
            .unwrap_or_else(|| "?".to_string());
        self.notifier.notify(&name, what, amount, total);
    }

    /// Directory repackaged packages are written to
    pub fn repackage_dir(&self) -> PathBuf {
        match macros::lookup("_repackage_dir") {
            Some(dir) => PathBuf::from(macros::expand(&dir)),
            None => PathBuf::from("/var/spool/repackage"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{Tag, Value};

    fn header(name: &str) -> Header {
        let mut h = Header::new();
        h.insert(Tag::Name, Value::String(name.to_string()));
        h.insert(Tag::Version, Value::String("1".to_string()));
        h.insert(Tag::Release, Value::String("1".to_string()));
        h
    }

    #[test]
    fn test_element_bookkeeping() {
        let db = PackageDb::open_in_memory().unwrap();
        let mut ts = Transaction::new("/", db).unwrap();
        ts.set_id(42);

        let a = ts.add_install_element(header("a"), None).unwrap();
        let b = ts.add_erase_element(header("b"), 7).unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(ts.elements[b].files.record, 7);
        assert_eq!(ts.id(), 42);
    }

    #[test]
    fn test_chroot_latch() {
        let db = PackageDb::open_in_memory().unwrap();
        let mut ts = Transaction::new("/mnt/target", db).unwrap();
        assert!(!ts.chroot_done());
        ts.set_chroot_done(true);
        assert!(ts.chroot_done());
    }

    #[test]
    fn test_repackage_dir_default() {
        let db = PackageDb::open_in_memory().unwrap();
        let ts = Transaction::new("/", db).unwrap();
        assert_eq!(
            ts.repackage_dir(),
            PathBuf::from("/var/spool/repackage")
        );
    }
}
