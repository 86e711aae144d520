// src/lib.rs

//! Pallet package runtime
//!
//! Runtime library for transactional package management. The core is the
//! package state machine: the driver that installs, erases, or
//! repackages one package within a larger transaction, orchestrating
//! payload streaming through the file state machine, scriptlet execution
//! in controlled child processes, trigger firing against the installed
//! database, atomic database updates, and optional root switching.
//!
//! # Architecture
//!
//! - Headers: read-mostly typed tag → value maps, with a binary codec
//!   for database blobs and package files
//! - Transactions own shared state: root, flags, database, file state
//!   machine, notifier, and the ordered package elements
//! - One [`Psm`] scope per package operation; composite goals decompose
//!   into INIT → PRE → PROCESS → POST with an unconditional FINI
//! - External collaborators stay behind seams: the archive
//!   walker/unpacker implements [`FileStateMachine`], planners populate
//!   the transaction, callers consume [`Notifier`] events

pub mod db;
pub mod deps;
mod error;
pub mod fileinfo;
pub mod fsm;
pub mod header;
pub mod macros;
pub mod progress;
pub mod psm;
pub mod scriptlet;
pub mod source;
pub mod transaction;
pub mod trigger;
pub mod version;

pub use db::{MatchEntry, MatchIterator, PackageDb};
pub use deps::{DepEntry, DepFlags, DepKind, DependencySet};
pub use error::{Error, Result};
pub use fileinfo::{FileAction, FileFlags, FileInfo, FileState, SharedFileInfo};
pub use fsm::{
    FileStateMachine, FsmError, FsmMode, FsmRequest, MapFlags, NullFsm, Payload, PayloadReader,
    PayloadWriter,
};
pub use header::codec::{Lead, LeadKind, PackageFile};
pub use header::{Header, Tag, Value};
pub use progress::{CallbackNotifier, CallbackWhat, LogNotifier, Notifier, SilentNotifier};
pub use psm::{Goal, Psm, Stage};
pub use source::{SourceInstall, install_source_package};
pub use transaction::{TransFlags, Transaction, TransactionElement};
pub use version::{Evr, vercmp};
