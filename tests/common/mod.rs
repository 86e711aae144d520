// tests/common/mod.rs

//! Shared helpers for integration tests: header builders, a payload
//! factory, an event-collecting notifier, and a recording file state
//! machine double that materializes and removes real files under the
//! test root.

#![allow(dead_code)]

use pallet::{
    CallbackNotifier, CallbackWhat, FileAction, FileStateMachine, FsmError, FsmMode, FsmRequest,
    Header, PackageDb, Payload, Tag, Transaction, Value,
};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Minimal package identity header
pub fn simple_header(name: &str, version: &str, release: &str, epoch: Option<u32>) -> Header {
    let mut h = Header::new();
    h.insert(Tag::Name, Value::String(name.to_string()));
    h.insert(Tag::Version, Value::String(version.to_string()));
    h.insert(Tag::Release, Value::String(release.to_string()));
    if let Some(e) = epoch {
        h.insert(Tag::Epoch, Value::Int32(vec![e]));
    }
    h.insert(Tag::PayloadCompressor, Value::String("gzip".to_string()));
    h
}

/// One test file: (directory with trailing slash, basename, mode, size,
/// user, group, flags)
pub type TestFile<'a> = (&'a str, &'a str, u16, u32, &'a str, &'a str, u32);

/// Attach a file list to a header
pub fn add_files(h: &mut Header, files: &[TestFile<'_>]) {
    let mut dirs: Vec<String> = Vec::new();
    let mut dir_indexes = Vec::new();
    for (dir, ..) in files {
        let at = match dirs.iter().position(|d| d == dir) {
            Some(at) => at,
            None => {
                dirs.push(dir.to_string());
                dirs.len() - 1
            }
        };
        dir_indexes.push(at as u32);
    }

    h.insert(
        Tag::BaseNames,
        Value::StringArray(files.iter().map(|f| f.1.to_string()).collect()),
    );
    h.insert(Tag::DirIndexes, Value::Int32(dir_indexes));
    h.insert(Tag::DirNames, Value::StringArray(dirs));
    h.insert(
        Tag::FileModes,
        Value::Int16(files.iter().map(|f| f.2).collect()),
    );
    h.insert(
        Tag::FileSizes,
        Value::Int32(files.iter().map(|f| f.3).collect()),
    );
    h.insert(
        Tag::FileUserName,
        Value::StringArray(files.iter().map(|f| f.4.to_string()).collect()),
    );
    h.insert(
        Tag::FileGroupName,
        Value::StringArray(files.iter().map(|f| f.5.to_string()).collect()),
    );
    h.insert(
        Tag::FileFlags,
        Value::Int32(files.iter().map(|f| f.6).collect()),
    );
    h.insert(
        Tag::FileMtimes,
        Value::Int32(files.iter().map(|_| 1_700_000_000).collect()),
    );
}

/// A gzip-compressed payload in an unnamed temp file, positioned at 0
pub fn gz_payload(content: &[u8]) -> File {
    let mut file = tempfile::tempfile().unwrap();
    {
        let mut enc =
            flate2::write::GzEncoder::new(file.try_clone().unwrap(), flate2::Compression::fast());
        enc.write_all(content).unwrap();
        enc.finish().unwrap();
    }
    file.seek(SeekFrom::Start(0)).unwrap();
    file
}

pub type Events = Arc<Mutex<Vec<(String, CallbackWhat, u64, u64)>>>;

/// Notifier that records every event
pub fn collecting_notifier() -> (Events, CallbackNotifier) {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let notifier = CallbackNotifier::new(move |element, what, amount, total| {
        sink.lock()
            .unwrap()
            .push((element.to_string(), what, amount, total));
    });
    (events, notifier)
}

pub fn whats(events: &Events) -> Vec<CallbackWhat> {
    events.lock().unwrap().iter().map(|e| e.1).collect()
}

/// One recorded file state machine invocation
#[derive(Debug, Clone)]
pub struct FsmCall {
    pub mode: FsmMode,
    pub file_count: usize,
    pub had_payload: bool,
    pub forced: Option<FileAction>,
}

pub type FsmCalls = Arc<Mutex<Vec<FsmCall>>>;

/// Test double for the external walker/unpacker.
///
/// Records every call; when `materialize` is set it creates and removes
/// real files under the request root so tests can observe filesystem
/// effects, and streams file paths in Build mode.
pub struct RecordingFsm {
    pub calls: FsmCalls,
    pub materialize: bool,
    /// Fail when a file path contains this needle
    pub fail_on: Option<String>,
}

impl RecordingFsm {
    pub fn new(materialize: bool) -> (FsmCalls, Self) {
        let calls: FsmCalls = Arc::new(Mutex::new(Vec::new()));
        let fsm = Self {
            calls: Arc::clone(&calls),
            materialize,
            fail_on: None,
        };
        (calls, fsm)
    }

    fn on_disk(root: &Path, path: &str) -> PathBuf {
        if root == Path::new("/") {
            PathBuf::from(path)
        } else {
            root.join(path.trim_start_matches('/'))
        }
    }
}

impl FileStateMachine for RecordingFsm {
    fn run(&mut self, mode: FsmMode, request: FsmRequest<'_>) -> Result<(), FsmError> {
        self.calls.lock().unwrap().push(FsmCall {
            mode,
            file_count: request.files.fc,
            had_payload: request.payload.is_some(),
            forced: request.force_action,
        });

        let paths = request.files.paths();
        if let Some(needle) = &self.fail_on
            && let Some(hit) = paths.iter().find(|p| p.contains(needle.as_str()))
        {
            return Err(FsmError::new(Some(hit.clone()), "injected failure"));
        }

        if !self.materialize {
            // still drain the payload so encoder state is exercised
            if let Some(Payload::Read(r)) = request.payload {
                let mut sink = Vec::new();
                r.read_to_end(&mut sink)
                    .map_err(|e| FsmError::new(None, e.to_string()))?;
            }
            return Ok(());
        }

        match mode {
            FsmMode::Install => {
                if let Some(Payload::Read(r)) = request.payload {
                    let mut sink = Vec::new();
                    r.read_to_end(&mut sink)
                        .map_err(|e| FsmError::new(None, e.to_string()))?;
                }
                for path in &paths {
                    let target = Self::on_disk(request.root, path);
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent)
                            .map_err(|e| FsmError::new(Some(path.clone()), e.to_string()))?;
                    }
                    std::fs::write(&target, b"")
                        .map_err(|e| FsmError::new(Some(path.clone()), e.to_string()))?;
                }
            }
            FsmMode::Erase => {
                for path in &paths {
                    let target = Self::on_disk(request.root, path);
                    let _ = std::fs::remove_file(&target);
                }
            }
            FsmMode::Build => {
                if let Some(Payload::Write(w)) = request.payload {
                    for path in &paths {
                        writeln!(w, "{}", path)
                            .map_err(|e| FsmError::new(Some(path.clone()), e.to_string()))?;
                    }
                }
            }
            FsmMode::Commit => {}
        }

        Ok(())
    }
}

/// Transaction over an in-memory database with collected notifications
/// and a recording, materializing file state machine.
pub fn test_transaction(root: &Path) -> (Transaction, Events, FsmCalls) {
    let db = PackageDb::open_in_memory().unwrap();
    let mut ts = Transaction::new(root, db).unwrap();
    ts.set_id(4200);

    let (events, notifier) = collecting_notifier();
    ts.set_notifier(Box::new(notifier));

    let (calls, fsm) = RecordingFsm::new(true);
    ts.set_fsm(Box::new(fsm));

    // tests never really chroot; mark the root as already entered so
    // the state machine and scriptlets skip the switch
    ts.set_chroot_done(true);

    (ts, events, calls)
}
