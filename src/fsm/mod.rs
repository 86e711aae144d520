// src/fsm/mod.rs

//! Gateway to the file state machine
//!
//! The walker/unpacker that actually materializes, removes, or streams
//! archive members is an external collaborator. This module fixes its
//! contract: a mode token, a request carrying the file bundle and an
//! optional payload byte stream, and an error type that names the file
//! the machine stopped on. It also owns payload compression negotiation,
//! since the state machine decides the stream flavor before handing the
//! bytes over.

use crate::error::{Error, Result};
use crate::fileinfo::{FileAction, FileInfo};
use crate::header::{Header, Tag};
use bzip2::Compression as BzCompression;
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::Compression as GzCompression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Per-file mapping applied by the file state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapFlags(pub u32);

impl MapFlags {
    pub const PATH: u32 = 1 << 0;
    pub const MODE: u32 = 1 << 1;
    pub const UID: u32 = 1 << 2;
    pub const GID: u32 = 1 << 3;

    /// Map everything: path, mode, and both ownership ids
    pub fn all() -> Self {
        MapFlags(Self::PATH | Self::MODE | Self::UID | Self::GID)
    }

    pub fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }
}

impl Default for MapFlags {
    fn default() -> Self {
        Self::all()
    }
}

/// What the file state machine is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum FsmMode {
    /// Unpack the payload stream onto the filesystem
    Install,
    /// Remove this package's files
    Erase,
    /// Stream files out into an archive payload
    Build,
    /// Finalize pending renames
    Commit,
}

/// Payload byte stream, direction depending on the mode
pub enum Payload<'a> {
    Read(&'a mut dyn Read),
    Write(&'a mut dyn Write),
}

impl fmt::Debug for Payload<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Read(_) => f.write_str("Payload::Read"),
            Payload::Write(_) => f.write_str("Payload::Write"),
        }
    }
}

/// One unit of work handed to the file state machine
pub struct FsmRequest<'a> {
    /// Target root directory
    pub root: &'a Path,
    pub files: &'a mut FileInfo,
    pub payload: Option<Payload<'a>>,
    /// Overrides every per-file action when set (repackage forces
    /// copy-out)
    pub force_action: Option<FileAction>,
}

/// Failure from the file state machine, naming the member it stopped on
#[derive(Debug)]
pub struct FsmError {
    pub failed_file: Option<String>,
    pub reason: String,
}

impl FsmError {
    pub fn new(failed_file: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            failed_file,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failed_file {
            Some(file) => write!(f, "{} (file {})", self.reason, file),
            None => f.write_str(&self.reason),
        }
    }
}

/// The file state machine seam.
///
/// Implementations stream archive members in or out and touch the
/// filesystem; the package state machine drives them and never looks
/// inside.
pub trait FileStateMachine {
    fn run(&mut self, mode: FsmMode, request: FsmRequest<'_>) -> std::result::Result<(), FsmError>;
}

/// A file state machine that does nothing.
///
/// Useful for database-only operations and as the default until a real
/// implementation is attached.
#[derive(Debug, Default)]
pub struct NullFsm;

impl FileStateMachine for NullFsm {
    fn run(&mut self, _mode: FsmMode, _request: FsmRequest<'_>) -> std::result::Result<(), FsmError> {
        Ok(())
    }
}

/// Build the payload I/O flags string for a goal and header.
///
/// The string is `"r"` for reading (install/erase) or `"w9"` for writing
/// (repackage), followed by a suffix naming the compressor from the
/// header, defaulting to gzip. An unrecognized compressor is an error;
/// silently producing an unsuffixed flags string would just fail later
/// with a worse message.
pub fn io_flags(writing: bool, h: &Header) -> Result<String> {
    let compressor = h.get_string(Tag::PayloadCompressor).unwrap_or("gzip");

    let mut flags = String::from(if writing { "w9" } else { "r" });
    match compressor {
        "gzip" => flags.push_str(".gzdio"),
        "bzip2" => flags.push_str(".bzdio"),
        other => return Err(Error::UnknownCompressor(other.to_string())),
    }

    Ok(flags)
}

/// Decompressing payload reader
pub enum PayloadReader {
    Gzip(GzDecoder<File>),
    Bzip2(BzDecoder<File>),
}

impl Read for PayloadReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            PayloadReader::Gzip(r) => r.read(buf),
            PayloadReader::Bzip2(r) => r.read(buf),
        }
    }
}

/// Compressing payload writer
pub enum PayloadWriter {
    Gzip(GzEncoder<File>),
    Bzip2(BzEncoder<File>),
}

impl Write for PayloadWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            PayloadWriter::Gzip(w) => w.write(buf),
            PayloadWriter::Bzip2(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            PayloadWriter::Gzip(w) => w.flush(),
            PayloadWriter::Bzip2(w) => w.flush(),
        }
    }
}

impl PayloadWriter {
    /// Finish the compressed stream, flushing trailer bytes
    pub fn finish(self) -> Result<()> {
        match self {
            PayloadWriter::Gzip(w) => {
                w.finish()?;
            }
            PayloadWriter::Bzip2(w) => {
                w.finish()?;
            }
        }
        Ok(())
    }
}

/// Open a decompressing reader over a payload file descriptor
pub fn open_reader(flags: &str, file: &File) -> Result<PayloadReader> {
    let dup = file.try_clone()?;
    if flags.ends_with(".gzdio") {
        Ok(PayloadReader::Gzip(GzDecoder::new(dup)))
    } else if flags.ends_with(".bzdio") {
        Ok(PayloadReader::Bzip2(BzDecoder::new(dup)))
    } else {
        Err(Error::UnknownCompressor(flags.to_string()))
    }
}

/// Open a compressing writer over an output file descriptor
pub fn open_writer(flags: &str, file: &File) -> Result<PayloadWriter> {
    let dup = file.try_clone()?;
    if flags.ends_with(".gzdio") {
        Ok(PayloadWriter::Gzip(GzEncoder::new(dup, GzCompression::new(9))))
    } else if flags.ends_with(".bzdio") {
        Ok(PayloadWriter::Bzip2(BzEncoder::new(dup, BzCompression::best())))
    } else {
        Err(Error::UnknownCompressor(flags.to_string()))
    }
}
