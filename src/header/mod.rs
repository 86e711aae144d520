// src/header/mod.rs

//! Read-mostly typed view of package metadata
//!
//! A [`Header`] maps tag identifiers to typed values: strings, string
//! arrays, 8/16/32-bit integer arrays, and binary blobs. The codec layer
//! produces headers from package files and database blobs; the state
//! machine reads tags through typed accessors and adds the few tags it
//! owns (file states, install time, remove transaction id).

pub mod codec;

use crate::error::{Error, Result};
use crate::version::{Evr, vercmp};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use strum_macros::FromRepr;

/// Tag identifiers understood by this crate.
///
/// Numeric values follow the classic rpmlib tag space so that headers are
/// recognizable in hex dumps; values below 256 are signature-header tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromRepr)]
#[repr(u32)]
pub enum Tag {
    // signature header space
    SigSize = 257,
    SigMd5 = 260,

    // embedded original-header blobs
    HeaderImage = 61,
    HeaderImmutable = 63,

    Name = 1000,
    Version = 1001,
    Release = 1002,
    Epoch = 1003,
    InstallTime = 1008,
    Size = 1009,

    PreIn = 1023,
    PostIn = 1024,
    PreUn = 1025,
    PostUn = 1026,

    FileSizes = 1028,
    FileStates = 1029,
    FileModes = 1030,
    FileRdevs = 1033,
    FileMtimes = 1034,
    FileDigests = 1035,
    FileLinkTos = 1036,
    FileFlags = 1037,
    FileUserName = 1039,
    FileGroupName = 1040,
    FileVerifyFlags = 1045,
    ArchiveSize = 1046,

    ProvideName = 1047,
    RequireFlags = 1048,
    RequireName = 1049,
    RequireVersion = 1050,
    ConflictFlags = 1053,
    ConflictName = 1054,
    ConflictVersion = 1055,

    DefaultPrefix = 1056,
    InstallPrefix = 1058,

    TriggerScripts = 1065,
    TriggerName = 1066,
    TriggerVersion = 1067,
    TriggerFlags = 1068,
    TriggerIndex = 1069,

    VerifyScript = 1079,
    PreInProg = 1085,
    PostInProg = 1086,
    PreUnProg = 1087,
    PostUnProg = 1088,
    VerifyScriptProg = 1091,
    TriggerScriptProg = 1092,

    Cookie = 1094,
    FileDevices = 1095,
    FileInodes = 1096,
    FileLangs = 1097,
    InstPrefixes = 1099,

    SourcePackage = 1106,
    ProvideFlags = 1112,
    ProvideVersion = 1113,

    DirIndexes = 1116,
    BaseNames = 1117,
    DirNames = 1118,
    OrigDirIndexes = 1119,
    OrigBaseNames = 1120,
    OrigDirNames = 1121,

    PayloadCompressor = 1125,
    MultiLibs = 1127,
    RemoveTid = 1129,
}

/// Typed tag data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Per-item bytes (file states and other char arrays)
    Char(Vec<u8>),
    Int16(Vec<u16>),
    Int32(Vec<u32>),
    String(String),
    StringArray(Vec<String>),
    Binary(Vec<u8>),
}

impl Value {
    /// Number of items carried by this value
    pub fn count(&self) -> usize {
        match self {
            Value::Char(v) => v.len(),
            Value::Int16(v) => v.len(),
            Value::Int32(v) => v.len(),
            Value::String(_) => 1,
            Value::StringArray(v) => v.len(),
            Value::Binary(v) => v.len(),
        }
    }
}

/// A read-mostly tag → value mapping describing one package
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    entries: BTreeMap<Tag, Value>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tag
    pub fn insert(&mut self, tag: Tag, value: Value) {
        self.entries.insert(tag, value);
    }

    /// Append to an existing array tag, or insert when absent.
    ///
    /// Mirrors the add-or-append header operation: both sides must carry
    /// the same value kind, and scalar strings cannot be appended to.
    pub fn append_or_insert(&mut self, tag: Tag, value: Value) -> Result<()> {
        match self.entries.get_mut(&tag) {
            None => {
                self.entries.insert(tag, value);
                Ok(())
            }
            Some(existing) => match (existing, value) {
                (Value::Char(a), Value::Char(b)) => {
                    a.extend(b);
                    Ok(())
                }
                (Value::Int16(a), Value::Int16(b)) => {
                    a.extend(b);
                    Ok(())
                }
                (Value::Int32(a), Value::Int32(b)) => {
                    a.extend(b);
                    Ok(())
                }
                (Value::StringArray(a), Value::StringArray(b)) => {
                    a.extend(b);
                    Ok(())
                }
                (Value::Binary(a), Value::Binary(b)) => {
                    a.extend(b);
                    Ok(())
                }
                _ => Err(Error::HeaderError(format!(
                    "cannot append mismatched data to tag {:?}",
                    tag
                ))),
            },
        }
    }

    pub fn remove(&mut self, tag: Tag) -> Option<Value> {
        self.entries.remove(&tag)
    }

    pub fn get(&self, tag: Tag) -> Option<&Value> {
        self.entries.get(&tag)
    }

    pub fn has(&self, tag: Tag) -> bool {
        self.entries.contains_key(&tag)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &Value)> {
        self.entries.iter()
    }

    pub fn get_string(&self, tag: Tag) -> Option<&str> {
        match self.entries.get(&tag) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_string_array(&self, tag: Tag) -> Option<&[String]> {
        match self.entries.get(&tag) {
            Some(Value::StringArray(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Scalar u32: the first element of an Int32 entry
    pub fn get_u32(&self, tag: Tag) -> Option<u32> {
        match self.entries.get(&tag) {
            Some(Value::Int32(v)) => v.first().copied(),
            _ => None,
        }
    }

    pub fn get_u32_array(&self, tag: Tag) -> Option<&[u32]> {
        match self.entries.get(&tag) {
            Some(Value::Int32(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn get_u16_array(&self, tag: Tag) -> Option<&[u16]> {
        match self.entries.get(&tag) {
            Some(Value::Int16(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn get_char_array(&self, tag: Tag) -> Option<&[u8]> {
        match self.entries.get(&tag) {
            Some(Value::Char(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn get_binary(&self, tag: Tag) -> Option<&[u8]> {
        match self.entries.get(&tag) {
            Some(Value::Binary(v)) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Interpreter argv for a program tag, accepting both the scalar and
    /// array representations found in the wild.
    pub fn get_argv(&self, tag: Tag) -> Option<Vec<String>> {
        match self.entries.get(&tag) {
            Some(Value::String(s)) => Some(vec![s.clone()]),
            Some(Value::StringArray(v)) if !v.is_empty() => Some(v.clone()),
            _ => None,
        }
    }

    pub fn name(&self) -> Result<&str> {
        self.get_string(Tag::Name)
            .ok_or_else(|| Error::HeaderError("header has no name".to_string()))
    }

    pub fn version(&self) -> Result<&str> {
        self.get_string(Tag::Version)
            .ok_or_else(|| Error::HeaderError("header has no version".to_string()))
    }

    pub fn release(&self) -> Result<&str> {
        self.get_string(Tag::Release)
            .ok_or_else(|| Error::HeaderError("header has no release".to_string()))
    }

    pub fn epoch(&self) -> Option<u32> {
        self.get_u32(Tag::Epoch)
    }

    /// "name-version-release" identity string
    pub fn nevr(&self) -> String {
        format!(
            "{}-{}-{}",
            self.get_string(Tag::Name).unwrap_or("?"),
            self.get_string(Tag::Version).unwrap_or("?"),
            self.get_string(Tag::Release).unwrap_or("?"),
        )
    }

    /// Epoch/version/release of this header
    pub fn evr(&self) -> Result<Evr> {
        Ok(Evr {
            epoch: self.epoch().unwrap_or(0) as u64,
            version: self.version()?.to_string(),
            release: Some(self.release()?.to_string()),
        })
    }

    /// Compare package versions: a present epoch beats a missing one,
    /// then epoch, version, and release compare in order.
    pub fn compare_versions(&self, other: &Header) -> Result<Ordering> {
        match (self.epoch(), other.epoch()) {
            (Some(_), None) => return Ok(Ordering::Greater),
            (None, Some(_)) => return Ok(Ordering::Less),
            (Some(a), Some(b)) if a != b => return Ok(a.cmp(&b)),
            _ => {}
        }

        let ord = vercmp(self.version()?, other.version()?);
        if ord != Ordering::Equal {
            return Ok(ord);
        }
        Ok(vercmp(self.release()?, other.release()?))
    }
}
