// src/fileinfo/mod.rs

//! Per-package file working state
//!
//! A [`FileInfo`] bundle carries everything the state machine and the
//! file state machine need to know about one package's files: parallel
//! arrays of length `fc` for names, modes, sizes, ownership and so on, a
//! factored directory table, per-file planned actions, and the list of
//! files in other packages this install replaces.

use crate::error::{Error, Result};
use crate::fsm::MapFlags;
use crate::header::{Header, Tag};
use nix::unistd::{Group, User};
use tracing::warn;

/// Per-file flag bits carried in the header's file flags array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFlags(pub u32);

impl FileFlags {
    pub const CONFIG: u32 = 1 << 0;
    pub const DOC: u32 = 1 << 1;
    pub const MISSINGOK: u32 = 1 << 3;
    pub const NOREPLACE: u32 = 1 << 4;
    pub const SPECFILE: u32 = 1 << 5;
    pub const GHOST: u32 = 1 << 6;

    pub fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }
}

/// Planned disposition for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileAction {
    #[default]
    Unknown,
    Create,
    Erase,
    Backup,
    Save,
    Skip,
    SkipNState,
    SkipNetShared,
    SkipMultiLib,
    CopyOut,
}

/// Recorded on-disk state for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileState {
    Normal = 0,
    Replaced = 1,
    NotInstalled = 2,
    NetShared = 3,
}

/// A file in another installed package that this install overwrites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedFileInfo {
    /// Database record of the other package
    pub other_record: u64,
    /// File index within the other package
    pub other_file_num: usize,
}

/// setuid/setgid mode bits cleared when ownership falls back to root
const MODE_SUID: u16 = 0o4000;
const MODE_SGID: u16 = 0o2000;

/// Working state for one package's files
#[derive(Debug, Default)]
pub struct FileInfo {
    /// File count; every parallel array below has this length
    pub fc: usize,
    pub basenames: Vec<String>,
    pub dir_indexes: Vec<u32>,
    /// Directory table referenced by `dir_indexes`; entries end in '/'
    pub dir_names: Vec<String>,
    pub modes: Vec<u16>,
    pub sizes: Vec<u32>,
    pub mtimes: Vec<u32>,
    pub digests: Vec<String>,
    pub link_tos: Vec<String>,
    pub flags: Vec<FileFlags>,
    pub users: Vec<String>,
    pub groups: Vec<String>,
    /// Resolved numeric ids; empty until allocated by INIT
    pub uids: Vec<u32>,
    pub gids: Vec<u32>,
    pub actions: Vec<FileAction>,
    pub states: Option<Vec<FileState>>,
    /// Archive member names; built by INIT
    pub archive_paths: Vec<String>,
    /// Leading bytes of archive paths the file state machine drops
    pub strip_len: usize,
    pub map_flags: MapFlags,
    pub replaced: Vec<SharedFileInfo>,
    /// Fallback ownership for files without a resolvable name
    pub uid: u32,
    pub gid: u32,
    /// Database record this bundle was loaded from; 0 when none
    pub record: u64,
    /// Uncompressed payload size when the header declares one
    pub archive_size: u64,
}

impl FileInfo {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a bundle from a header's file arrays.
    ///
    /// A header without a file list yields an empty bundle. Optional
    /// arrays (digests, link targets, languages) default to empty
    /// strings; required arrays must agree on length.
    pub fn from_header(h: &Header) -> Result<Self> {
        let Some(basenames) = h.get_string_array(Tag::BaseNames) else {
            return Ok(Self::empty());
        };
        let fc = basenames.len();

        let dir_indexes = h
            .get_u32_array(Tag::DirIndexes)
            .ok_or_else(|| Error::HeaderError("file list without dir indexes".to_string()))?
            .to_vec();
        let dir_names = h
            .get_string_array(Tag::DirNames)
            .ok_or_else(|| Error::HeaderError("file list without dir names".to_string()))?
            .to_vec();

        if dir_indexes.len() != fc {
            return Err(Error::HeaderError(format!(
                "dir index count {} != file count {}",
                dir_indexes.len(),
                fc
            )));
        }
        if let Some(bad) = dir_indexes.iter().find(|&&d| d as usize >= dir_names.len()) {
            return Err(Error::HeaderError(format!(
                "dir index {} out of range ({} dirs)",
                bad,
                dir_names.len()
            )));
        }

        let required_u16 = |tag: Tag| -> Result<Vec<u16>> {
            let v = h.get_u16_array(tag).unwrap_or(&[]).to_vec();
            if v.len() != fc && !v.is_empty() {
                return Err(Error::HeaderError(format!(
                    "{:?} count {} != file count {}",
                    tag,
                    v.len(),
                    fc
                )));
            }
            Ok(if v.is_empty() { vec![0; fc] } else { v })
        };
        let required_u32 = |tag: Tag| -> Result<Vec<u32>> {
            let v = h.get_u32_array(tag).unwrap_or(&[]).to_vec();
            if v.len() != fc && !v.is_empty() {
                return Err(Error::HeaderError(format!(
                    "{:?} count {} != file count {}",
                    tag,
                    v.len(),
                    fc
                )));
            }
            Ok(if v.is_empty() { vec![0; fc] } else { v })
        };
        let strings = |tag: Tag| -> Vec<String> {
            let v = h.get_string_array(tag).unwrap_or(&[]).to_vec();
            if v.len() == fc {
                v
            } else {
                vec![String::new(); fc]
            }
        };

        let states = h.get_char_array(Tag::FileStates).map(|raw| {
            raw.iter()
                .map(|&b| match b {
                    1 => FileState::Replaced,
                    2 => FileState::NotInstalled,
                    3 => FileState::NetShared,
                    _ => FileState::Normal,
                })
                .collect()
        });

        Ok(Self {
            fc,
            basenames: basenames.to_vec(),
            dir_indexes,
            dir_names,
            modes: required_u16(Tag::FileModes)?,
            sizes: required_u32(Tag::FileSizes)?,
            mtimes: required_u32(Tag::FileMtimes)?,
            digests: strings(Tag::FileDigests),
            link_tos: strings(Tag::FileLinkTos),
            flags: required_u32(Tag::FileFlags)?
                .into_iter()
                .map(FileFlags)
                .collect(),
            users: strings(Tag::FileUserName),
            groups: strings(Tag::FileGroupName),
            uids: Vec::new(),
            gids: Vec::new(),
            actions: vec![FileAction::Unknown; fc],
            states,
            archive_paths: Vec::new(),
            strip_len: 0,
            map_flags: MapFlags::default(),
            replaced: Vec::new(),
            uid: 0,
            gid: 0,
            record: 0,
            archive_size: h.get_u32(Tag::ArchiveSize).unwrap_or(0) as u64,
        })
    }

    /// Full path of file `i`: directory entry + basename
    pub fn path(&self, i: usize) -> String {
        let dir = &self.dir_names[self.dir_indexes[i] as usize];
        format!("{}{}", dir, self.basenames[i])
    }

    /// All file paths in index order
    pub fn paths(&self) -> Vec<String> {
        (0..self.fc).map(|i| self.path(i)).collect()
    }

    /// Allocate per-file state slots marked Normal
    pub fn ensure_states(&mut self) {
        if self.states.is_none() && self.fc > 0 {
            self.states = Some(vec![FileState::Normal; self.fc]);
        }
    }

    /// Allocate resolved-id arrays filled with the fallback ids
    pub fn ensure_ids(&mut self) {
        if self.uids.len() != self.fc {
            self.uids = vec![self.uid; self.fc];
        }
        if self.gids.len() != self.fc {
            self.gids = vec![self.gid; self.fc];
        }
    }

    /// Encoded file states for storing back into a header
    pub fn state_bytes(&self) -> Option<Vec<u8>> {
        self.states
            .as_ref()
            .map(|s| s.iter().map(|st| *st as u8).collect())
    }

    /// Build the archive member name table.
    ///
    /// Original basenames take precedence when the header records them
    /// (relocated packages keep their archive names); otherwise names
    /// come from the live directory table.
    pub fn build_archive_paths(&mut self, h: &Header) {
        let orig = match (
            h.get_string_array(Tag::OrigBaseNames),
            h.get_u32_array(Tag::OrigDirIndexes),
            h.get_string_array(Tag::OrigDirNames),
        ) {
            (Some(b), Some(d), Some(n))
                if b.len() == self.fc
                    && d.len() == self.fc
                    && d.iter().all(|&i| (i as usize) < n.len()) =>
            {
                Some((b, d, n))
            }
            _ => None,
        };

        self.archive_paths = (0..self.fc)
            .map(|i| match orig {
                Some((b, d, n)) => format!("{}{}", n[d[i] as usize], b[i]),
                None => self.path(i),
            })
            .collect();
    }

    /// Resolve symbolic ownership to numeric ids.
    ///
    /// Unknown names fall back to root with a warning, and the
    /// corresponding setuid/setgid bit is cleared so the fallback can
    /// never mint a privileged binary.
    pub fn resolve_ids(&mut self) {
        self.ensure_ids();

        for i in 0..self.fc {
            let mut uid = self.uid;
            let mut gid = self.gid;

            if !self.users[i].is_empty() {
                match User::from_name(&self.users[i]) {
                    Ok(Some(user)) => uid = user.uid.as_raw(),
                    _ => {
                        warn!("user {} does not exist - using root", self.users[i]);
                        uid = 0;
                        self.modes[i] &= !MODE_SUID;
                    }
                }
            }

            if !self.groups[i].is_empty() {
                match Group::from_name(&self.groups[i]) {
                    Ok(Some(group)) => gid = group.gid.as_raw(),
                    _ => {
                        warn!("group {} does not exist - using root", self.groups[i]);
                        gid = 0;
                        self.modes[i] &= !MODE_SGID;
                    }
                }
            }

            self.uids[i] = uid;
            self.gids[i] = gid;
        }
    }
}
