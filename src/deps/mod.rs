// src/deps/mod.rs

//! Dependency sets: (name, version-constraint, flags) triples
//!
//! A [`DependencySet`] is an iterable view over one of a header's
//! dependency triads (requires, provides, conflicts, or triggers). The
//! trigger engine walks these to decide which trigger entries a package
//! fires, so each entry also carries its trigger script index when one
//! is present.

use crate::error::Result;
use crate::header::{Header, Tag};
use crate::version::Evr;
use std::cmp::Ordering;

/// Dependency sense and marker bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepFlags(pub u32);

impl DepFlags {
    pub const NONE: DepFlags = DepFlags(0);

    pub const LESS: u32 = 0x02;
    pub const GREATER: u32 = 0x04;
    pub const EQUAL: u32 = 0x08;
    pub const SENSE_MASK: u32 = 0x0e;

    pub const TRIGGER_IN: u32 = 0x0001_0000;
    pub const TRIGGER_UN: u32 = 0x0002_0000;
    pub const TRIGGER_POSTUN: u32 = 0x0004_0000;
    pub const TRIGGER_MASK: u32 =
        Self::TRIGGER_IN | Self::TRIGGER_UN | Self::TRIGGER_POSTUN;

    pub const MULTILIB: u32 = 0x0008_0000;

    pub fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    pub fn intersects(self, other: DepFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Just the comparison-sense bits
    pub fn sense(self) -> u32 {
        self.0 & Self::SENSE_MASK
    }

    pub fn is_multilib(self) -> bool {
        self.contains(Self::MULTILIB)
    }
}

/// One dependency entry
#[derive(Debug, Clone)]
pub struct DepEntry<'a> {
    pub name: &'a str,
    pub evr: &'a str,
    pub flags: DepFlags,
    /// Trigger script index; 0 for non-trigger triads
    pub index: u32,
}

impl DepEntry<'_> {
    /// Does `provided` satisfy this entry's version constraint?
    ///
    /// An entry with no constraint string or no sense bits matches
    /// unconditionally.
    pub fn matches_evr(&self, provided: &Evr) -> Result<bool> {
        if self.evr.is_empty() || self.flags.sense() == 0 {
            return Ok(true);
        }

        let want = Evr::parse(self.evr)?;
        let ord = provided.compare_constraint(&want);

        Ok(match ord {
            Ordering::Less => self.flags.contains(DepFlags::LESS),
            Ordering::Greater => self.flags.contains(DepFlags::GREATER),
            Ordering::Equal => self.flags.contains(DepFlags::EQUAL),
        })
    }

    /// Does the given header's NEVR satisfy this entry?
    pub fn matches_header(&self, h: &Header) -> Result<bool> {
        if h.get_string(Tag::Name) != Some(self.name) {
            return Ok(false);
        }
        self.matches_evr(&h.evr()?)
    }
}

/// Which triad of header tags a set is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepKind {
    Require,
    Provide,
    Conflict,
    Trigger,
}

impl DepKind {
    /// (name, version, flags) tags for this kind
    pub fn tags(self) -> (Tag, Tag, Tag) {
        match self {
            DepKind::Require => (Tag::RequireName, Tag::RequireVersion, Tag::RequireFlags),
            DepKind::Provide => (Tag::ProvideName, Tag::ProvideVersion, Tag::ProvideFlags),
            DepKind::Conflict => (Tag::ConflictName, Tag::ConflictVersion, Tag::ConflictFlags),
            DepKind::Trigger => (Tag::TriggerName, Tag::TriggerVersion, Tag::TriggerFlags),
        }
    }
}

/// Iterable view over a header's dependency triad
#[derive(Debug)]
pub struct DependencySet<'a> {
    names: &'a [String],
    evrs: &'a [String],
    flags: &'a [u32],
    indexes: Option<&'a [u32]>,
}

impl<'a> DependencySet<'a> {
    /// Extract a dependency set from a header; `None` when the header
    /// carries no such triad.
    pub fn from_header(h: &'a Header, kind: DepKind) -> Option<Self> {
        let (nt, vt, ft) = kind.tags();
        let names = h.get_string_array(nt)?;
        let evrs = h.get_string_array(vt)?;
        let flags = h.get_u32_array(ft)?;
        if names.len() != evrs.len() || names.len() != flags.len() {
            return None;
        }

        let indexes = match kind {
            DepKind::Trigger => {
                let idx = h.get_u32_array(Tag::TriggerIndex)?;
                if idx.len() != names.len() {
                    return None;
                }
                Some(idx)
            }
            _ => None,
        };

        Some(Self {
            names,
            evrs,
            flags,
            indexes,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<DepEntry<'a>> {
        if i >= self.names.len() {
            return None;
        }
        Some(DepEntry {
            name: &self.names[i],
            evr: &self.evrs[i],
            flags: DepFlags(self.flags[i]),
            index: self.indexes.map(|idx| idx[i]).unwrap_or(0),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = DepEntry<'a>> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}
