// src/psm/multilib.rs

//! Folding a multilib sibling's file data into the stored header
//!
//! When two builds of one package coexist (32- and 64-bit variants), the
//! incoming header's per-file arrays are appended to the stored header's
//! arrays, keeping only files whose planned action is not the multilib
//! skip. The directory table grows by the newly referenced directories
//! and indexes are rewritten against the combined table. Dependency
//! triads merge too: entries the stored header already carries are
//! dropped, and only entries flagged multilib survive.

use crate::deps::DepFlags;
use crate::error::{Error, Result};
use crate::fileinfo::FileAction;
use crate::header::{Header, Tag, Value};

/// Per-file tags appended during the merge
const MERGE_TAGS: &[Tag] = &[
    Tag::FileSizes,
    Tag::FileStates,
    Tag::FileModes,
    Tag::FileRdevs,
    Tag::FileMtimes,
    Tag::FileDigests,
    Tag::FileLinkTos,
    Tag::FileFlags,
    Tag::FileUserName,
    Tag::FileGroupName,
    Tag::FileVerifyFlags,
    Tag::FileDevices,
    Tag::FileInodes,
    Tag::FileLangs,
    Tag::BaseNames,
];

/// Dependency triads merged after the file arrays
const DEP_TRIADS: &[(Tag, Tag, Tag)] = &[
    (Tag::RequireName, Tag::RequireVersion, Tag::RequireFlags),
    (Tag::ProvideName, Tag::ProvideVersion, Tag::ProvideFlags),
    (Tag::ConflictName, Tag::ConflictVersion, Tag::ConflictFlags),
];

fn filter_value(value: &Value, keep: &[bool]) -> Result<Value> {
    let pick = |i: usize| keep.get(i).copied().unwrap_or(false);
    Ok(match value {
        Value::Char(v) => Value::Char(
            v.iter()
                .enumerate()
                .filter(|(i, _)| pick(*i))
                .map(|(_, x)| *x)
                .collect(),
        ),
        Value::Int16(v) => Value::Int16(
            v.iter()
                .enumerate()
                .filter(|(i, _)| pick(*i))
                .map(|(_, x)| *x)
                .collect(),
        ),
        Value::Int32(v) => Value::Int32(
            v.iter()
                .enumerate()
                .filter(|(i, _)| pick(*i))
                .map(|(_, x)| *x)
                .collect(),
        ),
        Value::StringArray(v) => Value::StringArray(
            v.iter()
                .enumerate()
                .filter(|(i, _)| pick(*i))
                .map(|(_, x)| x.clone())
                .collect(),
        ),
        other => {
            return Err(Error::HeaderError(format!(
                "data type {:?} not supported in file merge",
                other
            )));
        }
    })
}

/// Fold `incoming`'s files and dependencies into `h`.
///
/// `actions` is the planned per-file action array for `incoming`; files
/// marked [`FileAction::SkipMultiLib`] are the ones already provided by
/// the stored variant and are left out.
pub fn merge_files(h: &mut Header, incoming: &Header, actions: &[FileAction]) -> Result<()> {
    let keep: Vec<bool> = actions
        .iter()
        .map(|a| *a != FileAction::SkipMultiLib)
        .collect();

    // package size grows by the kept files
    let mut size = h.get_u32(Tag::Size).unwrap_or(0);
    if let Some(sizes) = incoming.get_u32_array(Tag::FileSizes) {
        for (i, s) in sizes.iter().enumerate() {
            if keep.get(i).copied().unwrap_or(false) {
                size += s;
            }
        }
    }
    h.insert(Tag::Size, Value::Int32(vec![size]));

    for &tag in MERGE_TAGS {
        if let Some(value) = incoming.get(tag) {
            h.append_or_insert(tag, filter_value(value, &keep)?)?;
        }
    }

    merge_dirs(h, incoming, &keep)?;

    for &(name_tag, evr_tag, flags_tag) in DEP_TRIADS {
        merge_deps(h, incoming, name_tag, evr_tag, flags_tag)?;
    }

    Ok(())
}

fn merge_dirs(h: &mut Header, incoming: &Header, keep: &[bool]) -> Result<()> {
    let (Some(new_indexes), Some(new_names)) = (
        incoming.get_u32_array(Tag::DirIndexes),
        incoming.get_string_array(Tag::DirNames),
    ) else {
        return Ok(());
    };

    let mut dir_names: Vec<String> = h
        .get_string_array(Tag::DirNames)
        .map(|d| d.to_vec())
        .unwrap_or_default();
    let existing_count = dir_names.len();

    let mut merged_indexes = Vec::new();
    for (i, &di) in new_indexes.iter().enumerate() {
        if !keep.get(i).copied().unwrap_or(false) {
            continue;
        }
        let name = new_names
            .get(di as usize)
            .ok_or_else(|| Error::HeaderError(format!("dir index {} out of range", di)))?;
        let at = match dir_names.iter().position(|d| d == name) {
            Some(at) => at,
            None => {
                dir_names.push(name.clone());
                dir_names.len() - 1
            }
        };
        merged_indexes.push(at as u32);
    }

    h.append_or_insert(Tag::DirIndexes, Value::Int32(merged_indexes))?;
    if dir_names.len() > existing_count {
        h.append_or_insert(
            Tag::DirNames,
            Value::StringArray(dir_names[existing_count..].to_vec()),
        )?;
    }
    Ok(())
}

fn merge_deps(
    h: &mut Header,
    incoming: &Header,
    name_tag: Tag,
    evr_tag: Tag,
    flags_tag: Tag,
) -> Result<()> {
    let (Some(new_names), Some(new_evrs), Some(new_flags)) = (
        incoming.get_string_array(name_tag),
        incoming.get_string_array(evr_tag),
        incoming.get_u32_array(flags_tag),
    ) else {
        return Ok(());
    };
    if new_names.len() != new_evrs.len() || new_names.len() != new_flags.len() {
        return Err(Error::HeaderError(format!(
            "mismatched {:?} dependency arrays",
            name_tag
        )));
    }

    let old_names = h.get_string_array(name_tag).map(|v| v.to_vec());
    let old_evrs = h.get_string_array(evr_tag).map(|v| v.to_vec());
    let old_flags = h.get_u32_array(flags_tag).map(|v| v.to_vec());

    let already_present = |j: usize| -> bool {
        let (Some(names), Some(evrs), Some(flags)) = (&old_names, &old_evrs, &old_flags) else {
            return false;
        };
        names.iter().enumerate().any(|(k, name)| {
            name == &new_names[j]
                && evrs[k] == new_evrs[j]
                && (flags[k] & DepFlags::SENSE_MASK) == (new_flags[j] & DepFlags::SENSE_MASK)
        })
    };

    let mut names = Vec::new();
    let mut evrs = Vec::new();
    let mut flags = Vec::new();
    for j in 0..new_names.len() {
        if already_present(j) || !DepFlags(new_flags[j]).is_multilib() {
            continue;
        }
        names.push(new_names[j].clone());
        evrs.push(new_evrs[j].clone());
        flags.push(new_flags[j]);
    }

    if !names.is_empty() {
        h.append_or_insert(name_tag, Value::StringArray(names))?;
        h.append_or_insert(evr_tag, Value::StringArray(evrs))?;
        h.append_or_insert(flags_tag, Value::Int32(flags))?;
    }
    Ok(())
}
