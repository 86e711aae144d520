// src/trigger/mod.rs

//! Trigger firing against the installed-package database
//!
//! Two dual passes run for each state machine invocation:
//!
//! - the outbound pass finds packages in the database that declare a
//!   trigger on this package's name and runs their trigger scripts;
//! - the inbound pass finds packages already installed that this
//!   package's own triggers watch, and runs this package's scripts.
//!
//! For any (target header, trigger index) pair a script runs at most
//! once per pass: the inbound pass carries an already-run bitmap across
//! database scans, and a single source/target pair never fires more than
//! one entry.

use crate::deps::{DepKind, DependencySet};
use crate::error::{Error, Result};
use crate::header::{Header, Tag};
use crate::psm::Psm;
use crate::scriptlet::run_script;
use crate::transaction::Transaction;
use tracing::debug;

/// Run trigger scripts in database packages that are fired by this
/// package (the outbound pass).
pub fn run_triggers(psm: &mut Psm<'_>) -> Result<()> {
    let name = psm.element_header().name()?.to_string();

    // arg2 for fired scripts: instances of this package installed once
    // the operation completes
    let count = psm.ts.db().count_packages(&name)? as i32 + psm.count_correction;
    if count < 0 {
        return Err(Error::TriggerError(format!(
            "negative installed count for {}",
            name
        )));
    }

    // The per-target count inside handle_one is taken as-is for this
    // pass; the correction already went into arg2.
    let sense = psm.sense;
    let saved_correction = psm.count_correction;
    psm.count_correction = 0;

    let rc = (|| {
        let ts: &Transaction = &*psm.ts;
        let source = &ts.elements[psm.element].header;

        let mut first_err = None;
        let mut mi = ts.db().find_by_trigger_name(&name)?;
        while let Some(entry) = mi.next() {
            if let Err(e) = handle_one(ts, sense.0, 0, source, &entry.header, count, None)
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        mi.close()?;

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    })();

    psm.count_correction = saved_correction;
    rc
}

/// Run this package's trigger scripts fired by packages already in the
/// database (the inbound pass).
pub fn run_immed_triggers(psm: &mut Psm<'_>) -> Result<()> {
    let sense = psm.sense;
    let correction = psm.count_correction;
    let ts: &Transaction = &*psm.ts;
    let target = &ts.elements[psm.element].header;

    let (Some(names), Some(indexes)) = (
        target.get_string_array(Tag::TriggerName),
        target.get_u32_array(Tag::TriggerIndex),
    ) else {
        return Ok(());
    };
    if names.len() != indexes.len() {
        return Err(Error::TriggerError(
            "mismatched trigger name/index arrays".to_string(),
        ));
    }

    let slots = indexes.iter().map(|&i| i as usize + 1).max().unwrap_or(0);
    let mut already_run = vec![false; slots];
    let mut first_err = None;

    for (i, name) in names.iter().enumerate() {
        if already_run[indexes[i] as usize] {
            continue;
        }

        let mut mi = ts.db().find_by_name(name)?;
        let hits = mi.count();
        while let Some(entry) = mi.next() {
            if let Err(e) = handle_one(
                ts,
                sense.0,
                correction,
                &entry.header,
                target,
                hits as i32,
                Some(&mut already_run),
            ) && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        mi.close()?;
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Walk the target's trigger entries against one source header and run
/// the first entry that matches name, sense, and version constraint.
///
/// `already_run` spans trigger indices; a set bit means that script
/// already fired this pass. Each source/target pair runs at most one
/// script.
fn handle_one(
    ts: &Transaction,
    sense: u32,
    correction: i32,
    source: &Header,
    target: &Header,
    arg2: i32,
    mut already_run: Option<&mut [bool]>,
) -> Result<()> {
    let source_name = source.name()?;
    let Some(triggers) = DependencySet::from_header(target, DepKind::Trigger) else {
        return Ok(());
    };
    let source_evr = source.evr()?;

    let mut rc = Ok(());
    for entry in triggers.iter() {
        if entry.name != source_name {
            continue;
        }
        if entry.flags.0 & sense == 0 {
            continue;
        }
        if !entry.matches_evr(&source_evr)? {
            continue;
        }

        let (Some(scripts), Some(progs)) = (
            target.get_string_array(Tag::TriggerScripts),
            target.get_string_array(Tag::TriggerScriptProg),
        ) else {
            continue;
        };

        let index = entry.index as usize;
        let (Some(script), Some(prog)) = (scripts.get(index), progs.get(index)) else {
            return Err(Error::TriggerError(format!(
                "trigger index {} out of range in {}",
                index,
                target.nevr()
            )));
        };

        let arg1 = ts.db().count_packages(entry.name)? as i32 + correction;

        let fired = match already_run.as_deref() {
            Some(bits) => bits.get(index).copied().unwrap_or(false),
            None => false,
        };
        if !fired {
            debug!(
                "firing trigger {} of {} (source {})",
                index,
                target.nevr(),
                source_name
            );
            rc = run_script(
                ts,
                target,
                "%trigger",
                Some(std::slice::from_ref(prog)),
                Some(script),
                Some(arg1),
                Some(arg2),
            );
            if let Some(bits) = already_run.as_deref_mut()
                && index < bits.len()
            {
                bits[index] = true;
            }
        }

        // Each source/target pair results in at most one script run.
        break;
    }

    rc
}
