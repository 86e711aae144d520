// src/psm/mod.rs

//! The package state machine
//!
//! One [`Psm`] scope drives a single package through install, erase, or
//! repackage within a transaction. The top-level goals are composite:
//! they run INIT → PRE → PROCESS → POST, short-circuiting on the first
//! failure, and then always run FINI for cleanup. Sub-stages are
//! addressable on their own through [`Psm::stage`], which is how the
//! source-package bootstrap drives just PROCESS and FINI.
//!
//! Ordering guarantees within one package: INIT precedes PRE; the chroot
//! is entered before any scriptlet that must see it; the old record of a
//! same-NEVR package is removed before the new one is added; POST runs
//! only when PROCESS succeeded; FINI runs unconditionally.

pub mod chroot;
pub mod multilib;

use crate::deps::DepFlags;
use crate::error::{Error, Result};
use crate::fileinfo::{FileAction, FileState};
use crate::fsm::{self, FsmMode, FsmRequest, MapFlags, Payload};
use crate::header::codec::{self, Lead};
use crate::header::{Header, Tag, Value};
use crate::macros;
use crate::progress::CallbackWhat;
use crate::scriptlet::{self, section_name};
use crate::transaction::{Transaction, TransactionElement};
use crate::trigger;
use chroot::ChrootGuard;
use std::fs::File;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// What this state machine invocation is trying to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goal {
    Install,
    Erase,
    Repackage,
}

/// Individually addressable state machine stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Init,
    Pre,
    Process,
    Post,
    Fini,
    ChrootIn,
    ChrootOut,
    Script,
    Triggers,
    ImmedTriggers,
    PayloadFlags,
    DbLoad,
    DbAdd,
    DbRemove,
    Commit,
    Notify,
}

/// Per-invocation state machine scope.
///
/// Lives for one package operation. All mutable state a sub-stage needs
/// is carried here and passed explicitly; there is no global hand-off.
pub struct Psm<'ts> {
    pub(crate) ts: &'ts mut Transaction,
    pub(crate) element: usize,
    pub(crate) goal: Goal,
    step_name: &'static str,
    script_tag: Option<Tag>,
    prog_tag: Option<Tag>,
    /// Trigger sense for the current pass
    pub(crate) sense: DepFlags,
    /// Applied to installed counts handed to trigger scripts: -1 while
    /// erasing (the package is still in the database), 0 otherwise
    pub(crate) count_correction: i32,
    /// First scriptlet argument: instances installed once the current
    /// operation completes
    script_arg: i32,
    installed_count: u32,
    chroot: ChrootGuard,
    failed_file: Option<String>,
    io_flags: Option<String>,
    out: Option<File>,
    out_path: Option<PathBuf>,
    /// Scratch header: the stored sibling for multilib installs, the
    /// regenerated original for repackage
    other_header: Option<Header>,
    what: CallbackWhat,
    amount: u64,
    total: u64,
    had_error: bool,
}

impl<'ts> Psm<'ts> {
    /// Open a state machine scope over one transaction element
    pub fn new(ts: &'ts mut Transaction, element: usize) -> Self {
        Self {
            ts,
            element,
            goal: Goal::Install,
            step_name: "install",
            script_tag: None,
            prog_tag: None,
            sense: DepFlags::NONE,
            count_correction: 0,
            script_arg: 0,
            installed_count: 0,
            chroot: ChrootGuard::new(),
            failed_file: None,
            io_flags: None,
            out: None,
            out_path: None,
            other_header: None,
            what: CallbackWhat::InstProgress,
            amount: 0,
            total: 0,
            had_error: false,
        }
    }

    /// Install this element
    pub fn install(&mut self) -> Result<()> {
        self.run_goal(Goal::Install)
    }

    /// Erase this element
    pub fn erase(&mut self) -> Result<()> {
        self.run_goal(Goal::Erase)
    }

    /// Stream this element back out as a package file
    pub fn repackage(&mut self) -> Result<()> {
        self.run_goal(Goal::Repackage)
    }

    fn run_goal(&mut self, goal: Goal) -> Result<()> {
        self.goal = goal;
        self.step_name = match goal {
            Goal::Install => "install",
            Goal::Erase => "erase",
            Goal::Repackage => "repackage",
        };
        self.had_error = false;

        let mut rc = self.stage(Stage::Init);
        if rc.is_ok() {
            rc = self.stage(Stage::Pre);
        }
        if rc.is_ok() {
            rc = self.stage(Stage::Process);
        }
        if rc.is_ok() {
            rc = self.stage(Stage::Post);
        }

        self.had_error = rc.is_err();
        if let Err(e) = self.stage(Stage::Fini) {
            warn!("{}: cleanup failed: {}", self.step_name, e);
        }
        rc
    }

    /// PROCESS + FINI only: the entry the source-package bootstrap uses,
    /// where file dispositions were prepared by the caller.
    pub(crate) fn install_payload(&mut self) -> Result<()> {
        self.goal = Goal::Install;
        self.step_name = "install";
        self.had_error = false;

        let rc = self.stage(Stage::Process);
        self.had_error = rc.is_err();
        if let Err(e) = self.stage(Stage::Fini) {
            warn!("{}: cleanup failed: {}", self.step_name, e);
        }
        rc
    }

    /// Advance the state machine by one stage
    pub fn stage(&mut self, stage: Stage) -> Result<()> {
        match stage {
            Stage::Init => self.stage_init(),
            Stage::Pre => self.stage_pre(),
            Stage::Process => self.stage_process(),
            Stage::Post => self.stage_post(),
            Stage::Fini => self.stage_fini(),
            Stage::ChrootIn => self.chroot.enter(&mut *self.ts),
            Stage::ChrootOut => self.chroot.leave(&mut *self.ts),
            Stage::Script => self.stage_script(),
            Stage::Triggers => trigger::run_triggers(self),
            Stage::ImmedTriggers => trigger::run_immed_triggers(self),
            Stage::PayloadFlags => {
                let writing = self.goal == Goal::Repackage;
                self.io_flags = Some(fsm::io_flags(writing, self.element_header())?);
                Ok(())
            }
            Stage::DbLoad => self.stage_db_load(),
            Stage::DbAdd => self.stage_db_add(),
            Stage::DbRemove => self.stage_db_remove(),
            Stage::Commit => self.stage_commit(),
            Stage::Notify => {
                self.ts
                    .notify(self.element, self.what, self.amount, self.total);
                Ok(())
            }
        }
    }

    pub(crate) fn element_header(&self) -> &Header {
        &self.ts.elements[self.element].header
    }

    fn nevr(&self) -> String {
        self.element_header().nevr()
    }

    fn files_fc(&self) -> usize {
        self.ts.elements[self.element].files.fc
    }

    fn stage_init(&mut self) -> Result<()> {
        let name = self.element_header().name()?.to_string();
        debug!(
            "{}: {} has {} files, test = {}",
            self.step_name,
            self.nevr(),
            self.files_fc(),
            self.ts.flags.test
        );

        // Scriptlets get the number of versions of this package that
        // will be installed once we are finished.
        self.installed_count = self.ts.db().count_packages(&name)?;

        match self.goal {
            Goal::Install => {
                self.script_arg = self.installed_count as i32 + 1;

                // An already-installed record of the same NEVR is
                // replaced, not duplicated; stash its offset, and under
                // multilib its header for the merge.
                let (version, release) = {
                    let h = self.element_header();
                    (h.version()?.to_string(), h.release()?.to_string())
                };
                let mut record = 0;
                let mut previous = None;
                {
                    let mut mi = self.ts.db().find_by_nevr(&name, &version, &release)?;
                    if let Some(entry) = mi.next() {
                        record = entry.record;
                        if self.ts.flags.multilib {
                            previous = Some(entry.header.clone());
                        }
                    }
                    mi.close()?;
                }
                self.other_header = previous;

                macros::define_header_macros(self.element_header());

                let elem = &mut self.ts.elements[self.element];
                elem.files.record = record;
                elem.files.ensure_states();

                if self.ts.flags.justdb || elem.files.fc == 0 {
                    return Ok(());
                }

                // Old-format relocatable packages strip their whole
                // default prefix from archive names; everything else
                // strips the leading '/'.
                elem.files.strip_len = match elem.header.get_string(Tag::DefaultPrefix) {
                    Some(prefix) => prefix.len() + 1,
                    None => 1,
                };
                elem.files.map_flags = MapFlags::all();

                let TransactionElement { header, files, .. } = elem;
                files.build_archive_paths(header);
                files.ensure_ids();
            }
            Goal::Erase | Goal::Repackage => {
                self.script_arg = self.installed_count as i32 - 1;

                // Retrieve the installed header.
                self.stage(Stage::DbLoad)?;

                if self.goal == Goal::Repackage {
                    let dir = self.ts.repackage_dir();
                    std::fs::create_dir_all(&dir).map_err(|e| {
                        Error::CreateError(format!("{}: {}", dir.display(), e))
                    })?;
                    let path = dir.join(format!("{}.pallet", self.nevr()));
                    self.out = Some(File::create(&path)?);
                    self.out_path = Some(path);
                }
            }
        }
        Ok(())
    }

    fn stage_pre(&mut self) -> Result<()> {
        if self.ts.flags.test {
            return Ok(());
        }

        // Change root directory if requested and not already done.
        self.stage(Stage::ChrootIn)?;

        match self.goal {
            Goal::Install => {
                self.script_tag = Some(Tag::PreIn);
                self.prog_tag = Some(Tag::PreInProg);

                if !self.ts.flags.no_trigger_prein {
                    // install-side pre-trigger pass is not supported
                    debug!("{}: trigger-prein not supported", self.step_name);
                }

                if !self.ts.flags.no_pre
                    && let Err(e) = self.stage(Stage::Script)
                {
                    error!(
                        "{}: %pre scriptlet failed, skipping {}",
                        self.step_name,
                        self.nevr()
                    );
                    return Err(e);
                }
            }
            Goal::Erase => {
                self.script_tag = Some(Tag::PreUn);
                self.prog_tag = Some(Tag::PreUnProg);
                self.sense = DepFlags(DepFlags::TRIGGER_UN);
                self.count_correction = -1;

                if !self.ts.flags.no_trigger_un {
                    // Triggers in other packages this removal sets off.
                    self.stage(Stage::Triggers)?;
                    // Triggers in this package other packages set off.
                    self.stage(Stage::ImmedTriggers)?;
                }

                if !self.ts.flags.no_preun {
                    self.stage(Stage::Script)?;
                }
            }
            Goal::Repackage => {
                // Regenerate the original header from its embedded blob.
                let blob = {
                    let h = self.element_header();
                    h.get_binary(Tag::HeaderImmutable)
                        .or_else(|| h.get_binary(Tag::HeaderImage))
                        .map(|b| b.to_vec())
                };
                let Some(blob) = blob else {
                    return Ok(());
                };
                let mut original = codec::decode_header(&blob)?;

                self.stage(Stage::PayloadFlags)?;

                // Stamp the removal transaction and write lead +
                // regenerated signature + header.
                original.insert(Tag::RemoveTid, Value::Int32(vec![self.ts.id()]));
                let lead = Lead::binary(&self.nevr());
                let out = self
                    .out
                    .as_mut()
                    .ok_or_else(|| Error::unpack("repackage output not open"))?;
                codec::write_package(out, &lead, &original).map_err(|e| {
                    error!("unable to write package: {}", e);
                    e
                })?;
                self.other_header = Some(original);
            }
        }
        Ok(())
    }

    fn stage_process(&mut self) -> Result<()> {
        if self.ts.flags.test {
            return Ok(());
        }

        match self.goal {
            Goal::Install => {
                if self.ts.flags.justdb {
                    return Ok(());
                }

                // Synthesize callbacks for packages with no files.
                if self.files_fc() == 0 {
                    self.ts
                        .notify(self.element, CallbackWhat::InstStart, 0, 100);
                    self.ts
                        .notify(self.element, CallbackWhat::InstProgress, 100, 100);
                    return Ok(());
                }

                self.ts.elements[self.element].files.resolve_ids();
                self.stage(Stage::PayloadFlags)?;
                let flags = self
                    .io_flags
                    .clone()
                    .ok_or_else(|| Error::unpack("payload flags not negotiated"))?;

                let total = {
                    let files = &self.ts.elements[self.element].files;
                    if files.archive_size > 0 {
                        files.archive_size
                    } else {
                        100
                    }
                };
                self.ts
                    .notify(self.element, CallbackWhat::InstStart, 0, total);

                let stream = {
                    let Transaction {
                        root,
                        elements,
                        fsm,
                        ..
                    } = &mut *self.ts;
                    let TransactionElement { files, payload, .. } = &mut elements[self.element];
                    let payload_file = payload
                        .as_ref()
                        .ok_or_else(|| Error::unpack("no payload stream for install"))?;
                    let mut reader = fsm::open_reader(&flags, payload_file)?;
                    fsm.run(
                        FsmMode::Install,
                        FsmRequest {
                            root,
                            files,
                            payload: Some(Payload::Read(&mut reader)),
                            force_action: None,
                        },
                    )
                };

                let rc = match stream {
                    Ok(()) => self.stage(Stage::Commit),
                    Err(e) => {
                        self.failed_file = e.failed_file.clone();
                        Err(Error::UnpackError {
                            file: e.failed_file,
                            reason: e.reason,
                        })
                    }
                };

                match rc {
                    Ok(()) => {
                        self.what = CallbackWhat::InstProgress;
                        self.amount = total;
                        self.total = total;
                        self.stage(Stage::Notify)?;
                        Ok(())
                    }
                    Err(e) => {
                        match &self.failed_file {
                            Some(f) => error!("unpacking of archive failed on file {}: {}", f, e),
                            None => error!("unpacking of archive failed: {}", e),
                        }
                        self.what = CallbackWhat::UnpackError;
                        self.amount = 0;
                        self.total = 0;
                        let _ = self.stage(Stage::Notify);
                        Err(e)
                    }
                }
            }
            Goal::Erase => {
                let fc = self.files_fc();
                if self.ts.flags.justdb || self.ts.flags.apply_only || fc == 0 {
                    return Ok(());
                }

                self.ts.notify(
                    self.element,
                    CallbackWhat::UninstStart,
                    fc as u64,
                    fc as u64,
                );

                let stream = {
                    let Transaction {
                        root,
                        elements,
                        fsm,
                        ..
                    } = &mut *self.ts;
                    let TransactionElement { files, .. } = &mut elements[self.element];
                    fsm.run(
                        FsmMode::Erase,
                        FsmRequest {
                            root,
                            files,
                            payload: None,
                            force_action: None,
                        },
                    )
                };

                self.ts
                    .notify(self.element, CallbackWhat::UninstStop, 0, fc as u64);

                stream.map_err(|e| {
                    self.failed_file = e.failed_file.clone();
                    Error::UnpackError {
                        file: e.failed_file,
                        reason: e.reason,
                    }
                })
            }
            Goal::Repackage => {
                let flags = self
                    .io_flags
                    .clone()
                    .ok_or_else(|| Error::unpack("payload flags not negotiated"))?;
                let out = self
                    .out
                    .as_ref()
                    .ok_or_else(|| Error::unpack("repackage output not open"))?;
                let mut writer = fsm::open_writer(&flags, out)?;

                let stream = {
                    let Transaction {
                        root,
                        elements,
                        fsm,
                        ..
                    } = &mut *self.ts;
                    let TransactionElement { files, .. } = &mut elements[self.element];
                    fsm.run(
                        FsmMode::Build,
                        FsmRequest {
                            root,
                            files,
                            payload: Some(Payload::Write(&mut writer)),
                            // stream every file out regardless of its
                            // planned disposition
                            force_action: Some(FileAction::CopyOut),
                        },
                    )
                };

                stream.map_err(|e| {
                    self.failed_file = e.failed_file.clone();
                    Error::UnpackError {
                        file: e.failed_file,
                        reason: e.reason,
                    }
                })?;

                writer.finish()
            }
        }
    }

    fn stage_post(&mut self) -> Result<()> {
        if self.ts.flags.test {
            return Ok(());
        }

        match self.goal {
            Goal::Install => {
                let install_time = chrono::Utc::now().timestamp() as u32;
                {
                    let elem = &mut self.ts.elements[self.element];
                    if elem.files.fc > 0
                        && let Some(bytes) = elem.files.state_bytes()
                    {
                        elem.header.insert(Tag::FileStates, Value::Char(bytes));
                    }
                    elem.header
                        .insert(Tag::InstallTime, Value::Int32(vec![install_time]));
                }

                if self.ts.flags.multilib
                    && let Some(mut stored) = self.other_header.take()
                {
                    if let (Some(new_bits), Some(old_bits)) = (
                        self.element_header().get_u32(Tag::MultiLibs),
                        stored.get_u32(Tag::MultiLibs),
                    ) {
                        stored.insert(Tag::MultiLibs, Value::Int32(vec![old_bits | new_bits]));
                    }

                    {
                        let elem = &self.ts.elements[self.element];
                        multilib::merge_files(&mut stored, &elem.header, &elem.files.actions)?;
                    }
                    // the merged header is what the database keeps
                    self.ts.elements[self.element].header = stored;
                }

                // If this package was already installed, remove the old
                // record before adding the new one.
                let previous = self.ts.elements[self.element].files.record;
                if previous != 0 && !self.ts.flags.apply_only {
                    self.stage(Stage::DbRemove)?;
                }
                self.stage(Stage::DbAdd)?;

                self.script_tag = Some(Tag::PostIn);
                self.prog_tag = Some(Tag::PostInProg);
                self.sense = DepFlags(DepFlags::TRIGGER_IN);
                self.count_correction = 0;

                if !self.ts.flags.no_post {
                    self.stage(Stage::Script)?;
                }
                if !self.ts.flags.no_trigger_in {
                    // Triggers in other packages this install sets off.
                    self.stage(Stage::Triggers)?;
                    // Triggers in this package other packages set off.
                    self.stage(Stage::ImmedTriggers)?;
                }

                if !self.ts.flags.apply_only {
                    self.mark_replaced_files()?;
                }
            }
            Goal::Erase => {
                self.script_tag = Some(Tag::PostUn);
                self.prog_tag = Some(Tag::PostUnProg);
                self.sense = DepFlags(DepFlags::TRIGGER_POSTUN);
                self.count_correction = -1;

                if !self.ts.flags.no_postun
                    && let Err(e) = self.stage(Stage::Script)
                {
                    // postun failures do not fail the erasure
                    warn!("{}: %postun scriptlet failed, ignoring: {}", self.nevr(), e);
                }

                if !self.ts.flags.no_trigger_postun {
                    self.stage(Stage::Triggers)?;
                }

                if !self.ts.flags.apply_only {
                    self.stage(Stage::DbRemove)?;
                }
            }
            Goal::Repackage => {}
        }

        // Restore root directory if changed.
        self.stage(Stage::ChrootOut)
    }

    fn stage_fini(&mut self) -> Result<()> {
        // Restore root directory if changed; idempotent when POST
        // already left.
        let chroot_rc = self.stage(Stage::ChrootOut);

        if let Some(out) = self.out.take() {
            drop(out);
        }

        if self.goal == Goal::Repackage
            && !self.had_error
            && let Some(path) = &self.out_path
        {
            info!("wrote: {}", path.display());
        }

        if self.had_error {
            match &self.failed_file {
                Some(f) => error!("{} failed on file {}", self.step_name, f),
                None => error!("{} failed", self.step_name),
            }
            self.what = CallbackWhat::CpioError;
            self.amount = 0;
            self.total = 0;
            let _ = self.stage(Stage::Notify);
        }

        // Release transient scope state.
        self.io_flags = None;
        self.failed_file = None;
        self.other_header = None;
        self.out_path = None;
        {
            let files = &mut self.ts.elements[self.element].files;
            files.archive_paths = Vec::new();
            files.uids = Vec::new();
            files.gids = Vec::new();
        }

        chroot_rc
    }

    /// Run the current scriptlet from the element header
    fn stage_script(&mut self) -> Result<()> {
        let Some(script_tag) = self.script_tag else {
            return Ok(());
        };

        let ts: &Transaction = &*self.ts;
        let h = &ts.elements[self.element].header;
        let script = h.get_string(script_tag);
        let prog = self.prog_tag.and_then(|t| h.get_argv(t));

        scriptlet::run_script(
            ts,
            h,
            section_name(script_tag),
            prog.as_deref(),
            script,
            Some(self.script_arg),
            None,
        )
    }

    fn stage_db_load(&mut self) -> Result<()> {
        let record = self.ts.elements[self.element].files.record;
        if record == 0 {
            return Err(Error::NotFound(
                "element has no installed record offset".to_string(),
            ));
        }
        let h = self.ts.db().load(record).map_err(|e| {
            error!("header #{} not found", record);
            e
        })?;
        self.ts.elements[self.element].header = h;
        Ok(())
    }

    fn stage_db_add(&mut self) -> Result<()> {
        if self.ts.flags.test {
            return Ok(());
        }
        let id = self.ts.id();
        let elem = &self.ts.elements[self.element];
        self.ts.db().add(id, &elem.header)?;
        Ok(())
    }

    fn stage_db_remove(&mut self) -> Result<()> {
        if self.ts.flags.test {
            return Ok(());
        }
        let record = self.ts.elements[self.element].files.record;
        self.ts.db().remove(self.ts.id(), record)?;
        Ok(())
    }

    fn stage_commit(&mut self) -> Result<()> {
        if !self.ts.flags.pkg_commit || self.ts.flags.apply_only {
            return Ok(());
        }

        let stream = {
            let Transaction {
                root,
                elements,
                fsm,
                ..
            } = &mut *self.ts;
            let TransactionElement { files, .. } = &mut elements[self.element];
            fsm.run(
                FsmMode::Commit,
                FsmRequest {
                    root,
                    files,
                    payload: None,
                    force_action: None,
                },
            )
        };

        stream.map_err(|e| {
            self.failed_file = e.failed_file.clone();
            Error::UnpackError {
                file: e.failed_file,
                reason: e.reason,
            }
        })
    }

    /// Mark files shared with this package in other installed packages
    /// as replaced. Grouped by package so each touched record is
    /// rewritten once.
    fn mark_replaced_files(&mut self) -> Result<()> {
        let (fc, replaced) = {
            let files = &self.ts.elements[self.element].files;
            (files.fc, files.replaced.clone())
        };
        if fc == 0 || replaced.is_empty() {
            return Ok(());
        }

        let mut offsets: Vec<u64> = Vec::new();
        for sfi in &replaced {
            if !offsets.contains(&sfi.other_record) {
                offsets.push(sfi.other_record);
            }
        }

        let mut mi = self.ts.db().find_by_records(&offsets)?;
        while let Some(entry) = mi.next() {
            let Some(states) = entry
                .header
                .get_char_array(Tag::FileStates)
                .map(|s| s.to_vec())
            else {
                continue;
            };

            let mut states = states;
            let mut modified = false;
            for sfi in replaced.iter().filter(|s| s.other_record == entry.record) {
                if sfi.other_file_num < states.len()
                    && states[sfi.other_file_num] != FileState::Replaced as u8
                {
                    states[sfi.other_file_num] = FileState::Replaced as u8;
                    modified = true;
                }
            }

            if modified {
                entry.header.insert(Tag::FileStates, Value::Char(states));
                // modified entries are rewritten when the iterator closes
                entry.modified = true;
            }
        }
        mi.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::PackageDb;
    use crate::fileinfo::SharedFileInfo;

    fn header(name: &str, version: &str, release: &str) -> Header {
        let mut h = Header::new();
        h.insert(Tag::Name, Value::String(name.to_string()));
        h.insert(Tag::Version, Value::String(version.to_string()));
        h.insert(Tag::Release, Value::String(release.to_string()));
        h
    }

    fn test_ts() -> Transaction {
        let mut ts = Transaction::new("/", PackageDb::open_in_memory().unwrap()).unwrap();
        ts.set_id(1000);
        ts
    }

    #[test]
    fn test_justdb_install_adds_record() {
        let mut ts = test_ts();
        ts.flags.justdb = true;
        let idx = ts.add_install_element(header("a", "1", "1"), None).unwrap();

        Psm::new(&mut ts, idx).install().unwrap();
        assert_eq!(ts.db().count_packages("a").unwrap(), 1);
    }

    #[test]
    fn test_install_replaces_same_nevr_record() {
        let mut ts = test_ts();
        ts.flags.justdb = true;
        let old_record = ts.db().add(999, &header("a", "1", "1")).unwrap();

        let idx = ts.add_install_element(header("a", "1", "1"), None).unwrap();
        Psm::new(&mut ts, idx).install().unwrap();

        // exactly one record with this NEVR remains, and it is a new one
        let mi = ts.db().find_by_nevr("a", "1", "1").unwrap();
        assert_eq!(mi.count(), 1);
        assert!(ts.db().load(old_record).is_err());
    }

    #[test]
    fn test_test_flag_touches_nothing() {
        let mut ts = test_ts();
        ts.flags.test = true;
        let idx = ts.add_install_element(header("a", "1", "1"), None).unwrap();

        Psm::new(&mut ts, idx).install().unwrap();
        assert_eq!(ts.db().count_packages("a").unwrap(), 0);
    }

    #[test]
    fn test_erase_without_record_fails_init() {
        let mut ts = test_ts();
        let idx = ts.add_erase_element(header("a", "1", "1"), 0).unwrap();
        assert!(Psm::new(&mut ts, idx).erase().is_err());
    }

    #[test]
    fn test_justdb_erase_removes_record() {
        let mut ts = test_ts();
        ts.flags.justdb = true;
        let record = ts.db().add(999, &header("a", "1", "1")).unwrap();

        let idx = ts.add_erase_element(header("a", "1", "1"), record).unwrap();
        Psm::new(&mut ts, idx).erase().unwrap();
        assert_eq!(ts.db().count_packages("a").unwrap(), 0);
    }

    #[test]
    fn test_mark_replaced_files() {
        let mut ts = test_ts();
        let mut other = header("other", "1", "1");
        other.insert(Tag::FileStates, Value::Char(vec![0, 0, 0]));
        let other_record = ts.db().add(1, &other).unwrap();

        let mut h = header("a", "1", "1");
        h.insert(Tag::BaseNames, Value::StringArray(vec!["f".to_string()]));
        h.insert(Tag::DirIndexes, Value::Int32(vec![0]));
        h.insert(Tag::DirNames, Value::StringArray(vec!["/x/".to_string()]));
        let idx = ts.add_install_element(h, None).unwrap();
        ts.elements[idx].files.replaced = vec![
            SharedFileInfo {
                other_record,
                other_file_num: 1,
            },
            SharedFileInfo {
                other_record,
                other_file_num: 2,
            },
        ];

        let mut psm = Psm::new(&mut ts, idx);
        psm.mark_replaced_files().unwrap();

        let back = ts.db().load(other_record).unwrap();
        assert_eq!(
            back.get_char_array(Tag::FileStates),
            Some(&[0u8, 1, 1][..])
        );
    }
}
