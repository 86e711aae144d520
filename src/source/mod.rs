// src/source/mod.rs

//! Source-package installation bootstrap
//!
//! A source package installs into the configured source and spec
//! directories rather than the filesystem tree its header describes.
//! This entry reads the package file, synthesizes a one-element
//! transaction with every file marked for creation, rewrites the
//! directory table so sources land in `%{_sourcedir}` and the spec file
//! in `%{_specdir}`, and drives the state machine through PROCESS and
//! FINI only.

use crate::error::{Error, Result};
use crate::fileinfo::{FileAction, FileFlags};
use crate::fsm::MapFlags;
use crate::header::codec::{self, LeadKind};
use crate::header::Tag;
use crate::macros;
use crate::psm::Psm;
use crate::transaction::{Transaction, TransactionElement};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of a successful source install
#[derive(Debug)]
pub struct SourceInstall {
    /// Where the spec file landed
    pub spec_file: PathBuf,
    /// The package's build cookie, when it carries one
    pub cookie: Option<String>,
}

/// Ensure a directory exists and is writable, creating the final path
/// component when absent.
///
/// Remote URL destinations are accepted as-is (creation is the remote
/// side's business), as is the `-`/`/dev/null` sink.
fn ensure_dir(root: &Path, macro_name: &str, what: &str) -> Result<PathBuf> {
    let raw = macros::expand(macro_name);
    if raw.starts_with('%') {
        return Err(Error::CreateError(format!(
            "%{} is not configured",
            what
        )));
    }

    if raw == "-" || raw == "/dev/null" {
        return Ok(PathBuf::from(raw));
    }
    if raw.contains("://") && !raw.starts_with("file://") {
        debug!("accepting remote %{} {}", what, raw);
        return Ok(PathBuf::from(raw));
    }

    let path = if root == Path::new("/") {
        PathBuf::from(&raw)
    } else {
        root.join(raw.trim_start_matches('/'))
    };

    if !path.exists() {
        std::fs::create_dir(&path)
            .map_err(|e| Error::CreateError(format!("%{} {}: {}", what, path.display(), e)))?;
    }

    let writable = nix::unistd::access(&path, nix::unistd::AccessFlags::W_OK).is_ok();
    if !writable {
        return Err(Error::CreateError(format!(
            "cannot write to %{} {}",
            what,
            path.display()
        )));
    }

    Ok(path)
}

/// Install a source package from `path`, returning the resolved spec
/// file location.
pub fn install_source_package(ts: &mut Transaction, path: &Path) -> Result<SourceInstall> {
    let mut file = File::open(path)?;
    let pkg = codec::read_package(&mut file)?;
    if !pkg.size_ok {
        // tolerated: surfaced to the caller as a warning only
        warn!("{}: {}", path.display(), Error::BadSize);
    }

    if pkg.lead.kind != LeadKind::Source && !pkg.header.has(Tag::SourcePackage) {
        return Err(Error::NotSourcePackage);
    }

    let header = pkg.header;
    let cookie = header.get_string(Tag::Cookie).map(str::to_string);
    macros::define_header_macros(&header);

    // One-element transaction: every file is created fresh, owned by
    // the invoking user, with archive names taken verbatim.
    let element = ts.add_install_element(header, Some(file))?;
    let spec_index;
    {
        let TransactionElement { header, files, .. } = &mut ts.elements[element];
        let fc = files.fc;

        files.uid = nix::unistd::getuid().as_raw();
        files.gid = nix::unistd::getgid().as_raw();
        files.ensure_ids();
        files.actions = vec![FileAction::Create; fc];
        files.strip_len = 0;
        files.map_flags = MapFlags::all();
        // digests are not verified on source install
        files.digests = vec![String::new(); fc];
        files.build_archive_paths(header);

        // The spec file is flagged explicitly in cookie-bearing
        // packages; older ones are identified by suffix.
        let mut by_flag = None;
        if header.has(Tag::Cookie) {
            by_flag = files
                .flags
                .iter()
                .position(|f| f.contains(FileFlags::SPECFILE));
        }
        spec_index = by_flag.or_else(|| {
            files
                .archive_paths
                .iter()
                .position(|p| p.ends_with(".spec"))
        });
    }

    let source_dir = ensure_dir(ts.root(), "%{_sourcedir}", "sourcedir")?;
    let spec_dir = ensure_dir(ts.root(), "%{_specdir}", "specdir")?;

    let Some(spec_index) = spec_index else {
        return Err(Error::NoSpecFile);
    };

    let spec_file;
    {
        let files = &mut ts.elements[element].files;

        // Two-entry directory table: sources, then the spec directory.
        files.dir_names = vec![
            format!("{}/", source_dir.display()),
            format!("{}/", spec_dir.display()),
        ];
        files.dir_indexes = vec![0; files.fc];
        files.dir_indexes[spec_index] = 1;

        spec_file = spec_dir.join(&files.basenames[spec_index]);
    }

    let mut psm = Psm::new(ts, element);
    psm.install_payload()?;

    Ok(SourceInstall { spec_file, cookie })
}
