// src/scriptlet/mod.rs

//! Scriptlet execution
//!
//! Runs a package's pre/post/trigger scripts in a child process. The
//! script body is materialized to a temp file (placed under the target
//! root until the chroot has been entered, so the child can still see it
//! afterwards), the interpreter defaults to /bin/sh, and the child gets
//! a fixed PATH, the package's install prefixes in its environment, a
//! stdin that reads EOF immediately, and — when the transaction is
//! rooted elsewhere — a chroot into the target root.
//!
//! Exit policy: a child that exits non-zero fails the scriptlet; a wait
//! that itself fails is logged and tolerated, since the child may have
//! been reaped by an outer caller and killing the element for it helps
//! nobody.

use crate::error::{Error, Result};
use crate::header::{Header, Tag};
use crate::macros;
use crate::transaction::Transaction;
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, error, warn};

/// PATH installed for scriptlet children when `%{_install_script_path}`
/// is not defined
pub const DEFAULT_SCRIPT_PATH: &str = "/sbin:/bin:/usr/sbin:/usr/bin:/usr/X11R6/bin";

/// Diagnostic name of a scriptlet section
pub fn section_name(tag: Tag) -> &'static str {
    match tag {
        Tag::PreIn => "%pre",
        Tag::PostIn => "%post",
        Tag::PreUn => "%preun",
        Tag::PostUn => "%postun",
        Tag::VerifyScript => "%verify",
        _ => "%unknownscript",
    }
}

/// Run one scriptlet.
///
/// `prog` is the interpreter argv from the header (argv[0] is the
/// interpreter); `script` is the inline script body. Either may be
/// absent; with both absent there is nothing to do. `arg1`/`arg2` are
/// appended in decimal after the script path when set — by convention
/// arg1 is the number of installed instances of the package once the
/// current operation completes.
pub fn run_script(
    ts: &Transaction,
    h: &Header,
    section: &str,
    prog: Option<&[String]>,
    script: Option<&str>,
    arg1: Option<i32>,
    arg2: Option<i32>,
) -> Result<()> {
    if prog.is_none() && script.is_none() {
        return Ok(());
    }

    debug!("running {} scriptlet for {}", section, h.nevr());

    let mut argv: Vec<String> = match prog {
        Some(args) if !args.is_empty() => args.to_vec(),
        _ => vec!["/bin/sh".to_string()],
    };

    // Install prefixes exported to the child, newest tag first
    let prefixes: Vec<String> = if let Some(p) = h.get_string_array(Tag::InstPrefixes) {
        p.to_vec()
    } else if let Some(p) = h.get_string(Tag::InstallPrefix) {
        vec![p.to_string()]
    } else {
        Vec::new()
    };

    // chroot is pending if the target root is elsewhere and nobody has
    // entered it yet; the temp script must live under the root so the
    // child still sees it after chrooting
    let root = ts.root();
    let chroot_pending = !ts.chroot_done() && root != Path::new("/");

    let mut tmp: Option<NamedTempFile> = None;
    if let Some(body) = script {
        let tmp_rel = macros::lookup("_tmppath").unwrap_or_else(|| "/tmp".to_string());
        let tmp_dir = if chroot_pending {
            root.join(tmp_rel.trim_start_matches('/'))
        } else {
            PathBuf::from(&tmp_rel)
        };

        let mut file = Builder::new()
            .prefix(".pallet-script.")
            .tempfile_in(&tmp_dir)
            .map_err(|e| {
                Error::ScriptletError(format!(
                    "cannot create scriptlet file in {}: {}",
                    tmp_dir.display(),
                    e
                ))
            })?;

        if ts.flags.script_debug && (argv[0] == "/bin/sh" || argv[0] == "/bin/bash") {
            file.write_all(b"set -x\n")?;
        }
        file.write_all(body.as_bytes())?;
        file.flush()?;

        // path as the child will see it
        let visible = if chroot_pending {
            let full = file.path().to_string_lossy().into_owned();
            let root_str = root.to_string_lossy();
            full[root_str.trim_end_matches('/').len()..].to_string()
        } else {
            file.path().to_string_lossy().into_owned()
        };
        argv.push(visible);

        if let Some(a) = arg1 {
            argv.push(a.to_string());
        }
        if let Some(a) = arg2 {
            argv.push(a.to_string());
        }

        tmp = Some(file);
    }

    let path_value = {
        let expanded = macros::expand("%{_install_script_path}");
        if expanded.starts_with('%') {
            DEFAULT_SCRIPT_PATH.to_string()
        } else {
            expanded
        }
    };

    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]);
    cmd.env("PATH", &path_value);

    for (i, prefix) in prefixes.iter().enumerate() {
        cmd.env(format!("RPM_INSTALL_PREFIX{}", i), prefix);
        if i == 0 {
            // backwards compatibility
            cmd.env("RPM_INSTALL_PREFIX", prefix);
        }
    }

    // stdin reads EOF immediately: the read end of a pipe whose write
    // end is already closed
    let (pipe_r, pipe_w) = nix::unistd::pipe()
        .map_err(|e| Error::ScriptletError(format!("cannot create stdin pipe: {}", e)))?;
    drop(pipe_w);
    cmd.stdin(Stdio::from(pipe_r));

    if let Some(out) = ts.script_output() {
        cmd.stdout(Stdio::from(out.try_clone()?));
        cmd.stderr(Stdio::from(out.try_clone()?));
    }

    {
        let root = root.to_path_buf();
        unsafe {
            cmd.pre_exec(move || {
                if chroot_pending {
                    nix::unistd::chroot(&root)
                        .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                }
                nix::unistd::chdir("/")
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                Ok(())
            });
        }
    }

    let mut child = cmd.spawn().map_err(|e| {
        Error::ScriptletError(format!(
            "execution of {} scriptlet from {} failed, cannot spawn {}: {}",
            section,
            h.nevr(),
            argv[0],
            e
        ))
    })?;

    let rc = match child.wait() {
        Err(e) => {
            // tolerated: the child may already have been reaped
            error!(
                "execution of {} scriptlet from {} failed, wait returned {}",
                section,
                h.nevr(),
                e
            );
            Ok(())
        }
        Ok(status) if status.success() => Ok(()),
        Ok(status) => {
            let code = status.code().unwrap_or(-1);
            error!(
                "execution of {} scriptlet from {} failed, exit status {}",
                section,
                h.nevr(),
                code
            );
            Err(Error::ScriptletError(format!(
                "{} scriptlet from {} failed, exit status {}",
                section,
                h.nevr(),
                code
            )))
        }
    };

    if let Some(file) = tmp {
        if ts.flags.script_debug {
            match file.keep() {
                Ok((_, path)) => debug!("keeping scriptlet file {}", path.display()),
                Err(e) => warn!("cannot keep scriptlet file: {}", e),
            }
        }
        // otherwise the temp file is removed on drop
    }

    rc
}
