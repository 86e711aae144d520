// src/macros/mod.rs

//! Process-wide macro table
//!
//! The macro context is a deliberate global, shared by every transaction
//! in the process: the state machine defines per-header macros during
//! INIT, scriptlet environment construction consults
//! `%{_install_script_path}`, and the source bootstrap resolves
//! `%{_sourcedir}` and `%{_specdir}`. Re-entrancy within one process is
//! not supported; callers must not expect isolated macro namespaces.
//!
//! The full macro language lives in an external expander. This table
//! implements only what the runtime needs: flat definitions and bounded
//! `%{name}` substitution, leaving unknown references verbatim.

use crate::header::{Header, Tag};
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

static TABLE: LazyLock<Mutex<HashMap<String, String>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Substitution passes before giving up on self-referential macros
const MAX_DEPTH: usize = 16;

/// Define or redefine a macro
pub fn define(name: &str, value: &str) {
    let mut table = TABLE.lock().expect("macro table poisoned");
    table.insert(name.to_string(), value.to_string());
}

/// Remove a macro definition
pub fn undefine(name: &str) {
    let mut table = TABLE.lock().expect("macro table poisoned");
    table.remove(name);
}

/// Look up a macro's raw (unexpanded) value
pub fn lookup(name: &str) -> Option<String> {
    let table = TABLE.lock().expect("macro table poisoned");
    table.get(name).cloned()
}

/// Expand `%{name}` references in `text`.
///
/// Unknown references are left in place, so callers can detect an
/// unexpanded result by the leading `%`.
pub fn expand(text: &str) -> String {
    let mut out = text.to_string();

    for _ in 0..MAX_DEPTH {
        let expanded = expand_once(&out);
        if expanded == out {
            break;
        }
        out = expanded;
    }

    out
}

fn expand_once(text: &str) -> String {
    let table = TABLE.lock().expect("macro table poisoned");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("%{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match table.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        // keep unknown references verbatim
                        out.push_str(&rest[start..start + 2 + end + 1]);
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Per-header macros defined when a package enters the state machine
pub fn define_header_macros(h: &Header) {
    if let Some(name) = h.get_string(Tag::Name) {
        define("name", name);
    }
    if let Some(version) = h.get_string(Tag::Version) {
        define("version", version);
    }
    if let Some(release) = h.get_string(Tag::Release) {
        define("release", release);
    }
    if let Some(epoch) = h.get_u32(Tag::Epoch) {
        define("epoch", &epoch.to_string());
    }
}
