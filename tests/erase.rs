// tests/erase.rs

//! Erase scenarios: postun tolerance, uninstall notifications, and
//! database invariants.

mod common;

use common::{add_files, simple_header, test_transaction, whats};
use pallet::{CallbackWhat, FsmMode, Psm, Tag, Value};

#[test]
fn erase_tolerates_failing_postun() {
    let root = tempfile::tempdir().unwrap();
    let (mut ts, events, calls) = test_transaction(root.path());

    // an installed package whose postun exits 3
    let mut h = simple_header("gone", "1", "1", None);
    add_files(
        &mut h,
        &[
            ("/usr/bin/", "gone", 0o755, 50, "root", "root", 0),
            ("/etc/", "gone.conf", 0o644, 5, "root", "root", 0),
        ],
    );
    h.insert(Tag::PostUn, Value::String("exit 3".to_string()));
    let record = ts.db().add(1, &h).unwrap();

    // the files exist on disk before the erase
    for rel in ["usr/bin/gone", "etc/gone.conf"] {
        let p = root.path().join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(&p, b"x").unwrap();
    }

    let idx = ts.add_erase_element(h, record).unwrap();
    // the postun failure is logged, not propagated
    Psm::new(&mut ts, idx).erase().unwrap();

    // record removed, files gone
    assert_eq!(ts.db().count_packages("gone").unwrap(), 0);
    assert!(!root.path().join("usr/bin/gone").exists());
    assert!(!root.path().join("etc/gone.conf").exists());

    {
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].mode, FsmMode::Erase);
        assert!(!calls[0].had_payload);
    }

    let recorded = events.lock().unwrap();
    let start = recorded
        .iter()
        .find(|e| e.1 == CallbackWhat::UninstStart)
        .expect("UninstStart emitted");
    assert_eq!((start.2, start.3), (2, 2));
    let stop = recorded
        .iter()
        .find(|e| e.1 == CallbackWhat::UninstStop)
        .expect("UninstStop emitted");
    assert_eq!((stop.2, stop.3), (0, 2));
}

#[test]
fn failing_preun_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    let (mut ts, _events, calls) = test_transaction(root.path());

    let mut h = simple_header("kept", "1", "1", None);
    add_files(&mut h, &[("/usr/bin/", "kept", 0o755, 50, "root", "root", 0)]);
    h.insert(Tag::PreUn, Value::String("exit 1".to_string()));
    let record = ts.db().add(1, &h).unwrap();

    let idx = ts.add_erase_element(h, record).unwrap();
    assert!(Psm::new(&mut ts, idx).erase().is_err());

    // nothing was erased, the record survives
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(ts.db().count_packages("kept").unwrap(), 1);
}

#[test]
fn erase_loads_installed_header_from_db() {
    let root = tempfile::tempdir().unwrap();
    let (mut ts, _events, _calls) = test_transaction(root.path());
    ts.flags.justdb = true;

    let mut stored = simple_header("tracked", "2", "5", None);
    stored.insert(Tag::InstallTime, Value::Int32(vec![12345]));
    let record = ts.db().add(1, &stored).unwrap();

    // the caller only knows the identity; INIT refreshes from the db
    let idx = ts
        .add_erase_element(simple_header("tracked", "2", "5", None), record)
        .unwrap();
    Psm::new(&mut ts, idx).erase().unwrap();

    assert_eq!(
        ts.elements[idx].header.get_u32(Tag::InstallTime),
        Some(12345)
    );
    assert_eq!(ts.db().count_packages("tracked").unwrap(), 0);
}

#[test]
fn postun_sees_decremented_count() {
    let root = tempfile::tempdir().unwrap();
    let (mut ts, _events, _calls) = test_transaction(root.path());
    ts.flags.justdb = true;

    let marker = root.path().join("count");
    let mut h = simple_header("lastone", "1", "1", None);
    h.insert(
        Tag::PostUn,
        Value::String(format!("echo \"$1\" > {}", marker.display())),
    );
    let record = ts.db().add(1, &h).unwrap();

    let idx = ts.add_erase_element(h, record).unwrap();
    Psm::new(&mut ts, idx).erase().unwrap();

    // one instance installed before, zero once the erase completes
    assert_eq!(std::fs::read_to_string(&marker).unwrap().trim(), "0");
}

#[test]
fn apply_only_keeps_record() {
    let root = tempfile::tempdir().unwrap();
    let (mut ts, _events, calls) = test_transaction(root.path());
    ts.flags.apply_only = true;

    let mut h = simple_header("pinned", "1", "1", None);
    add_files(&mut h, &[("/usr/bin/", "pinned", 0o755, 10, "root", "root", 0)]);
    let record = ts.db().add(1, &h).unwrap();

    let idx = ts.add_erase_element(h, record).unwrap();
    Psm::new(&mut ts, idx).erase().unwrap();

    // apply-only: no file walk, no record removal
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(ts.db().count_packages("pinned").unwrap(), 1);
}
