// tests/install.rs

//! End-to-end install scenarios: plain install, failing pre-script,
//! and scriptlet argument counting.

mod common;

use common::{add_files, gz_payload, simple_header, test_transaction, whats};
use pallet::{CallbackWhat, Error, FsmMode, Psm, Tag};

#[test]
fn plain_install() {
    let root = tempfile::tempdir().unwrap();
    let (mut ts, events, calls) = test_transaction(root.path());

    let mut h = simple_header("a", "1", "1", Some(0));
    add_files(
        &mut h,
        &[
            ("/usr/bin/", "a", 0o755, 100, "root", "root", 0),
            ("/etc/", "a.conf", 0o644, 10, "root", "root", 0),
        ],
    );

    let idx = ts
        .add_install_element(h, Some(gz_payload(b"archive members")))
        .unwrap();
    Psm::new(&mut ts, idx).install().unwrap();

    // exactly one record with the new NEVR exists
    let mut mi = ts.db().find_by_nevr("a", "1", "1").unwrap();
    assert_eq!(mi.count(), 1);
    let stored = &mi.next().unwrap().header;
    assert_eq!(stored.get_char_array(Tag::FileStates), Some(&[0u8, 0][..]));
    assert!(stored.get_u32(Tag::InstallTime).is_some());
    mi.close().unwrap();

    // the payload was streamed exactly once
    {
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].mode, FsmMode::Install);
        assert_eq!(calls[0].file_count, 2);
        assert!(calls[0].had_payload);
    }

    // files landed under the root
    assert!(root.path().join("usr/bin/a").exists());
    assert!(root.path().join("etc/a.conf").exists());

    // progress events, no error events
    let seen = whats(&events);
    assert!(seen.contains(&CallbackWhat::InstStart));
    assert!(seen.contains(&CallbackWhat::InstProgress));
    assert!(!seen.contains(&CallbackWhat::UnpackError));
    assert!(!seen.contains(&CallbackWhat::CpioError));
}

#[test]
fn pre_script_failure_stops_element() {
    let root = tempfile::tempdir().unwrap();
    let (mut ts, events, calls) = test_transaction(root.path());

    let mut h = simple_header("a", "1", "1", Some(0));
    add_files(&mut h, &[("/usr/bin/", "a", 0o755, 100, "root", "root", 0)]);
    h.insert(
        Tag::PreIn,
        pallet::Value::String("exit 1".to_string()),
    );

    let idx = ts
        .add_install_element(h, Some(gz_payload(b"unused")))
        .unwrap();
    let rc = Psm::new(&mut ts, idx).install();
    assert!(matches!(rc, Err(Error::ScriptletError(_))));

    // no files materialized, no record added
    assert!(calls.lock().unwrap().is_empty());
    assert!(!root.path().join("usr/bin/a").exists());
    assert_eq!(ts.db().count_packages("a").unwrap(), 0);

    // FINI still ran and reported the failure
    assert!(whats(&events).contains(&CallbackWhat::CpioError));
}

#[test]
fn post_script_sees_installed_count() {
    let root = tempfile::tempdir().unwrap();
    let (mut ts, _events, _calls) = test_transaction(root.path());
    ts.flags.justdb = true;

    let marker = root.path().join("count");
    let body = format!("echo \"$1\" >> {}", marker.display());

    let mut first = simple_header("counted", "1", "1", None);
    first.insert(Tag::PostIn, pallet::Value::String(body.clone()));
    let idx = ts.add_install_element(first, None).unwrap();
    Psm::new(&mut ts, idx).install().unwrap();

    // second install of the same name/different release: count goes up
    let mut second = simple_header("counted", "1", "2", None);
    second.insert(Tag::PostIn, pallet::Value::String(body));
    let idx = ts.add_install_element(second, None).unwrap();
    Psm::new(&mut ts, idx).install().unwrap();

    let text = std::fs::read_to_string(&marker).unwrap();
    let args: Vec<&str> = text.lines().collect();
    assert_eq!(args, vec!["1", "2"]);
}

#[test]
fn unpack_failure_notifies_and_fails() {
    let root = tempfile::tempdir().unwrap();
    let (mut ts, events, _calls) = test_transaction(root.path());

    // swap in a failing double
    let (calls, mut fsm) = common::RecordingFsm::new(true);
    fsm.fail_on = Some("a.conf".to_string());
    ts.set_fsm(Box::new(fsm));

    let mut h = simple_header("a", "1", "1", Some(0));
    add_files(
        &mut h,
        &[
            ("/usr/bin/", "a", 0o755, 100, "root", "root", 0),
            ("/etc/", "a.conf", 0o644, 10, "root", "root", 0),
        ],
    );

    let idx = ts
        .add_install_element(h, Some(gz_payload(b"payload")))
        .unwrap();
    let rc = Psm::new(&mut ts, idx).install();

    match rc {
        Err(Error::UnpackError { file, .. }) => {
            assert_eq!(file.as_deref(), Some("/etc/a.conf"));
        }
        other => panic!("expected UnpackError, got ok={}", other.is_ok()),
    }

    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(ts.db().count_packages("a").unwrap(), 0);

    let seen = whats(&events);
    assert!(seen.contains(&CallbackWhat::UnpackError));
    assert!(seen.contains(&CallbackWhat::CpioError));
}

#[test]
fn empty_payload_synthesizes_progress() {
    let root = tempfile::tempdir().unwrap();
    let (mut ts, events, calls) = test_transaction(root.path());

    let h = simple_header("hollow", "1", "1", None);
    let idx = ts.add_install_element(h, None).unwrap();
    Psm::new(&mut ts, idx).install().unwrap();

    // no files: the driver synthesizes the progress pair itself
    let recorded = events.lock().unwrap();
    let progress: Vec<_> = recorded
        .iter()
        .filter(|e| {
            matches!(
                e.1,
                CallbackWhat::InstStart | CallbackWhat::InstProgress
            )
        })
        .collect();
    assert_eq!(progress.len(), 2);
    assert_eq!(
        (progress[0].1, progress[0].2, progress[0].3),
        (CallbackWhat::InstStart, 0, 100)
    );
    assert_eq!(
        (progress[1].1, progress[1].2, progress[1].3),
        (CallbackWhat::InstProgress, 100, 100)
    );
    drop(recorded);

    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(ts.db().count_packages("hollow").unwrap(), 1);
}
