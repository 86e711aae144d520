// tests/source_install.rs

//! Source packages install into the configured source and spec
//! directories and return the resolved spec path.

mod common;

use common::{add_files, simple_header, test_transaction};
use pallet::header::codec::{self, Lead};
use pallet::{FileFlags, FsmMode, Tag, Value, install_source_package};
use std::io::Write;
use std::sync::Mutex;

/// The macro table is process-wide; tests that set the source/spec
/// macros take turns.
static MACRO_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn source_install_routes_files_and_returns_spec() {
    let _serial = MACRO_LOCK.lock().unwrap();
    let root = tempfile::tempdir().unwrap();
    // source installs run against the live root; only the macro
    // directories point into the test area
    let (mut ts, _events, calls) = test_transaction(std::path::Path::new("/"));

    let sourcedir = root.path().join("S");
    let specdir = root.path().join("P");
    pallet::macros::define("_sourcedir", &sourcedir.to_string_lossy());
    pallet::macros::define("_specdir", &specdir.to_string_lossy());

    // a source package holding a tarball and a flagged spec file
    let mut h = simple_header("foo", "1", "1", None);
    add_files(
        &mut h,
        &[
            ("src/", "foo.tar.gz", 0o644, 1024, "root", "root", 0),
            ("src/", "foo.spec", 0o644, 128, "root", "root", FileFlags::SPECFILE),
        ],
    );
    h.insert(Tag::SourcePackage, Value::Int32(vec![1]));
    h.insert(Tag::Cookie, Value::String("build-cookie-1".to_string()));

    let pkg_path = root.path().join("foo-1-1.src.pallet");
    {
        let mut out = std::fs::File::create(&pkg_path).unwrap();
        codec::write_package(&mut out, &Lead::source("foo-1-1"), &h).unwrap();
        // archive payload follows the headers
        let mut enc = flate2::write::GzEncoder::new(&mut out, flate2::Compression::fast());
        enc.write_all(b"tar bytes").unwrap();
        enc.finish().unwrap();
    }

    let result = install_source_package(&mut ts, &pkg_path).unwrap();

    pallet::macros::undefine("_sourcedir");
    pallet::macros::undefine("_specdir");

    // both directories were created and populated
    assert_eq!(result.spec_file, specdir.join("foo.spec"));
    assert_eq!(result.cookie.as_deref(), Some("build-cookie-1"));
    assert!(sourcedir.join("foo.tar.gz").exists());
    assert!(specdir.join("foo.spec").exists());
    // sources never land in the spec directory and vice versa
    assert!(!specdir.join("foo.tar.gz").exists());
    assert!(!sourcedir.join("foo.spec").exists());

    {
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].mode, FsmMode::Install);
        assert!(calls[0].had_payload);
        assert_eq!(calls[0].file_count, 2);
    }
}

#[test]
fn spec_found_by_suffix_without_cookie() {
    let _serial = MACRO_LOCK.lock().unwrap();
    let root = tempfile::tempdir().unwrap();
    let (mut ts, _events, _calls) = test_transaction(std::path::Path::new("/"));

    let sourcedir = root.path().join("S2");
    let specdir = root.path().join("P2");
    pallet::macros::define("_sourcedir", &sourcedir.to_string_lossy());
    pallet::macros::define("_specdir", &specdir.to_string_lossy());

    // no cookie, no spec-file flag: identified by the .spec suffix
    let mut h = simple_header("bar", "2", "1", None);
    add_files(
        &mut h,
        &[
            ("src/", "bar.tar.gz", 0o644, 10, "root", "root", 0),
            ("src/", "bar.spec", 0o644, 10, "root", "root", 0),
        ],
    );
    h.insert(Tag::SourcePackage, Value::Int32(vec![1]));

    let pkg_path = root.path().join("bar-2-1.src.pallet");
    {
        let mut out = std::fs::File::create(&pkg_path).unwrap();
        codec::write_package(&mut out, &Lead::source("bar-2-1"), &h).unwrap();
        let mut enc = flate2::write::GzEncoder::new(&mut out, flate2::Compression::fast());
        enc.write_all(b"payload").unwrap();
        enc.finish().unwrap();
    }

    let result = install_source_package(&mut ts, &pkg_path).unwrap();
    assert_eq!(result.spec_file, specdir.join("bar.spec"));
    assert_eq!(result.cookie, None);

    pallet::macros::undefine("_sourcedir");
    pallet::macros::undefine("_specdir");
}

#[test]
fn package_without_spec_is_rejected() {
    let _serial = MACRO_LOCK.lock().unwrap();
    let root = tempfile::tempdir().unwrap();
    let (mut ts, _events, _calls) = test_transaction(std::path::Path::new("/"));

    let sourcedir = root.path().join("S3");
    let specdir = root.path().join("P3");
    pallet::macros::define("_sourcedir", &sourcedir.to_string_lossy());
    pallet::macros::define("_specdir", &specdir.to_string_lossy());

    let mut h = simple_header("nospec", "1", "1", None);
    add_files(
        &mut h,
        &[("src/", "nospec.tar.gz", 0o644, 10, "root", "root", 0)],
    );
    h.insert(Tag::SourcePackage, Value::Int32(vec![1]));

    let pkg_path = root.path().join("nospec-1-1.src.pallet");
    {
        let mut out = std::fs::File::create(&pkg_path).unwrap();
        codec::write_package(&mut out, &Lead::source("nospec-1-1"), &h).unwrap();
        let mut enc = flate2::write::GzEncoder::new(&mut out, flate2::Compression::fast());
        enc.write_all(b"payload").unwrap();
        enc.finish().unwrap();
    }

    let rc = install_source_package(&mut ts, &pkg_path);
    assert!(matches!(rc, Err(pallet::Error::NoSpecFile)));

    pallet::macros::undefine("_sourcedir");
    pallet::macros::undefine("_specdir");
}
