// src/db/mod.rs

//! Package database gateway
//!
//! Headers are stored as canonical blobs keyed by a monotonically
//! assigned record offset, with small side tables for the lookups the
//! state machine needs: package name and declared trigger names. The
//! on-disk schema is private to this gateway.
//!
//! Iteration happens through [`MatchIterator`]: a finite, non-restartable
//! sequence of (record, header) entries loaded up front. An entry marked
//! modified is rewritten exactly once when the iterator is closed, which
//! is how replaced-file states reach disk.

use crate::error::{Error, Result};
use crate::header::codec::{decode_header, encode_header};
use crate::header::{Header, Tag};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tracing::debug;

/// Gateway to the installed-package database
pub struct PackageDb {
    conn: Connection,
}

impl PackageDb {
    /// Open (creating if needed) a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS packages (
                record INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                release TEXT NOT NULL,
                install_tid INTEGER NOT NULL,
                header BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_packages_name ON packages(name);

            CREATE TABLE IF NOT EXISTS trigger_names (
                record INTEGER NOT NULL REFERENCES packages(record) ON DELETE CASCADE,
                name TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trigger_names_name ON trigger_names(name);
            ",
        )?;
        Ok(Self { conn })
    }

    /// Append a header under the given transaction id; returns its
    /// record offset.
    pub fn add(&self, tid: u32, h: &Header) -> Result<u64> {
        let name = h.name()?;
        let version = h.version()?;
        let release = h.release()?;

        self.conn.execute(
            "INSERT INTO packages (name, version, release, install_tid, header)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, version, release, tid, encode_header(h)],
        )?;
        let record = self.conn.last_insert_rowid() as u64;

        if let Some(triggers) = h.get_string_array(Tag::TriggerName) {
            let mut seen: Vec<&str> = Vec::new();
            for t in triggers {
                if seen.contains(&t.as_str()) {
                    continue;
                }
                seen.push(t);
                self.conn.execute(
                    "INSERT INTO trigger_names (record, name) VALUES (?1, ?2)",
                    params![record as i64, t],
                )?;
            }
        }

        debug!("added {} as record {} (tid {})", h.nevr(), record, tid);
        Ok(record)
    }

    /// Remove the record at the given offset
    pub fn remove(&self, tid: u32, record: u64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM trigger_names WHERE record = ?1",
            params![record as i64],
        )?;
        let rows = self.conn.execute(
            "DELETE FROM packages WHERE record = ?1",
            params![record as i64],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("package record {}", record)));
        }
        debug!("removed record {} (tid {})", record, tid);
        Ok(())
    }

    /// Load the header stored at a record offset
    pub fn load(&self, record: u64) -> Result<Header> {
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT header FROM packages WHERE record = ?1",
                params![record as i64],
                |row| row.get(0),
            )
            .optional()?;

        match blob {
            Some(bytes) => decode_header(&bytes),
            None => Err(Error::NotFound(format!("package record {}", record))),
        }
    }

    /// Number of installed packages with this name
    pub fn count_packages(&self, name: &str) -> Result<u32> {
        let n: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM packages WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    fn collect(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<MatchEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (record, blob) = row?;
            entries.push(MatchEntry {
                record: record as u64,
                header: decode_header(&blob)?,
                modified: false,
            });
        }
        Ok(entries)
    }

    /// Iterate every package with the given name
    pub fn find_by_name(&self, name: &str) -> Result<MatchIterator<'_>> {
        let entries = self.collect(
            "SELECT record, header FROM packages WHERE name = ?1 ORDER BY record",
            &[&name],
        )?;
        Ok(MatchIterator::new(self, entries))
    }

    /// Iterate packages matching an exact name/version/release
    pub fn find_by_nevr(
        &self,
        name: &str,
        version: &str,
        release: &str,
    ) -> Result<MatchIterator<'_>> {
        let entries = self.collect(
            "SELECT record, header FROM packages
             WHERE name = ?1 AND version = ?2 AND release = ?3 ORDER BY record",
            &[&name, &version, &release],
        )?;
        Ok(MatchIterator::new(self, entries))
    }

    /// Iterate packages declaring a trigger on the given name
    pub fn find_by_trigger_name(&self, name: &str) -> Result<MatchIterator<'_>> {
        let entries = self.collect(
            "SELECT DISTINCT p.record, p.header FROM packages p
             JOIN trigger_names t ON t.record = p.record
             WHERE t.name = ?1 ORDER BY p.record",
            &[&name],
        )?;
        Ok(MatchIterator::new(self, entries))
    }

    /// Iterate specific records, in the order given
    pub fn find_by_records(&self, records: &[u64]) -> Result<MatchIterator<'_>> {
        let mut entries = Vec::with_capacity(records.len());
        for &record in records {
            let blob: Option<Vec<u8>> = self
                .conn
                .query_row(
                    "SELECT header FROM packages WHERE record = ?1",
                    params![record as i64],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(bytes) = blob {
                entries.push(MatchEntry {
                    record,
                    header: decode_header(&bytes)?,
                    modified: false,
                });
            }
        }
        Ok(MatchIterator::new(self, entries))
    }

    fn rewrite(&self, record: u64, h: &Header) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE packages SET header = ?1 WHERE record = ?2",
            params![encode_header(h), record as i64],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("package record {}", record)));
        }
        debug!("rewrote record {}", record);
        Ok(())
    }
}

/// One iterator position: record offset, decoded header, rewrite flag
#[derive(Debug)]
pub struct MatchEntry {
    pub record: u64,
    pub header: Header,
    /// Set to have the gateway rewrite this record on iterator close
    pub modified: bool,
}

/// Finite, non-restartable walk over matching database entries
pub struct MatchIterator<'db> {
    db: &'db PackageDb,
    entries: Vec<MatchEntry>,
    /// Position of the next entry to yield
    pos: usize,
}

impl<'db> MatchIterator<'db> {
    fn new(db: &'db PackageDb, entries: Vec<MatchEntry>) -> Self {
        Self {
            db,
            entries,
            pos: 0,
        }
    }

    /// Total number of matches
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Advance and return the next entry
    pub fn next(&mut self) -> Option<&mut MatchEntry> {
        if self.pos >= self.entries.len() {
            return None;
        }
        let entry = &mut self.entries[self.pos];
        self.pos += 1;
        Some(entry)
    }

    /// Rewrite every entry marked modified. Each touched record is
    /// written exactly once.
    pub fn close(self) -> Result<()> {
        for entry in &self.entries {
            if entry.modified {
                self.db.rewrite(entry.record, &entry.header)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Value;

    fn header(name: &str, version: &str, release: &str) -> Header {
        let mut h = Header::new();
        h.insert(Tag::Name, Value::String(name.to_string()));
        h.insert(Tag::Version, Value::String(version.to_string()));
        h.insert(Tag::Release, Value::String(release.to_string()));
        h
    }

    #[test]
    fn test_add_load_remove() {
        let db = PackageDb::open_in_memory().unwrap();
        let h = header("a", "1", "1");

        let record = db.add(100, &h).unwrap();
        assert_eq!(db.count_packages("a").unwrap(), 1);

        let loaded = db.load(record).unwrap();
        assert_eq!(loaded, h);

        db.remove(101, record).unwrap();
        assert_eq!(db.count_packages("a").unwrap(), 0);
        assert!(matches!(db.load(record), Err(Error::NotFound(_))));
        assert!(matches!(db.remove(101, record), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_find_by_nevr() {
        let db = PackageDb::open_in_memory().unwrap();
        db.add(1, &header("a", "1", "1")).unwrap();
        db.add(1, &header("a", "2", "1")).unwrap();

        let mut mi = db.find_by_nevr("a", "1", "1").unwrap();
        assert_eq!(mi.count(), 1);
        let entry = mi.next().unwrap();
        assert_eq!(entry.header.version().unwrap(), "1");
        assert!(mi.next().is_none());
        mi.close().unwrap();
    }

    #[test]
    fn test_find_by_trigger_name() {
        let db = PackageDb::open_in_memory().unwrap();
        let mut h = header("watcher", "1", "1");
        h.insert(
            Tag::TriggerName,
            Value::StringArray(vec!["a".to_string(), "a".to_string(), "b".to_string()]),
        );
        db.add(1, &h).unwrap();
        db.add(1, &header("bystander", "1", "1")).unwrap();

        let mi = db.find_by_trigger_name("a").unwrap();
        assert_eq!(mi.count(), 1);
        let mi = db.find_by_trigger_name("zzz").unwrap();
        assert_eq!(mi.count(), 0);
    }

    #[test]
    fn test_modified_entries_rewritten_on_close() {
        let db = PackageDb::open_in_memory().unwrap();
        let mut h = header("a", "1", "1");
        h.insert(Tag::FileStates, Value::Char(vec![0, 0]));
        let record = db.add(1, &h).unwrap();

        let mut mi = db.find_by_records(&[record]).unwrap();
        {
            let entry = mi.next().unwrap();
            entry.header.insert(Tag::FileStates, Value::Char(vec![0, 1]));
            entry.modified = true;
        }
        mi.close().unwrap();

        let back = db.load(record).unwrap();
        assert_eq!(back.get_char_array(Tag::FileStates), Some(&[0u8, 1][..]));
    }

    #[test]
    fn test_unmodified_entries_left_alone() {
        let db = PackageDb::open_in_memory().unwrap();
        let record = db.add(1, &header("a", "1", "1")).unwrap();

        let mut mi = db.find_by_name("a").unwrap();
        {
            let entry = mi.next().unwrap();
            entry.header.insert(Tag::Size, Value::Int32(vec![999]));
            // not marked modified
        }
        mi.close().unwrap();

        let back = db.load(record).unwrap();
        assert!(back.get_u32(Tag::Size).is_none());
    }
}
