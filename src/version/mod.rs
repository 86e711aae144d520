// src/version/mod.rs

//! Version handling for package identity and trigger constraints
//!
//! This module provides parsing and comparison for RPM-style versions in
//! epoch:version-release format. Comparison uses the classic segment walk
//! (alternating numeric and alphabetic runs) rather than semver, since
//! package versions in the wild are rarely semver-compliant and trigger
//! constraint matching depends on the exact ordering.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// A parsed version with epoch, version, and release components
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Evr {
    pub epoch: u64,
    pub version: String,
    pub release: Option<String>,
}

impl Evr {
    /// Parse a version string.
    ///
    /// Format: [epoch:]version[-release]
    /// Examples:
    /// - "1.2.3" → epoch=0, version="1.2.3", release=None
    /// - "2:1.2.3" → epoch=2, version="1.2.3", release=None
    /// - "1.2.3-4.el8" → epoch=0, version="1.2.3", release=Some("4.el8")
    pub fn parse(s: &str) -> Result<Self> {
        let (epoch_str, rest) = if let Some(colon_pos) = s.find(':') {
            let (e, r) = s.split_at(colon_pos);
            (e, &r[1..]) // Skip the colon
        } else {
            ("0", s)
        };

        let epoch = if epoch_str.is_empty() {
            0 // Empty epoch (e.g., ":1.0.0") defaults to 0
        } else {
            epoch_str.parse::<u64>().map_err(|e| {
                Error::HeaderError(format!("invalid epoch in version '{}': {}", s, e))
            })?
        };

        let (version, release) = if let Some(dash_pos) = rest.rfind('-') {
            let (v, r) = rest.split_at(dash_pos);
            (v.to_string(), Some(r[1..].to_string()))
        } else {
            (rest.to_string(), None)
        };

        if version.is_empty() {
            return Err(Error::HeaderError(format!(
                "empty version component in '{}'",
                s
            )));
        }

        Ok(Self {
            epoch,
            version,
            release,
        })
    }

    /// Compare two versions: epoch first, then version, then release.
    /// A missing release sorts before any present one.
    pub fn compare(&self, other: &Evr) -> Ordering {
        match self.epoch.cmp(&other.epoch) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match vercmp(&self.version, &other.version) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match (&self.release, &other.release) {
            (Some(a), Some(b)) => vercmp(a, b),
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
        }
    }

    /// Compare against a version constraint. A constraint without a
    /// release matches any release, so that a bare "1.2" covers every
    /// build of 1.2.
    pub fn compare_constraint(&self, want: &Evr) -> Ordering {
        match self.epoch.cmp(&want.epoch) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match vercmp(&self.version, &want.version) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match (&self.release, &want.release) {
            (Some(a), Some(b)) => vercmp(a, b),
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl Ord for Evr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for Evr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two version strings segment by segment.
///
/// Both strings are split into maximal runs of digits or letters; runs are
/// compared pairwise. Numeric runs compare as numbers (leading zeros
/// dropped, longer run wins), alphabetic runs compare lexically, and a
/// numeric run always sorts newer than an alphabetic one. When the shared
/// prefix is equal, the string with segments left over is the newer one.
pub fn vercmp(a: &str, b: &str) -> Ordering {
    let av: Vec<char> = a.chars().collect();
    let bv: Vec<char> = b.chars().collect();
    let (mut i, mut j) = (0, 0);

    loop {
        // Skip separators
        while i < av.len() && !av[i].is_ascii_alphanumeric() {
            i += 1;
        }
        while j < bv.len() && !bv[j].is_ascii_alphanumeric() {
            j += 1;
        }

        if i >= av.len() || j >= bv.len() {
            break;
        }

        let a_digit = av[i].is_ascii_digit();
        let b_digit = bv[j].is_ascii_digit();

        // Numeric segments are newer than alphabetic ones
        if a_digit != b_digit {
            return if a_digit {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let seg = |v: &[char], start: usize, digits: bool| -> usize {
            let mut end = start;
            while end < v.len()
                && v[end].is_ascii_alphanumeric()
                && v[end].is_ascii_digit() == digits
            {
                end += 1;
            }
            end
        };

        let ai = seg(&av, i, a_digit);
        let bj = seg(&bv, j, b_digit);
        let sa: String = av[i..ai].iter().collect();
        let sb: String = bv[j..bj].iter().collect();

        let ord = if a_digit {
            let ta = sa.trim_start_matches('0');
            let tb = sb.trim_start_matches('0');
            match ta.len().cmp(&tb.len()) {
                Ordering::Equal => ta.cmp(tb),
                ord => ord,
            }
        } else {
            sa.cmp(&sb)
        };

        if ord != Ordering::Equal {
            return ord;
        }

        i = ai;
        j = bj;
    }

    let a_left = i < av.len();
    let b_left = j < bv.len();
    match (a_left, b_left) {
        (false, false) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal, // only separators remain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let v = Evr::parse("1.2.3").unwrap();
        assert_eq!(v.epoch, 0);
        assert_eq!(v.version, "1.2.3");
        assert_eq!(v.release, None);
    }

    #[test]
    fn test_parse_full() {
        let v = Evr::parse("2:1.2.3-4.el8").unwrap();
        assert_eq!(v.epoch, 2);
        assert_eq!(v.version, "1.2.3");
        assert_eq!(v.release, Some("4.el8".to_string()));
    }

    #[test]
    fn test_parse_empty_version() {
        assert!(Evr::parse("").is_err());
        assert!(Evr::parse("1:").is_err());
    }

    #[test]
    fn test_vercmp_numeric() {
        assert_eq!(vercmp("1.0", "1.0"), Ordering::Equal);
        assert_eq!(vercmp("1.10", "1.9"), Ordering::Greater);
        assert_eq!(vercmp("1.09", "1.9"), Ordering::Equal);
        assert_eq!(vercmp("2.0", "10.0"), Ordering::Less);
    }

    #[test]
    fn test_vercmp_alpha() {
        assert_eq!(vercmp("1.0a", "1.0b"), Ordering::Less);
        assert_eq!(vercmp("1.0", "1.0a"), Ordering::Less);
        // numeric beats alphabetic
        assert_eq!(vercmp("1.1", "1.a"), Ordering::Greater);
    }

    #[test]
    fn test_epoch_dominates() {
        let a = Evr::parse("1:0.5").unwrap();
        let b = Evr::parse("9.9").unwrap();
        assert_eq!(a.compare(&b), Ordering::Greater);
    }

    #[test]
    fn test_constraint_release_ignored_when_absent() {
        let installed = Evr::parse("1.2-7").unwrap();
        let constraint = Evr::parse("1.2").unwrap();
        assert_eq!(installed.compare_constraint(&constraint), Ordering::Equal);
        // strict ordering still distinguishes them
        assert_eq!(installed.compare(&constraint), Ordering::Greater);
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["1.2.3", "2:1.2.3-4", "1.0-1"] {
            assert_eq!(Evr::parse(s).unwrap().to_string(), s);
        }
    }
}
