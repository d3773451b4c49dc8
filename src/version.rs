//! Version normalization and comparison
//!
//! Version strings found in `readme.txt` files and vulnerability records are
//! free-form ("1.2.3-beta", "v5", "trunk"). They are reduced to a
//! `major.minor.patch` triple before comparison.

use std::fmt;
use std::num::IntErrorKind;

/// Development branch marker, always treated as the newest version
const TRUNK: &str = "trunk";

/// A normalized `major.minor.patch` triple
///
/// Ordering is lexicographic: major, then minor, then patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    /// Sentinel that compares greater than every numeric version
    pub const TRUNK: Version = Version {
        major: u64::MAX,
        minor: u64::MAX,
        patch: u64::MAX,
    };

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Normalize an arbitrary version string
    ///
    /// Every character other than a digit, `.` or `-` is dropped, the rest is
    /// split on `.`/`-`, and the first three segments are parsed. Empty or
    /// unparsable segments count as 0 and missing segments are padded with 0.
    pub fn normalize(raw: &str) -> Self {
        if raw.trim() == TRUNK {
            return Self::TRUNK;
        }

        let sanitized: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
            .collect();

        let mut parts = sanitized
            .split(['.', '-'])
            .map(parse_segment);

        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            patch: parts.next().unwrap_or(0),
        }
    }
}

/// Digits-only segment; overflow saturates just below the trunk sentinel
fn parse_segment(segment: &str) -> u64 {
    match segment.parse::<u64>() {
        Ok(n) => n,
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => u64::MAX - 1,
        Err(_) => 0,
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::TRUNK {
            return write!(f, "{}", TRUNK);
        }
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Whether a vulnerability fixed in `fixed_in` still affects `installed`
///
/// True only when the fix is strictly newer than the installed version.
pub fn is_still_vulnerable(fixed_in: &str, installed: &str) -> bool {
    Version::normalize(fixed_in) > Version::normalize(installed)
}
