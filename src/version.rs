//! Semantic version ordering.
//!
//! Versions are `MAJOR.MINOR.PATCH` with numeric comparison per component.
//! Missing components default to zero, so `1.2` == `1.2.0`. Anything that
//! is not a run of dot-separated integers is rejected.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "empty version"));
        }

        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() > 3 {
            return Err(invalid(input, "more than three components"));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(
                    input,
                    &format!("component {part:?} is not numeric"),
                ));
            }
            *slot = part
                .parse()
                .map_err(|err| invalid(input, &format!("component {part:?}: {err}")))?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

fn invalid(input: &str, reason: &str) -> crate::error::GraftError {
    ValidationError::InvalidVersion {
        input: input.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

impl FromStr for Version {
    type Err = crate::error::GraftError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two version strings.
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    Ok(Version::parse(a)?.cmp(&Version::parse(b)?))
}

/// True when `from < version <= to`.
pub fn in_upgrade_window(version: &Version, from: &Version, to: &Version) -> bool {
    version > from && version <= to
}

/// Sort version strings ascending; fails on the first invalid entry.
pub fn sort_versions(versions: &mut [String]) -> Result<()> {
    for version in versions.iter() {
        Version::parse(version)?;
    }
    versions.sort_by(|a, b| compare(a, b).unwrap_or(Ordering::Equal));
    Ok(())
}
