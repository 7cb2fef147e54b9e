//! Ordered version numbers for platform releases and SDK tools.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// A dotted version number with up to three components.
///
/// Ordering compares major, then minor, then patch, which matches how
/// platform releases and `build-tools` directory names sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const ZERO: Version = Version {
        major: 0,
        minor: 0,
        patch: 0,
    };

    pub const fn new(major: u32, minor: u32) -> Self {
        Version {
            major,
            minor,
            patch: 0,
        }
    }

    pub const fn with_patch(major: u32, minor: u32, patch: u32) -> Self {
        Version {
            major,
            minor,
            patch,
        }
    }

    /// The first version of the next major release.
    pub const fn next_major(self) -> Version {
        Version::new(self.major + 1, 0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if self.patch != 0 {
            write!(f, ".{}", self.patch)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid version: '{0}'")]
pub struct VersionParseError(pub String);

impl FromStr for Version {
    type Err = VersionParseError;

    /// Parses `<major>`, `<major>.<minor>` or `<major>.<minor>.<patch>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Err(VersionParseError(s.to_string()));
        }

        let mut parts = [0u32; 3];
        let mut count = 0;
        for piece in text.split('.') {
            if count == parts.len() {
                return Err(VersionParseError(s.to_string()));
            }
            parts[count] = piece
                .parse()
                .map_err(|_| VersionParseError(s.to_string()))?;
            count += 1;
        }

        Ok(Version::with_patch(parts[0], parts[1], parts[2]))
    }
}
