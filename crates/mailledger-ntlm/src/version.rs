//! Operating system version record.

use std::fmt;

/// Windows-style OS version carried in NTLM messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OsVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Build number.
    pub build: u16,
}

impl OsVersion {
    /// Creates a version record.
    #[must_use]
    pub const fn new(major: u8, minor: u8, build: u16) -> Self {
        Self {
            major,
            minor,
            build,
        }
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(OsVersion::new(10, 0, 19041).to_string(), "10.0.19041");
    }
}
