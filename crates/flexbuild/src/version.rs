//! FlexBoot version strings (`A.B.C`).

use crate::error::BuildError;
use std::fmt;
use std::str::FromStr;

/// Widest decimal component the ROM header can carry (fits in 16 bits).
const MAX_COMPONENT_DIGITS: usize = 4;

/// A parsed `major.minor.patch` version.
///
/// The original text is kept so output names match what the user typed
/// (`3.4.0160` stays `3.4.0160`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionSpec {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    text: String,
}

impl VersionSpec {
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl FromStr for VersionSpec {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BuildError::InvalidVersionFormat(s.to_string());

        let parts: Vec<&str> = s.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(invalid());
        };

        let component = |p: &str| -> Result<u16, BuildError> {
            if p.is_empty()
                || p.len() > MAX_COMPONENT_DIGITS
                || !p.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(invalid());
            }
            p.parse().map_err(|_| invalid())
        };

        Ok(Self {
            major: component(*major)?,
            minor: component(*minor)?,
            patch: component(*patch)?,
            text: s.to_string(),
        })
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
