//! Numeric version tuples and latest-version selection.

use std::fmt;

use crate::error::ServeError;
use crate::manifest::VersionEntry;

/// One dot-separated component, kept as its digit string without leading
/// zeros so there is no upper bound on its value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Component(String);

impl Component {
    fn parse(digits: &str) -> Option<Self> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let trimmed = digits.trim_start_matches('0');
        Some(Self(if trimmed.is_empty() { "0" } else { trimmed }.to_string()))
    }
}

impl Ord for Component {
    // Without leading zeros, a longer digit string is a larger number.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A version string decomposed into its integer components.
///
/// Ordering is component-wise; when one tuple is a prefix of the other the
/// shorter one sorts first, so `1.2 < 1.2.0 < 1.10`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionTuple(Vec<Component>);

impl VersionTuple {
    /// Parse a dot-separated list of non-negative integers of any size.
    pub fn parse(version: &str) -> Result<Self, ServeError> {
        version
            .split('.')
            .map(Component::parse)
            .collect::<Option<Vec<_>>>()
            .map(Self)
            .ok_or_else(|| ServeError::InvalidVersion {
                version: version.to_string(),
            })
    }

    /// Normalized decimal components.
    pub fn components(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(|c| c.0.as_str())
    }
}

impl fmt::Display for VersionTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = self.components();
        if let Some(first) = parts.next() {
            f.write_str(first)?;
        }
        for part in parts {
            write!(f, ".{part}")?;
        }
        Ok(())
    }
}

/// Pick the highest version among `entries`.
///
/// Every entry must parse; one bad version string fails the whole lookup.
/// When two entries compare equal the one listed later wins.
pub fn latest<'a, I>(entries: I) -> Result<(VersionTuple, &'a VersionEntry), ServeError>
where
    I: IntoIterator<Item = &'a VersionEntry>,
{
    let mut best: Option<(VersionTuple, &'a VersionEntry)> = None;

    for entry in entries {
        let tuple = VersionTuple::parse(&entry.version)?;
        let replace = match &best {
            Some((current, _)) => tuple >= *current,
            None => true,
        };
        if replace {
            best = Some((tuple, entry));
        }
    }

    best.ok_or(ServeError::EmptyManifest)
}
