//! Version normalization and stability classification.
//!
//! Versions are normalized to four numeric components plus an optional
//! stability suffix:
//! ```text
//! 1.23        -> 1.23.0.0
//! 1.4-beta.1  -> 1.4.0.0-beta1
//! 1.0a2       -> 1.0.0.0-alpha2
//! 2.0-dev     -> 2.0.0.0-dev
//! ```

use crate::constraint::ConstraintError;
use regex::{Captures, Regex};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Optional stability modifier accepted after the numeric part of a version.
pub(crate) const MODIFIER_PATTERN: &str =
    r"[._-]?(?:(stable|beta|b|RC|alpha|a|patch|pl|p)((?:[.-]?\d+)*)?)?([.-]?dev)?";

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)^v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.(\d+))?{MODIFIER_PATTERN}(?:\+\S+)?$"
        ))
        .expect("version pattern is valid")
    })
}

fn stability_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?i){MODIFIER_PATTERN}(?:\+.*)?$"))
            .expect("stability pattern is valid")
    })
}

/// Pre-release or post-release marker of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Alpha,
    Beta,
    Rc,
    Patch,
}

impl Modifier {
    /// Expand a modifier as written in a version string (`a`, `b`, `rc`, `pl`, ...).
    ///
    /// `stable` carries no modifier and yields `None`.
    pub fn expand(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "a" | "alpha" => Some(Self::Alpha),
            "b" | "beta" => Some(Self::Beta),
            "rc" => Some(Self::Rc),
            "p" | "pl" | "patch" => Some(Self::Patch),
            _ => None,
        }
    }

    /// Returns the normalized spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alpha => "alpha",
            Self::Beta => "beta",
            Self::Rc => "RC",
            Self::Patch => "patch",
        }
    }
}

/// A normalized version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    release: [u64; 4],
    modifier: Option<(Modifier, Vec<u64>)>,
    dev: bool,
}

impl Version {
    /// Build a stable version from its four numeric components.
    #[must_use]
    pub fn from_release(release: [u64; 4]) -> Self {
        Self {
            release,
            modifier: None,
            dev: false,
        }
    }

    /// Parse and normalize a version string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a recognizable version.
    pub fn parse(input: &str) -> Result<Self, ConstraintError> {
        let trimmed = input.trim();
        let caps = version_regex()
            .captures(trimmed)
            .ok_or_else(|| ConstraintError::InvalidVersion(input.to_string()))?;

        let mut release = [0u64; 4];
        for (i, slot) in release.iter_mut().enumerate() {
            if let Some(m) = caps.get(i + 1) {
                *slot = m
                    .as_str()
                    .parse()
                    .map_err(|_| ConstraintError::InvalidVersion(input.to_string()))?;
            }
        }

        let mut version = Self::from_release(release);
        version.apply_modifier(&caps, 5);
        Ok(version)
    }

    /// Copy the stability modifier captured at `index` (name, numbers, dev flag).
    pub(crate) fn apply_modifier(&mut self, caps: &Captures<'_>, index: usize) {
        if let Some(modifier) = caps.get(index).and_then(|m| Modifier::expand(m.as_str())) {
            let numbers = caps
                .get(index + 1)
                .map(|m| {
                    m.as_str()
                        .split(['.', '-'])
                        .filter(|s| !s.is_empty())
                        .filter_map(|s| s.parse().ok())
                        .collect()
                })
                .unwrap_or_default();
            self.modifier = Some((modifier, numbers));
        }
        self.dev = caps.get(index + 2).is_some();
    }

    /// The four numeric components.
    #[must_use]
    pub fn release(&self) -> [u64; 4] {
        self.release
    }

    /// Returns true if the version carries a pre-release or dev marker.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.dev
            || matches!(
                self.modifier,
                Some((Modifier::Alpha | Modifier::Beta | Modifier::Rc, _))
            )
    }

    fn suffix_rank(&self) -> u8 {
        match &self.modifier {
            None if self.dev => 0,
            Some((Modifier::Alpha, _)) => 1,
            Some((Modifier::Beta, _)) => 2,
            Some((Modifier::Rc, _)) => 3,
            None => 4,
            Some((Modifier::Patch, _)) => 5,
        }
    }

    fn modifier_numbers(&self) -> &[u64] {
        self.modifier.as_ref().map_or(&[], |(_, n)| n.as_slice())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.release
            .cmp(&other.release)
            .then_with(|| self.suffix_rank().cmp(&other.suffix_rank()))
            .then_with(|| self.modifier_numbers().cmp(other.modifier_numbers()))
            // A trailing `-dev` sorts before the same version without it.
            .then_with(|| other.dev.cmp(&self.dev))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.release;
        write!(f, "{a}.{b}.{c}.{d}")?;
        if let Some((modifier, numbers)) = &self.modifier {
            write!(f, "-{}", modifier.as_str())?;
            let joined = numbers
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(".");
            f.write_str(&joined)?;
        }
        if self.dev {
            f.write_str("-dev")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Stability classification of a version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stability {
    Stable,
    Rc,
    Beta,
    Alpha,
    Dev,
}

impl Stability {
    /// Severity rank; higher is less stable.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Stable => 0,
            Self::Rc => 5,
            Self::Beta => 10,
            Self::Alpha => 15,
            Self::Dev => 20,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Rc => "RC",
            Self::Beta => "beta",
            Self::Alpha => "alpha",
            Self::Dev => "dev",
        }
    }

    /// Classify a raw version string.
    #[must_use]
    pub fn parse(version: &str) -> Self {
        let version = version.split('#').next().unwrap_or_default();
        if version.starts_with("dev-") || version.ends_with("-dev") {
            return Self::Dev;
        }

        let lowered = version.to_lowercase();
        let Some(caps) = stability_regex().captures(&lowered) else {
            return Self::Stable;
        };

        if caps.get(3).is_some() {
            return Self::Dev;
        }

        match caps.get(1).map(|m| m.as_str()) {
            Some("beta" | "b") => Self::Beta,
            Some("alpha" | "a") => Self::Alpha,
            Some("rc") => Self::Rc,
            _ => Self::Stable,
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn normalizes_short_versions() {
        assert_eq!(v("1.23").to_string(), "1.23.0.0");
        assert_eq!(v("3").to_string(), "3.0.0.0");
        assert_eq!(v("v2.0.1").to_string(), "2.0.1.0");
        assert_eq!(v("1.2.3.4").to_string(), "1.2.3.4");
    }

    #[test]
    fn normalizes_modifiers() {
        assert_eq!(v("1.4-beta.1").to_string(), "1.4.0.0-beta1");
        assert_eq!(v("1.0a2").to_string(), "1.0.0.0-alpha2");
        assert_eq!(v("1.0rc1").to_string(), "1.0.0.0-RC1");
        assert_eq!(v("2.0-dev").to_string(), "2.0.0.0-dev");
        assert_eq!(v("1.0.0-stable").to_string(), "1.0.0.0");
        assert_eq!(v("1.0+local.7").to_string(), "1.0.0.0");
    }

    #[test]
    fn rejects_garbage() {
        assert!(Version::parse("linux").is_err());
        assert!(Version::parse("").is_err());
        assert!(Version::parse("1.0 beta").is_err());
    }

    #[test]
    fn orders_stabilities() {
        assert!(v("1.0-dev") < v("1.0a1"));
        assert!(v("1.0a1") < v("1.0b1"));
        assert!(v("1.0b1") < v("1.0rc1"));
        assert!(v("1.0rc1") < v("1.0"));
        assert!(v("1.0") < v("1.0-patch1"));
        assert!(v("1.0b1") < v("1.0b2"));
        assert!(v("1.9") < v("1.10"));
    }

    #[test]
    fn classifies_stability() {
        assert_eq!(Stability::parse("1.0.0"), Stability::Stable);
        assert_eq!(Stability::parse("1.0-rc1"), Stability::Rc);
        assert_eq!(Stability::parse("1.4-beta.1"), Stability::Beta);
        assert_eq!(Stability::parse("1.0b2"), Stability::Beta);
        assert_eq!(Stability::parse("1.0a1"), Stability::Alpha);
        assert_eq!(Stability::parse("dev-master"), Stability::Dev);
        assert_eq!(Stability::parse("1.0.x-dev"), Stability::Dev);
        assert_eq!(Stability::parse("1.0.dev"), Stability::Dev);
        assert_eq!(Stability::parse("1.0-patch1"), Stability::Stable);
    }

    #[test]
    fn stability_ranks_follow_severity() {
        let order = [
            Stability::Stable,
            Stability::Rc,
            Stability::Beta,
            Stability::Alpha,
            Stability::Dev,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
    }
}
