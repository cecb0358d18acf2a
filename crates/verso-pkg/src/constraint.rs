//! Version and platform constraints.
//!
//! Supported version constraint syntax:
//! - wildcards: `*`, `x`, `1.*`
//! - tilde ranges: `~1.2` (`>=1.2.0.0,<1.3.0.0`)
//! - caret ranges: `^1.23` (`>=1.23.0.0,<2.0.0.0`)
//! - comparators: `>=`, `>`, `<=`, `<`, `=`, `==`, `!=`, `<>`
//! - AND with `,` or whitespace, OR with `||`

use crate::version::{Version, MODIFIER_PATTERN};
use regex::{Captures, Regex};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors raised while parsing versions and constraints.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    #[error("could not parse version constraint: {0}")]
    InvalidConstraint(String),

    #[error("invalid platform constraint '{0}'")]
    InvalidPlatform(String),
}

const NUMERIC_PATTERN: &str = r"v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.(\d+))?";

fn regex(cell: &'static OnceLock<Regex>, pattern: impl FnOnce() -> String) -> &'static Regex {
    cell.get_or_init(|| Regex::new(&pattern()).expect("constraint pattern is valid"))
}

fn stability_flag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || r"(?i)^([^,\s]*?)@(stable|RC|beta|alpha|dev)$".to_string())
}

fn or_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || r"\s*\|\|?\s*".to_string())
}

fn wildcard_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || r"(?i)^v?[x*](\.[x*])*$".to_string())
}

fn tilde_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || {
        format!(r"(?i)^~{NUMERIC_PATTERN}{MODIFIER_PATTERN}(?:\+\S+)?$")
    })
}

fn caret_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || {
        format!(r"(?i)^\^{NUMERIC_PATTERN}{MODIFIER_PATTERN}(?:\+\S+)?$")
    })
}

fn x_range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || r"^v?(\d+)(?:\.(\d+))?(?:\.(\d+))?(?:\.[xX*])+$".to_string())
}

fn comparator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || r"^(<>|!=|>=?|<=?|==?)?\s*(.*)$".to_string())
}

fn platform_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, || r"^[A-Za-z0-9_.\-]+$".to_string())
}

/// Comparison operator of a single constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "" | "=" | "==" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// The operator with any `=` removed: `<`, `>`, `!` or empty for equality.
    fn direction(self) -> &'static str {
        match self {
            Self::Eq => "",
            Self::Ne => "!",
            Self::Lt | Self::Le => "<",
            Self::Gt | Self::Ge => ">",
        }
    }

    fn is_strict(self) -> bool {
        matches!(self, Self::Lt | Self::Gt)
    }

    fn test(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed version constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Matches every version.
    Any,
    /// A single comparison against a version.
    Single { op: Operator, version: Version },
    /// A list of constraints combined with AND (`conjunctive`) or OR.
    Multi {
        constraints: Vec<Constraint>,
        conjunctive: bool,
    },
}

impl Constraint {
    /// The `==` constraint for one exact version.
    #[must_use]
    pub fn exact(version: Version) -> Self {
        Self::Single {
            op: Operator::Eq,
            version,
        }
    }

    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    #[must_use]
    pub fn is_disjunctive(&self) -> bool {
        matches!(
            self,
            Self::Multi {
                conjunctive: false,
                ..
            }
        )
    }

    /// Check whether this constraint is compatible with `provider`.
    ///
    /// A conjunctive constraint matches when each member matches, a
    /// disjunctive one when any member does.
    #[must_use]
    pub fn matches(&self, provider: &Constraint) -> bool {
        match (self, provider) {
            (Self::Any, _) | (_, Self::Any) => true,
            (
                Self::Multi {
                    constraints,
                    conjunctive,
                },
                _,
            ) => {
                if *conjunctive {
                    constraints.iter().all(|c| c.matches(provider))
                } else {
                    constraints.iter().any(|c| c.matches(provider))
                }
            }
            (Self::Single { .. }, Self::Multi { .. }) => provider.matches(self),
            (
                Self::Single { op, version },
                Self::Single {
                    op: provider_op,
                    version: provider_version,
                },
            ) => match_specific(*op, version, *provider_op, provider_version),
        }
    }

    /// Returns true if `version` satisfies this constraint.
    #[must_use]
    pub fn allows(&self, version: &Version) -> bool {
        self.matches(&Self::exact(version.clone()))
    }
}

fn match_specific(op: Operator, version: &Version, provider_op: Operator, provider: &Version) -> bool {
    let is_eq = op == Operator::Eq;
    let is_provider_eq = provider_op == Operator::Eq;

    // `!=` only conflicts with `==` on the same version.
    if op == Operator::Ne || provider_op == Operator::Ne {
        return (!is_eq && !is_provider_eq) || provider != version;
    }

    // Same direction (e.g. `<= 2.0` and `< 1.0`) always overlaps.
    if !is_eq && op.direction() == provider_op.direction() {
        return true;
    }

    if op.test(provider.cmp(version)) {
        // `>= 1.0` against `< 1.0`: the boundary itself is excluded.
        return !(provider_op.is_strict() && !op.is_strict() && provider == version);
    }

    false
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Single { op, version } => write!(f, "{op}{version}"),
            Self::Multi {
                constraints,
                conjunctive,
            } => {
                let glue = if *conjunctive { "," } else { " || " };
                let parts: Vec<String> = constraints.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join(glue))
            }
        }
    }
}

/// Parse a constraint expression such as `^1.2`, `>=2.7,<3.0` or `~2.7 || ^3.6`.
///
/// # Errors
///
/// Returns an error if any part of the expression is not a valid constraint.
pub fn parse_constraints(expr: &str) -> Result<Constraint, ConstraintError> {
    let mut expr = expr.trim();
    if let Some(caps) = stability_flag_regex().captures(expr) {
        expr = caps.get(1).map_or("", |m| m.as_str());
        if expr.is_empty() {
            expr = "*";
        }
    }

    let mut or_groups = Vec::new();
    for group in or_regex().split(expr.trim()) {
        let mut members = Vec::new();
        for part in split_and(group) {
            members.extend(parse_single(&part)?);
        }
        // `*` adds nothing to a conjunction.
        members.retain(|member| !member.is_any());
        let constraint = match members.len() {
            0 => Constraint::Any,
            1 => members.remove(0),
            _ => Constraint::Multi {
                constraints: members,
                conjunctive: true,
            },
        };
        or_groups.push(constraint);
    }

    if or_groups.iter().any(Constraint::is_any) {
        return Ok(Constraint::Any);
    }

    Ok(match or_groups.len() {
        1 => or_groups.remove(0),
        2 => collapse_contiguous(or_groups),
        _ => Constraint::Multi {
            constraints: or_groups,
            conjunctive: false,
        },
    })
}

/// Split an AND group on commas and whitespace, keeping detached operators
/// (`>= 1.0`) attached to their version.
fn split_and(group: &str) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut pending = String::new();
    for token in group
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '!')) {
            pending.push_str(token);
            continue;
        }
        parts.push(format!("{pending}{token}"));
        pending.clear();
    }
    if !pending.is_empty() || parts.is_empty() {
        parts.push(pending);
    }
    parts
}

/// `[>=a,<b] || [>=b,<c]` becomes `[>=a,<c]`.
fn collapse_contiguous(mut groups: Vec<Constraint>) -> Constraint {
    if let [Constraint::Multi {
        constraints: first,
        conjunctive: true,
    }, Constraint::Multi {
        constraints: second,
        conjunctive: true,
    }] = groups.as_slice()
    {
        if let (
            [Constraint::Single {
                op: Operator::Ge,
                version: low,
            }, Constraint::Single {
                op: Operator::Lt,
                version: middle,
            }],
            [Constraint::Single {
                op: Operator::Ge,
                version: middle_again,
            }, Constraint::Single {
                op: Operator::Lt,
                version: high,
            }],
        ) = (first.as_slice(), second.as_slice())
        {
            if middle == middle_again {
                return Constraint::Multi {
                    constraints: vec![
                        Constraint::Single {
                            op: Operator::Ge,
                            version: low.clone(),
                        },
                        Constraint::Single {
                            op: Operator::Lt,
                            version: high.clone(),
                        },
                    ],
                    conjunctive: true,
                };
            }
        }
    }

    groups.truncate(2);
    Constraint::Multi {
        constraints: groups,
        conjunctive: false,
    }
}

fn numeric_groups(caps: &Captures<'_>) -> Result<[u64; 4], ConstraintError> {
    let mut release = [0u64; 4];
    for (i, slot) in release.iter_mut().enumerate() {
        if let Some(m) = caps.get(i + 1) {
            *slot = m
                .as_str()
                .parse()
                .map_err(|_| ConstraintError::InvalidConstraint(caps[0].to_string()))?;
        }
    }
    Ok(release)
}

/// Zero every component after `position` and add `increment` at `position`.
///
/// Fails when the bumped component would overflow.
fn manipulate(
    mut release: [u64; 4],
    position: usize,
    increment: u64,
    constraint: &str,
) -> Result<Version, ConstraintError> {
    for (i, slot) in release.iter_mut().enumerate() {
        if i > position {
            *slot = 0;
        } else if i == position {
            *slot = slot
                .checked_add(increment)
                .ok_or_else(|| ConstraintError::InvalidConstraint(constraint.to_string()))?;
        }
    }
    Ok(Version::from_release(release))
}

fn parse_single(constraint: &str) -> Result<Vec<Constraint>, ConstraintError> {
    if wildcard_regex().is_match(constraint) {
        return Ok(vec![Constraint::Any]);
    }

    if let Some(caps) = tilde_regex().captures(constraint) {
        let release = numeric_groups(&caps)?;
        let position = if caps.get(4).is_some() {
            3
        } else if caps.get(3).is_some() || caps.get(2).is_some() {
            2
        } else {
            0
        };

        let mut low = manipulate(release, position, 0, constraint)?;
        low.apply_modifier(&caps, 5);
        let high = manipulate(release, position.saturating_sub(1), 1, constraint)?;
        return Ok(vec![
            Constraint::Single {
                op: Operator::Ge,
                version: low,
            },
            Constraint::Single {
                op: Operator::Lt,
                version: high,
            },
        ]);
    }

    if let Some(caps) = caret_regex().captures(constraint) {
        let release = numeric_groups(&caps)?;
        let is_zero = |i: usize| {
            caps.get(i)
                .is_some_and(|m| m.as_str().parse::<u64>().ok() == Some(0))
        };
        let position = if !is_zero(1) || caps.get(2).is_none() {
            0
        } else if !is_zero(2) || caps.get(3).is_none() {
            1
        } else {
            2
        };

        let low = Version::parse(&constraint[1..])?;
        let high = manipulate(release, position, 1, constraint)?;
        return Ok(vec![
            Constraint::Single {
                op: Operator::Ge,
                version: low,
            },
            Constraint::Single {
                op: Operator::Lt,
                version: high,
            },
        ]);
    }

    if let Some(caps) = x_range_regex().captures(constraint) {
        let release = numeric_groups(&caps)?;
        let position = if caps.get(3).is_some() {
            2
        } else if caps.get(2).is_some() {
            1
        } else {
            0
        };

        let low = manipulate(release, position, 0, constraint)?;
        let high = Constraint::Single {
            op: Operator::Lt,
            version: manipulate(release, position, 1, constraint)?,
        };
        if low.release() == [0; 4] {
            return Ok(vec![high]);
        }
        return Ok(vec![
            Constraint::Single {
                op: Operator::Ge,
                version: low,
            },
            high,
        ]);
    }

    if let Some(caps) = comparator_regex().captures(constraint) {
        let op = Operator::parse(caps.get(1).map_or("", |m| m.as_str()));
        if let (Some(op), Ok(version)) = (op, Version::parse(&caps[2])) {
            return Ok(vec![Constraint::Single { op, version }]);
        }
    }

    Err(ConstraintError::InvalidConstraint(constraint.to_string()))
}

/// A constraint over platform names (`linux`, `darwin`, `win32`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformConstraint {
    Any,
    /// One of the listed platforms.
    Names(BTreeSet<String>),
}

impl PlatformConstraint {
    /// Parse `*` or a `||`/`,` separated list of platform names.
    ///
    /// # Errors
    ///
    /// Returns an error if a name contains characters outside `[A-Za-z0-9_.-]`.
    pub fn parse(expr: &str) -> Result<Self, ConstraintError> {
        let expr = expr.trim();
        if expr == "*" {
            return Ok(Self::Any);
        }

        let mut names = BTreeSet::new();
        for name in or_regex().split(expr).flat_map(|group| group.split(',')) {
            let name = name.trim();
            if !platform_name_regex().is_match(name) {
                return Err(ConstraintError::InvalidPlatform(expr.to_string()));
            }
            names.insert(name.to_string());
        }
        Ok(Self::Names(names))
    }

    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// Returns true if the two constraints share at least one platform.
    #[must_use]
    pub fn matches(&self, other: &PlatformConstraint) -> bool {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => true,
            (Self::Names(a), Self::Names(b)) => !a.is_disjoint(b),
        }
    }
}

impl fmt::Display for PlatformConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Names(names) => {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                f.write_str(&names.join(" || "))
            }
        }
    }
}
