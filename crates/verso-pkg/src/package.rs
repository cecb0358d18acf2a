//! In-memory package model.

use crate::constraint::{parse_constraints, Constraint, ConstraintError, PlatformConstraint};
use crate::dependency::Dependency;
use crate::version::Stability;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

/// Which requirement list a package or dependency belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Main,
    Dev,
}

impl Category {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Dev => "dev",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dependency declaration as written in a manifest.
///
/// Tables carrying a `git` key are VCS dependencies; other tables must carry
/// a `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// Simple version range: `"^1.2"`.
    Range(String),

    /// Dependency pulled from a version control repository.
    Vcs(VcsSpec),

    /// Detailed version range dependency.
    Versioned(VersionedSpec),
}

impl DependencySpec {
    /// Returns true if this is a VCS dependency.
    #[must_use]
    pub fn is_vcs(&self) -> bool {
        matches!(self, Self::Vcs(_))
    }
}

impl From<&str> for DependencySpec {
    fn from(range: &str) -> Self {
        Self::Range(range.to_string())
    }
}

/// A git dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VcsSpec {
    /// Repository URL.
    pub git: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    #[serde(default)]
    pub optional: bool,

    /// Python versions the dependency is restricted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<String>,

    /// Platforms the dependency is restricted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Extras requested from the dependency.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<String>,
}

/// A version range dependency with extra settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionedSpec {
    /// Version range.
    pub version: String,

    #[serde(default)]
    pub optional: bool,

    #[serde(default, alias = "allows-prereleases")]
    pub allows_prereleases: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extras: Vec<String>,
}

/// Where a package was obtained from (set for VCS-sourced packages).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSource {
    /// Source kind, e.g. `git`.
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub reference: String,
}

/// A package: a name and version plus metadata and requirements.
///
/// Two packages are equal when their lower-cased names and versions are.
#[derive(Debug, Clone)]
pub struct Package {
    name: String,
    pretty_name: String,
    version: String,
    pretty_version: String,
    stability: Stability,

    pub description: String,
    pub authors: Vec<String>,
    pub homepage: Option<String>,
    pub repository_url: Option<String>,
    pub keywords: Vec<String>,
    pub license: Option<String>,
    /// Readme path, relative to the project root.
    pub readme: Option<PathBuf>,
    pub source: Option<PackageSource>,

    pub requires: Vec<Dependency>,
    pub dev_requires: Vec<Dependency>,
    pub extras: BTreeMap<String, Vec<Dependency>>,

    pub category: Category,
    pub hashes: Vec<String>,
    pub optional: bool,

    python_versions: String,
    python_constraint: Constraint,
    platform: String,
    platform_constraint: PlatformConstraint,
}

impl Package {
    /// Create a package whose pretty version is its version.
    #[must_use]
    pub fn new(name: &str, version: &str) -> Self {
        Self::with_pretty_version(name, version, version)
    }

    /// Create a package, keeping the version as originally written for display.
    #[must_use]
    pub fn with_pretty_version(name: &str, version: &str, pretty_version: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            pretty_name: name.to_string(),
            version: version.to_string(),
            pretty_version: pretty_version.to_string(),
            stability: Stability::parse(version),
            description: String::new(),
            authors: Vec::new(),
            homepage: None,
            repository_url: None,
            keywords: Vec::new(),
            license: None,
            readme: None,
            source: None,
            requires: Vec::new(),
            dev_requires: Vec::new(),
            extras: BTreeMap::new(),
            category: Category::Main,
            hashes: Vec::new(),
            optional: false,
            python_versions: "*".to_string(),
            python_constraint: Constraint::Any,
            platform: "*".to_string(),
            platform_constraint: PlatformConstraint::Any,
        }
    }

    /// Lower-cased name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn pretty_name(&self) -> &str {
        &self.pretty_name
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn pretty_version(&self) -> &str {
        &self.pretty_version
    }

    #[must_use]
    pub fn stability(&self) -> Stability {
        self.stability
    }

    /// `name-version`, with the name lower-cased.
    #[must_use]
    pub fn unique_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    #[must_use]
    pub fn pretty_string(&self) -> String {
        format!("{} {}", self.pretty_name, self.pretty_version)
    }

    /// The pretty version, followed by the source reference for dev and
    /// VCS-sourced packages.
    #[must_use]
    pub fn full_pretty_version(&self) -> String {
        let source = self
            .source
            .as_ref()
            .filter(|s| self.is_dev() || matches!(s.kind.as_str(), "git" | "hg"));
        let Some(source) = source else {
            return self.pretty_version.clone();
        };

        // Truncate sha1 references.
        if source.reference.chars().count() == 40 {
            let short: String = source.reference.chars().take(7).collect();
            return format!("{} {}", self.pretty_version, short);
        }
        format!("{} {}", self.pretty_version, source.reference)
    }

    #[must_use]
    pub fn is_dev(&self) -> bool {
        self.stability == Stability::Dev
    }

    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.stability != Stability::Stable
    }

    #[must_use]
    pub fn python_versions(&self) -> &str {
        &self.python_versions
    }

    #[must_use]
    pub fn python_constraint(&self) -> &Constraint {
        &self.python_constraint
    }

    /// Restrict the python versions this package supports.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is not a valid constraint.
    pub fn set_python_versions(&mut self, expr: &str) -> Result<(), ConstraintError> {
        self.python_constraint = parse_constraints(expr)?;
        self.python_versions = expr.to_string();
        Ok(())
    }

    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    #[must_use]
    pub fn platform_constraint(&self) -> &PlatformConstraint {
        &self.platform_constraint
    }

    /// Restrict the platforms this package supports.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is not a valid platform list.
    pub fn set_platform(&mut self, expr: &str) -> Result<(), ConstraintError> {
        self.platform_constraint = PlatformConstraint::parse(expr)?;
        self.platform = expr.to_string();
        Ok(())
    }

    /// Declare a dependency and return it for further adjustment.
    ///
    /// A missing spec means any version. Main dependencies land in
    /// `requires`, dev dependencies in `dev_requires`.
    ///
    /// # Errors
    ///
    /// Returns an error if the version, python or platform expression of the
    /// spec cannot be parsed.
    pub fn add_dependency(
        &mut self,
        name: &str,
        spec: Option<DependencySpec>,
        category: Category,
    ) -> Result<&mut Dependency, ConstraintError> {
        let spec = spec.unwrap_or_else(|| DependencySpec::from("*"));
        let dependency = Dependency::from_spec(name, spec, category)?;

        let list = match category {
            Category::Main => &mut self.requires,
            Category::Dev => &mut self.dev_requires,
        };
        let index = list.len();
        list.push(dependency);
        Ok(&mut list[index])
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version
    }
}

impl Eq for Package {}

impl Hash for Package {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unique_name())
    }
}
