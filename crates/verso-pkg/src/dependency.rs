//! Dependencies: compatibility checks and requirement-string rendering.

use crate::constraint::{parse_constraints, Constraint, ConstraintError, PlatformConstraint};
use crate::package::{Category, DependencySpec, Package};
use crate::version::Version;
use std::fmt;

/// Marker variable for python restrictions.
pub const PYTHON_MARKER: &str = "python_version";

/// Marker variable for platform restrictions.
pub const PLATFORM_MARKER: &str = "sys_platform";

/// Kind of version control system a dependency is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcsKind {
    Git,
}

impl VcsKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Git => "git",
        }
    }
}

/// A git reference (branch, tag, or revision).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VcsReference {
    /// A branch name.
    Branch(String),
    /// A tag name.
    Tag(String),
    /// A specific commit revision.
    Rev(String),
    /// Default branch (HEAD).
    DefaultBranch,
}

impl fmt::Display for VcsReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch(b) => write!(f, "branch:{b}"),
            Self::Tag(t) => write!(f, "tag:{t}"),
            Self::Rev(r) => write!(f, "rev:{r}"),
            Self::DefaultBranch => write!(f, "HEAD"),
        }
    }
}

/// Repository a VCS dependency is fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VcsSource {
    pub kind: VcsKind,
    pub url: String,
    pub reference: VcsReference,
}

impl fmt::Display for VcsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.kind.as_str(), self.url, self.reference)
    }
}

/// A declared dependency of a package.
///
/// Dependencies are created through [`Package::add_dependency`].
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    name: String,
    pretty_name: String,
    pretty_constraint: String,
    constraint: Constraint,
    optional: bool,
    category: Category,
    allows_prereleases: bool,
    extras: Vec<String>,
    python_versions: String,
    python_constraint: Constraint,
    platform: String,
    platform_constraint: PlatformConstraint,
    activated: bool,
    source: Option<VcsSource>,
}

impl Dependency {
    fn new(name: &str, range: &str, category: Category) -> Result<Self, ConstraintError> {
        Ok(Self {
            name: name.to_lowercase(),
            pretty_name: name.to_string(),
            pretty_constraint: range.to_string(),
            constraint: parse_constraints(range)?,
            optional: false,
            category,
            allows_prereleases: false,
            extras: Vec::new(),
            python_versions: "*".to_string(),
            python_constraint: Constraint::Any,
            platform: "*".to_string(),
            platform_constraint: PlatformConstraint::Any,
            activated: true,
            source: None,
        })
    }

    /// Resolve a manifest spec into a dependency.
    pub(crate) fn from_spec(
        name: &str,
        spec: DependencySpec,
        category: Category,
    ) -> Result<Self, ConstraintError> {
        let (mut dependency, python, platform, extras) = match spec {
            DependencySpec::Range(range) => return Self::new(name, &range, category),
            DependencySpec::Vcs(vcs) => {
                let reference = if let Some(branch) = vcs.branch {
                    VcsReference::Branch(branch)
                } else if let Some(tag) = vcs.tag {
                    VcsReference::Tag(tag)
                } else if let Some(rev) = vcs.rev {
                    VcsReference::Rev(rev)
                } else {
                    VcsReference::DefaultBranch
                };

                let mut dependency = Self::new(name, "*", category)?;
                dependency.pretty_constraint = reference.to_string();
                dependency.optional = vcs.optional;
                dependency.source = Some(VcsSource {
                    kind: VcsKind::Git,
                    url: vcs.git,
                    reference,
                });
                (dependency, vcs.python, vcs.platform, vcs.extras)
            }
            DependencySpec::Versioned(versioned) => {
                let mut dependency = Self::new(name, &versioned.version, category)?;
                dependency.optional = versioned.optional;
                dependency.allows_prereleases = versioned.allows_prereleases;
                (
                    dependency,
                    versioned.python,
                    versioned.platform,
                    versioned.extras,
                )
            }
        };

        dependency.activated = !dependency.optional;
        if let Some(python) = python {
            dependency.set_python_versions(&python)?;
        }
        if let Some(platform) = platform {
            dependency.set_platform(&platform)?;
        }
        dependency.extras = extras;
        Ok(dependency)
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

    /// The constraint as declared.
    #[must_use]
    pub fn pretty_constraint(&self) -> &str {
        &self.pretty_constraint
    }

    #[must_use]
    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub fn allows_prereleases(&self) -> bool {
        self.allows_prereleases
    }

    /// Extras requested from the dependency.
    #[must_use]
    pub fn extras(&self) -> &[String] {
        &self.extras
    }

    pub fn add_extra(&mut self, extra: &str) {
        self.extras.push(extra.to_string());
    }

    #[must_use]
    pub fn python_versions(&self) -> &str {
        &self.python_versions
    }

    #[must_use]
    pub fn python_constraint(&self) -> &Constraint {
        &self.python_constraint
    }

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

    /// # Errors
    ///
    /// Returns an error if the expression is not a valid platform list.
    pub fn set_platform(&mut self, expr: &str) -> Result<(), ConstraintError> {
        self.platform_constraint = PlatformConstraint::parse(expr)?;
        self.platform = expr.to_string();
        Ok(())
    }

    #[must_use]
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Mark the dependency as required, e.g. because an extra requested it.
    pub fn activate(&mut self) {
        self.activated = true;
    }

    #[must_use]
    pub fn is_vcs(&self) -> bool {
        self.source.is_some()
    }

    #[must_use]
    pub fn source(&self) -> Option<&VcsSource> {
        self.source.as_ref()
    }

    /// Check whether `package` satisfies this dependency.
    #[must_use]
    pub fn accepts(&self, package: &Package) -> bool {
        self.name == package.name()
            && self.accepts_version(package.version())
            && self.python_constraint.matches(package.python_constraint())
            && self.platform_constraint.matches(package.platform_constraint())
    }

    fn accepts_version(&self, version: &str) -> bool {
        match Version::parse(version) {
            Ok(version) => self.constraint.allows(&version),
            Err(_) => self.constraint.is_any(),
        }
    }

    /// Render the dependency as a legacy requirement string:
    /// `Name (range)[; marker]`.
    #[must_use]
    pub fn to_requirement_string(&self) -> String {
        let mut requirement = self.pretty_name.clone();
        if !self.constraint.is_any() {
            requirement.push_str(&format!(" ({})", self.constraint));
        }

        let mut markers = Vec::new();
        if !self.python_constraint.is_any() {
            markers.push(version_marker(PYTHON_MARKER, &self.python_constraint));
        }
        if let PlatformConstraint::Names(names) = &self.platform_constraint {
            let clauses: Vec<String> = names
                .iter()
                .map(|name| format!("{PLATFORM_MARKER}==\"{name}\""))
                .collect();
            markers.push(clauses.join(" or "));
        }

        match markers.as_slice() {
            [] => {}
            [marker] => {
                requirement.push_str("; ");
                requirement.push_str(marker);
            }
            _ => {
                let wrapped: Vec<String> = markers.iter().map(|m| format!("({m})")).collect();
                requirement.push_str("; ");
                requirement.push_str(&wrapped.join(" and "));
            }
        }

        requirement
    }
}

/// Render a version constraint as a marker over `variable`.
///
/// Conjunctions join with ` and `; disjunctions join with ` or ` and
/// parenthesize nested groups.
fn version_marker(variable: &str, constraint: &Constraint) -> String {
    match constraint {
        Constraint::Any => String::new(),
        Constraint::Single { op, version } => format!("{variable}{op}\"{version}\""),
        Constraint::Multi {
            constraints,
            conjunctive,
        } => {
            let parts: Vec<String> = constraints
                .iter()
                .map(|c| {
                    let marker = version_marker(variable, c);
                    if !conjunctive && matches!(c, Constraint::Multi { .. }) {
                        format!("({marker})")
                    } else {
                        marker
                    }
                })
                .collect();
            parts.join(if *conjunctive { " and " } else { " or " })
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.pretty_name, self.pretty_constraint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{VcsSpec, VersionedSpec};

    fn dependency(name: &str, range: &str) -> Dependency {
        Dependency::from_spec(name, range.into(), Category::Main).unwrap()
    }

    #[test]
    fn accepts() {
        let dep = dependency("A", "^1.0");
        assert!(dep.accepts(&Package::new("A", "1.4")));
    }

    #[test]
    fn accepts_prerelease() {
        let spec = DependencySpec::Versioned(VersionedSpec {
            version: "^1.0".to_string(),
            allows_prereleases: true,
            ..VersionedSpec::default()
        });
        let dep = Dependency::from_spec("A", spec, Category::Main).unwrap();
        assert!(dep.allows_prereleases());
        assert!(dep.accepts(&Package::new("A", "1.4-beta.1")));
    }

    #[test]
    fn accepts_python_versions() {
        let mut dep = dependency("A", "^1.0");
        dep.set_python_versions("^3.6").unwrap();
        let mut package = Package::new("A", "1.4");
        package.set_python_versions("~3.6").unwrap();
        assert!(dep.accepts(&package));
    }

    #[test]
    fn accepts_ignores_name_case() {
        let dep = dependency("Django", "^1.11");
        assert!(dep.accepts(&Package::new("django", "1.11.2")));
    }

    #[test]
    fn accepts_fails_with_different_names() {
        let dep = dependency("A", "^1.0");
        assert!(!dep.accepts(&Package::new("B", "1.4")));
    }

    #[test]
    fn accepts_fails_with_version_mismatch() {
        let dep = dependency("A", "~1.0");
        assert!(!dep.accepts(&Package::new("A", "1.4")));
    }

    #[test]
    fn accepts_fails_with_python_versions_mismatch() {
        let mut dep = dependency("A", "^1.0");
        dep.set_python_versions("^3.6").unwrap();
        let mut package = Package::new("A", "1.4");
        package.set_python_versions("~3.5").unwrap();
        assert!(!dep.accepts(&package));
    }

    #[test]
    fn accepts_fails_with_platform_mismatch() {
        let mut dep = dependency("A", "^1.0");
        dep.set_platform("win32").unwrap();
        let mut package = Package::new("A", "1.4");
        package.set_platform("linux || darwin").unwrap();
        assert!(!dep.accepts(&package));

        package.set_platform("*").unwrap();
        assert!(dep.accepts(&package));
    }

    #[test]
    fn to_requirement_string_with_wildcard_python_group() {
        let mut dep = dependency("A", "^1.0");
        dep.set_python_versions("^3.6 || *").unwrap();
        assert_eq!(dep.to_requirement_string(), "A (>=1.0.0.0,<2.0.0.0)");

        dep.set_python_versions("* ^3.6").unwrap();
        assert_eq!(
            dep.to_requirement_string(),
            "A (>=1.0.0.0,<2.0.0.0); python_version>=\"3.6.0.0\" and python_version<\"4.0.0.0\""
        );
    }

    #[test]
    fn accepts_unparseable_package_version_only_for_any() {
        assert!(dependency("A", "*").accepts(&Package::new("A", "dev-master")));
        assert!(!dependency("A", "^1.0").accepts(&Package::new("A", "dev-master")));
    }

    #[test]
    fn requirement_string_plain() {
        let dep = dependency("Django", "^1.23");
        assert_eq!(dep.to_requirement_string(), "Django (>=1.23.0.0,<2.0.0.0)");
    }

    #[test]
    fn requirement_string_with_python_marker() {
        let mut dep = dependency("Django", "^1.23");
        dep.set_python_versions("~2.7 || ^3.6").unwrap();
        assert_eq!(
            dep.to_requirement_string(),
            "Django (>=1.23.0.0,<2.0.0.0); \
             (python_version>=\"2.7.0.0\" and python_version<\"2.8.0.0\") \
             or (python_version>=\"3.6.0.0\" and python_version<\"4.0.0.0\")"
        );
    }

    #[test]
    fn requirement_string_with_both_markers() {
        let mut dep = dependency("pywin32", ">=220");
        dep.set_python_versions("^3.6").unwrap();
        dep.set_platform("win32").unwrap();
        assert_eq!(
            dep.to_requirement_string(),
            "pywin32 (>=220.0.0.0); \
             (python_version>=\"3.6.0.0\" and python_version<\"4.0.0.0\") \
             and (sys_platform==\"win32\")"
        );
    }

    #[test]
    fn requirement_string_any_version() {
        assert_eq!(dependency("toml", "*").to_requirement_string(), "toml");
    }

    #[test]
    fn vcs_dependency() {
        let spec = DependencySpec::Vcs(VcsSpec {
            git: "https://github.com/sdispater/pendulum.git".to_string(),
            branch: Some("2.0".to_string()),
            python: Some("^3.6".to_string()),
            extras: vec!["tz".to_string()],
            ..VcsSpec::default()
        });
        let dep = Dependency::from_spec("pendulum", spec, Category::Main).unwrap();

        assert!(dep.is_vcs());
        assert!(dep.constraint().is_any());
        assert_eq!(dep.extras(), ["tz".to_string()]);
        let source = dep.source().unwrap();
        assert_eq!(source.kind, VcsKind::Git);
        assert_eq!(source.reference, VcsReference::Branch("2.0".to_string()));
        assert_eq!(
            dep.to_requirement_string(),
            "pendulum; python_version>=\"3.6.0.0\" and python_version<\"4.0.0.0\""
        );
    }

    #[test]
    fn optional_dependencies_start_inactive() {
        let spec = DependencySpec::Versioned(VersionedSpec {
            version: "^2.0".to_string(),
            optional: true,
            ..VersionedSpec::default()
        });
        let mut dep = Dependency::from_spec("psycopg2", spec, Category::Main).unwrap();
        assert!(!dep.is_activated());
        dep.activate();
        dep.activate();
        assert!(dep.is_activated());
        assert!(dependency("A", "^1.0").is_activated());
    }

    #[test]
    fn invalid_python_restriction_propagates() {
        let spec = DependencySpec::Versioned(VersionedSpec {
            version: "^2.0".to_string(),
            python: Some("three".to_string()),
            ..VersionedSpec::default()
        });
        let err = Dependency::from_spec("a", spec, Category::Main).unwrap_err();
        assert_eq!(err, ConstraintError::InvalidConstraint("three".to_string()));
    }
}
