//! Distribution metadata derived from a package.
//!
//! Authors, entry points, classifiers and requirement lists in the shapes the
//! legacy build script and `PKG-INFO` expect.

use crate::constraint::{parse_constraints, Constraint, ConstraintError};
use crate::dependency::Dependency;
use crate::package::Package;
use crate::version::Version;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

/// Entry point group that `[scripts]` collapse into.
pub const CONSOLE_SCRIPTS_GROUP: &str = "console_scripts";

/// Interpreter versions that get a classifier.
pub const AVAILABLE_PYTHONS: &[&str] = &["2", "2.7", "3", "3.4", "3.5", "3.6", "3.7"];

/// Python constraint assumed for classifiers when a package accepts any version.
pub const DEFAULT_PYTHON_CONSTRAINT: &str = "~2.7 || ^3.4";

const CLASSIFIER_PREFIX: &str = "Programming Language :: Python :: ";

fn author_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(?P<name>[- .,\w'’"()]+) <(?P<email>.+?)>$"#)
            .expect("author pattern is valid")
    })
}

/// Errors that can occur when deriving metadata.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("invalid author string '{0}', expected 'Name <email>'")]
    InvalidAuthor(String),

    #[error("package declares no authors")]
    NoAuthors,
}

/// A parsed `Name <email>` author.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// Split an author string of the form `Name <email>`.
///
/// # Errors
///
/// Returns [`MetadataError::InvalidAuthor`] if the string does not match.
pub fn convert_author(raw: &str) -> Result<Author, MetadataError> {
    let caps = author_regex()
        .captures(raw)
        .ok_or_else(|| MetadataError::InvalidAuthor(raw.to_string()))?;

    Ok(Author {
        name: caps["name"].to_string(),
        email: caps["email"].to_string(),
    })
}

/// The first declared author of `package`.
///
/// # Errors
///
/// Returns an error if there is no author or the first one is malformed.
pub fn main_author(package: &Package) -> Result<Author, MetadataError> {
    let raw = package.authors.first().ok_or(MetadataError::NoAuthors)?;
    convert_author(raw)
}

/// Build entry point groups from named scripts and plugin groups.
///
/// Every group lists `"name = target"` entries sorted by name.
#[must_use]
pub fn convert_entry_points(
    scripts: &BTreeMap<String, String>,
    plugins: &BTreeMap<String, BTreeMap<String, String>>,
) -> BTreeMap<String, Vec<String>> {
    let mut result: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (name, target) in scripts {
        result
            .entry(CONSOLE_SCRIPTS_GROUP.to_string())
            .or_default()
            .push(format!("{name} = {target}"));
    }

    for (group, entries) in plugins {
        for (name, target) in entries {
            result
                .entry(group.clone())
                .or_default()
                .push(format!("{name} = {target}"));
        }
    }

    for entries in result.values_mut() {
        entries.sort();
    }
    result
}

/// One `Programming Language :: Python :: X` classifier per supported version
/// the python constraint accepts.
///
/// `python_versions` of `*` falls back to `default_python`.
///
/// # Errors
///
/// Returns an error if an expression or a supported version does not parse.
pub fn get_classifiers(
    python_versions: &str,
    default_python: &str,
    supported: &[&str],
) -> Result<Vec<String>, ConstraintError> {
    let expr = if python_versions.trim() == "*" {
        default_python
    } else {
        python_versions
    };
    let constraint = parse_constraints(expr)?;

    let mut versions = supported.to_vec();
    versions.sort_unstable();

    let mut classifiers = Vec::new();
    for version in versions {
        let exact = Constraint::exact(Version::parse(version)?);
        if constraint.matches(&exact) {
            classifiers.push(format!("{CLASSIFIER_PREFIX}{version}"));
        }
    }
    Ok(classifiers)
}

/// Split dependencies into plain requirements and those carrying a marker.
#[must_use]
pub fn convert_dependencies<'a>(
    dependencies: impl IntoIterator<Item = &'a Dependency>,
) -> (Vec<String>, Vec<String>) {
    let mut main = Vec::new();
    let mut conditional = Vec::new();

    for dependency in dependencies {
        let requirement = dependency.to_requirement_string();
        if requirement.contains(';') {
            conditional.push(requirement);
        } else {
            main.push(requirement);
        }
    }

    (main, conditional)
}

/// The `extras_require` mapping of a package.
///
/// Conditional requirements go under `":<marker>"` keys; declared extras keep
/// their names.
#[must_use]
pub fn extras_require(conditional: &[String], package: &Package) -> BTreeMap<String, Vec<String>> {
    let mut result: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for requirement in conditional {
        if let Some((req, marker)) = requirement.split_once(';') {
            result
                .entry(format!(":{}", marker.trim()))
                .or_default()
                .push(req.trim().to_string());
        }
    }

    for (extra, dependencies) in &package.extras {
        let requirements = result.entry(extra.clone()).or_default();
        requirements.extend(dependencies.iter().map(Dependency::to_requirement_string));
    }

    result
}

/// Render a python constraint as a `python_requires` value.
///
/// Leaf clauses are comma-joined without whitespace.
#[must_use]
pub fn python_requires(constraint: &Constraint) -> String {
    fn leaves(constraint: &Constraint, out: &mut Vec<String>) {
        match constraint {
            Constraint::Multi { constraints, .. } => {
                for c in constraints {
                    leaves(c, out);
                }
            }
            other => out.push(other.to_string().replace(' ', "")),
        }
    }

    let mut clauses = Vec::new();
    leaves(constraint, &mut clauses);
    clauses.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{Category, DependencySpec, VersionedSpec};

    #[test]
    fn author_with_email() {
        let author = convert_author("Jane Doe <jane@example.com>").unwrap();
        assert_eq!(author.name, "Jane Doe");
        assert_eq!(author.email, "jane@example.com");
    }

    #[test]
    fn author_with_unicode_and_punctuation() {
        let author = convert_author("Sébastien O'Brien, Jr. <seb@example.org>").unwrap();
        assert_eq!(author.name, "Sébastien O'Brien, Jr.");
        assert_eq!(author.email, "seb@example.org");
    }

    #[test]
    fn author_without_email() {
        assert_eq!(
            convert_author("Jane Doe"),
            Err(MetadataError::InvalidAuthor("Jane Doe".to_string()))
        );
    }

    #[test]
    fn main_author_requires_one() {
        let package = Package::new("demo", "1.0");
        assert_eq!(main_author(&package), Err(MetadataError::NoAuthors));
    }

    #[test]
    fn entry_points_group_scripts() {
        let scripts = BTreeMap::from([
            ("my-script".to_string(), "my_package:main".to_string()),
            ("a-tool".to_string(), "my_package.cli:run".to_string()),
        ]);
        let plugins = BTreeMap::from([(
            "blogtool.parsers".to_string(),
            BTreeMap::from([
                ("rst".to_string(), "some_module:RstParser".to_string()),
                (".md".to_string(), "some_module:MarkdownParser".to_string()),
            ]),
        )]);

        let entry_points = convert_entry_points(&scripts, &plugins);
        assert_eq!(
            entry_points[CONSOLE_SCRIPTS_GROUP],
            vec!["a-tool = my_package.cli:run", "my-script = my_package:main"]
        );
        assert_eq!(
            entry_points["blogtool.parsers"],
            vec![".md = some_module:MarkdownParser", "rst = some_module:RstParser"]
        );
    }

    #[test]
    fn entry_points_empty() {
        assert!(convert_entry_points(&BTreeMap::new(), &BTreeMap::new()).is_empty());
    }

    #[test]
    fn classifiers_for_default_baseline() {
        let classifiers =
            get_classifiers("*", DEFAULT_PYTHON_CONSTRAINT, AVAILABLE_PYTHONS).unwrap();
        assert_eq!(
            classifiers,
            vec![
                "Programming Language :: Python :: 2.7",
                "Programming Language :: Python :: 3.4",
                "Programming Language :: Python :: 3.5",
                "Programming Language :: Python :: 3.6",
                "Programming Language :: Python :: 3.7",
            ]
        );
    }

    #[test]
    fn classifiers_for_declared_constraint() {
        let classifiers =
            get_classifiers("^3.6", DEFAULT_PYTHON_CONSTRAINT, AVAILABLE_PYTHONS).unwrap();
        assert_eq!(
            classifiers,
            vec![
                "Programming Language :: Python :: 3.6",
                "Programming Language :: Python :: 3.7",
            ]
        );
    }

    #[test]
    fn classifiers_reject_bad_expression() {
        assert!(get_classifiers("three", DEFAULT_PYTHON_CONSTRAINT, AVAILABLE_PYTHONS).is_err());
    }

    fn package_with_deps() -> Package {
        let mut package = Package::new("demo", "1.0");
        package
            .add_dependency("Django", Some("^1.23".into()), Category::Main)
            .unwrap();
        let spec = DependencySpec::Versioned(VersionedSpec {
            version: "^0.3".to_string(),
            python: Some("~2.7".to_string()),
            ..VersionedSpec::default()
        });
        package
            .add_dependency("futures", Some(spec), Category::Main)
            .unwrap();
        package
    }

    #[test]
    fn dependencies_split_on_marker() {
        let package = package_with_deps();
        let (main, conditional) = convert_dependencies(&package.requires);
        assert_eq!(main, vec!["Django (>=1.23.0.0,<2.0.0.0)"]);
        assert_eq!(
            conditional,
            vec![
                "futures (>=0.3.0.0,<0.4.0.0); \
                 python_version>=\"2.7.0.0\" and python_version<\"2.8.0.0\""
            ]
        );
    }

    #[test]
    fn extras_group_by_marker_and_name() {
        let mut package = package_with_deps();
        let spec = DependencySpec::Versioned(VersionedSpec {
            version: "^2.0".to_string(),
            optional: true,
            ..VersionedSpec::default()
        });
        let pendulum = package
            .add_dependency("pendulum", Some(spec), Category::Main)
            .unwrap()
            .clone();
        package.extras.insert("time".to_string(), vec![pendulum]);

        let (_, conditional) = convert_dependencies(&package.requires);
        let extras = extras_require(&conditional, &package);
        assert_eq!(
            extras[":python_version>=\"2.7.0.0\" and python_version<\"2.8.0.0\""],
            vec!["futures (>=0.3.0.0,<0.4.0.0)"]
        );
        assert_eq!(extras["time"], vec!["pendulum (>=2.0.0.0,<3.0.0.0)"]);
    }

    #[test]
    fn python_requires_flattens_clauses() {
        let constraint = parse_constraints("~2.7 || ^3.4").unwrap();
        assert_eq!(
            python_requires(&constraint),
            ">=2.7.0.0,<2.8.0.0,>=3.4.0.0,<4.0.0.0"
        );

        let single = parse_constraints(">=3.6").unwrap();
        assert_eq!(python_requires(&single), ">=3.6.0.0");
    }
}
