//! Project manifest (`pyproject.toml`) parsing and project loading.

use crate::constraint::ConstraintError;
use crate::layout::{Module, ModuleError};
use crate::lockfile::{LockError, Locker, LOCK_FILE};
use crate::metadata::convert_entry_points;
use crate::package::{Category, DependencySpec, Package};
use crate::version::Version;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Manifest file name.
pub const MANIFEST_FILE: &str = "pyproject.toml";

/// Dependency key that declares the supported python versions.
pub const PYTHON_KEY: &str = "python";

/// Errors that can occur when working with manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no [tool.poetry] section found in {}", .0.display())]
    MissingSection(PathBuf),

    #[error("invalid package name '{0}': {1}")]
    InvalidName(String, &'static str),

    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    #[error("the python requirement must be a version range string")]
    InvalidPython,

    #[error("readme file {} cannot be read: {source}", .path.display())]
    Readme { path: PathBuf, source: io::Error },

    #[error("extra '{extra}' references undeclared dependency '{dependency}'")]
    UnknownExtraDependency { extra: String, dependency: String },
}

/// The `[tool.poetry]` section of a project manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Manifest {
    /// Package name (required).
    pub name: String,

    /// Package version (required).
    pub version: String,

    /// One-line summary.
    #[serde(default)]
    pub description: String,

    /// Authors as `Name <email>` (required).
    pub authors: Vec<String>,

    #[serde(default)]
    pub license: Option<String>,

    /// Path to the readme, relative to the project root.
    #[serde(default)]
    pub readme: Option<String>,

    #[serde(default)]
    pub homepage: Option<String>,

    #[serde(default)]
    pub repository: Option<String>,

    #[serde(default)]
    pub documentation: Option<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    /// Supported platforms, e.g. `linux || darwin`.
    #[serde(default)]
    pub platform: Option<String>,

    /// Runtime dependencies in declaration order; the `python` key restricts
    /// the interpreter.
    #[serde(default)]
    pub dependencies: IndexMap<String, DependencySpec>,

    /// Development-only dependencies, in declaration order.
    #[serde(default)]
    pub dev_dependencies: IndexMap<String, DependencySpec>,

    /// Named optional dependency sets.
    #[serde(default)]
    pub extras: BTreeMap<String, Vec<String>>,

    /// Console scripts: name to `module:function`.
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,

    /// Entry point groups.
    #[serde(default)]
    pub plugins: BTreeMap<String, BTreeMap<String, String>>,

    /// Additional package repositories.
    #[serde(default)]
    pub source: Vec<Repository>,
}

/// A package repository declared in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Repository {
    pub name: String,
    pub url: String,
}

impl Manifest {
    /// Load a manifest from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let (manifest, _) = Self::parse_with_table(&content, path)?;
        Ok(manifest)
    }

    /// Parse the `[tool.poetry]` section of a manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid, the section is missing, or
    /// required fields are absent.
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let (manifest, _) = Self::parse_with_table(content, Path::new(MANIFEST_FILE))?;
        Ok(manifest)
    }

    /// Parse the manifest and also return the raw `[tool.poetry]` table.
    fn parse_with_table(content: &str, path: &Path) -> Result<(Self, toml::Table), ManifestError> {
        let document: toml::Table = toml::from_str(content)?;
        let table = document
            .get("tool")
            .and_then(|tool| tool.get("poetry"))
            .and_then(toml::Value::as_table)
            .cloned()
            .ok_or_else(|| ManifestError::MissingSection(path.to_path_buf()))?;

        let manifest: Self = toml::Value::Table(table.clone()).try_into()?;
        manifest.validate_name()?;
        Ok((manifest, table))
    }

    /// Validate the package name.
    fn validate_name(&self) -> Result<(), ManifestError> {
        let name = &self.name;

        if name.is_empty() {
            return Err(ManifestError::InvalidName(
                name.clone(),
                "name cannot be empty",
            ));
        }

        if !name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
            || !name.chars().last().is_some_and(|c| c.is_ascii_alphanumeric())
        {
            return Err(ManifestError::InvalidName(
                name.clone(),
                "name must start and end with a letter or digit",
            ));
        }

        for c in name.chars() {
            if !c.is_ascii_alphanumeric() && !matches!(c, '-' | '_' | '.') {
                return Err(ManifestError::InvalidName(
                    name.clone(),
                    "name can only contain letters, numbers, '-', '_' and '.'",
                ));
            }
        }

        Ok(())
    }

    /// Entry point groups built from `scripts` and `plugins`.
    #[must_use]
    pub fn entry_points(&self) -> BTreeMap<String, Vec<String>> {
        convert_entry_points(&self.scripts, &self.plugins)
    }
}

/// A loaded project: its root, manifest and the package it describes.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    manifest_path: PathBuf,
    manifest: Manifest,
    config: toml::Table,
    package: Package,
}

impl Project {
    /// Load the project whose manifest lives in `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is missing or invalid, the readme
    /// cannot be opened, or an expression does not parse.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let root = root.as_ref().canonicalize()?;
        let manifest_path = root.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&manifest_path)?;
        let (manifest, config) = Manifest::parse_with_table(&content, &manifest_path)?;
        let package = Self::create_package(&root, &manifest)?;

        tracing::debug!(
            package = %package.pretty_string(),
            root = %root.display(),
            "loaded project"
        );

        Ok(Self {
            root,
            manifest_path,
            manifest,
            config,
            package,
        })
    }

    fn create_package(root: &Path, manifest: &Manifest) -> Result<Package, ManifestError> {
        let version = Version::parse(&manifest.version)?;
        let mut package =
            Package::with_pretty_version(&manifest.name, &version.to_string(), &manifest.version);

        package.description.clone_from(&manifest.description);
        package.authors.clone_from(&manifest.authors);
        package.homepage.clone_from(&manifest.homepage);
        package.repository_url.clone_from(&manifest.repository);
        package.keywords.clone_from(&manifest.keywords);
        package.license.clone_from(&manifest.license);

        if let Some(readme) = &manifest.readme {
            let path = root.join(readme);
            File::open(&path).map_err(|source| ManifestError::Readme {
                path: path.clone(),
                source,
            })?;
            package.readme = Some(PathBuf::from(readme));
        }

        if let Some(platform) = &manifest.platform {
            package.set_platform(platform)?;
        }

        for (name, spec) in &manifest.dependencies {
            if name.eq_ignore_ascii_case(PYTHON_KEY) {
                let DependencySpec::Range(range) = spec else {
                    return Err(ManifestError::InvalidPython);
                };
                package.set_python_versions(range)?;
                continue;
            }
            package.add_dependency(name, Some(spec.clone()), Category::Main)?;
        }

        for (name, spec) in &manifest.dev_dependencies {
            package.add_dependency(name, Some(spec.clone()), Category::Dev)?;
        }

        for (extra, names) in &manifest.extras {
            let mut dependencies = Vec::with_capacity(names.len());
            for name in names {
                let dependency = package
                    .requires
                    .iter()
                    .find(|d| d.name() == name.to_lowercase())
                    .ok_or_else(|| ManifestError::UnknownExtraDependency {
                        extra: extra.clone(),
                        dependency: name.clone(),
                    })?;
                dependencies.push(dependency.clone());
            }
            package.extras.insert(extra.clone(), dependencies);
        }

        Ok(package)
    }

    /// Canonical project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The raw `[tool.poetry]` table.
    #[must_use]
    pub fn config(&self) -> &toml::Table {
        &self.config
    }

    #[must_use]
    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Mutable access for dependency activation before a build.
    pub fn package_mut(&mut self) -> &mut Package {
        &mut self.package
    }

    /// Locate the module this project distributes.
    ///
    /// # Errors
    ///
    /// Returns an error if no matching package directory or module file exists.
    pub fn module(&self) -> Result<Module, ModuleError> {
        Module::new(self.package.name(), &self.root)
    }

    /// The locker for `pyproject.lock` next to the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest content cannot be hashed.
    pub fn locker(&self) -> Result<Locker, LockError> {
        Locker::new(self.root.join(LOCK_FILE), &self.config)
    }
}
