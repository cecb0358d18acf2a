//! Lock file (`pyproject.lock`) reading and writing.
//!
//! The lock records the exact packages chosen for a project together with a
//! hash of the manifest keys that influence resolution. A lock whose stored
//! hash differs from the current one is stale.

use crate::constraint::ConstraintError;
use crate::package::{Category, DependencySpec, Package, PackageSource};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Lock file name.
pub const LOCK_FILE: &str = "pyproject.lock";

/// Manifest keys covered by the content hash.
pub const RELEVANT_KEYS: &[&str] = &[
    "name",
    "version",
    "python-versions",
    "platform",
    "dependencies",
    "dev-dependencies",
    "source",
];

/// Errors that can occur when working with lock files.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("failed to access lock file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse lock file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize lock file: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to hash manifest content: {0}")]
    Hash(#[from] serde_json::Error),

    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    #[error("no lock file found at {}", .0.display())]
    NotFound(PathBuf),
}

/// Contents of a lock file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lockfile {
    #[serde(default)]
    pub package: Vec<LockedPackage>,

    /// Extra name to the pretty names of its dependencies.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, Vec<String>>,

    pub metadata: LockMetadata,
}

/// A locked package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LockedPackage {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub optional: bool,
    pub python_versions: String,
    #[serde(default = "any_platform")]
    pub platform: String,
    /// Dependency pretty name to its constraint.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PackageSource>,
}

fn any_platform() -> String {
    "*".to_string()
}

/// Lock-wide metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LockMetadata {
    pub python_versions: String,
    pub platform: String,
    pub content_hash: String,
    /// Package pretty name to its archive hashes.
    #[serde(default)]
    pub hashes: BTreeMap<String, Vec<String>>,
}

/// Reads and writes the lock file of one project.
#[derive(Debug, Clone)]
pub struct Locker {
    lock: PathBuf,
    content_hash: String,
}

impl Locker {
    /// Create a locker for `lock`, hashing the relevant keys of the project's
    /// `[tool.poetry]` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be converted for hashing.
    pub fn new(lock: impl Into<PathBuf>, local_config: &toml::Table) -> Result<Self, LockError> {
        Ok(Self {
            lock: lock.into(),
            content_hash: content_hash(local_config)?,
        })
    }

    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock
    }

    #[must_use]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Returns true if a lock file with a package list exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing lock file cannot be read or parsed.
    pub fn is_locked(&self) -> Result<bool, LockError> {
        if !self.lock.exists() {
            return Ok(false);
        }
        Ok(self.read_table()?.contains_key("package"))
    }

    /// Returns true if the stored content hash matches the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file is missing or cannot be parsed.
    pub fn is_fresh(&self) -> Result<bool, LockError> {
        let table = self.read_table()?;
        let stored = table
            .get("metadata")
            .and_then(|metadata| metadata.get("content-hash"))
            .and_then(toml::Value::as_str);
        Ok(stored == Some(self.content_hash.as_str()))
    }

    /// Parse the lock file.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::NotFound`] if there is no lock file.
    pub fn lock_data(&self) -> Result<Lockfile, LockError> {
        let content = self.read()?;
        Ok(toml::from_str(&content)?)
    }

    /// Rebuild the locked packages, optionally including dev packages.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be read or holds an invalid
    /// constraint.
    pub fn locked_packages(&self, with_dev: bool) -> Result<Vec<Package>, LockError> {
        if !self.is_locked()? {
            return Ok(Vec::new());
        }

        let lock = self.lock_data()?;
        lock.package
            .iter()
            .filter(|info| with_dev || info.category == Category::Main)
            .map(|info| load_package(info, &lock.metadata))
            .collect()
    }

    /// Record `packages` as the locked set for `root`.
    ///
    /// Returns true if the lock file was (re)written.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be read or written.
    pub fn set_lock_data(&self, root: &Package, packages: &[Package]) -> Result<bool, LockError> {
        let mut sorted: Vec<&Package> = packages.iter().collect();
        sorted.sort_by(|a, b| a.name().cmp(b.name()));

        let mut hashes = BTreeMap::new();
        let mut locked = Vec::with_capacity(sorted.len());
        for package in sorted {
            hashes.insert(package.pretty_name().to_string(), package.hashes.clone());
            locked.push(dump_package(package));
        }

        let lock = Lockfile {
            package: locked,
            extras: root
                .extras
                .iter()
                .map(|(extra, deps)| {
                    let names: Vec<String> =
                        deps.iter().map(|d| d.pretty_name().to_string()).collect();
                    (extra.clone(), names)
                })
                .collect(),
            metadata: LockMetadata {
                python_versions: root.python_versions().to_string(),
                platform: root.platform().to_string(),
                content_hash: self.content_hash.clone(),
                hashes,
            },
        };

        if self.is_locked()? && self.lock_data()? == lock {
            tracing::debug!(lock = %self.lock.display(), "lock file unchanged");
            return Ok(false);
        }

        fs::write(&self.lock, toml::to_string_pretty(&lock)?)?;
        tracing::info!(
            lock = %self.lock.display(),
            packages = lock.package.len(),
            "wrote lock file"
        );
        Ok(true)
    }

    fn read(&self) -> Result<String, LockError> {
        match fs::read_to_string(&self.lock) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(LockError::NotFound(self.lock.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read_table(&self) -> Result<toml::Table, LockError> {
        Ok(toml::from_str(&self.read()?)?)
    }
}

fn dump_package(package: &Package) -> LockedPackage {
    let dependencies = package
        .requires
        .iter()
        .filter(|d| !d.is_optional())
        .map(|d| {
            // VCS references are not version constraints.
            let constraint = if d.is_vcs() { "*" } else { d.pretty_constraint() };
            (d.pretty_name().to_string(), constraint.to_string())
        })
        .collect();

    LockedPackage {
        name: package.pretty_name().to_string(),
        version: package.pretty_version().to_string(),
        description: package.description.clone(),
        category: package.category,
        optional: package.optional,
        python_versions: package.python_versions().to_string(),
        platform: package.platform().to_string(),
        dependencies,
        source: package.source.clone(),
    }
}

fn load_package(info: &LockedPackage, metadata: &LockMetadata) -> Result<Package, LockError> {
    let mut package = Package::new(&info.name, &info.version);
    package.description.clone_from(&info.description);
    package.category = info.category;
    package.optional = info.optional;
    package.hashes = metadata.hashes.get(&info.name).cloned().unwrap_or_default();
    package.set_python_versions(&info.python_versions)?;
    package.set_platform(&info.platform)?;

    for (name, constraint) in &info.dependencies {
        package.add_dependency(
            name,
            Some(DependencySpec::from(constraint.as_str())),
            Category::Main,
        )?;
    }

    package.source.clone_from(&info.source);
    Ok(package)
}

/// SHA-256 of the relevant manifest keys, serialized as sorted JSON with
/// `", "` and `": "` separators and ASCII-only escapes.
///
/// # Errors
///
/// Returns an error if a manifest value cannot be represented as JSON.
pub fn content_hash(local_config: &toml::Table) -> Result<String, serde_json::Error> {
    let mut relevant = serde_json::Map::new();
    for key in RELEVANT_KEYS {
        let value = match local_config.get(*key) {
            Some(value) => serde_json::to_value(value)?,
            None => serde_json::Value::Null,
        };
        relevant.insert((*key).to_string(), value);
    }

    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedAsciiFormatter);
    serde_json::Value::Object(relevant).serialize(&mut serializer)?;

    Ok(hex::encode(Sha256::digest(&buf)))
}

/// JSON formatter with spaced separators that escapes all non-ASCII text.
struct SpacedAsciiFormatter;

impl serde_json::ser::Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}
