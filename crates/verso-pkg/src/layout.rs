//! Project module discovery and package layout.
//!
//! A project ships either a directory package or a single-file module:
//! ```text
//! my-project/                 my-project/
//! ├── pyproject.toml          ├── pyproject.toml
//! └── my_project/             └── my_project.py
//!     ├── __init__.py
//!     ├── sub/
//!     │   └── __init__.py
//!     └── data/
//!         └── file.json
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File marking a directory as a package.
pub const PACKAGE_MARKER: &str = "__init__.py";

/// Directory holding compiled bytecode.
pub const BYTECODE_CACHE_DIR: &str = "__pycache__";

/// Source file extension of single-file modules.
pub const MODULE_EXT: &str = "py";

/// Errors that can occur when locating the project module.
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("no package '{name}' or module '{name}.py' found in {}", .root.display())]
    NotFound { name: String, root: PathBuf },
}

/// The importable module a project distributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    name: String,
    path: PathBuf,
    is_package: bool,
}

impl Module {
    /// Locate the module for `package_name` below `root`.
    ///
    /// Dashes in the package name map to underscores. A directory wins over a
    /// single file of the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if neither a directory nor a `.py` file exists.
    pub fn new(package_name: &str, root: &Path) -> Result<Self, ModuleError> {
        let name = package_name.replace('-', "_");

        let package_dir = root.join(&name);
        if package_dir.is_dir() {
            return Ok(Self {
                name,
                path: package_dir,
                is_package: true,
            });
        }

        let module_file = root.join(&name).with_extension(MODULE_EXT);
        if module_file.is_file() {
            return Ok(Self {
                name,
                path: module_file,
                is_package: false,
            });
        }

        Err(ModuleError::NotFound {
            name,
            root: root.to_path_buf(),
        })
    }

    /// Importable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path to the package directory or module file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_package(&self) -> bool {
        self.is_package
    }
}

/// Packages and data globs found below a package directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageLayout {
    /// Dotted package names, sorted.
    pub packages: Vec<String>,

    /// Owning package name to its sorted data globs. The `""` key applies to
    /// every package.
    pub package_data: BTreeMap<String, Vec<String>>,
}

/// Classify every directory below `path` as a sub-package or data directory.
///
/// Files in a data directory belong to the nearest enclosing sub-package.
///
/// # Errors
///
/// Returns an error if a directory cannot be read.
pub fn find_packages(path: &Path) -> io::Result<PackageLayout> {
    let pkg_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a package directory: {}", path.display()),
            )
        })?;

    let mut discovery = Discovery {
        pkg_name: pkg_name.clone(),
        packages: vec![pkg_name],
        subpkg_paths: BTreeSet::new(),
        package_data: BTreeMap::new(),
    };
    // The empty key matches all package names.
    discovery
        .package_data
        .entry(String::new())
        .or_default()
        .push("*".to_string());

    discovery.walk(path, &[])?;

    let mut packages = discovery.packages;
    packages.sort();
    let package_data = discovery
        .package_data
        .into_iter()
        .map(|(pkg, mut globs)| {
            globs.sort();
            (pkg, globs)
        })
        .collect();

    Ok(PackageLayout {
        packages,
        package_data,
    })
}

struct Discovery {
    pkg_name: String,
    packages: Vec<String>,
    subpkg_paths: BTreeSet<String>,
    package_data: BTreeMap<String, Vec<String>>,
}

impl Discovery {
    /// Visit the subdirectories of `dir` top-down; `parts` is `dir` relative
    /// to the top-level package.
    fn walk(&mut self, dir: &Path, parts: &[String]) -> io::Result<()> {
        let mut subdirs = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                subdirs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        subdirs.sort();

        for name in subdirs {
            if name == BYTECODE_CACHE_DIR {
                continue;
            }

            let path = dir.join(&name);
            let mut rel_parts = parts.to_vec();
            rel_parts.push(name);
            let rel_path = rel_parts.join("/");

            if path.join(PACKAGE_MARKER).is_file() {
                self.packages
                    .push(format!("{}.{}", self.pkg_name, rel_parts.join(".")));
                self.subpkg_paths.insert(rel_path);
            } else {
                let (owner, from_owner) = self.find_nearest_pkg(&rel_parts);
                self.package_data
                    .entry(owner)
                    .or_default()
                    .push(format!("{from_owner}/*"));
            }

            self.walk(&path, &rel_parts)?;
        }

        Ok(())
    }

    /// The closest registered ancestor package of a data directory, and the
    /// directory's path below it.
    fn find_nearest_pkg(&self, parts: &[String]) -> (String, String) {
        for i in (1..parts.len()).rev() {
            let ancestor = parts[..i].join("/");
            if self.subpkg_paths.contains(&ancestor) {
                let pkg = format!("{}.{}", self.pkg_name, parts[..i].join("."));
                return (pkg, parts[i..].join("/"));
            }
        }

        // Relative to the top-level package.
        (self.pkg_name.clone(), parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn module_prefers_package_directory() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("my_package/__init__.py"));
        touch(&tmp.path().join("my_package.py"));

        let module = Module::new("my-package", tmp.path()).unwrap();
        assert_eq!(module.name(), "my_package");
        assert!(module.is_package());
        assert_eq!(module.path(), tmp.path().join("my_package"));
    }

    #[test]
    fn module_single_file() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("module1.py"));

        let module = Module::new("module1", tmp.path()).unwrap();
        assert!(!module.is_package());
        assert_eq!(module.path(), tmp.path().join("module1.py"));
    }

    #[test]
    fn module_missing() {
        let tmp = TempDir::new().unwrap();
        let err = Module::new("ghost", tmp.path()).unwrap_err();
        assert!(matches!(err, ModuleError::NotFound { .. }));
    }

    #[test]
    fn root_package_only() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("pkg/__init__.py"));

        let layout = find_packages(&tmp.path().join("pkg")).unwrap();
        assert_eq!(layout.packages, vec!["pkg"]);
        assert_eq!(layout.package_data.len(), 1);
        assert_eq!(layout.package_data[""], vec!["*"]);
    }

    #[test]
    fn sub_packages_and_data() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("my_package");
        touch(&root.join("__init__.py"));
        touch(&root.join("sub_pkg1/__init__.py"));
        touch(&root.join("sub_pkg2/__init__.py"));
        touch(&root.join("sub_pkg2/data2/data.json"));
        touch(&root.join("data1/test.json"));
        touch(&root.join("__pycache__/mod.cpython-36.pyc"));

        let layout = find_packages(&root).unwrap();
        assert_eq!(
            layout.packages,
            vec!["my_package", "my_package.sub_pkg1", "my_package.sub_pkg2"]
        );
        assert_eq!(layout.package_data["my_package"], vec!["data1/*"]);
        assert_eq!(layout.package_data["my_package.sub_pkg2"], vec!["data2/*"]);
    }

    #[test]
    fn deep_data_belongs_to_nearest_sub_package() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("pkg");
        touch(&root.join("__init__.py"));
        touch(&root.join("sub/__init__.py"));
        touch(&root.join("sub/assets/img/logo.png"));

        let layout = find_packages(&root).unwrap();
        assert_eq!(
            layout.package_data["pkg.sub"],
            vec!["assets/*", "assets/img/*"]
        );
        assert!(!layout.package_data.contains_key("pkg"));
    }

    #[test]
    fn discovery_is_sorted() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("pkg");
        touch(&root.join("__init__.py"));
        touch(&root.join("zeta/__init__.py"));
        touch(&root.join("alpha/__init__.py"));
        touch(&root.join("zdata/x.txt"));
        touch(&root.join("adata/x.txt"));

        let layout = find_packages(&root).unwrap();
        assert_eq!(layout.packages, vec!["pkg", "pkg.alpha", "pkg.zeta"]);
        assert_eq!(layout.package_data["pkg"], vec!["adata/*", "zdata/*"]);
    }
}
