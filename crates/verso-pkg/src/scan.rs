//! Source tree scanning.
//!
//! Collects the project-relative paths that go into a source archive.

use crate::layout::BYTECODE_CACHE_DIR;
use crate::vcs::Vcs;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extensions of compiled bytecode files.
const BYTECODE_EXTENSIONS: &[&str] = &["pyc", "pyo"];

/// Files under `project_root` the VCS ignores, relative to the root.
///
/// A missing VCS or a failing query yields an empty list. Ignored paths that
/// are not below `project_root` are dropped.
pub fn find_excluded_files(project_root: &Path, vcs: Option<&dyn Vcs>) -> Vec<PathBuf> {
    let Some(vcs) = vcs else {
        tracing::debug!("no version control found, nothing excluded");
        return Vec::new();
    };

    let ignored = match vcs.get_ignored_files() {
        Ok(ignored) => ignored,
        Err(e) => {
            tracing::warn!(root = %vcs.root().display(), "could not list ignored files: {e}");
            return Vec::new();
        }
    };

    ignored
        .iter()
        .filter_map(|path| relative_to(path, project_root))
        .collect()
}

/// Collect every file to archive, sorted by path.
///
/// Walks `module_root` (a package directory or a single module file),
/// skipping bytecode caches, compiled files and `excluded` paths, then adds
/// the manifest and the readme if it exists. `excluded` entries may be
/// absolute or relative to `project_root`.
///
/// # Errors
///
/// Returns an error if a directory under `module_root` cannot be read.
pub fn find_files_to_add(
    project_root: &Path,
    module_root: &Path,
    manifest_path: &Path,
    readme: Option<&Path>,
    excluded: &[PathBuf],
) -> io::Result<Vec<PathBuf>> {
    let excluded: BTreeSet<PathBuf> = excluded
        .iter()
        .filter_map(|path| {
            if path.is_absolute() {
                relative_to(path, project_root)
            } else {
                Some(path.clone())
            }
        })
        .collect();

    let mut files = BTreeSet::new();
    let mut candidates = Vec::new();
    if module_root.is_dir() {
        collect_files(module_root, &mut candidates)?;
    } else {
        candidates.push(module_root.to_path_buf());
    }

    for path in candidates {
        let Some(rel) = relative_to(&path, project_root) else {
            continue;
        };
        if excluded.contains(&rel) || is_bytecode(&rel) {
            tracing::debug!(path = %rel.display(), "skipping");
            continue;
        }
        tracing::debug!(path = %rel.display(), "adding");
        files.insert(rel);
    }

    if let Some(rel) = relative_to(manifest_path, project_root) {
        files.insert(rel);
    }

    if let Some(readme) = readme {
        let readme = project_root.join(readme);
        if readme.exists() {
            if let Some(rel) = relative_to(&readme, project_root) {
                files.insert(rel);
            }
        }
    }

    Ok(files.into_iter().collect())
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if entry.file_name() == BYTECODE_CACHE_DIR {
                continue;
            }
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

fn is_bytecode(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| BYTECODE_EXTENSIONS.contains(&ext))
}

fn relative_to(path: &Path, root: &Path) -> Option<PathBuf> {
    if path.is_relative() {
        return Some(path.to_path_buf());
    }
    path.strip_prefix(root).ok().map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    struct FakeVcs {
        root: PathBuf,
        ignored: io::Result<Vec<PathBuf>>,
    }

    impl Vcs for FakeVcs {
        fn root(&self) -> &Path {
            &self.root
        }

        fn get_ignored_files(&self) -> io::Result<Vec<PathBuf>> {
            match &self.ignored {
                Ok(paths) => Ok(paths.clone()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            }
        }
    }

    fn project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("pkg/sub/__pycache__")).unwrap();
        fs::write(root.join("pyproject.toml"), "").unwrap();
        fs::write(root.join("pkg/__init__.py"), "").unwrap();
        fs::write(root.join("pkg/core.py"), "").unwrap();
        fs::write(root.join("pkg/core.pyc"), "").unwrap();
        fs::write(root.join("pkg/sub/__init__.py"), "").unwrap();
        fs::write(root.join("pkg/sub/__pycache__/x.cpython-36.pyc"), "").unwrap();
        fs::write(root.join("pkg/secret.env"), "").unwrap();
        tmp
    }

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn scans_package_sorted() {
        let tmp = project();
        let root = tmp.path();

        let files = find_files_to_add(
            root,
            &root.join("pkg"),
            &root.join("pyproject.toml"),
            None,
            &[],
        )
        .unwrap();

        assert_eq!(
            files,
            paths(&[
                "pkg/__init__.py",
                "pkg/core.py",
                "pkg/secret.env",
                "pkg/sub/__init__.py",
                "pyproject.toml",
            ])
        );
    }

    #[test]
    fn skips_excluded_and_foreign_paths() {
        let tmp = project();
        let root = tmp.path();
        let excluded = vec![root.join("pkg/secret.env"), PathBuf::from("/elsewhere/x.py")];

        let files = find_files_to_add(
            root,
            &root.join("pkg"),
            &root.join("pyproject.toml"),
            None,
            &excluded,
        )
        .unwrap();

        assert!(!files.contains(&PathBuf::from("pkg/secret.env")));
        assert!(files.contains(&PathBuf::from("pkg/core.py")));
    }

    #[test]
    fn readme_only_when_present() {
        let tmp = project();
        let root = tmp.path();
        let scan = |readme: &str| {
            find_files_to_add(
                root,
                &root.join("pkg"),
                &root.join("pyproject.toml"),
                Some(Path::new(readme)),
                &[],
            )
            .unwrap()
        };

        assert!(!scan("README.rst").contains(&PathBuf::from("README.rst")));

        fs::write(root.join("README.rst"), "Hello").unwrap();
        assert!(scan("README.rst").contains(&PathBuf::from("README.rst")));
    }

    #[test]
    fn single_module_file() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(root.join("module1.py"), "").unwrap();
        fs::write(root.join("pyproject.toml"), "").unwrap();

        let files = find_files_to_add(
            root,
            &root.join("module1.py"),
            &root.join("pyproject.toml"),
            None,
            &[],
        )
        .unwrap();
        assert_eq!(files, paths(&["module1.py", "pyproject.toml"]));
    }

    #[test]
    fn scan_is_repeatable() {
        let tmp = project();
        let root = tmp.path();
        let scan = || {
            find_files_to_add(root, &root.join("pkg"), &root.join("pyproject.toml"), None, &[])
                .unwrap()
        };
        assert_eq!(scan(), scan());
    }

    #[test]
    fn excluded_files_from_vcs() {
        let tmp = project();
        let root = tmp.path();
        let vcs = FakeVcs {
            root: root.to_path_buf(),
            ignored: Ok(vec![root.join("pkg/secret.env"), PathBuf::from("/tmp-other/a")]),
        };

        let excluded = find_excluded_files(root, Some(&vcs));
        assert_eq!(excluded, paths(&["pkg/secret.env"]));
    }

    #[test]
    fn vcs_failure_excludes_nothing() {
        let tmp = project();
        let vcs = FakeVcs {
            root: tmp.path().to_path_buf(),
            ignored: Err(io::Error::other("git not installed")),
        };

        assert!(find_excluded_files(tmp.path(), Some(&vcs)).is_empty());
        assert!(find_excluded_files(tmp.path(), None).is_empty());
    }
}
