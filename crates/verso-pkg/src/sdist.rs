//! Source distribution builder.
//!
//! Produces `<name>-<version>.tar.gz` containing the project module, the
//! manifest, the readme and two generated files (`setup.py`, `PKG-INFO`).
//! Entry metadata is normalized so that rebuilding an unchanged tree yields
//! the same entries.

use crate::constraint::ConstraintError;
use crate::layout::{find_packages, Module, ModuleError};
use crate::legacy::{InstallStrategy, PkgInfo, SetupScript};
use crate::manifest::Project;
use crate::metadata::{
    convert_dependencies, extras_require, get_classifiers, main_author, python_requires,
    MetadataError, AVAILABLE_PYTHONS, DEFAULT_PYTHON_CONSTRAINT,
};
use crate::scan::{find_excluded_files, find_files_to_add};
use crate::vcs::{get_vcs, Vcs};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tar::{EntryType, Header, HeaderMode};
use thiserror::Error;

/// Default output directory, relative to the project root.
pub const DIST_DIR: &str = "dist";

/// Archive file extension.
pub const ARCHIVE_EXT: &str = "tar.gz";

/// Name of the generated build script.
pub const SETUP_FILE: &str = "setup.py";

/// Name of the generated metadata file.
pub const PKG_INFO_FILE: &str = "PKG-INFO";

/// Mode of entries with any execute bit.
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Mode of every other entry.
pub const NON_EXECUTABLE_MODE: u32 = 0o644;

/// Errors that can occur while building a source distribution.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    #[error(transparent)]
    Module(#[from] ModuleError),
}

/// Collapse permission bits to [`EXECUTABLE_MODE`] or [`NON_EXECUTABLE_MODE`].
#[must_use]
pub fn normalize_file_permissions(mode: u32) -> u32 {
    if mode & 0o111 != 0 {
        EXECUTABLE_MODE
    } else {
        NON_EXECUTABLE_MODE
    }
}

/// Strip ownership from a tar header and normalize its permissions.
///
/// # Errors
///
/// Returns an error if the header mode cannot be read or the owner names
/// cannot be set.
pub fn clean_header(header: &mut Header) -> io::Result<()> {
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("")?;
    header.set_groupname("")?;
    let mode = header.mode()?;
    header.set_mode(normalize_file_permissions(mode));
    Ok(())
}

/// Builds a source distribution for a loaded project.
pub struct SdistBuilder<'a> {
    project: &'a Project,
    module: Module,
    vcs: Option<Box<dyn Vcs>>,
}

impl<'a> SdistBuilder<'a> {
    /// Prepare a builder, locating the project module and its VCS.
    ///
    /// # Errors
    ///
    /// Returns an error if the project module cannot be found.
    pub fn new(project: &'a Project) -> Result<Self, BuildError> {
        let module = project.module()?;
        let vcs = get_vcs(project.root()).map(|git| Box::new(git) as Box<dyn Vcs>);
        Ok(Self {
            project,
            module,
            vcs,
        })
    }

    /// Replace the VCS consulted for ignored files.
    #[must_use]
    pub fn with_vcs(mut self, vcs: Option<Box<dyn Vcs>>) -> Self {
        self.vcs = vcs;
        self
    }

    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Project-relative paths of the files copied into the archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the module tree cannot be read.
    pub fn find_files_to_add(&self) -> io::Result<Vec<PathBuf>> {
        let root = self.project.root();
        let excluded = find_excluded_files(root, self.vcs.as_deref());
        find_files_to_add(
            root,
            self.module.path(),
            self.project.manifest_path(),
            self.project.package().readme.as_deref(),
            &excluded,
        )
    }

    /// Generate the `setup.py` source.
    ///
    /// # Errors
    ///
    /// Returns an error if the first author is malformed or the package
    /// layout cannot be read.
    pub fn build_setup(&self) -> Result<String, BuildError> {
        let package = self.project.package();
        let author = main_author(package)?;

        let strategy = if self.module.is_package() {
            InstallStrategy::Packages(find_packages(self.module.path())?)
        } else {
            InstallStrategy::Module(self.module.name().to_string())
        };

        // Optional dependencies are only installed through their extras.
        let (install_requires, conditional) =
            convert_dependencies(package.requires.iter().filter(|d| !d.is_optional()));

        let constraint = package.python_constraint();
        let script = SetupScript {
            name: package.pretty_name().to_string(),
            version: package.pretty_version().to_string(),
            description: package.description.clone(),
            author,
            url: package.homepage.clone().or_else(|| package.repository_url.clone()),
            strategy,
            install_requires,
            extras_require: extras_require(&conditional, package),
            entry_points: self.project.manifest().entry_points(),
            python_requires: (!constraint.is_any()).then(|| python_requires(constraint)),
        };
        Ok(script.render())
    }

    /// Generate the `PKG-INFO` contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the first author is malformed.
    pub fn build_pkg_info(&self) -> Result<String, BuildError> {
        let package = self.project.package();
        let info = PkgInfo {
            name: package.pretty_name().to_string(),
            version: package.pretty_version().to_string(),
            summary: package.description.clone(),
            home_page: package.homepage.clone().or_else(|| package.repository_url.clone()),
            author: main_author(package)?,
        };
        Ok(info.render())
    }

    /// Python classifiers derived from the package's python constraint.
    ///
    /// # Errors
    ///
    /// Returns an error if the constraint does not parse.
    pub fn classifiers(&self) -> Result<Vec<String>, BuildError> {
        Ok(get_classifiers(
            self.project.package().python_versions(),
            DEFAULT_PYTHON_CONSTRAINT,
            AVAILABLE_PYTHONS,
        )?)
    }

    /// Write the archive into `target_dir` (default `<root>/dist`).
    ///
    /// Generated files are rendered before the archive is created, so
    /// metadata errors leave no file behind. The archive is finalized even if
    /// appending an entry fails.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata generation, scanning or writing fails.
    pub fn build(&self, target_dir: Option<&Path>) -> Result<PathBuf, BuildError> {
        let package = self.project.package();
        let target_dir =
            target_dir.map_or_else(|| self.project.root().join(DIST_DIR), Path::to_path_buf);
        let base_name = format!("{}-{}", package.pretty_name(), package.pretty_version());

        let setup = self.build_setup()?;
        let pkg_info = self.build_pkg_info()?;
        let files = self.find_files_to_add()?;

        fs::create_dir_all(&target_dir)?;
        let target = target_dir.join(format!("{base_name}.{ARCHIVE_EXT}"));
        self.write_archive(&target, &base_name, &files, &setup, &pkg_info)?;

        tracing::info!(
            archive = %target.display(),
            entries = files.len() + 2,
            "built source distribution"
        );
        Ok(target)
    }

    /// Create `target` and stream every entry into it.
    ///
    /// The gzip stream is finished even when an entry fails; the first error
    /// wins.
    fn write_archive(
        &self,
        target: &Path,
        base_name: &str,
        files: &[PathBuf],
        setup: &str,
        pkg_info: &str,
    ) -> Result<(), BuildError> {
        let file = File::create(target)?;
        let mut archive = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        archive.follow_symlinks(false);

        let appended =
            self.append_entries(&mut archive, Path::new(base_name), files, setup, pkg_info);
        let finished = archive.into_inner().and_then(GzEncoder::finish);
        appended?;
        finished?;
        Ok(())
    }

    fn append_entries<W: Write>(
        &self,
        archive: &mut tar::Builder<W>,
        base: &Path,
        files: &[PathBuf],
        setup: &str,
        pkg_info: &str,
    ) -> io::Result<()> {
        for rel in files {
            let path = self.project.root().join(rel);
            let metadata = fs::symlink_metadata(&path)?;
            let mut header = Header::new_ustar();
            header.set_metadata_in_mode(&metadata, HeaderMode::Complete);
            clean_header(&mut header)?;

            let name = base.join(rel);
            if metadata.file_type().is_symlink() {
                let link = fs::read_link(&path)?;
                header.set_size(0);
                append_entry(archive, &mut header, &name, Some(&link), io::empty())?;
            } else if metadata.is_file() {
                append_entry(archive, &mut header, &name, None, File::open(&path)?)?;
            } else {
                header.set_size(0);
                append_entry(archive, &mut header, &name, None, io::empty())?;
            }
        }

        append_generated(archive, &base.join(SETUP_FILE), setup)?;
        append_generated(archive, &base.join(PKG_INFO_FILE), pkg_info)
    }
}

/// Append an in-memory file with a zero mtime.
fn append_generated<W: Write>(
    archive: &mut tar::Builder<W>,
    name: &Path,
    contents: &str,
) -> io::Result<()> {
    let bytes = contents.as_bytes();
    let mut header = Header::new_ustar();
    header.set_entry_type(EntryType::Regular);
    header.set_size(bytes.len() as u64);
    header.set_mtime(0);
    header.set_mode(NON_EXECUTABLE_MODE);
    clean_header(&mut header)?;
    append_entry(archive, &mut header, name, None, bytes)
}

/// Append a ustar entry. Names that do not fit the ustar fields are
/// recorded in a preceding PAX extended header (`path`, `linkpath`) and
/// truncated in the ustar header itself.
fn append_entry<W: Write, R: Read>(
    archive: &mut tar::Builder<W>,
    header: &mut Header,
    name: &Path,
    link: Option<&Path>,
    data: R,
) -> io::Result<()> {
    let mut extensions: Vec<(&str, Vec<u8>)> = Vec::new();

    if header.set_path(name).is_err() {
        let bytes = pax_path(name)?;
        if let Some(ustar) = header.as_ustar_mut() {
            ustar.prefix = [0; 155];
        }
        copy_truncated(&mut header.as_old_mut().name, &bytes);
        extensions.push(("path", bytes));
    }

    if let Some(link) = link {
        if header.set_link_name(link).is_err() {
            let bytes = pax_path(link)?;
            copy_truncated(&mut header.as_old_mut().linkname, &bytes);
            extensions.push(("linkpath", bytes));
        }
    }

    if !extensions.is_empty() {
        archive.append_pax_extensions(
            extensions
                .iter()
                .map(|(key, value)| (*key, value.as_slice())),
        )?;
    }

    header.set_cksum();
    archive.append(header, data)
}

/// UTF-8 bytes of an archive path, with `/` separators.
fn pax_path(path: &Path) -> io::Result<Vec<u8>> {
    let text = path.to_str().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path is not valid UTF-8: {}", path.display()),
        )
    })?;
    Ok(text.replace('\\', "/").into_bytes())
}

fn copy_truncated(field: &mut [u8], bytes: &[u8]) {
    field.fill(0);
    let len = bytes.len().min(field.len());
    field[..len].copy_from_slice(&bytes[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
[tool.poetry]
name = "my-package"
version = "1.2.3"
description = "Some description."
authors = ["Sébastien Eustace <sebastien@eustace.io>"]
homepage = "https://poetry.eustace.io/"

[tool.poetry.dependencies]
python = "^3.6"
cleo = "^0.6"
pendulum = { version = "^1.4", optional = true }
futures = { version = "^3.2", python = "~2.7" }

[tool.poetry.extras]
time = ["pendulum"]
"#;

    fn project(manifest: &str) -> (TempDir, Project) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::write(root.join("pyproject.toml"), manifest).unwrap();
        fs::create_dir_all(root.join("my_package/data1")).unwrap();
        fs::write(root.join("my_package/__init__.py"), "").unwrap();
        fs::write(root.join("my_package/data1/test.json"), "{}").unwrap();
        let project = Project::load(root).unwrap();
        (tmp, project)
    }

    #[test]
    fn permissions_normalize_to_two_values() {
        assert_eq!(normalize_file_permissions(0o600), 0o644);
        assert_eq!(normalize_file_permissions(0o100_664), 0o644);
        assert_eq!(normalize_file_permissions(0o700), 0o755);
        assert_eq!(normalize_file_permissions(0o641), 0o755);
        for mode in [0o000, 0o777, 0o750, 0o444] {
            let once = normalize_file_permissions(mode);
            assert_eq!(normalize_file_permissions(once), once);
        }
    }

    #[test]
    fn clean_header_strips_owner() {
        let mut header = Header::new_ustar();
        header.set_uid(1000);
        header.set_gid(1000);
        header.set_username("alice").unwrap();
        header.set_groupname("staff").unwrap();
        header.set_mode(0o775);

        clean_header(&mut header).unwrap();
        assert_eq!(header.uid().unwrap(), 0);
        assert_eq!(header.gid().unwrap(), 0);
        assert_eq!(header.username().unwrap(), Some(""));
        assert_eq!(header.groupname().unwrap(), Some(""));
        assert_eq!(header.mode().unwrap(), 0o755);
    }

    #[test]
    fn setup_script_contents() {
        let (_tmp, project) = project(MANIFEST);
        let builder = SdistBuilder::new(&project).unwrap().with_vcs(None);
        let setup = builder.build_setup().unwrap();

        assert!(setup
            .starts_with("from setuptools import setup\n\npackages = \\\n['my_package']\n"));
        assert!(setup.contains("package_data = \\\n{'': ['*'], 'my_package': ['data1/*']}\n"));
        assert!(setup.contains("install_requires = \\\n['cleo (>=0.6.0.0,<0.7.0.0)']\n"));
        assert!(setup.contains(
            "extras_require = \\\n\
             {':python_version>=\"2.7.0.0\" and python_version<\"2.8.0.0\"': ['futures '\n"
        ));
        assert!(setup.contains("'time': ['pendulum (>=1.4.0.0,<2.0.0.0)']}"));
        assert!(setup.contains("    name='my-package',\n    version='1.2.3',\n"));
        assert!(setup.contains("    python_requires='>=3.6.0.0,<4.0.0.0',\n)\n"));
    }

    #[test]
    fn pkg_info_contents() {
        let (_tmp, project) = project(MANIFEST);
        let builder = SdistBuilder::new(&project).unwrap().with_vcs(None);
        assert_eq!(
            builder.build_pkg_info().unwrap(),
            "Metadata-Version: 1.1\n\
             Name: my-package\n\
             Version: 1.2.3\n\
             Summary: Some description.\n\
             Home-page: https://poetry.eustace.io/\n\
             Author: Sébastien Eustace\n\
             Author-email: sebastien@eustace.io\n"
        );
    }

    #[test]
    fn classifiers_follow_python_constraint() {
        let (_tmp, project) = project(MANIFEST);
        let builder = SdistBuilder::new(&project).unwrap();
        assert_eq!(
            builder.classifiers().unwrap(),
            vec![
                "Programming Language :: Python :: 3.6",
                "Programming Language :: Python :: 3.7",
            ]
        );
    }

    #[test]
    fn files_to_add() {
        let (_tmp, project) = project(MANIFEST);
        let builder = SdistBuilder::new(&project).unwrap().with_vcs(None);
        assert_eq!(
            builder.find_files_to_add().unwrap(),
            vec![
                PathBuf::from("my_package/__init__.py"),
                PathBuf::from("my_package/data1/test.json"),
                PathBuf::from("pyproject.toml"),
            ]
        );
    }

    #[test]
    fn failed_entry_still_finishes_archive() {
        let (tmp, project) = project(MANIFEST);
        let builder = SdistBuilder::new(&project).unwrap().with_vcs(None);
        let target = tmp.path().join("broken.tar.gz");
        let files = vec![
            PathBuf::from("pyproject.toml"),
            PathBuf::from("my_package/vanished.py"),
        ];

        let err = builder
            .write_archive(&target, "my-package-1.2.3", &files, "", "")
            .unwrap_err();
        assert!(matches!(err, BuildError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));

        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(File::open(&target).unwrap())
            .read_to_end(&mut decoded)
            .unwrap();
        assert!(decoded.starts_with(b"my-package-1.2.3/pyproject.toml\0"));

        let mut archive = tar::Archive::new(decoded.as_slice());
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["my-package-1.2.3/pyproject.toml"]);
    }

    #[test]
    fn long_names_use_pax_records() {
        let mut archive = tar::Builder::new(Vec::new());
        let name = PathBuf::from(format!("demo-1.0/demo/{}.txt", "n".repeat(120)));
        let mut header = Header::new_ustar();
        header.set_size(2);
        header.set_mode(NON_EXECUTABLE_MODE);
        append_entry(&mut archive, &mut header, &name, None, &b"{}"[..]).unwrap();
        let bytes = archive.into_inner().unwrap();

        // PAX extended header first, then the ustar entry.
        assert_eq!(bytes[156], b'x');
        assert_eq!(&bytes[257..265], b"ustar\x0000");
        let mut entries = tar::Archive::new(bytes.as_slice());
        let paths: Vec<PathBuf> = entries
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().into_owned())
            .collect();
        assert_eq!(paths, vec![name]);
    }

    #[test]
    fn missing_module() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("pyproject.toml"), MANIFEST).unwrap();
        let project = Project::load(tmp.path()).unwrap();

        assert!(matches!(
            SdistBuilder::new(&project),
            Err(BuildError::Module(..))
        ));
    }
}
