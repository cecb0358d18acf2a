//! Dependency model and source distribution builder for verso.
//!
//! This crate provides:
//! - Version normalization and constraint parsing
//! - Packages and dependencies with legacy requirement rendering
//! - Parsing of `pyproject.toml` manifests into a loaded project
//! - Source tree scanning and package layout discovery
//! - `.tar.gz` source distributions with generated `setup.py` and `PKG-INFO`
//! - Lock file support with manifest content hashing

mod constraint;
mod dependency;
mod layout;
mod legacy;
mod lockfile;
mod manifest;
mod metadata;
mod package;
mod scan;
mod sdist;
mod vcs;
mod version;

pub use constraint::{parse_constraints, Constraint, ConstraintError, Operator, PlatformConstraint};
pub use dependency::{Dependency, VcsKind, VcsReference, VcsSource};
pub use layout::{
    find_packages, Module, ModuleError, PackageLayout, BYTECODE_CACHE_DIR, MODULE_EXT,
    PACKAGE_MARKER,
};
pub use legacy::{InstallStrategy, PkgInfo, PyLiteral, SetupScript};
pub use lockfile::{
    content_hash, LockError, LockMetadata, LockedPackage, Lockfile, Locker, LOCK_FILE,
};
pub use manifest::{Manifest, ManifestError, Project, Repository, MANIFEST_FILE};
pub use metadata::{
    convert_author, convert_dependencies, convert_entry_points, extras_require, get_classifiers,
    main_author, python_requires, Author, MetadataError, AVAILABLE_PYTHONS,
    CONSOLE_SCRIPTS_GROUP, DEFAULT_PYTHON_CONSTRAINT,
};
pub use package::{Category, DependencySpec, Package, PackageSource, VcsSpec, VersionedSpec};
pub use scan::{find_excluded_files, find_files_to_add};
pub use sdist::{
    clean_header, normalize_file_permissions, BuildError, SdistBuilder, ARCHIVE_EXT, DIST_DIR,
    EXECUTABLE_MODE, NON_EXECUTABLE_MODE,
};
pub use vcs::{get_vcs, Git, Vcs};
pub use version::{Modifier, Stability, Version};
