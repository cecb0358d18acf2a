//! Implementation of the `verso build`, `verso requirements` and
//! `verso classifiers` commands.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use verso_pkg::{Project, SdistBuilder};

/// Options for the build command.
#[derive(Debug)]
pub struct BuildOptions {
    /// Project root containing `pyproject.toml`.
    pub path: PathBuf,
    /// Output directory. If None, `<root>/dist` is used.
    pub target_dir: Option<PathBuf>,
}

fn load_project(path: &Path) -> Result<Project> {
    Project::load(path)
        .with_context(|| format!("Failed to load project at {}", path.display()))
}

/// Build the source distribution and return its path.
pub fn build_package(options: &BuildOptions) -> Result<PathBuf> {
    let project = load_project(&options.path)?;
    let package = project.package();
    tracing::info!("Building {}", package.pretty_string());

    let builder = SdistBuilder::new(&project).context("Failed to locate the project module")?;
    let target = builder
        .build(options.target_dir.as_deref())
        .with_context(|| format!("Failed to build {}", package.pretty_string()))?;

    Ok(target)
}

/// Requirement strings of the project's mandatory dependencies.
pub fn requirements(path: &Path) -> Result<Vec<String>> {
    let project = load_project(path)?;
    Ok(project
        .package()
        .requires
        .iter()
        .filter(|d| !d.is_optional())
        .map(verso_pkg::Dependency::to_requirement_string)
        .collect())
}

/// Python classifiers of the project.
pub fn classifiers(path: &Path) -> Result<Vec<String>> {
    let project = load_project(path)?;
    let builder = SdistBuilder::new(&project).context("Failed to locate the project module")?;
    builder
        .classifiers()
        .context("Failed to derive python classifiers")
}
