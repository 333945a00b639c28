//! Linking cloud gem node packages into the portal's `node_modules`.
//!
//! Every gem with a node project is linked globally from its own directory, then
//! linked into the portal by scoped name unless the portal already has it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::io::process::{command_in, run_command};

const LINK_OUTPUT_LIMIT_BYTES: usize = 200_000;

/// npm scope the gem packages are published under.
pub const PACKAGE_SCOPE: &str = "@cloud-gems";

/// Gem that is the portal itself and is never linked.
pub const PORTAL_GEM: &str = "cloudgemportal";

/// A cloud gem with a node project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GemPackage {
    /// Lowercased project file stem (e.g. `cloudgemmetric`).
    pub gem_name: String,
    /// Directory holding the node project.
    pub dir: PathBuf,
}

impl GemPackage {
    /// Package for the node project file at `project_file`.
    pub fn from_project_file(project_file: &Path) -> Option<Self> {
        let stem = project_file.file_name()?.to_str()?.split('.').next()?;
        if stem.is_empty() {
            return None;
        }
        Some(Self {
            gem_name: stem.to_lowercase(),
            dir: project_file.parent()?.to_path_buf(),
        })
    }

    /// Scoped package name (e.g. `@cloud-gems/cloudgemmetric`).
    pub fn package_name(&self) -> String {
        format!("{PACKAGE_SCOPE}/{}", self.gem_name)
    }
}

/// Runs the package manager's link command.
pub trait PackageLinker {
    /// Link the package in `dir` globally. `Ok(false)` when the command ran but failed.
    fn link_global(&self, dir: &Path) -> Result<bool>;

    /// Link the global `package` into the project at `dir`.
    fn link_into(&self, dir: &Path, package: &str) -> Result<bool>;
}

/// `npm link` as a child process, always with an explicit working directory.
#[derive(Debug, Clone)]
pub struct NpmLinker {
    pub command: Vec<String>,
    pub timeout: Duration,
}

impl NpmLinker {
    fn run(&self, argv: &[String], cwd: &Path) -> Result<bool> {
        let cmd = command_in(argv, cwd)?;
        let output = run_command(cmd, Some(self.timeout), LINK_OUTPUT_LIMIT_BYTES)?;
        if !output.success() {
            warn!(
                command = %argv.join(" "),
                cwd = %cwd.display(),
                exit_code = ?output.status.code(),
                timed_out = output.timed_out,
                stderr = %output.stderr_text(),
                "link command failed"
            );
        }
        Ok(output.success())
    }
}

impl PackageLinker for NpmLinker {
    fn link_global(&self, dir: &Path) -> Result<bool> {
        self.run(&self.command, dir)
    }

    fn link_into(&self, dir: &Path, package: &str) -> Result<bool> {
        let mut argv = self.command.clone();
        argv.push(package.to_string());
        self.run(&argv, dir)
    }
}

/// What happened to one gem package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    pub package: GemPackage,
    pub global_linked: bool,
    /// `None` when the portal already had the package.
    pub local_linked: Option<bool>,
}

/// Link every package except the portal's own.
///
/// `installed_dir` is the portal's scoped `node_modules` directory. Link
/// failures are logged and the remaining packages are still linked.
#[instrument(skip_all, fields(packages = packages.len()))]
pub fn link_gem_packages<L: PackageLinker>(
    linker: &L,
    packages: &[GemPackage],
    portal_root: &Path,
    installed_dir: &Path,
) -> Vec<LinkOutcome> {
    let mut outcomes = Vec::new();
    for package in packages.iter().filter(|package| package.gem_name != PORTAL_GEM) {
        let name = package.package_name();
        info!(package = %name, path = %package.dir.display(), "linking global package");
        let global_linked = attempt(&name, || linker.link_global(&package.dir));

        let local_linked = if installed_dir.join(&package.gem_name).exists() {
            None
        } else {
            info!(package = %name, "linking package into the portal");
            Some(attempt(&name, || linker.link_into(portal_root, &name)))
        };
        outcomes.push(LinkOutcome {
            package: package.clone(),
            global_linked,
            local_linked,
        });
    }
    outcomes
}

fn attempt(package: &str, link: impl FnOnce() -> Result<bool>) -> bool {
    match link() {
        Ok(linked) => linked,
        Err(err) => {
            warn!(package, err = %format!("{err:#}"), "could not run link command");
            false
        }
    }
}
