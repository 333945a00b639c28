//! Build output housekeeping: cleaning, distribution asset copy and cloud gem discovery.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::core::defines::cloud_gem_names;
use crate::io::link::GemPackage;

/// Extension of a gem's node project file.
const NODE_PROJECT_EXTENSION: &str = "njsproj";

/// Gem folders never searched for node projects.
const SKIPPED_DIRS: [&str; 2] = ["node_modules", "CloudGemFramework"];

/// Extensions removed from the www output directory.
pub const WWW_EXTENSIONS: [&str; 5] = ["js", "css", "html", "json", "map"];

/// What `clean` removes.
#[derive(Debug, Clone)]
pub struct CleanPlan {
    /// Directories whose contents are removed (the directory itself stays).
    pub emptied_dirs: Vec<PathBuf>,
    /// Single files removed when present.
    pub files: Vec<PathBuf>,
    /// Directories scanned recursively for files with the paired extensions.
    pub by_extension: Vec<(PathBuf, Vec<&'static str>)>,
}

/// Remove everything in `plan`, returning the deleted paths.
pub fn clean(plan: &CleanPlan) -> Result<Vec<PathBuf>> {
    let mut deleted = Vec::new();

    for file in &plan.files {
        if file.is_file() {
            fs::remove_file(file).with_context(|| format!("remove {}", file.display()))?;
            deleted.push(file.clone());
        }
    }

    for dir in &plan.emptied_dirs {
        if !dir.is_dir() {
            continue;
        }
        for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
            let path = entry
                .with_context(|| format!("read dir entry in {}", dir.display()))?
                .path();
            if path.is_dir() {
                fs::remove_dir_all(&path)
                    .with_context(|| format!("remove {}", path.display()))?;
            } else {
                fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
            }
            deleted.push(path);
        }
    }

    for (dir, extensions) in &plan.by_extension {
        deleted.extend(remove_by_extension(dir, extensions)?);
    }

    for path in &deleted {
        debug!(path = %path.display(), "deleted");
    }
    info!(count = deleted.len(), "deleted files and folders");
    Ok(deleted)
}

fn remove_by_extension(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut matched = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let has_ext = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.contains(&ext));
        if has_ext {
            matched.push(entry.into_path());
        }
    }
    for path in &matched {
        fs::remove_file(path).with_context(|| format!("remove {}", path.display()))?;
    }
    Ok(matched)
}

/// Copy `bundles/**` and the distribution page (as `index.html`) into `www_dir`.
pub fn copy_dist_assets(portal_root: &Path, dist_page: &Path, www_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    let bundles = portal_root.join("bundles");
    if bundles.is_dir() {
        for entry in WalkDir::new(&bundles) {
            let entry = entry.with_context(|| format!("walk {}", bundles.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(portal_root)
                .with_context(|| format!("relativize {}", entry.path().display()))?;
            let target = www_dir.join(relative);
            copy_file(entry.path(), &target)?;
            copied.push(target);
        }
    }

    let index = www_dir.join("index.html");
    copy_file(dist_page, &index)?;
    copied.push(index);
    info!(count = copied.len(), www = %www_dir.display(), "copied distribution assets");
    Ok(copied)
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::copy(from, to).with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

/// Names of cloud gem folders directly under `gems_dir`.
pub fn cloud_gem_folders(gems_dir: &Path) -> Result<Vec<String>> {
    let mut folders = Vec::new();
    for entry in fs::read_dir(gems_dir).with_context(|| format!("read dir {}", gems_dir.display()))? {
        let entry = entry.with_context(|| format!("read dir entry in {}", gems_dir.display()))?;
        if entry.path().is_dir() {
            folders.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(cloud_gem_names(folders))
}

/// Node packages of the cloud gems under `gems_dir`, sorted by gem name.
pub fn gem_packages(gems_dir: &Path) -> Result<Vec<GemPackage>> {
    let mut packages = Vec::new();
    for folder in cloud_gem_folders(gems_dir)? {
        if SKIPPED_DIRS.contains(&folder.as_str()) {
            continue;
        }
        let gem_dir = gems_dir.join(&folder);
        let walker = WalkDir::new(&gem_dir).into_iter().filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIPPED_DIRS.contains(&name)))
        });
        for entry in walker {
            let entry = entry.with_context(|| format!("walk {}", gem_dir.display()))?;
            let is_project = entry.file_type().is_file()
                && entry.path().extension().and_then(|ext| ext.to_str())
                    == Some(NODE_PROJECT_EXTENSION);
            if !is_project {
                continue;
            }
            if let Some(package) = GemPackage::from_project_file(entry.path()) {
                debug!(gem = %package.gem_name, path = %entry.path().display(), "found gem package");
                packages.push(package);
            }
        }
    }
    packages.sort_by(|a, b| a.gem_name.cmp(&b.gem_name));
    Ok(packages)
}
