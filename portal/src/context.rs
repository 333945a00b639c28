//! Explicit execution context threaded through every command.
//!
//! Directories are resolved once here, at startup, and handed to each child
//! process as its working directory. Nothing changes the process-wide current
//! directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::io::automation::ProtractorRunner;
use crate::io::cloud_cli::ProcessCli;
use crate::io::config::{CONFIG_FILE, PortalConfig, load_config};
use crate::io::link::NpmLinker;
use crate::io::server::NodeDevServer;
use crate::io::workspace::{CleanPlan, WWW_EXTENSIONS};

const CLI_OUTPUT_LIMIT_BYTES: usize = 1_000_000;
const SERVER_READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Levels between the portal root and the engine root in a stock checkout.
const ENGINE_ROOT_DEPTH: usize = 5;
/// Levels between the portal root and the gems directory in a stock checkout.
const GEMS_DIR_DEPTH: usize = 4;

/// Resolved locations and configuration for one invocation.
#[derive(Debug, Clone)]
pub struct SiteContext {
    /// Absolute portal root.
    pub root: PathBuf,
    /// Absolute directory the cloud CLI runs from.
    pub engine_root: PathBuf,
    /// Absolute directory scanned for cloud gem folders.
    pub gems_dir: PathBuf,
    pub config: PortalConfig,
}

impl SiteContext {
    /// Load `portal.toml` (or `config_path`) and resolve directories for `root`.
    pub fn load(root: &Path, config_path: Option<&Path>) -> Result<Self> {
        let root = fs::canonicalize(root)
            .with_context(|| format!("resolve portal root {}", root.display()))?;
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => root.join(CONFIG_FILE),
        };
        let config = load_config(&config_path)?;
        Self::new(root, config)
    }

    /// Build a context from an absolute root and a validated config.
    pub fn new(root: PathBuf, config: PortalConfig) -> Result<Self> {
        let engine_root = match &config.paths.engine_root {
            Some(path) => root.join(path),
            None => ancestor(&root, ENGINE_ROOT_DEPTH)?,
        };
        let gems_dir = match &config.paths.gems_dir {
            Some(path) => root.join(path),
            None => ancestor(&root, GEMS_DIR_DEPTH)?,
        };
        debug!(
            root = %root.display(),
            engine_root = %engine_root.display(),
            gems_dir = %gems_dir.display(),
            "resolved site context"
        );
        Ok(Self {
            root,
            engine_root,
            gems_dir,
            config,
        })
    }

    /// Resolve a configured path against the portal root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    pub fn page_path(&self) -> PathBuf {
        self.resolve(&self.config.paths.page)
    }

    /// Page file name as served (e.g. `index.html`).
    pub fn page_name(&self) -> String {
        self.config.paths.page.to_string_lossy().replace('\\', "/")
    }

    pub fn dist_page_path(&self) -> PathBuf {
        self.resolve(&self.config.paths.dist_page)
    }

    pub fn loader_config_path(&self) -> PathBuf {
        self.resolve(&self.config.paths.loader_config)
    }

    pub fn dist_loader_config_path(&self) -> PathBuf {
        self.resolve(&self.config.paths.dist_loader_config)
    }

    pub fn environment_file(&self) -> PathBuf {
        self.resolve(&self.config.paths.environment_file)
    }

    pub fn www_dir(&self) -> PathBuf {
        self.resolve(&self.config.paths.www_dir)
    }

    pub fn cloud_cli(&self) -> ProcessCli {
        ProcessCli {
            command: self.config.cli.command.clone(),
            engine_root: self.engine_root.clone(),
            timeout: Duration::from_secs(self.config.provision.command_timeout_secs),
            output_limit_bytes: CLI_OUTPUT_LIMIT_BYTES,
        }
    }

    pub fn dev_server(&self) -> NodeDevServer {
        NodeDevServer {
            command: self.config.server.command.clone(),
            portal_root: self.root.clone(),
            server_script: self.resolve(&self.config.paths.server_script),
            host: self.config.server.host.clone(),
            ready_timeout: SERVER_READY_TIMEOUT,
        }
    }

    pub fn automation(&self) -> ProtractorRunner {
        ProtractorRunner {
            command: self.config.automation.command.clone(),
            config: self.config.automation.config.clone(),
            portal_root: self.root.clone(),
            timeout: Duration::from_secs(self.config.automation.timeout_secs),
            output_limit_bytes: self.config.automation.output_limit_bytes,
        }
    }

    /// Scoped `node_modules` directory the gem packages are linked into.
    pub fn installed_packages_dir(&self) -> PathBuf {
        self.resolve(&self.config.paths.gem_packages)
    }

    pub fn package_linker(&self) -> NpmLinker {
        NpmLinker {
            command: self.config.build.link_command.clone(),
            timeout: self.step_timeout(),
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.config.build.step_timeout_secs)
    }

    /// Everything `portal clean` removes.
    pub fn clean_plan(&self) -> CleanPlan {
        CleanPlan {
            emptied_dirs: vec![self.root.join("bundles"), self.root.join("dist")],
            files: vec![self.dist_loader_config_path()],
            by_extension: vec![
                (self.installed_packages_dir(), vec!["js"]),
                (self.www_dir(), WWW_EXTENSIONS.to_vec()),
            ],
        }
    }

    /// Outputs cleared before a distribution build (www, dist and the dist loader config).
    pub fn dist_clean_plan(&self) -> CleanPlan {
        CleanPlan {
            emptied_dirs: vec![self.root.join("dist")],
            files: vec![self.dist_loader_config_path()],
            by_extension: vec![(self.www_dir(), WWW_EXTENSIONS.to_vec())],
        }
    }
}

fn ancestor(root: &Path, depth: usize) -> Result<PathBuf> {
    root.ancestors()
        .nth(depth)
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            anyhow!(
                "portal root {} is not {depth} levels deep; set paths.engine_root and paths.gems_dir in {CONFIG_FILE}",
                root.display()
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roots_are_derived_from_checkout_layout() {
        let root = PathBuf::from("/dev/Gems/CloudGemFramework/v1/Website/CloudGemPortal");
        let ctx = SiteContext::new(root, PortalConfig::default()).expect("context");
        assert_eq!(ctx.engine_root, PathBuf::from("/dev"));
        assert_eq!(ctx.gems_dir, PathBuf::from("/dev/Gems"));
        assert_eq!(
            ctx.environment_file(),
            PathBuf::from(
                "/dev/Gems/CloudGemFramework/v1/Website/CloudGemPortal/app/shared/class/environment.class.ts"
            )
        );
    }

    #[test]
    fn shallow_root_without_overrides_is_rejected() {
        let err = SiteContext::new(PathBuf::from("/portal"), PortalConfig::default()).unwrap_err();
        assert!(err.to_string().contains("paths.engine_root"));
    }

    #[test]
    fn configured_roots_are_resolved_against_portal_root() {
        let mut config = PortalConfig::default();
        config.paths.engine_root = Some(PathBuf::from("engine"));
        config.paths.gems_dir = Some(PathBuf::from("/abs/gems"));
        let ctx = SiteContext::new(PathBuf::from("/portal"), config).expect("context");
        assert_eq!(ctx.engine_root, PathBuf::from("/portal/engine"));
        assert_eq!(ctx.gems_dir, PathBuf::from("/abs/gems"));
        assert_eq!(ctx.page_name(), "index.html");
    }
}
