//! Tool configuration stored in `portal.toml` next to the portal sources.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config file name, resolved against the portal root.
pub const CONFIG_FILE: &str = "portal.toml";

/// Portal tooling configuration (TOML).
///
/// Every table is optional; missing fields fall back to the layout of a stock
/// engine checkout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PortalConfig {
    pub paths: PathsConfig,
    pub cli: CliConfig,
    pub server: ServerConfig,
    pub automation: AutomationConfig,
    pub build: BuildConfig,
    pub provision: ProvisionConfig,
}

/// File locations, relative to the portal root unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub page: PathBuf,
    pub dist_page: PathBuf,
    pub loader_config: PathBuf,
    pub dist_loader_config: PathBuf,
    pub environment_file: PathBuf,
    pub server_script: PathBuf,
    pub www_dir: PathBuf,
    pub gem_packages: PathBuf,
    /// Engine root the cloud CLI runs from. Defaults to five levels above the portal.
    pub engine_root: Option<PathBuf>,
    /// Directory scanned for cloud gem folders. Defaults to four levels above the portal.
    pub gems_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            page: PathBuf::from("index.html"),
            dist_page: PathBuf::from("index-dist.html"),
            loader_config: PathBuf::from("config.js"),
            dist_loader_config: PathBuf::from("config-dist.js"),
            environment_file: PathBuf::from("app/shared/class/environment.class.ts"),
            server_script: PathBuf::from("server.js"),
            www_dir: PathBuf::from("../../AWS/www"),
            gem_packages: PathBuf::from("node_modules/@cloud-gems"),
            engine_root: None,
            gems_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CliConfig {
    /// Cloud CLI program and leading arguments (e.g. `["lmbr_aws"]`).
    pub command: Vec<String>,
    pub default_region: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            command: vec!["lmbr_aws".to_string()],
            default_region: "us-east-1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub command: Vec<String>,
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: vec!["node".to_string(), "server.js".to_string()],
            host: "localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutomationConfig {
    /// Browser automation launcher (e.g. `["npx","protractor"]`).
    pub command: Vec<String>,
    /// Automation config file passed as the first argument.
    pub config: PathBuf,
    pub timeout_secs: u64,
    /// Captured stdout/stderr beyond this many bytes is discarded.
    pub output_limit_bytes: usize,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            command: vec!["npx".to_string(), "protractor".to_string()],
            config: PathBuf::from("e2e/protractor.config.js"),
            timeout_secs: 60 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

/// External build steps, each a command vector run from the portal root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildConfig {
    /// Run before serving (stylesheets, TypeScript).
    pub prepare_steps: Vec<Vec<String>>,
    /// Run during the distribution build, after the loader config is written.
    pub dist_steps: Vec<Vec<String>>,
    /// Package link command, run in each gem directory and then, with the
    /// package name appended, in the portal root.
    pub link_command: Vec<String>,
    pub step_timeout_secs: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            prepare_steps: vec![
                command(&["npx", "sass", "--no-source-map", "--style=compressed", "app:app"]),
                command(&["npx", "tsc", "-p", "tsconfig.json"]),
            ],
            dist_steps: vec![
                command(&["npx", "tsc", "-p", "tsconfig.json"]),
                command(&["node", "bundle.js"]),
            ],
            link_command: command(&["npm", "link"]),
            step_timeout_secs: 30 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Delay between successive region stack creations, multiplied by region index.
    pub stagger_secs: u64,
    /// Upper bound on a single cloud CLI invocation.
    pub command_timeout_secs: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            stagger_secs: 30,
            command_timeout_secs: 2 * 60 * 60,
        }
    }
}

fn command(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

fn ensure_command(name: &str, command: &[String]) -> Result<()> {
    if command.is_empty() || command[0].trim().is_empty() {
        return Err(anyhow!("{name} must be a non-empty array"));
    }
    Ok(())
}

impl PortalConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_command("cli.command", &self.cli.command)?;
        ensure_command("server.command", &self.server.command)?;
        ensure_command("automation.command", &self.automation.command)?;
        ensure_command("build.link_command", &self.build.link_command)?;
        for (idx, step) in self.build.prepare_steps.iter().enumerate() {
            ensure_command(&format!("build.prepare_steps[{idx}]"), step)?;
        }
        for (idx, step) in self.build.dist_steps.iter().enumerate() {
            ensure_command(&format!("build.dist_steps[{idx}]"), step)?;
        }
        if self.cli.default_region.trim().is_empty() {
            return Err(anyhow!("cli.default_region must not be empty"));
        }
        if self.automation.timeout_secs == 0 {
            return Err(anyhow!("automation.timeout_secs must be > 0"));
        }
        if self.automation.output_limit_bytes == 0 {
            return Err(anyhow!("automation.output_limit_bytes must be > 0"));
        }
        if self.build.step_timeout_secs == 0 {
            return Err(anyhow!("build.step_timeout_secs must be > 0"));
        }
        if self.provision.command_timeout_secs == 0 {
            return Err(anyhow!("provision.command_timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PortalConfig::default()`.
pub fn load_config(path: &Path) -> Result<PortalConfig> {
    if !path.exists() {
        let cfg = PortalConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PortalConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PortalConfig::default());
    }

    #[test]
    fn partial_tables_keep_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "[cli]\ndefault_region = \"eu-west-1\"\n\n[provision]\nstagger_secs = 0\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.cli.default_region, "eu-west-1");
        assert_eq!(cfg.cli.command, vec!["lmbr_aws".to_string()]);
        assert_eq!(cfg.provision.stagger_secs, 0);
        assert_eq!(cfg.paths.page, PathBuf::from("index.html"));
        assert_eq!(cfg.build.link_command, vec!["npm".to_string(), "link".to_string()]);
    }

    #[test]
    fn empty_link_command_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "[build]\nlink_command = []\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("build.link_command must be a non-empty array"));
    }

    #[test]
    fn empty_command_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(&path, "[server]\ncommand = []\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("server.command must be a non-empty array"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cfg = PortalConfig {
            automation: AutomationConfig {
                timeout_secs: 0,
                ..AutomationConfig::default()
            },
            ..PortalConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
