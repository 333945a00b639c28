//! Test-only fixtures: a throwaway portal checkout and scripted collaborators.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::context::SiteContext;
use crate::io::automation::{AutomationReport, AutomationRequest, BrowserAutomation};
use crate::io::cloud_cli::{CliOutput, CloudCli};
use crate::io::config::PortalConfig;
use crate::io::link::PackageLinker;
use crate::io::server::{DevServer, ServerHandle};

/// Development page with an empty bootstrap and every distribution marker.
pub const DEV_PAGE: &str = r#"<html>
<head>
<script id="bootstrap">var bootstrap = {}</script>
<script>
var domain = 'localhost'
var port = ':3000'
var schema = 'http://'
var features = {"firstTimeUse": true}
</script>
<script src="config.js"></script>
<script id="socket.io_load">
  System.import('app');
</script>
</head>
<body><cgp-app>Loading...</cgp-app></body>
</html>
"#;

/// Development loader config with bare keys.
pub const DEV_CONFIG: &str = r#"System.config({
  defaultJSExtensions: false,
  transpiler: false,
  map: {
    app: "app",
    "@angular/core": "npm:@angular/core/bundles/core.umd.js"
  },
  packages: {
    rxjs: { defaultExtension: 'js' }
  }
});
"#;

pub const SERVER_SCRIPT: &str = "const server = require('http').createServer(app);\nserver.listen(3000)\n";

pub const ENVIRONMENT_FILE: &str = "export const isProd: boolean = false\n\
export const isTest: boolean = false\n";

/// CLI output carrying a complete bootstrap object.
pub const BOOTSTRAP_OUTPUT: &str = "Reading deployment...\n{\"identityPoolId\": \"us-east-1:pool\", \"projectConfigBucketId\": \"cfg-bucket\", \"userPoolId\": \"us-east-1_abc\", \"region\": \"us-east-1\", \"clientId\": \"client123\"}\n";

/// A portal checkout in a temp directory, with engine and gems directories beside it.
pub struct TestSite {
    _temp: TempDir,
    pub ctx: SiteContext,
}

impl TestSite {
    pub fn new() -> Result<Self> {
        Self::with_config(PortalConfig::default())
    }

    /// Lay out the checkout and resolve a context with `config`, overriding only
    /// the engine/gems/www locations so everything stays in the temp directory.
    pub fn with_config(mut config: PortalConfig) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let base = fs::canonicalize(temp.path())?;
        let root = base.join("portal");
        fs::create_dir_all(&root)?;
        fs::create_dir_all(base.join("engine"))?;
        fs::create_dir_all(base.join("gems"))?;

        config.paths.engine_root = Some(base.join("engine"));
        config.paths.gems_dir = Some(base.join("gems"));
        config.paths.www_dir = base.join("www");
        let ctx = SiteContext::new(root, config)?;

        let site = Self { _temp: temp, ctx };
        site.write("index.html", DEV_PAGE)?;
        site.write("config.js", DEV_CONFIG)?;
        site.write("server.js", SERVER_SCRIPT)?;
        site.write("app/shared/class/environment.class.ts", ENVIRONMENT_FILE)?;
        Ok(site)
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.ctx.root.join(relative)
    }

    pub fn write(&self, relative: &str, contents: &str) -> Result<()> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    /// Read a file under the portal root. Panics when missing.
    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative))
            .unwrap_or_else(|err| panic!("read {relative}: {err}"))
    }
}

/// Cloud CLI returning canned output chosen by argv prefix.
#[derive(Default)]
pub struct ScriptedCli {
    responses: Vec<(String, CliOutput)>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer calls whose space-joined argv starts with `prefix` with `stdout`.
    pub fn respond(self, prefix: &str, stdout: &str) -> Self {
        self.respond_with(prefix, stdout, "", Some(0))
    }

    pub fn respond_with(
        mut self,
        prefix: &str,
        stdout: &str,
        stderr: &str,
        exit_code: Option<i32>,
    ) -> Self {
        self.responses.push((
            prefix.to_string(),
            CliOutput {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_code,
            },
        ));
        self
    }

    /// Every argv received, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

impl CloudCli for ScriptedCli {
    fn invoke(&self, args: &[String]) -> Result<CliOutput> {
        self.calls
            .lock()
            .map_err(|_| anyhow!("scripted cli lock poisoned"))?
            .push(args.to_vec());
        let joined = args.join(" ");
        Ok(self
            .responses
            .iter()
            .find(|(prefix, _)| joined.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }
}

/// Dev server that only counts starts.
#[derive(Default)]
pub struct RecordingServer {
    starts: Mutex<usize>,
}

impl RecordingServer {
    pub fn starts(&self) -> usize {
        self.starts.lock().map(|n| *n).unwrap_or_default()
    }
}

impl DevServer for RecordingServer {
    fn start(&self) -> Result<ServerHandle> {
        *self
            .starts
            .lock()
            .map_err(|_| anyhow!("recording server lock poisoned"))? += 1;
        Ok(ServerHandle::detached("http://localhost:3000/"))
    }
}

/// One call made to a [`RecordingLinker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    /// Global link run in this directory.
    Global(PathBuf),
    /// Package linked into this directory.
    Into(PathBuf, String),
}

/// Linker that records calls instead of running the package manager.
#[derive(Default)]
pub struct RecordingLinker {
    calls: Mutex<Vec<LinkCall>>,
    failing_dir: Option<PathBuf>,
}

impl RecordingLinker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a failed global link for the package in `dir`.
    pub fn failing_in(dir: &Path) -> Self {
        Self {
            failing_dir: Some(dir.to_path_buf()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<LinkCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn record(&self, call: LinkCall) -> Result<()> {
        self.calls
            .lock()
            .map_err(|_| anyhow!("recording linker lock poisoned"))?
            .push(call);
        Ok(())
    }
}

impl PackageLinker for RecordingLinker {
    fn link_global(&self, dir: &Path) -> Result<bool> {
        self.record(LinkCall::Global(dir.to_path_buf()))?;
        Ok(self.failing_dir.as_deref() != Some(dir))
    }

    fn link_into(&self, dir: &Path, package: &str) -> Result<bool> {
        self.record(LinkCall::Into(dir.to_path_buf(), package.to_string()))?;
        Ok(true)
    }
}

/// Scripted result for one automation run.
#[derive(Debug, Clone)]
pub enum ScriptedRun {
    Pass,
    Fail,
    /// The automation could not be run at all.
    Error(String),
}

/// Automation that replays scripted results and records what it saw.
#[derive(Default)]
pub struct ScriptedAutomation {
    runs: Mutex<VecDeque<ScriptedRun>>,
    observe: Option<PathBuf>,
    seen: Mutex<Vec<(AutomationRequest, Option<String>)>>,
    before_run: Option<Box<dyn Fn() + Send + Sync>>,
}

impl ScriptedAutomation {
    pub fn new(runs: impl IntoIterator<Item = ScriptedRun>) -> Self {
        Self {
            runs: Mutex::new(runs.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Record the content of `path` at the moment each run starts.
    pub fn observing(mut self, path: &Path) -> Self {
        self.observe = Some(path.to_path_buf());
        self
    }

    /// Call `hook` at the start of every run, after the observed file is read.
    pub fn before_run(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.before_run = Some(Box::new(hook));
        self
    }

    /// Requests received, each with the observed file content (if observing).
    pub fn seen(&self) -> Vec<(AutomationRequest, Option<String>)> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

impl BrowserAutomation for ScriptedAutomation {
    fn run(&self, request: &AutomationRequest) -> Result<AutomationReport> {
        let observed = self
            .observe
            .as_ref()
            .map(|path| fs::read_to_string(path).unwrap_or_default());
        self.seen
            .lock()
            .map_err(|_| anyhow!("scripted automation lock poisoned"))?
            .push((request.clone(), observed));
        if let Some(hook) = &self.before_run {
            hook();
        }
        let next = self
            .runs
            .lock()
            .map_err(|_| anyhow!("scripted automation lock poisoned"))?
            .pop_front()
            .unwrap_or(ScriptedRun::Pass);
        match next {
            ScriptedRun::Pass => Ok(AutomationReport {
                passed: true,
                exit_code: Some(0),
                output: String::new(),
            }),
            ScriptedRun::Fail => Ok(AutomationReport {
                passed: false,
                exit_code: Some(1),
                output: "1 spec, 1 failure".to_string(),
            }),
            ScriptedRun::Error(message) => Err(anyhow!(message)),
        }
    }
}

/// Shared buffer the fmt layer writes into.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        self.0
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("log buffer lock poisoned"))?
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a plain-text subscriber installed for this thread; returns its
/// result and everything logged meanwhile.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, buffer.contents())
}
