//! Local development web server.

use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::page::server_listen_port;
use crate::io::files::read_required;
use crate::io::process::{command_in, display_command};

/// A started dev server. Dropping the handle stops the child process.
#[derive(Debug)]
pub struct ServerHandle {
    base_url: String,
    child: Option<Child>,
}

impl ServerHandle {
    /// Handle for a server this process does not own.
    pub fn detached(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            child: None,
        }
    }

    /// Root URL, always ending in `/`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a page served from the portal root.
    pub fn page_url(&self, page: &str) -> String {
        format!("{}{}", self.base_url, page.trim_start_matches('/'))
    }

    /// Block until the server exits.
    pub fn wait(mut self) -> Result<Option<ExitStatus>> {
        match self.child.take() {
            Some(mut child) => Ok(Some(child.wait().context("wait for dev server")?)),
            None => Ok(None),
        }
    }

    pub fn stop(mut self) -> Result<()> {
        self.stop_in_place()
    }

    fn stop_in_place(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if child.try_wait().context("poll dev server")?.is_none() {
            info!(pid = child.id(), "stopping dev server");
            child.kill().context("kill dev server")?;
        }
        child.wait().context("reap dev server")?;
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(err) = self.stop_in_place() {
            warn!(err = %format!("{err:#}"), "failed to stop dev server");
        }
    }
}

/// Something that can serve the portal locally.
pub trait DevServer {
    fn start(&self) -> Result<ServerHandle>;
}

/// Runs the portal's node server script from the portal root.
#[derive(Debug, Clone)]
pub struct NodeDevServer {
    pub command: Vec<String>,
    pub portal_root: PathBuf,
    pub server_script: PathBuf,
    pub host: String,
    pub ready_timeout: Duration,
}

impl NodeDevServer {
    /// Port the server script listens on.
    pub fn port(&self) -> Result<u16> {
        let script = read_required(&self.server_script)?;
        server_listen_port(&script)
            .with_context(|| format!("discover port in {}", self.server_script.display()))
    }
}

impl DevServer for NodeDevServer {
    #[instrument(skip_all, fields(host = %self.host))]
    fn start(&self) -> Result<ServerHandle> {
        let port = self.port()?;
        let base_url = format!("http://{}:{port}/", self.host);
        let mut cmd = command_in(&self.command, &self.portal_root)?;
        debug!(command = %display_command(&cmd), "starting dev server");
        let child = cmd
            .spawn()
            .with_context(|| format!("spawn {}", display_command(&cmd)))?;
        let mut handle = ServerHandle {
            base_url,
            child: Some(child),
        };

        wait_until_listening(&mut handle, &self.host, port, self.ready_timeout)?;
        info!(url = %handle.base_url, "Launch your browser and enter the url");
        Ok(handle)
    }
}

fn wait_until_listening(
    handle: &mut ServerHandle,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<()> {
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("resolve {host}:{port}"))?
        .collect();
    let deadline = Instant::now() + timeout;
    loop {
        if addrs
            .iter()
            .any(|addr| TcpStream::connect_timeout(addr, Duration::from_millis(250)).is_ok())
        {
            return Ok(());
        }
        if let Some(child) = handle.child.as_mut()
            && let Some(status) = child.try_wait().context("poll dev server")?
        {
            handle.child = None;
            return Err(anyhow!("dev server exited early with status {status}"));
        }
        if Instant::now() >= deadline {
            return Err(anyhow!(
                "dev server not listening on {host}:{port} after {}s",
                timeout.as_secs()
            ));
        }
        thread::sleep(Duration::from_millis(250));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_urls_are_joined_under_base() {
        let handle = ServerHandle::detached("http://localhost:3000/");
        assert_eq!(handle.page_url("index.html"), "http://localhost:3000/index.html");
        assert_eq!(
            handle.page_url("/us-east-1_index.html"),
            "http://localhost:3000/us-east-1_index.html"
        );
    }

    #[test]
    fn port_comes_from_server_script() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("server.js");
        std::fs::write(&script, "const server = http.createServer(app);\nserver.listen(3000)\n")
            .expect("write");
        let server = NodeDevServer {
            command: vec!["node".to_string(), "server.js".to_string()],
            portal_root: temp.path().to_path_buf(),
            server_script: script,
            host: "localhost".to_string(),
            ready_timeout: Duration::from_secs(1),
        };
        assert_eq!(server.port().expect("port"), 3000);
    }

    #[test]
    fn detached_handle_wait_returns_immediately() {
        let handle = ServerHandle::detached("http://localhost:3000/");
        assert!(handle.wait().expect("wait").is_none());
    }
}
