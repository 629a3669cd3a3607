//! Config-driven start/stop front end for daemonized servers.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::ServerConfig;
use crate::daemon::{Daemon, Stopped};
use crate::error::{DaemonError, Result};
use crate::server::{Handler, HttpServer, Protocol};

/// Builds a server from a [`ServerConfig`] and controls it as a daemon.
pub struct Controller<P: Protocol, H: Handler> {
    config: ServerConfig,
    daemon: Daemon<HttpServer<P, H>>,
}

impl<P: Protocol, H: Handler> Controller<P, H> {
    pub fn new(config: ServerConfig, protocol: P, factory: impl FnOnce() -> H) -> Self {
        let server = HttpServer::new(config.host.clone(), config.port, protocol, factory);
        let daemon = Daemon::new(server, config.pidpath());
        Self { config, daemon }
    }

    /// Load the config file first; nothing is built if it is invalid.
    pub fn from_path(
        path: impl AsRef<Path>,
        protocol: P,
        factory: impl FnOnce() -> H,
    ) -> Result<Self> {
        let config = ServerConfig::load(path)?;
        Ok(Self::new(config, protocol, factory))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn pidfile(&self) -> &Path {
        self.daemon.pidfile()
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.config.log_path()
    }

    pub fn daemon(&self) -> &Daemon<HttpServer<P, H>> {
        &self.daemon
    }

    pub fn daemon_mut(&mut self) -> &mut Daemon<HttpServer<P, H>> {
        &mut self.daemon
    }

    pub fn running(&self) -> bool {
        self.daemon.running()
    }

    pub fn start(&mut self) -> Result<i32> {
        info!(
            pidfile = %self.daemon.pidfile().display(),
            "Starting server with pidfile {}",
            self.daemon.pidfile().display()
        );
        Ok(self.daemon.start()?)
    }

    /// Serve in this process instead of forking.
    pub fn serve(&mut self) -> Result<()> {
        Ok(self.daemon.run_foreground()?)
    }

    pub fn stop(&self) -> Result<Stopped> {
        Ok(self.daemon.stop()?)
    }

    pub fn restart(&mut self) -> Result<i32> {
        Ok(self.daemon.restart()?)
    }

    pub fn reload(&self) -> Result<()> {
        Err(DaemonError::NotImplemented("reload").into())
    }

    pub fn status(&self) -> Result<()> {
        Err(DaemonError::NotImplemented("status").into())
    }
}

impl<P: Protocol, H: Handler> fmt::Display for Controller<P, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Rpc Server Controller for {}:{}>",
            self.config.host, self.config.port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use crate::jsonrpc::JsonRpc;
    use crate::server::MethodTable;
    use tempfile::TempDir;

    fn controller(dir: &TempDir) -> Controller<JsonRpc, MethodTable> {
        let mut config = ServerConfig::new("127.0.0.1", 7890);
        config.pidfile = Some(dir.path().join("rpc.pid").display().to_string());
        Controller::new(config, JsonRpc, || MethodTable::new("Empty"))
    }

    #[test]
    fn test_display() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            controller(&dir).to_string(),
            "<Rpc Server Controller for 127.0.0.1:7890>"
        );
    }

    #[test]
    fn test_stop_when_not_running() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir);
        assert!(!ctl.running());
        assert_eq!(ctl.stop().unwrap(), Stopped::NotRunning);
    }

    #[test]
    fn test_reload_and_status_not_implemented() {
        let dir = TempDir::new().unwrap();
        let ctl = controller(&dir);
        assert!(matches!(
            ctl.reload(),
            Err(RpcError::Daemon(DaemonError::NotImplemented("reload")))
        ));
        assert!(matches!(
            ctl.status(),
            Err(RpcError::Daemon(DaemonError::NotImplemented("status")))
        ));
    }

    #[test]
    fn test_from_path_rejects_bad_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server]\nport = \"nope\"\n").unwrap();
        let built = std::cell::Cell::new(false);
        let result = Controller::from_path(&path, JsonRpc, || {
            built.set(true);
            MethodTable::new("Empty")
        });
        assert!(matches!(result, Err(RpcError::Config(_))));
        assert!(!built.get());
    }

    #[test]
    fn test_from_path_uses_default_pidfile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.toml");
        ServerConfig::new("localhost", 4567).generate(&path).unwrap();
        let ctl = Controller::from_path(&path, JsonRpc, || MethodTable::new("Empty")).unwrap();
        assert_eq!(ctl.pidfile(), Path::new("/tmp/rpc/localhost:4567.pid"));
    }
}
