//! Server configuration files.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 4567
//! pidfile = "~/.rpc/4567.pid"   # optional
//! log_file = "~/.rpc/4567.log"  # optional
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::daemon::expand_path;
use crate::error::{Result, RpcError};

/// Top-level layout of a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub server: ServerConfig,
}

/// Everything the controller needs to build and supervise a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pidfile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            pidfile: None,
            log_file: None,
        }
    }

    /// Load the `[server]` section of a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = expand_path(path.as_ref());
        tracing::debug!(path = %path.display(), "Loading server config");

        let content = fs::read_to_string(&path).map_err(|e| {
            RpcError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| RpcError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> std::result::Result<Self, String> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| e.to_string())?;
        file.server.validate()?;
        Ok(file.server)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("server.host must not be empty".into());
        }
        Ok(())
    }

    /// Pidfile path, defaulting to `/tmp/rpc/<host>:<port>.pid`.
    pub fn pidpath(&self) -> PathBuf {
        match &self.pidfile {
            Some(path) => expand_path(Path::new(path)),
            None => PathBuf::from(format!("/tmp/rpc/{}:{}.pid", self.host, self.port)),
        }
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file.as_deref().map(|p| expand_path(Path::new(p)))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&ConfigFile {
            server: self.clone(),
        })
        .map_err(|e| RpcError::Config(e.to_string()))
    }

    /// Write a boilerplate configuration file.
    pub fn generate(&self, target: impl AsRef<Path>) -> Result<()> {
        let target = expand_path(target.as_ref());
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, self.to_toml()?)?;
        tracing::info!(path = %target.display(), "Wrote server config");
        Ok(())
    }
}

/// Write a boilerplate configuration file for `config` at `target`.
pub fn generate_config(target: impl AsRef<Path>, config: &ServerConfig) -> Result<()> {
    config.generate(target)
}
