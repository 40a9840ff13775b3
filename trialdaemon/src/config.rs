//! TrialDaemon configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orchestrator::WORKERS_PER_GENERATION;

/// Main TrialDaemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener configuration
    pub server: ServerConfig,

    /// Control signal file configuration
    pub control: ControlConfig,

    /// Worker commands launched for each trial
    pub workers: WorkersConfig,

    /// Worker shutdown behaviour
    pub shutdown: ShutdownConfig,

    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.workers.commands.len() != WORKERS_PER_GENERATION {
            return Err(eyre::eyre!(
                "Expected exactly {} worker commands, found {}",
                WORKERS_PER_GENERATION,
                self.workers.commands.len()
            ));
        }
        if let Some(idx) = self.workers.commands.iter().position(|c| c.program.trim().is_empty()) {
            return Err(eyre::eyre!("Worker command {} has an empty program", idx));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .trialdaemon.yml
        let local_config = PathBuf::from(".trialdaemon.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/trialdaemon/trialdaemon.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("trialdaemon").join("trialdaemon.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are ignored here; the full load reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".trialdaemon.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("trialdaemon").join("trialdaemon.yml"));
                }
                paths
            }
        };

        candidates
            .into_iter()
            .find(|p| p.exists())
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// Port to bind
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context(format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

/// Control signal file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// File the workers poll for the terminate token
    pub path: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/trialdaemon on Linux)
        let path = dirs::data_local_dir()
            .map(|d| d.join("trialdaemon"))
            .unwrap_or_else(|| PathBuf::from(".trialdaemon"))
            .join("control.txt");

        Self { path }
    }
}

/// One worker command line; the trial is appended as the final argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    /// Executable to run
    pub program: String,

    /// Arguments placed before the trial identifier
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the process
    #[serde(rename = "working-dir", default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

/// Worker commands launched for each trial
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub commands: Vec<WorkerCommand>,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        let python = |script: &str| WorkerCommand {
            program: "python".to_string(),
            args: vec!["-u".to_string(), script.to_string()],
            working_dir: None,
        };

        Self {
            commands: vec![python("Get_GSR_Readings.py"), python("Get_HeartRate_Readings.py")],
        }
    }
}

/// Worker shutdown behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time a worker gets to honour an interrupt before SIGKILL (0 = never kill)
    #[serde(rename = "grace-period-ms")]
    pub grace_period_ms: u64,
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Option<Duration> {
        (self.grace_period_ms > 0).then(|| Duration::from_millis(self.grace_period_ms))
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { grace_period_ms: 5_000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.workers.commands.len(), WORKERS_PER_GENERATION);
        assert_eq!(config.shutdown.grace_period(), Some(Duration::from_secs(5)));
        assert!(config.control.path.ends_with("control.txt"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
server:
  host: 0.0.0.0
  port: 4000
control:
  path: /tmp/trialdaemon-test/control.txt
workers:
  commands:
    - program: python
      args: ["-u", "gsr.py"]
      working-dir: /opt/sensors
    - program: ./heart-rate
shutdown:
  grace-period-ms: 0
log-level: debug
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.socket_addr().unwrap().to_string(), "0.0.0.0:4000");
        assert_eq!(config.control.path, PathBuf::from("/tmp/trialdaemon-test/control.txt"));
        assert_eq!(config.workers.commands[0].working_dir, Some(PathBuf::from("/opt/sensors")));
        assert!(config.workers.commands[1].args.is_empty());
        assert_eq!(config.shutdown.grace_period(), None);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("server:\n  port: 8080\n").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.shutdown.grace_period_ms, 5_000);
    }

    #[test]
    fn test_validate_rejects_wrong_worker_count() {
        let mut config = Config::default();
        config.workers.commands.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_program() {
        let mut config = Config::default();
        config.workers.commands[1].program = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Worker command 1"));
    }

    #[test]
    fn test_load_from_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yml");
        fs::write(&path, "log-level: warn\nserver:\n  port: 3100\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 3100);
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("warn"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/trialdaemon.yml");
        assert!(Config::load(Some(&path)).is_err());
        assert_eq!(Config::load_log_level(Some(&path)), None);
    }
}
