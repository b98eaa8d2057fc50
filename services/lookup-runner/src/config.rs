//! Configuration types and loading
//!
//! Precedence: environment overlays > config file > defaults. The config
//! file path itself comes from `--config`, then `CONFIG_PATH`, then the
//! default file name.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use result_sink::OutputFormat;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub inputs: InputsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub proxy_check: ProxyCheckConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Input locations. Required, but may come from the environment alone.
#[derive(Debug, Default, Deserialize)]
pub struct InputsConfig {
    #[serde(default)]
    pub sessions_dir: PathBuf,
    #[serde(default)]
    pub proxy_file: PathBuf,
    #[serde(default)]
    pub users_file: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
    /// Result sink channel capacity
    #[serde(default = "default_buffer")]
    pub buffer: usize,
}

#[derive(Debug, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_count")]
    pub count: usize,
    #[serde(default = "default_lease_backoff")]
    pub lease_backoff_secs: u64,
    #[serde(default = "default_task_interval")]
    pub task_interval_ms: u64,
    /// Task queue capacity. Defaults to the number of tasks.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ProxyCheckConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_probe_target")]
    pub target: String,
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_probe_concurrency")]
    pub concurrency: usize,
}

/// Lookup service the session client talks to
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    pub endpoint: String,
    #[serde(default = "default_session_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,
    /// Serve `/health` and `/metrics` on this address when set
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,
}

fn default_buffer() -> usize {
    64
}

fn default_worker_count() -> usize {
    5
}

fn default_lease_backoff() -> u64 {
    5
}

fn default_task_interval() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

fn default_probe_target() -> String {
    "api.telegram.org:443".into()
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_probe_concurrency() -> usize {
    10
}

fn default_session_timeout() -> u64 {
    30
}

fn default_health_interval() -> u64 {
    60
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            format: OutputFormat::default(),
            buffer: default_buffer(),
        }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            lease_backoff_secs: default_lease_backoff(),
            task_interval_ms: default_task_interval(),
            queue_capacity: None,
        }
    }
}

impl Default for ProxyCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target: default_probe_target(),
            timeout_secs: default_probe_timeout(),
            concurrency: default_probe_concurrency(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            health_interval_secs: default_health_interval(),
            metrics_addr: None,
        }
    }
}

impl WorkersConfig {
    pub fn lease_backoff(&self) -> Duration {
        Duration::from_secs(self.lease_backoff_secs)
    }

    pub fn task_interval(&self) -> Duration {
        Duration::from_millis(self.task_interval_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file, overlay environment variables,
    /// then validate.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `SESSIONS_DIR`, `PROXY_FILE`, `USERS_FILE`, `RESULT_FILE` and
    /// `NUM_WORKERS` when set and non-empty.
    fn apply_env(&mut self) -> common::Result<()> {
        if let Some(v) = env_var("SESSIONS_DIR") {
            self.inputs.sessions_dir = PathBuf::from(v);
        }
        if let Some(v) = env_var("PROXY_FILE") {
            self.inputs.proxy_file = PathBuf::from(v);
        }
        if let Some(v) = env_var("USERS_FILE") {
            self.inputs.users_file = PathBuf::from(v);
        }
        if let Some(v) = env_var("RESULT_FILE") {
            self.output.path = PathBuf::from(v);
        }
        if let Some(v) = env_var("NUM_WORKERS") {
            self.workers.count = v.trim().parse().map_err(|e| {
                common::Error::Config(format!("NUM_WORKERS must be a positive integer ({v:?}): {e}"))
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        for (key, env, path) in [
            ("inputs.sessions_dir", "SESSIONS_DIR", &self.inputs.sessions_dir),
            ("inputs.proxy_file", "PROXY_FILE", &self.inputs.proxy_file),
            ("inputs.users_file", "USERS_FILE", &self.inputs.users_file),
            ("output.path", "RESULT_FILE", &self.output.path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(common::Error::Config(format!(
                    "{key} must be set (or {env} in the environment)"
                )));
            }
        }

        if !self.session.endpoint.starts_with("http://")
            && !self.session.endpoint.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "session.endpoint must start with http:// or https://, got: {}",
                self.session.endpoint
            )));
        }

        for (key, value) in [
            ("workers.count", self.workers.count as u64),
            ("workers.lease_backoff_secs", self.workers.lease_backoff_secs),
            ("session.timeout_secs", self.session.timeout_secs),
            ("proxy_check.timeout_secs", self.proxy_check.timeout_secs),
            ("proxy_check.concurrency", self.proxy_check.concurrency as u64),
            (
                "observability.health_interval_secs",
                self.observability.health_interval_secs,
            ),
            ("output.buffer", self.output.buffer as u64),
        ] {
            if value == 0 {
                return Err(common::Error::Config(format!(
                    "{key} must be greater than 0"
                )));
            }
        }

        if self.workers.queue_capacity == Some(0) {
            return Err(common::Error::Config(
                "workers.queue_capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("lookup-runner.toml")
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
