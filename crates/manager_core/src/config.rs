use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::env::{
    first_set_with, override_bool_with, override_parsed_any_with, override_parsed_with,
    override_string_with,
};
use crate::worker::WorkerSpec;

pub const SERVICE_NAME: &str = "enginecare";
pub const CONFIG_ENV: &str = "ENGINECARE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "enginecare.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid listen address {0}")]
    ListenAddress(String),
}

/// Floor for `reaper_interval`; zero is raised to this.
pub const MIN_REAPER_INTERVAL: Duration = Duration::from_secs(1);

/// Everything the manager needs to run, resolved once at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    pub listen_bind: String,
    pub listen_port: u16,
    pub worker: WorkerSpec,
    /// Pull the worker image when it is missing locally.
    pub pull_missing_image: bool,
    pub idle_timeout: Duration,
    pub reaper_interval: Duration,
    pub health_interval: Duration,
    pub health_attempts: u32,
    pub probe_timeout: Duration,
    pub forward_timeout: Duration,
    pub stop_grace: Duration,
    /// Multipart part that carries the uploaded file.
    pub upload_field: String,
    pub max_body_bytes: usize,
    pub dataset_path: PathBuf,
    /// Exact-path rewrites applied before forwarding.
    pub aliases: BTreeMap<String, String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let mut aliases = BTreeMap::new();
        aliases.insert("/predict/jet-engine".to_string(), "/predict".to_string());
        Self {
            listen_bind: "0.0.0.0".to_string(),
            listen_port: 8000,
            worker: WorkerSpec::default(),
            pull_missing_image: true,
            idle_timeout: Duration::from_secs(300),
            reaper_interval: Duration::from_secs(10),
            health_interval: Duration::from_millis(1000),
            health_attempts: 30,
            probe_timeout: Duration::from_millis(2000),
            forward_timeout: Duration::from_secs(30),
            stop_grace: Duration::from_secs(10),
            upload_field: "file".to_string(),
            max_body_bytes: 64 * 1024 * 1024,
            dataset_path: PathBuf::from("../data/test_FD001.txt"),
            aliases,
        }
    }
}

/// On-disk shape of `enginecare.toml`. Durations are whole seconds or
/// milliseconds as the key name says; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    bind: Option<String>,
    port: Option<u16>,
    worker: Option<WorkerSpec>,
    pull_missing_image: Option<bool>,
    idle_timeout_secs: Option<u64>,
    reaper_interval_secs: Option<u64>,
    health_interval_ms: Option<u64>,
    health_attempts: Option<u32>,
    probe_timeout_ms: Option<u64>,
    forward_timeout_secs: Option<u64>,
    stop_grace_secs: Option<u64>,
    upload_field: Option<String>,
    max_body_bytes: Option<usize>,
    dataset: Option<PathBuf>,
    aliases: Option<BTreeMap<String, String>>,
}

impl ManagerConfig {
    /// Defaults, then the config file (if any), then process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None, &crate::env::process_env)
    }

    /// Like [`load`](Self::load) but with an explicit file and env source.
    pub fn load_with<F>(explicit_file: Option<&Path>, env_get: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(path) = resolve_config_path(explicit_file, env_get) {
            let file = read_file_config(&path)?;
            config.apply_file(file);
            tracing::info!("Loaded config from {}", path.display());
        }
        config.apply_env(env_get);
        Ok(config)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .listen_bind
            .parse()
            .map_err(|_| ConfigError::ListenAddress(self.listen_bind.clone()))?;
        Ok(SocketAddr::new(ip, self.listen_port))
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(bind) = file.bind {
            self.listen_bind = bind;
        }
        if let Some(port) = file.port {
            self.listen_port = port;
        }
        if let Some(worker) = file.worker {
            self.worker = worker;
        }
        if let Some(pull) = file.pull_missing_image {
            self.pull_missing_image = pull;
        }
        if let Some(secs) = file.idle_timeout_secs {
            self.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.reaper_interval_secs {
            self.reaper_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = file.health_interval_ms {
            self.health_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = file.health_attempts {
            self.health_attempts = attempts;
        }
        if let Some(ms) = file.probe_timeout_ms {
            self.probe_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = file.forward_timeout_secs {
            self.forward_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.stop_grace_secs {
            self.stop_grace = Duration::from_secs(secs);
        }
        if let Some(field) = file.upload_field {
            self.upload_field = field;
        }
        if let Some(max) = file.max_body_bytes {
            self.max_body_bytes = max;
        }
        if let Some(dataset) = file.dataset {
            self.dataset_path = dataset;
        }
        if let Some(aliases) = file.aliases {
            self.aliases = aliases;
        }
    }

    fn apply_env<F>(&mut self, env_get: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        override_string_with(&mut self.listen_bind, "ENGINECARE_BIND", env_get);
        override_parsed_any_with(&mut self.listen_port, &["PORT", "ENGINECARE_PORT"], env_get);

        let worker = &mut self.worker;
        override_string_with(&mut worker.image, "ENGINECARE_IMAGE", env_get);
        override_string_with(&mut worker.name, "ENGINECARE_CONTAINER", env_get);
        override_parsed_with(&mut worker.container_port, "ENGINECARE_WORKER_PORT", env_get);
        override_parsed_with(&mut worker.host_port, "ENGINECARE_HOST_PORT", env_get);
        override_string_with(&mut worker.bind_address, "ENGINECARE_WORKER_BIND", env_get);
        override_parsed_with(&mut worker.memory_limit_mb, "ENGINECARE_MEMORY_LIMIT_MB", env_get);

        override_bool_with(&mut self.pull_missing_image, "ENGINECARE_PULL_IMAGE", env_get);
        override_secs(&mut self.idle_timeout, "ENGINECARE_IDLE_TIMEOUT_SECS", env_get);
        override_secs(&mut self.reaper_interval, "ENGINECARE_REAPER_INTERVAL_SECS", env_get);
        override_millis(&mut self.health_interval, "ENGINECARE_HEALTH_INTERVAL_MS", env_get);
        override_parsed_with(&mut self.health_attempts, "ENGINECARE_HEALTH_ATTEMPTS", env_get);
        override_millis(&mut self.probe_timeout, "ENGINECARE_PROBE_TIMEOUT_MS", env_get);
        override_secs(&mut self.forward_timeout, "ENGINECARE_FORWARD_TIMEOUT_SECS", env_get);
        override_secs(&mut self.stop_grace, "ENGINECARE_STOP_GRACE_SECS", env_get);
        override_string_with(&mut self.upload_field, "ENGINECARE_UPLOAD_FIELD", env_get);
        override_parsed_with(&mut self.max_body_bytes, "ENGINECARE_MAX_BODY_BYTES", env_get);
        if let Some(path) = first_set_with(&["ENGINECARE_DATASET"], env_get) {
            self.dataset_path = PathBuf::from(path);
        }

        // A zero attempt bound would make every cold start an instant timeout.
        self.health_attempts = self.health_attempts.max(1);
        // tokio intervals reject a zero period.
        self.reaper_interval = self.reaper_interval.max(MIN_REAPER_INTERVAL);
    }
}

fn override_secs<F>(target: &mut Duration, var: &str, env_get: &F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut secs = target.as_secs();
    override_parsed_with(&mut secs, var, env_get);
    *target = Duration::from_secs(secs);
}

fn override_millis<F>(target: &mut Duration, var: &str, env_get: &F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut ms = target.as_millis() as u64;
    override_parsed_with(&mut ms, var, env_get);
    *target = Duration::from_millis(ms);
}

fn resolve_config_path<F>(explicit_file: Option<&Path>, env_get: &F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = explicit_file {
        return Some(path.to_path_buf());
    }
    if let Some(path) = first_set_with(&[CONFIG_ENV], env_get) {
        return Some(PathBuf::from(path));
    }
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    None
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
