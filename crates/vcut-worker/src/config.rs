//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::planner::MergePolicy;

const PRODUCTION_REDIS_HOST: &str = "video-cut-tool";
const PRODUCTION_API_ROOT: &str = "https://videocuttool.wmflabs.org/video-cut-tool-back-end";
const DEFAULT_REDIS_HOST: &str = "127.0.0.1";
const DEFAULT_API_ROOT: &str = "http://localhost:4000";
const DEFAULT_REDIS_PORT: u16 = 6379;

/// Deployment profile selecting the service defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeEnvironment {
    Production,
    #[default]
    Default,
}

impl RuntimeEnvironment {
    /// `production` selects the production profile; anything else, or nothing,
    /// the default one.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Default => "default",
        }
    }
}

/// Connections to the queue service and the backend API.
#[derive(Clone, PartialEq)]
pub struct ServiceConfig {
    pub environment: RuntimeEnvironment,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: String,
    /// Backend API root, without trailing slash
    pub api_root: String,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("environment", &self.environment)
            .field("redis_host", &self.redis_host)
            .field("redis_port", &self.redis_port)
            .field("redis_password", &if self.redis_password.is_empty() { "" } else { "***" })
            .field("api_root", &self.api_root)
            .finish()
    }
}

impl ServiceConfig {
    /// Profile defaults, before overrides.
    pub fn for_environment(environment: RuntimeEnvironment) -> Self {
        let (redis_host, api_root) = match environment {
            RuntimeEnvironment::Production => (PRODUCTION_REDIS_HOST, PRODUCTION_API_ROOT),
            RuntimeEnvironment::Default => (DEFAULT_REDIS_HOST, DEFAULT_API_ROOT),
        };
        Self {
            environment,
            redis_host: redis_host.to_string(),
            redis_port: DEFAULT_REDIS_PORT,
            redis_password: String::new(),
            api_root: api_root.to_string(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the profile from `VCUT_ENV` (or `NODE_ENV`), then apply
    /// `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD` and `API_ROOT`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = lookup("VCUT_ENV").or_else(|| lookup("NODE_ENV"));
        let defaults = Self::for_environment(RuntimeEnvironment::parse(flag.as_deref()));

        Self {
            redis_host: lookup("REDIS_HOST").unwrap_or(defaults.redis_host),
            redis_port: lookup("REDIS_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.redis_port),
            redis_password: lookup("REDIS_PASSWORD").unwrap_or(defaults.redis_password),
            api_root: lookup("API_ROOT")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_root),
            environment: defaults.environment,
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Root directory for per-job artifact namespaces
    pub work_dir: PathBuf,
    /// How edit requests are grouped into passes
    pub merge_policy: MergePolicy,
    /// Timeout of the final upload request
    pub upload_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed (crash recovery)
    pub claim_min_idle: Duration,
    /// How often a running job refreshes its claim on the stream entry
    pub job_heartbeat_interval: Duration,
    /// Prometheus exporter address, disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            work_dir: PathBuf::from("/tmp/vcut"),
            merge_policy: MergePolicy::Fold,
            upload_timeout: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(30),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(1800), // 30 minutes
            job_heartbeat_interval: Duration::from_secs(30),
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Apply the `WORKER_*` overrides found through `lookup` to the defaults.
    /// Unparseable values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |key: &str| lookup(key).and_then(|s| s.parse().ok()).map(Duration::from_secs);

        Self {
            max_concurrent_jobs: lookup("WORKER_MAX_JOBS")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            work_dir: lookup("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            merge_policy: lookup("WORKER_MERGE_POLICY")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.merge_policy),
            upload_timeout: secs("WORKER_UPLOAD_TIMEOUT_SECS").unwrap_or(defaults.upload_timeout),
            shutdown_timeout: secs("WORKER_SHUTDOWN_TIMEOUT").unwrap_or(defaults.shutdown_timeout),
            claim_interval: secs("WORKER_CLAIM_INTERVAL_SECS").unwrap_or(defaults.claim_interval),
            claim_min_idle: secs("WORKER_CLAIM_MIN_IDLE_SECS").unwrap_or(defaults.claim_min_idle),
            job_heartbeat_interval: secs("WORKER_JOB_HEARTBEAT_SECS")
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.job_heartbeat_interval),
            metrics_addr: lookup("WORKER_METRICS_ADDR").and_then(|s| s.parse().ok()),
        }
    }

    /// Whether a running job refreshes its claim often enough to never look
    /// abandoned to other workers.
    pub fn heartbeat_outpaces_reclaim(&self) -> bool {
        self.job_heartbeat_interval < self.claim_min_idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_profile() {
        let config = ServiceConfig::from_lookup(lookup(&[]));
        assert_eq!(config.environment, RuntimeEnvironment::Default);
        assert_eq!(config.redis_host, "127.0.0.1");
        assert_eq!(config.redis_port, 6379);
        assert_eq!(config.api_root, "http://localhost:4000");
    }

    #[test]
    fn test_production_profile_from_node_env() {
        let config = ServiceConfig::from_lookup(lookup(&[("NODE_ENV", "production")]));
        assert_eq!(config.environment, RuntimeEnvironment::Production);
        assert_eq!(config.redis_host, "video-cut-tool");
        assert_eq!(
            config.api_root,
            "https://videocuttool.wmflabs.org/video-cut-tool-back-end"
        );
    }

    #[test]
    fn test_vcut_env_takes_precedence() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("VCUT_ENV", "staging"),
            ("NODE_ENV", "production"),
        ]));
        assert_eq!(config.environment, RuntimeEnvironment::Default);
    }

    #[test]
    fn test_overrides_apply_on_top_of_profile() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("VCUT_ENV", "production"),
            ("REDIS_PORT", "6380"),
            ("REDIS_PASSWORD", "secret"),
            ("API_ROOT", "http://backend:4000/"),
        ]));
        assert_eq!(config.redis_host, "video-cut-tool");
        assert_eq!(config.redis_port, 6380);
        assert_eq!(config.api_root, "http://backend:4000");
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_worker_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.merge_policy, MergePolicy::Fold);
        assert!(config.metrics_addr.is_none());
    }

    #[test]
    fn test_worker_overrides_from_lookup() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("WORKER_MAX_JOBS", "4"),
            ("WORKER_WORK_DIR", "/srv/vcut"),
            ("WORKER_MERGE_POLICY", "separate"),
            ("WORKER_CLAIM_MIN_IDLE_SECS", "120"),
            ("WORKER_JOB_HEARTBEAT_SECS", "15"),
            ("WORKER_METRICS_ADDR", "0.0.0.0:9100"),
        ]));
        assert_eq!(config.max_concurrent_jobs, 4);
        assert_eq!(config.work_dir, PathBuf::from("/srv/vcut"));
        assert_eq!(config.merge_policy, MergePolicy::Separate);
        assert_eq!(config.claim_min_idle, Duration::from_secs(120));
        assert_eq!(config.job_heartbeat_interval, Duration::from_secs(15));
        assert_eq!(config.metrics_addr, Some("0.0.0.0:9100".parse().unwrap()));
        assert!(config.heartbeat_outpaces_reclaim());
    }

    #[test]
    fn test_worker_invalid_values_keep_defaults() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("WORKER_MAX_JOBS", "0"),
            ("WORKER_MERGE_POLICY", "merge"),
            ("WORKER_UPLOAD_TIMEOUT_SECS", "soon"),
            ("WORKER_JOB_HEARTBEAT_SECS", "0"),
            ("WORKER_METRICS_ADDR", "localhost"),
        ]));
        let defaults = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, defaults.max_concurrent_jobs);
        assert_eq!(config.merge_policy, MergePolicy::Fold);
        assert_eq!(config.upload_timeout, defaults.upload_timeout);
        assert_eq!(config.job_heartbeat_interval, defaults.job_heartbeat_interval);
        assert!(config.metrics_addr.is_none());
    }

    #[test]
    fn test_heartbeat_slower_than_reclaim_is_detected() {
        let config = WorkerConfig {
            job_heartbeat_interval: Duration::from_secs(600),
            claim_min_idle: Duration::from_secs(300),
            ..Default::default()
        };
        assert!(!config.heartbeat_outpaces_reclaim());
    }
}
