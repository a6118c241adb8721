//! Orchestrator configuration loaded from environment variables.
//!
//! Every timeout the orchestration layer uses is a named field here so
//! that no call site hardcodes its own budget.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default base URL of the generation service.
pub const DEFAULT_API_URL: &str = "http://localhost:8080";
/// Default environment key used to partition recovery records.
pub const DEFAULT_ENVIRONMENT: &str = "production";
/// Default location of the interrupted-download checkpoint file.
pub const DEFAULT_RECOVERY_PATH: &str = "data/interrupted_downloads.json";
/// Default root directory of the asset tree.
pub const DEFAULT_ASSET_ROOT: &str = "assets";
/// Default number of retries after the first download attempt.
pub const DEFAULT_RETRY_COUNT: u32 = 3;
/// Default number of pooled HTTP clients.
pub const DEFAULT_HTTP_POOL_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// Per-operation timeout budgets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Overall budget for submitting a generation batch.
    pub generate: Duration,
    /// Budget for creating an upload URL and pushing reference media.
    pub reference_upload_create_url: Duration,
    /// Budget for resolving the first job's download URL in a retryable
    /// attempt.
    pub motion_download_create_url_retry: Duration,
    /// Budget for every subsequent job in the same attempt.
    pub status_check_create_url_retry: Duration,
    /// Budget for interactive calls such as quoting.
    pub realtime: Duration,
    /// Effectively unbounded budget used by the final download attempt.
    pub no_timeout: Duration,
    /// Budget for transferring one finished artifact.
    pub artifact_download: Duration,
    /// How long to wait for cloud authentication to become ready.
    pub cloud_auth_wait: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            generate: Duration::from_secs(30),
            reference_upload_create_url: Duration::from_secs(30),
            motion_download_create_url_retry: Duration::from_secs(45),
            status_check_create_url_retry: Duration::from_secs(5),
            realtime: Duration::from_secs(5),
            no_timeout: Duration::from_secs(24 * 60 * 60),
            artifact_download: Duration::from_secs(120),
            cloud_auth_wait: Duration::from_secs(15),
        }
    }
}

// ---------------------------------------------------------------------------
// OrchestratorConfig
// ---------------------------------------------------------------------------

/// Configuration for the generation/download orchestrator.
///
/// All fields have defaults suitable for local development. Override via
/// environment variables (see [`OrchestratorConfig::from_env`]).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Base URL of the generation service.
    pub api_url: String,
    /// Bearer token for the generation service, if any.
    pub api_key: Option<String>,
    /// Environment key; recovery records are partitioned by it.
    pub environment: String,
    /// Path of the interrupted-download checkpoint file.
    pub recovery_path: PathBuf,
    /// Root directory the filesystem asset store resolves keys against.
    pub asset_root: PathBuf,
    pub timeouts: Timeouts,
    /// Retries after the first download attempt (`retry_count + 1`
    /// attempts in total).
    pub retry_count: u32,
    /// Surface internal failures that are normally kept quiet.
    pub developer_mode: bool,
    /// Treat every resolved download URL as a server failure. Developer
    /// builds only; exercises the hard-failure path end to end.
    pub simulate_server_failures: bool,
    /// Maximum number of concurrently leased HTTP clients.
    pub http_pool_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            api_key: None,
            environment: DEFAULT_ENVIRONMENT.into(),
            recovery_path: PathBuf::from(DEFAULT_RECOVERY_PATH),
            asset_root: PathBuf::from(DEFAULT_ASSET_ROOT),
            timeouts: Timeouts::default(),
            retry_count: DEFAULT_RETRY_COUNT,
            developer_mode: false,
            simulate_server_failures: false,
            http_pool_size: DEFAULT_HTTP_POOL_SIZE,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                                  | Default                            |
    /// |------------------------------------------|------------------------------------|
    /// | `ASSETGEN_API_URL`                       | `http://localhost:8080`            |
    /// | `ASSETGEN_API_KEY`                       | unset                              |
    /// | `ASSETGEN_ENVIRONMENT`                   | `production`                       |
    /// | `ASSETGEN_RECOVERY_PATH`                 | `data/interrupted_downloads.json`  |
    /// | `ASSETGEN_ASSET_ROOT`                    | `assets`                           |
    /// | `ASSETGEN_GENERATE_TIMEOUT_SECS`         | `30`                               |
    /// | `ASSETGEN_REFERENCE_UPLOAD_TIMEOUT_SECS` | `30`                               |
    /// | `ASSETGEN_DOWNLOAD_URL_TIMEOUT_SECS`     | `45`                               |
    /// | `ASSETGEN_STATUS_CHECK_TIMEOUT_SECS`     | `5`                                |
    /// | `ASSETGEN_REALTIME_TIMEOUT_SECS`         | `5`                                |
    /// | `ASSETGEN_NO_TIMEOUT_SECS`               | `86400`                            |
    /// | `ASSETGEN_ARTIFACT_TIMEOUT_SECS`         | `120`                              |
    /// | `ASSETGEN_CLOUD_AUTH_WAIT_SECS`          | `15`                               |
    /// | `ASSETGEN_RETRY_COUNT`                   | `3`                                |
    /// | `ASSETGEN_DEVELOPER_MODE`                | `false`                            |
    /// | `ASSETGEN_SIMULATE_SERVER_FAILURES`      | `false`                            |
    /// | `ASSETGEN_HTTP_POOL_SIZE`                | `4`                                |
    ///
    /// Unparseable values are logged and replaced by their default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let t = defaults.timeouts;

        let timeouts = Timeouts {
            generate: env_secs("ASSETGEN_GENERATE_TIMEOUT_SECS", t.generate),
            reference_upload_create_url: env_secs(
                "ASSETGEN_REFERENCE_UPLOAD_TIMEOUT_SECS",
                t.reference_upload_create_url,
            ),
            motion_download_create_url_retry: env_secs(
                "ASSETGEN_DOWNLOAD_URL_TIMEOUT_SECS",
                t.motion_download_create_url_retry,
            ),
            status_check_create_url_retry: env_secs(
                "ASSETGEN_STATUS_CHECK_TIMEOUT_SECS",
                t.status_check_create_url_retry,
            ),
            realtime: env_secs("ASSETGEN_REALTIME_TIMEOUT_SECS", t.realtime),
            no_timeout: env_secs("ASSETGEN_NO_TIMEOUT_SECS", t.no_timeout),
            artifact_download: env_secs("ASSETGEN_ARTIFACT_TIMEOUT_SECS", t.artifact_download),
            cloud_auth_wait: env_secs("ASSETGEN_CLOUD_AUTH_WAIT_SECS", t.cloud_auth_wait),
        };

        Self {
            api_url: std::env::var("ASSETGEN_API_URL").unwrap_or(defaults.api_url),
            api_key: std::env::var("ASSETGEN_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            environment: std::env::var("ASSETGEN_ENVIRONMENT").unwrap_or(defaults.environment),
            recovery_path: std::env::var("ASSETGEN_RECOVERY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.recovery_path),
            asset_root: std::env::var("ASSETGEN_ASSET_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.asset_root),
            timeouts,
            retry_count: env_parse("ASSETGEN_RETRY_COUNT", defaults.retry_count),
            developer_mode: env_flag("ASSETGEN_DEVELOPER_MODE", defaults.developer_mode),
            simulate_server_failures: env_flag(
                "ASSETGEN_SIMULATE_SERVER_FAILURES",
                defaults.simulate_server_failures,
            ),
            http_pool_size: env_parse("ASSETGEN_HTTP_POOL_SIZE", defaults.http_pool_size).max(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Env helpers
// ---------------------------------------------------------------------------

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, ?default, "Ignoring invalid config value");
            default
        }
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_parse(key, default.as_secs()))
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => flag_or(key, &raw, default),
        Err(_) => default,
    }
}

fn flag_or(key: &str, raw: &str, default: bool) -> bool {
    parse_flag(raw).unwrap_or_else(|| {
        tracing::warn!(key, value = %raw, default, "Ignoring invalid config flag");
        default
    })
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
