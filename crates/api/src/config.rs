//! Application configuration.
//!
//! Loaded once from environment variables at startup and passed into each
//! component as an immutable struct — there is no global settings
//! singleton. All defaults are suitable for local development.

use std::path::PathBuf;
use std::time::Duration;

use atelier_core::quota::{self, QuotaLimits};

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
}

/// Daily quota settings shared by every account.
#[derive(Debug, Clone, Copy)]
pub struct QuotaConfig {
    pub limits: QuotaLimits,
    /// Fixed UTC offset (hours) defining the quota day boundary.
    pub utc_offset_hours: i32,
}

/// External vendor settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the video/image vendor API.
    pub api_base: String,
    /// Timeout for the synchronous video submit call.
    pub submit_timeout_secs: u64,
    /// Timeout for video status polls.
    pub poll_timeout_secs: u64,
    /// Timeout for image/edit generation calls. Generation is slow; this
    /// is a budget in minutes, not seconds.
    pub generate_timeout_secs: u64,
    /// Frame rate assumed by the token cost model.
    pub estimate_fps: u32,
}

impl ProviderConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_timeout_secs)
    }
}

/// Background dispatcher settings.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Number of worker tasks draining the queue.
    pub workers: usize,
    /// Queue capacity; submission backpressures when full.
    pub queue_depth: usize,
}

/// Filesystem locations for generated artifacts and temporary uploads.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub artifacts_dir: PathBuf,
    pub uploads_dir: PathBuf,
}

/// Everything the application needs, assembled once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: String,
    pub quota: QuotaConfig,
    pub provider: ProviderConfig,
    pub dispatcher: DispatcherConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                                  |
    /// |----------------------------|------------------------------------------|
    /// | `HOST`                     | `0.0.0.0`                                |
    /// | `PORT`                     | `3000`                                   |
    /// | `CORS_ORIGINS`             | `http://localhost:5173`                  |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                                     |
    /// | `DATABASE_URL`             | `sqlite://data/atelier.db`               |
    /// | `DAILY_VIDEO_TOKEN_LIMIT`  | `1800000`                                |
    /// | `DAILY_IMAGE_LIMIT`        | `500`                                    |
    /// | `QUOTA_UTC_OFFSET_HOURS`   | `8`                                      |
    /// | `PROVIDER_API_BASE`        | `https://ark.cn-beijing.volces.com/api/v3` |
    /// | `SUBMIT_TIMEOUT_SECS`      | `30`                                     |
    /// | `POLL_TIMEOUT_SECS`        | `10`                                     |
    /// | `GENERATE_TIMEOUT_SECS`    | `180`                                    |
    /// | `ESTIMATE_FPS`             | `24`                                     |
    /// | `DISPATCH_WORKERS`         | `4`                                      |
    /// | `DISPATCH_QUEUE_DEPTH`     | `64`                                     |
    /// | `ARTIFACTS_DIR`            | `data/artifacts`                         |
    /// | `UPLOADS_DIR`              | `data/uploads`                           |
    pub fn from_env() -> Self {
        let server = ServerConfig {
            host: env_or("HOST", "0.0.0.0"),
            port: parse_env("PORT", 3000),
            cors_origins: env_or("CORS_ORIGINS", "http://localhost:5173")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 30),
        };

        let quota = QuotaConfig {
            limits: QuotaLimits {
                daily_video_tokens: parse_env(
                    "DAILY_VIDEO_TOKEN_LIMIT",
                    quota::DEFAULT_DAILY_VIDEO_TOKENS,
                ),
                daily_images: parse_env("DAILY_IMAGE_LIMIT", quota::DEFAULT_DAILY_IMAGES),
            },
            utc_offset_hours: parse_env("QUOTA_UTC_OFFSET_HOURS", quota::DEFAULT_UTC_OFFSET_HOURS),
        };

        let provider = ProviderConfig {
            api_base: env_or("PROVIDER_API_BASE", "https://ark.cn-beijing.volces.com/api/v3"),
            submit_timeout_secs: parse_env("SUBMIT_TIMEOUT_SECS", 30),
            poll_timeout_secs: parse_env("POLL_TIMEOUT_SECS", 10),
            generate_timeout_secs: parse_env("GENERATE_TIMEOUT_SECS", 180),
            estimate_fps: parse_env("ESTIMATE_FPS", atelier_core::estimation::DEFAULT_FPS),
        };

        let dispatcher = DispatcherConfig {
            workers: parse_env("DISPATCH_WORKERS", 4),
            queue_depth: parse_env("DISPATCH_QUEUE_DEPTH", 64),
        };

        let storage = StorageConfig {
            artifacts_dir: PathBuf::from(env_or("ARTIFACTS_DIR", "data/artifacts")),
            uploads_dir: PathBuf::from(env_or("UPLOADS_DIR", "data/uploads")),
        };

        Self {
            server,
            database_url: env_or("DATABASE_URL", "sqlite://data/atelier.db"),
            quota,
            provider,
            dispatcher,
            storage,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}
