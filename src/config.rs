use crate::constants;
use crate::errors::ConfigError;
use std::collections::HashSet;

type Result<T> = std::result::Result<T, ConfigError>;

/// HTTP server port configuration.
///
/// Wraps a u16 port number for the HTTP server. Provides type safety
/// and validation for port values.
#[derive(Clone)]
pub struct HttpPort(u16);

impl TryFrom<String> for HttpPort {
    type Error = ConfigError;
    fn try_from(value: String) -> Result<Self> {
        if value.is_empty() {
            Ok(Self(8080))
        } else {
            value
                .parse::<u16>()
                .map(Self)
                .map_err(|_| ConfigError::InvalidPortNumber {
                    port: value.clone(),
                })
        }
    }
}

impl AsRef<u16> for HttpPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

/// HTTP client timeout configuration.
///
/// Specifies the default timeout duration for HTTP client requests made by
/// the service, such as gateway sends and identity lookups.
#[derive(Clone)]
pub struct HttpClientTimeout(std::time::Duration);

impl TryFrom<String> for HttpClientTimeout {
    type Error = ConfigError;
    fn try_from(value: String) -> Result<Self> {
        let seconds = value
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue {
                details: format!("Invalid timeout seconds: {}", value),
            })?;
        if seconds == 0 {
            return Err(ConfigError::InvalidValue {
                details: "Timeout must be greater than 0 seconds".to_string(),
            });
        }
        Ok(Self(std::time::Duration::from_secs(seconds)))
    }
}

impl AsRef<std::time::Duration> for HttpClientTimeout {
    fn as_ref(&self) -> &std::time::Duration {
        &self.0
    }
}

/// Rate limit scope configuration: a maximum count per fixed window.
#[derive(Clone, Debug)]
pub struct RateLimit {
    pub limit: i64,
    pub window_seconds: u64,
}

/// Eligibility window configuration for the fence and wilt conditions.
///
/// All values are seconds. Defaults match the production windows; overriding
/// them is primarily useful in staging where waiting twelve hours for a
/// plant to wilt is impractical.
#[derive(Clone, Debug)]
pub struct WindowConfig {
    pub wilt_threshold_seconds: i64,
    pub wilt_marker_ttl_seconds: u64,
    pub fence_warn_window_seconds: i64,
    pub fence_grace_seconds: i64,
    pub fence_expired_marker_ttl_seconds: u64,
    pub fence_pending_ttl_seconds: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            wilt_threshold_seconds: constants::WILT_THRESHOLD_SECONDS,
            wilt_marker_ttl_seconds: constants::WILT_MARKER_TTL_SECONDS,
            fence_warn_window_seconds: constants::FENCE_WARN_WINDOW_SECONDS,
            fence_grace_seconds: constants::FENCE_GRACE_SECONDS,
            fence_expired_marker_ttl_seconds: constants::FENCE_EXPIRED_MARKER_TTL_SECONDS,
            fence_pending_ttl_seconds: constants::FENCE_PENDING_TTL_SECONDS,
        }
    }
}

/// Service configuration loaded from environment variables.
///
/// Missing optional integrations degrade rather than abort startup: without
/// `REDIS_URL` the service runs on the no-op store (nothing throttles or
/// persists), without `GATEWAY_API_KEY` recipient discovery yields an empty
/// list, and without `ADMIN_API_KEY` every admin route answers 503.
#[derive(Clone)]
pub struct Config {
    pub version: String,
    pub http_port: HttpPort,
    pub external_base: String,
    pub user_agent: String,
    pub http_client_timeout: HttpClientTimeout,
    pub redis_url: Option<String>,
    pub gateway_base_url: String,
    pub gateway_api_key: Option<String>,
    pub identity_base_url: String,
    pub plant_indexer_url: Option<String>,
    pub admin_api_key: Option<String>,
    pub admin_allowed_origins: HashSet<String>,
    pub notification_secret: Option<String>,
    pub batch_concurrency: usize,
    pub send_chunk_size: usize,
    pub fidmap_cache_size: usize,
    pub windows: WindowConfig,
    pub rate_limit_global: RateLimit,
    pub rate_limit_fid: RateLimit,
}

impl Config {
    /// Creates a new configuration instance by loading values from
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a set environment variable has an invalid
    /// value. Absent optional variables never fail; see the struct docs for
    /// the degraded modes they select.
    pub fn new() -> Result<Self> {
        let http_port: HttpPort = default_env("HTTP_PORT", "8080").try_into()?;
        let external_base = default_env("EXTERNAL_BASE", "http://localhost:8080");
        let default_user_agent = format!("plantpush/{}", version()?);
        let user_agent = default_env("USER_AGENT", &default_user_agent);
        let http_client_timeout: HttpClientTimeout =
            default_env("HTTP_CLIENT_TIMEOUT", "8").try_into()?;

        let redis_url = std::env::var("REDIS_URL").ok();

        let gateway_base_url = default_env("GATEWAY_BASE_URL", "https://api.neynar.com/v2");
        let gateway_api_key = std::env::var("GATEWAY_API_KEY").ok();
        let identity_base_url =
            default_env("IDENTITY_BASE_URL", "https://fnames.farcaster.xyz");
        let plant_indexer_url = std::env::var("PLANT_INDEXER_URL").ok();

        let admin_api_key = std::env::var("ADMIN_API_KEY").ok();
        let admin_allowed_origins: HashSet<String> = optional_env("ADMIN_ALLOWED_ORIGINS")
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        let notification_secret = std::env::var("NOTIFICATION_SECRET").ok();

        let batch_concurrency = parse_env(
            "BATCH_CONCURRENCY",
            crate::constants::BATCH_CONCURRENCY,
            |v| v >= 1,
        )?;
        let send_chunk_size =
            parse_env("SEND_CHUNK_SIZE", crate::constants::SEND_CHUNK_SIZE, |v| {
                v >= 1
            })?;
        let fidmap_cache_size = parse_env("FIDMAP_CACHE_SIZE", 1000usize, |v| v >= 1)?;

        let windows = WindowConfig {
            wilt_threshold_seconds: parse_env(
                "WILT_THRESHOLD_SECONDS",
                constants::WILT_THRESHOLD_SECONDS,
                |v| v > 0,
            )?,
            wilt_marker_ttl_seconds: parse_env(
                "WILT_MARKER_TTL_SECONDS",
                constants::WILT_MARKER_TTL_SECONDS,
                |v| v > 0,
            )?,
            fence_warn_window_seconds: parse_env(
                "FENCE_WARN_WINDOW_SECONDS",
                constants::FENCE_WARN_WINDOW_SECONDS,
                |v| v > 0,
            )?,
            fence_grace_seconds: parse_env(
                "FENCE_GRACE_SECONDS",
                constants::FENCE_GRACE_SECONDS,
                |v| v > 0,
            )?,
            fence_expired_marker_ttl_seconds: parse_env(
                "FENCE_EXPIRED_MARKER_TTL_SECONDS",
                constants::FENCE_EXPIRED_MARKER_TTL_SECONDS,
                |v| v > 0,
            )?,
            fence_pending_ttl_seconds: parse_env(
                "FENCE_PENDING_TTL_SECONDS",
                constants::FENCE_PENDING_TTL_SECONDS,
                |v| v > 0,
            )?,
        };

        let rate_limit_global = RateLimit {
            limit: parse_env("RATE_LIMIT_GLOBAL", 60i64, |v| v > 0)?,
            window_seconds: parse_env("RATE_LIMIT_GLOBAL_WINDOW_SECONDS", 3600u64, |v| v > 0)?,
        };
        let rate_limit_fid = RateLimit {
            limit: parse_env("RATE_LIMIT_FID", 5i64, |v| v > 0)?,
            window_seconds: parse_env("RATE_LIMIT_FID_WINDOW_SECONDS", 3600u64, |v| v > 0)?,
        };

        Ok(Self {
            version: version()?,
            http_port,
            external_base,
            user_agent,
            http_client_timeout,
            redis_url,
            gateway_base_url,
            gateway_api_key,
            identity_base_url,
            plant_indexer_url,
            admin_api_key,
            admin_allowed_origins,
            notification_secret,
            batch_concurrency,
            send_chunk_size,
            fidmap_cache_size,
            windows,
            rate_limit_global,
            rate_limit_fid,
        })
    }
}

/// Retrieves an optional environment variable, returning an empty string if
/// not set.
fn optional_env(name: &str) -> String {
    std::env::var(name).unwrap_or("".to_string())
}

/// Retrieves an environment variable with a default value if not set.
fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or(default_value.to_string())
}

/// Parses a numeric environment variable, falling back to a default when the
/// variable is unset and rejecting values that fail `valid`.
fn parse_env<T>(name: &str, default_value: T, valid: impl Fn(T) -> bool) -> Result<T>
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(name) {
        Err(_) => Ok(default_value),
        Ok(raw) => {
            let value = raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
                details: format!("Invalid value for {}: {}", name, raw),
            })?;
            if !valid(value) {
                return Err(ConfigError::InvalidValue {
                    details: format!("Out-of-range value for {}: {}", name, raw),
                });
            }
            Ok(value)
        }
    }
}

/// Retrieves the service version from compile-time environment variables.
///
/// Attempts `GIT_HASH` first, then `CARGO_PKG_VERSION`.
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotAvailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_port_parsing() {
        let port: HttpPort = "9090".to_string().try_into().unwrap();
        assert_eq!(*port.as_ref(), 9090);

        let default: HttpPort = "".to_string().try_into().unwrap();
        assert_eq!(*default.as_ref(), 8080);

        let bad: Result<HttpPort> = "not-a-port".to_string().try_into();
        assert!(bad.is_err());
    }

    #[test]
    fn test_timeout_rejects_zero() {
        let bad: Result<HttpClientTimeout> = "0".to_string().try_into();
        assert!(bad.is_err());
    }

    #[test]
    fn test_window_defaults() {
        let windows = WindowConfig::default();
        assert_eq!(windows.wilt_threshold_seconds, 12 * 3600);
        assert_eq!(windows.fence_warn_window_seconds, 2 * 3600);
        assert_eq!(windows.fence_grace_seconds, 3600);
        assert!(
            windows.fence_expired_marker_ttl_seconds as i64 > windows.fence_grace_seconds,
            "expired marker must outlive the grace window"
        );
    }

    #[test]
    fn test_version_available() {
        assert!(version().is_ok());
    }
}
