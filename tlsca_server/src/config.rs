// SPDX-License-Identifier: MIT OR Apache-2.0
//! Server configuration types.

use std::net::SocketAddr;
use std::time::Duration;

use crate::audit::AuditConfig;
use crate::authority::expiry;
use crate::error::{Result, ServerError};
use crate::metrics::MetricsConfig;

// Environment variable names for configuration.

/// Bind address environment variable.
pub const ENV_BIND_ADDR: &str = "TLSCA_BIND_ADDR";
/// Separate admin listener environment variable.
pub const ENV_ADMIN_BIND_ADDR: &str = "TLSCA_ADMIN_BIND_ADDR";
/// Enable reflection environment variable.
pub const ENV_ENABLE_REFLECTION: &str = "TLSCA_ENABLE_REFLECTION";
/// Authority common name environment variable.
pub const ENV_AUTHORITY_NAME: &str = "TLSCA_AUTHORITY_NAME";
/// Authority organization environment variable.
pub const ENV_AUTHORITY_ORGANIZATION: &str = "TLSCA_AUTHORITY_ORGANIZATION";
/// Root certificate validity in days environment variable.
pub const ENV_ROOT_VALIDITY_DAYS: &str = "TLSCA_ROOT_VALIDITY_DAYS";
/// Maximum leaf validity in seconds environment variable.
pub const ENV_MAX_VALIDITY_SECS: &str = "TLSCA_MAX_VALIDITY_SECS";
/// Request timeout seconds environment variable.
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "TLSCA_REQUEST_TIMEOUT_SECS";
/// Audit log retention environment variable.
pub const ENV_AUDIT_MAX_ENTRIES: &str = "TLSCA_AUDIT_MAX_ENTRIES";
/// OTLP metrics endpoint environment variable.
pub const ENV_OTLP_ENDPOINT: &str = "TLSCA_OTLP_ENDPOINT";

/// Environment variable parsing helpers.
mod env_parse {
    use std::net::SocketAddr;
    use std::time::Duration;

    use super::{Result, ServerError};

    /// Parse a socket address from an environment variable.
    pub fn parse_socket_addr(key: &str) -> Option<Result<SocketAddr>> {
        std::env::var(key).ok().map(|val| {
            val.parse()
                .map_err(|e| ServerError::Config(format!("invalid {key}: {e}")))
        })
    }

    /// Parse a usize from an environment variable.
    pub fn parse_usize(key: &str) -> Option<Result<usize>> {
        std::env::var(key).ok().map(|val| {
            val.parse()
                .map_err(|e| ServerError::Config(format!("invalid {key}: {e}")))
        })
    }

    /// Parse a u32 from an environment variable.
    pub fn parse_u32(key: &str) -> Option<Result<u32>> {
        std::env::var(key).ok().map(|val| {
            val.parse()
                .map_err(|e| ServerError::Config(format!("invalid {key}: {e}")))
        })
    }

    /// Parse an i64 from an environment variable.
    pub fn parse_i64(key: &str) -> Option<Result<i64>> {
        std::env::var(key).ok().map(|val| {
            val.parse()
                .map_err(|e| ServerError::Config(format!("invalid {key}: {e}")))
        })
    }

    /// Parse a boolean from an environment variable.
    /// Accepts "true", "1", "yes", "on" as true (case-insensitive).
    /// Accepts "false", "0", "no", "off" as false (case-insensitive).
    pub fn parse_bool(key: &str) -> Option<Result<bool>> {
        std::env::var(key)
            .ok()
            .map(|val| match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(ServerError::Config(format!(
                    "invalid {key}: expected boolean (true/false/1/0/yes/no/on/off)"
                ))),
            })
    }

    /// Parse a duration in seconds from an environment variable.
    pub fn parse_duration_secs(key: &str) -> Option<Result<Duration>> {
        std::env::var(key).ok().map(|val| {
            val.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| ServerError::Config(format!("invalid {key}: {e}")))
        })
    }

    /// Read a non-empty string from an environment variable.
    pub fn parse_string(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address of the public listener.
    pub bind_addr: SocketAddr,
    /// Dedicated listener for the admin service. When unset the admin service
    /// shares the public listener.
    pub admin_bind_addr: Option<SocketAddr>,
    /// Enable reflection service for debugging.
    pub enable_reflection: bool,
    /// Certificate authority settings.
    pub authority: AuthorityConfig,
    /// Audit logging configuration (optional).
    pub audit: Option<AuditConfig>,
    /// Metrics configuration (optional).
    pub metrics: Option<MetricsConfig>,
    /// Request timeout.
    pub request_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 7054)),
            admin_bind_addr: None,
            enable_reflection: true,
            authority: AuthorityConfig::default(),
            audit: None,
            metrics: None,
            request_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Unset variables use defaults. Invalid values return an error.
    ///
    /// # Supported Environment Variables
    ///
    /// - `TLSCA_BIND_ADDR` - Public listener address (e.g., "0.0.0.0:7054")
    /// - `TLSCA_ADMIN_BIND_ADDR` - Dedicated admin listener address
    /// - `TLSCA_ENABLE_REFLECTION` - Enable reflection (true/false)
    /// - `TLSCA_AUTHORITY_NAME` - Root certificate common name
    /// - `TLSCA_AUTHORITY_ORGANIZATION` - Root certificate organization
    /// - `TLSCA_ROOT_VALIDITY_DAYS` - Root certificate lifetime in days
    /// - `TLSCA_MAX_VALIDITY_SECS` - Longest leaf validity the store accepts
    /// - `TLSCA_REQUEST_TIMEOUT_SECS` - Request timeout in seconds
    /// - `TLSCA_AUDIT_MAX_ENTRIES` - Enables audit logging with this retention
    /// - `TLSCA_OTLP_ENDPOINT` - Enables OTLP metrics export to this endpoint
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(result) = env_parse::parse_socket_addr(ENV_BIND_ADDR) {
            config.bind_addr = result?;
        }
        if let Some(result) = env_parse::parse_socket_addr(ENV_ADMIN_BIND_ADDR) {
            config.admin_bind_addr = Some(result?);
        }
        if let Some(result) = env_parse::parse_bool(ENV_ENABLE_REFLECTION) {
            config.enable_reflection = result?;
        }

        // Authority
        if let Some(name) = env_parse::parse_string(ENV_AUTHORITY_NAME) {
            config.authority.common_name = name;
        }
        if let Some(org) = env_parse::parse_string(ENV_AUTHORITY_ORGANIZATION) {
            config.authority.organization = org;
        }
        if let Some(result) = env_parse::parse_u32(ENV_ROOT_VALIDITY_DAYS) {
            config.authority.root_validity_days = result?;
        }
        if let Some(result) = env_parse::parse_i64(ENV_MAX_VALIDITY_SECS) {
            config.authority.max_validity_secs = result?;
        }

        if let Some(result) = env_parse::parse_duration_secs(ENV_REQUEST_TIMEOUT_SECS) {
            config.request_timeout = Some(result?);
        }

        if let Some(result) = env_parse::parse_usize(ENV_AUDIT_MAX_ENTRIES) {
            config.audit = Some(AuditConfig::default().with_max_entries(result?));
        }

        if let Some(endpoint) = env_parse::parse_string(ENV_OTLP_ENDPOINT) {
            config.metrics = Some(MetricsConfig::default().with_endpoint(endpoint));
        }

        Ok(config)
    }

    /// Set the bind address.
    #[must_use]
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Serve the admin service on its own listener.
    #[must_use]
    pub fn with_admin_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.admin_bind_addr = Some(addr);
        self
    }

    /// Enable or disable reflection service.
    #[must_use]
    pub fn with_reflection(mut self, enabled: bool) -> Self {
        self.enable_reflection = enabled;
        self
    }

    /// Set certificate authority settings.
    #[must_use]
    pub fn with_authority(mut self, authority: AuthorityConfig) -> Self {
        self.authority = authority;
        self
    }

    /// Set audit logging configuration.
    #[must_use]
    pub fn with_audit(mut self, config: AuditConfig) -> Self {
        self.audit = Some(config);
        self
    }

    /// Set metrics configuration.
    #[must_use]
    pub fn with_metrics(mut self, config: MetricsConfig) -> Self {
        self.metrics = Some(config);
        self
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if let Some(admin) = self.admin_bind_addr {
            if admin == self.bind_addr && admin.port() != 0 {
                return Err(ServerError::Config(
                    "admin_bind_addr must differ from bind_addr".to_string(),
                ));
            }
        }

        if self.request_timeout == Some(Duration::ZERO) {
            return Err(ServerError::Config(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        self.authority.validate()
    }
}

/// Certificate authority settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityConfig {
    /// Common name of the root certificate.
    pub common_name: String,
    /// Organization of the root certificate.
    pub organization: String,
    /// Lifetime of the root certificate in days.
    pub root_validity_days: u32,
    /// Longest validity, in seconds, accepted for issued certificates.
    pub max_validity_secs: i64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            common_name: "tlsca".to_string(),
            organization: "TLSCA".to_string(),
            root_validity_days: 3650,
            max_validity_secs: 365 * 24 * 60 * 60,
        }
    }
}

impl AuthorityConfig {
    /// Create a new authority configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root certificate common name.
    #[must_use]
    pub fn with_common_name(mut self, name: impl Into<String>) -> Self {
        self.common_name = name.into();
        self
    }

    /// Set the root certificate organization.
    #[must_use]
    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = org.into();
        self
    }

    /// Set the root certificate lifetime.
    #[must_use]
    pub const fn with_root_validity_days(mut self, days: u32) -> Self {
        self.root_validity_days = days;
        self
    }

    /// Set the longest accepted leaf validity.
    #[must_use]
    pub const fn with_max_validity_secs(mut self, secs: i64) -> Self {
        self.max_validity_secs = secs;
        self
    }

    /// Validate the authority configuration.
    pub fn validate(&self) -> Result<()> {
        if self.common_name.is_empty() {
            return Err(ServerError::Config(
                "authority common_name cannot be empty".to_string(),
            ));
        }

        if self.root_validity_days == 0 {
            return Err(ServerError::Config(
                "root_validity_days must be greater than 0".to_string(),
            ));
        }

        if self.max_validity_secs <= 0 {
            return Err(ServerError::Config(
                "max_validity_secs must be greater than 0".to_string(),
            ));
        }

        let now = time::OffsetDateTime::now_utc();
        let root_span = time::Duration::days(i64::from(self.root_validity_days));
        if expiry(now, root_span).is_none() {
            return Err(ServerError::Config(
                "root_validity_days runs past year 9999".to_string(),
            ));
        }

        if expiry(now, time::Duration::seconds(self.max_validity_secs)).is_none() {
            return Err(ServerError::Config(
                "max_validity_secs runs past year 9999".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 7054);
        assert!(config.admin_bind_addr.is_none());
        assert!(config.enable_reflection);
        assert!(config.audit.is_none());
        assert!(config.metrics.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ServerConfig::new()
            .with_bind_addr("0.0.0.0:8080".parse().unwrap())
            .with_admin_bind_addr("127.0.0.1:8081".parse().unwrap())
            .with_reflection(false)
            .with_request_timeout(Duration::from_secs(5))
            .with_audit(AuditConfig::default())
            .with_authority(AuthorityConfig::new().with_common_name("test-ca"));

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.admin_bind_addr.unwrap().port(), 8081);
        assert!(!config.enable_reflection);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
        assert!(config.audit.is_some());
        assert_eq!(config.authority.common_name, "test-ca");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_admin_addr_must_differ() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::new()
            .with_bind_addr(addr)
            .with_admin_bind_addr(addr);
        assert!(config.validate().is_err());

        // Ephemeral ports resolve to different listeners
        let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let config = ServerConfig::new().with_bind_addr(any).with_admin_bind_addr(any);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_request_timeout_rejected() {
        let config = ServerConfig::new().with_request_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_authority_config_validation() {
        assert!(AuthorityConfig::default().validate().is_ok());
        assert!(AuthorityConfig::new()
            .with_common_name("")
            .validate()
            .is_err());
        assert!(AuthorityConfig::new()
            .with_root_validity_days(0)
            .validate()
            .is_err());
        assert!(AuthorityConfig::new()
            .with_max_validity_secs(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_authority_config_rejects_far_future() {
        let err = AuthorityConfig::new()
            .with_max_validity_secs(i64::MAX)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("max_validity_secs"));

        let err = AuthorityConfig::new()
            .with_root_validity_days(u32::MAX)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("root_validity_days"));

        assert!(AuthorityConfig::new()
            .with_root_validity_days(36_500)
            .with_max_validity_secs(10 * 31_536_000)
            .validate()
            .is_ok());
    }

    // Environment variable tests
    mod env_tests {
        use super::*;
        use std::sync::Mutex;

        // Use a mutex to ensure env var tests don't interfere with each other
        static ENV_MUTEX: Mutex<()> = Mutex::new(());

        fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
        where
            F: FnOnce() -> R,
        {
            let _guard = ENV_MUTEX
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);

            let saved: Vec<_> = vars
                .iter()
                .map(|(k, v)| {
                    let old = std::env::var(k).ok();
                    std::env::set_var(k, v);
                    (*k, old)
                })
                .collect();

            let result = f();

            for (k, old) in saved {
                match old {
                    Some(v) => std::env::set_var(k, v),
                    None => std::env::remove_var(k),
                }
            }

            result
        }

        #[test]
        fn test_from_env_defaults() {
            with_env_vars(&[], || {
                let config = ServerConfig::from_env().unwrap();
                assert_eq!(config.authority, AuthorityConfig::default());
            });
        }

        #[test]
        fn test_from_env_bind_addrs() {
            with_env_vars(
                &[
                    (ENV_BIND_ADDR, "0.0.0.0:7054"),
                    (ENV_ADMIN_BIND_ADDR, "127.0.0.1:7055"),
                ],
                || {
                    let config = ServerConfig::from_env().unwrap();
                    assert_eq!(config.bind_addr.to_string(), "0.0.0.0:7054");
                    assert_eq!(config.admin_bind_addr.unwrap().to_string(), "127.0.0.1:7055");
                },
            );
        }

        #[test]
        fn test_from_env_invalid_bind_addr() {
            with_env_vars(&[(ENV_BIND_ADDR, "not-an-address")], || {
                let err = ServerConfig::from_env().unwrap_err();
                assert!(err.to_string().contains(ENV_BIND_ADDR));
            });
        }

        #[test]
        fn test_from_env_authority() {
            with_env_vars(
                &[
                    (ENV_AUTHORITY_NAME, "edge-ca"),
                    (ENV_AUTHORITY_ORGANIZATION, "Edge"),
                    (ENV_ROOT_VALIDITY_DAYS, "30"),
                    (ENV_MAX_VALIDITY_SECS, "86400"),
                ],
                || {
                    let config = ServerConfig::from_env().unwrap();
                    assert_eq!(config.authority.common_name, "edge-ca");
                    assert_eq!(config.authority.organization, "Edge");
                    assert_eq!(config.authority.root_validity_days, 30);
                    assert_eq!(config.authority.max_validity_secs, 86_400);
                },
            );
        }

        #[test]
        fn test_from_env_bool_variants() {
            for value in ["false", "0", "no", "OFF"] {
                with_env_vars(&[(ENV_ENABLE_REFLECTION, value)], || {
                    let config = ServerConfig::from_env().unwrap();
                    assert!(!config.enable_reflection);
                });
            }

            with_env_vars(&[(ENV_ENABLE_REFLECTION, "maybe")], || {
                assert!(ServerConfig::from_env().is_err());
            });
        }

        #[test]
        fn test_from_env_audit_and_metrics() {
            with_env_vars(
                &[
                    (ENV_AUDIT_MAX_ENTRIES, "500"),
                    (ENV_OTLP_ENDPOINT, "http://otel:4317"),
                    (ENV_REQUEST_TIMEOUT_SECS, "10"),
                ],
                || {
                    let config = ServerConfig::from_env().unwrap();
                    assert_eq!(config.audit.unwrap().max_entries, 500);
                    assert_eq!(config.metrics.unwrap().otlp_endpoint, "http://otel:4317");
                    assert_eq!(config.request_timeout, Some(Duration::from_secs(10)));
                },
            );
        }
    }
}
