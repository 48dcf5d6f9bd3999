//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `8000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; orders are kept in memory when unset
/// - `PAYMENT_SERVICE_URL`, `INVENTORY_SERVICE_URL`, `SHIPPING_SERVICE_URL`:
///   remote service base URLs (defaults: `http://localhost:8001`, `8002`, `8003`)
/// - `SERVICE_TIMEOUT_SECS`: per-request timeout for remote calls (default: `10`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub payment_service_url: String,
    pub inventory_service_url: String,
    pub shipping_service_url: String,
    pub service_timeout_secs: u64,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: var_or("HOST", &defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: var_or("RUST_LOG", &defaults.log_level),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            payment_service_url: var_or("PAYMENT_SERVICE_URL", &defaults.payment_service_url),
            inventory_service_url: var_or("INVENTORY_SERVICE_URL", &defaults.inventory_service_url),
            shipping_service_url: var_or("SHIPPING_SERVICE_URL", &defaults.shipping_service_url),
            service_timeout_secs: std::env::var("SERVICE_TIMEOUT_SECS")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(defaults.service_timeout_secs),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            database_url: None,
            payment_service_url: "http://localhost:8001".to_string(),
            inventory_service_url: "http://localhost:8002".to_string(),
            shipping_service_url: "http://localhost:8003".to_string(),
            service_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.payment_service_url, "http://localhost:8001");
        assert_eq!(config.inventory_service_url, "http://localhost:8002");
        assert_eq!(config.shipping_service_url, "http://localhost:8003");
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_service_timeout() {
        let config = Config {
            service_timeout_secs: 3,
            ..Config::default()
        };
        assert_eq!(config.service_timeout(), Duration::from_secs(3));
        assert_eq!(Config::default().service_timeout(), Duration::from_secs(10));
    }
}
