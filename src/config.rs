use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Driver runtime configuration.
///
/// Sources, later ones winning: built-in defaults, `config/default.toml`,
/// then `UC_*` environment variables (`__` separates nested keys, e.g.
/// `UC_HUB__POLL_INTERVAL_SECS`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub integration_interface: String,
    pub integration_http_port: u16,
    /// Directory holding `config.json`
    pub config_home: PathBuf,
    pub log_level: String,
    pub disable_mdns_publish: bool,
    pub hub: HubSettings,
    pub discovery: DiscoverySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            integration_interface: "0.0.0.0".to_string(),
            integration_http_port: 9090,
            config_home: PathBuf::from("./"),
            log_level: "DEBUG".to_string(),
            disable_mdns_publish: false,
            hub: HubSettings::default(),
            discovery: DiscoverySettings::default(),
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("UC_").split("__"))
    }

    pub fn load() -> Result<Self> {
        Self::figment()
            .extract()
            .context("invalid driver configuration")
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let host = if self.integration_interface.contains(':') {
            format!("[{}]", self.integration_interface)
        } else {
            self.integration_interface.clone()
        };
        Ok(format!("{}:{}", host, self.integration_http_port).parse()?)
    }
}

/// Per-hub connection tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// HTTP port of the hub API
    pub port: u16,
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub reconnect_min_secs: u64,
    pub reconnect_max_secs: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            port: 80,
            request_timeout_secs: 10,
            poll_interval_secs: 30,
            reconnect_min_secs: 1,
            reconnect_max_secs: 60,
        }
    }
}

impl HubSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn reconnect_min(&self) -> Duration {
        Duration::from_secs(self.reconnect_min_secs.max(1))
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    pub timeout_ms: u64,
    pub service_types: Vec<String>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            service_types: vec![
                "_powerview._tcp.local.".to_string(),
                "_powerview-g3._tcp.local.".to_string(),
            ],
        }
    }
}

impl DiscoverySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        Jail::expect_with(|_jail| {
            let cfg: Config = Config::figment().extract()?;
            assert_eq!(cfg.integration_http_port, 9090);
            assert_eq!(cfg.hub.port, 80);
            assert_eq!(cfg.discovery.service_types.len(), 2);
            assert!(!cfg.disable_mdns_publish);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides() {
        Jail::expect_with(|jail| {
            jail.set_env("UC_INTEGRATION_HTTP_PORT", "9191");
            jail.set_env("UC_LOG_LEVEL", "WARNING");
            jail.set_env("UC_CONFIG_HOME", "/config");
            jail.set_env("UC_HUB__POLL_INTERVAL_SECS", "5");
            let cfg: Config = Config::figment().extract()?;
            assert_eq!(cfg.integration_http_port, 9191);
            assert_eq!(cfg.log_level, "WARNING");
            assert_eq!(cfg.config_home, PathBuf::from("/config"));
            assert_eq!(cfg.hub.poll_interval(), Duration::from_secs(5));
            Ok(())
        });
    }

    #[test]
    fn test_toml_file() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file(
                "config/default.toml",
                r#"
                integration_http_port = 8000
                [hub]
                port = 8080
                "#,
            )?;
            let cfg: Config = Config::figment().extract()?;
            assert_eq!(cfg.integration_http_port, 8000);
            assert_eq!(cfg.hub.port, 8080);
            assert_eq!(cfg.hub.request_timeout_secs, 10);
            Ok(())
        });
    }

    #[test]
    fn test_socket_addr() {
        let mut cfg = Config::default();
        assert_eq!(cfg.socket_addr().unwrap().port(), 9090);
        cfg.integration_interface = "::".to_string();
        assert!(cfg.socket_addr().unwrap().is_ipv6());
    }
}
