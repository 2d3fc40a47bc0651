//! TOML-backed configuration, matching `helix-term/src/config.rs`'s shape: a
//! `serde`-derived struct loaded from disk with `Default` filling in
//! anything the file omits.
//!
//! Covers the pool/provider knobs and per-language overrides this binary
//! needs plus the embedding program's own concerns; a network listen
//! surface is out of scope here since the gateway only ever talks stdio.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use gateway_pool::PoolConfig;
use gateway_providers::ExternalServerConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub pool: PoolSettings,
    /// Per-language overrides/additions beyond the builtin providers.
    pub external_servers: HashMap<String, ExternalServerConfig>,
    /// Environment variables forwarded to every spawned language server.
    pub environment: HashMap<String, String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            pool: PoolSettings::default(),
            external_servers: HashMap::new(),
            environment: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub health_check_interval_ms: u64,
    pub idle_timeout_ms: u64,
    pub max_restarts: u32,
    pub restart_window_ms: u64,
    pub start_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub ping_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub kill_grace_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        let defaults = PoolConfig::default();
        PoolSettings {
            health_check_interval_ms: defaults.health_check_interval.as_millis() as u64,
            idle_timeout_ms: defaults.idle_timeout.as_millis() as u64,
            max_restarts: defaults.max_restarts,
            restart_window_ms: defaults.restart_window.as_millis() as u64,
            start_timeout_ms: defaults.start_timeout.as_millis() as u64,
            request_timeout_ms: 5_000,
            ping_timeout_ms: defaults.ping_timeout.as_millis() as u64,
            shutdown_timeout_ms: defaults.shutdown_timeout.as_millis() as u64,
            kill_grace_ms: defaults.kill_grace.as_millis() as u64,
        }
    }
}

impl PoolSettings {
    pub fn to_pool_config(self) -> PoolConfig {
        PoolConfig {
            health_check_interval: Duration::from_millis(self.health_check_interval_ms),
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            max_restarts: self.max_restarts,
            restart_window: Duration::from_millis(self.restart_window_ms),
            start_timeout: Duration::from_millis(self.start_timeout_ms),
            ping_timeout: Duration::from_millis(self.ping_timeout_ms),
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
            kill_grace: Duration::from_millis(self.kill_grace_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Overrides whatever the file/default set with `GATEWAY_POOL_*`
    /// environment variables, when present and parseable. An unset variable
    /// leaves the field untouched; a set-but-unparseable one is logged and
    /// otherwise ignored rather than failing startup.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|var| std::env::var(var).ok());
    }

    /// Lookup-injected so tests can exercise override parsing without
    /// touching the real process environment.
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        Self::override_u64(&mut self.health_check_interval_ms, "GATEWAY_POOL_HEALTH_CHECK_INTERVAL_MS", &lookup);
        Self::override_u64(&mut self.idle_timeout_ms, "GATEWAY_POOL_IDLE_TIMEOUT_MS", &lookup);
        Self::override_u32(&mut self.max_restarts, "GATEWAY_POOL_MAX_RESTARTS", &lookup);
        Self::override_u64(&mut self.restart_window_ms, "GATEWAY_POOL_RESTART_WINDOW_MS", &lookup);
        Self::override_u64(&mut self.start_timeout_ms, "GATEWAY_POOL_START_TIMEOUT_MS", &lookup);
        Self::override_u64(&mut self.request_timeout_ms, "GATEWAY_POOL_REQUEST_TIMEOUT_MS", &lookup);
        Self::override_u64(&mut self.ping_timeout_ms, "GATEWAY_POOL_PING_TIMEOUT_MS", &lookup);
        Self::override_u64(&mut self.shutdown_timeout_ms, "GATEWAY_POOL_SHUTDOWN_TIMEOUT_MS", &lookup);
        Self::override_u64(&mut self.kill_grace_ms, "GATEWAY_POOL_KILL_GRACE_MS", &lookup);
    }

    fn override_u64(field: &mut u64, var: &str, lookup: &impl Fn(&str) -> Option<String>) {
        let Some(raw) = lookup(var) else { return };
        match raw.parse() {
            Ok(value) => *field = value,
            Err(err) => log::warn!("ignoring {var}={raw:?}: {err}"),
        }
    }

    fn override_u32(field: &mut u32, var: &str, lookup: &impl Fn(&str) -> Option<String>) {
        let Some(raw) = lookup(var) else { return };
        match raw.parse() {
            Ok(value) => *field = value,
            Err(err) => log::warn!("ignoring {var}={raw:?}: {err}"),
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from `path` if it exists, else starts from
    /// defaults, then applies `GATEWAY_POOL_*` environment overrides on top
    /// (matching `HELIX_LOG_LEVEL`'s pattern of env taking precedence over
    /// whatever the file or default settled on).
    /// A missing file is not an error; a present-but-malformed file is.
    pub fn load(path: &Path) -> anyhow::Result<GatewayConfig> {
        let mut config = if !path.exists() {
            GatewayConfig::default()
        } else {
            let raw = std::fs::read_to_string(path)
                .map_err(|err| anyhow::anyhow!("reading config file {}: {err}", path.display()))?;
            toml::from_str(&raw)
                .map_err(|err| anyhow::anyhow!("parsing config file {}: {err}", path.display()))?
        };
        config.pool.apply_env_overrides();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = GatewayConfig::load(Path::new("/nonexistent/gateway.toml")).unwrap();
        assert_eq!(config.pool.max_restarts, 3);
    }

    #[test]
    fn parses_a_minimal_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(
            &path,
            r#"
            [pool]
            max_restarts = 7

            [external_servers.zig]
            command = "zls"
            args = []
            "#,
        )
        .unwrap();
        let config = GatewayConfig::load(&path).unwrap();
        assert_eq!(config.pool.max_restarts, 7);
        assert_eq!(config.external_servers["zig"].command, "zls");
    }

    #[test]
    fn env_override_replaces_a_file_value() {
        let mut pool = PoolSettings { max_restarts: 7, ..PoolSettings::default() };
        pool.apply_overrides_from(|var| match var {
            "GATEWAY_POOL_MAX_RESTARTS" => Some("12".to_string()),
            _ => None,
        });
        assert_eq!(pool.max_restarts, 12);
    }

    #[test]
    fn env_override_is_skipped_when_unparseable() {
        let mut pool = PoolSettings { max_restarts: 7, ..PoolSettings::default() };
        pool.apply_overrides_from(|var| match var {
            "GATEWAY_POOL_MAX_RESTARTS" => Some("not-a-number".to_string()),
            _ => None,
        });
        assert_eq!(pool.max_restarts, 7);
    }

    #[test]
    fn unset_env_vars_leave_every_field_at_its_prior_value() {
        let before = PoolSettings { max_restarts: 9, ..PoolSettings::default() };
        let mut after = before;
        after.apply_overrides_from(|_| None);
        assert_eq!(after.max_restarts, before.max_restarts);
        assert_eq!(after.health_check_interval_ms, before.health_check_interval_ms);
        assert_eq!(after.idle_timeout_ms, before.idle_timeout_ms);
    }
}
