//! Configuration Vault – reads/writes `~/.heatex/config.toml`.

use heatex_kernel::BackoffPolicy;
use heatex_types::DataSourceMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroize;

/// Retry tuning for the realtime channel, `[reconnect]` in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Persisted user configuration stored in `~/.heatex/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP/WebSocket port of the browser dashboard.
    #[serde(default = "default_cockpit_port")]
    pub cockpit_port: u16,

    /// SQLite file backing the database round-trip mode.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Base URL of the hosted publish/subscribe service.  Empty means the
    /// realtime mode fails with a configuration error.
    #[serde(default)]
    pub pubsub_url: String,

    /// Bearer key for the publish/subscribe service (stored as plain text;
    /// the file is created owner-only).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pubsub_access_key: String,

    /// Data source selected at startup.
    #[serde(default)]
    pub initial_mode: DataSourceMode,

    /// Polling cadence of the simulator and database modes.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Wait between the database write and the read-back.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(self.reconnect.base_delay_ms),
            multiplier: self.reconnect.multiplier,
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            max_attempts: self.reconnect.max_attempts,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("cockpit_port", &self.cockpit_port)
            .field("database_path", &self.database_path)
            .field("pubsub_url", &self.pubsub_url)
            .field(
                "pubsub_access_key",
                if self.pubsub_access_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("initial_mode", &self.initial_mode)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("settle_delay_ms", &self.settle_delay_ms)
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        self.pubsub_access_key.zeroize();
    }
}

fn default_cockpit_port() -> u16 {
    8080
}
fn default_database_path() -> String {
    heatex_dir_for_home(&home_dir()).join("readings.db").display().to_string()
}
fn default_poll_interval_ms() -> u64 {
    3_000
}
fn default_settle_delay_ms() -> u64 {
    50
}
fn default_base_delay_ms() -> u64 {
    2_000
}
fn default_multiplier() -> f64 {
    1.5
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_max_attempts() -> u32 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cockpit_port: default_cockpit_port(),
            database_path: default_database_path(),
            pubsub_url: String::new(),
            pubsub_access_key: String::new(),
            initial_mode: DataSourceMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn heatex_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".heatex")
}

/// Return the path to `~/.heatex/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    heatex_dir_for_home(home).join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// The config on disk, or the defaults, with environment overrides applied
/// either way.
pub fn load_or_default() -> Result<Config, String> {
    match load()? {
        Some(cfg) => Ok(cfg),
        None => {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            Ok(cfg)
        }
    }
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `HEATEX_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `HEATEX_COCKPIT_PORT` | `cockpit_port` |
/// | `HEATEX_DATABASE_PATH` | `database_path` |
/// | `HEATEX_PUBSUB_URL` | `pubsub_url` |
/// | `HEATEX_PUBSUB_ACCESS_KEY` | `pubsub_access_key` |
/// | `HEATEX_MODE` | `initial_mode` |
/// | `HEATEX_SETTLE_DELAY_MS` | `settle_delay_ms` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("HEATEX_COCKPIT_PORT")
        && let Ok(port) = v.parse::<u16>() {
            cfg.cockpit_port = port;
        }
    if let Ok(v) = std::env::var("HEATEX_DATABASE_PATH") {
        cfg.database_path = v;
    }
    if let Ok(v) = std::env::var("HEATEX_PUBSUB_URL") {
        cfg.pubsub_url = v;
    }
    if let Ok(v) = std::env::var("HEATEX_PUBSUB_ACCESS_KEY") {
        cfg.pubsub_access_key = v;
    }
    if let Ok(v) = std::env::var("HEATEX_MODE")
        && let Ok(mode) = v.parse::<DataSourceMode>() {
            cfg.initial_mode = mode;
        }
    if let Ok(v) = std::env::var("HEATEX_SETTLE_DELAY_MS")
        && let Ok(ms) = v.parse::<u64>() {
            cfg.settle_delay_ms = ms;
        }
}

/// Save the config to disk, creating `~/.heatex/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

/// Create `dir` (and parents) restricted to the owner (rwx------) on Unix.
pub(crate) fn ensure_private_dir(dir: &Path) -> Result<(), String> {
    fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create directory {}: {}", dir.display(), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| format!("Failed to set permissions on {}: {}", dir.display(), e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_redacts_access_key() {
        let mut cfg = Config::default();
        cfg.pubsub_access_key = "Endpoint=sb://secret".to_string();
        let debug_str = format!("{:?}", cfg);
        assert!(!debug_str.contains("sb://secret"), "access key must not appear in debug output");
        assert!(debug_str.contains("<redacted>"));
    }

    #[test]
    fn config_debug_shows_not_set_for_empty_key() {
        let debug_str = format!("{:?}", Config::default());
        assert!(debug_str.contains("<not set>"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.poll_interval_ms, 3_000);
        assert_eq!(loaded.reconnect, ReconnectConfig::default());
        assert_eq!(loaded.backoff(), BackoffPolicy::default());
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "poll_interval_ms = 1000\ninitial_mode = \"simulator\"\n\n[reconnect]\nmax_attempts = 3\n",
        )
        .unwrap();

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.reconnect.max_attempts, 3);
        assert_eq!(cfg.reconnect.base_delay_ms, 2_000);
        assert_eq!(cfg.reconnect.multiplier, 1.5);
    }

    #[test]
    fn unparsable_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "cockpit_port = \"eighty\"").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.cockpit_port, 8080);
        assert_eq!(cfg.initial_mode, DataSourceMode::RealtimeChannel);
        assert_eq!(cfg.settle_delay(), Duration::from_millis(50));
        assert!(cfg.pubsub_url.is_empty());
        assert!(cfg.database_path.ends_with("readings.db"));
    }

    #[test]
    fn config_path_points_to_heatex_dir() {
        let p = config_path_for_home("/home/operator");
        assert_eq!(p, PathBuf::from("/home/operator/.heatex/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_changes_pubsub_url() {
        // SAFETY: each override test owns a distinct variable.
        unsafe { std::env::set_var("HEATEX_PUBSUB_URL", "https://pubsub.plant.local") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.pubsub_url, "https://pubsub.plant.local");
        unsafe { std::env::remove_var("HEATEX_PUBSUB_URL") };
    }

    #[test]
    fn apply_env_overrides_changes_mode() {
        // SAFETY: each override test owns a distinct variable.
        unsafe { std::env::set_var("HEATEX_MODE", "database") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.initial_mode, DataSourceMode::DatabaseRoundTrip);
        unsafe { std::env::remove_var("HEATEX_MODE") };
    }

    #[test]
    fn apply_env_overrides_changes_cockpit_port() {
        // SAFETY: each override test owns a distinct variable.
        unsafe { std::env::set_var("HEATEX_COCKPIT_PORT", "9191") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.cockpit_port, 9191);
        unsafe { std::env::remove_var("HEATEX_COCKPIT_PORT") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_number() {
        // SAFETY: each override test owns a distinct variable.
        unsafe { std::env::set_var("HEATEX_SETTLE_DELAY_MS", "soon") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.settle_delay_ms, 50);
        unsafe { std::env::remove_var("HEATEX_SETTLE_DELAY_MS") };
    }
}
