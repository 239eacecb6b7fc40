//! Configuration vault – reads/writes `~/.kiosk/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kiosk_middleware::{BleSettings, SerialSettings};
use kiosk_runtime::{NotificationSettings, OrderSettings, RuntimeConfig};
use kiosk_types::{Catalog, TransportKind};
use serde::{Deserialize, Serialize};

/// Persisted kiosk configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub ble: BleSettings,
    #[serde(default)]
    pub serial: SerialSettings,
    #[serde(default)]
    pub order: OrderSection,
    #[serde(default)]
    pub catalog: Catalog,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportSection {
    /// Fixed for the life of the process.
    #[serde(default = "default_transport")]
    pub kind: TransportKind,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            kind: default_transport(),
        }
    }
}

/// The host's native transport when this binary can drive it, serial
/// otherwise.
pub fn default_transport() -> TransportKind {
    match TransportKind::detect() {
        TransportKind::NativeBle if !cfg!(feature = "ble") => TransportKind::Serial,
        kind => kind,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSection {
    /// Clamped into 5–60 s when applied.
    #[serde(default = "default_confirmation_wait_secs")]
    pub confirmation_wait_secs: u64,
    #[serde(default = "default_category_idle_secs")]
    pub category_idle_secs: u64,
    #[serde(default = "default_grace_delay_ms")]
    pub grace_delay_ms: u64,
    #[serde(default = "default_limit_switch_indicator_ms")]
    pub limit_switch_indicator_ms: u64,
    #[serde(default = "default_wake_keep_on_secs")]
    pub wake_keep_on_secs: u64,
    /// Unset: the limit-switch cue loops until the proceed window closes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_switch_cue_secs: Option<u64>,
}

fn default_confirmation_wait_secs() -> u64 {
    kiosk_runtime::order::DEFAULT_CONFIRMATION_WAIT_SECS
}
fn default_category_idle_secs() -> u64 {
    15
}
fn default_grace_delay_ms() -> u64 {
    2000
}
fn default_limit_switch_indicator_ms() -> u64 {
    1000
}
fn default_wake_keep_on_secs() -> u64 {
    300
}

impl Default for OrderSection {
    fn default() -> Self {
        Self {
            confirmation_wait_secs: default_confirmation_wait_secs(),
            category_idle_secs: default_category_idle_secs(),
            grace_delay_ms: default_grace_delay_ms(),
            limit_switch_indicator_ms: default_limit_switch_indicator_ms(),
            wake_keep_on_secs: default_wake_keep_on_secs(),
            limit_switch_cue_secs: None,
        }
    }
}

impl Config {
    /// Settings handed to the runtime at startup.
    pub fn runtime_config(&self) -> RuntimeConfig {
        let mut order = OrderSettings::default().with_confirmation_wait(self.order.confirmation_wait_secs);
        order.category_idle = Duration::from_secs(self.order.category_idle_secs);
        order.grace_delay = Duration::from_millis(self.order.grace_delay_ms);
        order.limit_switch_cue_cap = self.order.limit_switch_cue_secs.map(Duration::from_secs);

        RuntimeConfig {
            catalog: self.catalog.clone(),
            order,
            notifications: NotificationSettings {
                limit_switch_indicator: Duration::from_millis(self.order.limit_switch_indicator_ms),
                wake_keep_on: Duration::from_secs(self.order.wake_keep_on_secs),
            },
        }
    }
}

/// Return the path to `~/.kiosk/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".kiosk").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    let mut cfg = read_from(path)?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// The file as written, without environment overrides.
pub(crate) fn read_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {e}", path.display()))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse config: {e}"))
}

/// Apply `KIOSK_*` environment variable overrides to `cfg`. Unparseable
/// values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `KIOSK_TRANSPORT` | `transport.kind` |
/// | `KIOSK_SERIAL_PORT` | `serial.port` |
/// | `KIOSK_BAUD_RATE` | `serial.baud_rate` |
/// | `KIOSK_CONFIRMATION_WAIT_SECS` | `order.confirmation_wait_secs` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("KIOSK_TRANSPORT")
        && let Ok(kind) = v.parse::<TransportKind>()
    {
        cfg.transport.kind = kind;
    }
    if let Ok(v) = std::env::var("KIOSK_SERIAL_PORT") {
        cfg.serial.port = v;
    }
    if let Ok(v) = std::env::var("KIOSK_BAUD_RATE")
        && let Ok(baud) = v.parse::<u32>()
    {
        cfg.serial.baud_rate = baud;
    }
    if let Ok(v) = std::env::var("KIOSK_CONFIRMATION_WAIT_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.order.confirmation_wait_secs = kiosk_runtime::order::clamp_confirmation_wait(secs);
    }
}

/// Save the config to disk, creating `~/.kiosk/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {e}"))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {e}"))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {e}"))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {e}", path.display()))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {e}", path.display()))?;
    Ok(())
}
