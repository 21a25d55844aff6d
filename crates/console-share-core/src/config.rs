//! Configuration resolution for `console-share`.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`$XDG_CONFIG_HOME/console-share/config.toml`)
//! 3. Environment variables
//! 4. CLI arguments (applied by the binaries, highest priority)

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::incus::Instance;

/// Complete `console-share` configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub incus: IncusConfig,
    /// Per-instance sharing preferences, keyed by instance name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub instances: BTreeMap<String, InstanceConfig>,
}

impl Config {
    pub fn instance(&self, name: &str) -> Option<&InstanceConfig> {
        self.instances.get(name)
    }

    /// Reject values that would make discovery spin or never poll.
    pub fn validate(&self) -> Result<()> {
        if self.console.poll_interval_ms == 0 {
            return Err(Error::Config(
                "console.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.console.discovery_timeout_secs == 0 {
            return Err(Error::Config(
                "console.discovery_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Add an `instances` entry for every instance not configured yet.
    ///
    /// Existing entries keep their port and enabled flag. Returns the number
    /// of entries added.
    pub fn add_instances(&mut self, instances: &[Instance]) -> usize {
        let mut added = 0;
        for instance in instances {
            self.instances
                .entry(instance.name.clone())
                .or_insert_with(|| {
                    added += 1;
                    InstanceConfig::new(instance.preferred_mode())
                });
        }
        added
    }
}

/// TCP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyConfig {
    pub bind_address: IpAddr,
    /// First port tried when no port is given on the command line.
    pub start_port: u16,
    /// How many ports after `start_port` are tried.
    pub port_span: u16,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            start_port: 8000,
            port_span: 100,
        }
    }
}

/// Graphical console discovery and relay settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsoleConfig {
    pub socket_dir: PathBuf,
    /// Directory holding the `remote-viewer` shim. Defaults to `<socket_dir>/bin`.
    pub viewer_dir: Option<PathBuf>,
    /// Directory holding per-instance marker files. Defaults to the
    /// runtime directory.
    pub marker_dir: Option<PathBuf>,
    pub discovery_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Grace period for the remaining direction after one side of a
    /// session hits EOF.
    pub linger_ms: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            socket_dir: PathBuf::from("/tmp/console-share"),
            viewer_dir: None,
            marker_dir: None,
            discovery_timeout_secs: crate::discovery::DEFAULT_TIMEOUT_SECS,
            poll_interval_ms: 1000,
            linger_ms: 500,
        }
    }
}

impl ConsoleConfig {
    pub fn viewer_dir(&self) -> PathBuf {
        self.viewer_dir
            .clone()
            .unwrap_or_else(|| self.socket_dir.join("bin"))
    }

    pub fn marker_dir(&self) -> PathBuf {
        self.marker_dir.clone().unwrap_or_else(default_marker_dir)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub const fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }
}

/// Shell proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    pub term: String,
    pub command: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            command: "/bin/bash".to_string(),
        }
    }
}

/// How one instance is shared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceConfig {
    /// `vga` or `shell`.
    #[serde(rename = "type")]
    pub share: String,
    /// Port used when none is given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl InstanceConfig {
    pub fn new(share: impl Into<String>) -> Self {
        Self {
            share: share.into(),
            port: None,
            enabled: true,
        }
    }
}

const fn default_enabled() -> bool {
    true
}

/// Location of the `incus` client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IncusConfig {
    pub bin: PathBuf,
}

impl Default for IncusConfig {
    fn default() -> Self {
        Self {
            bin: PathBuf::from("incus"),
        }
    }
}

/// Load configuration: defaults, then the global file, then the environment.
pub fn load_config() -> Result<Config> {
    let mut config = load_global_config()?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Defaults merged with the global file, without environment overrides.
pub fn load_global_config() -> Result<Config> {
    match global_config_path() {
        Some(path) if path.exists() => load_config_file(&path),
        _ => Ok(Config::default()),
    }
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("console-share").join("config.toml"))
}

/// Runtime-scoped directory for marker files.
///
/// `$XDG_RUNTIME_DIR/console-share`, or the temp dir when no runtime dir
/// is available.
pub fn default_marker_dir() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("console-share")
}

pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let config = parse_config(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Write `config` to `path` as TOML, creating the parent directory.
pub fn save_config_file(path: &Path, config: &Config) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content).map_err(|e| {
        Error::Config(format!("Failed to write config file {}: {e}", path.display()))
    })
}

pub fn parse_config(content: &str) -> std::result::Result<Config, toml::de::Error> {
    toml::from_str(content)
}

/// Apply `CONSOLE_SHARE_*` overrides. Unparseable values are ignored.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("CONSOLE_SHARE_BIND_ADDRESS") {
        if let Ok(addr) = val.parse() {
            config.proxy.bind_address = addr;
        }
    }
    if let Some(val) = lookup("CONSOLE_SHARE_START_PORT") {
        if let Ok(n) = val.parse() {
            config.proxy.start_port = n;
        }
    }
    if let Some(val) = lookup("CONSOLE_SHARE_MARKER_DIR") {
        config.console.marker_dir = Some(PathBuf::from(val));
    }
    if let Some(val) = lookup("CONSOLE_SHARE_DISCOVERY_TIMEOUT") {
        if let Ok(n) = val.parse() {
            config.console.discovery_timeout_secs = n;
        }
    }
    if let Some(val) = lookup("CONSOLE_SHARE_INCUS_BIN") {
        config.incus.bin = PathBuf::from(val);
    }
}
