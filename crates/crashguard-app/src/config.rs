//! Configuration management
//!
//! Handles loading and saving `crashguard.toml`.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crashguard_core::{ComponentId, InvalidConfig, SupervisorConfig};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    NoConfigDir,

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] InvalidConfig),
}

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Application identity
    pub app: AppInfo,
    /// Crash supervisor settings
    pub supervisor: SupervisorConfig,
    /// Component registry, in registration order
    pub components: Vec<ComponentConfig>,
}

/// Application identity shown in crash details and report subjects
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    /// Persist the last crash to the cache directory
    pub crash_log: bool,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: "application".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            crash_log: true,
        }
    }
}

/// A registered component
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentConfig {
    pub id: ComponentId,
    /// Executable to run
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Discovery actions this component answers
    #[serde(default)]
    pub actions: Vec<String>,
}

impl Config {
    /// Supervisor settings with the application name filled in
    pub fn supervisor_config(&self) -> SupervisorConfig {
        let mut supervisor = self.supervisor.clone();
        if supervisor.app_name == SupervisorConfig::default().app_name {
            supervisor.app_name = self.app.name.clone();
        }
        supervisor
    }
}

/// Get the configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("io", "crashguard", "crashguard").map(|p| p.config_dir().to_path_buf())
}

/// Get the config file path
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("crashguard.toml"))
}

/// Load configuration from the default location
pub fn load_config() -> Result<Config, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    load_config_from(&path)
}

/// Load configuration from `path`; a missing file yields defaults
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        log::debug!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.supervisor.validate()?;

    log::debug!(
        "Loaded config from {} ({} components)",
        path.display(),
        config.components.len()
    );
    Ok(config)
}

/// Save configuration to the default location
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    std::fs::create_dir_all(&dir)?;
    save_config_to(config, &dir.join("crashguard.toml"))
}

/// Save configuration to `path`
pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, &content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        let _ = std::fs::set_permissions(path, perms);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crashguard_core::resolver::{RECOVERY_SURFACE_ACTION, RESTART_TARGET_ACTION};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.app.name, "application");
        assert!(config.app.crash_log);
        assert!(config.supervisor.launch_recovery_when_background);
        assert!(config.components.is_empty());
    }

    #[test]
    fn test_config_serialize() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        assert!(serialized.contains("[app]"));
        assert!(serialized.contains("[supervisor]"));
    }

    #[test]
    fn test_parse_full_file() {
        let config: Config = toml::from_str(&format!(
            r#"
            [app]
            name = "my-app"
            version = "2.1.0"

            [supervisor]
            launch_recovery_when_background = false
            max_payload_bytes = 4096

            [[components]]
            id = "my_app::recovery"
            command = "/opt/my-app/bin/recovery"
            actions = ["{RECOVERY_SURFACE_ACTION}"]

            [[components]]
            id = "my_app::launcher"
            command = "/opt/my-app/bin/my-app"
            args = ["--safe-mode"]
            actions = ["{RESTART_TARGET_ACTION}"]
            "#
        ))
        .unwrap();

        assert_eq!(config.app.name, "my-app");
        assert!(!config.supervisor.launch_recovery_when_background);
        assert_eq!(config.supervisor.max_payload_bytes, 4096);
        assert_eq!(config.components.len(), 2);
        assert_eq!(config.components[1].args, vec!["--safe-mode"]);
        assert_eq!(config.supervisor_config().app_name, "my-app");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("crashguard.toml")).unwrap();
        assert_eq!(config.app.name, "application");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crashguard.toml");
        let mut config = Config::default();
        config.app.name = "saved".into();
        config.components.push(ComponentConfig {
            id: ComponentId::new("saved::main"),
            command: "/bin/true".into(),
            args: Vec::new(),
            actions: Vec::new(),
        });
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.app.name, "saved");
        assert_eq!(loaded.components, config.components);
    }

    #[test]
    fn test_invalid_budget_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crashguard.toml");
        std::fs::write(&path, "[supervisor]\nmax_payload_bytes = 8\n").unwrap();
        assert!(matches!(load_config_from(&path), Err(ConfigError::Invalid(_))));
    }
}
