use crate::config::schema::PilotConfig;
use crate::error::{PilotError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "PORTALPILOT_CONFIG";

/// Get the configuration file path based on platform
pub fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    let config_dir = if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|p| p.join("com.portalpilot.app"))
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        dirs::config_dir()
            .map(|p| p.join("portalpilot"))
            .unwrap_or_else(|| PathBuf::from("."))
    };

    config_dir.join("config.toml")
}

/// Load configuration from the default path, creating it if missing
pub fn load_config() -> Result<PilotConfig> {
    load_config_from(&get_config_path())
}

/// Load configuration from `path`, writing defaults there if it does not exist.
/// A file that exists but fails to parse is reported, never overwritten.
pub fn load_config_from(path: &Path) -> Result<PilotConfig> {
    if !path.exists() {
        tracing::info!("Config file not found at {:?}, creating default", path);
        let config = PilotConfig::default();
        save_config_to(&config, path)?;
        return Ok(config);
    }

    let content = fs::read_to_string(path).map_err(|e| {
        PilotError::Config(format!("Failed to read config from {:?}: {}", path, e))
    })?;

    let config: PilotConfig = toml::from_str(&content)?;

    tracing::info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Save configuration to the default path
pub fn save_config(config: &PilotConfig) -> Result<()> {
    save_config_to(config, &get_config_path())
}

pub fn save_config_to(config: &PilotConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                PilotError::Config(format!(
                    "Failed to create config directory {:?}: {}",
                    parent, e
                ))
            })?;
        }
    }

    let content = toml::to_string_pretty(config)?;

    fs::write(path, content).map_err(|e| {
        PilotError::Config(format!("Failed to write config to {:?}: {}", path, e))
    })?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("portalpilot-test-{}-{}", std::process::id(), name))
            .join("config.toml")
    }

    #[test]
    fn test_config_path() {
        let path = get_config_path();
        assert!(path.ends_with("config.toml"));
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let path = scratch_path("create");
        let _ = fs::remove_file(&path);

        let config = load_config_from(&path).unwrap();
        assert_eq!(config, PilotConfig::default());
        assert!(path.exists());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_broken_file_is_not_overwritten() {
        let path = scratch_path("broken");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[timing\npoll_interval_ms = ").unwrap();

        assert!(load_config_from(&path).is_err());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[timing\npoll_interval_ms = "
        );

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
