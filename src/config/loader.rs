use crate::config::settings::ZimuConfig;
use crate::error::{Result, ZimuError};
use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "zimu")
        .ok_or_else(|| ZimuError::Config("Could not determine home directory".to_string()))
}

/// XDG config directory, e.g. `~/.config/zimu`
pub fn config_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

/// XDG data directory holding the transcript database
pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// Get config file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get database path, honoring the storage override
pub fn database_path(config: &ZimuConfig) -> Result<PathBuf> {
    match &config.storage.database_path {
        Some(path) => Ok(path.clone()),
        None => Ok(data_dir()?.join("zimu.db")),
    }
}

/// Load config from file, creating default if not exists
pub fn load_config() -> Result<ZimuConfig> {
    let path = config_path()?;

    if !path.exists() {
        let config = ZimuConfig::default();
        save_config(&config)?;
        return Ok(config);
    }

    let content = fs::read_to_string(&path)?;
    let config: ZimuConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save config to file
pub fn save_config(config: &ZimuConfig) -> Result<()> {
    let path = config_path()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)?;
    fs::write(&path, content)?;
    Ok(())
}

pub fn load_config_with_env() -> Result<ZimuConfig> {
    let mut config = load_config()?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

/// Layers environment variables over a loaded config. `lookup` is injected
/// so tests never touch the process environment.
pub fn apply_env_overrides<F>(config: &mut ZimuConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup("ZIMU_GEMINI_API_KEY").or_else(|| lookup("GEMINI_API_KEY")) {
        config.model.api_key = Some(key);
    }
    if let Some(model) = lookup("ZIMU_MODEL") {
        config.model.model = model;
    }
    if let Some(url) = lookup("ZIMU_SERVER_URL") {
        config.scheduler.server_url = url;
    }
    if let Some(port) = lookup("ZIMU_PORT") {
        config.server.port = port
            .parse()
            .map_err(|_| ZimuError::Config(format!("Invalid ZIMU_PORT: {}", port)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_serializes() {
        let config = ZimuConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[server]"));
        assert!(toml.contains("[model]"));
        assert!(toml.contains("[scheduler]"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = ZimuConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: ZimuConfig = toml::from_str(&toml).unwrap();
        assert_eq!(config.scheduler.server_url, parsed.scheduler.server_url);
        assert_eq!(config.model.model, parsed.model.model);
    }

    #[test]
    fn test_config_paths_share_project_dirs() {
        if let (Ok(dir), Ok(path)) = (config_dir(), config_path()) {
            assert_eq!(path, dir.join("config.toml"));
        }
        if let Ok(data) = data_dir() {
            assert_eq!(
                database_path(&ZimuConfig::default()).unwrap(),
                data.join("zimu.db")
            );
        }
    }

    #[test]
    fn test_database_path_override() {
        let mut config = ZimuConfig::default();
        config.storage.database_path = Some(PathBuf::from("/tmp/zimu-test.db"));
        assert_eq!(
            database_path(&config).unwrap(),
            PathBuf::from("/tmp/zimu-test.db")
        );
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GEMINI_API_KEY", "generic"),
            ("ZIMU_GEMINI_API_KEY", "specific"),
            ("ZIMU_SERVER_URL", "http://10.0.0.2:8080"),
            ("ZIMU_PORT", "8080"),
        ]);
        let mut config = ZimuConfig::default();
        apply_env_overrides(&mut config, |name| env.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.model.api_key.as_deref(), Some("specific"));
        assert_eq!(config.scheduler.server_url, "http://10.0.0.2:8080");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.model.model, "gemini-2.5-pro");
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = ZimuConfig::default();
        let result = apply_env_overrides(&mut config, |name| {
            (name == "ZIMU_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(ZimuError::Config(_))));
    }
}
