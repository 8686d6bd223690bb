//! Configuration file resolution and loading

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the per-user configuration directory
pub const APP_DIR_NAME: &str = "xrp";

/// Configuration file name inside the application directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration file resolution, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Per-user config file (`<config_dir>/xrp/config.toml`), if it exists
///
/// Returns `None` when no file applies; callers then use built-in defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    default_config_path().filter(|p| p.exists())
}

/// Platform default location of the configuration file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load a TOML configuration file, or defaults when `path` is `None`
///
/// A path that was explicitly resolved but cannot be read is an error; a
/// missing file is only tolerated when no path was resolved at all.
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        debug!("No configuration file, using defaults");
        return Ok(T::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let value = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serial_test::serial;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        name: String,
        level: u32,
    }

    #[test]
    #[serial]
    fn test_cli_argument_wins() {
        std::env::set_var("XRP_TEST_CONFIG", "/from/env.toml");
        let resolved = resolve_config_path(Some(Path::new("/from/cli.toml")), "XRP_TEST_CONFIG");
        assert_eq!(resolved, Some(PathBuf::from("/from/cli.toml")));
        std::env::remove_var("XRP_TEST_CONFIG");
    }

    #[test]
    #[serial]
    fn test_env_var_used_without_cli() {
        std::env::set_var("XRP_TEST_CONFIG", "/from/env.toml");
        let resolved = resolve_config_path(None, "XRP_TEST_CONFIG");
        assert_eq!(resolved, Some(PathBuf::from("/from/env.toml")));
        std::env::remove_var("XRP_TEST_CONFIG");
    }

    #[test]
    fn test_load_defaults_without_path() {
        let sample: Sample = load_toml(None).unwrap();
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"kitchen\"\nlevel = 3").unwrap();

        let sample: Sample = load_toml(Some(file.path())).unwrap();
        assert_eq!(sample.name, "kitchen");
        assert_eq!(sample.level, 3);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result: Result<Sample> = load_toml(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "level = \"not a number\"").unwrap();
        let result: Result<Sample> = load_toml(Some(file.path()));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
