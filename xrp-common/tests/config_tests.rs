//! Configuration path resolution
//!
//! Tests that touch environment variables are marked `#[serial]` so they
//! never race each other.

use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use xrp_common::config::{default_config_path, resolve_config_path, APP_DIR_NAME, CONFIG_FILE_NAME};

const VAR: &str = "XRP_COMMON_TEST_CONFIG";

#[test]
fn test_default_path_layout() {
    // Headless CI machines may have no config directory at all
    if let Some(path) = default_config_path() {
        assert!(path.ends_with(Path::new(APP_DIR_NAME).join(CONFIG_FILE_NAME)));
    }
}

#[test]
#[serial]
fn test_priority_cli_then_env() {
    env::set_var(VAR, "/etc/xrp/env.toml");

    assert_eq!(
        resolve_config_path(Some(Path::new("cli.toml")), VAR),
        Some(PathBuf::from("cli.toml"))
    );
    assert_eq!(
        resolve_config_path(None, VAR),
        Some(PathBuf::from("/etc/xrp/env.toml"))
    );

    env::remove_var(VAR);
}

#[test]
#[serial]
fn test_empty_env_var_is_ignored() {
    env::set_var(VAR, "");

    let resolved = resolve_config_path(None, VAR);
    // Falls through to the per-user file, which is only returned if present
    assert_eq!(resolved, default_config_path().filter(|p| p.exists()));

    env::remove_var(VAR);
}
