//! Player configuration loading through the shared resolver

use serial_test::serial;
use std::io::Write;
use std::time::Duration;
use xrp_common::config::resolve_config_path;
use xrp_common::FadeCurve;
use xrp_player::config::CONFIG_ENV_VAR;
use xrp_player::PlayerConfig;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_env_var_selects_file() {
    let file = write_config(
        r#"
        [output]
        device = "USB DAC"

        [playback]
        initial_volume = 0.5
        seek_fade_ms = 60
        seek_fade_out_curve = "linear"
        "#,
    );
    std::env::set_var(CONFIG_ENV_VAR, file.path());

    let path = resolve_config_path(None, CONFIG_ENV_VAR);
    let config = PlayerConfig::load(path.as_deref()).unwrap();
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.output.device.as_deref(), Some("USB DAC"));
    assert_eq!(config.playback.initial_volume, 0.5);
    assert_eq!(config.playback.seek_fade_duration(), Duration::from_millis(60));
    assert_eq!(config.playback.seek_fade_out_curve, FadeCurve::Linear);
    assert_eq!(config.playback.seek_fade_in_curve, FadeCurve::Exponential);
}

#[test]
fn test_load_clamps_out_of_range_values() {
    let file = write_config(
        r#"
        [playback]
        initial_volume = -2.0
        position_interval_ms = 60000
        event_capacity = 0
        "#,
    );

    let config = PlayerConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.playback.initial_volume, 0.0);
    assert_eq!(config.playback.position_interval_ms, 5000);
    assert_eq!(config.playback.event_capacity, 256);
}

#[test]
fn test_unreadable_file_is_an_error() {
    let file = write_config("[playback\ninitial_volume = ");
    assert!(PlayerConfig::load(Some(file.path())).is_err());
}
