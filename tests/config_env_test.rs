use std::env;
use tempfile::TempDir;
use treesync::Settings;

#[test]
fn test_env_overrides_file_and_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("settings.toml");
    std::fs::write(&config_path, "sync_queue_size = 16\nevent_log_size = 7\n").unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("TREESYNC_SYNC_QUEUE_SIZE", "64");
        env::set_var("TREESYNC_LOGGING__DEFAULT", "debug");
    }

    let settings = Settings::load(Some(&config_path)).unwrap();

    unsafe {
        env::remove_var("TREESYNC_SYNC_QUEUE_SIZE");
        env::remove_var("TREESYNC_LOGGING__DEFAULT");
    }

    assert_eq!(settings.sync_queue_size, 64, "env beats file");
    assert_eq!(settings.event_log_size, 7, "file beats defaults");
    assert_eq!(settings.logging.default, "debug");
    assert_eq!(settings.ignore_patterns.len(), 4);
}
