use std::env;
use tempfile::TempDir;
use weave::Settings;

#[test]
fn test_env_override_with_nested_keys() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("settings.toml");
    std::fs::write(&config_path, "[auto_commit]\ndebounce_secs = 120\n").unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("WEAVE_AUTO_COMMIT__DEBOUNCE_SECS", "45");
        env::set_var("WEAVE_AUTO_COMMIT__MAX_RETRIES", "7");
        env::set_var("WEAVE_SUMMARIZER__PROVIDER", "openai");
        env::set_var("WEAVE_WATCHER__DEBOUNCE_MS", "250");
    }

    let settings = Settings::load_from(&config_path).unwrap();

    unsafe {
        env::remove_var("WEAVE_AUTO_COMMIT__DEBOUNCE_SECS");
        env::remove_var("WEAVE_AUTO_COMMIT__MAX_RETRIES");
        env::remove_var("WEAVE_SUMMARIZER__PROVIDER");
        env::remove_var("WEAVE_WATCHER__DEBOUNCE_MS");
    }

    // Environment wins over the file
    assert_eq!(settings.auto_commit.debounce_secs, 45);
    assert_eq!(settings.auto_commit.max_retries, 7);
    assert!(settings.summarizer.is_enabled());
    assert_eq!(settings.watcher.debounce_ms, 250);
    assert!(settings.validate().is_ok());
}
