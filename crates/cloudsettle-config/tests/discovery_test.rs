use cloudsettle_config::{
    CONFIG_PATH_ENV, ConfigError, ENV_TAGS_ENV, env_tags, find_config_file, get_config_dir,
    load_settings,
};
use serial_test::serial;
use std::fs;
use std::time::Duration;

/// Run `f` with the working directory switched to `dir`
fn in_dir<R>(dir: &std::path::Path, f: impl FnOnce() -> R) -> R {
    let original = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir).unwrap();
    let result = f();
    std::env::set_current_dir(original).unwrap();
    result
}

#[test]
fn test_get_config_dir() {
    let config_dir = get_config_dir().unwrap();
    assert!(config_dir.ends_with("cloudsettle"));
    assert!(config_dir.exists());
}

#[test]
#[serial]
fn test_find_config_file_in_current_dir() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("cloudsettle.yaml"), "{}").unwrap();

    let found = in_dir(temp_dir.path(), find_config_file).unwrap();
    assert!(found.ends_with("cloudsettle.yaml"));
}

#[test]
#[serial]
fn test_local_file_wins() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("cloudsettle.yaml"), "{}").unwrap();
    fs::write(temp_dir.path().join(".cloudsettle.local.yaml"), "{}").unwrap();

    let found = in_dir(temp_dir.path(), find_config_file).unwrap();
    assert!(found.ends_with(".cloudsettle.local.yaml"));
}

#[test]
#[serial]
fn test_find_config_file_in_dot_dir() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dot_dir = temp_dir.path().join(".cloudsettle");
    fs::create_dir(&dot_dir).unwrap();
    fs::write(dot_dir.join("cloudsettle.yaml"), "{}").unwrap();

    let found = in_dir(temp_dir.path(), find_config_file).unwrap();
    assert!(found.ends_with(".cloudsettle/cloudsettle.yaml"));
}

#[test]
#[serial]
fn test_env_var_path() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("custom.yaml");
    fs::write(&config_path, "profiles:\n  subnet_create:\n    stability: 2\n").unwrap();

    unsafe {
        std::env::set_var(CONFIG_PATH_ENV, config_path.to_str().unwrap());
    }

    let found = find_config_file().unwrap();
    let settings = load_settings().unwrap();

    unsafe {
        std::env::remove_var(CONFIG_PATH_ENV);
    }

    assert_eq!(found, config_path);
    assert_eq!(settings.timing("subnet_create").stability, 2);
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    let temp_dir = tempfile::tempdir().unwrap();

    let (found, settings) = in_dir(temp_dir.path(), || (find_config_file(), load_settings()));

    // A global ~/.config/cloudsettle/cloudsettle.yaml on the test machine would be found
    if let Err(err) = found {
        assert!(matches!(err, ConfigError::ConfigFileNotFound));
        let timing = settings.unwrap().timing("instance_create");
        assert_eq!(timing.timeout, Duration::from_secs(600));
    }
}

#[test]
#[serial]
fn test_parse_error_names_the_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("cloudsettle.yaml"), "defaults: [1, 2").unwrap();

    let err = in_dir(temp_dir.path(), load_settings).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("cloudsettle.yaml"));
}

#[test]
#[serial]
fn test_env_tags() {
    unsafe {
        std::env::set_var(ENV_TAGS_ENV, "env:prod, owner:platform");
    }
    let tags = env_tags();
    unsafe {
        std::env::remove_var(ENV_TAGS_ENV);
    }

    assert_eq!(tags, vec!["env:prod", "owner:platform"]);
    assert!(env_tags().is_empty());
}
