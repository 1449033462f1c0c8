//! Integration tests for config

use sprig_config::*;
use std::io::Write;
use std::sync::Mutex;
use tempfile::NamedTempFile;

// Mutex to ensure env var tests don't run concurrently
static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

#[tokio::test]
async fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(
        temp_file,
        r#"
[general]
jobs = 4
color = "never"

[resolver]
compilers = ["clang", "gcc"]
max_steps = 500

[resolver.providers]
mpi = ["openmpi"]

[install]
root = "/srv/sprig"
fail_fast = true
max_parallelism = 3
"#
    )
    .unwrap();

    let config = Config::load_from_file(temp_file.path()).await.unwrap();
    assert_eq!(config.general.jobs, 4);
    assert_eq!(config.general.color, ColorChoice::Never);
    assert_eq!(config.resolver.compilers, ["clang", "gcc"]);
    assert_eq!(config.resolver.providers["mpi"], ["openmpi"]);
    assert_eq!(config.resolver.max_steps, 500);
    assert!(config.install.fail_fast);
    assert_eq!(config.max_parallelism(), 3);
    // unset fields keep their defaults
    assert_eq!(config.install.lock_timeout_secs, 600);
    assert_eq!(config.mirror_path(), std::path::Path::new("/srv/sprig/mirror"));
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let err = Config::load_from_file(std::path::Path::new("/nonexistent/sprig.toml"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        sprig_errors::Error::Config(sprig_errors::ConfigError::NotFound { .. })
    ));
}

#[test]
fn test_unknown_color_is_parse_error() {
    assert!(Config::from_toml("[general]\ncolor = \"sometimes\"\n").is_err());
}

#[test]
fn test_merge_process_env() {
    let _guard = ENV_TEST_MUTEX.lock().unwrap();

    std::env::set_var("SPRIG_COLOR", "always");
    std::env::set_var("SPRIG_RECIPES", "/srv/recipes");

    let mut config = Config::default();
    config.merge_env().unwrap();

    assert_eq!(config.general.color, ColorChoice::Always);
    assert_eq!(
        config.recipes_path(),
        std::path::PathBuf::from("/srv/recipes")
    );

    std::env::remove_var("SPRIG_COLOR");
    std::env::remove_var("SPRIG_RECIPES");
}
