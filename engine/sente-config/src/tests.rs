use crate::{apply_env_overrides, CentralConfig, ConfigError};

#[test]
fn default_config_is_valid() {
    let config = CentralConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.search.num_threads, 2);
    assert_eq!(config.logging.level, "info");
    assert!(!config.logging.is_json());
}

#[test]
fn parses_partial_toml_with_defaults() {
    let config: CentralConfig = toml::from_str(
        r#"
        [search]
        num_threads = 8
        max_playouts = 1600

        [logging]
        format = "json"
        "#,
    )
    .unwrap();

    assert_eq!(config.search.num_threads, 8);
    assert_eq!(config.search.max_playouts, 1600);
    // Untouched fields fall back to defaults.
    assert!((config.search.puct - 0.8).abs() < 1e-6);
    assert!(config.logging.is_json());
    assert_eq!(config.network.batch_size, 8);
}

#[test]
fn validate_rejects_zero_threads() {
    let mut config = CentralConfig::default();
    config.search.num_threads = 0;
    assert_eq!(config.validate(), Err(ConfigError::NoThreads));
}

#[test]
fn validate_rejects_tiny_cache() {
    let mut config = CentralConfig::default();
    config.network.cache_bytes = 1024;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::CacheTooSmall { requested: 1024, .. })
    ));
}

#[test]
fn validate_rejects_unknown_log_format() {
    let mut config = CentralConfig::default();
    config.logging.format = "yaml".into();
    assert_eq!(
        config.validate(),
        Err(ConfigError::BadLogFormat("yaml".into()))
    );
}

#[test]
fn env_overrides_take_effect() {
    // Serialised by the unique variable name; no other test touches it.
    std::env::set_var("SENTE_SEARCH_PUCT", "1.5");
    let config = apply_env_overrides(CentralConfig::default());
    std::env::remove_var("SENTE_SEARCH_PUCT");
    assert!((config.search.puct - 1.5).abs() < 1e-6);
}

#[test]
fn bad_env_override_is_ignored() {
    std::env::set_var("SENTE_SEARCH_MAX_VISITS", "not-a-number");
    let config = apply_env_overrides(CentralConfig::default());
    std::env::remove_var("SENTE_SEARCH_MAX_VISITS");
    assert_eq!(config.search.max_visits, u32::MAX / 2);
}
