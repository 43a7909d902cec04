use std::collections::HashMap;
use std::path::Path;
use tasker_batch::config::BatchConfig;
use tasker_batch::ConfigLoader;

const SHIPPED_CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/config/tasker-batch.toml");

#[test]
fn test_shipped_config_matches_defaults() {
    let config = ConfigLoader::load_with_env(Some(Path::new(SHIPPED_CONFIG)), HashMap::new())
        .expect("shipped configuration should load");
    assert_eq!(config, BatchConfig::default());
}

#[test]
fn test_environment_overrides_shipped_config() {
    let mut environment = HashMap::new();
    environment.insert("TASKER_BATCH__RETRY__MAX_ATTEMPTS".to_string(), "5".to_string());
    environment.insert("TASKER_BATCH__WORKER__CONCURRENCY".to_string(), "4".to_string());

    let config =
        ConfigLoader::load_with_env(Some(Path::new(SHIPPED_CONFIG)), environment).unwrap();
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.worker.concurrency, 4);
    assert_eq!(config.partition.default_chunk_size, 500);
}
