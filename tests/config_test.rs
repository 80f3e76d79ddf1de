//! Configuration loading tests

use std::io::Write;

use serial_test::serial;

use harvester::config::{Config, QuotaBackend};

const VARS: &[&str] = &[
    "HARVESTER_APP_ID",
    "HARVESTER_SITES",
    "HARVESTER_REQUESTS_PER_DAY",
    "HARVESTER_TIMEZONE",
    "HARVESTER_QUOTA_BACKEND",
    "HARVESTER_CONCURRENCY",
    "REDIS_URL",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config.marketplace.sites, vec!["EBAY-US"]);
    assert_eq!(config.quota.requests_per_day, 4900);
    assert_eq!(config.quota.history_days, 90);
    assert_eq!(config.quota.backend, QuotaBackend::Sqlite);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_env();
    std::env::set_var("HARVESTER_APP_ID", "my-app");
    std::env::set_var("HARVESTER_SITES", "EBAY-US, EBAY-GB,,EBAY-DE");
    std::env::set_var("HARVESTER_REQUESTS_PER_DAY", "1000");
    std::env::set_var("HARVESTER_TIMEZONE", "Europe/London");
    std::env::set_var("HARVESTER_QUOTA_BACKEND", "Redis");
    std::env::set_var("REDIS_URL", "redis://cache:6379");

    let config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(config.marketplace.app_id, "my-app");
    assert_eq!(config.marketplace.sites, vec!["EBAY-US", "EBAY-GB", "EBAY-DE"]);
    assert_eq!(config.quota.requests_per_day, 1000);
    assert_eq!(config.quota.backend, QuotaBackend::Redis);
    assert_eq!(config.redis.url, "redis://cache:6379");
    assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::London);
}

#[test]
#[serial]
fn test_from_env_rejects_unknown_backend() {
    clear_env();
    std::env::set_var("HARVESTER_QUOTA_BACKEND", "postgres");

    let result = Config::from_env();
    clear_env();

    assert!(result.is_err());
}

#[test]
#[serial]
fn test_invalid_env_values_are_caught_by_validation() {
    clear_env();
    std::env::set_var("HARVESTER_SITES", "EBAY-MARS");
    std::env::set_var("HARVESTER_CONCURRENCY", "0");

    let config = Config::from_env().unwrap();
    clear_env();

    assert!(config.validate().is_err());
}

#[test]
fn test_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[marketplace]
app_id = "file-app"
sites = ["EBAY-FR", "EBAY-IT"]

[quota]
requests_per_day = 250
backend = "redis"

[worker]
concurrency = 8
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.marketplace.app_id, "file-app");
    assert_eq!(config.marketplace.sites, vec!["EBAY-FR", "EBAY-IT"]);
    assert_eq!(config.quota.requests_per_day, 250);
    assert_eq!(config.quota.backend, QuotaBackend::Redis);
    assert_eq!(config.worker.concurrency, 8);
    assert_eq!(config.quota.timezone, "America/Los_Angeles");
    assert!(config.validate().is_ok());
}

#[test]
fn test_from_missing_file_fails() {
    assert!(Config::from_file(std::path::Path::new("/nonexistent/harvester.toml")).is_err());
}
