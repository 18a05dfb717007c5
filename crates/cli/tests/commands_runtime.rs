use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use slotwise_cli::commands::{migrate, optimize, seed};

// In-memory SQLite needs a single pooled connection so every statement in a
// command sees the same database.
const MEMORY_DB: &[(&str, &str)] =
    &[("SLOTWISE_DATABASE_URL", "sqlite::memory:"), ("SLOTWISE_DATABASE_MAX_CONNECTIONS", "1")];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(MEMORY_DB, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_with_bad_database_url() {
    with_env(&[("SLOTWISE_DATABASE_URL", "postgres://nope")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_loads_and_verifies_fixture_data() {
    with_env(MEMORY_DB, || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected successful seed run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        assert!(payload["message"].as_str().expect("message").contains("wh-main"));
    });
}

#[test]
fn optimize_rejects_unknown_job_type_before_touching_the_database() {
    with_env(&[], || {
        let result = optimize::run("wh-main", "teleport");
        assert_eq!(result.exit_code, 2, "expected invalid argument failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "optimize");
        assert_eq!(payload["error_class"], "invalid_argument");
    });
}

#[test]
fn optimize_runs_a_layout_job_against_an_empty_warehouse() {
    with_env(MEMORY_DB, || {
        let result = optimize::run("wh-empty", "layout");
        assert_eq!(result.exit_code, 0, "empty warehouse still completes: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "optimize");
        assert_eq!(payload["status"], "ok");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SLOTWISE_DATABASE_URL",
        "SLOTWISE_DATABASE_MAX_CONNECTIONS",
        "SLOTWISE_DATABASE_TIMEOUT_SECS",
        "SLOTWISE_SERVER_BIND_ADDRESS",
        "SLOTWISE_SERVER_PORT",
        "SLOTWISE_SERVER_HEALTH_CHECK_PORT",
        "SLOTWISE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "SLOTWISE_OPTIMIZATION_WINDOW_DAYS",
        "SLOTWISE_OPTIMIZATION_JOB_TIMEOUT_SECS",
        "SLOTWISE_OPTIMIZATION_RELOCATION_THRESHOLD",
        "SLOTWISE_OPTIMIZATION_FAST_ZONE",
        "SLOTWISE_LOGGING_LEVEL",
        "SLOTWISE_LOGGING_FORMAT",
        "SLOTWISE_LOG_LEVEL",
        "SLOTWISE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
