use serde_json::json;

use slotwise_core::config::{AppConfig, LoadOptions, LogFormat};

/// Prints the effective configuration after defaults, file, and environment
/// layers have been applied.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return json!({
                "command": "config",
                "status": "error",
                "error_class": "config_validation",
                "message": format!("configuration issue: {error}"),
            })
            .to_string();
        }
    };

    let format = match config.logging.format {
        LogFormat::Compact => "compact",
        LogFormat::Pretty => "pretty",
        LogFormat::Json => "json",
    };

    let payload = json!({
        "command": "config",
        "status": "ok",
        "effective": {
            "database": {
                "url": config.database.url,
                "max_connections": config.database.max_connections,
                "timeout_secs": config.database.timeout_secs,
            },
            "server": {
                "bind_address": config.server.bind_address,
                "port": config.server.port,
                "health_check_port": config.server.health_check_port,
                "graceful_shutdown_secs": config.server.graceful_shutdown_secs,
            },
            "optimization": {
                "window_days": config.optimization.window_days,
                "affinity_saturation_count": config.optimization.affinity_saturation_count,
                "affinity_score_weight": config.optimization.affinity_score_weight,
                "affinity_max_score": config.optimization.affinity_max_score,
                "max_items_per_order": config.optimization.max_items_per_order,
                "rotation_weight": config.optimization.rotation_weight,
                "distance_weight": config.optimization.distance_weight,
                "affinity_weight": config.optimization.affinity_weight,
                "relocation_threshold": config.optimization.relocation_threshold,
                "fast_zone": config.optimization.fast_zone,
                "job_timeout_secs": config.optimization.job_timeout_secs,
            },
            "logging": {
                "level": config.logging.level,
                "format": format,
            },
        },
    });

    serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
}
