use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::affinity::AffinityConfig;
use crate::engine::scorer::{ScorerConfig, ScoringWeights};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub optimization: OptimizationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

/// Every tunable the engines consume. The defaults mirror the engine-level
/// constants; deployments adjust them empirically rather than editing code.
#[derive(Clone, Debug)]
pub struct OptimizationConfig {
    pub window_days: i64,
    pub affinity_saturation_count: u32,
    pub affinity_score_weight: f64,
    pub affinity_max_score: f64,
    pub max_items_per_order: u32,
    pub rotation_weight: f64,
    pub distance_weight: f64,
    pub affinity_weight: f64,
    pub rotation_scale: f64,
    pub distance_scale: f64,
    pub relocation_threshold: f64,
    pub fast_zone: String,
    pub top_affinity_count: u32,
    pub job_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub window_days: Option<i64>,
    pub job_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://slotwise.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8090,
                health_check_port: 8091,
                graceful_shutdown_secs: 15,
            },
            optimization: OptimizationConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            window_days: 90,
            affinity_saturation_count: AffinityConfig::DEFAULT_SATURATION_COUNT,
            affinity_score_weight: AffinityConfig::DEFAULT_SCORE_WEIGHT,
            affinity_max_score: AffinityConfig::DEFAULT_MAX_SCORE,
            max_items_per_order: AffinityConfig::DEFAULT_MAX_ITEMS_PER_ORDER as u32,
            rotation_weight: ScoringWeights::DEFAULT_ROTATION,
            distance_weight: ScoringWeights::DEFAULT_DISTANCE,
            affinity_weight: ScoringWeights::DEFAULT_AFFINITY,
            rotation_scale: ScorerConfig::DEFAULT_ROTATION_SCALE,
            distance_scale: ScorerConfig::DEFAULT_DISTANCE_SCALE,
            relocation_threshold: ScorerConfig::DEFAULT_RELOCATION_THRESHOLD,
            fast_zone: ScorerConfig::DEFAULT_FAST_ZONE.to_string(),
            top_affinity_count: ScorerConfig::DEFAULT_TOP_AFFINITY_COUNT as u32,
            job_timeout_secs: 300,
        }
    }
}

impl OptimizationConfig {
    pub fn affinity_config(&self) -> AffinityConfig {
        AffinityConfig {
            saturation_count: self.affinity_saturation_count,
            score_weight: self.affinity_score_weight,
            max_score: self.affinity_max_score,
            max_items_per_order: self.max_items_per_order as usize,
        }
    }

    pub fn scorer_config(&self) -> ScorerConfig {
        ScorerConfig {
            weights: ScoringWeights {
                rotation: self.rotation_weight,
                distance: self.distance_weight,
                affinity: self.affinity_weight,
            },
            rotation_scale: self.rotation_scale,
            distance_scale: self.distance_scale,
            affinity_scale: self.affinity_max_score,
            relocation_threshold: self.relocation_threshold,
            fast_zone: self.fast_zone.chars().next().unwrap_or('A'),
            top_affinity_count: self.top_affinity_count as usize,
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("slotwise.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(optimization) = patch.optimization {
            let target = &mut self.optimization;
            if let Some(window_days) = optimization.window_days {
                target.window_days = window_days;
            }
            if let Some(value) = optimization.affinity_saturation_count {
                target.affinity_saturation_count = value;
            }
            if let Some(value) = optimization.affinity_score_weight {
                target.affinity_score_weight = value;
            }
            if let Some(value) = optimization.affinity_max_score {
                target.affinity_max_score = value;
            }
            if let Some(value) = optimization.max_items_per_order {
                target.max_items_per_order = value;
            }
            if let Some(value) = optimization.rotation_weight {
                target.rotation_weight = value;
            }
            if let Some(value) = optimization.distance_weight {
                target.distance_weight = value;
            }
            if let Some(value) = optimization.affinity_weight {
                target.affinity_weight = value;
            }
            if let Some(value) = optimization.rotation_scale {
                target.rotation_scale = value;
            }
            if let Some(value) = optimization.distance_scale {
                target.distance_scale = value;
            }
            if let Some(value) = optimization.relocation_threshold {
                target.relocation_threshold = value;
            }
            if let Some(value) = optimization.fast_zone {
                target.fast_zone = value;
            }
            if let Some(value) = optimization.top_affinity_count {
                target.top_affinity_count = value;
            }
            if let Some(value) = optimization.job_timeout_secs {
                target.job_timeout_secs = value;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SLOTWISE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SLOTWISE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("SLOTWISE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SLOTWISE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SLOTWISE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SLOTWISE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SLOTWISE_SERVER_PORT") {
            self.server.port = parse_u16("SLOTWISE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SLOTWISE_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("SLOTWISE_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("SLOTWISE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SLOTWISE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("SLOTWISE_OPTIMIZATION_WINDOW_DAYS") {
            self.optimization.window_days = parse_i64("SLOTWISE_OPTIMIZATION_WINDOW_DAYS", &value)?;
        }
        if let Some(value) = read_env("SLOTWISE_OPTIMIZATION_JOB_TIMEOUT_SECS") {
            self.optimization.job_timeout_secs =
                parse_u64("SLOTWISE_OPTIMIZATION_JOB_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SLOTWISE_OPTIMIZATION_RELOCATION_THRESHOLD") {
            self.optimization.relocation_threshold =
                parse_f64("SLOTWISE_OPTIMIZATION_RELOCATION_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("SLOTWISE_OPTIMIZATION_FAST_ZONE") {
            self.optimization.fast_zone = value;
        }

        let log_level =
            read_env("SLOTWISE_LOGGING_LEVEL").or_else(|| read_env("SLOTWISE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SLOTWISE_LOGGING_FORMAT").or_else(|| read_env("SLOTWISE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(window_days) = overrides.window_days {
            self.optimization.window_days = window_days;
        }
        if let Some(job_timeout_secs) = overrides.job_timeout_secs {
            self.optimization.job_timeout_secs = job_timeout_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_optimization(&self.optimization)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("slotwise.toml"), PathBuf::from("config/slotwise.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.port == server.health_check_port {
        return Err(ConfigError::Validation(
            "server.port and server.health_check_port must differ".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_optimization(optimization: &OptimizationConfig) -> Result<(), ConfigError> {
    if optimization.window_days < 1 || optimization.window_days > 365 {
        return Err(ConfigError::Validation(
            "optimization.window_days must be in range 1..=365".to_string(),
        ));
    }

    if optimization.affinity_saturation_count == 0 {
        return Err(ConfigError::Validation(
            "optimization.affinity_saturation_count must be greater than zero".to_string(),
        ));
    }

    if optimization.affinity_score_weight <= 0.0 || optimization.affinity_max_score <= 0.0 {
        return Err(ConfigError::Validation(
            "optimization affinity score weight and max score must be positive".to_string(),
        ));
    }

    if optimization.max_items_per_order < 2 {
        return Err(ConfigError::Validation(
            "optimization.max_items_per_order must be at least 2".to_string(),
        ));
    }

    for (name, weight) in [
        ("rotation_weight", optimization.rotation_weight),
        ("distance_weight", optimization.distance_weight),
        ("affinity_weight", optimization.affinity_weight),
    ] {
        if !(0.0..=1.0).contains(&weight) {
            return Err(ConfigError::Validation(format!(
                "optimization.{name} must be in range 0.0..=1.0"
            )));
        }
    }

    if optimization.rotation_scale <= 0.0 || optimization.distance_scale <= 0.0 {
        return Err(ConfigError::Validation(
            "optimization rotation and distance scales must be positive".to_string(),
        ));
    }

    if !(0.0..=100.0).contains(&optimization.relocation_threshold) {
        return Err(ConfigError::Validation(
            "optimization.relocation_threshold must be in range 0.0..=100.0".to_string(),
        ));
    }

    let zone_ok = optimization.fast_zone.len() == 1
        && optimization.fast_zone.chars().all(|zone| zone.is_ascii_alphabetic());
    if !zone_ok {
        return Err(ConfigError::Validation(
            "optimization.fast_zone must be a single zone letter".to_string(),
        ));
    }

    if optimization.top_affinity_count == 0 {
        return Err(ConfigError::Validation(
            "optimization.top_affinity_count must be greater than zero".to_string(),
        ));
    }

    if optimization.job_timeout_secs == 0 || optimization.job_timeout_secs > 86_400 {
        return Err(ConfigError::Validation(
            "optimization.job_timeout_secs must be in range 1..=86400".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    optimization: Option<OptimizationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OptimizationPatch {
    window_days: Option<i64>,
    affinity_saturation_count: Option<u32>,
    affinity_score_weight: Option<f64>,
    affinity_max_score: Option<f64>,
    max_items_per_order: Option<u32>,
    rotation_weight: Option<f64>,
    distance_weight: Option<f64>,
    affinity_weight: Option<f64>,
    rotation_scale: Option<f64>,
    distance_scale: Option<f64>,
    relocation_threshold: Option<f64>,
    fast_zone: Option<String>,
    top_affinity_count: Option<u32>,
    job_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
