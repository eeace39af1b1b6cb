//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{CorridorConfig, StoreTarget};
use super::secret_string;
use crate::domain::errors::CorridorError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (`${VAR}` syntax)
/// 3. Parses the TOML into [`CorridorConfig`]
/// 4. Applies environment variable overrides (`CORRIDOR_*` prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`CorridorError::Configuration`] if the file is missing or
/// unreadable, a referenced variable is unset, parsing fails, or the result
/// does not validate.
///
/// # Examples
///
/// ```no_run
/// use corridor::config::loader::load_config;
///
/// let config = load_config("corridor.toml").expect("Failed to load config");
/// println!("raw snapshots in {}", config.paths.raw_dir);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<CorridorConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(CorridorError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        CorridorError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: CorridorConfig = toml::from_str(&contents)
        .map_err(|e| CorridorError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        CorridorError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| CorridorError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut missing_vars: Vec<String> = Vec::new();

    let lines: Vec<String> = input
        .lines()
        .map(|line| {
            if line.trim_start().starts_with('#') {
                return line.to_string();
            }
            re.replace_all(line, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    String::new()
                })
            })
            .into_owned()
        })
        .collect();

    if !missing_vars.is_empty() {
        return Err(CorridorError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(val) => val.parse().map(Some).map_err(|_| {
            CorridorError::Configuration(format!(
                "Environment variable {key} has invalid value '{val}'"
            ))
        }),
        Err(_) => Ok(None),
    }
}

/// Applies environment variable overrides using the `CORRIDOR_*` prefix
///
/// Variables follow the pattern `CORRIDOR_<SECTION>_<KEY>`, for example
/// `CORRIDOR_PATHS_RAW_DIR` or `CORRIDOR_QUERY_TIMEOUT_SECONDS`.
fn apply_env_overrides(config: &mut CorridorConfig) -> Result<()> {
    if let Some(val) = env_parse("CORRIDOR_APPLICATION_LOG_LEVEL")? {
        config.application.log_level = val;
    }

    if let Some(val) = env_parse("CORRIDOR_PATHS_RAW_DIR")? {
        config.paths.raw_dir = val;
    }
    if let Some(val) = env_parse("CORRIDOR_PATHS_STALE_LOCK_MINUTES")? {
        config.paths.stale_lock_minutes = val;
    }

    if let Some(val) = env_parse("CORRIDOR_INGEST_SOCRATA_BASE_URL")? {
        config.ingest.socrata_base_url = val;
    }
    if let Some(val) = env_parse("CORRIDOR_INGEST_SESHAT_BASE_URL")? {
        config.ingest.seshat_base_url = val;
    }
    if let Some(val) = env_parse("CORRIDOR_INGEST_TIMEOUT_SECONDS")? {
        config.ingest.timeout_seconds = val;
    }
    if let Some(val) = env_parse("CORRIDOR_INGEST_RETRY_MAX_RETRIES")? {
        config.ingest.retry.max_retries = val;
    }

    if let Some(val) = env_parse::<String>("CORRIDOR_STORE_TARGET")? {
        config.store_target = match val.to_lowercase().as_str() {
            "filesystem" => StoreTarget::Filesystem,
            "postgresql" => StoreTarget::PostgreSQL,
            other => {
                return Err(CorridorError::Configuration(format!(
                    "CORRIDOR_STORE_TARGET must be 'filesystem' or 'postgresql', got '{other}'"
                )))
            }
        };
    }

    if let Some(val) = env_parse("CORRIDOR_FILESYSTEM_ROOT")? {
        config.filesystem.root = val;
    }
    if let Some(val) = env_parse("CORRIDOR_FILESYSTEM_RETAIN_GENERATIONS")? {
        config.filesystem.retain_generations = val;
    }

    if let Some(val) = env_parse::<String>("CORRIDOR_POSTGRESQL_CONNECTION_STRING")? {
        match config.postgresql {
            Some(ref mut pg) => pg.connection_string = secret_string(val),
            None => {
                config.postgresql = Some(toml::from_str(&format!(
                    "connection_string = {}",
                    toml::Value::String(val)
                ))?)
            }
        }
    }
    if let Some(ref mut pg) = config.postgresql {
        if let Some(val) = env_parse("CORRIDOR_POSTGRESQL_MAX_CONNECTIONS")? {
            pg.max_connections = val;
        }
    }

    if let Some(val) = env_parse("CORRIDOR_VALIDATION_CAST_FAILURE_THRESHOLD")? {
        config.validation.cast_failure_threshold = val;
    }
    if let Some(val) = env_parse("CORRIDOR_VALIDATION_CAST_FAILURE_SEVERITY")? {
        config.validation.cast_failure_severity = val;
    }

    if let Some(val) = env_parse("CORRIDOR_QUERY_TIMEOUT_SECONDS")? {
        config.query.timeout_seconds = val;
    }
    if let Some(val) = env_parse("CORRIDOR_QUERY_MAX_ROW_BUDGET")? {
        config.query.max_row_budget = val;
    }

    if let Some(val) = env_parse("CORRIDOR_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = val;
    }
    if let Some(val) = env_parse("CORRIDOR_LOGGING_LOCAL_PATH")? {
        config.logging.local_path = val;
    }

    Ok(())
}
