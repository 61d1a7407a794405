use crate::app_config::{AppConfig, Device, Environment, ExtractorSettings, RuntimeKind};
use crate::ConfigError;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const DEFAULT_CLASS_NAMES: &str = "name,price,weight,discount,date";
const DEFAULT_EXTRACTOR_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_EXTRACTOR_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation are decoupled from the real environment so tests
/// can drive them with a plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_positive_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        match parse_usize(var, default)? {
            0 => Err(invalid(var, "must be at least 1".to_string())),
            n => Ok(n),
        }
    };

    let parse_unit_f32 = |var: &str, default: &str| -> Result<f32, ConfigError> {
        let value = or_default(var, default)
            .parse::<f32>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if (0.0..=1.0).contains(&value) {
            Ok(value)
        } else {
            Err(invalid(var, format!("{value} is outside [0, 1]")))
        }
    };

    let env = parse_environment(&or_default("PROSPEKT_ENV", "development"))?;
    let bind_addr = parse_addr("PROSPEKT_BIND_ADDR", "0.0.0.0:8000")?;
    let log_level = or_default("PROSPEKT_LOG_LEVEL", "info");
    let retailers_path = PathBuf::from(or_default(
        "PROSPEKT_RETAILERS_PATH",
        "./config/retailers.yaml",
    ));

    let model_path = PathBuf::from(or_default("PROSPEKT_MODEL_PATH", "./models/best.onnx"));
    let model_input_size = parse_u32("PROSPEKT_MODEL_INPUT_SIZE", "640")?;
    if model_input_size == 0 || model_input_size % 32 != 0 {
        return Err(invalid(
            "PROSPEKT_MODEL_INPUT_SIZE",
            format!("{model_input_size} must be a positive multiple of 32"),
        ));
    }
    let class_names = parse_class_names(&or_default("PROSPEKT_CLASS_NAMES", DEFAULT_CLASS_NAMES))?;
    let runtime = parse_runtime(&or_default("PROSPEKT_RUNTIME", "portable"))?;
    let device = parse_device(&or_default("PROSPEKT_DEVICE", "cpu"))?;
    if runtime == RuntimeKind::Portable && device != Device::Cpu {
        return Err(invalid(
            "PROSPEKT_DEVICE",
            format!("device {device} requires PROSPEKT_RUNTIME=native"),
        ));
    }

    let confidence_threshold = parse_unit_f32("PROSPEKT_CONFIDENCE_THRESHOLD", "0.25")?;
    let iou_threshold = parse_unit_f32("PROSPEKT_IOU_THRESHOLD", "0.7")?;
    let grouping_proximity = parse_unit_f32("PROSPEKT_GROUPING_PROXIMITY", "0.075")?;
    let max_concurrent_inferences = parse_positive_usize("PROSPEKT_MAX_CONCURRENT_INFERENCES", "1")?;

    let scraper_request_timeout_secs = parse_u64("PROSPEKT_SCRAPER_REQUEST_TIMEOUT_SECS", "30")?;
    let scraper_user_agent = or_default("PROSPEKT_SCRAPER_USER_AGENT", DEFAULT_USER_AGENT);
    let scraper_max_concurrent_pages = parse_positive_usize("PROSPEKT_SCRAPER_MAX_CONCURRENT_PAGES", "4")?;
    let scraper_max_retries = parse_u32("PROSPEKT_SCRAPER_MAX_RETRIES", "3")?;
    let scraper_retry_backoff_base_ms = parse_u64("PROSPEKT_SCRAPER_RETRY_BACKOFF_BASE_MS", "500")?;
    let request_timeout_secs = parse_u64("PROSPEKT_REQUEST_TIMEOUT_SECS", "300")?;
    if request_timeout_secs == 0 {
        return Err(invalid(
            "PROSPEKT_REQUEST_TIMEOUT_SECS",
            "must be at least 1".to_string(),
        ));
    }

    let extractor = match parse_bool(
        "PROSPEKT_EXTRACTOR_ENABLED",
        &or_default("PROSPEKT_EXTRACTOR_ENABLED", "false"),
    )? {
        false => None,
        true => {
            let api_key = lookup("PROSPEKT_EXTRACTOR_API_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    invalid(
                        "PROSPEKT_EXTRACTOR_API_KEY",
                        "required when PROSPEKT_EXTRACTOR_ENABLED=true".to_string(),
                    )
                })?;
            Some(ExtractorSettings {
                api_key,
                model: or_default("PROSPEKT_EXTRACTOR_MODEL", DEFAULT_EXTRACTOR_MODEL),
                base_url: or_default("PROSPEKT_EXTRACTOR_BASE_URL", DEFAULT_EXTRACTOR_BASE_URL)
                    .trim_end_matches('/')
                    .to_string(),
                min_interval_ms: parse_u64("PROSPEKT_EXTRACTOR_MIN_INTERVAL_MS", "500")?,
            })
        }
    };

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        retailers_path,
        model_path,
        model_input_size,
        class_names,
        runtime,
        device,
        confidence_threshold,
        iou_threshold,
        grouping_proximity,
        max_concurrent_inferences,
        scraper_request_timeout_secs,
        scraper_user_agent,
        scraper_max_concurrent_pages,
        scraper_max_retries,
        scraper_retry_backoff_base_ms,
        request_timeout_secs,
        extractor,
    })
}

fn parse_bool(var: &str, s: &str) -> Result<bool, ConfigError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: format!("expected true or false, got '{other}'"),
        }),
    }
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PROSPEKT_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

fn parse_runtime(s: &str) -> Result<RuntimeKind, ConfigError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "portable" | "tract" => Ok(RuntimeKind::Portable),
        "native" | "onnxruntime" | "ort" => Ok(RuntimeKind::Native),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PROSPEKT_RUNTIME".to_string(),
            reason: format!("unknown runtime '{other}'; expected portable or native"),
        }),
    }
}

fn parse_device(s: &str) -> Result<Device, ConfigError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "cpu" => Ok(Device::Cpu),
        "cuda" | "gpu" => Ok(Device::Cuda),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PROSPEKT_DEVICE".to_string(),
            reason: format!("unknown device '{other}'; expected cpu or cuda"),
        }),
    }
}

fn parse_class_names(s: &str) -> Result<Vec<String>, ConfigError> {
    let names: Vec<String> = s
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(ToOwned::to_owned)
        .collect();
    if names.is_empty() {
        return Err(ConfigError::InvalidEnvVar {
            var: "PROSPEKT_CLASS_NAMES".to_string(),
            reason: "at least one class name is required".to_string(),
        });
    }
    Ok(names)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
