//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Directory that may hold a `system_prompt.txt` override.
    pub prompts_path: PathBuf,
    pub openai_api_key: Option<String>,
    pub tutor_model: String,
    pub tutor_temperature: f32,
    pub tts_voice: String,
    pub audio_cache_dir: PathBuf,
    /// `None` allows any origin.
    pub cors_origin: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        // --- Load API Keys (as optional) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        // --- Load Adapter-specific Settings ---
        let tutor_model =
            std::env::var("TUTOR_MODEL").unwrap_or_else(|_| "gpt-4.1".to_string());
        let temperature_str =
            std::env::var("TUTOR_TEMPERATURE").unwrap_or_else(|_| "0.3".to_string());
        let tutor_temperature = temperature_str
            .parse::<f32>()
            .ok()
            .filter(|t| (0.0..=2.0).contains(t))
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "TUTOR_TEMPERATURE".to_string(),
                    format!("'{}' is not a number between 0 and 2", temperature_str),
                )
            })?;
        let tts_voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string());
        let audio_cache_dir = std::env::var("AUDIO_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./tmp"));

        let cors_origin = std::env::var("CORS_ORIGIN")
            .ok()
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty() && origin != "*");

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            prompts_path,
            openai_api_key,
            tutor_model,
            tutor_temperature,
            tts_voice,
            audio_cache_dir,
            cors_origin,
        })
    }

    /// Path of the optional instructional prompt override.
    pub fn system_prompt_file(&self) -> PathBuf {
        self.prompts_path.join("system_prompt.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: [&str; 10] = [
        "BIND_ADDRESS",
        "DATABASE_URL",
        "RUST_LOG",
        "PROMPTS_PATH",
        "OPENAI_API_KEY",
        "TUTOR_MODEL",
        "TUTOR_TEMPERATURE",
        "TTS_VOICE",
        "AUDIO_CACHE_DIR",
        "CORS_ORIGIN",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_with_only_database_url() {
        clear_env();
        env::set_var("DATABASE_URL", "postgres://localhost/tutor");

        let config = Config::from_env().unwrap();

        assert_eq!(config.bind_address, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.tutor_model, "gpt-4.1");
        assert!((config.tutor_temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.tts_voice, "alloy");
        assert_eq!(config.audio_cache_dir, PathBuf::from("./tmp"));
        assert_eq!(config.system_prompt_file(), PathBuf::from("./prompts/system_prompt.txt"));
        assert_eq!(config.cors_origin, None);
        assert_eq!(config.openai_api_key, None);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_missing_database_url() {
        clear_env();
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(var) if var == "DATABASE_URL"));
    }

    #[test]
    #[serial]
    fn test_overrides_are_read() {
        clear_env();
        env::set_var("DATABASE_URL", "postgres://db/tutor");
        env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
        env::set_var("TUTOR_MODEL", "gpt-4o");
        env::set_var("TUTOR_TEMPERATURE", "1.5");
        env::set_var("CORS_ORIGIN", "http://localhost:5173");

        let config = Config::from_env().unwrap();

        assert_eq!(config.bind_address.port(), 8080);
        assert_eq!(config.tutor_model, "gpt-4o");
        assert!((config.tutor_temperature - 1.5).abs() < f32::EPSILON);
        assert_eq!(config.cors_origin.as_deref(), Some("http://localhost:5173"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_temperature_out_of_range_is_invalid() {
        clear_env();
        env::set_var("DATABASE_URL", "postgres://db/tutor");
        for bad in ["2.5", "-0.1", "warm"] {
            env::set_var("TUTOR_TEMPERATURE", bad);
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "TUTOR_TEMPERATURE"));
        }
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_log_level() {
        clear_env();
        env::set_var("DATABASE_URL", "postgres://db/tutor");
        env::set_var("RUST_LOG", "chatty");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "RUST_LOG"));
        clear_env();
    }
}
