use secrecy::SecretString;
use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Server-side credential for the upstream realtime service. Never leaves
    /// the relay.
    pub openai_api_key: SecretString,
    pub realtime_model: String,
    pub upstream_url: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8787".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(|k| SecretString::new(k.into()))
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let realtime_model = std::env::var("REALTIME_MODEL")
            .unwrap_or_else(|_| "gpt-4o-realtime-preview-2024-12-17".to_string());

        let upstream_url = std::env::var("UPSTREAM_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1/realtime".to_string());
        if !(upstream_url.starts_with("http://") || upstream_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(
                "UPSTREAM_URL".to_string(),
                format!("'{}' is not an http(s) URL", upstream_url),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            realtime_model,
            upstream_url,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("OPENAI_API_KEY");
            env::remove_var("REALTIME_MODEL");
            env::remove_var("UPSTREAM_URL");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-openai-key");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8787");
        assert_eq!(config.openai_api_key.expose_secret(), "test-openai-key");
        assert_eq!(config.realtime_model, "gpt-4o-realtime-preview-2024-12-17");
        assert_eq!(config.upstream_url, "https://api.openai.com/v1/realtime");
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:9000");
            env::set_var("OPENAI_API_KEY", "custom-key");
            env::set_var("REALTIME_MODEL", "gpt-realtime");
            env::set_var("UPSTREAM_URL", "http://localhost:4000/v1/realtime");
            env::set_var("RUST_LOG", "trace");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:9000");
        assert_eq!(config.realtime_model, "gpt-realtime");
        assert_eq!(config.upstream_url, "http://localhost:4000/v1/realtime");
        assert_eq!(config.log_level, Level::TRACE);
    }

    #[test]
    #[serial]
    fn test_config_key_is_redacted_in_debug() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "sk-very-secret");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert!(!format!("{:?}", config).contains("sk-very-secret"));
    }

    #[test]
    #[serial]
    fn test_config_missing_openai_key() {
        clear_env_vars();

        match Config::from_env().unwrap_err() {
            ConfigError::MissingVar(var) => assert_eq!(var, "OPENAI_API_KEY"),
            other => panic!("Expected MissingVar for OPENAI_API_KEY, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
            env::set_var("OPENAI_API_KEY", "test-openai-key");
        }

        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            other => panic!("Expected InvalidValue for BIND_ADDRESS, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_upstream_url() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-openai-key");
            env::set_var("UPSTREAM_URL", "api.openai.com/v1/realtime");
        }

        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "UPSTREAM_URL"),
            other => panic!("Expected InvalidValue for UPSTREAM_URL, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-openai-key");
            env::set_var("RUST_LOG", "not-a-level");
        }

        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            other => panic!("Expected InvalidValue for RUST_LOG, got {:?}", other),
        }
    }
}
