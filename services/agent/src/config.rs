use rtc_agent_core::SessionOptions;
use rtc_agent_webrtc::WebRtcConfig;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Modalities the remote agent understands.
pub const SUPPORTED_MODALITIES: [&str; 2] = ["text", "audio"];

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub relay_url: String,
    pub ice_servers: Vec<String>,
    pub modalities: Vec<String>,
    pub instructions: Option<String>,
    pub voice: Option<String>,
    pub page_path: Option<PathBuf>,
    /// Enables the `showFingers` tool when set.
    pub hand_url: Option<String>,
    /// Inbound audio is recorded here as Ogg/Opus when set.
    pub record_path: Option<PathBuf>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let relay_url = std::env::var("RELAY_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8787/rtc-connect".to_string());

        let ice_servers = std::env::var("ICE_SERVERS")
            .map(|v| split_list(&v))
            .unwrap_or_else(|_| vec!["stun:stun.l.google.com:19302".to_string()]);

        let modalities = std::env::var("MODALITIES")
            .map(|v| split_list(&v))
            .unwrap_or_else(|_| SessionOptions::default().modalities);

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let config = Self {
            relay_url,
            ice_servers,
            modalities,
            instructions: non_empty_var("INSTRUCTIONS"),
            voice: non_empty_var("VOICE"),
            page_path: non_empty_var("PAGE_PATH").map(PathBuf::from),
            hand_url: non_empty_var("HAND_URL"),
            record_path: non_empty_var("RECORD_PATH").map(PathBuf::from),
            log_level,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that can also be overridden on the command line.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.relay_url) {
            return Err(ConfigError::InvalidValue(
                "RELAY_URL".to_string(),
                format!("'{}' is not an http(s) URL", self.relay_url),
            ));
        }

        if self.modalities.is_empty() {
            return Err(ConfigError::InvalidValue(
                "MODALITIES".to_string(),
                "at least one modality is required".to_string(),
            ));
        }
        if let Some(unknown) = self
            .modalities
            .iter()
            .find(|m| !SUPPORTED_MODALITIES.contains(&m.as_str()))
        {
            return Err(ConfigError::InvalidValue(
                "MODALITIES".to_string(),
                format!("unsupported modality '{}'", unknown),
            ));
        }

        if let Some(url) = &self.hand_url {
            if !is_http_url(url) {
                return Err(ConfigError::InvalidValue(
                    "HAND_URL".to_string(),
                    format!("'{}' is not an http(s) URL", url),
                ));
            }
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            modalities: self.modalities.clone(),
            instructions: self.instructions.clone(),
            voice: self.voice.clone(),
        }
    }

    pub fn webrtc_config(&self) -> WebRtcConfig {
        WebRtcConfig {
            ice_servers: self.ice_servers.clone(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("RELAY_URL");
            env::remove_var("ICE_SERVERS");
            env::remove_var("MODALITIES");
            env::remove_var("INSTRUCTIONS");
            env::remove_var("VOICE");
            env::remove_var("PAGE_PATH");
            env::remove_var("HAND_URL");
            env::remove_var("RECORD_PATH");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load with defaults");

        assert_eq!(config.relay_url, "http://127.0.0.1:8787/rtc-connect");
        assert_eq!(config.ice_servers, vec!["stun:stun.l.google.com:19302"]);
        assert_eq!(config.modalities, vec!["text", "audio"]);
        assert_eq!(config.instructions, None);
        assert_eq!(config.voice, None);
        assert_eq!(config.page_path, None);
        assert_eq!(config.hand_url, None);
        assert_eq!(config.record_path, None);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.session_options(), SessionOptions::default());
    }

    #[test]
    #[serial]
    fn test_config_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("RELAY_URL", "https://relay.example.com/rtc-connect");
            env::set_var("ICE_SERVERS", "stun:a.example.com:3478, stun:b.example.com:3478");
            env::set_var("MODALITIES", "text");
            env::set_var("INSTRUCTIONS", "Be brief.");
            env::set_var("VOICE", "verse");
            env::set_var("PAGE_PATH", "/srv/page.html");
            env::set_var("HAND_URL", "http://10.0.0.7/hand");
            env::set_var("RECORD_PATH", "/tmp/agent.ogg");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.relay_url, "https://relay.example.com/rtc-connect");
        assert_eq!(
            config.webrtc_config().ice_servers,
            vec!["stun:a.example.com:3478", "stun:b.example.com:3478"]
        );
        let options = config.session_options();
        assert_eq!(options.modalities, vec!["text"]);
        assert_eq!(options.instructions.as_deref(), Some("Be brief."));
        assert_eq!(options.voice.as_deref(), Some("verse"));
        assert_eq!(config.page_path, Some(PathBuf::from("/srv/page.html")));
        assert_eq!(config.hand_url.as_deref(), Some("http://10.0.0.7/hand"));
        assert_eq!(config.record_path, Some(PathBuf::from("/tmp/agent.ogg")));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_blank_optionals_are_unset() {
        clear_env_vars();
        unsafe {
            env::set_var("INSTRUCTIONS", "   ");
            env::set_var("HAND_URL", "");
            env::set_var("ICE_SERVERS", "");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert_eq!(config.instructions, None);
        assert_eq!(config.hand_url, None);
        assert!(config.ice_servers.is_empty());
    }

    #[test]
    #[serial]
    fn test_config_invalid_relay_url() {
        clear_env_vars();
        unsafe {
            env::set_var("RELAY_URL", "ftp://relay.example.com");
        }

        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RELAY_URL"),
            other => panic!("Expected InvalidValue for RELAY_URL, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_config_rejects_unknown_modality() {
        clear_env_vars();
        unsafe {
            env::set_var("MODALITIES", "text,video");
        }

        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, msg) => {
                assert_eq!(var, "MODALITIES");
                assert!(msg.contains("video"));
            }
            other => panic!("Expected InvalidValue for MODALITIES, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_config_rejects_empty_modalities() {
        clear_env_vars();
        unsafe {
            env::set_var("MODALITIES", " , ");
        }

        assert!(matches!(
            Config::from_env().unwrap_err(),
            ConfigError::InvalidValue(var, _) if var == "MODALITIES"
        ));
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            other => panic!("Expected InvalidValue for RUST_LOG, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_after_override() {
        let mut config = Config {
            relay_url: "http://127.0.0.1:8787/rtc-connect".to_string(),
            ice_servers: vec![],
            modalities: vec!["audio".to_string()],
            instructions: None,
            voice: None,
            page_path: None,
            hand_url: None,
            record_path: None,
            log_level: Level::INFO,
        };
        assert!(config.validate().is_ok());

        config.hand_url = Some("serial:///dev/ttyUSB0".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(var, _)) if var == "HAND_URL"
        ));
    }
}
