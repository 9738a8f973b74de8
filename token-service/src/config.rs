use crate::utils::errors::{Result, TokenServiceError};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub livekit: LiveKitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Signing material and the media endpoint handed back to clients.
///
/// None of these has a default; an unset key, secret or URL fails
/// [`AppConfig::validate`].
#[derive(Deserialize, Clone, Default)]
pub struct LiveKitConfig {
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// api_secret 不能出现在日志里
impl std::fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("server_url", &self.server_url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        // 首先尝试从 TOML 配置文件加载
        let config_path = std::env::var("CONFIG_PATH")
            .unwrap_or_else(|_| "/etc/token-service/config.toml".to_string());

        let mut config = if std::path::Path::new(&config_path).exists() {
            let config_str = std::fs::read_to_string(&config_path).map_err(|e| {
                TokenServiceError::Configuration(format!(
                    "Failed to read config file {}: {}",
                    config_path, e
                ))
            })?;
            Self::from_toml(&config_str)?
        } else {
            AppConfig::default()
        };

        // 环境变量覆盖配置文件设置
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(source: &str) -> Result<Self> {
        toml::from_str::<AppConfig>(source).map_err(|e| {
            TokenServiceError::Configuration(format!("Failed to parse config file: {}", e))
        })
    }

    /// Applies environment overrides through `lookup` so tests can feed a
    /// fixed map instead of the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("LIVEKIT_URL").or_else(|| lookup("LIVEKIT_SERVER_URL")) {
            self.livekit.server_url = url;
        }
        if let Some(key) = lookup("LIVEKIT_API_KEY") {
            self.livekit.api_key = key;
        }
        if let Some(secret) = lookup("LIVEKIT_API_SECRET") {
            self.livekit.api_secret = secret;
        }

        if let Some(host) = lookup("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SERVER_PORT").or_else(|| lookup("PORT")) {
            self.server.port = port
                .parse()
                .map_err(|e| TokenServiceError::Configuration(format!("Invalid port: {}", e)))?;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let livekit = &self.livekit;
        if livekit.api_key.trim().is_empty() {
            return Err(TokenServiceError::Configuration(
                "LIVEKIT_API_KEY is not set".to_string(),
            ));
        }
        if livekit.api_secret.trim().is_empty() {
            return Err(TokenServiceError::Configuration(
                "LIVEKIT_API_SECRET is not set".to_string(),
            ));
        }
        if livekit.server_url.trim().is_empty() {
            return Err(TokenServiceError::Configuration(
                "LIVEKIT_URL is not set".to_string(),
            ));
        }

        let url = url::Url::parse(&livekit.server_url).map_err(|e| {
            TokenServiceError::Configuration(format!(
                "Invalid LiveKit URL {}: {}",
                livekit.server_url, e
            ))
        })?;
        if !matches!(url.scheme(), "ws" | "wss" | "http" | "https") {
            return Err(TokenServiceError::Configuration(format!(
                "Unsupported LiveKit URL scheme: {}",
                url.scheme()
            )));
        }

        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(TokenServiceError::Configuration(format!(
                "Unknown log format: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_secrets_fail_validation() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[("LIVEKIT_URL", "wss://media.example.com")]))
            .unwrap();

        assert_matches!(
            config.validate(),
            Err(TokenServiceError::Configuration(msg)) if msg.contains("LIVEKIT_API_KEY")
        );
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AppConfig::from_toml(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [livekit]
            server_url = "ws://localhost:7880"
            api_key = "file-key"
            api_secret = "file-secret"
            "#,
        )
        .unwrap();

        config
            .apply_env(env(&[
                ("LIVEKIT_URL", "wss://media.example.com"),
                ("LIVEKIT_API_SECRET", "env-secret"),
                ("PORT", "9090"),
            ]))
            .unwrap();

        assert_eq!(config.livekit.server_url, "wss://media.example.com");
        assert_eq!(config.livekit.api_key, "file-key");
        assert_eq!(config.livekit.api_secret, "env-secret");
        assert_eq!(config.server.port, 9090);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_invalid_port_and_scheme() {
        let mut config = AppConfig::default();
        assert_matches!(
            config.apply_env(env(&[("SERVER_PORT", "eighty")])),
            Err(TokenServiceError::Configuration(_))
        );

        config
            .apply_env(env(&[
                ("LIVEKIT_URL", "ftp://media.example.com"),
                ("LIVEKIT_API_KEY", "key"),
                ("LIVEKIT_API_SECRET", "secret"),
            ]))
            .unwrap();
        assert_matches!(config.validate(), Err(TokenServiceError::Configuration(_)));
    }

    #[test]
    fn livekit_url_wins_over_alias() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("LIVEKIT_URL", "wss://primary.example.com"),
                ("LIVEKIT_SERVER_URL", "wss://alias.example.com"),
            ]))
            .unwrap();
        assert_eq!(config.livekit.server_url, "wss://primary.example.com");

        let mut config = AppConfig::default();
        config
            .apply_env(env(&[("LIVEKIT_SERVER_URL", "wss://alias.example.com")]))
            .unwrap();
        assert_eq!(config.livekit.server_url, "wss://alias.example.com");
    }

    #[test]
    fn debug_output_hides_secret() {
        let config = LiveKitConfig {
            server_url: "ws://localhost:7880".to_string(),
            api_key: "key".to_string(),
            api_secret: "super-secret".to_string(),
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
    }
}
