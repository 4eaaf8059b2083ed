use serde::{Deserialize, Serialize};
use soilsense_inference::InferenceConfig;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub listener: ListenerConfig,
    pub inference: InferenceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub api_prefix: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity provider.
    pub jwt_secret: String,
}

/// The table and notification channel are fixed by the migrations.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ListenerConfig {
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            api_prefix: String::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
            run_migrations: true,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl ApiConfig {
    /// Every problem at once, so a misconfigured deployment fails with the full list.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.auth.jwt_secret.trim().is_empty() {
            problems.push("auth.jwt_secret is not set (SOILSENSE__AUTH__JWT_SECRET)".to_string());
        }
        if self.database.url.trim().is_empty() {
            problems.push("database.url is not set (SOILSENSE__DATABASE__URL)".to_string());
        }
        if !self.server.api_prefix.is_empty() && !self.server.api_prefix.starts_with('/') {
            problems.push("server.api_prefix must start with '/'".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_report_every_missing_secret() {
        let problems = ApiConfig::default().validate().unwrap_err();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("jwt_secret"));
        assert!(problems[1].contains("database.url"));
    }

    #[test]
    fn test_complete_config_is_valid() {
        let mut config = ApiConfig::default();
        config.auth.jwt_secret = "s3cret".to_string();
        config.database.url = "postgres://localhost/soil".to_string();
        assert!(config.validate().is_ok());
    }
}
