use haven_domain::ServiceRole;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub projector: ProjectorConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoleSetting {
    Traveler,
    Owner,
}

impl From<RoleSetting> for ServiceRole {
    fn from(role: RoleSetting) -> Self {
        match role {
            RoleSetting::Traveler => ServiceRole::TravelerService,
            RoleSetting::Owner => ServiceRole::OwnerService,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub role: RoleSetting,
    pub consumer_group: Option<String>,
}

impl ServiceConfig {
    pub fn consumer_group(&self) -> String {
        self.consumer_group.clone().unwrap_or_else(|| match self.role {
            RoleSetting::Traveler => "haven-traveler-projector".to_string(),
            RoleSetting::Owner => "haven-owner-projector".to_string(),
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

fn default_publish_timeout_ms() -> u64 { 5000 }

impl KafkaConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProjectorConfig {
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub reconnect_delay_ms: u64,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_backoff_ms: 200,
            reconnect_delay_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    pub sweep_interval_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self { sweep_interval_secs: 3600 }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `HAVEN__SERVICE__ROLE=owner`
            .add_source(config::Environment::with_prefix("HAVEN").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = parse(
            r#"
            [server]
            port = 8080
            [service]
            role = "owner"
            [database]
            url = "postgres://localhost/haven"
            [kafka]
            brokers = "localhost:9092"
            [auth]
            jwt_secret = "secret"
            "#,
        );

        assert_eq!(ServiceRole::from(config.service.role), ServiceRole::OwnerService);
        assert_eq!(config.service.consumer_group(), "haven-owner-projector");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.kafka.publish_timeout(), Duration::from_secs(5));
        assert_eq!(config.projector.max_attempts, 5);
        assert_eq!(config.completion.sweep_interval_secs, 3600);
    }

    #[test]
    fn test_explicit_consumer_group_wins() {
        let config = parse(
            r#"
            [server]
            port = 8081
            [service]
            role = "traveler"
            consumer_group = "traveler-blue"
            [database]
            url = "postgres://localhost/haven"
            [kafka]
            brokers = "localhost:9092"
            publish_timeout_ms = 750
            [auth]
            jwt_secret = "secret"
            [projector]
            max_attempts = 2
            retry_backoff_ms = 10
            reconnect_delay_ms = 100
            "#,
        );

        assert_eq!(config.service.consumer_group(), "traveler-blue");
        assert_eq!(config.kafka.publish_timeout(), Duration::from_millis(750));
        assert_eq!(config.projector.max_attempts, 2);
    }
}
