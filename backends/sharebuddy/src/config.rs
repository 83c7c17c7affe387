use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub credits: CreditConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub verified_author: VerifiedAuthorConfig,
    #[serde(default)]
    pub recommendations: RecommendationConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit_per_second: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            rate_limit_per_second: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub private_key_path: String,
    pub public_key_path: String,
    pub expiry_days: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            private_key_path: "keys/private_key.pem".to_string(),
            public_key_path: "keys/public_key.pem".to_string(),
            expiry_days: 30,
        }
    }
}

/// Amounts awarded or bounded by the credit ledger.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CreditConfig {
    pub signup_bonus: i32,
    pub upload_reward: i32,
    pub answer_reward: i32,
    pub max_document_cost: i32,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            signup_bonus: 10,
            upload_reward: 5,
            answer_reward: 2,
            max_document_cost: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    pub queue_key: String,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub poll_timeout_secs: u64,
    pub banned_words: Vec<String>,
    pub min_description_length: usize,
    pub max_file_size_bytes: i64,
    pub allowed_file_types: Vec<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            queue_key: "sharebuddy:moderation".to_string(),
            max_attempts: 3,
            backoff_ms: 1000,
            poll_timeout_secs: 5,
            banned_words: Vec::new(),
            min_description_length: 20,
            max_file_size_bytes: 50 * 1024 * 1024,
            allowed_file_types: ["pdf", "doc", "docx", "ppt", "pptx", "txt"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifiedAuthorConfig {
    pub min_documents: i64,
    pub min_average_rating: f64,
    pub min_downloads: i64,
}

impl Default for VerifiedAuthorConfig {
    fn default() -> Self {
        Self {
            min_documents: 5,
            min_average_rating: 4.0,
            min_downloads: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    pub refresh_interval_secs: u64,
    pub trending_days: i32,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 3600,
            trending_days: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StripeConfig {
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub success_url: String,
    pub cancel_url: String,
    pub signature_tolerance_secs: i64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.stripe.com".to_string(),
            secret_key: String::new(),
            webhook_secret: String::new(),
            success_url: "http://localhost:3000/payments/success".to_string(),
            cancel_url: "http://localhost:3000/payments/cancel".to_string(),
            signature_tolerance_secs: 300,
        }
    }
}

impl Config {
    /// Loads the optional TOML file at `path`, then lets `SHAREBUDDY__SECTION__KEY`
    /// environment variables override it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("SHAREBUDDY")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("moderation.banned_words")
                    .with_list_parse_key("moderation.allowed_file_types")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to build configuration from {:?}", config_path))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Failed to deserialize configuration from {:?}", config_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let dir = std::env::temp_dir().join(format!("sharebuddy-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            r#"
            [database]
            url = "postgres://localhost/sharebuddy"

            [credits]
            signup_bonus = 25

            [moderation]
            banned_words = ["spam"]
            "#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.database.url, "postgres://localhost/sharebuddy");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.credits.signup_bonus, 25);
        assert_eq!(config.credits.upload_reward, 5);
        assert_eq!(config.moderation.banned_words, vec!["spam".to_string()]);
        assert_eq!(config.moderation.max_attempts, 3);
        assert_eq!(config.server.port, 8080);
    }
}
