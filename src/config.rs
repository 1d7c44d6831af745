//! Configuration management for Evermind
//!
//! Loads configuration from environment variables (with .env support).

use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};

/// AI provider configuration (OpenAI-compatible API)
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API key for the provider
    pub api_key: SecretString,
    /// Base URL for the provider API
    pub base_url: String,
    /// Chat model used for fact extraction
    pub chat_model: String,
    /// Embedding model
    pub embedding_model: String,
    /// Embedding vector dimension (fixed per embedding model)
    pub embedding_dimensions: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// PostgreSQL database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database connection URL
    pub url: SecretString,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

/// Memory subsystem defaults
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Default minimum similarity for a fragment to count as relevant
    pub similarity_threshold: f32,
    /// Default number of fragments injected into a chat turn
    pub match_count: usize,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level filter
    pub level: String,
    /// Log format (pretty, json)
    pub format: String,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// AI provider settings
    pub provider: ProviderConfig,
    /// PostgreSQL database settings
    pub database: DatabaseConfig,
    /// Memory subsystem defaults
    pub memory: MemoryConfig,
    /// Logging settings
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Missing values fall back to defaults (secrets fall back to empty).
    /// Call [`Config::validate`], or the narrower `validate_provider` /
    /// `validate_database`, before handing a section to a client.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Ok(Config {
            provider: ProviderConfig {
                api_key: SecretString::from(
                    std::env::var("OPENAI_API_KEY").unwrap_or_default(),
                ),
                base_url: std::env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                chat_model: std::env::var("CHAT_MODEL")
                    .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                embedding_model: std::env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
                embedding_dimensions: std::env::var("EMBEDDING_DIMENSIONS")
                    .unwrap_or_else(|_| "1536".to_string())
                    .parse()
                    .unwrap_or(1536),
                timeout_secs: std::env::var("PROVIDER_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
            database: DatabaseConfig {
                url: SecretString::from(std::env::var("DATABASE_URL").unwrap_or_default()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                connect_timeout_secs: std::env::var("DATABASE_CONNECT_TIMEOUT")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
            memory: MemoryConfig {
                similarity_threshold: std::env::var("MEMORY_SIMILARITY_THRESHOLD")
                    .unwrap_or_else(|_| "0.7".to_string())
                    .parse()
                    .unwrap_or(0.7),
                match_count: std::env::var("MEMORY_MATCH_COUNT")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            log: LogConfig {
                level: std::env::var("RUST_LOG")
                    .unwrap_or_else(|_| "info,evermind=debug".to_string()),
                format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            },
        })
    }

    /// Create a minimal config for tests or CLI commands that don't need full config
    pub fn minimal() -> Self {
        Config {
            provider: ProviderConfig {
                api_key: SecretString::from(""),
                base_url: "https://api.openai.com/v1".to_string(),
                chat_model: "gpt-4o-mini".to_string(),
                embedding_model: "text-embedding-3-small".to_string(),
                embedding_dimensions: 1536,
                timeout_secs: 30,
            },
            database: DatabaseConfig {
                url: SecretString::from(""),
                max_connections: 5,
                connect_timeout_secs: 30,
            },
            memory: MemoryConfig {
                similarity_threshold: 0.7,
                match_count: 5,
            },
            log: LogConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    /// Validate that all required configuration is present
    pub fn validate(&self) -> Result<()> {
        self.validate_provider()?;
        self.validate_database()?;
        if !(0.0..=1.0).contains(&self.memory.similarity_threshold) {
            return Err(Error::Config(
                "MEMORY_SIMILARITY_THRESHOLD must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate the provider section only (commands that never call the API
    /// can skip this)
    pub fn validate_provider(&self) -> Result<()> {
        if self.provider.api_key.expose_secret().is_empty() {
            return Err(Error::Config("OPENAI_API_KEY is required".to_string()));
        }
        if self.provider.embedding_dimensions == 0 {
            return Err(Error::Config(
                "EMBEDDING_DIMENSIONS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate the database section only
    pub fn validate_database(&self) -> Result<()> {
        if self.database.url.expose_secret().is_empty() {
            return Err(Error::Config("DATABASE_URL is required".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = Config::minimal();
        assert!(config.validate().is_err()); // Should fail validation: no API key
    }

    #[test]
    fn test_threshold_range_validation() {
        let mut config = Config::minimal();
        config.provider.api_key = SecretString::from("test-key");
        config.database.url = SecretString::from("postgres://localhost/evermind");
        assert!(config.validate().is_ok());

        config.memory.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sections_validate_independently() {
        let mut config = Config::minimal();
        config.database.url = SecretString::from("postgres://localhost/evermind");

        // Database-only commands work without an API key configured.
        assert!(config.validate_database().is_ok());
        assert!(config.validate_provider().is_err());
        assert!(config.validate().is_err());
    }
}
