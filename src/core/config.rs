use crate::core::errors::ConfigError;
use std::env;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
}

/// AI analysis / dedup collaborator configuration
#[derive(Debug, Clone)]
pub struct AnalysisApiConfig {
    pub analyze_url: String,
    pub dedup_url: String,
    pub api_keys: Vec<String>,
    pub max_retries: u32,
    pub timeout_seconds: u64,
}

/// Object storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

/// VIN decode collaborator configuration
#[derive(Debug, Clone)]
pub struct VinConfig {
    pub decode_url: String,
}

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Analysis sub-list cap for single_lot / per_item / per_photo segments
    pub analysis_cap_basic: usize,
    /// Analysis sub-list cap for catalogue / mixed segments
    pub analysis_cap_catalogue: usize,
    /// Worker pool size for image uploads and renames
    pub upload_concurrency: usize,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub analysis: AnalysisApiConfig,
    pub storage: StorageConfig,
    pub vin: VinConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Result<Self, ConfigError> {
        // Analysis API keys from environment (comma-separated) or empty vec;
        // keys can also arrive per-request from the caller
        let api_keys = env::var("ANALYSIS_API_KEYS")
            .ok()
            .map(|keys| {
                keys.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        Ok(Self {
            server: ServerConfig {
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1430),
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                log_level,
            },
            analysis: AnalysisApiConfig {
                analyze_url: env::var("ANALYSIS_API_URL")
                    .unwrap_or_else(|_| "http://localhost:8601/v1/analyze".to_string()),
                dedup_url: env::var("DEDUP_API_URL")
                    .unwrap_or_else(|_| "http://localhost:8601/v1/dedup".to_string()),
                api_keys,
                max_retries: env::var("MAX_RETRIES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3),
                timeout_seconds: env::var("API_TIMEOUT_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            },
            storage: StorageConfig {
                base_url: env::var("STORAGE_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:8602/objects".to_string()),
                timeout_seconds: env::var("STORAGE_TIMEOUT_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            vin: VinConfig {
                decode_url: env::var("VIN_DECODE_URL")
                    .unwrap_or_else(|_| "http://localhost:8603/v1/decode".to_string()),
            },
            pipeline: PipelineConfig {
                analysis_cap_basic: env::var("ANALYSIS_CAP_BASIC")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(24),
                analysis_cap_catalogue: env::var("ANALYSIS_CAP_CATALOGUE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(80),
                upload_concurrency: env::var("UPLOAD_CONCURRENCY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| {
                        // Small pool: uploads are IO-bound, cap at 4..8
                        num_cpus::get().clamp(4, 8)
                    }),
            },
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.analysis.analyze_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "ANALYSIS_API_URL",
                reason: "must not be empty".to_string(),
            });
        }

        if self.storage.base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "STORAGE_BASE_URL",
                reason: "must not be empty".to_string(),
            });
        }

        if self.pipeline.analysis_cap_basic == 0 {
            return Err(ConfigError::InvalidValue {
                name: "ANALYSIS_CAP_BASIC",
                reason: "must be > 0".to_string(),
            });
        }

        if self.pipeline.analysis_cap_catalogue < self.pipeline.analysis_cap_basic {
            return Err(ConfigError::InvalidValue {
                name: "ANALYSIS_CAP_CATALOGUE",
                reason: format!(
                    "must be >= ANALYSIS_CAP_BASIC ({}), got {}",
                    self.pipeline.analysis_cap_basic, self.pipeline.analysis_cap_catalogue
                ),
            });
        }

        if self.pipeline.upload_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: "UPLOAD_CONCURRENCY",
                reason: "must be > 0".to_string(),
            });
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn api_keys(&self) -> &[String] {
        &self.analysis.api_keys
    }

    pub fn max_retries(&self) -> u32 {
        self.analysis.max_retries
    }

    pub fn analysis_cap(&self, catalogue_like: bool) -> usize {
        if catalogue_like {
            self.pipeline.analysis_cap_catalogue
        } else {
            self.pipeline.analysis_cap_basic
        }
    }

    pub fn upload_concurrency(&self) -> usize {
        self.pipeline.upload_concurrency
    }
}

// Note: No Default implementation because Config::new() can fail
// Users should explicitly call Config::new()? and handle errors

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::load_from_env().unwrap();
        config.validate().unwrap();
        assert!(config.pipeline.analysis_cap_basic <= config.pipeline.analysis_cap_catalogue);
        assert!(config.pipeline.upload_concurrency > 0);
    }
}
