use recipe_core::config::ServerConfig;
use recipe_core::error::AppError;
use secrecy::Secret;
use std::env;
use std::time::Duration;

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_TIMEOUT_SECS: u64 = 120;
const DEFAULT_AI_RATE_LIMIT_PER_MINUTE: u32 = 30;

#[derive(Debug, Clone)]
pub struct RecipeConfig {
    pub common: ServerConfig,
    pub environment: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub mongodb: MongoConfig,
    pub gemini: GeminiSettings,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

/// Upstream generative model settings, read once at startup.
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: Secret<String>,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per minute per client IP on the `/api/ai` routes.
    pub ai_requests_per_minute: u32,
}

impl RecipeConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = ServerConfig::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// `GEMINI_API_KEY` and `MONGODB_URI` have no defaults and are required
    /// in every environment. Every other key falls back to its default.
    pub fn from_lookup<F>(common: ServerConfig, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "dev".to_string());
        let get = |key: &str, default: Option<&str>| get_env(&lookup, key, default);

        let api_key = get("GEMINI_API_KEY", None)?;
        if api_key.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "GEMINI_API_KEY is set but empty"
            )));
        }

        Ok(RecipeConfig {
            common,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            otlp_endpoint: lookup("OTLP_ENDPOINT").filter(|s| !s.is_empty()),
            mongodb: MongoConfig {
                uri: get("MONGODB_URI", None)?,
                database: get("MONGODB_DATABASE", Some("recipes_db"))?,
            },
            gemini: GeminiSettings {
                api_key: Secret::new(api_key),
                model: get("GEMINI_MODEL_NAME", Some(DEFAULT_GEMINI_MODEL))?,
                api_base: get("GEMINI_API_BASE", Some(DEFAULT_GEMINI_API_BASE))?
                    .trim_end_matches('/')
                    .to_string(),
                timeout: Duration::from_secs(parse_or(
                    get(
                        "GEMINI_TIMEOUT_SECS",
                        Some(&DEFAULT_GEMINI_TIMEOUT_SECS.to_string()),
                    )?,
                    DEFAULT_GEMINI_TIMEOUT_SECS,
                )),
            },
            rate_limit: RateLimitConfig {
                ai_requests_per_minute: parse_or(
                    get(
                        "AI_RATE_LIMIT_PER_MINUTE",
                        Some(&DEFAULT_AI_RATE_LIMIT_PER_MINUTE.to_string()),
                    )?,
                    DEFAULT_AI_RATE_LIMIT_PER_MINUTE,
                ),
            },
            environment,
        })
    }

    pub fn is_production(&self) -> bool {
        is_production(&self.environment)
    }
}

fn is_production(environment: &str) -> bool {
    matches!(environment, "prod" | "production")
}

fn parse_or<T: std::str::FromStr>(value: String, fallback: T) -> T {
    value.trim().parse().unwrap_or(fallback)
}

fn get_env<F>(lookup: &F, key: &str, default: Option<&str>) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match (lookup(key), default) {
        (Some(val), _) => Ok(val),
        (None, Some(def)) => Ok(def.to_string()),
        (None, None) => Err(AppError::ConfigError(anyhow::anyhow!(
            "{} is required but not set",
            key
        ))),
    }
}
