// src/config.rs
use crate::errors::SnapscribeError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub openai_api_key: String,
    pub anthropic_api_key: Option<String>,
    pub vision_provider: String,
    pub openai_vision_model: String,
    pub anthropic_model: String,
    pub image_model: String,
    pub image_size: String,
    pub max_payload_bytes: usize,
    pub max_image_dimension: u32,
    pub resize_target: u32,
    pub request_timeout_secs: u64,
    pub static_dir: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, SnapscribeError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SnapscribeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let string_or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let openai_api_key = var("OPENAI_API_KEY").ok_or_else(|| {
            SnapscribeError::Configuration("OPENAI_API_KEY must be set".to_string())
        })?;
        let anthropic_api_key = var("ANTHROPIC_API_KEY");
        let vision_provider = string_or("VISION_PROVIDER", "openai").to_ascii_lowercase();

        if vision_provider == "anthropic" && anthropic_api_key.is_none() {
            return Err(SnapscribeError::Configuration(
                "VISION_PROVIDER=anthropic requires ANTHROPIC_API_KEY".to_string(),
            ));
        }

        Ok(Self {
            bind_addr: string_or("BIND_ADDR", "0.0.0.0:8080"),
            openai_api_key,
            anthropic_api_key,
            vision_provider,
            openai_vision_model: string_or("OPENAI_VISION_MODEL", "gpt-4o"),
            anthropic_model: string_or("ANTHROPIC_MODEL", "claude-3-5-sonnet-20241022"),
            image_model: string_or("IMAGE_MODEL", "gpt-image-1"),
            image_size: string_or("IMAGE_SIZE", "1024x1024"),
            max_payload_bytes: parse_or(var("MAX_PAYLOAD_BYTES"), 20 * 1024 * 1024),
            max_image_dimension: parse_or(var("MAX_IMAGE_DIMENSION"), 4096),
            resize_target: parse_or(var("RESIZE_TARGET"), 2048),
            request_timeout_secs: parse_or(var("REQUEST_TIMEOUT_SECS"), 120),
            static_dir: var("STATIC_DIR"),
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
