// src/services/anthropic.rs
use crate::errors::SnapscribeError;
use crate::services::image_processor::PreparedImage;
use crate::services::llm_service::{TextCompletion, VisionModel};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

// 5MB base64 limit, base64 adds ~33%.
const MAX_IMAGE_BYTES: usize = 3_750_000;

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(client: Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }
}

/// Concatenates the text blocks of a messages response.
fn response_text(result: &Value) -> Option<String> {
    let blocks = result["content"].as_array()?;
    let text: Vec<&str> = blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect();
    if text.is_empty() { None } else { Some(text.join("\n")) }
}

fn tokens_used(result: &Value) -> u64 {
    let usage = &result["usage"];
    usage["input_tokens"].as_u64().unwrap_or(0) + usage["output_tokens"].as_u64().unwrap_or(0)
}

#[async_trait]
impl VisionModel for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn max_image_bytes(&self) -> Option<usize> {
        Some(MAX_IMAGE_BYTES)
    }

    async fn complete(
        &self,
        prompt: &str,
        image: &PreparedImage,
        max_tokens: u32,
    ) -> Result<TextCompletion, SnapscribeError> {
        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&json!({
                "model": self.model,
                "max_tokens": max_tokens,
                "messages": [{
                    "role": "user",
                    "content": [
                        {
                            "type": "image",
                            "source": {
                                "type": "base64",
                                "media_type": image.content_type,
                                "data": image.to_base64()
                            }
                        },
                        {
                            "type": "text",
                            "text": prompt
                        }
                    ]
                }]
            }))
            .send()
            .await
            .map_err(|e| SnapscribeError::llm(format!("Anthropic request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SnapscribeError::llm_status(
                status.as_u16(),
                format!("Anthropic error: {}", error_text),
            ));
        }

        let result: Value = response.json().await.map_err(|e| {
            SnapscribeError::llm(format!("Failed to parse Anthropic response: {}", e))
        })?;

        let text = response_text(&result)
            .ok_or_else(|| SnapscribeError::llm("No content in Anthropic response"))?;

        Ok(TextCompletion {
            text,
            tokens_used: tokens_used(&result),
        })
    }
}
