// src/services/openai.rs
use crate::errors::SnapscribeError;
use crate::services::image_processor::PreparedImage;
use crate::services::llm_service::{GeneratedImage, ImageModel, TextCompletion, VisionModel};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::{Client, Response, multipart};
use serde_json::{Value, json};

const API_BASE: &str = "https://api.openai.com/v1";

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    vision_model: String,
    image_model: String,
    image_size: String,
}

impl OpenAiClient {
    pub fn new(
        client: Client,
        api_key: String,
        vision_model: String,
        image_model: String,
        image_size: String,
    ) -> Self {
        Self {
            client,
            api_key,
            vision_model,
            image_model,
            image_size,
        }
    }

    // Older DALL-E models return URLs unless asked for base64; gpt-image
    // models always return base64 and reject the parameter.
    fn wants_response_format(&self) -> bool {
        self.image_model.starts_with("dall-e")
    }

    async fn read_json(response: Response, what: &str) -> Result<Value, SnapscribeError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(SnapscribeError::llm_status(
                status.as_u16(),
                format!("OpenAI {} error: {}", what, error_text),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| SnapscribeError::llm(format!("Failed to parse OpenAI {} response: {}", what, e)))
    }

    fn image_from_response(result: &Value) -> Result<GeneratedImage, SnapscribeError> {
        let b64_json = result["data"][0]["b64_json"]
            .as_str()
            .ok_or_else(|| SnapscribeError::llm("No image data in response"))?;

        let data = general_purpose::STANDARD
            .decode(b64_json)
            .map_err(|e| SnapscribeError::llm(format!("Failed to decode image: {}", e)))?;

        Ok(GeneratedImage {
            data,
            content_type: "image/png".to_string(),
            tokens_used: result["usage"]["total_tokens"].as_u64().unwrap_or(0),
        })
    }
}

#[async_trait]
impl VisionModel for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        prompt: &str,
        image: &PreparedImage,
        max_tokens: u32,
    ) -> Result<TextCompletion, SnapscribeError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", API_BASE))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.vision_model,
                "messages": [{
                    "role": "user",
                    "content": [
                        {
                            "type": "text",
                            "text": prompt
                        },
                        {
                            "type": "image_url",
                            "image_url": {
                                "url": image.data_url()
                            }
                        }
                    ]
                }],
                "max_tokens": max_tokens
            }))
            .send()
            .await
            .map_err(|e| SnapscribeError::llm(format!("OpenAI request failed: {}", e)))?;

        let result = Self::read_json(response, "chat").await?;

        let text = result["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| SnapscribeError::llm("No content in OpenAI response"))?;

        Ok(TextCompletion {
            text: text.to_string(),
            tokens_used: result["usage"]["total_tokens"].as_u64().unwrap_or(0),
        })
    }
}

#[async_trait]
impl ImageModel for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, SnapscribeError> {
        let mut body = json!({
            "model": self.image_model,
            "prompt": prompt,
            "n": 1,
            "size": self.image_size
        });
        if self.wants_response_format() {
            body["response_format"] = json!("b64_json");
        }

        let response = self
            .client
            .post(format!("{}/images/generations", API_BASE))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SnapscribeError::llm(format!("Image generation request failed: {}", e)))?;

        let result = Self::read_json(response, "image generation").await?;
        Self::image_from_response(&result)
    }

    async fn edit(
        &self,
        image: &PreparedImage,
        prompt: &str,
    ) -> Result<GeneratedImage, SnapscribeError> {
        let file_name = if image.file_name.is_empty() {
            "image.png".to_string()
        } else {
            image.file_name.clone()
        };
        let part = multipart::Part::bytes(image.data.clone())
            .file_name(file_name)
            .mime_str(&image.content_type)
            .map_err(|e| SnapscribeError::llm(format!("Invalid image content type: {}", e)))?;

        let mut form = multipart::Form::new()
            .text("model", self.image_model.clone())
            .text("prompt", prompt.to_string())
            .text("n", "1")
            .text("size", self.image_size.clone())
            .part("image", part);
        if self.wants_response_format() {
            form = form.text("response_format", "b64_json");
        }

        let response = self
            .client
            .post(format!("{}/images/edits", API_BASE))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SnapscribeError::llm(format!("Image edit request failed: {}", e)))?;

        let result = Self::read_json(response, "image edit").await?;
        Self::image_from_response(&result)
    }
}
