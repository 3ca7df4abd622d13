// src/services/llm_service.rs
use crate::config::AppConfig;
use crate::errors::SnapscribeError;
use crate::services::anthropic::AnthropicClient;
use crate::services::image_processor::PreparedImage;
use crate::services::openai::OpenAiClient;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

const MAX_TAGS: usize = 10;

/// Text answer from a vision model plus what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct TextCompletion {
    pub text: String,
    pub tokens_used: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub data: Vec<u8>,
    pub content_type: String,
    pub tokens_used: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageInsights {
    pub summary: String,
    pub tags: Vec<String>,
    pub confidence: f32,
    pub tokens_used: u64,
}

#[async_trait]
pub trait VisionModel: Send + Sync {
    fn name(&self) -> &str;

    /// Largest raw image the provider accepts, if it has a limit.
    fn max_image_bytes(&self) -> Option<usize> {
        None
    }

    async fn complete(
        &self,
        prompt: &str,
        image: &PreparedImage,
        max_tokens: u32,
    ) -> Result<TextCompletion, SnapscribeError>;
}

#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, SnapscribeError>;

    async fn edit(
        &self,
        image: &PreparedImage,
        prompt: &str,
    ) -> Result<GeneratedImage, SnapscribeError>;
}

const ANALYSIS_PROMPT: &str = r#"
Analyze this image. Provide:

1. SUMMARY: one or two sentences describing the main subject and setting.
2. TAGS: up to 10 short lowercase labels for the objects, scene, style and mood.
3. CONFIDENCE: how sure you are of the analysis, from 0.0 to 1.0.

Return only JSON matching this structure:
{
    "summary": "...",
    "tags": ["..."],
    "confidence": 0.0
}
"#;

const CAPTION_PROMPT: &str = r#"
Write a single funny meme caption for this image.
Keep it under 12 words, suitable for top/bottom meme lettering, and avoid hashtags or emoji.
Known context about the image: {summary}
Reply with the caption text only.
"#;

const DESCRIPTION_PROMPT: &str = r#"
Describe this image in approximately {words} words so that an image generation model could recreate it as closely as possible.
Cover the subjects, their arrangement, colors, lighting, textures, art style, camera angle and mood.
Known context about the image: {summary}
Reply with the description text only.
"#;

pub struct LLMService {
    vision: Arc<dyn VisionModel>,
    images: Arc<dyn ImageModel>,
}

impl LLMService {
    pub fn new(vision: Arc<dyn VisionModel>, images: Arc<dyn ImageModel>) -> Self {
        Self { vision, images }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, SnapscribeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SnapscribeError::Configuration(format!("HTTP client: {}", e)))?;

        let openai = Arc::new(OpenAiClient::new(
            client.clone(),
            config.openai_api_key.clone(),
            config.openai_vision_model.clone(),
            config.image_model.clone(),
            config.image_size.clone(),
        ));

        let vision: Arc<dyn VisionModel> = match config.vision_provider.as_str() {
            "openai" => openai.clone(),
            "anthropic" => {
                let key = config.anthropic_api_key.clone().ok_or_else(|| {
                    SnapscribeError::Configuration("Anthropic API key not configured".to_string())
                })?;
                Arc::new(AnthropicClient::new(client, key, config.anthropic_model.clone()))
            }
            other => return Err(SnapscribeError::InvalidProvider(other.to_string())),
        };

        Ok(Self::new(vision, openai))
    }

    pub fn vision_provider(&self) -> &str {
        self.vision.name()
    }

    pub fn vision_image_limit(&self) -> Option<usize> {
        self.vision.max_image_bytes()
    }

    pub async fn analyze_image(
        &self,
        image: &PreparedImage,
    ) -> Result<ImageInsights, SnapscribeError> {
        let completion = self.vision.complete(ANALYSIS_PROMPT, image, 1024).await?;
        debug!(
            "{} analysis used {} tokens",
            self.vision.name(),
            completion.tokens_used
        );
        parse_insights(&completion)
    }

    pub async fn describe_image(
        &self,
        image: &PreparedImage,
        insights: &ImageInsights,
        word_count: u32,
    ) -> Result<TextCompletion, SnapscribeError> {
        let prompt = DESCRIPTION_PROMPT
            .replace("{words}", &word_count.to_string())
            .replace("{summary}", &insights.summary);
        // Roughly 4/3 tokens per word, with headroom.
        let max_tokens = word_count * 2 + 256;

        let completion = self.vision.complete(&prompt, image, max_tokens).await?;
        let text = completion.text.trim().to_string();
        if text.is_empty() {
            return Err(SnapscribeError::llm("Empty description in response"));
        }
        Ok(TextCompletion {
            text,
            tokens_used: completion.tokens_used,
        })
    }

    pub async fn caption_image(
        &self,
        image: &PreparedImage,
        insights: &ImageInsights,
    ) -> Result<TextCompletion, SnapscribeError> {
        let prompt = CAPTION_PROMPT.replace("{summary}", &insights.summary);
        let completion = self.vision.complete(&prompt, image, 100).await?;

        let caption = clean_caption(&completion.text);
        if caption.is_empty() {
            return Err(SnapscribeError::llm("Empty caption in response"));
        }
        Ok(TextCompletion {
            text: caption,
            tokens_used: completion.tokens_used,
        })
    }

    pub async fn regenerate_image(
        &self,
        description: &str,
    ) -> Result<GeneratedImage, SnapscribeError> {
        self.images.generate(description).await
    }

    pub async fn overlay_caption(
        &self,
        image: &PreparedImage,
        caption: &str,
    ) -> Result<GeneratedImage, SnapscribeError> {
        let prompt = format!(
            "Turn this image into a classic meme. Keep the original picture unchanged and \
             overlay the caption \"{}\" in bold white uppercase Impact lettering with a black \
             outline, centered at the bottom of the image. Do not add any other text.",
            caption.replace('"', "'")
        );
        self.images.edit(image, &prompt).await
    }
}

/// Models often wrap JSON in a markdown fence even when told not to.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

pub fn parse_insights(completion: &TextCompletion) -> Result<ImageInsights, SnapscribeError> {
    let data: serde_json::Value = serde_json::from_str(extract_json(&completion.text))
        .map_err(|e| SnapscribeError::llm(format!("Failed to parse analysis JSON: {}", e)))?;

    let summary = data["summary"].as_str().unwrap_or("").trim().to_string();

    let mut tags: Vec<String> = Vec::new();
    for tag in data["tags"].as_array().into_iter().flatten() {
        let Some(tag) = tag.as_str() else { continue };
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags.truncate(MAX_TAGS);

    let confidence = data["confidence"]
        .as_f64()
        .map(|c| c.clamp(0.0, 1.0) as f32)
        .unwrap_or(0.0);

    Ok(ImageInsights {
        summary,
        tags,
        confidence,
        tokens_used: completion.tokens_used,
    })
}

fn clean_caption(text: &str) -> String {
    let first_line = text.trim().lines().next().unwrap_or("").trim();
    first_line
        .trim_matches(|c| c == '"' || c == '\'' || c == '“' || c == '”')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mock::{ScriptedImages, ScriptedVision, sample_image};

    fn completion(text: &str) -> TextCompletion {
        TextCompletion {
            text: text.to_string(),
            tokens_used: 42,
        }
    }

    #[test]
    fn insights_from_fenced_json() {
        let text = "```json\n{\"summary\": \"A dog on a beach.\", \"tags\": [\"Dog\", \" beach \", \"dog\", \"\"], \"confidence\": 0.9}\n```";
        let insights = parse_insights(&completion(text)).unwrap();
        assert_eq!(insights.summary, "A dog on a beach.");
        assert_eq!(insights.tags, vec!["dog", "beach"]);
        assert!((insights.confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(insights.tokens_used, 42);
    }

    #[test]
    fn confidence_is_clamped_and_defaults_to_zero() {
        let high = parse_insights(&completion(r#"{"confidence": 3.5}"#)).unwrap();
        assert_eq!(high.confidence, 1.0);
        let missing = parse_insights(&completion(r#"{"summary": "x"}"#)).unwrap();
        assert_eq!(missing.confidence, 0.0);
        assert!(missing.tags.is_empty());
    }

    #[test]
    fn tags_are_capped() {
        let tags: Vec<String> = (0..15).map(|i| format!("\"t{}\"", i)).collect();
        let text = format!(r#"{{"tags": [{}]}}"#, tags.join(","));
        let insights = parse_insights(&completion(&text)).unwrap();
        assert_eq!(insights.tags.len(), MAX_TAGS);
        assert_eq!(insights.tags[0], "t0");
    }

    #[test]
    fn non_json_analysis_is_an_llm_error() {
        let err = parse_insights(&completion("I cannot help with that.")).unwrap_err();
        assert!(matches!(err, SnapscribeError::LLM { .. }));
    }

    #[test]
    fn caption_quotes_are_stripped() {
        assert_eq!(clean_caption("  \"Me after one coffee\"\n(extra)"), "Me after one coffee");
        assert_eq!(clean_caption("“Monday again”"), "Monday again");
    }

    #[tokio::test]
    async fn description_prompt_carries_word_count() {
        let vision = Arc::new(ScriptedVision::new(vec![Ok(completion("  A long description.  "))]));
        let service = LLMService::new(vision.clone(), Arc::new(ScriptedImages::new(vec![])));
        let insights = ImageInsights {
            summary: "A red barn".to_string(),
            tags: vec![],
            confidence: 0.5,
            tokens_used: 0,
        };

        let description = service
            .describe_image(&sample_image(), &insights, 350)
            .await
            .unwrap();
        assert_eq!(description.text, "A long description.");

        let prompts = vision.prompts();
        assert!(prompts[0].contains("approximately 350 words"));
        assert!(prompts[0].contains("A red barn"));
    }

    #[tokio::test]
    async fn empty_caption_is_an_error() {
        let vision = Arc::new(ScriptedVision::new(vec![Ok(completion("\"\""))]));
        let service = LLMService::new(vision, Arc::new(ScriptedImages::new(vec![])));
        let insights = parse_insights(&completion("{}")).unwrap();
        assert!(service.caption_image(&sample_image(), &insights).await.is_err());
    }

    #[tokio::test]
    async fn overlay_prompt_contains_caption() {
        let images = Arc::new(ScriptedImages::new(vec![Ok(GeneratedImage {
            data: vec![1, 2, 3],
            content_type: "image/png".to_string(),
            tokens_used: 7,
        })]));
        let service = LLMService::new(Arc::new(ScriptedVision::new(vec![])), images.clone());

        let meme = service
            .overlay_caption(&sample_image(), "say \"cheese\"")
            .await
            .unwrap();
        assert_eq!(meme.data, vec![1, 2, 3]);
        assert!(images.prompts()[0].contains("say 'cheese'"));
    }
}
