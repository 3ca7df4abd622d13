// src/services/mock.rs
// Scripted providers for tests: each call pops the next canned answer.
use crate::errors::SnapscribeError;
use crate::services::image_processor::PreparedImage;
use crate::services::image_processor::tests::sample_png;
use crate::services::llm_service::{GeneratedImage, ImageModel, TextCompletion, VisionModel};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

pub fn sample_image() -> PreparedImage {
    PreparedImage {
        data: sample_png(8, 8),
        content_type: "image/png".to_string(),
        file_name: "sample.png".to_string(),
        width: 8,
        height: 8,
    }
}

pub fn text(text: &str, tokens_used: u64) -> Result<TextCompletion, SnapscribeError> {
    Ok(TextCompletion {
        text: text.to_string(),
        tokens_used,
    })
}

pub fn png(tokens_used: u64) -> Result<GeneratedImage, SnapscribeError> {
    Ok(GeneratedImage {
        data: sample_png(4, 4),
        content_type: "image/png".to_string(),
        tokens_used,
    })
}

pub struct ScriptedVision {
    responses: Mutex<VecDeque<Result<TextCompletion, SnapscribeError>>>,
    prompts: Mutex<Vec<String>>,
    content_types: Mutex<Vec<String>>,
    limit: Option<usize>,
}

impl ScriptedVision {
    pub fn new(responses: Vec<Result<TextCompletion, SnapscribeError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            content_types: Mutex::new(Vec::new()),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn content_types(&self) -> Vec<String> {
        self.content_types.lock().unwrap().clone()
    }
}

#[async_trait]
impl VisionModel for ScriptedVision {
    fn name(&self) -> &str {
        "scripted"
    }

    fn max_image_bytes(&self) -> Option<usize> {
        self.limit
    }

    async fn complete(
        &self,
        prompt: &str,
        image: &PreparedImage,
        _max_tokens: u32,
    ) -> Result<TextCompletion, SnapscribeError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.content_types
            .lock()
            .unwrap()
            .push(image.content_type.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SnapscribeError::llm("no scripted vision response left")))
    }
}

pub struct ScriptedImages {
    responses: Mutex<VecDeque<Result<GeneratedImage, SnapscribeError>>>,
    prompts: Mutex<Vec<String>>,
    edited: Mutex<Vec<PreparedImage>>,
}

impl ScriptedImages {
    pub fn new(responses: Vec<Result<GeneratedImage, SnapscribeError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            edited: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn edited(&self) -> Vec<PreparedImage> {
        self.edited.lock().unwrap().clone()
    }

    fn next(&self, prompt: &str) -> Result<GeneratedImage, SnapscribeError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SnapscribeError::llm("no scripted image response left")))
    }
}

#[async_trait]
impl ImageModel for ScriptedImages {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, SnapscribeError> {
        self.next(prompt)
    }

    async fn edit(
        &self,
        image: &PreparedImage,
        prompt: &str,
    ) -> Result<GeneratedImage, SnapscribeError> {
        self.edited.lock().unwrap().push(image.clone());
        self.next(prompt)
    }
}
