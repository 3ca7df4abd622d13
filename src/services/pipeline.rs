// src/services/pipeline.rs
use crate::errors::SnapscribeError;
use crate::models::{ImageAnalysisRequest, ImageAnalysisResult, ModeOutput, ProcessingMode};
use crate::services::image_processor::PreparedImage;
use crate::services::llm_service::ImageInsights;
use crate::services::{ImageProcessor, LLMService};
use base64::{Engine as _, engine::general_purpose};
use log::{info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const ANALYSIS_PHASE: &str = "image analysis";
const DESCRIPTION_PHASE: &str = "description generation";
const REGENERATION_PHASE: &str = "image regeneration";
const CAPTION_PHASE: &str = "caption generation";
const OVERLAY_PHASE: &str = "caption overlay";

/// Runs one request through the workflow its mode selects.
///
/// Validation and decoding failures are returned as errors before any
/// provider is called. Provider failures end the run early and are recorded
/// in `metrics.error_info`; the partial result is still returned.
pub struct ImagePipeline {
    llm_service: Arc<LLMService>,
    image_processor: Arc<ImageProcessor>,
}

impl ImagePipeline {
    pub fn new(llm_service: Arc<LLMService>, image_processor: Arc<ImageProcessor>) -> Self {
        Self {
            llm_service,
            image_processor,
        }
    }

    pub async fn process(
        &self,
        request: &ImageAnalysisRequest,
    ) -> Result<ImageAnalysisResult, SnapscribeError> {
        request.validate()?;

        let run_id = Uuid::new_v4();
        let image = self.image_processor.prepare(
            &request.image_data,
            &request.content_type,
            &request.file_name,
        )?;
        let image = match self.llm_service.vision_image_limit() {
            Some(limit) => self.image_processor.shrink_to_byte_budget(&image, limit)?,
            None => image,
        };

        info!(
            "[{}] Processing '{}' ({}x{}, {} bytes) in {} mode via {}",
            run_id,
            request.file_name,
            image.width,
            image.height,
            image.data.len(),
            request.mode,
            self.llm_service.vision_provider()
        );

        let mut result = ImageAnalysisResult::for_mode(request.mode);
        match request.mode {
            ProcessingMode::ImageRegeneration => {
                self.regenerate(&image, request.description_length, &mut result)
                    .await
            }
            ProcessingMode::MemeGeneration => self.make_meme(&image, &mut result).await,
        }

        if result.metrics.succeeded() {
            info!(
                "[{}] Completed in {} ms (output complete: {})",
                run_id,
                result.metrics.total_processing_time_ms(),
                result.is_complete()
            );
        } else {
            warn!(
                "[{}] Stopped after {} ms: {}",
                run_id,
                result.metrics.total_processing_time_ms(),
                result.metrics.error_info.as_deref().unwrap_or_default()
            );
        }

        Ok(result)
    }

    async fn analyze(
        &self,
        image: &PreparedImage,
        result: &mut ImageAnalysisResult,
    ) -> Option<ImageInsights> {
        let (outcome, elapsed) = timed(self.llm_service.analyze_image(image)).await;
        result.metrics.image_analysis_time_ms = elapsed;

        let insights = record(result, ANALYSIS_PHASE, outcome)?;
        result.tags = insights.tags.clone();
        result.set_confidence(insights.confidence);
        Some(insights)
    }

    async fn regenerate(
        &self,
        image: &PreparedImage,
        word_count: u32,
        result: &mut ImageAnalysisResult,
    ) {
        let Some(insights) = self.analyze(image, result).await else {
            return;
        };

        let (outcome, elapsed) =
            timed(self.llm_service.describe_image(image, &insights, word_count)).await;
        result.metrics.description_generation_time_ms = elapsed;
        let Some(description) = record(result, DESCRIPTION_PHASE, outcome) else {
            return;
        };
        result.metrics.description_tokens_used = description.tokens_used;
        result.description = description.text;

        let (outcome, elapsed) =
            timed(self.llm_service.regenerate_image(&result.description)).await;
        result.metrics.image_regeneration_time_ms = elapsed;
        let Some(generated) = record(result, REGENERATION_PHASE, outcome) else {
            return;
        };
        result.metrics.regeneration_tokens_used = generated.tokens_used;
        result.output = ModeOutput::ImageRegeneration {
            regenerated_image_data: Some(general_purpose::STANDARD.encode(&generated.data)),
            regenerated_image_content_type: generated.content_type,
        };
    }

    async fn make_meme(&self, image: &PreparedImage, result: &mut ImageAnalysisResult) {
        let Some(insights) = self.analyze(image, result).await else {
            return;
        };
        result.description = insights.summary.clone();

        let (outcome, elapsed) = timed(self.llm_service.caption_image(image, &insights)).await;
        result.metrics.description_generation_time_ms = elapsed;
        let Some(caption) = record(result, CAPTION_PHASE, outcome) else {
            return;
        };
        result.metrics.description_tokens_used = caption.tokens_used;
        result.output = ModeOutput::MemeGeneration {
            meme_image_data: None,
            meme_caption: Some(caption.text.clone()),
        };

        let (outcome, elapsed) =
            timed(self.llm_service.overlay_caption(image, &caption.text)).await;
        result.metrics.image_regeneration_time_ms = elapsed;
        let Some(meme) = record(result, OVERLAY_PHASE, outcome) else {
            return;
        };
        result.metrics.regeneration_tokens_used = meme.tokens_used;
        result.output = ModeOutput::MemeGeneration {
            meme_image_data: Some(general_purpose::STANDARD.encode(&meme.data)),
            meme_caption: Some(caption.text),
        };
    }
}

async fn timed<T>(future: impl Future<Output = T>) -> (T, u64) {
    let start = Instant::now();
    let output = future.await;
    (output, start.elapsed().as_millis() as u64)
}

fn record<T>(
    result: &mut ImageAnalysisResult,
    phase: &str,
    outcome: Result<T, SnapscribeError>,
) -> Option<T> {
    match outcome {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                "{} failed ({}): {}",
                phase,
                if e.is_transient() { "transient" } else { "permanent" },
                e
            );
            result.metrics.record_error(phase, &e);
            None
        }
    }
}
