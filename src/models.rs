// src/models.rs
use crate::errors::ValidationErrors;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const MIN_DESCRIPTION_LENGTH: u32 = 200;
pub const MAX_DESCRIPTION_LENGTH: u32 = 500;
pub const DEFAULT_DESCRIPTION_LENGTH: u32 = MIN_DESCRIPTION_LENGTH;
pub const DEFAULT_REGENERATED_CONTENT_TYPE: &str = "image/png";

pub const SUPPORTED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingMode {
    /// analyze → describe → regenerate
    #[default]
    ImageRegeneration,
    /// analyze → caption → overlay the caption on the original
    MemeGeneration,
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingMode::ImageRegeneration => write!(f, "ImageRegeneration"),
            ProcessingMode::MemeGeneration => write!(f, "MemeGeneration"),
        }
    }
}

impl FromStr for ProcessingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', '-'], "");
        match normalized.as_str() {
            "imageregeneration" | "0" => Ok(ProcessingMode::ImageRegeneration),
            "memegeneration" | "1" => Ok(ProcessingMode::MemeGeneration),
            _ => Err(format!("unknown processing mode '{}'", s.trim())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageAnalysisRequest {
    pub image_data: String,
    pub content_type: String,
    pub file_name: String,
    pub description_length: u32,
    pub mode: ProcessingMode,
}

impl Default for ImageAnalysisRequest {
    fn default() -> Self {
        Self {
            image_data: String::new(),
            content_type: String::new(),
            file_name: String::new(),
            description_length: DEFAULT_DESCRIPTION_LENGTH,
            mode: ProcessingMode::default(),
        }
    }
}

impl ImageAnalysisRequest {
    /// Checks every rule and reports all failures, not just the first.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if self.image_data.trim().is_empty() {
            errors.push("imageData", "is required");
        }

        let content_type = self.content_type.trim();
        if content_type.is_empty() {
            errors.push("contentType", "is required");
        } else if !is_supported_content_type(content_type) {
            errors.push(
                "contentType",
                format!(
                    "'{}' is not supported, expected one of {}",
                    content_type,
                    SUPPORTED_CONTENT_TYPES.join(", ")
                ),
            );
        }

        if !(MIN_DESCRIPTION_LENGTH..=MAX_DESCRIPTION_LENGTH).contains(&self.description_length) {
            errors.push(
                "descriptionLength",
                format!(
                    "must be between {} and {}, got {}",
                    MIN_DESCRIPTION_LENGTH, MAX_DESCRIPTION_LENGTH, self.description_length
                ),
            );
        }

        errors.into_result()
    }
}

pub fn is_supported_content_type(content_type: &str) -> bool {
    SUPPORTED_CONTENT_TYPES
        .iter()
        .any(|ct| ct.eq_ignore_ascii_case(content_type))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingMetrics {
    pub image_analysis_time_ms: u64,
    pub description_generation_time_ms: u64,
    pub image_regeneration_time_ms: u64,
    pub description_tokens_used: u64,
    pub regeneration_tokens_used: u64,
    pub error_info: Option<String>,
}

impl ProcessingMetrics {
    /// Always recomputed from the phase timings so it cannot drift.
    pub fn total_processing_time_ms(&self) -> u64 {
        self.image_analysis_time_ms
            .saturating_add(self.description_generation_time_ms)
            .saturating_add(self.image_regeneration_time_ms)
    }

    pub fn record_error(&mut self, phase: &str, message: impl fmt::Display) {
        self.error_info = Some(format!("{} failed: {}", phase, message));
    }

    pub fn succeeded(&self) -> bool {
        self.error_info.is_none()
    }
}

// The derived total goes out on the wire but is never read back.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsView<'a> {
    image_analysis_time_ms: u64,
    description_generation_time_ms: u64,
    image_regeneration_time_ms: u64,
    description_tokens_used: u64,
    regeneration_tokens_used: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_info: Option<&'a str>,
    total_processing_time_ms: u64,
}

impl Serialize for ProcessingMetrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MetricsView {
            image_analysis_time_ms: self.image_analysis_time_ms,
            description_generation_time_ms: self.description_generation_time_ms,
            image_regeneration_time_ms: self.image_regeneration_time_ms,
            description_tokens_used: self.description_tokens_used,
            regeneration_tokens_used: self.regeneration_tokens_used,
            error_info: self.error_info.as_deref(),
            total_processing_time_ms: self.total_processing_time_ms(),
        }
        .serialize(serializer)
    }
}

fn default_regenerated_content_type() -> String {
    DEFAULT_REGENERATED_CONTENT_TYPE.to_string()
}

/// Mode-specific output. Only the fields of the request's mode can exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum ModeOutput {
    #[serde(rename_all = "camelCase")]
    ImageRegeneration {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        regenerated_image_data: Option<String>,
        #[serde(default = "default_regenerated_content_type")]
        regenerated_image_content_type: String,
    },
    #[serde(rename_all = "camelCase")]
    MemeGeneration {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meme_image_data: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meme_caption: Option<String>,
    },
}

impl ModeOutput {
    pub fn empty(mode: ProcessingMode) -> Self {
        match mode {
            ProcessingMode::ImageRegeneration => ModeOutput::ImageRegeneration {
                regenerated_image_data: None,
                regenerated_image_content_type: default_regenerated_content_type(),
            },
            ProcessingMode::MemeGeneration => ModeOutput::MemeGeneration {
                meme_image_data: None,
                meme_caption: None,
            },
        }
    }

    pub fn mode(&self) -> ProcessingMode {
        match self {
            ModeOutput::ImageRegeneration { .. } => ProcessingMode::ImageRegeneration,
            ModeOutput::MemeGeneration { .. } => ProcessingMode::MemeGeneration,
        }
    }
}

impl Default for ModeOutput {
    fn default() -> Self {
        ModeOutput::empty(ProcessingMode::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysisResult {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "confidence_or_zero")]
    pub confidence_score: f32,
    #[serde(default)]
    pub metrics: ProcessingMetrics,
    #[serde(flatten)]
    pub output: ModeOutput,
}

// JSON has no NaN or infinity; serde_json writes them as null.
fn confidence_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(0.0))
}

impl ImageAnalysisResult {
    pub fn for_mode(mode: ProcessingMode) -> Self {
        Self {
            output: ModeOutput::empty(mode),
            ..Default::default()
        }
    }

    /// Stores the score as given; NaN and infinities become 0.0.
    pub fn set_confidence(&mut self, score: f32) {
        self.confidence_score = if score.is_finite() { score } else { 0.0 };
    }

    pub fn mode(&self) -> ProcessingMode {
        self.output.mode()
    }

    pub fn regenerated_image_data(&self) -> Option<&str> {
        match &self.output {
            ModeOutput::ImageRegeneration {
                regenerated_image_data,
                ..
            } => regenerated_image_data.as_deref(),
            _ => None,
        }
    }

    pub fn regenerated_image_content_type(&self) -> Option<&str> {
        match &self.output {
            ModeOutput::ImageRegeneration {
                regenerated_image_content_type,
                ..
            } => Some(regenerated_image_content_type),
            _ => None,
        }
    }

    pub fn meme_image_data(&self) -> Option<&str> {
        match &self.output {
            ModeOutput::MemeGeneration {
                meme_image_data, ..
            } => meme_image_data.as_deref(),
            _ => None,
        }
    }

    pub fn meme_caption(&self) -> Option<&str> {
        match &self.output {
            ModeOutput::MemeGeneration { meme_caption, .. } => meme_caption.as_deref(),
            _ => None,
        }
    }

    /// True when the output group for this result's mode is populated.
    pub fn is_complete(&self) -> bool {
        match &self.output {
            ModeOutput::ImageRegeneration {
                regenerated_image_data,
                ..
            } => regenerated_image_data.is_some(),
            ModeOutput::MemeGeneration {
                meme_image_data,
                meme_caption,
            } => meme_image_data.is_some() && meme_caption.is_some(),
        }
    }
}
