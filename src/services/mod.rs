// src/services/mod.rs
pub mod anthropic;
pub mod image_processor;
pub mod llm_service;
pub mod openai;
pub mod pipeline;

#[cfg(test)]
pub mod mock;

pub use image_processor::ImageProcessor;
pub use llm_service::LLMService;
pub use pipeline::ImagePipeline;
