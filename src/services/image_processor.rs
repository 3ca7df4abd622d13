// src/services/image_processor.rs
use crate::errors::SnapscribeError;
use crate::models::{SUPPORTED_CONTENT_TYPES, is_supported_content_type};
use base64::{Engine as _, engine::general_purpose};
use image::{DynamicImage, GenericImageView, ImageFormat as ImgFormat};
use log::warn;

/// A decoded, size-checked image ready to hand to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    pub data: Vec<u8>,
    pub content_type: String,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

impl PreparedImage {
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.data)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.content_type, self.to_base64())
    }
}

pub struct ImageProcessor {
    max_dimension: u32,
    resize_target: u32,
}

impl ImageProcessor {
    pub fn new(max_dimension: u32, resize_target: u32) -> Self {
        Self {
            max_dimension,
            resize_target,
        }
    }

    /// Accepts plain base64 or a `data:<mime>;base64,` URL; whitespace is ignored.
    pub fn decode_payload(&self, payload: &str) -> Result<Vec<u8>, SnapscribeError> {
        let body = match payload.split_once(";base64,") {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => payload,
        };
        let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();

        general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| SnapscribeError::ImageProcessing(format!("imageData is not valid base64: {}", e)))
    }

    pub fn validate_image(&self, data: &[u8]) -> Result<(u32, u32), SnapscribeError> {
        let img = image::load_from_memory(data)
            .map_err(|e| SnapscribeError::ImageProcessing(format!("Invalid image format: {}", e)))?;

        let (width, height) = img.dimensions();

        if width > self.max_dimension || height > self.max_dimension {
            return Err(SnapscribeError::ImageProcessing(format!(
                "Image dimensions {}x{} exceed {}x{}",
                width, height, self.max_dimension, self.max_dimension
            )));
        }

        Ok((width, height))
    }

    /// Decodes, checks and downsizes the payload. The sniffed format wins
    /// over the declared content type.
    pub fn prepare(
        &self,
        payload: &str,
        declared_content_type: &str,
        file_name: &str,
    ) -> Result<PreparedImage, SnapscribeError> {
        let raw = self.decode_payload(payload)?;
        self.validate_image(&raw)?;

        let mut content_type = declared_content_type.trim().to_ascii_lowercase();
        let detected = match detect_content_type(&raw) {
            Some(detected) if is_supported_content_type(detected) => detected,
            other => {
                return Err(SnapscribeError::ImageProcessing(format!(
                    "Image format {} is not supported, expected one of {}",
                    other.unwrap_or("(unrecognised)"),
                    SUPPORTED_CONTENT_TYPES.join(", ")
                )));
            }
        };
        if !same_mime(detected, &content_type) {
            warn!(
                "Declared content type {} for '{}' does not match detected {}",
                content_type, file_name, detected
            );
            content_type = detected.to_string();
        }

        let data = self.resize_if_needed(&raw, self.resize_target)?;
        if data != raw {
            content_type = "image/png".to_string();
        }
        let (width, height) = dimensions(&data)?;

        Ok(PreparedImage {
            data,
            content_type,
            file_name: file_name.to_string(),
            width,
            height,
        })
    }

    pub fn resize_if_needed(&self, data: &[u8], max_size: u32) -> Result<Vec<u8>, SnapscribeError> {
        let img = load(data)?;

        let (width, height) = img.dimensions();

        if width <= max_size && height <= max_size {
            return Ok(data.to_vec());
        }

        let ratio = (max_size as f32 / width.max(height) as f32).min(1.0);
        let new_width = ((width as f32 * ratio) as u32).max(1);
        let new_height = ((height as f32 * ratio) as u32).max(1);

        let resized = img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3);
        encode(&resized, ImgFormat::Png)
    }

    /// Some providers cap the upload size. Base64 adds about a third, so the
    /// budget is on raw bytes.
    pub fn shrink_to_byte_budget(
        &self,
        image: &PreparedImage,
        max_bytes: usize,
    ) -> Result<PreparedImage, SnapscribeError> {
        if image.data.len() <= max_bytes {
            return Ok(image.clone());
        }

        let img = load(&image.data)?;
        let (width, height) = img.dimensions();

        let scale_factor = ((max_bytes as f64 / image.data.len() as f64).sqrt() * 0.9) as f32;
        let new_width = ((width as f32 * scale_factor) as u32).max(256).min(width);
        let new_height = ((height as f32 * scale_factor) as u32).max(256).min(height);

        let resized = img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3);
        // JPEG has no alpha channel.
        let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
        let data = encode(&rgb, ImgFormat::Jpeg)?;
        let (width, height) = rgb.dimensions();

        Ok(PreparedImage {
            data,
            content_type: "image/jpeg".to_string(),
            file_name: image.file_name.clone(),
            width,
            height,
        })
    }
}

pub fn detect_content_type(data: &[u8]) -> Option<&'static str> {
    match image::guess_format(data).ok()? {
        ImgFormat::Png => Some("image/png"),
        ImgFormat::Jpeg => Some("image/jpeg"),
        ImgFormat::Gif => Some("image/gif"),
        ImgFormat::WebP => Some("image/webp"),
        ImgFormat::Bmp => Some("image/bmp"),
        _ => None,
    }
}

fn same_mime(detected: &str, declared: &str) -> bool {
    detected == declared || (detected == "image/jpeg" && declared == "image/jpg")
}

fn load(data: &[u8]) -> Result<DynamicImage, SnapscribeError> {
    image::load_from_memory(data)
        .map_err(|e| SnapscribeError::ImageProcessing(format!("Failed to load image: {}", e)))
}

fn dimensions(data: &[u8]) -> Result<(u32, u32), SnapscribeError> {
    Ok(load(data)?.dimensions())
}

fn encode(img: &DynamicImage, format: ImgFormat) -> Result<Vec<u8>, SnapscribeError> {
    let mut output = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut output), format)
        .map_err(|e| SnapscribeError::ImageProcessing(format!("Failed to encode image: {}", e)))?;
    Ok(output)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        encode(&DynamicImage::ImageRgb8(img), ImgFormat::Png).unwrap()
    }

    fn processor() -> ImageProcessor {
        ImageProcessor::new(4096, 2048)
    }

    #[test]
    fn decode_accepts_data_urls_and_whitespace() {
        let p = processor();
        assert_eq!(p.decode_payload("aGVs\nbG8=").unwrap(), b"hello");
        assert_eq!(p.decode_payload("data:image/png;base64,aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = processor().decode_payload("not base64 !!").unwrap_err();
        assert!(matches!(err, SnapscribeError::ImageProcessing(_)));
    }

    #[test]
    fn validate_rejects_non_images_and_oversized() {
        assert!(processor().validate_image(b"hello").is_err());

        let small = ImageProcessor::new(16, 16);
        assert!(small.validate_image(&sample_png(32, 8)).is_err());
        assert_eq!(small.validate_image(&sample_png(16, 8)).unwrap(), (16, 8));
    }

    #[test]
    fn resize_only_when_larger() {
        let p = processor();
        let png = sample_png(40, 20);
        assert_eq!(p.resize_if_needed(&png, 64).unwrap(), png);

        let resized = p.resize_if_needed(&png, 10).unwrap();
        assert_eq!(dimensions(&resized).unwrap(), (10, 5));
    }

    #[test]
    fn prepare_trusts_detected_format() {
        let p = ImageProcessor::new(4096, 64);
        let payload = general_purpose::STANDARD.encode(sample_png(8, 8));
        let image = p.prepare(&payload, "image/jpeg", "dog.jpg").unwrap();
        assert_eq!(image.content_type, "image/png");
        assert_eq!((image.width, image.height), (8, 8));
        assert_eq!(image.file_name, "dog.jpg");
        assert!(image.data_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn prepare_rejects_formats_outside_supported_list() {
        let p = processor();
        let img = DynamicImage::ImageRgb8(RgbImage::new(8, 8));

        for format in [ImgFormat::Bmp, ImgFormat::Tiff] {
            let bytes = encode(&img, format).unwrap();
            assert!(p.validate_image(&bytes).is_ok());

            let payload = general_purpose::STANDARD.encode(&bytes);
            let err = p.prepare(&payload, "image/png", "x.png").unwrap_err();
            assert!(
                matches!(err, SnapscribeError::ImageProcessing(_)),
                "{:?} should be rejected",
                format
            );
        }
    }

    #[test]
    fn prepare_downsizes_large_images() {
        let p = ImageProcessor::new(4096, 16);
        let payload = general_purpose::STANDARD.encode(sample_png(64, 32));
        let image = p.prepare(&payload, "image/png", "").unwrap();
        assert_eq!((image.width, image.height), (16, 8));
    }

    #[test]
    fn byte_budget_leaves_small_images_alone() {
        let p = processor();
        let payload = general_purpose::STANDARD.encode(sample_png(8, 8));
        let image = p.prepare(&payload, "image/png", "a.png").unwrap();
        let shrunk = p.shrink_to_byte_budget(&image, 1_000_000).unwrap();
        assert_eq!(shrunk, image);
    }

    #[test]
    fn byte_budget_reencodes_as_jpeg() {
        let p = processor();
        let payload = general_purpose::STANDARD.encode(sample_png(300, 300));
        let image = p.prepare(&payload, "image/png", "a.png").unwrap();
        let shrunk = p.shrink_to_byte_budget(&image, 100).unwrap();
        assert_eq!(shrunk.content_type, "image/jpeg");
        assert_eq!(detect_content_type(&shrunk.data), Some("image/jpeg"));
        assert!(shrunk.width >= 256 && shrunk.height >= 256);
    }
}
