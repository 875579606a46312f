//! # 图片转换流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 栅格 → 目标格式字节”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//! 栅格保持源图原生尺寸，转换不做几何变换。
//!
//! ## 实现思路
//!
//! 1. 读取原始字节并校验体积
//! 2. 仅凭 header 尺寸按像素/内存上限快速拒绝
//! 3. 完整解码为栅格
//! 4. 按能力表逐格式编码（质量参数来自配置快照）
//! 5. 按发射方式产出：内联 Data URI 或托管产物文件

use std::fs;
use std::io::Cursor;
use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use chrono::Local;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};

use super::formats::{EmissionMode, FormatSpec};
use super::handler::ConvertHandler;
use super::source::{Artifact, ArtifactPayload, SourceFile};
use super::{ConvertConfig, ConvertError};

impl ConvertHandler {
    /// 图片路径主流程：解码为原生尺寸栅格并重编码为目标格式。
    pub(super) fn convert_image(
        &self,
        source: &SourceFile,
        spec: &'static FormatSpec,
        config: &ConvertConfig,
        artifacts_dir: &Path,
    ) -> Result<Artifact, ConvertError> {
        let bytes = fs::read(&source.path)
            .map_err(|e| ConvertError::Acquire(format!("读取源文件失败：{}", e)))?;

        let decoded = Self::decode_within_limits(&bytes, config)?;
        let (width, height) = decoded.dimensions();

        let encoded = Self::encode_image(&decoded, spec, config)?;

        log::info!(
            "🖼️ 图片重编码完成 - {} {}x{} -> {}（{}KB -> {}KB）",
            source.name,
            width,
            height,
            spec.token,
            bytes.len() / 1024,
            encoded.len() / 1024
        );

        Self::emit_artifact(encoded, spec, artifacts_dir)
    }

    /// 解码前先按 header 尺寸做限制检查，再完整解码。
    pub(super) fn decode_within_limits(
        bytes: &[u8],
        config: &ConvertConfig,
    ) -> Result<DynamicImage, ConvertError> {
        let (header_width, header_height) = Self::inspect_dimensions_from_memory(bytes)?;
        Self::validate_pixel_limits(config, header_width, header_height)?;
        Self::validate_decoded_memory_limits(config, header_width, header_height)?;

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ConvertError::Decode(format!("图片解码失败：{}", e)))?;

        let (width, height) = decoded.dimensions();
        Self::validate_pixel_limits(config, width, height)?;
        Self::validate_decoded_memory_limits(config, width, height)?;

        Ok(decoded)
    }

    /// 仅通过内存中的图片头信息读取宽高。
    ///
    /// 用于在完整解码前做像素限制检查。
    fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ConvertError> {
        let cursor = Cursor::new(bytes);
        let reader = ImageReader::new(cursor)
            .with_guessed_format()
            .map_err(|e| ConvertError::Decode(format!("无法识别图片格式：{}", e)))?;

        reader
            .into_dimensions()
            .map_err(|e| ConvertError::Decode(format!("无法读取图片尺寸：{}", e)))
    }

    /// 校验像素数量是否超过配置上限。
    pub(super) fn validate_pixel_limits(
        config: &ConvertConfig,
        width: u32,
        height: u32,
    ) -> Result<(), ConvertError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| ConvertError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > config.max_decoded_pixels {
            return Err(ConvertError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, config.max_decoded_pixels
            )));
        }

        Ok(())
    }

    pub(super) fn validate_decoded_memory_limits(
        config: &ConvertConfig,
        width: u32,
        height: u32,
    ) -> Result<(), ConvertError> {
        let estimated = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| ConvertError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > config.max_decoded_bytes {
            return Err(ConvertError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                config.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }

    /// 按能力表把栅格编码为目标格式字节。
    ///
    /// jpeg / bmp 不支持透明通道，先压平为 RGB；其余保留 RGBA。
    fn encode_image(
        image: &DynamicImage,
        spec: &'static FormatSpec,
        config: &ConvertConfig,
    ) -> Result<Vec<u8>, ConvertError> {
        let format = spec.image_format().ok_or_else(|| {
            ConvertError::InvalidFormat(format!("{} 不是图片目标格式", spec.token))
        })?;

        let mut cursor = Cursor::new(Vec::new());

        match format {
            ImageFormat::Jpeg => {
                let rgb = image.to_rgb8();
                let encoder = JpegEncoder::new_with_quality(&mut cursor, config.jpeg_quality);
                rgb.write_with_encoder(encoder)
                    .map_err(|e| ConvertError::Encode(format!("JPEG 编码失败：{}", e)))?;
            }
            ImageFormat::WebP => {
                let rgba = image.to_rgba8();
                let encoder = WebPEncoder::new_lossless(&mut cursor);
                rgba.write_with_encoder(encoder)
                    .map_err(|e| ConvertError::Encode(format!("WebP 编码失败：{}", e)))?;
            }
            ImageFormat::Avif => {
                let rgba = image.to_rgba8();
                let encoder = AvifEncoder::new_with_speed_quality(
                    &mut cursor,
                    config.avif_speed,
                    config.avif_quality,
                );
                rgba.write_with_encoder(encoder)
                    .map_err(|e| ConvertError::Encode(format!("AVIF 编码失败：{}", e)))?;
            }
            ImageFormat::Bmp => {
                let rgb = image.to_rgb8();
                DynamicImage::ImageRgb8(rgb)
                    .write_to(&mut cursor, ImageFormat::Bmp)
                    .map_err(|e| ConvertError::Encode(format!("BMP 编码失败：{}", e)))?;
            }
            other => {
                image
                    .write_to(&mut cursor, other)
                    .map_err(|e| ConvertError::Encode(format!("{} 编码失败：{}", spec.token, e)))?;
            }
        }

        Ok(cursor.into_inner())
    }

    /// 按发射方式产出产物。
    fn emit_artifact(
        encoded: Vec<u8>,
        spec: &'static FormatSpec,
        artifacts_dir: &Path,
    ) -> Result<Artifact, ConvertError> {
        let size = encoded.len() as u64;
        let payload = match spec.emission {
            EmissionMode::DataUri => {
                let uri = format!(
                    "data:{};base64,{}",
                    spec.mime_type,
                    general_purpose::STANDARD.encode(&encoded)
                );
                ArtifactPayload::DataUri(uri)
            }
            EmissionMode::BlobFile => {
                let timestamp = Local::now().format("%Y%m%d%H%M%S%f");
                let file_name = format!("art_{}.{}", timestamp, spec.token);
                let path = artifacts_dir.join(file_name);
                fs::write(&path, &encoded)
                    .map_err(|e| ConvertError::Encode(format!("写入产物文件失败：{}", e)))?;
                ArtifactPayload::File(path)
            }
        };

        Ok(Artifact {
            format: spec,
            suggested_name: spec.suggested_file_name(),
            payload,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::formats::{self, MediaKind};
    use image::{ImageBuffer, Rgba};

    fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let r = (x % 255) as u8;
            let g = (y % 255) as u8;
            let b = ((x + y) % 255) as u8;
            Rgba([r, g, b, 255])
        });

        let dyn_img = DynamicImage::ImageRgba8(img);
        let mut cursor = Cursor::new(Vec::new());
        dyn_img
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    #[test]
    fn decode_rejects_too_many_pixels() {
        let mut config = ConvertConfig::default();
        config.max_decoded_pixels = 1_000_000;

        let png = create_png_bytes(2000, 2000);
        let result = ConvertHandler::decode_within_limits(&png, &config);
        assert!(matches!(result, Err(ConvertError::ResourceLimit(_))));
    }

    #[test]
    fn decode_rejects_garbage_bytes() {
        let config = ConvertConfig::default();
        let result = ConvertHandler::decode_within_limits(b"definitely not an image", &config);
        assert!(matches!(result, Err(ConvertError::Decode(_))));
    }

    #[test]
    fn jpeg_reencode_produces_decodable_bytes() {
        let config = ConvertConfig::default();
        let png = create_png_bytes(64, 48);
        let decoded = ConvertHandler::decode_within_limits(&png, &config)
            .expect("decode should succeed");

        let spec = formats::lookup(MediaKind::Image, "jpeg").expect("jpeg should resolve");
        let encoded = ConvertHandler::encode_image(&decoded, spec, &config)
            .expect("jpeg encode should succeed");

        let roundtrip = image::load_from_memory(&encoded).expect("jpeg decode should succeed");
        assert_eq!(roundtrip.dimensions(), (64, 48));
    }
}
