//! # 预览生成模块
//!
//! ## 设计思路
//!
//! 预览是“源文件的一次性可展示渲染”，绝不改动源文件本身：
//! - 图片：解码 → 自适应降采样 → PNG → 自包含 Data URI
//! - 视频：只做指针创建，返回指向源文件的可撤销引用（前端经 asset 协议加载）
//!
//! 预览失败仅记日志并结束加载态，不产出半成品预览。
//!
//! ## 实现思路
//!
//! 降采样优先走 `fast_image_resize`，失败时回退 `image::resize_exact`。
//! 目标是把 Data URI 控制在事件通道可接受的体积内。

use std::fs;
use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use fast_image_resize as fr;
use image::{DynamicImage, GenericImageView, ImageBuffer, ImageFormat, Rgba};
use serde::Serialize;

use super::formats::MediaKind;
use super::handler::ConvertHandler;
use super::source::SourceFile;
use super::{ConvertConfig, ConvertError};

/// 可撤销的预览句柄。
///
/// `DataUri` 自包含；`FileRef` 仅是指针，释放时不删除源文件。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PreviewHandle {
    DataUri { data: String },
    FileRef { path: String },
}

impl ConvertHandler {
    /// 生成预览句柄。
    ///
    /// 视频路径开销远低于图片路径：不发生任何重编码。
    /// 不依赖处理器实例，便于在派生的异步任务中直接调用。
    pub fn build_preview(
        source: &SourceFile,
        config: &ConvertConfig,
    ) -> Result<PreviewHandle, ConvertError> {
        match source.kind {
            MediaKind::Video => Ok(PreviewHandle::FileRef {
                path: source.path.to_string_lossy().to_string(),
            }),
            MediaKind::Image => {
                let bytes = fs::read(&source.path)
                    .map_err(|e| ConvertError::Preview(format!("读取源文件失败：{}", e)))?;

                let decoded = Self::decode_within_limits(&bytes, config)
                    .map_err(|e| ConvertError::Preview(e.to_string()))?;
                let scaled = Self::maybe_downscale_for_preview(decoded, config)?;

                let mut cursor = Cursor::new(Vec::new());
                scaled
                    .write_to(&mut cursor, ImageFormat::Png)
                    .map_err(|e| ConvertError::Preview(format!("预览编码失败：{}", e)))?;

                let data = format!(
                    "data:image/png;base64,{}",
                    general_purpose::STANDARD.encode(cursor.into_inner())
                );
                Ok(PreviewHandle::DataUri { data })
            }
        }
    }

    /// 按配置执行自适应降采样。
    ///
    /// 目标是在视觉可接受范围内降低 Data URI 体积与编码耗时。
    fn maybe_downscale_for_preview(
        image: DynamicImage,
        config: &ConvertConfig,
    ) -> Result<DynamicImage, ConvertError> {
        let (width, height) = image.dimensions();
        let source_pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| ConvertError::ResourceLimit("图片像素数溢出".to_string()))?;

        let over_dimension =
            width > config.preview_max_dimension || height > config.preview_max_dimension;
        let over_pixels = source_pixels > config.preview_target_pixels;

        if !over_dimension && !over_pixels {
            return Ok(image);
        }

        let dimension_scale = (config.preview_max_dimension as f64 / width as f64)
            .min(config.preview_max_dimension as f64 / height as f64);
        let pixel_scale = (config.preview_target_pixels as f64 / source_pixels as f64).sqrt();

        let scale = dimension_scale.min(pixel_scale).min(1.0);

        if scale <= 0.0 {
            return Err(ConvertError::ResourceLimit("缩放比例计算异常".to_string()));
        }

        let target_width = ((width as f64 * scale).floor() as u32).max(1);
        let target_height = ((height as f64 * scale).floor() as u32).max(1);

        log::debug!(
            "🧩 预览降采样：{}x{} -> {}x{}（filter={:?}）",
            width,
            height,
            target_width,
            target_height,
            config.resize_filter
        );

        match Self::resize_with_fast_image_resize(
            &image,
            target_width,
            target_height,
            config.resize_filter,
        ) {
            Ok(resized) => Ok(resized),
            Err(err) => {
                log::warn!(
                    "⚠️ fast_image_resize 降采样失败，回退 image::resize_exact：{}",
                    err
                );
                Ok(image.resize_exact(target_width, target_height, config.resize_filter))
            }
        }
    }

    fn resize_with_fast_image_resize(
        image: &DynamicImage,
        target_width: u32,
        target_height: u32,
        filter: image::imageops::FilterType,
    ) -> Result<DynamicImage, ConvertError> {
        let src = image.to_rgba8();
        let (src_width, src_height) = src.dimensions();

        let src_image = fr::images::Image::from_vec_u8(
            src_width,
            src_height,
            src.into_raw(),
            fr::PixelType::U8x4,
        )
        .map_err(|e| ConvertError::Preview(format!("构建源图像缓冲失败：{}", e)))?;

        let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

        let mut resizer = fr::Resizer::new();
        let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(
            Self::to_fast_filter(filter),
        ));

        resizer
            .resize(&src_image, &mut dst_image, Some(&options))
            .map_err(|e| ConvertError::Preview(format!("fast_image_resize 执行失败：{}", e)))?;

        let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
            target_width,
            target_height,
            dst_image.into_vec(),
        )
        .ok_or_else(|| ConvertError::Preview("fast_image_resize 输出缓冲长度异常".to_string()))?;

        Ok(DynamicImage::ImageRgba8(rgba))
    }

    fn to_fast_filter(filter: image::imageops::FilterType) -> fr::FilterType {
        match filter {
            image::imageops::FilterType::Nearest => fr::FilterType::Box,
            image::imageops::FilterType::Triangle => fr::FilterType::Bilinear,
            image::imageops::FilterType::CatmullRom => fr::FilterType::CatmullRom,
            image::imageops::FilterType::Gaussian => fr::FilterType::Mitchell,
            image::imageops::FilterType::Lanczos3 => fr::FilterType::Lanczos3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_png(width: u32, height: u32) -> DynamicImage {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, 128, 255])
        });
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn small_image_is_not_downscaled() {
        let config = ConvertConfig::default();
        let image = create_png(320, 240);
        let scaled = ConvertHandler::maybe_downscale_for_preview(image, &config)
            .expect("downscale should succeed");
        assert_eq!(scaled.dimensions(), (320, 240));
    }

    #[test]
    fn oversized_image_is_downscaled_within_limits() {
        let config = ConvertConfig::default();
        let image = create_png(4000, 3000);
        let scaled = ConvertHandler::maybe_downscale_for_preview(image, &config)
            .expect("downscale should succeed");

        let (w, h) = scaled.dimensions();
        assert!(w <= config.preview_max_dimension);
        assert!(h <= config.preview_max_dimension);
        assert!((w as u64) * (h as u64) <= config.preview_target_pixels);
    }
}
