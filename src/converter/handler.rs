//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `ConvertHandler` 只负责流程编排与配置管理，不直接与 Tauri 绑定。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 按媒体大类分发图片/视频流水线
//! 3. 记录阶段耗时
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<ConvertConfig>>` 支持运行时动态切档。
//! - 单次转换内使用“同一配置快照”，避免处理中途配置漂移。
//! - 与 Tauri 解耦使图片/视频流水线可在集成测试中直接驱动。

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use super::formats::{FormatSpec, MediaKind};
use super::source::{Artifact, SourceFile};
use super::{ConvertConfig, ConvertError, ConvertPerformanceProfile};

/// 媒体转换处理器。
///
/// 封装配置状态，并编排各子模块实现完整流程。
pub struct ConvertHandler {
    pub(super) config: Arc<RwLock<ConvertConfig>>,
}

impl ConvertHandler {
    /// 根据初始配置创建处理器。
    pub fn new(config: ConvertConfig) -> Result<Self, ConvertError> {
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// 获取配置快照。
    ///
    /// 作用：保证单次转换链路使用一致参数。
    pub fn config_snapshot(&self) -> Result<ConvertConfig, ConvertError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ConvertError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 设置性能档位。
    pub fn set_performance_profile(
        &self,
        profile: ConvertPerformanceProfile,
    ) -> Result<(), ConvertError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| ConvertError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        config.apply_performance_profile(profile);

        log::info!(
            "⚙️ 已切换转换性能档位：{:?}（jpeg_quality={}, avif={}/{}, crf={}, preset={}）",
            profile,
            config.jpeg_quality,
            config.avif_speed,
            config.avif_quality,
            config.video_crf,
            config.video_preset
        );

        Ok(())
    }

    /// 获取当前生效档位。
    pub fn get_performance_profile(&self) -> Result<ConvertPerformanceProfile, ConvertError> {
        let config = self
            .config
            .read()
            .map_err(|_| ConvertError::ResourceLimit("配置读取锁已中毒".to_string()))?;
        Ok(config.infer_performance_profile())
    }

    /// 设置资源上限与看门狗等高级配置。
    pub fn set_advanced_config(
        &self,
        max_file_size: u64,
        max_decoded_pixels: u64,
        max_decoded_bytes: u64,
        preview_max_dimension: u32,
        ffmpeg_timeout_secs: u64,
    ) -> Result<(), ConvertError> {
        if max_file_size < 1024 * 1024 {
            return Err(ConvertError::InvalidFormat("max_file_size 不能小于 1MB".to_string()));
        }
        if !(1_000_000..=400_000_000).contains(&max_decoded_pixels) {
            return Err(ConvertError::InvalidFormat(
                "max_decoded_pixels 必须在 1e6~4e8 之间".to_string(),
            ));
        }
        if max_decoded_bytes < 8 * 1024 * 1024 {
            return Err(ConvertError::InvalidFormat("max_decoded_bytes 不能小于 8MB".to_string()));
        }
        if !(256..=8192).contains(&preview_max_dimension) {
            return Err(ConvertError::InvalidFormat(
                "preview_max_dimension 必须在 256~8192 之间".to_string(),
            ));
        }
        if ffmpeg_timeout_secs > 24 * 3600 {
            return Err(ConvertError::InvalidFormat(
                "ffmpeg_timeout_secs 不能超过 86400 秒".to_string(),
            ));
        }

        let mut config = self
            .config
            .write()
            .map_err(|_| ConvertError::ResourceLimit("配置写入锁已中毒".to_string()))?;

        config.max_file_size = max_file_size;
        config.max_decoded_pixels = max_decoded_pixels;
        config.max_decoded_bytes = max_decoded_bytes;
        config.preview_max_dimension = preview_max_dimension;
        config.ffmpeg_timeout_secs = ffmpeg_timeout_secs;

        Ok(())
    }

    /// 获取高级配置快照。
    pub fn get_advanced_config(&self) -> Result<(u64, u64, u64, u32, u64), ConvertError> {
        let config = self
            .config
            .read()
            .map_err(|_| ConvertError::ResourceLimit("配置读取锁已中毒".to_string()))?;

        Ok((
            config.max_file_size,
            config.max_decoded_pixels,
            config.max_decoded_bytes,
            config.preview_max_dimension,
            config.ffmpeg_timeout_secs,
        ))
    }

    /// 转换主入口：按媒体大类分发流水线。
    ///
    /// 图片路径从调用者视角是原子的；视频路径经 `on_progress` 回报进度，
    /// 经 `is_cancelled` 轮询取消标志。
    pub async fn convert<P, C>(
        &self,
        source: &SourceFile,
        spec: &'static FormatSpec,
        artifacts_dir: &Path,
        on_progress: P,
        is_cancelled: C,
    ) -> Result<Artifact, ConvertError>
    where
        P: Fn(u8) + Send + Sync,
        C: Fn() -> bool + Send + Sync,
    {
        if spec.kind != source.kind {
            return Err(ConvertError::InvalidFormat(format!(
                "格式 {} 不适用于 {} 输入",
                spec.token,
                source.kind.as_str()
            )));
        }

        if is_cancelled() {
            return Err(ConvertError::Cancelled("转换尚未开始即被取消".to_string()));
        }

        let config = self.config_snapshot()?;
        let total_start = Instant::now();

        let artifact = match source.kind {
            MediaKind::Image => self.convert_image(source, spec, &config, artifacts_dir)?,
            MediaKind::Video => {
                self.convert_video(source, spec, &config, artifacts_dir, on_progress, is_cancelled)
                    .await?
            }
        };

        log::info!(
            "✅ 转换完成 - {} -> {} total={}ms size={}KB",
            source.name,
            spec.token,
            total_start.elapsed().as_millis(),
            artifact.size / 1024
        );

        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advanced_config_rejects_out_of_range_values() {
        let handler = ConvertHandler::new(ConvertConfig::default()).expect("handler init failed");

        let too_small_file = handler.set_advanced_config(1024, 40_000_000, 160 << 20, 1280, 600);
        assert!(matches!(too_small_file, Err(ConvertError::InvalidFormat(_))));

        let bad_pixels = handler.set_advanced_config(64 << 20, 100, 160 << 20, 1280, 600);
        assert!(matches!(bad_pixels, Err(ConvertError::InvalidFormat(_))));

        let bad_preview = handler.set_advanced_config(64 << 20, 40_000_000, 160 << 20, 16, 600);
        assert!(matches!(bad_preview, Err(ConvertError::InvalidFormat(_))));

        let bad_watchdog =
            handler.set_advanced_config(64 << 20, 40_000_000, 160 << 20, 1280, 1_000_000);
        assert!(matches!(bad_watchdog, Err(ConvertError::InvalidFormat(_))));
    }

    #[test]
    fn advanced_config_roundtrips_valid_values() {
        let handler = ConvertHandler::new(ConvertConfig::default()).expect("handler init failed");

        handler
            .set_advanced_config(128 << 20, 20_000_000, 96 << 20, 1920, 0)
            .expect("advanced config should accept valid values");

        let (max_file, max_pixels, max_bytes, preview_dim, watchdog) =
            handler.get_advanced_config().expect("read advanced config failed");

        assert_eq!(max_file, 128 << 20);
        assert_eq!(max_pixels, 20_000_000);
        assert_eq!(max_bytes, 96 << 20);
        assert_eq!(preview_dim, 1920);
        assert_eq!(watchdog, 0);
    }
}
