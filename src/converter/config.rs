//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `ConvertConfig`，保证运行时行为可观测、可调整、可测试。
//! 其中性能档位（quality / balanced / speed）作为高层语义，映射到底层参数组合。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的平衡配置。
//! - `ConvertPerformanceProfile` 负责档位字符串解析与反向输出。
//! - `apply_performance_profile` 将档位转换为具体编码参数。
//! - `infer_performance_profile` 用于从当前配置反推档位（给前端展示状态）。

use image::imageops::FilterType;

use super::ConvertError;

/// 媒体转换配置。
///
/// 字段覆盖了输入校验、解码限制、预览降采样与编码参数四个阶段。
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// 获取阶段允许的最大输入文件体积（字节）。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 预览图宽/高单边最大值。
    pub preview_max_dimension: u32,
    /// 预览图目标像素上限（控制 Data URI 体积）。
    pub preview_target_pixels: u64,
    /// 预览降采样滤镜策略。
    pub resize_filter: FilterType,
    /// JPEG 编码质量（1~100）。
    pub jpeg_quality: u8,
    /// AVIF 编码速度（1~10，越大越快）。
    pub avif_speed: u8,
    /// AVIF 编码质量（1~100）。
    pub avif_quality: u8,
    /// 视频编码 CRF（越小质量越高）。
    pub video_crf: u8,
    /// x264 预设名。
    pub video_preset: &'static str,
    /// ffmpeg 看门狗超时（秒）。0 表示关闭，还原“挂死等待”原始行为。
    pub ffmpeg_timeout_secs: u64,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            max_file_size: 512 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            preview_max_dimension: 1280,
            preview_target_pixels: 1_500_000,
            resize_filter: FilterType::Triangle,
            jpeg_quality: 85,
            avif_speed: 6,
            avif_quality: 80,
            video_crf: 23,
            video_preset: "medium",
            ffmpeg_timeout_secs: 600,
        }
    }
}

/// 转换性能档位（面向产品/用户语义）。
///
/// - `Quality`：尽量保真
/// - `Balanced`：质量与速度平衡
/// - `Speed`：优先出片速度
#[derive(Debug, Clone, Copy)]
pub enum ConvertPerformanceProfile {
    Quality,
    Balanced,
    Speed,
}

impl ConvertPerformanceProfile {
    /// 从外部字符串解析档位。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use media_converter::converter::ConvertPerformanceProfile;
    ///
    /// let p = ConvertPerformanceProfile::from_str("balanced")?;
    /// assert_eq!(p.as_str(), "balanced");
    /// # Ok::<(), media_converter::converter::ConvertError>(())
    /// ```
    pub(crate) fn from_str(profile: &str) -> Result<Self, ConvertError> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(ConvertError::InvalidFormat(format!(
                "未知性能档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    /// 将档位输出为稳定字符串，供前端展示与持久化。
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }
}

impl ConvertConfig {
    /// 基于当前参数反推性能档位。
    ///
    /// 用于“后端当前生效档位”查询场景。
    pub(crate) fn infer_performance_profile(&self) -> ConvertPerformanceProfile {
        if self.jpeg_quality >= 95 && self.video_crf <= 18 {
            return ConvertPerformanceProfile::Quality;
        }

        if self.jpeg_quality <= 75 || self.video_crf >= 28 {
            return ConvertPerformanceProfile::Speed;
        }

        ConvertPerformanceProfile::Balanced
    }

    /// 应用指定性能档位到实际编码参数。
    ///
    /// 保持“档位语义稳定”，便于前端按档位切换而无需了解底层细节。
    pub(crate) fn apply_performance_profile(&mut self, profile: ConvertPerformanceProfile) {
        match profile {
            ConvertPerformanceProfile::Quality => {
                self.jpeg_quality = 95;
                self.avif_speed = 4;
                self.avif_quality = 90;
                self.video_crf = 18;
                self.video_preset = "slow";
                self.resize_filter = FilterType::CatmullRom;
            }
            ConvertPerformanceProfile::Balanced => {
                self.jpeg_quality = 85;
                self.avif_speed = 6;
                self.avif_quality = 80;
                self.video_crf = 23;
                self.video_preset = "medium";
                self.resize_filter = FilterType::Triangle;
            }
            ConvertPerformanceProfile::Speed => {
                self.jpeg_quality = 75;
                self.avif_speed = 10;
                self.avif_quality = 65;
                self.video_crf = 28;
                self.video_preset = "veryfast";
                self.resize_filter = FilterType::Nearest;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_roundtrips_through_apply_and_infer() {
        let mut config = ConvertConfig::default();

        config.apply_performance_profile(ConvertPerformanceProfile::Quality);
        assert!(matches!(
            config.infer_performance_profile(),
            ConvertPerformanceProfile::Quality
        ));

        config.apply_performance_profile(ConvertPerformanceProfile::Speed);
        assert!(matches!(
            config.infer_performance_profile(),
            ConvertPerformanceProfile::Speed
        ));

        config.apply_performance_profile(ConvertPerformanceProfile::Balanced);
        assert!(matches!(
            config.infer_performance_profile(),
            ConvertPerformanceProfile::Balanced
        ));
    }

    #[test]
    fn profile_rejects_unknown_token() {
        let result = ConvertPerformanceProfile::from_str("ultra");
        assert!(matches!(result, Err(ConvertError::InvalidFormat(_))));
    }
}
