//! # 格式能力表模块
//!
//! ## 设计思路
//!
//! 将“目标格式相关的一切差异”收敛到一张静态能力表：MIME 类型、产物发射方式
//! （内联 Data URI 还是落盘文件）、是否为近似编码（mov）。
//! 调用侧只查表，不写内联分支，新增或修正格式只改这一处。
//!
//! ## 实现思路
//!
//! - `MediaKind` 在获取阶段派生一次，之后不变。
//! - 图片/视频各一张 `&'static [FormatSpec]`，顺序即前端下拉框顺序。
//! - `lookup` 按 (kind, token) 精确匹配，保证越界选择不可达。

use serde::Serialize;

use super::ConvertError;

/// 媒体大类。由输入文件的声明 MIME 派生，单个会话内不变。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// 输出为稳定字符串，供前端展示与日志。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// 产物发射方式。
///
/// - `DataUri`：编码结果内联为自包含 Data URI，直接随事件返回。
/// - `BlobFile`：编码结果写入托管产物目录，返回可撤销的文件句柄。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmissionMode {
    DataUri,
    BlobFile,
}

/// 单个目标格式的能力描述。
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FormatSpec {
    /// 格式令牌，同时作为产物扩展名（`converted.<token>`）。
    pub token: &'static str,
    /// 该格式所属媒体大类。
    pub kind: MediaKind,
    /// 产物声明的 MIME 类型。
    pub mime_type: &'static str,
    /// 产物发射方式。
    pub emission: EmissionMode,
    /// 是否为近似编码（实际走其他容器，仅重打 MIME 标签）。
    pub approximated: bool,
}

/// 图片目标格式表。
///
/// gif / avif 的编码产物走落盘发射，其余走内联 Data URI。
pub const IMAGE_FORMATS: &[FormatSpec] = &[
    FormatSpec { token: "png", kind: MediaKind::Image, mime_type: "image/png", emission: EmissionMode::DataUri, approximated: false },
    FormatSpec { token: "jpeg", kind: MediaKind::Image, mime_type: "image/jpeg", emission: EmissionMode::DataUri, approximated: false },
    FormatSpec { token: "webp", kind: MediaKind::Image, mime_type: "image/webp", emission: EmissionMode::DataUri, approximated: false },
    FormatSpec { token: "gif", kind: MediaKind::Image, mime_type: "image/gif", emission: EmissionMode::BlobFile, approximated: false },
    FormatSpec { token: "bmp", kind: MediaKind::Image, mime_type: "image/bmp", emission: EmissionMode::DataUri, approximated: false },
    FormatSpec { token: "avif", kind: MediaKind::Image, mime_type: "image/avif", emission: EmissionMode::BlobFile, approximated: false },
];

/// 视频目标格式表。
///
/// mov 不做真正的 QuickTime 封装：按 mp4 参数编码后仅重打 MIME 标签，
/// `approximated` 置真，前端据此向用户披露。
pub const VIDEO_FORMATS: &[FormatSpec] = &[
    FormatSpec { token: "mp4", kind: MediaKind::Video, mime_type: "video/mp4", emission: EmissionMode::BlobFile, approximated: false },
    FormatSpec { token: "webm", kind: MediaKind::Video, mime_type: "video/webm", emission: EmissionMode::BlobFile, approximated: false },
    FormatSpec { token: "ogg", kind: MediaKind::Video, mime_type: "video/ogg", emission: EmissionMode::BlobFile, approximated: false },
    FormatSpec { token: "mov", kind: MediaKind::Video, mime_type: "video/quicktime", emission: EmissionMode::BlobFile, approximated: true },
];

/// 返回指定媒体大类的完整格式表（即前端可见的全部选项）。
pub fn formats_for(kind: MediaKind) -> &'static [FormatSpec] {
    match kind {
        MediaKind::Image => IMAGE_FORMATS,
        MediaKind::Video => VIDEO_FORMATS,
    }
}

/// 按 (媒体大类, 令牌) 查表。
///
/// 令牌大小写不敏感；不在当前大类表中的令牌一律返回 `InvalidFormat`，
/// 保证“越界格式选择不可达”这一约束由后端兜底。
pub fn lookup(kind: MediaKind, token: &str) -> Result<&'static FormatSpec, ConvertError> {
    let normalized = token.trim().to_lowercase();
    formats_for(kind)
        .iter()
        .find(|spec| spec.token == normalized)
        .ok_or_else(|| {
            ConvertError::InvalidFormat(format!(
                "格式 {} 不在 {} 可选集合内",
                token,
                kind.as_str()
            ))
        })
}

impl FormatSpec {
    /// 产物的下载文件名。
    pub fn suggested_file_name(&self) -> String {
        format!("converted.{}", self.token)
    }

    /// 映射到 `image` crate 的编码格式（仅图片格式有值）。
    pub(crate) fn image_format(&self) -> Option<image::ImageFormat> {
        match self.token {
            "png" => Some(image::ImageFormat::Png),
            "jpeg" => Some(image::ImageFormat::Jpeg),
            "webp" => Some(image::ImageFormat::WebP),
            "gif" => Some(image::ImageFormat::Gif),
            "bmp" => Some(image::ImageFormat::Bmp),
            "avif" => Some(image::ImageFormat::Avif),
            _ => None,
        }
    }

    /// ffmpeg 封装器名（仅视频格式有值；mov 近似走 mp4 封装器）。
    pub(crate) fn ffmpeg_muxer(&self) -> Option<&'static str> {
        match self.token {
            "mp4" | "mov" => Some("mp4"),
            "webm" => Some("webm"),
            "ogg" => Some("ogg"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_tokens_match_the_fixed_set() {
        let tokens: Vec<&str> = IMAGE_FORMATS.iter().map(|s| s.token).collect();
        assert_eq!(tokens, vec!["png", "jpeg", "webp", "gif", "bmp", "avif"]);
    }

    #[test]
    fn video_tokens_match_the_fixed_set() {
        let tokens: Vec<&str> = VIDEO_FORMATS.iter().map(|s| s.token).collect();
        assert_eq!(tokens, vec!["mp4", "webm", "ogg", "mov"]);
    }

    #[test]
    fn lookup_is_case_insensitive_and_kind_scoped() {
        let spec = lookup(MediaKind::Image, "WebP").expect("webp should resolve");
        assert_eq!(spec.mime_type, "image/webp");

        let cross = lookup(MediaKind::Video, "webp");
        assert!(matches!(cross, Err(ConvertError::InvalidFormat(_))));
    }

    #[test]
    fn mov_is_an_approximated_mp4_relabel() {
        let spec = lookup(MediaKind::Video, "mov").expect("mov should resolve");
        assert!(spec.approximated);
        assert_eq!(spec.mime_type, "video/quicktime");
        assert_eq!(spec.ffmpeg_muxer(), Some("mp4"));
    }

    #[test]
    fn blob_emission_only_for_gif_and_avif_among_images() {
        for spec in IMAGE_FORMATS {
            let expect_blob = spec.token == "gif" || spec.token == "avif";
            assert_eq!(
                spec.emission == EmissionMode::BlobFile,
                expect_blob,
                "emission mismatch for {}",
                spec.token
            );
        }
    }

    #[test]
    fn every_video_format_emits_a_blob_file() {
        assert!(VIDEO_FORMATS.iter().all(|s| s.emission == EmissionMode::BlobFile));
    }

    #[test]
    fn suggested_names_follow_the_download_convention() {
        let spec = lookup(MediaKind::Image, "gif").expect("gif should resolve");
        assert_eq!(spec.suggested_file_name(), "converted.gif");
    }
}
