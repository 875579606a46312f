//! # 输入获取与校验模块
//!
//! ## 设计思路
//!
//! 统一处理拖拽与文件选择器两条入口，并在“尽可能早”的阶段执行输入校验。
//! 分类只看声明 MIME 与两张固定白名单；白名单之外一律拒绝，
//! 拒绝不会触碰会话状态（由服务层保证）。
//!
//! ## 实现思路
//!
//! - 声明 MIME 优先取前端传入值，缺省时按扩展名派生。
//! - 首段字节用 `infer` 做签名嗅探，与声明大类冲突时同样按“类型不支持”拒绝。
//! - 体积上限在读取元数据阶段就拦截，避免后续无谓解码开销。

use std::fs;
use std::io::Read;
use std::path::Path;

use super::formats::MediaKind;
use super::{ConvertConfig, ConvertError, SourceFile};

/// 图片输入白名单（与图片目标格式集合一致）。
pub const IMAGE_MIME_ALLOWLIST: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/webp",
    "image/gif",
    "image/bmp",
    "image/avif",
];

/// 视频输入白名单（与视频目标格式集合一致，mov 即 quicktime）。
pub const VIDEO_MIME_ALLOWLIST: &[&str] = &[
    "video/mp4",
    "video/webm",
    "video/ogg",
    "video/quicktime",
];

/// 签名嗅探的探针长度。常见容器的魔数都在首 8KB 内。
const SNIFF_PROBE_BYTES: usize = 8 * 1024;

/// 按两张白名单对声明 MIME 分类。
///
/// 白名单之外返回 `None`，调用侧据此走拒绝路径。
pub fn classify_mime(mime: &str) -> Option<MediaKind> {
    let normalized = mime.trim().to_lowercase();
    if IMAGE_MIME_ALLOWLIST.contains(&normalized.as_str()) {
        return Some(MediaKind::Image);
    }
    if VIDEO_MIME_ALLOWLIST.contains(&normalized.as_str()) {
        return Some(MediaKind::Video);
    }
    None
}

/// 按扩展名派生声明 MIME（前端未传 MIME 时的回退）。
fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "avif" => Some("image/avif"),
        "mp4" | "m4v" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "ogg" | "ogv" => Some("video/ogg"),
        "mov" | "qt" => Some("video/quicktime"),
        _ => None,
    }
}

/// 读取首段字节并做签名嗅探。
///
/// 返回嗅探出的媒体大类；签名库不认识时返回 `None`（交由声明 MIME 决定）。
fn sniff_kind(path: &Path) -> Result<Option<MediaKind>, ConvertError> {
    let mut file = fs::File::open(path)
        .map_err(|e| ConvertError::Acquire(format!("打开文件失败：{}", e)))?;

    let mut probe = vec![0u8; SNIFF_PROBE_BYTES];
    let read = file
        .read(&mut probe)
        .map_err(|e| ConvertError::Acquire(format!("读取文件头失败：{}", e)))?;
    probe.truncate(read);

    let Some(detected) = infer::get(&probe) else {
        return Ok(None);
    };

    let kind = match detected.matcher_type() {
        infer::MatcherType::Image => MediaKind::Image,
        infer::MatcherType::Video => MediaKind::Video,
        _ => {
            log::debug!("🔍 签名嗅探命中非媒体类型：{}", detected.mime_type());
            return Ok(None);
        }
    };

    log::debug!("🔍 签名嗅探：{} -> {}", detected.mime_type(), kind.as_str());
    Ok(Some(kind))
}

/// 获取输入文件：校验白名单与体积，成功返回不可变的 `SourceFile`。
///
/// 失败分支：
/// - 白名单未命中 / 声明与签名大类冲突 -> `UnsupportedType`
/// - 文件不存在或不可读 -> `Acquire`
/// - 体积超限 -> `ResourceLimit`
pub fn acquire(
    path: &str,
    declared_mime: Option<String>,
    config: &ConvertConfig,
) -> Result<SourceFile, ConvertError> {
    let path_ref = Path::new(path);

    let metadata = fs::metadata(path_ref)
        .map_err(|e| ConvertError::Acquire(format!("文件不可访问（{}）：{}", path, e)))?;
    if !metadata.is_file() {
        return Err(ConvertError::Acquire(format!("路径不是普通文件：{}", path)));
    }

    if metadata.len() > config.max_file_size {
        return Err(ConvertError::ResourceLimit(format!(
            "文件体积过大：{:.2} MB（限制：{:.2} MB）",
            metadata.len() as f64 / 1024.0 / 1024.0,
            config.max_file_size as f64 / 1024.0 / 1024.0
        )));
    }

    let declared = declared_mime
        .filter(|m| !m.trim().is_empty())
        .map(|m| m.trim().to_lowercase())
        .or_else(|| mime_from_extension(path_ref).map(str::to_string))
        .ok_or_else(|| {
            ConvertError::UnsupportedType(format!("无法识别文件类型：{}", path))
        })?;

    let kind = classify_mime(&declared)
        .ok_or_else(|| ConvertError::UnsupportedType(declared.clone()))?;

    // 声明与签名大类冲突视为伪装，按同一拒绝路径处理。
    match sniff_kind(path_ref)? {
        Some(sniffed) if sniffed != kind => {
            log::warn!(
                "🚫 声明类型 {} 与签名大类 {} 冲突，拒绝：{}",
                declared,
                sniffed.as_str(),
                path
            );
            return Err(ConvertError::UnsupportedType(declared));
        }
        Some(_) => {}
        None => {
            log::debug!("签名嗅探未命中，采信声明类型 {}", declared);
        }
    }

    let name = path_ref
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());

    log::info!(
        "📥 已接受输入文件 - 名称: {} 类型: {} 大类: {} 体积: {}KB",
        name,
        declared,
        kind.as_str(),
        metadata.len() / 1024
    );

    Ok(SourceFile {
        name,
        path: path_ref.to_path_buf(),
        mime: declared,
        kind,
        size: metadata.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlists_classify_into_the_right_kind() {
        for mime in IMAGE_MIME_ALLOWLIST {
            assert_eq!(classify_mime(mime), Some(MediaKind::Image), "{}", mime);
        }
        for mime in VIDEO_MIME_ALLOWLIST {
            assert_eq!(classify_mime(mime), Some(MediaKind::Video), "{}", mime);
        }
    }

    #[test]
    fn off_list_mimes_are_rejected() {
        assert_eq!(classify_mime("application/pdf"), None);
        assert_eq!(classify_mime("text/plain"), None);
        assert_eq!(classify_mime("image/tiff"), None);
        assert_eq!(classify_mime("video/x-matroska"), None);
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify_mime("IMAGE/PNG"), Some(MediaKind::Image));
        assert_eq!(classify_mime(" Video/Quicktime "), Some(MediaKind::Video));
    }

    #[test]
    fn extension_fallback_covers_both_kinds() {
        assert_eq!(mime_from_extension(Path::new("a.PNG")), Some("image/png"));
        assert_eq!(mime_from_extension(Path::new("b.mov")), Some("video/quicktime"));
        assert_eq!(mime_from_extension(Path::new("c.pdf")), None);
        assert_eq!(mime_from_extension(Path::new("noext")), None);
    }

    #[test]
    fn acquire_rejects_missing_file() {
        let config = ConvertConfig::default();
        let result = acquire("/nonexistent/definitely-missing.png", None, &config);
        assert!(matches!(result, Err(ConvertError::Acquire(_))));
    }
}
