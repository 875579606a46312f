//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载转换链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//! 错误附带稳定的 `code` / `stage` 标识，前端据此做分类提示，
//! 而通知层只展示泛化文案，具体原因仅进日志。

/// 媒体转换统一错误类型。
///
/// 该类型会在命令层被上转为 `AppError` 或 `ConvertCommandError`，最终透传给前端。
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// 文件类型不在图片/视频白名单内（获取阶段，可恢复）。
    #[error("不支持的文件类型：{0}")]
    UnsupportedType(String),

    /// 读取输入文件失败（不存在 / 无权限 / IO 错误）。
    #[error("读取文件失败：{0}")]
    Acquire(String),

    /// 预览生成失败（记录日志，非致命）。
    #[error("预览生成失败：{0}")]
    Preview(String),

    /// 源媒体解码失败（损坏或编码器不认识）。
    #[error("解码错误：{0}")]
    Decode(String),

    /// 目标格式编码失败。
    #[error("编码错误：{0}")]
    Encode(String),

    /// 外部编码器不可用（未安装 ffmpeg / ffprobe）。
    #[error("编码器不可用：{0}")]
    ToolUnavailable(String),

    /// 转换被用户取消。
    #[error("转换已取消：{0}")]
    Cancelled(String),

    /// 编码器看门狗超时。
    #[error("超时错误：{0}")]
    Timeout(String),

    /// 像素 / 内存 / 体积等资源上限被触发。
    #[error("资源限制：{0}")]
    ResourceLimit(String),

    /// 参数或格式令牌非法。
    #[error("格式错误：{0}")]
    InvalidFormat(String),

    /// 会话状态不满足操作前置条件。
    #[error("会话状态错误：{0}")]
    State(String),
}

impl ConvertError {
    /// 稳定错误码，供前端按类别提示与埋点。
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedType(_) => "E_UNSUPPORTED_TYPE",
            Self::Acquire(_) => "E_ACQUIRE",
            Self::Preview(_) => "E_PREVIEW",
            Self::Decode(_) => "E_DECODE",
            Self::Encode(_) => "E_ENCODE",
            Self::ToolUnavailable(_) => "E_TOOL_UNAVAILABLE",
            Self::Cancelled(_) => "E_CANCELLED",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::State(_) => "E_STATE",
        }
    }

    /// 错误发生的流水线阶段，用于日志与前端进度条标注。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::UnsupportedType(_) | Self::Acquire(_) => "acquire",
            Self::Preview(_) => "preview",
            Self::Decode(_) => "decode",
            Self::Encode(_) | Self::ToolUnavailable(_) | Self::Timeout(_) => "encode",
            Self::Cancelled(_) => "cancel",
            Self::ResourceLimit(_) | Self::InvalidFormat(_) | Self::State(_) => "validate",
        }
    }
}

impl From<ConvertError> for String {
    /// 兼容部分仍使用字符串错误的调用点。
    fn from(error: ConvertError) -> Self {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ConvertError::UnsupportedType("pdf".into()).code(), "E_UNSUPPORTED_TYPE");
        assert_eq!(ConvertError::Cancelled("用户取消".into()).code(), "E_CANCELLED");
        assert_eq!(ConvertError::Timeout("看门狗".into()).stage(), "encode");
        assert_eq!(ConvertError::UnsupportedType("pdf".into()).stage(), "acquire");
    }
}
