//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入”和“流水线产物”解耦：
//! - `SourceFile` 表示已通过白名单校验的输入文件（一个会话仅一个）
//! - `Artifact` 表示转换产物及其发射形态（内联 Data URI 或托管文件）
//!
//! 产物文件的生命周期由句柄管理：被取代、被保存或会话重置时释放，
//! 避免托管目录随多次转换无限膨胀。

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;

use super::formats::{EmissionMode, FormatSpec, MediaKind};
use super::ConvertError;

/// 已接受的输入文件。获取成功后不可变，重置时整体丢弃。
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// 展示名（文件名部分）。
    pub name: String,
    /// 磁盘路径。视频路径会被 ffmpeg 直接读取。
    pub path: PathBuf,
    /// 声明的 MIME 类型（前端传入或按扩展名派生）。
    pub mime: String,
    /// 媒体大类，获取时派生一次。
    pub kind: MediaKind,
    /// 文件体积（字节）。
    pub size: u64,
}

/// 转换产物的承载形态。
#[derive(Debug)]
pub enum ArtifactPayload {
    /// 自包含 Data URI（同步字符串发射的格式）。
    DataUri(String),
    /// 托管产物目录中的文件（落盘发射的格式）。
    File(PathBuf),
}

/// 一次转换的最终产物。
///
/// 同一时刻最多存在一个活跃产物；释放时删除托管文件。
#[derive(Debug)]
pub struct Artifact {
    /// 产物对应的格式能力项。
    pub format: &'static FormatSpec,
    /// 下载文件名（`converted.<token>`）。
    pub suggested_name: String,
    /// 承载形态。
    pub payload: ArtifactPayload,
    /// 编码后字节数。
    pub size: u64,
}

impl Artifact {
    /// 产物声明的 MIME 类型（mov 为 `video/quicktime`）。
    pub fn mime(&self) -> &'static str {
        self.format.mime_type
    }

    /// 发射方式，与能力表一致。
    pub fn emission(&self) -> EmissionMode {
        self.format.emission
    }

    /// 将产物字节写入目标路径（用户“下载”动作）。
    ///
    /// Data URI 形态先剥离前缀再做 base64 解码；文件形态直接复制。
    pub fn write_to(&self, dest: &Path) -> Result<u64, ConvertError> {
        match &self.payload {
            ArtifactPayload::DataUri(uri) => {
                let bytes = decode_data_uri(uri)?;
                fs::write(dest, &bytes)
                    .map_err(|e| ConvertError::Encode(format!("写入产物失败：{}", e)))?;
                Ok(bytes.len() as u64)
            }
            ArtifactPayload::File(path) => fs::copy(path, dest)
                .map_err(|e| ConvertError::Encode(format!("复制产物失败：{}", e))),
        }
    }

    /// 释放产物句柄：托管文件被删除，内联形态仅丢弃。
    pub fn release(&self) {
        if let ArtifactPayload::File(path) = &self.payload {
            match fs::remove_file(path) {
                Ok(()) => log::debug!("🧹 已释放产物文件：{}", path.display()),
                Err(err) => log::warn!("释放产物文件失败（{}）：{}", path.display(), err),
            }
        }
    }
}

/// 面向前端的产物描述（随完成事件与快照下发）。
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    pub suggested_name: String,
    pub mime: &'static str,
    pub emission: EmissionMode,
    pub approximated: bool,
    pub size: u64,
    /// 内联发射时为产物本体。
    pub data_uri: Option<String>,
    /// 落盘发射时为托管文件路径（前端经 asset 协议加载）。
    pub path: Option<String>,
}

impl ArtifactInfo {
    pub(crate) fn from_artifact(artifact: &Artifact) -> Self {
        let (data_uri, path) = match &artifact.payload {
            ArtifactPayload::DataUri(uri) => (Some(uri.clone()), None),
            ArtifactPayload::File(p) => (None, Some(p.to_string_lossy().to_string())),
        };
        Self {
            suggested_name: artifact.suggested_name.clone(),
            mime: artifact.mime(),
            emission: artifact.emission(),
            approximated: artifact.format.approximated,
            size: artifact.size,
            data_uri,
            path,
        }
    }
}

/// 剥离 `data:<mime>;base64,` 前缀并解码。
///
/// 同时兼容纯 base64 字符串。
pub(crate) fn decode_data_uri(data: &str) -> Result<Vec<u8>, ConvertError> {
    let payload = match data.find("base64,") {
        Some(idx) => &data[idx + "base64,".len()..],
        None => data,
    };

    general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ConvertError::InvalidFormat(format!("base64 解码失败：{}", e)))
}
