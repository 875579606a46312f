//! # 媒体转换模块（converter）
//!
//! ## 设计思路
//!
//! 该模块将“输入获取 → 预览生成 → 格式选择 → 转换流水线 → 产物保存”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `commands`：仅做 IPC 入参/出参适配（薄封装）
//! - `service`：承载可注入状态（`ConvertServiceState`）与事件下发
//! - `handler`：编排图片/视频两条流水线
//! - `acquire`：白名单分类与输入校验
//! - `preview`：预览句柄生成（图片 Data URI / 视频文件引用）
//! - `image` / `video`：两条编码流水线的具体实现
//! - `session`：显式会话状态机与世代守卫
//! - `formats`：目标格式能力表
//! - `config` / `error` / `source`：配置、错误、中间数据模型
//!
//! ## 实现思路
//!
//! 对外仅暴露必要类型与命令函数，内部细节保持 `mod` 私有。
//! 在 Tauri 侧通过 `ConvertServiceState` 注入状态，提升测试隔离与后续扩展能力。
//!
//! ## 新同事快速上手
//!
//! 可以按下面顺序理解调用链：
//!
//! ```text
//! 前端 invoke / 拖拽事件
//!    ↓
//! commands.rs（参数适配）
//!    ↓
//! service.rs（State 注入、会话锁、事件与通知）
//!    ↓
//! session.rs（状态机前置检查 + 世代守卫）
//!    ↓
//! handler.rs（配置快照 + 流水线分发）
//!    ├─ acquire.rs（白名单 + 签名嗅探 + 体积校验）
//!    ├─ preview.rs（降采样 + Data URI / 文件引用）
//!    ├─ image.rs（解码限制 + 逐格式重编码）
//!    └─ video.rs（ffprobe 探测 + ffmpeg 进度管道）
//!    ↓
//! 返回 ConvertCommandError / AppError 给前端
//! ```
//!
//! ## 分层职责建议
//!
//! - 调用入口变更（命令名/参数）优先改 `commands.rs`
//! - 新增/修正目标格式只改 `formats.rs` 能力表
//! - 状态流转与资源释放问题优先看 `session.rs`
//! - 编码参数与质量策略优先改 `config.rs` 与对应流水线文件

pub mod acquire;
pub mod commands;
pub mod formats;
mod config;
mod error;
mod handler;
mod image;
mod preview;
mod service;
mod session;
mod source;
mod video;

pub use config::{ConvertConfig, ConvertPerformanceProfile};
pub use error::ConvertError;
pub use handler::ConvertHandler;
pub use preview::PreviewHandle;
pub use service::{
    ConvertAdvancedConfig, ConvertOutcome, ConvertServiceState, CONVERT_COMPLETE_EVENT,
    CONVERT_PROGRESS_EVENT, PREVIEW_STATE_EVENT,
};
pub use session::{Session, SessionPhase, SessionSnapshot};
pub use source::{Artifact, ArtifactInfo, ArtifactPayload, SourceFile};
