//! # 媒体格式转换工具 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  前端 (WebView 表现层)                    │
//! │                                                          │
//! │  拖拽/选择 ── 预览展示 ── 格式下拉 ── 进度条 ── Toast     │
//! │       │  (统一 invoke + 事件监听)                        │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ Tauri IPC (Result<T, AppError / ConvertCommandError>)
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            后端 (Rust)                           │
//! │                                                          │
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  │                                                       │
//! │  ├─ converter ── 会话状态机 + 转换流水线                  │
//! │  │   ├─ acquire   白名单分类 + 签名嗅探                   │
//! │  │   ├─ preview   图片 Data URI / 视频文件引用            │
//! │  │   ├─ image     解码限制 + 逐格式重编码                 │
//! │  │   ├─ video     ffmpeg 进度管道 + 看门狗                │
//! │  │   └─ session   显式状态机 + 世代守卫                   │
//! │  │                                                       │
//! │  ├─ notify        用户通知协作方 (title/desc/severity)    │
//! │  ├─ storage       产物目录 (创建/清扫/统计)               │
//! │  └─ settings      应用设置持久化 (JSON)                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，非转换类 Tauri command 的返回类型 |
//! | [`converter`] | 输入获取、预览生成、格式能力表、图片/视频转换流水线、会话状态机 |
//! | [`notify`] | 用户可见通知（类型不支持 / 转换完成 / 转换失败）的事件下发 |
//! | [`storage`] | 产物临时文件目录的获取、创建、启动清扫与占用统计 |
//! | [`settings`] | 应用设置的 JSON 持久化读写 |

pub mod converter;
pub mod error;
pub mod notify;
pub mod settings;
pub mod storage;
