//! 用户通知协作方模块
//!
//! # 设计思路
//!
//! 后端只产出“标题 + 描述 + 严重级别”三元组，展示细节（toast 样式、时长、图标）
//! 完全交给前端表现层。本模块即规格中的通知协作方接口：
//! `notify(title, description, severity)`。
//!
//! # 实现思路
//!
//! - 通过 Tauri 事件单向下发，发送失败仅记日志，绝不阻断业务流程。
//! - 用户可见文案保持泛化，诊断细节只进日志。

use serde::Serialize;
use tauri::{AppHandle, Emitter, Wry};

/// 通知事件名，前端在此事件上挂 toast 展示。
pub const NOTIFY_EVENT: &str = "media-notification";

/// 通知严重级别。
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Error,
}

/// 通知载荷。
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

/// 向前端发出一条用户可见通知。
pub fn notify(app: &AppHandle<Wry>, title: &str, description: &str, severity: Severity) {
    let payload = NotificationPayload {
        title: title.to_string(),
        description: description.to_string(),
        severity,
    };

    if let Err(err) = app.emit(NOTIFY_EVENT, payload) {
        log::warn!("发送用户通知失败（{}）：{}", title, err);
    }
}
