//! # Tauri 命令层
//!
//! ## 设计思路
//!
//! 命令层仅做 IPC 参数接收与结果返回，不承载业务逻辑。
//! 所有实际处理交由 `ConvertServiceState`，保持命令函数薄、稳定、易测试。

use tauri::{AppHandle, State, Wry};

use super::formats::FormatSpec;
use super::session::SessionSnapshot;
use super::{service, ConvertError};

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConvertCommandError {
    pub code: &'static str,
    pub stage: &'static str,
    pub message: String,
}

impl From<ConvertError> for ConvertCommandError {
    fn from(error: ConvertError) -> Self {
        Self {
            code: error.code(),
            stage: error.stage(),
            message: error.to_string(),
        }
    }
}

/// 接受拖拽或选择器给出的文件并调度预览生成。
#[tauri::command]
pub fn acquire_media(
    state: State<'_, service::ConvertServiceState>,
    app: AppHandle<Wry>,
    path: String,
    declared_mime: Option<String>,
) -> Result<SessionSnapshot, ConvertCommandError> {
    state
        .acquire(&app, path, declared_mime)
        .map_err(ConvertCommandError::from)
}

/// 当前媒体大类下的可选目标格式集合。
#[tauri::command]
pub fn list_target_formats(
    state: State<'_, service::ConvertServiceState>,
) -> Result<Vec<FormatSpec>, crate::error::AppError> {
    Ok(state.list_target_formats()?)
}

/// 选择目标格式。
#[tauri::command]
pub fn select_target_format(
    state: State<'_, service::ConvertServiceState>,
    token: String,
) -> Result<SessionSnapshot, ConvertCommandError> {
    state
        .select_target_format(&token)
        .map_err(ConvertCommandError::from)
}

/// 启动转换流水线。
#[tauri::command]
pub async fn start_conversion(
    state: State<'_, service::ConvertServiceState>,
    app: AppHandle<Wry>,
) -> Result<service::ConvertOutcome, ConvertCommandError> {
    state
        .start_conversion(&app)
        .await
        .map_err(ConvertCommandError::from)
}

/// 取消在途转换。
#[tauri::command]
pub fn cancel_conversion(
    state: State<'_, service::ConvertServiceState>,
) -> Result<bool, crate::error::AppError> {
    Ok(state.cancel_conversion()?)
}

/// 将产物保存为 `converted.<format>`（目标路径由前端保存对话框给出）。
#[tauri::command]
pub fn save_artifact(
    state: State<'_, service::ConvertServiceState>,
    dest_path: String,
) -> Result<String, ConvertCommandError> {
    state.save_artifact(dest_path).map_err(ConvertCommandError::from)
}

/// 显式重置会话。
#[tauri::command]
pub fn reset_session(
    state: State<'_, service::ConvertServiceState>,
) -> Result<SessionSnapshot, crate::error::AppError> {
    Ok(state.reset()?)
}

/// 会话快照（前端启动时同步状态用）。
#[tauri::command]
pub fn get_session_state(
    state: State<'_, service::ConvertServiceState>,
) -> Result<SessionSnapshot, crate::error::AppError> {
    Ok(state.snapshot()?)
}

/// 切换转换性能档位。
#[tauri::command]
pub fn set_convert_performance_profile(
    state: State<'_, service::ConvertServiceState>,
    profile: String,
) -> Result<(), crate::error::AppError> {
    state.set_performance_profile(&profile)?;
    Ok(())
}

/// 查询后端当前生效性能档位。
#[tauri::command]
pub fn get_convert_performance_profile(
    state: State<'_, service::ConvertServiceState>,
) -> Result<String, crate::error::AppError> {
    Ok(state.get_performance_profile()?)
}

#[tauri::command]
pub fn set_convert_advanced_config(
    state: State<'_, service::ConvertServiceState>,
    config: service::ConvertAdvancedConfig,
) -> Result<(), crate::error::AppError> {
    state.set_advanced_config(config)?;
    Ok(())
}

#[tauri::command]
pub fn get_convert_advanced_config(
    state: State<'_, service::ConvertServiceState>,
) -> Result<service::ConvertAdvancedConfig, crate::error::AppError> {
    Ok(state.get_advanced_config()?)
}
