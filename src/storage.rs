//! 产物存储目录管理模块
//!
//! # 设计思路
//!
//! 统一管理转换产物（落盘发射的临时文件）的存放路径，
//! 并在目录不存在时自动创建、在应用启动时清扫上次残留。
//! 产物文件的逐个释放由会话句柄负责，这里只兜底整目录生命周期。
//!
//! # 实现思路
//!
//! - 固定使用应用数据目录下的 `artifacts` 子目录。
//! - 目录不存在时自动 `create_dir_all`，避免上层判断。
//! - 所有可能失败的操作均返回 `Result`，不使用 `expect()` / `unwrap()`。

use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tauri::AppHandle;
use tauri::Manager;

use crate::error::AppError;

/// 存储目录信息
#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub path: String,
    pub total_size: u64,
    pub file_count: u64,
}

/// 获取产物存储目录
///
/// # 参数
/// * `app` - Tauri 应用句柄，用于获取应用数据目录
///
/// # 返回
/// - `Ok(PathBuf)` — 可用的产物存储目录
/// - `Err(AppError::Storage)` — 无法获取或创建目录
pub fn get_artifacts_dir(app: &AppHandle) -> Result<PathBuf, AppError> {
    let app_data_dir = app
        .path()
        .app_data_dir()
        .map_err(|e| AppError::Storage(format!("获取应用数据目录失败: {}", e)))?;

    let artifacts_dir = app_data_dir.join("artifacts");
    if !artifacts_dir.exists() {
        fs::create_dir_all(&artifacts_dir)
            .map_err(|e| AppError::Storage(format!("创建产物目录失败: {}", e)))?;
    }
    Ok(artifacts_dir)
}

/// 启动时清扫产物目录中上次会话遗留的文件。
///
/// 失败仅记日志：清扫不成功不应阻止应用启动。
pub fn sweep_artifacts_dir(app: &AppHandle) {
    let dir = match get_artifacts_dir(app) {
        Ok(dir) => dir,
        Err(err) => {
            log::warn!("清扫产物目录跳过：{}", err);
            return;
        }
    };

    let mut removed: u64 = 0;
    if let Ok(entries) = fs::read_dir(&dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(err) => log::warn!("清扫残留产物失败（{}）：{}", path.display(), err),
                }
            }
        }
    }

    if removed > 0 {
        log::info!("🧹 已清扫 {} 个残留产物文件", removed);
    }
}

/// 获取产物存储目录信息（路径 + 占用大小 + 文件数）
#[tauri::command]
pub fn get_artifacts_dir_info(app: AppHandle) -> Result<StorageInfo, AppError> {
    let dir = get_artifacts_dir(&app)?;
    let mut total_size: u64 = 0;
    let mut file_count: u64 = 0;

    if dir.exists() {
        if let Ok(entries) = fs::read_dir(&dir) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    if metadata.is_file() {
                        total_size += metadata.len();
                        file_count += 1;
                    }
                }
            }
        }
    }

    Ok(StorageInfo {
        path: dir.to_string_lossy().to_string(),
        total_size,
        file_count,
    })
}
