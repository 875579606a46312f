// 防止在 Windows 发布版本中显示额外的控制台窗口，不要删除！
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

//! # 媒体格式转换工具 — 应用入口
//!
//! 本文件仅负责应用初始化与插件/命令注册。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use media_converter::{converter, settings, storage};
use tauri::Manager;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    tauri::Builder::default()
        // 插件初始化
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_fs::init())
        // 应用设置
        .setup(|app| {
            log::info!("setup: begin");

            // 清扫上次会话遗留的产物文件
            storage::sweep_artifacts_dir(app.handle());
            log::info!("setup: artifacts dir swept");

            match converter::ConvertServiceState::new() {
                Ok(convert_service_state) => {
                    app.manage(convert_service_state);
                    log::info!("setup: convert service managed");
                }
                Err(err) => {
                    log::error!("setup: 转换服务初始化失败，应用将以受限模式运行: {err}");
                }
            }

            log::info!("setup: complete");

            Ok(())
        })
        // 注册所有 Tauri 命令
        .invoke_handler(tauri::generate_handler![
            // 转换会话
            converter::commands::acquire_media,
            converter::commands::list_target_formats,
            converter::commands::select_target_format,
            converter::commands::start_conversion,
            converter::commands::cancel_conversion,
            converter::commands::save_artifact,
            converter::commands::reset_session,
            converter::commands::get_session_state,
            // 转换配置
            converter::commands::set_convert_performance_profile,
            converter::commands::get_convert_performance_profile,
            converter::commands::set_convert_advanced_config,
            converter::commands::get_convert_advanced_config,
            // 存储目录信息
            storage::get_artifacts_dir_info,
            // 应用设置存储
            settings::get_app_settings,
            settings::set_app_settings,
        ])
        .run(tauri::generate_context!())
        .expect("运行 Tauri 应用时出错");
}
