//! # 服务层（可注入状态）
//!
//! ## 设计思路
//!
//! 使用 `ConvertServiceState` 作为 Tauri 注入状态，替代全局单例函数。
//! 好处：
//! 1. 生命周期清晰（由 `main.rs` 统一管理）
//! 2. 测试可创建独立实例，减少共享状态副作用
//! 3. 会话与配置集中在一处，异步任务只拿世代与快照
//!
//! ## 实现思路
//!
//! - 会话由 `Arc<Mutex<Session>>` 持有，预览任务克隆 Arc 在后台收尾。
//! - 转换进度经节流后以事件下发，避免刷爆 IPC 通道。
//! - 取消标志为单槽位（单会话单转换），重置会话时顺带触发取消。
//! - 用户可见通知只有三类：类型不支持 / 转换完成 / 转换失败。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tauri::{AppHandle, Emitter, Wry};

use crate::notify::{self, Severity};
use crate::storage;

use super::acquire;
use super::formats::FormatSpec;
use super::preview::PreviewHandle;
use super::session::{Session, SessionSnapshot};
use super::source::ArtifactInfo;
use super::{ConvertConfig, ConvertError, ConvertHandler, ConvertPerformanceProfile};

pub const PREVIEW_STATE_EVENT: &str = "preview-state";
pub const CONVERT_PROGRESS_EVENT: &str = "convert-progress";
pub const CONVERT_COMPLETE_EVENT: &str = "convert-complete";

const PROGRESS_MIN_INTERVAL: Duration = Duration::from_millis(100);
const PROGRESS_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(400);
const PROGRESS_MIN_PERCENT_DELTA: u8 = 1;
const PROGRESS_FORCE_PERCENT_DELTA: u8 = 5;

#[derive(Debug)]
struct ProgressThrottleState {
    last_emit_at: Option<Instant>,
    last_progress: u8,
}

impl ProgressThrottleState {
    fn new() -> Self {
        Self {
            last_emit_at: None,
            last_progress: 0,
        }
    }

    fn update(&mut self, progress: u8) {
        self.last_emit_at = Some(Instant::now());
        self.last_progress = progress;
    }
}

fn should_emit_progress(state: &ProgressThrottleState, progress: u8) -> bool {
    let Some(last_emit_at) = state.last_emit_at else {
        return true;
    };

    let elapsed = last_emit_at.elapsed();
    let progress_delta = progress.saturating_sub(state.last_progress);

    if progress >= 100 {
        return true;
    }

    if progress_delta >= PROGRESS_FORCE_PERCENT_DELTA {
        return true;
    }

    if progress_delta >= PROGRESS_MIN_PERCENT_DELTA && elapsed >= PROGRESS_MIN_INTERVAL {
        return true;
    }

    elapsed >= PROGRESS_HEARTBEAT_INTERVAL
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PreviewStatePayload {
    pub generation: u64,
    pub loading: bool,
    pub failed: bool,
    pub preview: Option<PreviewHandle>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConvertProgressPayload {
    pub generation: u64,
    pub progress: u8,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConvertCompletePayload {
    pub generation: u64,
    pub artifact: ArtifactInfo,
    pub elapsed_ms: u128,
}

/// `start_conversion` 的返回值。
///
/// `noop` 表示前置条件不满足（无文件 / 未选格式 / 阶段不符），不视为错误；
/// `superseded` 表示结果因会话已前进而被丢弃。
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConvertOutcome {
    pub status: &'static str,
    pub artifact: Option<ArtifactInfo>,
}

impl ConvertOutcome {
    fn completed(artifact: ArtifactInfo) -> Self {
        Self {
            status: "completed",
            artifact: Some(artifact),
        }
    }

    fn noop() -> Self {
        Self {
            status: "noop",
            artifact: None,
        }
    }

    fn superseded() -> Self {
        Self {
            status: "superseded",
            artifact: None,
        }
    }
}

/// 高级配置的 IPC 载体。
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConvertAdvancedConfig {
    pub max_file_size: u64,
    pub max_decoded_pixels: u64,
    pub max_decoded_bytes: u64,
    pub preview_max_dimension: u32,
    pub ffmpeg_timeout_secs: u64,
}

/// 媒体转换服务状态。
///
/// 作为 Tauri `State` 注入到命令层，内部持有 `ConvertHandler` 与唯一会话。
pub struct ConvertServiceState {
    handler: ConvertHandler,
    session: Arc<Mutex<Session>>,
    cancel_flag: Mutex<Option<Arc<AtomicBool>>>,
}

impl ConvertServiceState {
    /// 使用默认配置创建服务状态。
    pub fn new() -> Result<Self, ConvertError> {
        Self::with_config(ConvertConfig::default())
    }

    /// 使用自定义配置创建服务状态。
    ///
    /// 主要用于测试或后续按场景注入不同策略。
    pub fn with_config(config: ConvertConfig) -> Result<Self, ConvertError> {
        let handler = ConvertHandler::new(config)?;
        Ok(Self {
            handler,
            session: Arc::new(Mutex::new(Session::new())),
            cancel_flag: Mutex::new(None),
        })
    }

    fn lock_session(&self) -> Result<std::sync::MutexGuard<'_, Session>, ConvertError> {
        self.session
            .lock()
            .map_err(|_| ConvertError::ResourceLimit("会话锁已中毒".to_string()))
    }

    /// 输入获取：白名单校验通过后取代旧会话并调度预览生成。
    ///
    /// 类型不支持时发出用户可见拒绝通知，且不触碰会话状态。
    pub fn acquire(
        &self,
        app: &AppHandle<Wry>,
        path: String,
        declared_mime: Option<String>,
    ) -> Result<SessionSnapshot, ConvertError> {
        let config = self.handler.config_snapshot()?;

        let source = match acquire::acquire(&path, declared_mime, &config) {
            Ok(source) => source,
            Err(err) => {
                if matches!(err, ConvertError::UnsupportedType(_)) {
                    notify::notify(
                        app,
                        "文件类型不支持",
                        "请选择图片或视频文件",
                        Severity::Error,
                    );
                }
                return Err(err);
            }
        };

        let (generation, snapshot) = {
            let mut session = self.lock_session()?;
            let generation = session.accept_source(source.clone());
            (generation, session.snapshot())
        };

        let _ = app.emit(
            PREVIEW_STATE_EVENT,
            PreviewStatePayload {
                generation,
                loading: true,
                failed: false,
                preview: None,
            },
        );

        let app = app.clone();
        let session = Arc::clone(&self.session);
        tauri::async_runtime::spawn(async move {
            let result = ConvertHandler::build_preview(&source, &config);

            let Ok(mut guard) = session.lock() else {
                log::error!("预览收尾失败：会话锁已中毒");
                return;
            };

            let payload = match result {
                Ok(handle) => {
                    let applied = guard.finish_preview(generation, Some(handle.clone()));
                    if !applied {
                        return;
                    }
                    PreviewStatePayload {
                        generation,
                        loading: false,
                        failed: false,
                        preview: Some(handle),
                    }
                }
                Err(err) => {
                    log::warn!("⚠️ 预览生成失败（会话保持已接受状态）：{}", err);
                    if !guard.finish_preview(generation, None) {
                        return;
                    }
                    PreviewStatePayload {
                        generation,
                        loading: false,
                        failed: true,
                        preview: None,
                    }
                }
            };
            drop(guard);

            let _ = app.emit(PREVIEW_STATE_EVENT, payload);
        });

        Ok(snapshot)
    }

    /// 当前媒体大类下的可选格式集合（无文件时为空）。
    pub fn list_target_formats(&self) -> Result<Vec<FormatSpec>, ConvertError> {
        Ok(self.lock_session()?.snapshot().available_formats)
    }

    /// 选择目标格式，令牌必须属于当前大类集合。
    pub fn select_target_format(&self, token: &str) -> Result<SessionSnapshot, ConvertError> {
        let mut session = self.lock_session()?;
        session.select_format(token)?;
        Ok(session.snapshot())
    }

    /// 转换主流程。
    ///
    /// 前置不满足时为无操作（无状态变化、无通知）；
    /// 成功与失败都把会话送回 Ready，允许用户换格式重试。
    pub async fn start_conversion(
        &self,
        app: &AppHandle<Wry>,
    ) -> Result<ConvertOutcome, ConvertError> {
        let Some((generation, source, spec)) = self.lock_session()?.try_begin_convert() else {
            log::debug!("转换前置条件不满足，按无操作处理");
            return Ok(ConvertOutcome::noop());
        };

        let artifacts_dir = storage::get_artifacts_dir(app)
            .map_err(|e| ConvertError::Encode(format!("产物目录不可用：{}", e)))?;

        let cancel = Arc::new(AtomicBool::new(false));
        {
            let mut flag = self
                .cancel_flag
                .lock()
                .map_err(|_| ConvertError::ResourceLimit("取消标志锁已中毒".to_string()))?;
            *flag = Some(Arc::clone(&cancel));
        }

        let throttle = Mutex::new(ProgressThrottleState::new());
        let session = Arc::clone(&self.session);
        let progress_app = app.clone();

        let on_progress = move |percent: u8| {
            let fresh = session
                .lock()
                .map(|mut s| s.set_progress(generation, percent))
                .unwrap_or(false);
            if !fresh {
                return;
            }

            let should_emit = {
                let mut guard = match throttle.lock() {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
                if !should_emit_progress(&guard, percent) {
                    false
                } else {
                    guard.update(percent);
                    true
                }
            };

            if should_emit {
                let _ = progress_app.emit(
                    CONVERT_PROGRESS_EVENT,
                    ConvertProgressPayload {
                        generation,
                        progress: percent,
                    },
                );
            }
        };

        let start = Instant::now();
        let result = self
            .handler
            .convert(&source, spec, &artifacts_dir, on_progress, move || {
                cancel.load(Ordering::SeqCst)
            })
            .await;

        if let Ok(mut flag) = self.cancel_flag.lock() {
            *flag = None;
        }

        match result {
            Ok(artifact) => {
                let info = ArtifactInfo::from_artifact(&artifact);
                let applied = self.lock_session()?.finish_convert(generation, Some(artifact));

                if !applied {
                    log::info!("转换结果因会话已前进而被丢弃");
                    return Ok(ConvertOutcome::superseded());
                }

                let _ = app.emit(
                    CONVERT_COMPLETE_EVENT,
                    ConvertCompletePayload {
                        generation,
                        artifact: info.clone(),
                        elapsed_ms: start.elapsed().as_millis(),
                    },
                );
                notify::notify(
                    app,
                    "转换完成",
                    &format!("已生成 {}", info.suggested_name),
                    Severity::Success,
                );

                Ok(ConvertOutcome::completed(info))
            }
            Err(err @ ConvertError::Cancelled(_)) => {
                self.lock_session()?.finish_convert(generation, None);
                log::info!("⏹️ 转换已取消");
                Err(err)
            }
            Err(err) => {
                self.lock_session()?.finish_convert(generation, None);
                log::error!("❌ 转换失败（code={} stage={}）：{}", err.code(), err.stage(), err);
                notify::notify(
                    app,
                    "转换失败",
                    "请重试或更换目标格式",
                    Severity::Error,
                );
                Err(err)
            }
        }
    }

    /// 请求取消当前转换。返回是否存在在途转换。
    pub fn cancel_conversion(&self) -> Result<bool, ConvertError> {
        let flag = self
            .cancel_flag
            .lock()
            .map_err(|_| ConvertError::ResourceLimit("取消标志锁已中毒".to_string()))?;

        if let Some(cancel) = flag.as_ref() {
            cancel.store(true, Ordering::SeqCst);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// 把当前产物写入用户选择的路径，随后立即释放产物句柄。
    pub fn save_artifact(&self, dest_path: String) -> Result<String, ConvertError> {
        let mut session = self.lock_session()?;

        let artifact = session
            .artifact()
            .ok_or_else(|| ConvertError::State("没有可保存的产物".to_string()))?;

        let written = artifact.write_to(std::path::Path::new(&dest_path))?;

        if let Some(artifact) = session.consume_artifact() {
            artifact.release();
        }

        log::info!("💾 产物已保存 - {}（{}KB）", dest_path, written / 1024);
        Ok(dest_path)
    }

    /// 显式重置：任意状态回 Empty，释放全部句柄并取消在途转换。
    pub fn reset(&self) -> Result<SessionSnapshot, ConvertError> {
        let _ = self.cancel_conversion();

        let mut session = self.lock_session()?;
        session.reset();
        Ok(session.snapshot())
    }

    /// 会话快照（前端状态同步入口）。
    pub fn snapshot(&self) -> Result<SessionSnapshot, ConvertError> {
        Ok(self.lock_session()?.snapshot())
    }

    /// 设置性能档位。
    pub fn set_performance_profile(&self, profile: &str) -> Result<(), ConvertError> {
        let profile = ConvertPerformanceProfile::from_str(profile)?;
        self.handler.set_performance_profile(profile)
    }

    /// 获取当前生效性能档位（字符串）。
    pub fn get_performance_profile(&self) -> Result<String, ConvertError> {
        let profile = self.handler.get_performance_profile()?;
        Ok(profile.as_str().to_string())
    }

    pub fn set_advanced_config(&self, config: ConvertAdvancedConfig) -> Result<(), ConvertError> {
        self.handler.set_advanced_config(
            config.max_file_size,
            config.max_decoded_pixels,
            config.max_decoded_bytes,
            config.preview_max_dimension,
            config.ffmpeg_timeout_secs,
        )
    }

    pub fn get_advanced_config(&self) -> Result<ConvertAdvancedConfig, ConvertError> {
        let (max_file_size, max_decoded_pixels, max_decoded_bytes, preview_max_dimension, ffmpeg_timeout_secs) =
            self.handler.get_advanced_config()?;

        Ok(ConvertAdvancedConfig {
            max_file_size,
            max_decoded_pixels,
            max_decoded_bytes,
            preview_max_dimension,
            ffmpeg_timeout_secs,
        })
    }
}
