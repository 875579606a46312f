//! # 会话状态机模块
//!
//! ## 设计思路
//!
//! 把“控件的隐式表单状态”收敛为显式状态机：
//!
//! ```text
//! Empty ──接受文件──▶ Previewing ──预览完成/失败──▶ Ready
//!                                                    │ ▲
//!                                         开始转换   │ │ 成功或失败
//!                                                    ▼ │
//!                                                 Converting
//! （任意状态 ──显式重置──▶ Empty）
//! ```
//!
//! 每个异步续体都携带其发起时的“会话世代”，世代不匹配的结果一律静默丢弃，
//! 从根上消除“快速换文件时旧回调覆盖新状态”的竞态。
//!
//! ## 实现思路
//!
//! - 同一时刻最多一个 SourceFile、一个预览句柄、一个产物句柄。
//! - 资源释放集中在取代点与重置点：产物文件删除、预览指针丢弃。
//! - 进度只在 Converting 阶段存在，每次转换开始归零。

use serde::Serialize;

use super::formats::{self, FormatSpec, MediaKind};
use super::preview::PreviewHandle;
use super::source::{Artifact, ArtifactInfo, SourceFile};
use super::ConvertError;

/// 会话阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Empty,
    Previewing,
    Ready,
    Converting,
}

/// 转换会话。由服务层用互斥锁持有，单实例。
#[derive(Debug, Default)]
pub struct Session {
    generation: u64,
    phase: SessionPhase,
    source: Option<SourceFile>,
    target_format: Option<&'static FormatSpec>,
    preview: Option<PreviewHandle>,
    artifact: Option<Artifact>,
    progress: u8,
}

/// 面向前端的源文件描述。
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub mime: String,
    pub kind: MediaKind,
    pub size: u64,
}

/// 面向前端的会话快照。
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub generation: u64,
    pub source: Option<SourceInfo>,
    pub target_format: Option<&'static str>,
    /// 当前大类下的全部可选格式（无文件时为空，保证越界选择不可达）。
    pub available_formats: Vec<FormatSpec>,
    pub progress: u8,
    pub preview: Option<PreviewHandle>,
    pub artifact: Option<ArtifactInfo>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn source(&self) -> Option<&SourceFile> {
        self.source.as_ref()
    }

    /// 接受新文件：取代并释放旧资源，清空格式选择与进度，进入 Previewing。
    ///
    /// 返回新的会话世代，供随后的异步预览任务携带。
    pub fn accept_source(&mut self, source: SourceFile) -> u64 {
        self.release_held_resources();

        self.generation += 1;
        self.phase = SessionPhase::Previewing;
        self.source = Some(source);
        self.target_format = None;
        self.progress = 0;

        self.generation
    }

    /// 预览任务收尾：世代过期则静默丢弃。
    ///
    /// `handle` 为 `None` 表示预览失败——会话仍进入 Ready（文件已接受但无预览）。
    pub fn finish_preview(&mut self, generation: u64, handle: Option<PreviewHandle>) -> bool {
        if generation != self.generation {
            log::debug!(
                "忽略过期预览结果（世代 {}，当前 {}）",
                generation,
                self.generation
            );
            return false;
        }

        self.preview = handle;
        if self.phase == SessionPhase::Previewing {
            self.phase = SessionPhase::Ready;
        }
        true
    }

    /// 选择目标格式。只允许当前媒体大类集合内的令牌。
    pub fn select_format(&mut self, token: &str) -> Result<&'static FormatSpec, ConvertError> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| ConvertError::State("尚未接受任何文件".to_string()))?;

        let spec = formats::lookup(source.kind, token)?;
        self.target_format = Some(spec);
        Ok(spec)
    }

    pub fn target_format(&self) -> Option<&'static FormatSpec> {
        self.target_format
    }

    /// 转换前置检查。
    ///
    /// 文件缺失 / 格式未选 / 阶段不为 Ready 时返回 `None`（语义为无操作而非错误），
    /// 满足则进入 Converting、进度归零，并交出本次转换的世代与输入。
    pub fn try_begin_convert(&mut self) -> Option<(u64, SourceFile, &'static FormatSpec)> {
        if self.phase != SessionPhase::Ready {
            return None;
        }
        let source = self.source.clone()?;
        let spec = self.target_format?;

        self.phase = SessionPhase::Converting;
        self.progress = 0;
        Some((self.generation, source, spec))
    }

    /// 记录进度（仅 Converting 阶段、世代匹配时生效）。
    pub fn set_progress(&mut self, generation: u64, value: u8) -> bool {
        if generation != self.generation || self.phase != SessionPhase::Converting {
            return false;
        }
        self.progress = value.min(100);
        true
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// 转换收尾：成功安顿产物（取代并释放旧产物），失败只回 Ready。
    ///
    /// 世代过期时，传入的产物当场释放，避免孤儿文件。
    pub fn finish_convert(&mut self, generation: u64, artifact: Option<Artifact>) -> bool {
        if generation != self.generation {
            if let Some(orphan) = artifact {
                log::debug!("忽略过期转换结果并释放其产物");
                orphan.release();
            }
            return false;
        }

        if let Some(new_artifact) = artifact {
            if let Some(old) = self.artifact.take() {
                old.release();
            }
            self.artifact = Some(new_artifact);
        }

        if self.phase == SessionPhase::Converting {
            self.phase = SessionPhase::Ready;
        }
        // 进度只在 Converting 阶段有意义
        self.progress = 0;
        true
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    /// 取出产物供保存，保存完成后由调用侧释放句柄。
    pub fn consume_artifact(&mut self) -> Option<Artifact> {
        self.artifact.take()
    }

    /// 显式重置：任意状态回 Empty，释放全部持有资源。
    ///
    /// 世代自增使所有在途异步结果立即过期。
    pub fn reset(&mut self) {
        self.release_held_resources();

        self.generation += 1;
        self.phase = SessionPhase::Empty;
        self.source = None;
        self.target_format = None;
        self.progress = 0;
    }

    fn release_held_resources(&mut self) {
        if self.preview.take().is_some() {
            log::debug!("🧹 已释放预览句柄");
        }
        if let Some(artifact) = self.artifact.take() {
            artifact.release();
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let available_formats = self
            .source
            .as_ref()
            .map(|s| formats::formats_for(s.kind).to_vec())
            .unwrap_or_default();

        SessionSnapshot {
            phase: self.phase,
            generation: self.generation,
            source: self.source.as_ref().map(|s| SourceInfo {
                name: s.name.clone(),
                mime: s.mime.clone(),
                kind: s.kind,
                size: s.size,
            }),
            target_format: self.target_format.map(|spec| spec.token),
            available_formats,
            progress: self.progress,
            preview: self.preview.clone(),
            artifact: self.artifact.as_ref().map(ArtifactInfo::from_artifact),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::source::ArtifactPayload;
    use std::path::PathBuf;

    fn image_source() -> SourceFile {
        SourceFile {
            name: "a.png".to_string(),
            path: PathBuf::from("/tmp/a.png"),
            mime: "image/png".to_string(),
            kind: MediaKind::Image,
            size: 1024,
        }
    }

    fn data_uri_artifact(token: &str) -> Artifact {
        let spec = formats::lookup(MediaKind::Image, token).expect("token should resolve");
        Artifact {
            format: spec,
            suggested_name: spec.suggested_file_name(),
            payload: ArtifactPayload::DataUri("data:;base64,".to_string()),
            size: 0,
        }
    }

    #[test]
    fn lifecycle_walks_the_expected_phases() {
        let mut session = Session::new();
        assert_eq!(session.phase(), SessionPhase::Empty);

        let generation = session.accept_source(image_source());
        assert_eq!(session.phase(), SessionPhase::Previewing);

        assert!(session.finish_preview(generation, Some(PreviewHandle::DataUri { data: "d".into() })));
        assert_eq!(session.phase(), SessionPhase::Ready);

        session.select_format("webp").expect("webp should be selectable");
        let (gen2, source, spec) = session.try_begin_convert().expect("convert should begin");
        assert_eq!(gen2, generation);
        assert_eq!(source.name, "a.png");
        assert_eq!(spec.token, "webp");
        assert_eq!(session.phase(), SessionPhase::Converting);
        assert_eq!(session.progress(), 0);

        assert!(session.finish_convert(gen2, Some(data_uri_artifact("webp"))));
        assert_eq!(session.phase(), SessionPhase::Ready);
        assert!(session.artifact().is_some());
    }

    #[test]
    fn convert_is_a_noop_without_file_or_format() {
        let mut session = Session::new();
        assert!(session.try_begin_convert().is_none());

        let generation = session.accept_source(image_source());
        // 预览未完成（Previewing）时同样视为前置不满足
        assert!(session.try_begin_convert().is_none());

        session.finish_preview(generation, None);
        // 已 Ready 但未选格式
        assert!(session.try_begin_convert().is_none());
        assert_eq!(session.phase(), SessionPhase::Ready);
    }

    #[test]
    fn format_selection_is_scoped_to_the_current_kind() {
        let mut session = Session::new();
        assert!(matches!(
            session.select_format("png"),
            Err(ConvertError::State(_))
        ));

        session.accept_source(image_source());
        assert!(session.select_format("mp4").is_err());
        assert!(session.select_format("gif").is_ok());
    }

    #[test]
    fn new_acquisition_clears_format_and_progress() {
        let mut session = Session::new();
        let generation = session.accept_source(image_source());
        session.finish_preview(generation, None);
        session.select_format("png").expect("png should be selectable");

        let gen2 = session.accept_source(image_source());
        assert!(gen2 > generation);
        assert!(session.target_format().is_none());
        assert_eq!(session.progress(), 0);
        assert_eq!(session.phase(), SessionPhase::Previewing);
    }

    #[test]
    fn stale_preview_result_is_discarded() {
        let mut session = Session::new();
        let old_generation = session.accept_source(image_source());
        // 用户迅速换了文件
        let _new_generation = session.accept_source(image_source());

        let applied =
            session.finish_preview(old_generation, Some(PreviewHandle::DataUri { data: "stale".into() }));
        assert!(!applied);
        assert!(session.snapshot().preview.is_none());
    }

    #[test]
    fn stale_convert_result_releases_its_artifact() {
        let dir = std::env::temp_dir();
        let path = dir.join("media_converter_stale_artifact.gif");
        std::fs::write(&path, b"gif").expect("write fixture should succeed");

        let spec = formats::lookup(MediaKind::Image, "gif").expect("gif should resolve");
        let artifact = Artifact {
            format: spec,
            suggested_name: spec.suggested_file_name(),
            payload: ArtifactPayload::File(path.clone()),
            size: 3,
        };

        let mut session = Session::new();
        let old_generation = session.accept_source(image_source());
        session.reset();

        assert!(!session.finish_convert(old_generation, Some(artifact)));
        assert!(!path.exists(), "stale artifact file should be removed");
    }

    #[test]
    fn reset_returns_everything_to_initial_values() {
        let mut session = Session::new();
        let generation = session.accept_source(image_source());
        session.finish_preview(generation, Some(PreviewHandle::DataUri { data: "d".into() }));
        session.select_format("png").expect("png should be selectable");

        session.reset();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Empty);
        assert!(snapshot.source.is_none());
        assert!(snapshot.target_format.is_none());
        assert!(snapshot.available_formats.is_empty());
        assert!(snapshot.preview.is_none());
        assert!(snapshot.artifact.is_none());
        assert_eq!(snapshot.progress, 0);
    }

    #[test]
    fn progress_only_lives_inside_converting() {
        let mut session = Session::new();
        let generation = session.accept_source(image_source());
        assert!(!session.set_progress(generation, 50));

        session.finish_preview(generation, None);
        session.select_format("png").expect("png should be selectable");
        let (gen2, _, _) = session.try_begin_convert().expect("convert should begin");

        assert!(session.set_progress(gen2, 42));
        assert_eq!(session.progress(), 42);
        // 过期世代不生效
        assert!(!session.set_progress(gen2 + 1, 80));
    }
}
