//! # 视频转换流水线模块
//!
//! ## 设计思路
//!
//! 视频重编码整体委托给外部 ffmpeg 进程（按宿主编码器对待，黑盒调用）：
//! 探测时长 → 组装编码参数 → 拉起进程 → 逐行消费进度管道 → 收尾产物。
//! 进度按“已编码时长 / 总时长”折算为 0~100，单调递增、99 封顶，
//! 编码器正常退出后才置 100，保证“产物完整可用之后才触发完成”。
//!
//! ## 实现思路
//!
//! - ffmpeg / ffprobe 路径通过 `which` 发现并用 `once_cell` 缓存。
//! - `-progress pipe:1 -nostats` 输出机器可读键值行，正则解析 `out_time_*`。
//! - 取消标志逐行轮询，命中后杀进程并清理半成品。
//! - 看门狗超时包裹每次读行，0 表示关闭（还原原始“无限等待”行为）。
//! - mov 为近似编码：走 mp4 封装器，产物 MIME 由能力表重打为 quicktime。

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::formats::FormatSpec;
use super::handler::ConvertHandler;
use super::source::{Artifact, ArtifactPayload, SourceFile};
use super::{ConvertConfig, ConvertError};

/// ffmpeg 进度行中的已编码时长。
///
/// ffmpeg 的 `out_time_ms` 历史上就是微秒值，与 `out_time_us` 同值，统一按微秒解析。
static OUT_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^out_time_(?:us|ms)=(\d+)$").expect("进度正则非法"));

static FFMPEG_PATH: Lazy<Option<PathBuf>> = Lazy::new(|| which::which("ffmpeg").ok());
static FFPROBE_PATH: Lazy<Option<PathBuf>> = Lazy::new(|| which::which("ffprobe").ok());

fn ffmpeg_path() -> Result<&'static Path, ConvertError> {
    FFMPEG_PATH
        .as_deref()
        .ok_or_else(|| ConvertError::ToolUnavailable("未找到 ffmpeg，可执行文件不在 PATH 中".to_string()))
}

fn ffprobe_path() -> Result<&'static Path, ConvertError> {
    FFPROBE_PATH
        .as_deref()
        .ok_or_else(|| ConvertError::ToolUnavailable("未找到 ffprobe，可执行文件不在 PATH 中".to_string()))
}

/// 单次转换内的进度状态：只进不退，99 封顶，完成时置 100。
#[derive(Debug)]
pub(super) struct ProgressTracker {
    current: u8,
}

impl ProgressTracker {
    pub(super) fn new() -> Self {
        Self { current: 0 }
    }

    /// 按已编码微秒数折算百分比；仅在前进时返回新值。
    pub(super) fn update(&mut self, out_time_us: u64, duration_us: u64) -> Option<u8> {
        if duration_us == 0 {
            return None;
        }

        let ratio = out_time_us.saturating_mul(100) / duration_us;
        let percent = ratio.min(99) as u8;

        if percent > self.current {
            self.current = percent;
            Some(percent)
        } else {
            None
        }
    }

    /// 编码器正常退出后调用。
    pub(super) fn complete(&mut self) -> u8 {
        self.current = 100;
        self.current
    }
}

/// 解析一行进度输出，返回已编码微秒数。
pub(super) fn parse_progress_line(line: &str) -> Option<u64> {
    let caps = OUT_TIME_RE.captures(line.trim())?;
    caps.get(1)?.as_str().parse().ok()
}

/// 组装 ffmpeg 编码参数（不含可执行文件本身）。
///
/// 封装器通过 `-f` 显式指定，mov 近似复用 mp4 封装器。
pub(super) fn encode_args(
    spec: &FormatSpec,
    config: &ConvertConfig,
    input: &Path,
    output: &Path,
) -> Result<Vec<String>, ConvertError> {
    let muxer = spec.ffmpeg_muxer().ok_or_else(|| {
        ConvertError::InvalidFormat(format!("{} 不是视频目标格式", spec.token))
    })?;

    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        input.to_string_lossy().to_string(),
        "-progress".into(),
        "pipe:1".into(),
        "-nostats".into(),
    ];

    match muxer {
        "mp4" => {
            args.extend([
                "-c:v".into(),
                "libx264".into(),
                "-preset".into(),
                config.video_preset.to_string(),
                "-crf".into(),
                config.video_crf.to_string(),
                "-pix_fmt".into(),
                "yuv420p".into(),
                "-c:a".into(),
                "aac".into(),
                "-b:a".into(),
                "128k".into(),
                "-movflags".into(),
                "+faststart".into(),
            ]);
        }
        "webm" => {
            args.extend([
                "-c:v".into(),
                "libvpx-vp9".into(),
                "-crf".into(),
                config.video_crf.to_string(),
                "-b:v".into(),
                "0".into(),
                "-c:a".into(),
                "libopus".into(),
                "-b:a".into(),
                "128k".into(),
            ]);
        }
        "ogg" => {
            args.extend([
                "-c:v".into(),
                "libtheora".into(),
                "-q:v".into(),
                "6".into(),
                "-c:a".into(),
                "libvorbis".into(),
                "-q:a".into(),
                "4".into(),
            ]);
        }
        other => {
            return Err(ConvertError::InvalidFormat(format!(
                "未知封装器：{}",
                other
            )));
        }
    }

    args.extend(["-f".into(), muxer.to_string()]);
    args.push(output.to_string_lossy().to_string());
    Ok(args)
}

/// 用 ffprobe 读取媒体总时长（微秒）。
async fn probe_duration_us(input: &Path) -> Result<u64, ConvertError> {
    let ffprobe = ffprobe_path()?;

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| ConvertError::ToolUnavailable(format!("启动 ffprobe 失败：{}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ConvertError::Decode(format!(
            "媒体探测失败：{}",
            stderr.trim()
        )));
    }

    let seconds: f64 = String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .map_err(|_| ConvertError::Decode("无法读取媒体时长".to_string()))?;

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ConvertError::Decode("媒体时长非法".to_string()));
    }

    Ok((seconds * 1_000_000.0) as u64)
}

impl ConvertHandler {
    /// 视频路径主流程：探测 → 编码 → 进度回报 → 产物落盘。
    pub(super) async fn convert_video<P, C>(
        &self,
        source: &SourceFile,
        spec: &'static FormatSpec,
        config: &ConvertConfig,
        artifacts_dir: &Path,
        on_progress: P,
        is_cancelled: C,
    ) -> Result<Artifact, ConvertError>
    where
        P: Fn(u8) + Send + Sync,
        C: Fn() -> bool + Send + Sync,
    {
        let ffmpeg = ffmpeg_path()?;
        let duration_us = probe_duration_us(&source.path).await?;

        if is_cancelled() {
            return Err(ConvertError::Cancelled("转换尚未开始即被取消".to_string()));
        }

        let timestamp = Local::now().format("%Y%m%d%H%M%S%f");
        let output_path = artifacts_dir.join(format!("art_{}.{}", timestamp, spec.token));
        let args = encode_args(spec, config, &source.path, &output_path)?;

        log::info!(
            "🎬 启动视频编码 - {} -> {}（时长 {:.1}s，封装器 {}）",
            source.name,
            spec.token,
            duration_us as f64 / 1_000_000.0,
            spec.ffmpeg_muxer().unwrap_or("?")
        );

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConvertError::ToolUnavailable(format!("启动 ffmpeg 失败：{}", e)))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ConvertError::Encode("无法接管 ffmpeg 进度管道".to_string())
        })?;
        let mut stderr = child.stderr.take();

        // stderr 并行收集，防止编码器因管道写满而阻塞。
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(pipe) = stderr.as_mut() {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        });

        let mut tracker = ProgressTracker::new();
        let mut lines = BufReader::new(stdout).lines();
        let watchdog = Duration::from_secs(config.ffmpeg_timeout_secs);

        let read_result: Result<(), ConvertError> = loop {
            let next = if config.ffmpeg_timeout_secs == 0 {
                lines.next_line().await
            } else {
                match tokio::time::timeout(watchdog, lines.next_line()).await {
                    Ok(inner) => inner,
                    Err(_) => {
                        break Err(ConvertError::Timeout(format!(
                            "编码器超过 {} 秒无进度输出",
                            config.ffmpeg_timeout_secs
                        )));
                    }
                }
            };

            let line = match next {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(e) => break Err(ConvertError::Encode(format!("读取进度管道失败：{}", e))),
            };

            if is_cancelled() {
                break Err(ConvertError::Cancelled("用户取消了转换".to_string()));
            }

            if let Some(out_time_us) = parse_progress_line(&line) {
                if let Some(percent) = tracker.update(out_time_us, duration_us) {
                    on_progress(percent);
                }
            }
        };

        if read_result.is_err() {
            if let Err(err) = child.kill().await {
                log::warn!("终止 ffmpeg 进程失败：{}", err);
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| ConvertError::Encode(format!("等待 ffmpeg 退出失败：{}", e)))?;
        let stderr_text = stderr_task.await.unwrap_or_default();

        if let Err(err) = read_result {
            Self::discard_partial_output(&output_path);
            return Err(err);
        }

        if !status.success() {
            Self::discard_partial_output(&output_path);
            let tail: String = stderr_text.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
            return Err(ConvertError::Encode(format!(
                "ffmpeg 退出异常（{}）：{}",
                status,
                tail
            )));
        }

        let size = std::fs::metadata(&output_path).map(|m| m.len()).unwrap_or(0);
        on_progress(tracker.complete());

        log::info!(
            "✅ 视频编码完成 - {}（{}KB，MIME {}）",
            output_path.display(),
            size / 1024,
            spec.mime_type
        );

        Ok(Artifact {
            format: spec,
            suggested_name: spec.suggested_file_name(),
            payload: ArtifactPayload::File(output_path),
            size,
        })
    }

    /// 失败/取消路径：半成品一律不对外提供，直接清理。
    fn discard_partial_output(path: &Path) {
        if path.exists() {
            match std::fs::remove_file(path) {
                Ok(()) => log::debug!("🧹 已清理半成品：{}", path.display()),
                Err(err) => log::warn!("清理半成品失败（{}）：{}", path.display(), err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::formats::{self, MediaKind};

    #[test]
    fn progress_line_parsing_handles_both_keys() {
        assert_eq!(parse_progress_line("out_time_us=1500000"), Some(1_500_000));
        assert_eq!(parse_progress_line("out_time_ms=1500000"), Some(1_500_000));
        assert_eq!(parse_progress_line("out_time=00:00:01.500000"), None);
        assert_eq!(parse_progress_line("progress=end"), None);
        assert_eq!(parse_progress_line("frame=42"), None);
    }

    #[test]
    fn tracker_is_monotonic_and_capped() {
        let mut tracker = ProgressTracker::new();
        let duration = 10_000_000u64;

        assert_eq!(tracker.update(1_000_000, duration), Some(10));
        // 回退的时间戳不会让进度倒退
        assert_eq!(tracker.update(500_000, duration), None);
        assert_eq!(tracker.update(5_000_000, duration), Some(50));
        // 超出时长也封顶在 99，等待真正的完成信号
        assert_eq!(tracker.update(20_000_000, duration), Some(99));
        assert_eq!(tracker.update(30_000_000, duration), None);
        assert_eq!(tracker.complete(), 100);
    }

    #[test]
    fn tracker_ignores_zero_duration() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.update(1_000_000, 0), None);
    }

    #[test]
    fn mp4_args_use_h264_and_explicit_muxer() {
        let spec = formats::lookup(MediaKind::Video, "mp4").expect("mp4 should resolve");
        let config = ConvertConfig::default();
        let args = encode_args(spec, &config, Path::new("in.avi"), Path::new("out.mp4"))
            .expect("args should build");

        assert!(args.iter().any(|a| a == "libx264"));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "mp4"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn mov_args_reuse_the_mp4_muxer() {
        let spec = formats::lookup(MediaKind::Video, "mov").expect("mov should resolve");
        let config = ConvertConfig::default();
        let args = encode_args(spec, &config, Path::new("in.webm"), Path::new("out.mov"))
            .expect("args should build");

        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "mp4"));
        assert!(args.iter().any(|a| a == "libx264"));
    }

    #[test]
    fn webm_and_ogg_pick_matching_codecs() {
        let config = ConvertConfig::default();

        let webm = formats::lookup(MediaKind::Video, "webm").expect("webm should resolve");
        let args = encode_args(webm, &config, Path::new("a"), Path::new("b"))
            .expect("args should build");
        assert!(args.iter().any(|a| a == "libvpx-vp9"));
        assert!(args.iter().any(|a| a == "libopus"));

        let ogg = formats::lookup(MediaKind::Video, "ogg").expect("ogg should resolve");
        let args = encode_args(ogg, &config, Path::new("a"), Path::new("b"))
            .expect("args should build");
        assert!(args.iter().any(|a| a == "libtheora"));
        assert!(args.iter().any(|a| a == "libvorbis"));
    }

    #[test]
    fn image_token_is_rejected_for_video_args() {
        let spec = formats::lookup(MediaKind::Image, "png").expect("png should resolve");
        let config = ConvertConfig::default();
        let result = encode_args(spec, &config, Path::new("a"), Path::new("b"));
        assert!(matches!(result, Err(ConvertError::InvalidFormat(_))));
    }
}
