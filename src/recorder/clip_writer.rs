//! 事件片段写入 (Clip writer)
//!
//! 1) 帧统一缩放到输出分辨率
//! 2) 写入私有临时目录, PNG 序列 `%06d.png`
//! 3) 外部编码器 → H.264 yuv420p faststart MP4, 先写 `<name>.tmp`
//! 4) 检查退出码与文件大小, 成功后原子重命名为最终文件
//!
//! 临时目录无论成败都会清理.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use image::ImageFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::ClipConfig;
use crate::error::{Error, Result};
use crate::input::TimedFrame;
use crate::utils::resize_rgb;

/// 文件名只保留字母数字, `-`, `_`
static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("static pattern"));

/// 编码器 stderr 保留长度
const STDERR_HEAD: usize = 600;

pub fn sanitize(s: &str) -> String {
    UNSAFE_CHARS.replace_all(s, "").into_owned()
}

/// 图像序列 → 视频文件
pub trait VideoEncoder: Send + Sync {
    /// `pattern` 为 `%06d.png` 形式的输入序列, 输出写到 `output`
    fn encode(&self, pattern: &Path, fps: u32, output: &Path) -> Result<()>;
}

/// ffmpeg 子进程编码
pub struct FfmpegEncoder {
    ffmpeg: String,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// 检查 ffmpeg 是否可用, 返回版本行
    pub fn check(&self) -> Result<String> {
        let output = Command::new(&self.ffmpeg)
            .arg("-version")
            .output()
            .map_err(|e| Error::Encode {
                status: "spawn".into(),
                stderr: format!("{} not found: {}", self.ffmpeg, e),
            })?;
        if !output.status.success() {
            return Err(Error::Encode {
                status: output.status.to_string(),
                stderr: "ffmpeg version check failed".into(),
            });
        }
        let version = String::from_utf8_lossy(&output.stdout);
        Ok(version.lines().next().unwrap_or("unknown").to_string())
    }

    fn args(pattern: &Path, fps: u32, output: &Path) -> Vec<OsString> {
        let fps = fps.to_string();
        let mut args: Vec<OsString> = ["-y", "-f", "image2", "-framerate", fps.as_str(), "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(pattern.as_os_str().to_owned());
        args.extend(
            [
                "-an",
                "-vcodec",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-preset",
                "ultrafast",
                "-movflags",
                "+faststart",
                "-r",
                fps.as_str(),
                "-f",
                "mp4",
            ]
            .iter()
            .map(OsString::from),
        );
        args.push(output.as_os_str().to_owned());
        args
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&self, pattern: &Path, fps: u32, output: &Path) -> Result<()> {
        let args = Self::args(pattern, fps, output);
        debug!(cmd = %self.ffmpeg, ?args, "encode");

        let result = Command::new(&self.ffmpeg).args(&args).output()?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(Error::Encode {
                status: result.status.to_string(),
                stderr: stderr.chars().take(STDERR_HEAD).collect(),
            });
        }
        Ok(())
    }
}

/// 片段写入器. 无内部可变状态, 可在线程间共享.
pub struct ClipWriter {
    out_dir: PathBuf,
    fps: u32,
    width: u32,
    height: u32,
    min_bytes: u64,
    encoder: Arc<dyn VideoEncoder>,
}

impl ClipWriter {
    /// 使用 ffmpeg 编码器, 创建输出目录
    pub fn new(cfg: &ClipConfig, fps: u32, width: u32, height: u32) -> Result<Self> {
        Self::with_encoder(cfg, fps, width, height, Arc::new(FfmpegEncoder::new(&cfg.ffmpeg)))
    }

    pub fn with_encoder(
        cfg: &ClipConfig,
        fps: u32,
        width: u32,
        height: u32,
        encoder: Arc<dyn VideoEncoder>,
    ) -> Result<Self> {
        fs::create_dir_all(&cfg.dir)?;
        Ok(Self {
            out_dir: cfg.dir.clone(),
            fps: fps.max(1),
            width,
            height,
            min_bytes: cfg.min_bytes,
            encoder,
        })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// `{UTC 时间}_{摄像头}_{事件}.mp4`
    pub fn make_name(&self, camera_id: &str, event_type: &str) -> String {
        let ts = Utc::now().format("%Y%m%d_%H%M%S_%6f");
        format!("{}_{}_{}.mp4", ts, sanitize(camera_id), sanitize(event_type))
    }

    /// 同步写入, 返回文件名
    pub fn write_sync(
        &self,
        camera_id: &str,
        event_type: &str,
        pre: &[TimedFrame],
        post: &[TimedFrame],
        name: Option<&str>,
    ) -> Result<String> {
        let name = match name {
            Some(n) => n.to_string(),
            None => self.make_name(camera_id, event_type),
        };
        if pre.is_empty() && post.is_empty() {
            return Err(Error::NoFrames);
        }

        let start = Instant::now();
        let out_path = self.out_dir.join(&name);
        let tmp_path = tmp_sibling(&out_path);

        // 临时目录在 drop 时删除
        let scratch = tempfile::Builder::new().prefix("clip_").tempdir()?;

        let mut count = 0usize;
        for tf in pre.iter().chain(post.iter()) {
            let frame = resize_rgb(&tf.frame, self.width, self.height)?;
            let png = scratch.path().join(format!("{:06}.png", count));
            frame.save_with_format(&png, ImageFormat::Png)?;
            count += 1;
        }

        let pattern = scratch.path().join("%06d.png");
        if let Err(e) = self.encoder.encode(&pattern, self.fps, &tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        let size = fs::metadata(&tmp_path).map(|m| m.len()).unwrap_or(0);
        if size < self.min_bytes {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::ClipTooSmall {
                path: out_path,
                size,
                min: self.min_bytes,
            });
        }

        fs::rename(&tmp_path, &out_path)?;

        if let Err(e) = scratch.close() {
            warn!(error = %e, "clip scratch cleanup failed");
        }

        info!(
            camera = camera_id,
            event_type = event_type,
            file = %out_path.display(),
            frames = count,
            bytes = size,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "🎬 clip written"
        );
        Ok(name)
    }
}

/// `<path>.tmp`
fn tmp_sibling(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".tmp");
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_util::at;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;

    /// 写入固定字节数, 记录输入序列
    struct FakeEncoder {
        bytes: usize,
        fail: bool,
        seen: Mutex<Vec<(PathBuf, usize, (u32, u32))>>,
    }

    impl FakeEncoder {
        fn new(bytes: usize) -> Self {
            Self {
                bytes,
                fail: false,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl VideoEncoder for FakeEncoder {
        fn encode(&self, pattern: &Path, _fps: u32, output: &Path) -> Result<()> {
            let dir = pattern.parent().unwrap().to_path_buf();
            let count = fs::read_dir(&dir).unwrap().count();
            let first = image::open(dir.join("000000.png")).unwrap();
            self.seen
                .lock()
                .unwrap()
                .push((dir, count, (first.width(), first.height())));
            if self.fail {
                return Err(Error::Encode {
                    status: "exit status: 1".into(),
                    stderr: "boom".into(),
                });
            }
            fs::write(output, vec![0u8; self.bytes])?;
            Ok(())
        }
    }

    fn frames(n: usize, w: u32, h: u32) -> Vec<TimedFrame> {
        (0..n)
            .map(|i| {
                TimedFrame::new(
                    at(i as f64 * 0.1),
                    Arc::new(RgbImage::from_pixel(w, h, Rgb([i as u8 * 10, 0, 0]))),
                )
            })
            .collect()
    }

    fn writer(dir: &Path, encoder: Arc<dyn VideoEncoder>) -> ClipWriter {
        let cfg = ClipConfig {
            dir: dir.to_path_buf(),
            ..ClipConfig::default()
        };
        ClipWriter::with_encoder(&cfg, 15, 32, 24, encoder).unwrap()
    }

    #[test]
    fn test_name_is_sanitized() {
        let out = tempfile::tempdir().unwrap();
        let w = writer(out.path(), Arc::new(FakeEncoder::new(2048)));
        let name = w.make_name("cam 1/../x", "camera_tamper");
        assert!(name.ends_with("_cam1x_camera_tamper.mp4"), "{}", name);
        // %Y%m%d_%H%M%S_%6f
        assert_eq!(name.split('_').next().unwrap().len(), 8);
        assert_eq!(sanitize("a-b_c.d e"), "a-b_cde");
    }

    #[test]
    fn test_write_sync_publishes_normalized_clip() {
        let out = tempfile::tempdir().unwrap();
        let enc = Arc::new(FakeEncoder::new(4096));
        let w = writer(out.path(), enc.clone());

        let name = w
            .write_sync("cam-1", "fall", &frames(3, 64, 48), &frames(2, 32, 24), None)
            .unwrap();
        let path = out.path().join(&name);
        assert!(path.is_file());
        assert_eq!(fs::metadata(&path).unwrap().len(), 4096);
        assert!(!tmp_sibling(&path).exists());

        let seen = enc.seen.lock().unwrap();
        let (scratch, count, dims) = &seen[0];
        assert_eq!(*count, 5);
        assert_eq!(*dims, (32, 24));
        // 临时目录已清理
        assert!(!scratch.exists());
    }

    #[test]
    fn test_rewrite_same_name_overwrites() {
        let out = tempfile::tempdir().unwrap();
        let w = writer(out.path(), Arc::new(FakeEncoder::new(2048)));
        let first = w
            .write_sync("cam", "intrusion", &frames(2, 32, 24), &[], Some("same.mp4"))
            .unwrap();
        let second = w
            .write_sync("cam", "intrusion", &frames(4, 32, 24), &[], Some("same.mp4"))
            .unwrap();
        assert_eq!(first, second);
        assert!(out.path().join("same.mp4").is_file());
        fs::remove_file(out.path().join("same.mp4")).unwrap();
    }

    #[test]
    fn test_no_frames() {
        let out = tempfile::tempdir().unwrap();
        let w = writer(out.path(), Arc::new(FakeEncoder::new(2048)));
        assert!(matches!(
            w.write_sync("cam", "fall", &[], &[], None),
            Err(Error::NoFrames)
        ));
    }

    #[test]
    fn test_undersized_output_not_published() {
        let out = tempfile::tempdir().unwrap();
        let w = writer(out.path(), Arc::new(FakeEncoder::new(10)));
        let err = w
            .write_sync("cam", "fall", &frames(2, 32, 24), &[], Some("small.mp4"))
            .unwrap_err();
        assert!(matches!(err, Error::ClipTooSmall { size: 10, .. }));
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_encoder_failure_propagates() {
        let out = tempfile::tempdir().unwrap();
        let enc = Arc::new(FakeEncoder {
            fail: true,
            ..FakeEncoder::new(2048)
        });
        let w = writer(out.path(), enc.clone());
        let err = w
            .write_sync("cam", "fall", &frames(2, 32, 24), &[], None)
            .unwrap_err();
        assert!(matches!(err, Error::Encode { .. }));
        assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
        assert!(!enc.seen.lock().unwrap()[0].0.exists());
    }

    #[test]
    fn test_ffmpeg_round_trip_when_available() {
        let encoder = FfmpegEncoder::new("ffmpeg");
        if encoder.check().is_err() {
            eprintln!("ffmpeg not on PATH, skipping");
            return;
        }
        let out = tempfile::tempdir().unwrap();
        let cfg = ClipConfig {
            dir: out.path().to_path_buf(),
            ..ClipConfig::default()
        };
        let w = ClipWriter::new(&cfg, 15, 64, 48).unwrap();

        let mut rng_state = 12345u32;
        let noisy: Vec<TimedFrame> = (0..15)
            .map(|i| {
                let img = RgbImage::from_fn(64, 48, |_, _| {
                    rng_state = rng_state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                    let v = (rng_state >> 16) as u8;
                    Rgb([v, v.wrapping_mul(3), v.wrapping_add(90)])
                });
                TimedFrame::new(at(i as f64 / 15.0), Arc::new(img))
            })
            .collect();

        let name = w.write_sync("cam", "loitering", &noisy, &[], None).unwrap();
        let path = out.path().join(&name);
        assert!(fs::metadata(&path).unwrap().len() >= cfg.min_bytes);
        // 同名再次编码
        let again = w
            .write_sync("cam", "loitering", &noisy, &[], Some(&name))
            .unwrap();
        assert_eq!(again, name);
        assert!(path.is_file());
    }
}
