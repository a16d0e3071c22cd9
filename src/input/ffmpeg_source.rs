//! ffmpeg 子进程采集 (ffmpeg capture)
//!
//! 解码交给 ffmpeg, 通过管道读取 rgb24 原始帧, 每帧固定 w*h*3 字节.
//! 支持 DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux) 摄像头, RTSP 与本地文件(循环播放).
//! 子进程退出或读取失败后, 下一次 `read` 会重新拉起解码进程.

use std::io::Read;
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;

use image::RgbImage;
use tracing::{info, warn};

use super::{Frame, FrameSource};
use crate::config::{CameraConfig, SourceSpec};
use crate::error::{Error, Result};

struct Decoder {
    child: Child,
    stdout: ChildStdout,
}

pub struct FfmpegSource {
    camera_id: String,
    source: SourceSpec,
    ffmpeg: String,
    width: u32,
    height: u32,
    decoder: Option<Decoder>,
    released: bool,
    restarts: u32,
}

impl FfmpegSource {
    pub fn new(cfg: &CameraConfig, ffmpeg: &str) -> Self {
        Self {
            camera_id: cfg.id.clone(),
            source: cfg.source.clone(),
            ffmpeg: ffmpeg.to_string(),
            width: cfg.width,
            height: cfg.height,
            decoder: None,
            released: false,
            restarts: 0,
        }
    }

    /// 打开采集源 (立即拉起解码进程)
    pub fn open(cfg: &CameraConfig, ffmpeg: &str) -> Result<Self> {
        let mut source = Self::new(cfg, ffmpeg);
        source.spawn()?;
        Ok(source)
    }

    fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// 输入参数 (格式 + 地址)
    fn input_args(&self) -> Vec<String> {
        match &self.source {
            SourceSpec::Device(index) => device_input_args(*index),
            SourceSpec::Url(url) => url_input_args(url),
        }
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
        cmd.args(self.input_args());
        let scale = format!("scale={}:{}", self.width, self.height);
        cmd.args([
            "-an",
            "-vf",
            scale.as_str(),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "pipe:1",
        ]);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        cmd
    }

    fn spawn(&mut self) -> Result<()> {
        let mut child = self.build_command().spawn().map_err(|e| {
            Error::Capture(format!("cannot start {} for {}: {}", self.ffmpeg, self.source, e))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Capture("decoder stdout not captured".into()))?;

        info!(
            camera = %self.camera_id,
            source = %self.source,
            width = self.width,
            height = self.height,
            "🎥 解码进程已启动"
        );
        self.decoder = Some(Decoder { child, stdout });
        Ok(())
    }

    fn kill_decoder(&mut self) {
        if let Some(mut dec) = self.decoder.take() {
            let _ = dec.child.kill();
            let _ = dec.child.wait();
        }
    }
}

impl FrameSource for FfmpegSource {
    fn is_opened(&self) -> bool {
        !self.released
    }

    fn read(&mut self) -> Result<Frame> {
        if self.released {
            return Err(Error::Capture("source released".into()));
        }
        if self.decoder.is_none() {
            self.restarts += 1;
            warn!(camera = %self.camera_id, restarts = self.restarts, "⚠️ 重新连接采集源");
            self.spawn()?;
        }

        let mut buf = vec![0u8; self.frame_bytes()];
        let read = match self.decoder.as_mut() {
            Some(dec) => dec.stdout.read_exact(&mut buf),
            None => return Err(Error::Capture("decoder not running".into())),
        };

        if let Err(e) = read {
            self.kill_decoder();
            return Err(Error::Capture(format!("{}: {}", self.source, e)));
        }

        RgbImage::from_raw(self.width, self.height, buf)
            .map(Arc::new)
            .ok_or_else(|| Error::Capture("short frame buffer".into()))
    }

    fn release(&mut self) {
        self.kill_decoder();
        if !self.released {
            info!(camera = %self.camera_id, "📹 采集源已释放");
        }
        self.released = true;
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.kill_decoder();
    }
}

/// 本地摄像头 - 根据平台选择输入格式
fn device_input_args(index: u32) -> Vec<String> {
    #[cfg(target_os = "windows")]
    {
        // dshow 需要设备名, 索引按 "video=<index>" 传入, 建议在配置中直接写 "video=设备名"
        vec!["-f".into(), "dshow".into(), "-i".into(), format!("video={}", index)]
    }
    #[cfg(target_os = "macos")]
    {
        vec![
            "-f".into(),
            "avfoundation".into(),
            "-framerate".into(),
            "30".into(),
            "-i".into(),
            format!("{}", index),
        ]
    }
    #[cfg(target_os = "linux")]
    {
        vec!["-f".into(), "v4l2".into(), "-i".into(), format!("/dev/video{}", index)]
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        vec!["-f".into(), "video4linux2".into(), "-i".into(), format!("{}", index)]
    }
}

/// URL 或文件路径
fn url_input_args(url: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    if url.starts_with("rtsp://") {
        args.extend(["-rtsp_transport".into(), "tcp".into()]);
    } else if url.starts_with("video=") {
        args.extend(["-f".into(), "dshow".into()]);
    } else if !url.contains("://") && Path::new(url).is_file() {
        // 文件按原速循环播放, 模拟实时源
        args.extend(["-stream_loop".into(), "-1".into(), "-re".into()]);
    }
    args.extend(["-i".into(), url.to_string()]);
    args
}
