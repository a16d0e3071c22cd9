/// 数字卫兵 (Digital Sentinel)
///
/// 多路摄像头安防分析
///
/// 系统架构:
/// 1. 每路摄像头一个工作线程: 采集 → 检测 → 跟踪 → 行为分析 → 片段 → 上报
/// 2. 主线程: 启动/停止, 周期性输出在场人数
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use mimalloc::MiMalloc;
use sentinel_rs::recorder::FfmpegEncoder;
use sentinel_rs::{AppConfig, Args, CameraRegistry};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sentinel_rs=info,sentinel=info")),
        )
        .init();

    let args = Args::parse();
    let mut config = AppConfig::load(&args.config)
        .with_context(|| format!("加载配置失败: {}", args.config.display()))?;
    config.apply_args(&args);

    info!("🚀 数字卫兵系统启动");
    info!(cameras = config.cameras.len(), zones = config.zones.len(), "📦 配置已加载");
    info!(dir = %config.clips.dir.display(), "🎬 片段目录");

    match FfmpegEncoder::new(config.clips.ffmpeg.as_str()).check() {
        Ok(version) => info!("✅ {}", version),
        Err(e) => warn!(error = %e, "⚠️ ffmpeg 不可用, 事件将不带片段上报"),
    }

    // ========== Ctrl-C ==========
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .context("无法注册 Ctrl-C 处理")?;
    }

    // ========== 启动所有摄像头 ==========
    let registry = CameraRegistry::new(config);
    registry.start_all().context("摄像头启动失败")?;
    info!(cameras = ?registry.camera_ids(), "✅ 系统就绪, 开始监控...");

    // ========== 主线程: 状态输出 ==========
    let interval = Duration::from_secs(args.status_interval.max(1));
    let mut last_status = Instant::now();
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
        if last_status.elapsed() >= interval {
            for (camera, count) in registry.occupancy_all() {
                info!(camera = %camera, occupancy = count, "📹 在场人数");
            }
            last_status = Instant::now();
        }
    }

    info!("🛑 正在停止...");
    registry.stop_all(Duration::from_secs_f64(args.shutdown_timeout.max(0.0)));
    info!("👋 已退出");
    Ok(())
}
