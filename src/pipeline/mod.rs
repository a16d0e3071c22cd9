/// 多路摄像头流水线 (Camera pipeline)
///
/// 每路摄像头一个独立线程, 摄像头之间只共享只读配置:
/// - CameraWorker:   单路 tick 循环 (采集/检测/跟踪/行为/片段/上报)
/// - CameraRegistry: 启停与只读查询 (预览, 热力图, 在场人数)
/// - PreviewQueue:   丢弃最旧帧的预览队列
pub mod preview;
pub mod registry;
pub mod worker;

pub use preview::{LastFrame, PreviewQueue};
pub use registry::CameraRegistry;
pub use worker::{CameraShared, CameraWorker, ClipOutput, Collaborators, TickReport};

/// 工作线程状态: Running → Stopping → Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Running = 0,
    Stopping = 1,
    Stopped = 2,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Running,
            1 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
