use async_trait::async_trait;
use colored::*;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Reference returned when no frame could be captured.
pub const NO_IMAGE: &str = "no_image";

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(3);

#[async_trait]
pub trait VisionCapture: Send + Sync {
    /// Grabs one frame and returns a reference to it, or [`NO_IMAGE`].
    async fn capture(&self) -> String;
}

/// Still frames through `libcamera-still`, falling back to `ffmpeg` on a
/// V4L2 device.
pub struct CameraCapture {
    pub dir: PathBuf,
    pub width: u32,
    pub height: u32,
    pub device: String,
}

impl CameraCapture {
    pub fn from_config(config: &crate::core::state::BobertConfig) -> Self {
        Self {
            dir: config.data_dir.clone(),
            width: config.camera_width,
            height: config.camera_height,
            device: config.camera_device.clone(),
        }
    }

    fn libcamera(&self, path: &str) -> Command {
        let mut cmd = Command::new("libcamera-still");
        cmd.args(["-n", "-o", path])
            .arg("--width")
            .arg(self.width.to_string())
            .arg("--height")
            .arg(self.height.to_string())
            .args(["--timeout", "1"]);
        cmd
    }

    fn ffmpeg(&self, path: &str) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-y", "-loglevel", "error", "-f", "v4l2"])
            .arg("-video_size")
            .arg(format!("{}x{}", self.width, self.height))
            .args(["-i", self.device.as_str()])
            .args(["-frames:v", "1", path]);
        cmd
    }
}

async fn run_quiet(mut cmd: Command) -> bool {
    cmd.stdout(Stdio::null()).stderr(Stdio::null()).kill_on_drop(true);
    matches!(
        tokio::time::timeout(CAPTURE_TIMEOUT, cmd.status()).await,
        Ok(Ok(status)) if status.success()
    )
}

#[async_trait]
impl VisionCapture for CameraCapture {
    async fn capture(&self) -> String {
        let name = format!("cam_{}.jpg", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let full_path = self.dir.join(&name);
        let path = full_path.to_string_lossy().to_string();

        if run_quiet(self.libcamera(&path)).await || run_quiet(self.ffmpeg(&path)).await {
            if full_path.exists() {
                return name;
            }
        }
        eprintln!("{} Failed to capture vision (libcamera-still and ffmpeg)", "⚠️".yellow());
        NO_IMAGE.to_string()
    }
}
