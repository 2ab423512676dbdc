use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command as TokioCommand};
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::{CameraDescriptor, HandleState, RecorderError, Result};
use crate::config::CaptureConfig;

/// How a capture process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    pub code: Option<i32>,
    pub success: bool,
}

impl From<std::process::ExitStatus> for ExitReport {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
        }
    }
}

/// One running capture engine.
#[async_trait]
pub trait CaptureProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Non-blocking exit probe, `Ok(None)` while the process runs.
    fn try_exit(&mut self) -> io::Result<Option<ExitReport>>;

    /// Ask the process to stop, wait up to `timeout`, then force it.
    async fn terminate_and_wait(&mut self, timeout: Duration) -> io::Result<()>;
}

/// Starts capture engines. Must return as soon as the process is spawned.
#[async_trait]
pub trait CaptureLauncher: Send + Sync {
    async fn launch(
        &self,
        camera: &CameraDescriptor,
        output_path: &Path,
    ) -> io::Result<Box<dyn CaptureProcess>>;
}

/// Supervisor-side view of one recording.
pub struct CaptureHandle {
    id: Uuid,
    camera_name: String,
    started_at: NaiveDateTime,
    output_path: PathBuf,
    state: HandleState,
    last_exit: Option<ExitReport>,
    process: Box<dyn CaptureProcess>,
}

impl CaptureHandle {
    /// Launch a recording of `camera` into `output_path`.
    ///
    /// A process that is already gone with a failure status by the time the
    /// launcher returns counts as a spawn failure.
    pub async fn start(
        launcher: &dyn CaptureLauncher,
        camera: &CameraDescriptor,
        output_path: PathBuf,
        started_at: NaiveDateTime,
    ) -> Result<Self> {
        let spawn_error = |reason: String| RecorderError::Spawn {
            camera: camera.camera_name.clone(),
            reason,
        };

        let process = launcher
            .launch(camera, &output_path)
            .await
            .map_err(|e| spawn_error(e.to_string()))?;

        let mut handle = Self {
            id: Uuid::new_v4(),
            camera_name: camera.camera_name.clone(),
            started_at,
            output_path,
            state: HandleState::Starting,
            last_exit: None,
            process,
        };

        match handle.process.try_exit() {
            Ok(Some(report)) if !report.success => {
                return Err(spawn_error(format!(
                    "capture engine exited immediately with status {:?}",
                    report.code
                )));
            }
            Ok(_) => {}
            Err(e) => return Err(spawn_error(e.to_string())),
        }

        handle.state = HandleState::Running;
        Ok(handle)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn camera_name(&self) -> &str {
        &self.camera_name
    }

    pub fn started_at(&self) -> NaiveDateTime {
        self.started_at
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn last_exit(&self) -> Option<ExitReport> {
        self.last_exit
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    /// Never fails: a probe error is treated as a dead process.
    pub fn is_alive(&mut self) -> bool {
        if self.state.is_final() {
            return false;
        }

        match self.process.try_exit() {
            Ok(None) => true,
            Ok(Some(report)) => {
                self.last_exit = Some(report);
                self.state = HandleState::Dead;
                false
            }
            Err(e) => {
                let error = RecorderError::LivenessCheck {
                    camera: self.camera_name.clone(),
                    reason: e.to_string(),
                };
                warn!("{}", error);
                self.state = HandleState::Dead;
                false
            }
        }
    }

    /// Best-effort stop. Errors are returned for logging only.
    ///
    /// A handle already observed dead stays `Dead`; the call still reaps the
    /// process.
    pub async fn terminate_and_wait(&mut self, timeout: Duration) -> Result<()> {
        if self.state == HandleState::Terminated {
            return Ok(());
        }

        let result = self.process.terminate_and_wait(timeout).await;
        if self.state != HandleState::Dead {
            self.state = HandleState::Terminated;
        }

        result.map_err(|e| RecorderError::Termination {
            camera: self.camera_name.clone(),
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("id", &self.id)
            .field("camera_name", &self.camera_name)
            .field("started_at", &self.started_at)
            .field("output_path", &self.output_path)
            .field("state", &self.state)
            .finish()
    }
}

/// Launches `ffmpeg` in stream-copy mode.
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    config: CaptureConfig,
}

impl FfmpegLauncher {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Full argument list, identical for first starts and restarts.
    pub fn arguments(&self, camera: &CameraDescriptor, output_path: &Path) -> Vec<String> {
        let cfg = &self.config;
        vec![
            "-loglevel".to_string(), cfg.loglevel.clone(),
            "-rtsp_transport".to_string(), cfg.rtsp_transport.clone(),
            "-buffer_size".to_string(), cfg.buffer_size.to_string(),
            "-i".to_string(), camera.rtsp_url.clone(),
            "-f".to_string(), cfg.format.clone(),
            "-vcodec".to_string(), "copy".to_string(),
            "-acodec".to_string(), "copy".to_string(),
            "-g".to_string(), cfg.keyframe_interval.to_string(),
            "-y".to_string(),
            output_path.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl CaptureLauncher for FfmpegLauncher {
    async fn launch(
        &self,
        camera: &CameraDescriptor,
        output_path: &Path,
    ) -> io::Result<Box<dyn CaptureProcess>> {
        let mut ffmpeg_cmd = TokioCommand::new(&self.config.ffmpeg_path);
        ffmpeg_cmd
            .args(self.arguments(camera, output_path))
            // stdin stays open so that `q` can end the recording cleanly
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Starting FFmpeg process with command: {:?}", ffmpeg_cmd);
        let mut child = ffmpeg_cmd.spawn()?;
        let stdin = child.stdin.take();

        if let Some(stderr) = child.stderr.take() {
            let camera_name = camera.camera_name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.trim().is_empty() {
                        debug!("FFmpeg stderr ({}): {}", camera_name, line.trim());
                    }
                }
            });
        }

        info!(
            "FFmpeg started for {} (pid {:?}) -> {:?}",
            camera.camera_name,
            child.id(),
            output_path
        );

        Ok(Box::new(FfmpegProcess { child, stdin }))
    }
}

pub struct FfmpegProcess {
    child: Child,
    stdin: Option<ChildStdin>,
}

#[async_trait]
impl CaptureProcess for FfmpegProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_exit(&mut self) -> io::Result<Option<ExitReport>> {
        Ok(self.child.try_wait()?.map(ExitReport::from))
    }

    async fn terminate_and_wait(&mut self, timeout: Duration) -> io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }

        if let Some(mut stdin) = self.stdin.take() {
            // A broken pipe just means ffmpeg is already on its way out.
            if let Err(e) = stdin.write_all(b"q").await {
                debug!("Could not send quit to FFmpeg: {}", e);
            }
        }

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => {
                debug!("FFmpeg exited with {:?}", status?);
                Ok(())
            }
            Err(_) => {
                warn!(
                    "FFmpeg (pid {:?}) did not stop within {:?}, killing it",
                    self.child.id(),
                    timeout
                );
                self.child.kill().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_capture::ScriptedLauncher;
    use chrono::NaiveDate;

    fn started_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 12)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn camera() -> CameraDescriptor {
        CameraDescriptor::new("gate", "rtsp://10.0.0.9/main")
    }

    #[test]
    fn test_ffmpeg_arguments() {
        let launcher = FfmpegLauncher::new(CaptureConfig::default());
        let args = launcher.arguments(&camera(), Path::new("20240112/gate_20240112_090000.ts"));

        let joined = args.join(" ");
        assert_eq!(
            joined,
            "-loglevel quiet -rtsp_transport tcp -buffer_size 1000000 \
             -i rtsp://10.0.0.9/main -f mpegts -vcodec copy -acodec copy -g 10 \
             -y 20240112/gate_20240112_090000.ts"
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let launcher = FfmpegLauncher::new(CaptureConfig {
            ffmpeg_path: "/nonexistent/bin/ffmpeg-does-not-exist".to_string(),
            ..CaptureConfig::default()
        });

        let result = CaptureHandle::start(
            &launcher,
            &camera(),
            PathBuf::from("out.ts"),
            started_at(),
        )
        .await;

        assert!(matches!(result, Err(RecorderError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_handle_lifecycle_running_to_terminated() {
        let launcher = ScriptedLauncher::new();
        let mut handle = CaptureHandle::start(&launcher, &camera(), PathBuf::from("a.ts"), started_at())
            .await
            .unwrap();

        assert_eq!(handle.state(), HandleState::Running);
        assert!(handle.is_alive());

        handle.terminate_and_wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(handle.state(), HandleState::Terminated);
        assert!(!handle.is_alive());
        assert_eq!(launcher.terminated_count("gate"), 1);
    }

    #[tokio::test]
    async fn test_observed_exit_is_dead_and_stays_dead() {
        let launcher = ScriptedLauncher::new();
        let mut handle = CaptureHandle::start(&launcher, &camera(), PathBuf::from("a.ts"), started_at())
            .await
            .unwrap();

        launcher.kill("gate");
        assert!(!handle.is_alive());
        assert_eq!(handle.state(), HandleState::Dead);
        assert_eq!(handle.last_exit().map(|r| r.success), Some(false));

        // Cleanup still reaches the process but the handle stays Dead.
        handle.terminate_and_wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(handle.state(), HandleState::Dead);
        assert_eq!(launcher.terminated_count("gate"), 1);
    }

    #[tokio::test]
    async fn test_probe_error_counts_as_dead() {
        let launcher = ScriptedLauncher::new();
        let mut handle = CaptureHandle::start(&launcher, &camera(), PathBuf::from("a.ts"), started_at())
            .await
            .unwrap();

        launcher.break_probe("gate");
        assert!(!handle.is_alive());
        assert_eq!(handle.state(), HandleState::Dead);
    }

    #[tokio::test]
    async fn test_immediate_failure_is_spawn_error() {
        let launcher = ScriptedLauncher::new();
        launcher.exit_immediately("gate");

        let result = CaptureHandle::start(&launcher, &camera(), PathBuf::from("a.ts"), started_at()).await;
        assert!(matches!(result, Err(RecorderError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_termination_failure_is_reported() {
        let launcher = ScriptedLauncher::new();
        let mut handle = CaptureHandle::start(&launcher, &camera(), PathBuf::from("a.ts"), started_at())
            .await
            .unwrap();

        launcher.fail_termination("gate");
        let result = handle.terminate_and_wait(Duration::from_secs(1)).await;

        assert!(matches!(result, Err(RecorderError::Termination { .. })));
        assert_eq!(handle.state(), HandleState::Terminated);
    }

    #[tokio::test]
    async fn test_each_start_is_a_new_instance() {
        let launcher = ScriptedLauncher::new();
        let first = CaptureHandle::start(&launcher, &camera(), PathBuf::from("a.ts"), started_at())
            .await
            .unwrap();
        let second = CaptureHandle::start(&launcher, &camera(), PathBuf::from("b.ts"), started_at())
            .await
            .unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ffmpeg_process_reaps_real_child() {
        // `sh` stands in for ffmpeg and exits once stdin closes.
        let process = TokioCommand::new("sh")
            .arg("-c")
            .arg("read line; exit 0")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let mut child = match process {
            Ok(child) => child,
            Err(_) => return,
        };
        let stdin = child.stdin.take();
        let mut process = FfmpegProcess { child, stdin };

        assert_eq!(process.try_exit().unwrap(), None);
        process.terminate_and_wait(Duration::from_secs(5)).await.unwrap();
        assert!(process.try_exit().unwrap().is_some());
    }
}
