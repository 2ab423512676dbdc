use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;

use common::CameraDescriptor;
use crate::capture::{CaptureLauncher, CaptureProcess, ExitReport};

/// Fake capture engine whose processes live until a test says otherwise.
#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    inner: Arc<Mutex<LauncherState>>,
}

#[derive(Default)]
struct LauncherState {
    scripts: HashMap<String, CameraScript>,
    launches: Vec<LaunchRecord>,
}

#[derive(Default)]
struct CameraScript {
    spawn_failures: usize,
    always_fail: bool,
    exit_immediately: bool,
}

struct LaunchRecord {
    camera_name: String,
    output_path: PathBuf,
    process: Arc<Mutex<ProcessState>>,
}

#[derive(Debug, Default)]
struct ProcessState {
    alive: bool,
    probe_broken: bool,
    terminated: bool,
    fail_termination: bool,
    hang_termination: bool,
}

struct ScriptedProcess {
    pid: u32,
    state: Arc<Mutex<ProcessState>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` launches for `camera` fail to spawn.
    pub fn fail_spawn(&self, camera: &str, times: usize) {
        self.script(camera, |s| s.spawn_failures += times);
    }

    pub fn fail_spawn_always(&self, camera: &str) {
        self.script(camera, |s| s.always_fail = true);
    }

    pub fn heal(&self, camera: &str) {
        self.script(camera, |s| *s = CameraScript::default());
    }

    /// The next launch spawns a process that has already failed.
    pub fn exit_immediately(&self, camera: &str) {
        self.script(camera, |s| s.exit_immediately = true);
    }

    /// Makes the latest process of `camera` exit.
    pub fn kill(&self, camera: &str) {
        self.with_latest(camera, |p| p.alive = false);
    }

    pub fn break_probe(&self, camera: &str) {
        self.with_latest(camera, |p| p.probe_broken = true);
    }

    pub fn fail_termination(&self, camera: &str) {
        self.with_latest(camera, |p| p.fail_termination = true);
    }

    /// Stop requests for the latest process of `camera` never complete.
    pub fn hang_termination(&self, camera: &str) {
        self.with_latest(camera, |p| p.hang_termination = true);
    }

    pub fn launch_count(&self, camera: &str) -> usize {
        self.records(camera, |_| true)
    }

    pub fn terminated_count(&self, camera: &str) -> usize {
        self.records(camera, |p| p.terminated)
    }

    /// Processes of `camera` that are running right now.
    pub fn live_count(&self, camera: &str) -> usize {
        self.records(camera, |p| p.alive && !p.terminated)
    }

    pub fn total_live(&self) -> usize {
        let state = self.inner.lock().unwrap();
        state
            .launches
            .iter()
            .filter(|r| {
                let p = r.process.lock().unwrap();
                p.alive && !p.terminated
            })
            .count()
    }

    pub fn output_paths(&self, camera: &str) -> Vec<PathBuf> {
        let state = self.inner.lock().unwrap();
        state
            .launches
            .iter()
            .filter(|r| r.camera_name == camera)
            .map(|r| r.output_path.clone())
            .collect()
    }

    fn script(&self, camera: &str, f: impl FnOnce(&mut CameraScript)) {
        let mut state = self.inner.lock().unwrap();
        f(state.scripts.entry(camera.to_string()).or_default());
    }

    fn with_latest(&self, camera: &str, f: impl FnOnce(&mut ProcessState)) {
        let state = self.inner.lock().unwrap();
        if let Some(record) = state.launches.iter().rev().find(|r| r.camera_name == camera) {
            f(&mut record.process.lock().unwrap());
        }
    }

    fn records(&self, camera: &str, f: impl Fn(&ProcessState) -> bool) -> usize {
        let state = self.inner.lock().unwrap();
        state
            .launches
            .iter()
            .filter(|r| r.camera_name == camera && f(&r.process.lock().unwrap()))
            .count()
    }
}

#[async_trait]
impl CaptureLauncher for ScriptedLauncher {
    async fn launch(
        &self,
        camera: &CameraDescriptor,
        output_path: &Path,
    ) -> io::Result<Box<dyn CaptureProcess>> {
        let mut state = self.inner.lock().unwrap();
        let script = state.scripts.entry(camera.camera_name.clone()).or_default();

        if script.always_fail {
            return Err(io::Error::new(io::ErrorKind::NotFound, "capture engine not found"));
        }
        if script.spawn_failures > 0 {
            script.spawn_failures -= 1;
            return Err(io::Error::new(io::ErrorKind::NotFound, "capture engine not found"));
        }
        let alive = !std::mem::take(&mut script.exit_immediately);

        let process = Arc::new(Mutex::new(ProcessState {
            alive,
            ..ProcessState::default()
        }));
        state.launches.push(LaunchRecord {
            camera_name: camera.camera_name.clone(),
            output_path: output_path.to_path_buf(),
            process: process.clone(),
        });

        Ok(Box::new(ScriptedProcess {
            pid: 1000 + state.launches.len() as u32,
            state: process,
        }))
    }
}

#[async_trait]
impl CaptureProcess for ScriptedProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn try_exit(&mut self) -> io::Result<Option<ExitReport>> {
        let state = self.state.lock().unwrap();
        if state.probe_broken {
            return Err(io::Error::new(io::ErrorKind::Other, "stale process reference"));
        }
        if state.alive {
            Ok(None)
        } else {
            Ok(Some(ExitReport {
                code: Some(1),
                success: false,
            }))
        }
    }

    async fn terminate_and_wait(&mut self, _timeout: Duration) -> io::Result<()> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            if state.fail_termination {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "process did not stop"));
            }
            if !state.hang_termination {
                state.alive = false;
                state.terminated = true;
            }
            state.hang_termination
        };

        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

// Mirrors `kill_on_drop` on real children.
impl Drop for ScriptedProcess {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.alive = false;
        }
    }
}
