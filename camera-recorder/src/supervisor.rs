use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::NaiveDate;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common::{CameraDescriptor, SessionOutcome};
use crate::capture::{CaptureHandle, CaptureLauncher};
use crate::clock::Clock;
use crate::config::SupervisorConfig;
use crate::namer::OutputNamer;

/// Where a camera stands within the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    /// No recording; the next pass tries to start one.
    Idle,
    /// A start attempt is in flight.
    Starting,
    /// A live handle sits in the table.
    Running,
    /// The recording died; no restart before `until`.
    CoolingDown { until: Instant },
}

/// Everything that belongs to one calendar day of supervision.
///
/// Created empty for each day and dropped when the day ends.
#[derive(Debug)]
pub struct SupervisionSession {
    date: NaiveDate,
    table: HashMap<String, CaptureHandle>,
    states: HashMap<String, CameraState>,
}

impl SupervisionSession {
    pub fn new(date: NaiveDate, cameras: &[CameraDescriptor]) -> Self {
        Self {
            date,
            table: HashMap::with_capacity(cameras.len()),
            states: cameras
                .iter()
                .map(|c| (c.camera_name.clone(), CameraState::Idle))
                .collect(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Number of tracked recordings.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn handle(&self, camera_name: &str) -> Option<&CaptureHandle> {
        self.table.get(camera_name)
    }

    pub fn handles(&self) -> impl Iterator<Item = &CaptureHandle> {
        self.table.values()
    }

    pub fn state(&self, camera_name: &str) -> Option<CameraState> {
        self.states.get(camera_name).copied()
    }

    fn set_state(&mut self, camera_name: &str, state: CameraState) {
        self.states.insert(camera_name.to_string(), state);
    }
}

/// Keeps one recording per camera alive for a single calendar day.
pub struct StreamSupervisor {
    cameras: Arc<[CameraDescriptor]>,
    launcher: Arc<dyn CaptureLauncher>,
    namer: OutputNamer,
    clock: Arc<dyn Clock>,
    settings: SupervisorConfig,
    cancel: CancellationToken,
    session: SupervisionSession,
}

impl StreamSupervisor {
    /// The session date is taken from `clock` at construction.
    pub fn new(
        cameras: Arc<[CameraDescriptor]>,
        launcher: Arc<dyn CaptureLauncher>,
        namer: OutputNamer,
        clock: Arc<dyn Clock>,
        settings: SupervisorConfig,
        cancel: CancellationToken,
    ) -> Self {
        let session = SupervisionSession::new(clock.today(), &cameras);
        Self {
            cameras,
            launcher,
            namer,
            clock,
            settings,
            cancel,
            session,
        }
    }

    pub fn session(&self) -> &SupervisionSession {
        &self.session
    }

    /// Supervise until the date changes or the cancel token fires.
    ///
    /// Either way every tracked recording is stopped before returning.
    pub async fn run(&mut self) -> SessionOutcome {
        info!(
            "Supervising {} cameras for {}",
            self.cameras.len(),
            self.session.date
        );

        loop {
            if !self.run_pass().await {
                break;
            }

            if self.day_changed() {
                info!("It's a new day! Restarting recording...");
                self.stop_all().await;
                return SessionOutcome::DayEnded;
            }

            if !pause(&self.cancel, self.settings.poll_interval).await {
                break;
            }
        }

        info!("Recording stopped by user");
        self.stop_all().await;
        SessionOutcome::Shutdown
    }

    /// One sequential pass over all cameras. Returns `false` if cancelled.
    pub async fn run_pass(&mut self) -> bool {
        let cameras = Arc::clone(&self.cameras);

        for camera in cameras.iter() {
            if self.cancel.is_cancelled() {
                return false;
            }

            let state = self
                .session
                .state(&camera.camera_name)
                .unwrap_or(CameraState::Idle);

            match state {
                CameraState::Running => self.check_liveness(camera).await,
                CameraState::Idle | CameraState::Starting => {
                    self.try_start(camera).await;
                    if !pause(&self.cancel, self.settings.settle_delay).await {
                        return false;
                    }
                }
                CameraState::CoolingDown { until } => {
                    if Instant::now() < until {
                        continue;
                    }
                    info!("Restarting recording for {}", camera.camera_name);
                    self.try_start(camera).await;
                    if !pause(&self.cancel, self.settings.settle_delay).await {
                        return false;
                    }
                }
            }
        }

        debug!(
            "Pass complete: {}/{} cameras recording",
            self.session.len(),
            self.cameras.len()
        );
        true
    }

    /// Stop and forget every tracked recording.
    pub async fn stop_all(&mut self) {
        let handles: Vec<(String, CaptureHandle)> = self.session.table.drain().collect();

        for (camera_name, mut handle) in handles {
            match handle.terminate_and_wait(self.settings.terminate_timeout).await {
                Ok(()) => info!("Stopped recording for {} ({:?})", camera_name, handle.output_path()),
                Err(e) => error!("Error terminating process for {}: {}", camera_name, e),
            }
        }

        for state in self.session.states.values_mut() {
            *state = CameraState::Idle;
        }
    }

    fn day_changed(&self) -> bool {
        self.clock.today() != self.session.date
    }

    async fn try_start(&mut self, camera: &CameraDescriptor) {
        let name = camera.camera_name.as_str();
        if self.session.table.contains_key(name) {
            warn!("Recording for {} is already tracked, not starting another", name);
            self.session.set_state(name, CameraState::Running);
            return;
        }

        self.session.set_state(name, CameraState::Starting);
        let now = self.clock.now();

        let started = match self.namer.next_path(name, now).await {
            Ok(output_path) => {
                info!("Starting recording to {:?}", output_path);
                CaptureHandle::start(self.launcher.as_ref(), camera, output_path, now).await
            }
            Err(e) => Err(e),
        };

        match started {
            Ok(handle) => {
                debug!(
                    "Recording {} started: handle {} pid {:?}",
                    name,
                    handle.id(),
                    handle.pid()
                );
                self.session.table.insert(name.to_string(), handle);
                self.session.set_state(name, CameraState::Running);
            }
            Err(e) => {
                error!("Failed to start recording for {}: {}", name, e);
                self.session.set_state(name, CameraState::Idle);
            }
        }
    }

    async fn check_liveness(&mut self, camera: &CameraDescriptor) {
        let name = camera.camera_name.as_str();

        let alive = match self.session.table.get_mut(name) {
            Some(handle) => handle.is_alive(),
            None => {
                self.session.set_state(name, CameraState::Idle);
                return;
            }
        };
        if alive {
            return;
        }

        if let Some(mut handle) = self.session.table.remove(name) {
            error!(
                "FFmpeg process for {} terminated unexpectedly (exit {:?}). Restarting in {:?}...",
                name,
                handle.last_exit().and_then(|r| r.code),
                self.settings.restart_cooldown
            );
            if let Err(e) = handle.terminate_and_wait(self.settings.terminate_timeout).await {
                error!("Error terminating process for {}: {}", name, e);
            }
        }

        let until = Instant::now() + self.settings.restart_cooldown;
        self.session.set_state(name, CameraState::CoolingDown { until });
    }
}

/// Sleeps for `duration`; `false` if cancelled first.
pub(crate) async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
