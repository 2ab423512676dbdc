use std::sync::Arc;
use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use common::{CameraDescriptor, SessionOutcome};
use crate::capture::CaptureLauncher;
use crate::clock::Clock;
use crate::config::SupervisorConfig;
use crate::namer::OutputNamer;
use crate::retention::RetentionSweeper;
use crate::supervisor::{pause, StreamSupervisor};

/// Outer loop: one retention sweep and one fresh supervisor per calendar day.
pub struct DayCycleController {
    cameras: Arc<[CameraDescriptor]>,
    launcher: Arc<dyn CaptureLauncher>,
    clock: Arc<dyn Clock>,
    namer: OutputNamer,
    sweeper: RetentionSweeper,
    settings: SupervisorConfig,
    cancel: CancellationToken,
}

impl DayCycleController {
    pub fn new(
        cameras: Vec<CameraDescriptor>,
        launcher: Arc<dyn CaptureLauncher>,
        clock: Arc<dyn Clock>,
        namer: OutputNamer,
        sweeper: RetentionSweeper,
        settings: SupervisorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cameras: cameras.into(),
            launcher,
            clock,
            namer,
            sweeper,
            settings,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs until the cancel token fires.
    pub async fn run(&self) {
        let mut last_record_date: Option<NaiveDate> = None;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let today = self.clock.today();
            if last_record_date == Some(today) {
                // Only reachable if the clock went backwards within a day.
                if !pause(&self.cancel, self.settings.poll_interval).await {
                    break;
                }
                continue;
            }
            last_record_date = Some(today);

            if self.run_day(today).await == SessionOutcome::Shutdown {
                break;
            }
        }

        info!("Day cycle stopped");
    }

    /// Sweep expired folders, then supervise until the day ends.
    pub async fn run_day(&self, today: NaiveDate) -> SessionOutcome {
        match self.sweeper.sweep(today).await {
            Ok(report) => info!(
                "Retention sweep for {}: {} removed, {} failed",
                today,
                report.removed.len(),
                report.failed.len()
            ),
            Err(e) => error!("Retention sweep failed: {}", e),
        }

        let mut supervisor = StreamSupervisor::new(
            Arc::clone(&self.cameras),
            Arc::clone(&self.launcher),
            self.namer.clone(),
            Arc::clone(&self.clock),
            self.settings.clone(),
            self.cancel.clone(),
        );
        supervisor.run().await
    }
}
