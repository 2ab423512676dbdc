use std::fs::OpenOptions;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use common::RecorderError;
use crate::capture::{CaptureLauncher, FfmpegLauncher};
use crate::clock::{Clock, SystemClock};
use crate::config::{validate_config, AppConfig, ConfigManager, EnvConfigOverride, LoggingConfig};
use crate::day_cycle::DayCycleController;
use crate::namer::OutputNamer;
use crate::retention::RetentionSweeper;

pub const DEFAULT_CONFIG_PATH: &str = "params.json";

/// Application builder for dependency injection and initialization
pub struct AppBuilder {
    config_path: Option<PathBuf>,
    custom_config: Option<AppConfig>,
    custom_launcher: Option<Arc<dyn CaptureLauncher>>,
    custom_clock: Option<Arc<dyn Clock>>,
    enable_env_overrides: bool,
    enable_logging: bool,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppBuilder {
    /// Create a new application builder
    pub fn new() -> Self {
        Self {
            config_path: None,
            custom_config: None,
            custom_launcher: None,
            custom_clock: None,
            enable_env_overrides: true,
            enable_logging: true,
        }
    }

    /// Set configuration file path
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Set custom configuration
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.custom_config = Some(config);
        self
    }

    /// Replace the ffmpeg launcher
    pub fn with_launcher(mut self, launcher: Arc<dyn CaptureLauncher>) -> Self {
        self.custom_launcher = Some(launcher);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.custom_clock = Some(clock);
        self
    }

    /// Enable or disable environment variable overrides
    pub fn with_env_overrides(mut self, enable: bool) -> Self {
        self.enable_env_overrides = enable;
        self
    }

    /// Install the global tracing subscriber during `build`
    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }

    /// Build the application.
    ///
    /// Nothing is launched here; a configuration error leaves no trace on disk
    /// besides the log file.
    pub async fn build(self) -> Result<RecorderApp, RecorderError> {
        let config = self.load_configuration().await?;

        if self.enable_logging {
            init_logging(&config.logging)?;
        }
        info!("Initializing camera recorder");
        debug!("Configuration loaded successfully");

        tokio::fs::create_dir_all(&config.output_root)
            .await
            .map_err(|e| {
                RecorderError::Startup(format!(
                    "Cannot create output root {:?}: {}",
                    config.output_root, e
                ))
            })?;

        let controller = self.create_controller(&config);
        info!("Application initialized successfully");

        Ok(RecorderApp {
            config,
            controller: Arc::new(controller),
        })
    }

    async fn load_configuration(&self) -> Result<AppConfig, RecorderError> {
        let mut config = if let Some(custom_config) = &self.custom_config {
            custom_config.clone()
        } else {
            let config_path = self
                .config_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

            let mut config_manager = ConfigManager::new(config_path);
            config_manager.load().await?;
            config_manager.get_config().clone()
        };

        if self.enable_env_overrides {
            EnvConfigOverride::apply_overrides(&mut config);
        }

        // Overrides and injected configs go through the same checks as files.
        validate_config(&config)?;
        Ok(config)
    }

    fn create_controller(&self, config: &AppConfig) -> DayCycleController {
        let launcher = self
            .custom_launcher
            .clone()
            .unwrap_or_else(|| Arc::new(FfmpegLauncher::new(config.capture.clone())));

        let clock = self
            .custom_clock
            .clone()
            .unwrap_or_else(|| Arc::new(SystemClock));

        DayCycleController::new(
            config.cameras.clone(),
            launcher,
            clock,
            OutputNamer::new(&config.output_root, &config.capture.extension),
            RetentionSweeper::new(&config.output_root, config.video_keep_day),
            config.supervisor.clone(),
            CancellationToken::new(),
        )
    }
}

/// Install console and file logging.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(config: &LoggingConfig) -> Result<(), RecorderError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = config
        .console
        .then(|| tracing_subscriber::fmt::layer().with_target(false));

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| RecorderError::filesystem(path, e))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| RecorderError::Startup(format!("Failed to initialize logging: {}", e)))
}

/// Main application structure
pub struct RecorderApp {
    config: AppConfig,
    controller: Arc<DayCycleController>,
}

impl RecorderApp {
    /// Create an application from a configuration file
    pub async fn with_config_file(config_path: PathBuf) -> Result<Self, RecorderError> {
        AppBuilder::new()
            .with_config_path(config_path)
            .build()
            .await
    }

    /// Get reference to the configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Token that stops recording when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.controller.cancel_token()
    }

    /// Record until Ctrl+C.
    ///
    /// The first Ctrl+C stops every capture process before this returns `Ok`.
    /// A second one abandons that graceful stop and lets `kill_on_drop` reap
    /// the children.
    pub async fn run(&self) -> Result<(), RecorderError> {
        self.run_until_signal(tokio::signal::ctrl_c).await
    }

    async fn run_until_signal<S, F>(&self, mut signal: S) -> Result<(), RecorderError>
    where
        S: FnMut() -> F + Send + 'static,
        F: Future<Output = io::Result<()>> + Send + 'static,
    {
        info!(
            "Starting recording of {} cameras into {:?}, keeping {} days",
            self.config.cameras.len(),
            self.config.output_root,
            self.config.video_keep_day
        );

        let controller = Arc::clone(&self.controller);
        let recording = tokio::spawn(async move { controller.run().await });
        let abort = recording.abort_handle();

        let cancel = self.shutdown_token();
        let signal_task = tokio::spawn(async move {
            if let Err(e) = signal().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Shutdown signal received, stopping recording");
            cancel.cancel();

            if signal().await.is_ok() {
                warn!("Second shutdown signal received, killing capture processes");
                abort.abort();
            }
        });

        let outcome = recording.await;
        signal_task.abort();

        match outcome {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => warn!("Graceful stop abandoned"),
            Err(e) => return Err(RecorderError::Supervision(e.to_string())),
        }
        info!("Application shutdown complete");
        Ok(())
    }
}
