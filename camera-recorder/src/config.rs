use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use common::{CameraDescriptor, ConfigError};

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Cameras to record
    #[serde(default)]
    pub cameras: Vec<CameraDescriptor>,

    /// Number of daily folders to keep
    #[serde(default = "default_keep_day")]
    pub video_keep_day: u32,

    /// Directory holding the `YYYYMMDD` folders
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Supervision loop timing
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Capture engine invocation
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Delay between two supervision passes
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub poll_interval: Duration,

    /// Pause after every start attempt before looking at the next camera
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub settle_delay: Duration,

    /// Minimum wait between detecting a dead recording and restarting it
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub restart_cooldown: Duration,

    /// How long a graceful stop may take before the process is killed
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub terminate_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Path or name of the ffmpeg binary
    pub ffmpeg_path: String,

    /// RTSP transport, `tcp` keeps the input connection-oriented
    pub rtsp_transport: String,

    /// Receive buffer size hint in bytes
    pub buffer_size: u64,

    /// Output container
    pub format: String,

    /// Keyframe interval hint in frames
    pub keyframe_interval: u32,

    /// ffmpeg's own log level
    pub loglevel: String,

    /// Segment file extension
    pub extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Append-only log file, `None` disables file logging
    pub log_file: Option<PathBuf>,

    /// Enable console logging
    pub console: bool,
}

fn default_keep_day() -> u32 {
    7
}

fn default_output_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cameras: Vec::new(),
            video_keep_day: default_keep_day(),
            output_root: default_output_root(),
            supervisor: SupervisorConfig::default(),
            capture: CaptureConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            settle_delay: Duration::from_secs(3),
            restart_cooldown: Duration::from_secs(60),
            terminate_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            rtsp_transport: "tcp".to_string(),
            buffer_size: 1_000_000,
            format: "mpegts".to_string(),
            keyframe_interval: 10,
            loglevel: "quiet".to_string(),
            extension: "ts".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "debug".to_string(),
            log_file: Some(PathBuf::from("recording.log")),
            console: true,
        }
    }
}

/// Configuration manager for loading and validating configurations
pub struct ConfigManager {
    config_path: PathBuf,
    config: AppConfig,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            config: AppConfig::default(),
        }
    }

    /// Load and validate configuration from file.
    ///
    /// A missing or malformed file is an error; there is no fallback to
    /// defaults because a recorder without cameras is never what was meant.
    pub async fn load(&mut self) -> Result<(), ConfigError> {
        let content = tokio::fs::read_to_string(&self.config_path).await
            .map_err(|source| ConfigError::Read {
                path: self.config_path.clone(),
                source,
            })?;

        self.config = parse_config(&self.config_path, &content)?;
        self.validate()?;
        Ok(())
    }

    /// Get the current configuration
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// Replace the configuration, rejecting it if invalid
    pub fn update_config(&mut self, config: AppConfig) -> Result<(), ConfigError> {
        validate_config(&config)?;
        self.config = config;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_config(&self.config)
    }
}

/// Parses `content`, choosing TOML for `.toml` files and JSON otherwise.
pub fn parse_config(path: &Path, content: &str) -> Result<AppConfig, ConfigError> {
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    let parsed = if is_toml {
        toml::from_str(content).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(content).map_err(|e| e.to_string())
    };

    parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Structural and uniqueness checks run before any recording starts.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    let mut urls = HashSet::new();

    for (index, camera) in config.cameras.iter().enumerate() {
        if camera.camera_name.trim().is_empty() {
            return Err(ConfigError::EmptyField { index, field: "camera_name" });
        }
        if camera.rtsp_url.trim().is_empty() {
            return Err(ConfigError::EmptyField { index, field: "rtsp_url" });
        }
        if !is_valid_file_stem(&camera.camera_name) {
            return Err(ConfigError::InvalidCameraName {
                index,
                name: camera.camera_name.clone(),
            });
        }
        if !names.insert(camera.camera_name.as_str()) {
            return Err(ConfigError::DuplicateCameraName {
                index,
                name: camera.camera_name.clone(),
            });
        }
        if !urls.insert(camera.rtsp_url.as_str()) {
            return Err(ConfigError::DuplicateRtspUrl {
                index,
                url: camera.rtsp_url.clone(),
            });
        }
    }

    if config.video_keep_day == 0 {
        return Err(ConfigError::InvalidValue {
            field: "video_keep_day",
            reason: "must keep at least one day".to_string(),
        });
    }

    if config.supervisor.poll_interval.is_zero() {
        return Err(ConfigError::InvalidValue {
            field: "supervisor.poll_interval",
            reason: "must be greater than 0".to_string(),
        });
    }

    if config.supervisor.terminate_timeout.is_zero() {
        return Err(ConfigError::InvalidValue {
            field: "supervisor.terminate_timeout",
            reason: "must be greater than 0".to_string(),
        });
    }

    if config.capture.ffmpeg_path.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "capture.ffmpeg_path",
            reason: "cannot be empty".to_string(),
        });
    }

    if config.capture.extension.trim().is_empty() || config.capture.extension.contains(['/', '\\', '.']) {
        return Err(ConfigError::InvalidValue {
            field: "capture.extension",
            reason: format!("'{}' is not a usable file extension", config.capture.extension),
        });
    }

    Ok(())
}

fn is_valid_file_stem(name: &str) -> bool {
    name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// Environment-based configuration override
pub struct EnvConfigOverride;

impl EnvConfigOverride {
    /// Apply environment variable overrides to configuration
    pub fn apply_overrides(config: &mut AppConfig) {
        use std::env;

        if let Ok(root) = env::var("CAMERA_RECORDER_OUTPUT_ROOT") {
            config.output_root = PathBuf::from(root);
        }
        if let Ok(days) = env::var("CAMERA_RECORDER_KEEP_DAYS") {
            if let Ok(days) = days.parse::<u32>() {
                config.video_keep_day = days;
            }
        }
        if let Ok(path) = env::var("CAMERA_RECORDER_FFMPEG_PATH") {
            config.capture.ffmpeg_path = path;
        }
        if let Ok(level) = env::var("CAMERA_RECORDER_LOG_LEVEL") {
            config.logging.level = level;
        }
    }
}
