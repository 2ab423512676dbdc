use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Failed to launch capture for {camera}: {reason}")]
    Spawn { camera: String, reason: String },

    #[error("Liveness check failed for {camera}: {reason}")]
    LivenessCheck { camera: String, reason: String },

    #[error("Failed to terminate capture for {camera}: {reason}")]
    Termination { camera: String, reason: String },

    #[error("Filesystem error at {path:?}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Startup failed: {0}")]
    Startup(String),

    #[error("Supervision loop failed: {0}")]
    Supervision(String),
}

impl RecorderError {
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        RecorderError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Element at index {index} has an empty '{field}'")]
    EmptyField { index: usize, field: &'static str },

    #[error("'camera_name' at index {index} is duplicated: {name}")]
    DuplicateCameraName { index: usize, name: String },

    #[error("'rtsp_url' at index {index} is duplicated: {url}")]
    DuplicateRtspUrl { index: usize, url: String },

    #[error("'camera_name' at index {index} cannot be used as a file name: {name}")]
    InvalidCameraName { index: usize, name: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, RecorderError>;
