use serde::{Deserialize, Serialize};

/// 摄像头描述
///
/// Loaded once at startup and read-only afterwards. `camera_name` and
/// `rtsp_url` are each unique across the configured set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraDescriptor {
    pub rtsp_url: String,
    pub camera_name: String,
}

impl CameraDescriptor {
    pub fn new(camera_name: impl Into<String>, rtsp_url: impl Into<String>) -> Self {
        Self {
            rtsp_url: rtsp_url.into(),
            camera_name: camera_name.into(),
        }
    }
}

/// Lifecycle of one capture process handle.
///
/// `Dead` and `Terminated` are absorbing; a restart always builds a new handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandleState {
    Starting,
    Running,
    /// Exit observed outside of an explicit terminate call
    Dead,
    Terminated,
}

impl HandleState {
    pub fn is_final(&self) -> bool {
        matches!(self, HandleState::Dead | HandleState::Terminated)
    }
}

/// How a supervision session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The calendar date moved on; the controller should open a new session.
    DayEnded,
    /// Operator interrupt.
    Shutdown,
}
