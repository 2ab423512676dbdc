pub mod config;
pub mod serde_helpers;
pub mod clock;
pub mod namer;
pub mod retention;
pub mod capture;
#[cfg(test)]
mod mock_capture;
pub mod supervisor;
pub mod day_cycle;
pub mod app;

pub use app::{AppBuilder, RecorderApp};
pub use config::AppConfig;
pub use day_cycle::DayCycleController;
pub use supervisor::{CameraState, StreamSupervisor, SupervisionSession};
