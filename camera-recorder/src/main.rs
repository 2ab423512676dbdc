use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use tracing::error;

use camera_recorder::app::{AppBuilder, DEFAULT_CONFIG_PATH};
use camera_recorder::config::{AppConfig, ConfigManager, EnvConfigOverride};

#[tokio::main]
async fn main() -> ExitCode {
    // 解析命令行参数
    let matches = Command::new("Camera Recorder")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Records RTSP cameras into daily folders and prunes old days")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (JSON, or TOML by extension)")
                .default_value(DEFAULT_CONFIG_PATH)
        )
        .arg(
            Arg::new("check")
                .long("check")
                .help("Validate the configuration, print a summary and exit")
                .action(ArgAction::SetTrue)
        )
        .arg(
            Arg::new("no-pause")
                .long("no-pause")
                .help("Exit right away after a fatal error instead of waiting for Enter")
                .action(ArgAction::SetTrue)
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let no_pause = matches.get_flag("no-pause");

    if matches.get_flag("check") {
        return match check_config(&config_path).await {
            Ok(config) => {
                print_config_summary(&config);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        };
    }

    let app = match AppBuilder::new().with_config_path(config_path).build().await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = app.run().await {
        error!("An error occurred: {}", e);
        if !no_pause {
            wait_for_enter();
        }
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn check_config(path: &Path) -> anyhow::Result<AppConfig> {
    let mut manager = ConfigManager::new(path.to_path_buf());
    manager
        .load()
        .await
        .with_context(|| format!("loading {:?}", path))?;

    let mut config = manager.get_config().clone();
    EnvConfigOverride::apply_overrides(&mut config);
    manager
        .update_config(config)
        .context("applying environment overrides")?;
    Ok(manager.get_config().clone())
}

fn print_config_summary(config: &AppConfig) {
    println!("--- Configuration Summary ---");
    println!("Cameras: {}", config.cameras.len());
    for camera in &config.cameras {
        println!("  {} <- {}", camera.camera_name, camera.rtsp_url);
    }
    println!("Output Root: {:?}", config.output_root);
    println!("Keep Days: {}", config.video_keep_day);
    println!("FFmpeg: {}", config.capture.ffmpeg_path);
    println!("Poll Interval: {:?}", config.supervisor.poll_interval);
    println!("Restart Cooldown: {:?}", config.supervisor.restart_cooldown);
    println!("Log Level: {}", config.logging.level);
}

fn wait_for_enter() {
    eprintln!("Press Enter to exit...");
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
}
