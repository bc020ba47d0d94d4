//! Headless viewer: follows a project and keeps a PNG of it up to date.

use clap::Parser;
use kurbo::Size;
use sketchsync_app::{AppConfig, DrawingSurface, SurfaceResult};
use sketchsync_core::board::Whiteboard;
use sketchsync_core::shared_log::{ConnectionState, LogError, RemoteLog, SharedLog};
use sketchsync_core::sync::SyncClient;
use std::sync::Arc;

fn main() {
    env_logger::init();
    let config = AppConfig::parse();
    log::info!("Starting SketchSync viewer for project {}", config.project);

    if let Err(e) = run(&config) {
        log::error!("Viewer stopped: {}", e);
        std::process::exit(1);
    }
}

fn run(config: &AppConfig) -> SurfaceResult<()> {
    let remote = Arc::new(RemoteLog::connect(&config.server)?);
    let log: Arc<dyn SharedLog> = remote.clone();
    let sync = SyncClient::new(log, config.identity());
    let board = Whiteboard::new(sync, config.tool_settings(), config.theme);

    let mut surface = DrawingSurface::new(board, config.viewport_config());
    surface.attach(Size::new(f64::from(config.width), f64::from(config.height)))?;
    surface.set_project(Some(config.project_id()))?;

    loop {
        if surface.poll_updates()? {
            surface.write_png(&config.output)?;
            if config.once {
                return Ok(());
            }
        }
        match remote.state() {
            ConnectionState::Disconnected | ConnectionState::Error => {
                return Err(LogError::Unavailable(format!("lost connection to {}", config.server)).into());
            }
            ConnectionState::Connecting | ConnectionState::Connected => {}
        }
        std::thread::sleep(config.poll_interval());
    }
}
