//! Viewer configuration from command-line flags and environment.

use clap::Parser;
use sketchsync_core::identity::Identity;
use sketchsync_core::stroke::ProjectId;
use sketchsync_core::theme::Theme;
use sketchsync_core::tools::ToolSettings;
use sketchsync_core::viewport::{DEFAULT_SURFACE_HEIGHT, ViewportConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "sketchsync-viewer", about = "Render a SketchSync project to a PNG as it changes")]
pub struct AppConfig {
    /// Log service WebSocket URL
    #[arg(long, env = "SKETCHSYNC_SERVER", default_value = "ws://127.0.0.1:3030/ws")]
    pub server: String,

    /// Project to follow
    #[arg(long, env = "SKETCHSYNC_PROJECT")]
    pub project: String,

    /// PNG file rewritten on every change
    #[arg(long, env = "SKETCHSYNC_OUTPUT", default_value = "sketchsync.png")]
    pub output: PathBuf,

    #[arg(long, env = "SKETCHSYNC_AUTHOR_ID")]
    pub author_id: Option<String>,

    #[arg(long, env = "SKETCHSYNC_AUTHOR_NAME", default_value = "Viewer")]
    pub author_name: String,

    /// Surface width in pixels
    #[arg(long, env = "SKETCHSYNC_WIDTH", default_value_t = 800)]
    pub width: u32,

    #[arg(long, env = "SKETCHSYNC_HEIGHT", default_value_t = DEFAULT_SURFACE_HEIGHT)]
    pub height: u32,

    /// `light` or `dark`
    #[arg(long, env = "SKETCHSYNC_THEME", default_value = "light", value_parser = parse_theme)]
    pub theme: Theme,

    #[arg(long, env = "SKETCHSYNC_POLL_MS", default_value_t = 50)]
    pub poll_ms: u64,

    /// Write the first snapshot and exit
    #[arg(long, default_value_t = false)]
    pub once: bool,
}

fn parse_theme(s: &str) -> Result<Theme, String> {
    match s.to_ascii_lowercase().as_str() {
        "light" => Ok(Theme::Light),
        "dark" => Ok(Theme::Dark),
        other => Err(format!("unknown theme '{}', expected light or dark", other)),
    }
}

impl AppConfig {
    pub fn project_id(&self) -> ProjectId {
        ProjectId::new(self.project.clone())
    }

    /// Identity for commits; the viewer is read-only without an author id.
    pub fn identity(&self) -> Option<Identity> {
        self.author_id
            .as_ref()
            .map(|id| Identity::new(id.clone(), self.author_name.clone()))
            .filter(Identity::is_usable)
    }

    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings::default()
    }

    pub fn viewport_config(&self) -> ViewportConfig {
        ViewportConfig {
            fixed_height: self.height,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::try_parse_from(["sketchsync-viewer", "--project", "alpha"]).unwrap();
        assert_eq!(config.project_id().as_str(), "alpha");
        assert_eq!(config.viewport_config(), ViewportConfig::default());
        assert_eq!(config.tool_settings(), ToolSettings::default());
        assert!(!config.once);
    }

    #[test]
    fn test_identity_requires_author_id() {
        let config = AppConfig::try_parse_from([
            "sketchsync-viewer",
            "--project",
            "alpha",
            "--author-id",
            "user-1",
            "--author-name",
            "Ada",
            "--theme",
            "dark",
        ])
        .unwrap();
        assert_eq!(config.identity(), Some(Identity::new("user-1", "Ada")));
        assert_eq!(config.theme, Theme::Dark);

        let blank = AppConfig::try_parse_from(["sketchsync-viewer", "--project", "a", "--author-id", " "]).unwrap();
        assert_eq!(blank.identity(), None);
    }

    #[test]
    fn test_rejects_unknown_theme() {
        assert!(AppConfig::try_parse_from(["sketchsync-viewer", "--project", "a", "--theme", "sepia"]).is_err());
    }
}
