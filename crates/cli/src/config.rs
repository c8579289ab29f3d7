//! Configuration management for the CLI

use anyhow::{Context, Result};
use rollwatch_lib::Settings;
use std::path::Path;

/// Load settings from `override_path` or the default settings file
pub fn load_settings(override_path: Option<&Path>) -> Result<Settings> {
    let path = override_path.map(Path::to_path_buf).or_else(Settings::default_path);
    Settings::load(path.as_deref()).context("Failed to load settings")
}
