//! CLI subcommands.

pub mod apply;
pub mod config;
pub mod preview;
pub mod rules;

use std::path::Path;

use marca_core::MarcaConfig;

/// Output format for single results.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text summary
    Text,
}

/// Relative rectangle given as `x,y,width,height`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RectArg {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Parse `x,y,width,height` with every value in [0, 1].
pub fn parse_rect(value: &str) -> Result<RectArg, String> {
    let parts: Vec<f32> = value
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid number in {value:?}: {e}"))?;

    let [x, y, width, height] = parts[..] else {
        return Err(format!("expected x,y,width,height, got {value:?}"));
    };
    if parts.iter().any(|v| !(0.0..=1.0).contains(v)) {
        return Err("rectangle values are relative and must lie in [0, 1]".to_string());
    }

    Ok(RectArg { x, y, width, height })
}

/// Parse a canvas size given as `WIDTHxHEIGHT`.
pub fn parse_size(value: &str) -> Result<(f32, f32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value:?}"))?;
    let width: f32 = width.trim().parse().map_err(|e| format!("invalid width: {e}"))?;
    let height: f32 = height.trim().parse().map_err(|e| format!("invalid height: {e}"))?;
    if width <= 0.0 || height <= 0.0 {
        return Err("canvas size must be positive".to_string());
    }
    Ok((width, height))
}

/// Load configuration from an explicit path, the user config file, or defaults.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<MarcaConfig> {
    if let Some(path) = config_path {
        return Ok(MarcaConfig::from_file(Path::new(path))?);
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        Ok(MarcaConfig::from_file(&default_path)?)
    } else {
        Ok(MarcaConfig::default())
    }
}
