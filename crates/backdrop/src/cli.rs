use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use renderer::GpuPowerPreference;

#[derive(Parser, Debug)]
#[command(
    name = "backdrop",
    author,
    version,
    about = "Animated full-screen GPU shader background",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Shader source overrides shared by the renderer and `check`.
#[derive(Args, Debug, Clone, Default)]
pub struct ShaderArgs {
    /// GLSL 450 vertex stage replacing the embedded one.
    #[arg(long, value_name = "FILE", env = "BACKDROP_VERTEX_SHADER")]
    pub vertex: Option<PathBuf>,

    /// GLSL 450 fragment stage replacing the embedded one.
    #[arg(long, value_name = "FILE", env = "BACKDROP_FRAGMENT_SHADER")]
    pub fragment: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub shaders: ShaderArgs,

    /// Initial window size in logical pixels (e.g. `1280x720`).
    #[arg(
        long,
        value_name = "WIDTHxHEIGHT",
        value_parser = parse_surface_size,
        default_value = "1280x720"
    )]
    pub size: (u32, u32),

    /// Window title.
    #[arg(long, value_name = "TEXT", default_value = "backdrop")]
    pub title: String,

    /// GPU adapter preference: `low` (integrated) or `high` (discrete).
    #[arg(
        long,
        value_name = "low|high",
        value_parser = parse_gpu_power,
        default_value = "low"
    )]
    pub power: GpuPowerPreference,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile and link the shader pair offline and print its interface.
    Check(CheckArgs),
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub shaders: ShaderArgs,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32), String> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 1280x720".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in size specification '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in size specification '{trimmed}'"))?;

    if width == 0 || height == 0 {
        return Err("size must be greater than zero in both dimensions".to_string());
    }
    Ok((width, height))
}

pub fn parse_gpu_power(value: &str) -> Result<GpuPowerPreference, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("GPU power preference must not be empty".to_string());
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "low" | "low-power" | "integrated" => Ok(GpuPowerPreference::Low),
        "high" | "high-performance" | "discrete" => Ok(GpuPowerPreference::High),
        _ => Err(format!(
            "unknown GPU power preference '{trimmed}' (expected low or high)"
        )),
    }
}
