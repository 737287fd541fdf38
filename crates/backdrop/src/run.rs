use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use renderer::{Renderer, RendererConfig, ShaderSources};
use tracing_subscriber::EnvFilter;

use crate::cli::{RunArgs, ShaderArgs};

pub fn run(args: RunArgs) -> Result<()> {
    let sources = load_sources(&args.shaders)?;
    tracing::info!(
        vertex = %describe_source(args.shaders.vertex.as_deref()),
        fragment = %describe_source(args.shaders.fragment.as_deref()),
        width = args.size.0,
        height = args.size.1,
        power = %args.power,
        "starting backdrop"
    );

    let config = RendererConfig {
        window_size: args.size,
        title: args.title,
        sources,
        power: args.power,
    };
    Renderer::new(config)
        .run()
        .context("renderer stopped with an error")
}

pub fn initialise_tracing() {
    let default_filter = "info,naga=error,wgpu=error,wgpu_core=error,wgpu_hal=error,winit=error";
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Reads the override files, falling back to the embedded stage for any
/// stage that was not given.
pub fn load_sources(args: &ShaderArgs) -> Result<ShaderSources> {
    let mut sources = ShaderSources::default();
    if let Some(path) = args.vertex.as_deref() {
        sources.vertex = read_shader(path, "vertex")?;
    }
    if let Some(path) = args.fragment.as_deref() {
        sources.fragment = read_shader(path, "fragment")?;
    }
    Ok(sources)
}

fn read_shader(path: &Path, stage: &str) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read {stage} shader at {}", path.display()))
}

fn describe_source(path: Option<&Path>) -> String {
    path.map(|path| path.display().to_string())
        .unwrap_or_else(|| "embedded".to_string())
}
