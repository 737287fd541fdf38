use crate::shaders::{DEFAULT_FRAGMENT_SHADER, DEFAULT_VERTEX_SHADER};

/// GPU adapter preference; a background should not wake the discrete GPU
/// unless asked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

impl std::fmt::Display for GpuPowerPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GpuPowerPreference::Low => f.write_str("low"),
            GpuPowerPreference::High => f.write_str("high"),
        }
    }
}

/// GLSL sources for the two program stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
}

impl Default for ShaderSources {
    /// The embedded pass-through vertex stage and gradient fragment stage.
    fn default() -> Self {
        Self {
            vertex: DEFAULT_VERTEX_SHADER.to_owned(),
            fragment: DEFAULT_FRAGMENT_SHADER.to_owned(),
        }
    }
}

/// Immutable configuration passed to the renderer at start-up.
///
/// Mirrors the CLI flags: which sources to build, how large the window
/// opens, and which adapter to ask for.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Initial window size in logical pixels.
    pub window_size: (u32, u32),
    pub title: String,
    pub sources: ShaderSources,
    pub power: GpuPowerPreference,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window_size: (1280, 720),
            title: "backdrop".to_owned(),
            sources: ShaderSources::default(),
            power: GpuPowerPreference::default(),
        }
    }
}
