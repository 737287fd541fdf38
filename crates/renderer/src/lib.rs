//! Renderer crate for backdrop, an animated full-screen shader background.
//!
//! Three components run against GL-style collaborator traits:
//!
//! ```text
//!   RendererConfig
//!        │
//!        ▼
//!   build_program ──▶ FrameDriver::start ──▶ scheduler ──▶ render_frame()
//!                                               ▲               │
//!                                               └───────────────┤
//!                                                               ▼
//!                      SurfaceManager::reconcile_dimensions ◀── resize
//! ```
//!
//! [`build_program`] compiles and links the two GLSL stages through naga,
//! [`SurfaceManager`] keeps the backing store and viewport at the window's
//! device-pixel size, and [`FrameDriver`] uploads the full-screen quad once
//! and then draws it every frame with `u_resolution` and `u_time`. The
//! traits in [`backend`] are implemented by the wgpu backend in [`gpu`] and
//! driven by a winit event loop through [`Renderer::run`].

pub mod backend;
pub mod compile;
mod error;
pub mod frame;
pub mod gpu;
pub mod program;
pub mod runtime;
pub mod shaders;
pub mod surface;
#[cfg(test)]
mod testing;
mod types;
mod window;

pub use backend::{
    AttribLayout, DrawError, DrawMode, Drawable, GpuContext, ProgramBackend, ShaderStage, Viewport,
};
pub use compile::{NagaBackend, NagaProgram};
pub use error::{ProgramError, RunError, SetupError};
pub use frame::{FrameDriver, UniformSet};
pub use program::build_program;
pub use runtime::{Clock, FrameScheduler, SystemClock};
pub use surface::{target_dimensions, SurfaceManager, WindowMetrics};
pub use types::{GpuPowerPreference, RendererConfig, ShaderSources};

/// Entry point that owns the configuration and runs the window.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Opens the window and renders until it is closed.
    ///
    /// Program and GPU setup failures are returned before the first frame;
    /// afterwards only an unrecoverable draw error or an event loop failure
    /// ends the run early.
    pub fn run(&mut self) -> Result<(), RunError> {
        tracing::debug!(
            width = self.config.window_size.0,
            height = self.config.window_size.1,
            power = %self.config.power,
            "starting renderer"
        );
        window::run(&self.config)
    }
}
