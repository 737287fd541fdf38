use thiserror::Error;

use crate::backend::{DrawError, ShaderStage};

/// Failure to turn two shader sources into a linked program.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProgramError {
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("shader program failed to link:\n{log}")]
    Link { log: String },
}

impl ProgramError {
    /// Stage that failed to compile, if this is a compile error.
    pub fn stage(&self) -> Option<ShaderStage> {
        match self {
            ProgramError::Compile { stage, .. } => Some(*stage),
            ProgramError::Link { .. } => None,
        }
    }

    /// Diagnostic text produced by the compiler or linker.
    pub fn log(&self) -> &str {
        match self {
            ProgramError::Compile { log, .. } | ProgramError::Link { log } => log,
        }
    }
}

/// Errors that stop the render loop from ever starting.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("GPU context unavailable: {reason}")]
    UnsupportedContext { reason: String },
    #[error(transparent)]
    Program(#[from] ProgramError),
}

/// Why [`crate::Renderer::run`] returned early.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("rendering stopped: {0}")]
    Draw(DrawError),
    #[error("window event loop failed: {0}")]
    EventLoop(String),
}
