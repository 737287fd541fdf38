//! Collaborator traits the render loop runs against.
//!
//! The calls deliberately follow the GL object model (create, compile, attach,
//! link, release) so the program builder and frame driver read the same
//! whether they talk to the wgpu backend in [`crate::gpu`] or to a recording
//! fake in tests.

use std::fmt;

use thiserror::Error;
use winit::dpi::PhysicalSize;

/// Pipeline stage a shader object is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub(crate) fn to_naga(self) -> wgpu::naga::ShaderStage {
        match self {
            ShaderStage::Vertex => wgpu::naga::ShaderStage::Vertex,
            ShaderStage::Fragment => wgpu::naga::ShaderStage::Fragment,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// How vertices handed to [`GpuContext::draw_arrays`] are assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawMode {
    /// Every three vertices form an independent triangle.
    Triangles,
    /// Each vertex after the second forms a triangle with the previous two.
    TriangleStrip,
}

/// Layout of one floating-point vertex attribute inside the bound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttribLayout {
    /// Number of `f32` components per vertex (1-4).
    pub components: u8,
    pub normalized: bool,
    /// Byte distance between consecutive vertices; 0 means tightly packed.
    pub stride: u32,
    /// Byte offset of the first component.
    pub offset: u64,
}

impl AttribLayout {
    /// Tightly packed, non-normalized floats starting at offset 0.
    pub const fn packed_floats(components: u8) -> Self {
        Self {
            components,
            normalized: false,
            stride: 0,
            offset: 0,
        }
    }

    /// Stride with the tightly packed case resolved.
    pub fn effective_stride(&self) -> u64 {
        if self.stride == 0 {
            u64::from(self.components) * std::mem::size_of::<f32>() as u64
        } else {
            u64::from(self.stride)
        }
    }
}

/// Rectangle of the backing store that clip space maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Viewport covering the whole backing store.
    pub fn full(size: PhysicalSize<u32>) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size.width,
            height: size.height,
        }
    }
}

/// Per-frame presentation failures reported by a backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DrawError {
    #[error("surface lost or outdated")]
    SurfaceLost,
    #[error("timed out acquiring the next surface texture")]
    Timeout,
    #[error("GPU is out of memory")]
    OutOfMemory,
    #[error("surface error: {0}")]
    Other(String),
}

/// Shader and program object lifecycle.
///
/// Compile and link failures come back as the backend's diagnostic log; the
/// caller owns releasing objects that failed.
pub trait ProgramBackend {
    type Shader;
    type Program;

    fn create_shader(&mut self, stage: ShaderStage) -> Self::Shader;
    fn compile_shader(&mut self, shader: &mut Self::Shader, source: &str) -> Result<(), String>;
    fn delete_shader(&mut self, shader: Self::Shader);

    fn create_program(&mut self) -> Self::Program;
    fn attach_shader(&mut self, program: &mut Self::Program, shader: &Self::Shader);
    fn link_program(&mut self, program: &mut Self::Program) -> Result<(), String>;
    fn delete_program(&mut self, program: Self::Program);
}

/// Buffer, binding, uniform and draw submission calls used by the frame loop.
pub trait GpuContext: ProgramBackend {
    type Buffer;
    type UniformLocation: Clone;

    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> Self::Buffer;

    fn attrib_location(&self, program: &Self::Program, name: &str) -> Option<u32>;
    fn uniform_location(&self, program: &Self::Program, name: &str)
        -> Option<Self::UniformLocation>;

    fn use_program(&mut self, program: &Self::Program);
    fn bind_vertex_buffer(&mut self, buffer: &Self::Buffer);
    /// Reads attribute `location` from the currently bound vertex buffer.
    fn vertex_attrib_pointer(&mut self, location: u32, layout: AttribLayout);

    fn uniform_1f(&mut self, location: &Self::UniformLocation, value: f32);
    fn uniform_2f(&mut self, location: &Self::UniformLocation, x: f32, y: f32);

    fn viewport(&mut self, viewport: Viewport);
    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) -> Result<(), DrawError>;
}

/// Surface whose backing store the GPU renders into.
pub trait Drawable {
    type Gpu: GpuContext;

    fn backing_size(&self) -> PhysicalSize<u32>;
    fn set_backing_size(&mut self, size: PhysicalSize<u32>);
    fn gpu(&mut self) -> &mut Self::Gpu;
}
