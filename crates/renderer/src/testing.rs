//! In-memory collaborators for unit tests.
//!
//! `RecordingGpu` compiles and links for real through naga but records every
//! other call instead of submitting it anywhere.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use winit::dpi::{LogicalSize, PhysicalSize};

use crate::backend::{
    AttribLayout, DrawError, DrawMode, Drawable, GpuContext, ProgramBackend, ShaderStage, Viewport,
};
use crate::compile::{NagaBackend, NagaProgram, NagaShader, UniformLocation};
use crate::runtime::{Clock, FrameScheduler};
use crate::surface::WindowMetrics;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Viewport(Viewport),
    UseProgram(Option<u64>),
    BindBuffer(usize),
    AttribPointer { location: u32, layout: AttribLayout },
    Uniform1f { location: UniformLocation, value: f32 },
    Uniform2f { location: UniformLocation, x: f32, y: f32 },
    Draw { mode: DrawMode, first: u32, count: u32 },
}

impl Call {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Call::Viewport(_) => "viewport",
            Call::UseProgram(_) => "use_program",
            Call::BindBuffer(_) => "bind_buffer",
            Call::AttribPointer { .. } => "attrib_pointer",
            Call::Uniform1f { .. } => "uniform_1f",
            Call::Uniform2f { .. } => "uniform_2f",
            Call::Draw { .. } => "draw",
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingGpu {
    naga: NagaBackend,
    calls: Vec<Call>,
    buffers: Vec<Vec<f32>>,
    live_shaders: usize,
    live_programs: usize,
    link_attempts: usize,
    fail_next_draw: Option<DrawError>,
}

impl RecordingGpu {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub(crate) fn draws(&self) -> Vec<Call> {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::Draw { .. }))
            .cloned()
            .collect()
    }

    pub(crate) fn buffers(&self) -> &[Vec<f32>] {
        &self.buffers
    }

    pub(crate) fn live_shaders(&self) -> usize {
        self.live_shaders
    }

    pub(crate) fn live_programs(&self) -> usize {
        self.live_programs
    }

    pub(crate) fn link_attempts(&self) -> usize {
        self.link_attempts
    }

    pub(crate) fn fail_next_draw(&mut self, error: DrawError) {
        self.fail_next_draw = Some(error);
    }

    pub(crate) fn last_uniform_1f(&self, wanted: UniformLocation) -> Option<f32> {
        self.calls.iter().rev().find_map(|call| match call {
            Call::Uniform1f { location, value } if *location == wanted => Some(*value),
            _ => None,
        })
    }

    pub(crate) fn last_uniform_2f(&self, wanted: UniformLocation) -> Option<(f32, f32)> {
        self.calls.iter().rev().find_map(|call| match call {
            Call::Uniform2f { location, x, y } if *location == wanted => Some((*x, *y)),
            _ => None,
        })
    }
}

impl ProgramBackend for RecordingGpu {
    type Shader = NagaShader;
    type Program = NagaProgram;

    fn create_shader(&mut self, stage: ShaderStage) -> NagaShader {
        self.live_shaders += 1;
        self.naga.create_shader(stage)
    }

    fn compile_shader(&mut self, shader: &mut NagaShader, source: &str) -> Result<(), String> {
        self.naga.compile_shader(shader, source)
    }

    fn delete_shader(&mut self, shader: NagaShader) {
        self.live_shaders -= 1;
        self.naga.delete_shader(shader);
    }

    fn create_program(&mut self) -> NagaProgram {
        self.live_programs += 1;
        self.naga.create_program()
    }

    fn attach_shader(&mut self, program: &mut NagaProgram, shader: &NagaShader) {
        self.naga.attach_shader(program, shader);
    }

    fn link_program(&mut self, program: &mut NagaProgram) -> Result<(), String> {
        self.link_attempts += 1;
        self.naga.link_program(program)
    }

    fn delete_program(&mut self, program: NagaProgram) {
        self.live_programs -= 1;
        self.naga.delete_program(program);
    }
}

impl GpuContext for RecordingGpu {
    type Buffer = usize;
    type UniformLocation = UniformLocation;

    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> usize {
        self.buffers.push(vertices.to_vec());
        self.buffers.len() - 1
    }

    fn attrib_location(&self, program: &NagaProgram, name: &str) -> Option<u32> {
        program
            .linked()?
            .attribute(name)
            .map(|attribute| attribute.location)
    }

    fn uniform_location(&self, program: &NagaProgram, name: &str) -> Option<UniformLocation> {
        program.linked()?.uniform(name)
    }

    fn use_program(&mut self, program: &NagaProgram) {
        self.calls
            .push(Call::UseProgram(program.linked().map(|linked| linked.id())));
    }

    fn bind_vertex_buffer(&mut self, buffer: &usize) {
        self.calls.push(Call::BindBuffer(*buffer));
    }

    fn vertex_attrib_pointer(&mut self, location: u32, layout: AttribLayout) {
        self.calls.push(Call::AttribPointer { location, layout });
    }

    fn uniform_1f(&mut self, location: &UniformLocation, value: f32) {
        self.calls.push(Call::Uniform1f {
            location: *location,
            value,
        });
    }

    fn uniform_2f(&mut self, location: &UniformLocation, x: f32, y: f32) {
        self.calls.push(Call::Uniform2f {
            location: *location,
            x,
            y,
        });
    }

    fn viewport(&mut self, viewport: Viewport) {
        self.calls.push(Call::Viewport(viewport));
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) -> Result<(), DrawError> {
        if let Some(error) = self.fail_next_draw.take() {
            return Err(error);
        }
        self.calls.push(Call::Draw { mode, first, count });
        Ok(())
    }
}

pub(crate) struct FakeSurface {
    backing: PhysicalSize<u32>,
    gpu: RecordingGpu,
    resizes: usize,
}

impl FakeSurface {
    pub(crate) fn new() -> Self {
        Self {
            backing: PhysicalSize::new(0, 0),
            gpu: RecordingGpu::new(),
            resizes: 0,
        }
    }

    pub(crate) fn gpu_ref(&self) -> &RecordingGpu {
        &self.gpu
    }

    pub(crate) fn resizes(&self) -> usize {
        self.resizes
    }
}

impl Drawable for FakeSurface {
    type Gpu = RecordingGpu;

    fn backing_size(&self) -> PhysicalSize<u32> {
        self.backing
    }

    fn set_backing_size(&mut self, size: PhysicalSize<u32>) {
        self.resizes += 1;
        self.backing = size;
    }

    fn gpu(&mut self) -> &mut RecordingGpu {
        &mut self.gpu
    }
}

pub(crate) struct FakeWindow {
    logical: LogicalSize<f64>,
    ratio: Option<f64>,
}

impl FakeWindow {
    pub(crate) fn new(width: f64, height: f64, ratio: Option<f64>) -> Self {
        Self {
            logical: LogicalSize::new(width, height),
            ratio,
        }
    }

    pub(crate) fn set_logical_size(&mut self, width: f64, height: f64) {
        self.logical = LogicalSize::new(width, height);
    }

    pub(crate) fn set_pixel_ratio(&mut self, ratio: Option<f64>) {
        self.ratio = ratio;
    }
}

impl WindowMetrics for FakeWindow {
    fn logical_size(&self) -> LogicalSize<f64> {
        self.logical
    }

    fn pixel_ratio(&self) -> Option<f64> {
        self.ratio
    }
}

/// Clock that only moves when told to; clones share the same time.
#[derive(Clone)]
pub(crate) struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

#[derive(Default)]
pub(crate) struct CountingScheduler {
    requests: usize,
}

impl CountingScheduler {
    pub(crate) fn requests(&self) -> usize {
        self.requests
    }
}

impl FrameScheduler for CountingScheduler {
    fn request_frame(&mut self) {
        self.requests += 1;
    }
}
