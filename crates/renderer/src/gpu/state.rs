use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;

use crate::backend::{
    AttribLayout, DrawError, DrawMode, Drawable, GpuContext, ProgramBackend, ShaderStage, Viewport,
};
use crate::compile::{LinkedProgram, NagaBackend, NagaProgram, NagaShader, UniformLocation};
use crate::error::SetupError;
use crate::types::GpuPowerPreference;

use super::context::DeviceContext;
use super::pipeline::{vertex_format, PipelineCache, PipelineKey, ProgramResources};

#[derive(Clone)]
struct AttribPointer {
    layout: AttribLayout,
    buffer: wgpu::Buffer,
}

/// [`GpuContext`] over wgpu.
///
/// Binding calls only record state. `draw_arrays` turns that state into a
/// pipeline, encodes one render pass into the next swapchain image and
/// presents it, so every draw is a full frame cleared to black first.
pub struct WgpuGpu {
    context: DeviceContext,
    naga: NagaBackend,
    programs: HashMap<u64, ProgramResources>,
    pipelines: PipelineCache,
    current: Option<u64>,
    bound_buffer: Option<wgpu::Buffer>,
    attributes: BTreeMap<u32, AttribPointer>,
    viewport: Option<Viewport>,
}

impl WgpuGpu {
    pub(crate) fn new<T>(
        target: T,
        size: PhysicalSize<u32>,
        power: GpuPowerPreference,
    ) -> Result<Self, SetupError>
    where
        T: wgpu::WindowHandle + 'static,
    {
        let context = DeviceContext::new(target, size, power).map_err(|err| {
            SetupError::UnsupportedContext {
                reason: format!("{err:#}"),
            }
        })?;
        Ok(Self {
            context,
            naga: NagaBackend,
            programs: HashMap::new(),
            pipelines: PipelineCache::default(),
            current: None,
            bound_buffer: None,
            attributes: BTreeMap::new(),
            viewport: None,
        })
    }

    /// Reconfigures the swapchain after a lost or outdated surface.
    pub fn recover_surface(&mut self) {
        debug!("reconfiguring lost surface");
        self.context.reconfigure();
    }

    /// Creates the program's shader modules, uniform buffers and the pipeline
    /// for the packed quad layout inside a validation scope, so anything the
    /// device rejects fails the link instead of the first frame.
    fn prepare_program(&mut self, linked: Arc<LinkedProgram>) -> Result<(), String> {
        let id = linked.id();
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let resources = ProgramResources::new(device, linked);
        let key = PipelineKey::packed(&resources.linked, self.context.surface_format);
        self.pipelines.get_or_build(device, &resources, key);
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            self.pipelines.evict_program(id);
            return Err(format!("device rejected the program:\n{error}"));
        }
        self.programs.insert(id, resources);
        Ok(())
    }

    fn current_program(&mut self) -> Option<&mut ProgramResources> {
        let id = self.current?;
        self.programs.get_mut(&id)
    }

    /// Attribute pointers the current program consumes, in location order.
    /// `None` when an input has no usable pointer.
    fn vertex_inputs(&self, program: &ProgramResources) -> Option<Vec<(u32, AttribPointer)>> {
        program
            .linked
            .attributes()
            .iter()
            .map(|attribute| {
                let pointer = self.attributes.get(&attribute.location);
                match pointer {
                    Some(pointer) if vertex_format(pointer.layout.components).is_some() => {
                        Some((attribute.location, pointer.clone()))
                    }
                    _ => {
                        warn!(
                            attribute = %attribute.name,
                            location = attribute.location,
                            "vertex input has no usable attribute pointer; draw skipped"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    fn encode_and_present(
        &mut self,
        mode: DrawMode,
        first: u32,
        count: u32,
    ) -> Result<(), DrawError> {
        let Some(id) = self.current else {
            warn!("draw without a linked program skipped");
            return Ok(());
        };
        let Some(program) = self.programs.get(&id) else {
            return Ok(());
        };
        let Some(inputs) = self.vertex_inputs(program) else {
            return Ok(());
        };
        let target = PhysicalSize::new(self.context.config.width, self.context.config.height);
        let viewport = self.viewport.unwrap_or(Viewport::full(target));
        let Some(rect) = viewport_rect(viewport, target) else {
            debug!(?viewport, "empty viewport; draw skipped");
            return Ok(());
        };

        let key = PipelineKey {
            program: id,
            mode,
            attributes: inputs
                .iter()
                .map(|(location, pointer)| (*location, pointer.layout))
                .collect(),
            surface_format: self.context.surface_format,
        };
        let pipeline = self
            .pipelines
            .get_or_build(&self.context.device, program, key)
            .clone();

        if let Some(program) = self.programs.get_mut(&id) {
            program.uniforms.flush(&self.context.queue);
        }

        let frame = self
            .context
            .surface
            .get_current_texture()
            .map_err(map_surface_error)?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            let [x, y, width, height] = rect;
            render_pass.set_viewport(x, y, width, height, 0.0, 1.0);
            render_pass.set_pipeline(&pipeline);
            if let Some(program) = self.programs.get(&id) {
                for (group, bind_group) in program.uniforms.bind_groups() {
                    render_pass.set_bind_group(group, bind_group, &[]);
                }
            }
            for (slot, (_, pointer)) in inputs.iter().enumerate() {
                render_pass.set_vertex_buffer(slot as u32, pointer.buffer.slice(pointer.layout.offset..));
            }
            render_pass.draw(first..first.saturating_add(count), 0..1);
        }

        self.context.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }
}

fn map_surface_error(err: wgpu::SurfaceError) -> DrawError {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => DrawError::SurfaceLost,
        wgpu::SurfaceError::Timeout => DrawError::Timeout,
        wgpu::SurfaceError::OutOfMemory => DrawError::OutOfMemory,
        other => DrawError::Other(other.to_string()),
    }
}

/// Converts a bottom-left-origin viewport into wgpu's top-left
/// `[x, y, width, height]`, clipped to `target`. `None` when nothing is left.
pub(crate) fn viewport_rect(viewport: Viewport, target: PhysicalSize<u32>) -> Option<[f32; 4]> {
    let target_w = i64::from(target.width);
    let target_h = i64::from(target.height);
    let left = i64::from(viewport.x).clamp(0, target_w);
    let bottom = i64::from(viewport.y).clamp(0, target_h);
    let right = (i64::from(viewport.x) + i64::from(viewport.width)).clamp(0, target_w);
    let top = (i64::from(viewport.y) + i64::from(viewport.height)).clamp(0, target_h);
    if right <= left || top <= bottom {
        return None;
    }
    Some([
        left as f32,
        (target_h - top) as f32,
        (right - left) as f32,
        (top - bottom) as f32,
    ])
}

impl ProgramBackend for WgpuGpu {
    type Shader = NagaShader;
    type Program = NagaProgram;

    fn create_shader(&mut self, stage: ShaderStage) -> NagaShader {
        self.naga.create_shader(stage)
    }

    fn compile_shader(&mut self, shader: &mut NagaShader, source: &str) -> Result<(), String> {
        self.naga.compile_shader(shader, source)
    }

    fn delete_shader(&mut self, shader: NagaShader) {
        self.naga.delete_shader(shader);
    }

    fn create_program(&mut self) -> NagaProgram {
        self.naga.create_program()
    }

    fn attach_shader(&mut self, program: &mut NagaProgram, shader: &NagaShader) {
        self.naga.attach_shader(program, shader);
    }

    fn link_program(&mut self, program: &mut NagaProgram) -> Result<(), String> {
        self.naga.link_program(program)?;
        let Some(linked) = program.linked().cloned() else {
            return Ok(());
        };
        self.prepare_program(linked).inspect_err(|_| program.unlink())
    }

    fn delete_program(&mut self, program: NagaProgram) {
        if let Some(linked) = program.linked() {
            let id = linked.id();
            self.programs.remove(&id);
            self.pipelines.evict_program(id);
            if self.current == Some(id) {
                self.current = None;
            }
        }
        self.naga.delete_program(program);
    }
}

impl GpuContext for WgpuGpu {
    type Buffer = wgpu::Buffer;
    type UniformLocation = UniformLocation;

    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> wgpu::Buffer {
        self.context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("vertex buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            })
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
        let Some(linked) = program.linked() else {
            warn!("use_program with an unlinked program");
            self.current = None;
            return;
        };
        let id = linked.id();
        if !self.programs.contains_key(&id) {
            warn!(program = id, "use_program with a program linked by another context");
            self.current = None;
            return;
        }
        self.current = Some(id);
    }

    fn bind_vertex_buffer(&mut self, buffer: &wgpu::Buffer) {
        self.bound_buffer = Some(buffer.clone());
    }

    fn vertex_attrib_pointer(&mut self, location: u32, layout: AttribLayout) {
        let Some(buffer) = self.bound_buffer.clone() else {
            warn!(location, "attribute pointer set without a bound buffer ignored");
            return;
        };
        self.attributes.insert(location, AttribPointer { layout, buffer });
    }

    fn uniform_1f(&mut self, location: &UniformLocation, value: f32) {
        if let Some(program) = self.current_program() {
            program.uniforms.write(location, &[value]);
        }
    }

    fn uniform_2f(&mut self, location: &UniformLocation, x: f32, y: f32) {
        if let Some(program) = self.current_program() {
            program.uniforms.write(location, &[x, y]);
        }
    }

    fn viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    fn draw_arrays(&mut self, mode: DrawMode, first: u32, count: u32) -> Result<(), DrawError> {
        if !self.context.is_drawable() {
            return Ok(());
        }
        self.encode_and_present(mode, first, count)
    }
}

impl Drawable for WgpuGpu {
    type Gpu = Self;

    fn backing_size(&self) -> PhysicalSize<u32> {
        self.context.size
    }

    fn set_backing_size(&mut self, size: PhysicalSize<u32>) {
        self.context.resize(size);
        debug!(
            width = size.width,
            height = size.height,
            pipelines = self.pipelines.len(),
            "backing store resized"
        );
    }

    fn gpu(&mut self) -> &mut Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_viewport_covers_target() {
        let target = PhysicalSize::new(800, 600);
        assert_eq!(
            viewport_rect(Viewport::full(target), target),
            Some([0.0, 0.0, 800.0, 600.0])
        );
    }

    #[test]
    fn viewport_origin_flips_to_top_left() {
        let target = PhysicalSize::new(800, 600);
        let viewport = Viewport {
            x: 10,
            y: 20,
            width: 100,
            height: 50,
        };
        assert_eq!(
            viewport_rect(viewport, target),
            Some([10.0, 530.0, 100.0, 50.0])
        );
    }

    #[test]
    fn viewport_is_clipped_to_target() {
        let target = PhysicalSize::new(100, 100);
        let viewport = Viewport {
            x: -20,
            y: 50,
            width: 200,
            height: 200,
        };
        assert_eq!(
            viewport_rect(viewport, target),
            Some([0.0, 0.0, 100.0, 50.0])
        );
    }

    #[test]
    fn empty_viewports_are_rejected() {
        let target = PhysicalSize::new(100, 100);
        assert_eq!(viewport_rect(Viewport::full(PhysicalSize::new(0, 10)), target), None);
        let outside = Viewport {
            x: 150,
            y: 0,
            width: 10,
            height: 10,
        };
        assert_eq!(viewport_rect(outside, target), None);
    }

    #[test]
    fn surface_errors_map_to_draw_errors() {
        assert_eq!(
            map_surface_error(wgpu::SurfaceError::Lost),
            DrawError::SurfaceLost
        );
        assert_eq!(
            map_surface_error(wgpu::SurfaceError::Outdated),
            DrawError::SurfaceLost
        );
        assert_eq!(
            map_surface_error(wgpu::SurfaceError::Timeout),
            DrawError::Timeout
        );
        assert_eq!(
            map_surface_error(wgpu::SurfaceError::OutOfMemory),
            DrawError::OutOfMemory
        );
    }
}
