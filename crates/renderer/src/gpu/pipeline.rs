use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::backend::{AttribLayout, DrawMode};
use crate::compile::{CompiledShader, LinkedProgram, ENTRY_POINT};

use super::uniforms::ProgramUniforms;

/// Device objects derived from one linked program.
pub(crate) struct ProgramResources {
    pub linked: Arc<LinkedProgram>,
    vertex_module: wgpu::ShaderModule,
    fragment_module: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    pub uniforms: ProgramUniforms,
}

impl ProgramResources {
    pub fn new(device: &wgpu::Device, linked: Arc<LinkedProgram>) -> Self {
        let vertex_module = create_module(device, &linked.vertex, "vertex shader");
        let fragment_module = create_module(device, &linked.fragment, "fragment shader");
        let uniforms = ProgramUniforms::new(device, linked.uniform_blocks());
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("program pipeline layout"),
            bind_group_layouts: &uniforms.layouts(),
            push_constant_ranges: &[],
        });
        debug!(program = linked.id(), "created program resources");
        Self {
            linked,
            vertex_module,
            fragment_module,
            layout,
            uniforms,
        }
    }
}

fn create_module(device: &wgpu::Device, shader: &CompiledShader, label: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(shader.source.clone()),
            stage: shader.stage.to_naga(),
            defines: &[],
        },
    })
}

/// Everything that changes the shape of a render pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub program: u64,
    pub mode: DrawMode,
    /// Attribute pointers in location order; each occupies its own buffer slot.
    pub attributes: Vec<(u32, AttribLayout)>,
    pub surface_format: wgpu::TextureFormat,
}

impl PipelineKey {
    /// Key for drawing triangles with every vertex input read from its own
    /// tightly packed float buffer, the layout the frame driver binds.
    pub fn packed(program: &LinkedProgram, surface_format: wgpu::TextureFormat) -> Self {
        Self {
            program: program.id(),
            mode: DrawMode::Triangles,
            attributes: program
                .attributes()
                .iter()
                .map(|attribute| (attribute.location, AttribLayout::packed_floats(attribute.components)))
                .collect(),
            surface_format,
        }
    }
}

/// Render pipelines built on demand, reused across frames.
#[derive(Default)]
pub(crate) struct PipelineCache {
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub fn get_or_build(
        &mut self,
        device: &wgpu::Device,
        program: &ProgramResources,
        key: PipelineKey,
    ) -> &wgpu::RenderPipeline {
        self.pipelines.entry(key).or_insert_with_key(|key| {
            debug!(program = key.program, mode = ?key.mode, "building render pipeline");
            build_render_pipeline(device, program, key)
        })
    }

    /// Drops every pipeline built for `program`.
    pub fn evict_program(&mut self, program: u64) {
        self.pipelines.retain(|key, _| key.program != program);
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }
}

pub(crate) fn topology(mode: DrawMode) -> wgpu::PrimitiveTopology {
    match mode {
        DrawMode::Triangles => wgpu::PrimitiveTopology::TriangleList,
        DrawMode::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

pub(crate) fn vertex_format(components: u8) -> Option<wgpu::VertexFormat> {
    match components {
        1 => Some(wgpu::VertexFormat::Float32),
        2 => Some(wgpu::VertexFormat::Float32x2),
        3 => Some(wgpu::VertexFormat::Float32x3),
        4 => Some(wgpu::VertexFormat::Float32x4),
        _ => None,
    }
}

/// Vertex buffer slot holding a single attribute.
pub(crate) struct VertexSlot {
    pub stride: u64,
    pub attribute: [wgpu::VertexAttribute; 1],
}

/// One slot per attribute pointer. The attribute's byte offset is applied
/// when the buffer is bound, so every attribute starts at offset 0.
pub(crate) fn vertex_slots(key: &PipelineKey) -> Vec<VertexSlot> {
    key.attributes
        .iter()
        .filter_map(|(location, layout)| {
            Some(VertexSlot {
                stride: layout.effective_stride(),
                attribute: [wgpu::VertexAttribute {
                    format: vertex_format(layout.components)?,
                    offset: 0,
                    shader_location: *location,
                }],
            })
        })
        .collect()
}

fn build_render_pipeline(
    device: &wgpu::Device,
    program: &ProgramResources,
    key: &PipelineKey,
) -> wgpu::RenderPipeline {
    let slots = vertex_slots(key);
    let buffers: Vec<wgpu::VertexBufferLayout> = slots
        .iter()
        .map(|slot| wgpu::VertexBufferLayout {
            array_stride: slot.stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &slot.attribute,
        })
        .collect();

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("program pipeline"),
        layout: Some(&program.layout),
        vertex: wgpu::VertexState {
            module: &program.vertex_module,
            entry_point: Some(ENTRY_POINT),
            buffers: &buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: topology(key.mode),
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &program.fragment_module,
            entry_point: Some(ENTRY_POINT),
            targets: &[Some(wgpu::ColorTargetState {
                format: key.surface_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(attributes: Vec<(u32, AttribLayout)>) -> PipelineKey {
        PipelineKey {
            program: 7,
            mode: DrawMode::Triangles,
            attributes,
            surface_format: wgpu::TextureFormat::Bgra8Unorm,
        }
    }

    #[test]
    fn draw_modes_map_to_topologies() {
        assert_eq!(
            topology(DrawMode::Triangles),
            wgpu::PrimitiveTopology::TriangleList
        );
        assert_eq!(
            topology(DrawMode::TriangleStrip),
            wgpu::PrimitiveTopology::TriangleStrip
        );
    }

    #[test]
    fn attributes_use_float_formats_by_component_count() {
        let slots = vertex_slots(&key(vec![
            (0, AttribLayout::packed_floats(2)),
            (3, AttribLayout::packed_floats(4)),
        ]));
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].stride, 8);
        assert_eq!(slots[0].attribute[0].format, wgpu::VertexFormat::Float32x2);
        assert_eq!(slots[0].attribute[0].shader_location, 0);
        assert_eq!(slots[1].stride, 16);
        assert_eq!(slots[1].attribute[0].format, wgpu::VertexFormat::Float32x4);
        assert_eq!(slots[1].attribute[0].shader_location, 3);
        assert!(slots.iter().all(|slot| slot.attribute[0].offset == 0));
    }

    #[test]
    fn packed_key_matches_the_default_program_inputs() {
        use crate::compile::{compile_glsl, link};
        use crate::backend::ShaderStage;
        use crate::shaders::{DEFAULT_FRAGMENT_SHADER, DEFAULT_VERTEX_SHADER};

        let program = link(
            Arc::new(compile_glsl(ShaderStage::Vertex, DEFAULT_VERTEX_SHADER).expect("vertex")),
            Arc::new(compile_glsl(ShaderStage::Fragment, DEFAULT_FRAGMENT_SHADER).expect("fragment")),
        )
        .expect("links");
        let key = PipelineKey::packed(&program, wgpu::TextureFormat::Bgra8Unorm);
        assert_eq!(key.program, program.id());
        assert_eq!(key.mode, DrawMode::Triangles);
        assert_eq!(key.attributes, vec![(0, AttribLayout::packed_floats(2))]);
    }

    #[test]
    fn unsupported_component_counts_are_dropped() {
        assert_eq!(vertex_format(0), None);
        assert_eq!(vertex_format(5), None);
        assert!(vertex_slots(&key(vec![(0, AttribLayout::packed_floats(7))])).is_empty());
    }

    #[test]
    fn keys_differ_by_attribute_layout() {
        let packed = key(vec![(0, AttribLayout::packed_floats(2))]);
        let strided = key(vec![(
            0,
            AttribLayout {
                stride: 16,
                ..AttribLayout::packed_floats(2)
            },
        )]);
        assert_ne!(packed, strided);
    }
}
