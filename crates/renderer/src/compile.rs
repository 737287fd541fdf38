//! GLSL compilation and program linking on top of naga.
//!
//! Compilation parses a single stage with naga's GLSL frontend and validates
//! the resulting module. Linking never touches a device: it checks the
//! interface between the two stages the way a GL driver would and records the
//! attribute and uniform layout the frame loop looks up by name.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use wgpu::naga::front::glsl;
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};
use wgpu::naga::{AddressSpace, Binding, EntryPoint, Module, TypeInner};

use crate::backend::{ProgramBackend, ShaderStage};

/// Entry point name every GLSL stage must define.
pub const ENTRY_POINT: &str = "main";

/// Validation capabilities. The wgpu device is requested without optional
/// features, so shaders may only use what every adapter runs.
pub(crate) const DEVICE_CAPABILITIES: Capabilities = Capabilities::empty();

static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

/// A validated single-stage module together with the source it came from.
#[derive(Debug)]
pub struct CompiledShader {
    pub stage: ShaderStage,
    pub source: String,
    pub module: Module,
}

/// Parses and validates one GLSL stage, returning naga's rendered diagnostic
/// on failure.
pub fn compile_glsl(stage: ShaderStage, source: &str) -> Result<CompiledShader, String> {
    compile_with_capabilities(stage, source, DEVICE_CAPABILITIES)
}

fn compile_with_capabilities(
    stage: ShaderStage,
    source: &str,
    capabilities: Capabilities,
) -> Result<CompiledShader, String> {
    let mut frontend = glsl::Frontend::default();
    let module = frontend
        .parse(&glsl::Options::from(stage.to_naga()), source)
        .map_err(|errors| errors.emit_to_string(source).trim_end().to_string())?;

    Validator::new(ValidationFlags::all(), capabilities)
        .validate(&module)
        .map_err(|error| error.emit_to_string(source).trim_end().to_string())?;

    Ok(CompiledShader {
        stage,
        source: source.to_string(),
        module,
    })
}

/// Vertex input the program reads from a vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub location: u32,
    pub components: u8,
}

/// std140 uniform block shared by the program's stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlock {
    pub group: u32,
    pub binding: u32,
    /// Size of the block in bytes.
    pub size: u32,
    pub members: Vec<UniformMember>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformMember {
    pub name: String,
    pub offset: u32,
}

impl UniformBlock {
    fn key(&self) -> (u32, u32) {
        (self.group, self.binding)
    }
}

/// Where a uniform lives: the block's bind slot plus the member's byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    pub group: u32,
    pub binding: u32,
    pub offset: u32,
}

/// Result of a successful link.
#[derive(Debug)]
pub struct LinkedProgram {
    id: u64,
    pub vertex: Arc<CompiledShader>,
    pub fragment: Arc<CompiledShader>,
    attributes: Vec<Attribute>,
    uniform_blocks: Vec<UniformBlock>,
}

impl LinkedProgram {
    /// Process-unique identifier, stable for the program's lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn uniform_blocks(&self) -> &[UniformBlock] {
        &self.uniform_blocks
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    pub fn uniform(&self, name: &str) -> Option<UniformLocation> {
        self.uniform_blocks.iter().find_map(|block| {
            block
                .members
                .iter()
                .find(|member| member.name == name)
                .map(|member| UniformLocation {
                    group: block.group,
                    binding: block.binding,
                    offset: member.offset,
                })
        })
    }
}

/// Links a vertex and a fragment stage into a program.
pub fn link(
    vertex: Arc<CompiledShader>,
    fragment: Arc<CompiledShader>,
) -> Result<LinkedProgram, String> {
    let vertex_entry = entry_point(&vertex, ShaderStage::Vertex)?;
    let fragment_entry = entry_point(&fragment, ShaderStage::Fragment)?;

    check_varyings(
        &stage_outputs(&vertex.module, vertex_entry),
        &stage_inputs(&fragment.module, fragment_entry),
    )?;

    let uniform_blocks = merge_blocks(
        uniform_blocks(&vertex)?
            .into_iter()
            .chain(uniform_blocks(&fragment)?),
    )?;

    let attributes = stage_inputs(&vertex.module, vertex_entry)
        .into_iter()
        .filter_map(|input| {
            let name = input.name?;
            let components = match input.ty {
                TypeInner::Scalar(_) => 1,
                TypeInner::Vector { size, .. } => size as u8,
                _ => return None,
            };
            Some(Attribute {
                name,
                location: input.location,
                components,
            })
        })
        .collect();

    Ok(LinkedProgram {
        id: NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed),
        vertex,
        fragment,
        attributes,
        uniform_blocks,
    })
}

fn entry_point(shader: &CompiledShader, expected: ShaderStage) -> Result<&EntryPoint, String> {
    if shader.stage != expected {
        return Err(format!(
            "a {} shader was attached where a {expected} shader is required",
            shader.stage
        ));
    }
    shader
        .module
        .entry_points
        .iter()
        .find(|entry| entry.name == ENTRY_POINT && entry.stage == expected.to_naga())
        .ok_or_else(|| format!("{expected} shader has no `{ENTRY_POINT}` entry point"))
}

#[derive(Debug, Clone, PartialEq)]
struct Varying {
    name: Option<String>,
    location: u32,
    ty: TypeInner,
}

impl Varying {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}

fn stage_inputs(module: &Module, entry: &EntryPoint) -> Vec<Varying> {
    entry
        .function
        .arguments
        .iter()
        .filter_map(|argument| match &argument.binding {
            Some(Binding::Location { location, .. }) => Some(Varying {
                name: argument.name.clone(),
                location: *location,
                ty: module.types[argument.ty].inner.clone(),
            }),
            _ => None,
        })
        .collect()
}

fn stage_outputs(module: &Module, entry: &EntryPoint) -> Vec<Varying> {
    let Some(result) = &entry.function.result else {
        return Vec::new();
    };
    match (&result.binding, &module.types[result.ty].inner) {
        (Some(Binding::Location { location, .. }), inner) => vec![Varying {
            name: None,
            location: *location,
            ty: inner.clone(),
        }],
        (None, TypeInner::Struct { members, .. }) => members
            .iter()
            .filter_map(|member| match &member.binding {
                Some(Binding::Location { location, .. }) => Some(Varying {
                    name: member.name.clone(),
                    location: *location,
                    ty: module.types[member.ty].inner.clone(),
                }),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn check_varyings(outputs: &[Varying], inputs: &[Varying]) -> Result<(), String> {
    let mut problems = Vec::new();
    for input in inputs {
        match outputs.iter().find(|output| output.location == input.location) {
            None => problems.push(format!(
                "fragment input `{}` at location {} is not written by the vertex shader",
                input.label(),
                input.location
            )),
            Some(output) if output.ty != input.ty => problems.push(format!(
                "fragment input `{}` at location {} is {:?} but vertex output `{}` is {:?}",
                input.label(),
                input.location,
                input.ty,
                output.label(),
                output.ty
            )),
            Some(_) => {}
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("\n"))
    }
}

fn uniform_blocks(shader: &CompiledShader) -> Result<Vec<UniformBlock>, String> {
    let module = &shader.module;
    let mut blocks = Vec::new();
    for (_, variable) in module.global_variables.iter() {
        let label = variable.name.as_deref().unwrap_or("<unnamed>");
        match variable.space {
            AddressSpace::Uniform => {
                let Some(binding) = &variable.binding else {
                    return Err(format!(
                        "{} shader uniform `{label}` has no set/binding",
                        shader.stage
                    ));
                };
                let TypeInner::Struct { members, span } = &module.types[variable.ty].inner else {
                    return Err(format!(
                        "{} shader uniform `{label}` must be declared inside a uniform block",
                        shader.stage
                    ));
                };
                blocks.push(UniformBlock {
                    group: binding.group,
                    binding: binding.binding,
                    size: *span,
                    members: members
                        .iter()
                        .filter_map(|member| {
                            member.name.clone().map(|name| UniformMember {
                                name,
                                offset: member.offset,
                            })
                        })
                        .collect(),
                });
            }
            // Stage inputs, outputs and globals of the shader itself.
            AddressSpace::Private | AddressSpace::Function => {}
            space => {
                return Err(format!(
                    "{} shader resource `{label}` in {space:?} space is not supported; only uniform blocks can be bound",
                    shader.stage
                ));
            }
        }
    }
    Ok(blocks)
}

fn merge_blocks(blocks: impl Iterator<Item = UniformBlock>) -> Result<Vec<UniformBlock>, String> {
    let mut merged: BTreeMap<(u32, u32), UniformBlock> = BTreeMap::new();
    for block in blocks {
        match merged.get(&block.key()) {
            Some(existing) if *existing != block => {
                return Err(format!(
                    "uniform block at set {} binding {} is declared differently by the vertex and fragment shaders",
                    block.group, block.binding
                ));
            }
            Some(_) => {}
            None => {
                merged.insert(block.key(), block);
            }
        }
    }
    Ok(merged.into_values().collect())
}

/// [`ProgramBackend`] that compiles and links with naga alone.
///
/// Used by `backdrop check` and as the program half of every other backend.
#[derive(Debug, Default)]
pub struct NagaBackend;

#[derive(Debug)]
pub struct NagaShader {
    stage: ShaderStage,
    compiled: Option<Arc<CompiledShader>>,
}

#[derive(Debug, Clone, Default)]
pub struct NagaProgram {
    vertex: Option<Arc<CompiledShader>>,
    fragment: Option<Arc<CompiledShader>>,
    linked: Option<Arc<LinkedProgram>>,
}

impl NagaProgram {
    /// Link output, present once [`ProgramBackend::link_program`] succeeded.
    pub fn linked(&self) -> Option<&Arc<LinkedProgram>> {
        self.linked.as_ref()
    }

    /// Discards the link output after the device rejected the program.
    pub(crate) fn unlink(&mut self) {
        self.linked = None;
    }
}

impl ProgramBackend for NagaBackend {
    type Shader = NagaShader;
    type Program = NagaProgram;

    fn create_shader(&mut self, stage: ShaderStage) -> NagaShader {
        NagaShader {
            stage,
            compiled: None,
        }
    }

    fn compile_shader(&mut self, shader: &mut NagaShader, source: &str) -> Result<(), String> {
        shader.compiled = None;
        let compiled = compile_glsl(shader.stage, source)?;
        shader.compiled = Some(Arc::new(compiled));
        Ok(())
    }

    fn delete_shader(&mut self, shader: NagaShader) {
        drop(shader);
    }

    fn create_program(&mut self) -> NagaProgram {
        NagaProgram::default()
    }

    fn attach_shader(&mut self, program: &mut NagaProgram, shader: &NagaShader) {
        let slot = match shader.stage {
            ShaderStage::Vertex => &mut program.vertex,
            ShaderStage::Fragment => &mut program.fragment,
        };
        *slot = shader.compiled.clone();
    }

    fn link_program(&mut self, program: &mut NagaProgram) -> Result<(), String> {
        program.linked = None;
        let vertex = program
            .vertex
            .clone()
            .ok_or_else(|| "no compiled vertex shader attached".to_string())?;
        let fragment = program
            .fragment
            .clone()
            .ok_or_else(|| "no compiled fragment shader attached".to_string())?;
        program.linked = Some(Arc::new(link(vertex, fragment)?));
        Ok(())
    }

    fn delete_program(&mut self, program: NagaProgram) {
        drop(program);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders::{DEFAULT_FRAGMENT_SHADER, DEFAULT_VERTEX_SHADER};

    fn compiled(stage: ShaderStage, source: &str) -> Arc<CompiledShader> {
        Arc::new(compile_glsl(stage, source).expect("shader compiles"))
    }

    fn default_program() -> LinkedProgram {
        link(
            compiled(ShaderStage::Vertex, DEFAULT_VERTEX_SHADER),
            compiled(ShaderStage::Fragment, DEFAULT_FRAGMENT_SHADER),
        )
        .expect("default program links")
    }

    #[test]
    fn default_program_exposes_position_attribute() {
        let program = default_program();
        let position = program.attribute("a_position").expect("a_position");
        assert_eq!(position.location, 0);
        assert_eq!(position.components, 2);
        assert!(program.attribute("a_missing").is_none());
    }

    #[test]
    fn default_program_exposes_std140_uniforms() {
        let program = default_program();
        let resolution = program.uniform("u_resolution").expect("u_resolution");
        let time = program.uniform("u_time").expect("u_time");
        assert_eq!((resolution.group, resolution.binding), (0, 0));
        assert_eq!(resolution.offset, 0);
        assert_eq!(time.offset, 8);
        assert_eq!(program.uniform_blocks().len(), 1);
        assert!(program.uniform_blocks()[0].size >= 12);
    }

    #[test]
    fn program_ids_are_unique() {
        assert_ne!(default_program().id(), default_program().id());
    }

    #[test]
    fn syntax_errors_are_reported_as_text() {
        let err = compile_glsl(ShaderStage::Fragment, "#version 450\nvoid main() { oops }")
            .expect_err("invalid source");
        assert!(!err.is_empty());
    }

    #[test]
    fn mismatched_varying_types_fail_to_link() {
        let vertex = r"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 0) out vec3 v_color;

void main() {
    v_color = vec3(a_position, 0.0);
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";
        let err = link(
            compiled(ShaderStage::Vertex, vertex),
            compiled(ShaderStage::Fragment, DEFAULT_FRAGMENT_SHADER),
        )
        .expect_err("varying types differ");
        assert!(err.contains("location 0"), "{err}");
    }

    #[test]
    fn unwritten_fragment_inputs_fail_to_link() {
        let fragment = r"#version 450
layout(location = 3) in vec2 v_other;
layout(location = 0) out vec4 frag_color;

void main() {
    frag_color = vec4(v_other, 0.0, 1.0);
}
";
        let err = link(
            compiled(ShaderStage::Vertex, DEFAULT_VERTEX_SHADER),
            compiled(ShaderStage::Fragment, fragment),
        )
        .expect_err("location 3 is never written");
        assert!(err.contains("v_other"), "{err}");
    }

    #[test]
    fn texture_resources_are_rejected() {
        let fragment = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 frag_color;
layout(set = 0, binding = 1) uniform texture2D u_image;
layout(set = 0, binding = 2) uniform sampler u_sampler;

void main() {
    frag_color = texture(sampler2D(u_image, u_sampler), v_uv);
}
";
        let err = link(
            compiled(ShaderStage::Vertex, DEFAULT_VERTEX_SHADER),
            compiled(ShaderStage::Fragment, fragment),
        )
        .expect_err("textures are not supported");
        assert!(err.contains("not supported"), "{err}");
    }

    #[test]
    fn double_precision_is_rejected_at_compile_time() {
        let fragment = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 frag_color;

void main() {
    double d = double(v_uv.x);
    frag_color = vec4(float(d), v_uv.y, 0.0, 1.0);
}
";
        assert!(compile_glsl(ShaderStage::Fragment, fragment).is_err());
    }

    const PUSH_CONSTANT_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 frag_color;
layout(push_constant) uniform Pc { float k; } pc;

void main() {
    frag_color = vec4(v_uv * pc.k, 0.0, 1.0);
}
";

    #[test]
    fn push_constants_are_rejected_at_compile_time() {
        assert!(compile_glsl(ShaderStage::Fragment, PUSH_CONSTANT_FRAGMENT).is_err());
    }

    #[test]
    fn push_constants_are_rejected_at_link_time() {
        let fragment = compile_with_capabilities(
            ShaderStage::Fragment,
            PUSH_CONSTANT_FRAGMENT,
            Capabilities::PUSH_CONSTANT,
        )
        .expect("compiles when push constants are allowed");
        let err = link(
            compiled(ShaderStage::Vertex, DEFAULT_VERTEX_SHADER),
            Arc::new(fragment),
        )
        .expect_err("push constants have no pipeline range");
        assert!(err.contains("PushConstant"), "{err}");
    }

    #[test]
    fn naga_backend_requires_both_stages() {
        let mut backend = NagaBackend;
        let mut shader = backend.create_shader(ShaderStage::Vertex);
        backend
            .compile_shader(&mut shader, DEFAULT_VERTEX_SHADER)
            .expect("vertex compiles");
        let mut program = backend.create_program();
        backend.attach_shader(&mut program, &shader);
        let err = backend
            .link_program(&mut program)
            .expect_err("fragment stage missing");
        assert!(err.contains("fragment"));
        assert!(program.linked().is_none());
    }
}
