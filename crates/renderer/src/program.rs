use tracing::debug;

use crate::backend::{ProgramBackend, ShaderStage};
use crate::error::ProgramError;

/// Compiles both stages and links them into a program.
///
/// A failing vertex stage stops before the fragment stage is compiled, and
/// linking is only attempted once both stages compiled. Every object created
/// on a failing path is released before the error is returned; on success
/// the shader objects are released and only the program survives.
pub fn build_program<B>(
    backend: &mut B,
    vertex_source: &str,
    fragment_source: &str,
) -> Result<B::Program, ProgramError>
where
    B: ProgramBackend + ?Sized,
{
    let vertex = compile_stage(backend, ShaderStage::Vertex, vertex_source)?;
    let fragment = match compile_stage(backend, ShaderStage::Fragment, fragment_source) {
        Ok(fragment) => fragment,
        Err(err) => {
            backend.delete_shader(vertex);
            return Err(err);
        }
    };

    let mut program = backend.create_program();
    backend.attach_shader(&mut program, &vertex);
    backend.attach_shader(&mut program, &fragment);
    let linked = backend.link_program(&mut program);

    backend.delete_shader(vertex);
    backend.delete_shader(fragment);

    match linked {
        Ok(()) => {
            debug!("shader program linked");
            Ok(program)
        }
        Err(log) => {
            backend.delete_program(program);
            Err(ProgramError::Link { log })
        }
    }
}

fn compile_stage<B>(
    backend: &mut B,
    stage: ShaderStage,
    source: &str,
) -> Result<B::Shader, ProgramError>
where
    B: ProgramBackend + ?Sized,
{
    let mut shader = backend.create_shader(stage);
    match backend.compile_shader(&mut shader, source) {
        Ok(()) => Ok(shader),
        Err(log) => {
            backend.delete_shader(shader);
            Err(ProgramError::Compile { stage, log })
        }
    }
}
