//! `backdrop check`: compile and link offline, then print the interface the
//! frame loop will bind against.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use renderer::compile::LinkedProgram;
use renderer::frame::{POSITION_ATTRIBUTE, RESOLUTION_UNIFORM, TIME_UNIFORM};
use renderer::{build_program, NagaBackend};

use crate::cli::CheckArgs;
use crate::run::load_sources;

pub fn run_check(args: &CheckArgs) -> Result<()> {
    let sources = load_sources(&args.shaders)?;
    let program = build_program(&mut NagaBackend, &sources.vertex, &sources.fragment)
        .context("shader program check failed")?;
    let linked = program
        .linked()
        .context("program reported success without link output")?;
    print!("{}", describe_interface(linked));
    Ok(())
}

fn type_name(components: u8) -> String {
    match components {
        1 => "float".to_string(),
        n => format!("vec{n}"),
    }
}

pub fn describe_interface(program: &LinkedProgram) -> String {
    let mut out = String::from("program linked\n");

    out.push_str("attributes:\n");
    if program.attributes().is_empty() {
        out.push_str("  (none)\n");
    }
    for attribute in program.attributes() {
        let _ = writeln!(
            out,
            "  {} location={} {}",
            attribute.name,
            attribute.location,
            type_name(attribute.components)
        );
    }

    out.push_str("uniform blocks:\n");
    if program.uniform_blocks().is_empty() {
        out.push_str("  (none)\n");
    }
    for block in program.uniform_blocks() {
        let _ = writeln!(
            out,
            "  set={} binding={} size={}",
            block.group, block.binding, block.size
        );
        for member in &block.members {
            let _ = writeln!(out, "    {} offset={}", member.name, member.offset);
        }
    }

    let unused: Vec<&str> = [RESOLUTION_UNIFORM, TIME_UNIFORM]
        .into_iter()
        .filter(|name| program.uniform(name).is_none())
        .chain(
            program
                .attribute(POSITION_ATTRIBUTE)
                .is_none()
                .then_some(POSITION_ATTRIBUTE),
        )
        .collect();
    if !unused.is_empty() {
        let _ = writeln!(out, "not used by this program: {}", unused.join(", "));
    }
    out
}
