//! Embedded shader pair rendered when no override is supplied.
//!
//! Sources are Vulkan-flavoured GLSL 450: wgpu's GLSL frontend has no loose
//! uniforms, so `u_resolution` and `u_time` live in a std140 block at set 0,
//! binding 0.

/// Passes the quad through to clip space and derives 0..1 coordinates.
pub const DEFAULT_VERTEX_SHADER: &str = r"#version 450

layout(location = 0) in vec2 a_position;
layout(location = 0) out vec2 v_uv;

void main() {
    v_uv = (a_position + vec2(1.0)) * 0.5;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

/// Slowly cycling cosine gradient.
pub const DEFAULT_FRAGMENT_SHADER: &str = r"#version 450

layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 frag_color;

layout(std140, set = 0, binding = 0) uniform Params {
    vec2 u_resolution;
    float u_time;
} params;

void main() {
    vec2 uv = v_uv;
    float t = params.u_time * 0.2;
    vec3 phase = vec3(uv.x + t, uv.y - t, t) * 6.28318 + vec3(0.0, 2.0, 4.0);
    vec3 color = vec3(0.5) + vec3(0.5) * cos(phase);
    frag_color = vec4(color, 1.0);
}
";
