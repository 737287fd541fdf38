//! wgpu implementation of the GL-style backend traits.
//!
//! - `context` owns the wgpu instance, device and surface and reconfigures
//!   the swapchain when the backing store changes size.
//! - `pipeline` turns linked programs into shader modules and builds render
//!   pipelines on demand, keyed by the vertex layout and draw mode in use.
//! - `uniforms` stages std140 block contents on the CPU and writes changed
//!   blocks through the queue before each draw.
//! - `state` glues everything together behind `WgpuGpu`.

mod context;
mod pipeline;
mod state;
mod uniforms;

pub use state::WgpuGpu;
