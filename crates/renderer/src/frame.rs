use std::time::{Duration, Instant};

use tracing::{debug, warn};
use winit::dpi::PhysicalSize;

use crate::backend::{AttribLayout, DrawError, DrawMode, Drawable, GpuContext};
use crate::runtime::{Clock, FrameScheduler};
use crate::surface::{SurfaceManager, WindowMetrics};

/// Vertex attribute carrying clip-space positions.
pub const POSITION_ATTRIBUTE: &str = "a_position";
/// `vec2` uniform receiving the backing-store size in device pixels.
pub const RESOLUTION_UNIFORM: &str = "u_resolution";
/// `float` uniform receiving seconds since the first frame.
pub const TIME_UNIFORM: &str = "u_time";

/// Two triangles covering clip space from (-1, -1) to (1, 1).
pub const QUAD_VERTICES: [[f32; 2]; 6] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [-1.0, 1.0],
    [-1.0, 1.0],
    [1.0, -1.0],
    [1.0, 1.0],
];

const QUAD_VERTEX_COUNT: u32 = QUAD_VERTICES.len() as u32;
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Uniform values uploaded for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformSet {
    pub resolution: PhysicalSize<u32>,
    pub elapsed_time: f32,
}

struct Locations<U> {
    position: Option<u32>,
    resolution: Option<U>,
    time: Option<U>,
}

/// Owns the program and quad and draws one frame per scheduler callback.
pub struct FrameDriver<G: GpuContext, C> {
    program: G::Program,
    geometry: G::Buffer,
    locations: Locations<G::UniformLocation>,
    clock: C,
    started_at: Instant,
    frame_count: u64,
    last_stats: Instant,
    frames_since_stats: u32,
}

impl<G, C> FrameDriver<G, C>
where
    G: GpuContext,
    C: Clock,
{
    /// Uploads the quad, resolves attribute and uniform locations, records
    /// the start time, and asks the scheduler for the first frame.
    pub fn start<D, W, S>(
        surface: &mut SurfaceManager<D, W>,
        program: G::Program,
        clock: C,
        scheduler: &mut S,
    ) -> Self
    where
        D: Drawable<Gpu = G>,
        W: WindowMetrics,
        S: FrameScheduler + ?Sized,
    {
        let gpu = surface.gpu();
        let geometry = gpu.create_vertex_buffer(bytemuck::cast_slice(&QUAD_VERTICES));
        let locations = Locations {
            position: gpu.attrib_location(&program, POSITION_ATTRIBUTE),
            resolution: gpu.uniform_location(&program, RESOLUTION_UNIFORM),
            time: gpu.uniform_location(&program, TIME_UNIFORM),
        };

        if locations.position.is_none() {
            warn!(
                attribute = POSITION_ATTRIBUTE,
                "program has no position attribute; the quad will not be bound"
            );
        }
        for (name, found) in [
            (RESOLUTION_UNIFORM, locations.resolution.is_some()),
            (TIME_UNIFORM, locations.time.is_some()),
        ] {
            if !found {
                warn!(uniform = name, "program does not use uniform; updates are skipped");
            }
        }

        let now = clock.now();
        let driver = Self {
            program,
            geometry,
            locations,
            clock,
            started_at: now,
            frame_count: 0,
            last_stats: now,
            frames_since_stats: 0,
        };
        scheduler.request_frame();
        driver
    }

    /// Draws one frame and requests the next one.
    ///
    /// On a draw error the next frame is not requested; the host decides
    /// whether to recover and reschedule.
    pub fn render_frame<D, W, S>(
        &mut self,
        surface: &mut SurfaceManager<D, W>,
        scheduler: &mut S,
    ) -> Result<UniformSet, DrawError>
    where
        D: Drawable<Gpu = G>,
        W: WindowMetrics,
        S: FrameScheduler + ?Sized,
    {
        surface.reconcile_dimensions();

        let now = self.clock.now();
        if self.frame_count == 0 {
            self.started_at = now;
            self.last_stats = now;
        }
        let uniforms = UniformSet {
            resolution: surface.backing_size(),
            elapsed_time: now.saturating_duration_since(self.started_at).as_secs_f32(),
        };

        let gpu = surface.gpu();
        gpu.use_program(&self.program);
        gpu.bind_vertex_buffer(&self.geometry);
        if let Some(position) = self.locations.position {
            gpu.vertex_attrib_pointer(position, AttribLayout::packed_floats(2));
        }
        if let Some(location) = &self.locations.resolution {
            gpu.uniform_2f(
                location,
                uniforms.resolution.width as f32,
                uniforms.resolution.height as f32,
            );
        }
        if let Some(location) = &self.locations.time {
            gpu.uniform_1f(location, uniforms.elapsed_time);
        }
        gpu.draw_arrays(DrawMode::Triangles, 0, QUAD_VERTEX_COUNT)?;

        self.frame_count += 1;
        self.log_stats(now, &uniforms);
        scheduler.request_frame();
        Ok(uniforms)
    }

    /// Frames drawn since [`FrameDriver::start`].
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn log_stats(&mut self, now: Instant, uniforms: &UniformSet) {
        self.frames_since_stats += 1;
        let since = now.saturating_duration_since(self.last_stats);
        if since >= STATS_INTERVAL {
            let fps = self.frames_since_stats as f32 / since.as_secs_f32();
            debug!(
                fps = fps.round(),
                frame_count = self.frame_count,
                time = uniforms.elapsed_time,
                width = uniforms.resolution.width,
                height = uniforms.resolution.height,
                "render stats"
            );
            self.frames_since_stats = 0;
            self.last_stats = now;
        }
    }
}
