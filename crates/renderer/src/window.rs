use std::sync::Arc;

use tracing::{debug, error, info, warn};
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::{Window, WindowBuilder};

use crate::backend::DrawError;
use crate::error::{RunError, SetupError};
use crate::frame::FrameDriver;
use crate::gpu::WgpuGpu;
use crate::program::build_program;
use crate::runtime::{FrameScheduler, SystemClock};
use crate::surface::{target_dimensions, SurfaceManager, WindowMetrics};
use crate::types::RendererConfig;

/// Window metrics read straight from winit.
pub(crate) struct WinitMetrics {
    window: Arc<Window>,
}

impl WindowMetrics for WinitMetrics {
    fn logical_size(&self) -> LogicalSize<f64> {
        self.window
            .inner_size()
            .to_logical(self.window.scale_factor())
    }

    fn pixel_ratio(&self) -> Option<f64> {
        Some(self.window.scale_factor())
    }
}

/// Schedules frames through winit redraw requests, which coalesce and are
/// delivered before the next repaint.
pub(crate) struct RedrawScheduler {
    window: Arc<Window>,
}

impl FrameScheduler for RedrawScheduler {
    fn request_frame(&mut self) {
        self.window.request_redraw();
    }
}

fn unsupported(context: &str, err: impl std::fmt::Display) -> SetupError {
    SetupError::UnsupportedContext {
        reason: format!("{context}: {err}"),
    }
}

/// Opens the window, builds the program and drives frames until the window
/// closes. Setup failures return before the event loop starts.
pub(crate) fn run(config: &RendererConfig) -> Result<(), RunError> {
    let event_loop =
        EventLoop::new().map_err(|err| unsupported("failed to initialise event loop", err))?;
    let (width, height) = config.window_size;
    let window = WindowBuilder::new()
        .with_title(config.title.as_str())
        .with_inner_size(LogicalSize::new(width, height))
        .build(&event_loop)
        .map_err(|err| unsupported("failed to create window", err))?;
    let window = Arc::new(window);

    let metrics = WinitMetrics {
        window: Arc::clone(&window),
    };
    let initial = target_dimensions(metrics.logical_size(), metrics.pixel_ratio());
    let gpu = WgpuGpu::new(Arc::clone(&window), initial, config.power)?;
    let mut surface = SurfaceManager::new(gpu, metrics);

    let program = build_program(
        surface.gpu(),
        &config.sources.vertex,
        &config.sources.fragment,
    )
    .map_err(SetupError::from)?;

    let mut scheduler = RedrawScheduler {
        window: Arc::clone(&window),
    };
    let mut driver: FrameDriver<WgpuGpu, SystemClock> =
        FrameDriver::start(&mut surface, program, SystemClock, &mut scheduler);
    info!(
        width = initial.width,
        height = initial.height,
        scale_factor = window.scale_factor(),
        "render loop started"
    );

    event_loop.set_control_flow(ControlFlow::Wait);
    let mut outcome = Ok(());
    let window_id = window.id();
    let run_result = event_loop.run(|event, elwt| {
        let Event::WindowEvent {
            window_id: target,
            event,
        } = event
        else {
            return;
        };
        if target != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                debug!(frames = driver.frame_count(), "window closed");
                elwt.exit();
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                surface.reconcile_dimensions();
            }
            WindowEvent::RedrawRequested => {
                let Err(err) = driver.render_frame(&mut surface, &mut scheduler) else {
                    return;
                };
                match err {
                    DrawError::SurfaceLost => {
                        surface.drawable_mut().recover_surface();
                        scheduler.request_frame();
                    }
                    DrawError::Timeout => {
                        warn!("surface timeout; retrying next frame");
                        scheduler.request_frame();
                    }
                    DrawError::OutOfMemory => {
                        error!("surface out of memory; stopping render loop");
                        outcome = Err(RunError::Draw(err));
                        elwt.exit();
                    }
                    DrawError::Other(ref message) => {
                        warn!(%message, "surface error; retrying next frame");
                        scheduler.request_frame();
                    }
                }
            }
            _ => {}
        }
    });

    if let Err(err) = run_result {
        return Err(RunError::EventLoop(err.to_string()));
    }
    outcome
}
