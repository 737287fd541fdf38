use tracing::debug;
use winit::dpi::{LogicalSize, PhysicalSize};

use crate::backend::{Drawable, GpuContext, Viewport};

/// Products closer than this to an integer are treated as that integer.
const SNAP_EPSILON: f64 = 1e-6;

/// Read-only view of the window hosting the drawable.
pub trait WindowMetrics {
    /// Current window size in logical (CSS-style) units.
    fn logical_size(&self) -> LogicalSize<f64>;
    /// Physical pixels per logical unit, if the platform reports one.
    fn pixel_ratio(&self) -> Option<f64>;
}

/// Backing-store size for a logical window size at the given pixel ratio.
///
/// Each axis is `floor(logical * ratio)`; a missing or non-positive ratio
/// counts as 1 and negative sizes clamp to 0.
pub fn target_dimensions(logical: LogicalSize<f64>, pixel_ratio: Option<f64>) -> PhysicalSize<u32> {
    let ratio = pixel_ratio
        .filter(|ratio| ratio.is_finite() && *ratio > 0.0)
        .unwrap_or(1.0);
    PhysicalSize::new(
        device_pixels(logical.width, ratio),
        device_pixels(logical.height, ratio),
    )
}

fn device_pixels(logical: f64, ratio: f64) -> u32 {
    let scaled = logical * ratio;
    if !scaled.is_finite() || scaled <= 0.0 {
        return 0;
    }
    let nearest = scaled.round();
    let snapped = if (scaled - nearest).abs() < SNAP_EPSILON {
        nearest
    } else {
        scaled.floor()
    };
    snapped.min(f64::from(u32::MAX)) as u32
}

/// Keeps a drawable's backing store and viewport in step with its window.
///
/// This is the render context handed to the frame driver: it owns the
/// drawable (and through it the GPU context) plus the window metrics.
pub struct SurfaceManager<D, W> {
    drawable: D,
    window: W,
}

impl<D, W> SurfaceManager<D, W>
where
    D: Drawable,
    W: WindowMetrics,
{
    pub fn new(drawable: D, window: W) -> Self {
        Self { drawable, window }
    }

    /// Resizes the backing store and viewport if the window's device-pixel
    /// size changed. Returns the new size when a resize happened.
    pub fn reconcile_dimensions(&mut self) -> Option<PhysicalSize<u32>> {
        let target = target_dimensions(self.window.logical_size(), self.window.pixel_ratio());
        let current = self.drawable.backing_size();
        if current == target {
            return None;
        }

        debug!(
            from_width = current.width,
            from_height = current.height,
            width = target.width,
            height = target.height,
            "resizing backing store"
        );
        self.drawable.set_backing_size(target);
        self.drawable.gpu().viewport(Viewport::full(target));
        Some(target)
    }

    pub fn backing_size(&self) -> PhysicalSize<u32> {
        self.drawable.backing_size()
    }

    pub fn gpu(&mut self) -> &mut D::Gpu {
        self.drawable.gpu()
    }

    pub fn drawable(&self) -> &D {
        &self.drawable
    }

    pub fn drawable_mut(&mut self) -> &mut D {
        &mut self.drawable
    }

    pub fn window_mut(&mut self) -> &mut W {
        &mut self.window
    }
}
