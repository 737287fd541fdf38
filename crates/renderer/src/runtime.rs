use std::time::Instant;

/// Source of monotonic timestamps for the frame loop.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Clock backed by the system monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Host capability to run the frame driver again before the next repaint.
///
/// A request is a one-shot: the host invokes `render_frame` once per
/// request, and repeated requests before that invocation coalesce.
pub trait FrameScheduler {
    fn request_frame(&mut self);
}

impl<S: FrameScheduler + ?Sized> FrameScheduler for &mut S {
    fn request_frame(&mut self) {
        (**self).request_frame();
    }
}
