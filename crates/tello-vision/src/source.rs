use anyhow::Result;
use image::RgbImage;

/// Unblocks a `next_frame` call that is parked on I/O, from another thread.
pub struct Interrupter(Box<dyn Fn() + Send + Sync>);

impl Interrupter {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn interrupt(&self) {
        (self.0)()
    }
}

impl std::fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Interrupter")
    }
}

/// A continuous decoded video stream.
pub trait FrameSource: Send {
    /// Native output dimensions (width, height).
    fn dimensions(&self) -> (u32, u32);

    /// Pulls the next decoded frame. `Ok(None)` and `Err` are both hiccups;
    /// the caller retries.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    fn interrupter(&self) -> Option<Interrupter> {
        None
    }
}
