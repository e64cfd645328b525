//! Preview render target.

use media_types::RawFrame;

/// Consumer of preview frames.
///
/// The target owns every frame it is handed and releases it by dropping or
/// closing it. Rendering is fire-and-forget: nothing is awaited.
pub trait RenderTarget: Send {
    fn render(&mut self, frame: RawFrame);
}

impl<F> RenderTarget for F
where
    F: FnMut(RawFrame) + Send,
{
    fn render(&mut self, frame: RawFrame) {
        self(frame)
    }
}

/// Render target that releases every frame immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardTarget;

impl RenderTarget for DiscardTarget {
    fn render(&mut self, frame: RawFrame) {
        frame.close();
    }
}
