//! Render pipeline abstraction.
//!
//! Audio and video renderers are independent collaborators consuming
//! timestamped buffers. The video renderer can be destroyed and recreated
//! mid-session (the "close window" policy), so video rendering goes through
//! a shared slot: the controller writes it, the media path reads it.

use parking_lot::RwLock;
use thiserror::Error;

use aircast_core::config::VideoConfig;
use aircast_core::media::AudioCodec;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer failure: {0}")]
    Backend(String),
}

/// Audio rendering surface. Dropped to destroy.
pub trait AudioRenderer: Send + Sync {
    /// Begin playback for the negotiated codec.
    fn start(&self, codec: AudioCodec) -> Result<(), RenderError>;

    fn render(&self, data: &[u8], seq: u16, ts_us: u64) -> Result<(), RenderError>;

    fn flush(&self);

    fn set_volume(&self, volume: f32);

    fn stop(&self);
}

/// Video rendering surface. Dropped to destroy; recreated through a
/// [`VideoRendererFactory`].
pub trait VideoRenderer: Send + Sync {
    fn render(&self, data: &[u8], nal_count: u32, ts_us: u64) -> Result<(), RenderError>;

    fn flush(&self);

    /// Source and scaled dimensions reported by the sender.
    fn report_size(&self, source_width: f32, source_height: f32, width: f32, height: f32);
}

/// Creates video render surfaces; flip/rotate selection comes from the
/// video configuration.
pub trait VideoRendererFactory: Send + Sync {
    fn create(&self, config: &VideoConfig) -> Result<Box<dyn VideoRenderer>, RenderError>;
}

/// The shared video renderer slot.
///
/// Only the controller task replaces the renderer; the buffer path reads
/// it. An empty slot silently drops frames (video disabled, or a surface
/// recreation in flight).
#[derive(Default)]
pub struct VideoSlot {
    inner: RwLock<Option<Box<dyn VideoRenderer>>>,
}

impl VideoSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current renderer, dropping (destroying) the old one.
    pub fn replace(&self, renderer: Option<Box<dyn VideoRenderer>>) {
        *self.inner.write() = renderer;
    }

    pub fn is_present(&self) -> bool {
        self.inner.read().is_some()
    }

    pub fn render(&self, data: &[u8], nal_count: u32, ts_us: u64) -> Result<(), RenderError> {
        if let Some(renderer) = self.inner.read().as_ref() {
            renderer.render(data, nal_count, ts_us)?;
        }
        Ok(())
    }

    pub fn flush(&self) {
        if let Some(renderer) = self.inner.read().as_ref() {
            renderer.flush();
        }
    }

    pub fn report_size(&self, source_width: f32, source_height: f32, width: f32, height: f32) {
        if let Some(renderer) = self.inner.read().as_ref() {
            renderer.report_size(source_width, source_height, width, height);
        }
    }
}
