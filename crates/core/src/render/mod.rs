use std::sync::{Arc, Mutex};

use tracing::{debug, trace, warn};

use crate::{
    bridge::{PluginBridge, Subscription},
    mapping::{fill_outline, project},
    protocol::{DrawData, Message, SampleBuffer},
    RenderConfig, Result, SpectrumViewError, Surface,
};

const LINE_WIDTH: f32 = 1.0;

/// The single shared cell holding the most recent sample buffer.
///
/// Writers swap in a whole new buffer; readers get the buffer that was
/// current when they looked. Older buffers are simply dropped.
#[derive(Clone, Default)]
pub struct LatestBuffer {
    slot: Arc<Mutex<Arc<SampleBuffer>>>,
}

impl LatestBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, buffer: SampleBuffer) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| SpectrumViewError::msg("sample buffer has been poisoned"))?;
        *slot = Arc::new(buffer);
        Ok(())
    }

    pub fn load(&self) -> Result<Arc<SampleBuffer>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| SpectrumViewError::msg("sample buffer has been poisoned"))?;
        Ok(Arc::clone(&slot))
    }
}

impl std::fmt::Debug for LatestBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatestBuffer").finish_non_exhaustive()
    }
}

/// What one call to [`SpectrumRenderer::draw`] put on the surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSummary {
    pub points: usize,
    pub filled: bool,
}

/// Turns the latest host buffer into one frame and keeps the buffer fresh.
#[derive(Debug)]
pub struct SpectrumRenderer {
    config: RenderConfig,
    bridge: PluginBridge,
    latest: LatestBuffer,
    subscription: Option<Subscription>,
    announced_fps: Option<u32>,
    shape_mismatch: bool,
}

impl SpectrumRenderer {
    pub fn new(bridge: PluginBridge, config: RenderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            bridge,
            latest: LatestBuffer::new(),
            subscription: None,
            announced_fps: None,
            shape_mismatch: false,
        })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn latest(&self) -> &LatestBuffer {
        &self.latest
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }

    /// Subscribes to spectrum data and tells the host the frame rate.
    ///
    /// Mounting twice keeps the existing subscription.
    pub fn mount(&mut self) -> Result<()> {
        if self.subscription.is_none() {
            let latest = self.latest.clone();
            let subscription = self.bridge.subscribe(move |message| {
                if let Message::DrawData(DrawData::Spectrum(buffer)) = message {
                    if let Err(err) = latest.replace(buffer) {
                        warn!(%err, "could not store spectrum data");
                    }
                }
            })?;
            debug!(listener = subscription.id().0, "spectrum renderer mounted");
            self.subscription = Some(subscription);
        }
        self.announce_fps()
    }

    /// Releases the host subscription. Safe to call more than once.
    pub fn unmount(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
            debug!("spectrum renderer unmounted");
        }
        self.announced_fps = None;
    }

    /// Changes the frame rate and, when mounted, re-sends it to the host.
    ///
    /// A failed send is logged and retried on the next change or mount; the
    /// new rate stays in effect locally either way.
    pub fn set_frames_per_second(&mut self, frames_per_second: u32) -> Result<()> {
        if frames_per_second == 0 {
            return Err(SpectrumViewError::InvalidConfig(
                "framesPerSecond must be greater than zero",
            ));
        }
        self.config.frames_per_second = frames_per_second;
        if self.is_mounted() {
            if let Err(err) = self.announce_fps() {
                warn!(%err, fps = frames_per_second, "could not send the frame rate");
            }
        }
        Ok(())
    }

    fn announce_fps(&mut self) -> Result<()> {
        let fps = self.config.frames_per_second;
        if self.announced_fps == Some(fps) {
            return Ok(());
        }
        self.bridge.publish(&Message::fps(fps))?;
        self.announced_fps = Some(fps);
        Ok(())
    }

    /// Paints one frame from whatever buffer is current.
    ///
    /// The request for the next buffer goes out first; its answer, if any,
    /// lands in the cell for a later frame.
    pub fn draw<S: Surface + ?Sized>(&mut self, surface: &mut S) -> Result<FrameSummary> {
        if let Err(err) = self.bridge.publish(&Message::spectrum_request()) {
            warn!(%err, "could not request spectrum data");
        }

        let buffer = self.latest.load()?;
        surface.clear();

        let size = surface.size();
        let Some(curve) = project(
            &buffer,
            self.config.mapping,
            size,
            self.config.anti_aliasing,
        ) else {
            if !self.shape_mismatch {
                warn!(
                    shape = buffer.shape(),
                    mapping = ?self.config.mapping,
                    "spectrum shape does not match the mapping mode; drawing nothing"
                );
                self.shape_mismatch = true;
            }
            return Ok(FrameSummary::default());
        };
        self.shape_mismatch = false;

        if curve.is_empty() {
            trace!("no spectrum data yet");
            return Ok(FrameSummary::default());
        }

        let color = self.config.stroke_style;
        if self.config.fill {
            surface.fill_path(&fill_outline(&curve, size), color);
        }
        surface.stroke_path(&curve, color, LINE_WIDTH);

        Ok(FrameSummary {
            points: curve.len(),
            filled: self.config.fill,
        })
    }
}

impl Drop for SpectrumRenderer {
    fn drop(&mut self) {
        self.unmount();
    }
}
