use std::time::Instant;

use tracing::{debug, trace};

use crate::{
    render::SpectrumRenderer,
    timeline::{CancelToken, FrameScheduler, FrameStats, SchedulerState, TickSource},
    PluginBridge, RenderConfig, Result, Surface, SurfaceSize,
};

/// A spectrum renderer mounted on a surface and driven by a frame scheduler.
///
/// Dropping the view tears it down: the scheduler is cancelled first, then
/// the host subscription is released.
#[derive(Debug)]
pub struct SpectrumView<S: Surface> {
    renderer: SpectrumRenderer,
    scheduler: FrameScheduler<S>,
}

impl<S: Surface> SpectrumView<S> {
    pub fn mount(bridge: PluginBridge, config: RenderConfig, surface: S) -> Result<Self> {
        config.validate()?;
        let size = resolve_size(&config, surface.layout_size());
        let fps = config.frames_per_second;

        let mut renderer = SpectrumRenderer::new(bridge, config)?;
        renderer.mount()?;
        let scheduler = FrameScheduler::bind_sized(surface, fps, size);
        debug!(?size, fps, "spectrum view mounted");

        Ok(Self {
            renderer,
            scheduler,
        })
    }

    pub fn start(&mut self, now: Instant) {
        self.scheduler.start(now);
    }

    /// Offers one host refresh tick. Returns whether a frame was painted.
    pub fn tick(&mut self, now: Instant) -> Result<bool> {
        let renderer = &mut self.renderer;
        self.scheduler.on_tick(now, |surface| {
            let summary = renderer.draw(surface)?;
            trace!(points = summary.points, filled = summary.filled, "frame painted");
            Ok(())
        })
    }

    /// Paints from `ticks` until the source ends or the view is cancelled.
    pub fn run<T: TickSource + ?Sized>(&mut self, ticks: &mut T) -> FrameStats {
        let renderer = &mut self.renderer;
        self.scheduler
            .run(ticks, |surface| renderer.draw(surface).map(|_| ()))
    }

    /// Switches to a new frame rate: the host is told and the loop restarts.
    pub fn set_frames_per_second(&mut self, frames_per_second: u32, now: Instant) -> Result<()> {
        self.renderer.set_frames_per_second(frames_per_second)?;
        self.scheduler.set_frames_per_second(frames_per_second, now);
        Ok(())
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.scheduler.cancel_token()
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn stats(&self) -> FrameStats {
        self.scheduler.stats()
    }

    pub fn surface(&self) -> &S {
        self.scheduler.surface()
    }

    pub fn renderer(&self) -> &SpectrumRenderer {
        &self.renderer
    }

    /// Cancels the pending tick, then unsubscribes from the host.
    pub fn unmount(&mut self) {
        self.scheduler.cancel();
        self.renderer.unmount();
    }
}

impl<S: Surface> Drop for SpectrumView<S> {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Explicit dimensions win over the observed layout size.
pub fn resolve_size(config: &RenderConfig, layout: SurfaceSize) -> SurfaceSize {
    SurfaceSize::new(
        config.width.unwrap_or(layout.width),
        config.height.unwrap_or(layout.height),
    )
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{bridge::LoopbackChannel, DrawOp, RecordingSurface};

    fn mount(config: RenderConfig) -> (LoopbackChannel, SpectrumView<RecordingSurface>) {
        let channel = LoopbackChannel::new();
        let bridge = PluginBridge::new(Arc::new(channel.clone()));
        let surface = RecordingSurface::new(SurfaceSize::new(120, 60));
        let view = SpectrumView::mount(bridge, config, surface).unwrap();
        (channel, view)
    }

    #[test]
    fn explicit_dimensions_override_layout() {
        let config = RenderConfig {
            width: Some(300),
            ..Default::default()
        };
        let (_, view) = mount(config);
        assert_eq!(view.surface().size(), SurfaceSize::new(300, 60));
    }

    #[test]
    fn reply_to_frame_n_is_drawn_on_a_later_frame() {
        let (channel, mut view) = mount(RenderConfig::default());
        let t0 = Instant::now();
        view.start(t0);
        channel.take_outbound().unwrap();

        assert!(view.tick(t0 + Duration::from_millis(20)).unwrap());
        assert_eq!(view.surface().last_frame(), &[DrawOp::Clear]);

        // The host answers the request between frames.
        assert_eq!(channel.take_outbound().unwrap().len(), 1);
        channel
            .deliver(r#"{"type":"drawData","data":{"type":"spectrum","data":[[0,0.5],[1,0.5]]}}"#)
            .unwrap();

        assert!(view.tick(t0 + Duration::from_millis(40)).unwrap());
        assert!(matches!(
            view.surface().last_frame(),
            [DrawOp::Clear, DrawOp::Stroke { .. }]
        ));
    }

    #[test]
    fn teardown_cancels_then_unsubscribes() {
        let (channel, mut view) = mount(RenderConfig::default());
        let t0 = Instant::now();
        view.start(t0);
        view.unmount();

        assert_eq!(view.state(), SchedulerState::Cancelled);
        assert_eq!(channel.listener_count().unwrap(), 0);
        assert!(!view.tick(t0 + Duration::from_secs(1)).unwrap());

        view.unmount();
    }

    #[test]
    fn dropping_the_view_releases_the_subscription() {
        let (channel, view) = mount(RenderConfig::default());
        assert_eq!(channel.listener_count().unwrap(), 1);
        drop(view);
        assert_eq!(channel.listener_count().unwrap(), 0);
    }

    #[test]
    fn frame_rate_change_resends_and_retimes() {
        let (channel, mut view) = mount(RenderConfig::default());
        let t0 = Instant::now();
        view.start(t0);
        view.set_frames_per_second(10, t0).unwrap();

        let sent = channel.take_outbound().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(!view.tick(t0 + Duration::from_millis(50)).unwrap());
        assert!(view.tick(t0 + Duration::from_millis(100)).unwrap());
    }

    #[test]
    fn frame_rate_change_retimes_even_when_the_host_is_unreachable() {
        use std::sync::atomic::{AtomicBool, Ordering};

        use crate::{
            bridge::{HostChannel, ListenerId, RawHandler},
            SpectrumViewError,
        };

        #[derive(Default)]
        struct FlakyChannel {
            inner: LoopbackChannel,
            down: AtomicBool,
        }

        impl HostChannel for FlakyChannel {
            fn send(&self, text: String) -> Result<()> {
                if self.down.load(Ordering::SeqCst) {
                    return Err(SpectrumViewError::msg("channel closed"));
                }
                self.inner.send(text)
            }

            fn listen(&self, handler: RawHandler) -> Result<ListenerId> {
                self.inner.listen(handler)
            }

            fn unlisten(&self, id: ListenerId) {
                self.inner.unlisten(id)
            }
        }

        let channel = Arc::new(FlakyChannel::default());
        let bridge = PluginBridge::new(channel.clone());
        let surface = RecordingSurface::new(SurfaceSize::new(120, 60));
        let mut view = SpectrumView::mount(bridge, RenderConfig::default(), surface).unwrap();
        let t0 = Instant::now();
        view.start(t0);

        channel.down.store(true, Ordering::SeqCst);
        view.set_frames_per_second(5, t0).unwrap();

        assert_eq!(view.renderer().config().frames_per_second, 5);
        assert!(!view.tick(t0 + Duration::from_millis(20)).unwrap());
        assert!(view.tick(t0 + Duration::from_millis(200)).unwrap());

        channel.down.store(false, Ordering::SeqCst);
        view.set_frames_per_second(10, t0).unwrap();
        assert_eq!(channel.inner.take_outbound().unwrap().len(), 2);
    }

    #[test]
    fn cancel_token_stops_a_running_view() {
        struct Endless(Instant, u64);
        impl TickSource for Endless {
            fn next_tick(&mut self) -> Option<Instant> {
                self.1 += 1;
                Some(self.0 + Duration::from_millis(16 * self.1))
            }
        }

        let (_, mut view) = mount(RenderConfig::default());
        let t0 = Instant::now();
        view.start(t0);
        let token = view.cancel_token();

        struct Cancelling<'a>(Endless, &'a CancelToken);
        impl TickSource for Cancelling<'_> {
            fn next_tick(&mut self) -> Option<Instant> {
                if self.0 .1 == 100 {
                    self.1.cancel();
                }
                self.0.next_tick()
            }
        }

        let stats = view.run(&mut Cancelling(Endless(t0, 0), &token));
        assert_eq!(view.state(), SchedulerState::Cancelled);
        assert!(stats.ticks <= 101);
        assert!(stats.paints < stats.ticks);
    }
}
