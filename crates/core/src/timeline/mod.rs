//! Frame-rate gated repaint loop.
//!
//! The host's refresh facility is modelled as a [`TickSource`]. Every tick is
//! offered to a [`FrameGate`] which decides whether enough time has passed to
//! paint, so the paint cadence follows the configured frame rate rather than
//! the display's.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tracing::{debug, trace, warn};

use crate::{Result, Surface, SurfaceSize};

/// Throttles a fast tick stream down to a target paint rate.
#[derive(Debug, Clone)]
pub struct FrameGate {
    interval: Duration,
    last_paint: Instant,
}

impl FrameGate {
    pub fn new(frames_per_second: u32, start: Instant) -> Self {
        Self {
            interval: frame_interval(frames_per_second),
            last_paint: start,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` when a paint is due at `now`.
    ///
    /// On a paint the reference time moves to `now` minus the overshoot past
    /// the interval, which keeps the long-run average on target when ticks
    /// jitter.
    pub fn poll(&mut self, now: Instant) -> bool {
        let delta = now.saturating_duration_since(self.last_paint);
        if delta < self.interval {
            return false;
        }
        let overshoot = duration_rem(delta, self.interval);
        self.last_paint = now.checked_sub(overshoot).unwrap_or(now);
        true
    }
}

/// `1s / fps`, never zero.
pub fn frame_interval(frames_per_second: u32) -> Duration {
    let fps = u64::from(frames_per_second.max(1));
    Duration::from_nanos(1_000_000_000 / fps).max(Duration::from_nanos(1))
}

fn duration_rem(value: Duration, modulus: Duration) -> Duration {
    let nanos = value.as_nanos() % modulus.as_nanos();
    Duration::from_nanos(nanos as u64)
}

/// Something that wakes the loop once per display refresh.
pub trait TickSource {
    /// Waits for the next refresh and returns its timestamp, or `None` once
    /// the source has ended.
    fn next_tick(&mut self) -> Option<Instant>;
}

/// Sleeps between ticks at a fixed refresh rate.
#[derive(Debug, Clone)]
pub struct IntervalTicks {
    period: Duration,
    next: Instant,
    deadline: Option<Instant>,
}

impl IntervalTicks {
    pub fn new(refresh_hz: u32) -> Self {
        let period = frame_interval(refresh_hz);
        Self {
            period,
            next: Instant::now() + period,
            deadline: None,
        }
    }

    /// Ends the source once `duration` has elapsed from now.
    pub fn stop_after(mut self, duration: Duration) -> Self {
        self.deadline = Some(Instant::now() + duration);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl TickSource for IntervalTicks {
    fn next_tick(&mut self) -> Option<Instant> {
        if let Some(deadline) = self.deadline {
            if self.next > deadline {
                return None;
            }
        }

        let wait = self.next.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }

        let now = Instant::now();
        self.next += self.period;
        if self.next <= now {
            // Fell behind; resume from the present instead of bursting.
            self.next = now + self.period;
        }
        Some(now)
    }
}

/// Shared stop flag for a running scheduler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scheduled,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub ticks: u64,
    pub paints: u64,
}

/// Drives a paint callback against a bound surface at a bounded rate.
///
/// The scheduler knows nothing about what is painted.
#[derive(Debug)]
pub struct FrameScheduler<S: Surface> {
    surface: S,
    frames_per_second: u32,
    gate: Option<FrameGate>,
    state: SchedulerState,
    token: CancelToken,
    stats: FrameStats,
}

impl<S: Surface> FrameScheduler<S> {
    /// Binds to `surface`, sizing its backing store from the layout box.
    pub fn bind(surface: S, frames_per_second: u32) -> Self {
        let size = surface.layout_size();
        Self::bind_sized(surface, frames_per_second, size)
    }

    /// Binds to `surface` with an explicit backing store size.
    pub fn bind_sized(mut surface: S, frames_per_second: u32, size: SurfaceSize) -> Self {
        if size.is_empty() {
            warn!(?size, "binding to an empty surface; frames will be skipped");
        }
        surface.resize(size);
        Self {
            surface,
            frames_per_second: frames_per_second.max(1),
            gate: None,
            state: SchedulerState::Idle,
            token: CancelToken::new(),
            stats: FrameStats::default(),
        }
    }

    /// Arms the loop. The first paint is due one interval after `now`.
    pub fn start(&mut self, now: Instant) {
        if self.state != SchedulerState::Idle {
            return;
        }
        self.gate = Some(FrameGate::new(self.frames_per_second, now));
        self.state = SchedulerState::Scheduled;
        debug!(fps = self.frames_per_second, "frame scheduler started");
    }

    /// Re-establishes the interval for a new frame rate, restarting the gate
    /// at `now`.
    pub fn set_frames_per_second(&mut self, frames_per_second: u32, now: Instant) {
        self.frames_per_second = frames_per_second.max(1);
        if self.state == SchedulerState::Scheduled {
            self.gate = Some(FrameGate::new(self.frames_per_second, now));
            debug!(fps = self.frames_per_second, "frame scheduler restarted");
        }
    }

    /// Offers one host tick. Returns whether `paint` ran.
    pub fn on_tick<F>(&mut self, now: Instant, paint: F) -> Result<bool>
    where
        F: FnOnce(&mut S) -> Result<()>,
    {
        if self.token.is_cancelled() {
            self.state = SchedulerState::Cancelled;
        }
        if self.state != SchedulerState::Scheduled {
            return Ok(false);
        }
        let Some(gate) = self.gate.as_mut() else {
            return Ok(false);
        };

        self.stats.ticks += 1;
        if !gate.poll(now) {
            return Ok(false);
        }
        if self.surface.size().is_empty() {
            trace!("surface has no area; skipping paint");
            return Ok(false);
        }

        self.stats.paints += 1;
        paint(&mut self.surface)?;
        Ok(true)
    }

    /// Runs until cancelled or until `ticks` ends, starting the loop first if
    /// it is still idle. Paint failures are logged and the loop keeps going.
    pub fn run<T, F>(&mut self, ticks: &mut T, mut paint: F) -> FrameStats
    where
        T: TickSource + ?Sized,
        F: FnMut(&mut S) -> Result<()>,
    {
        self.start(Instant::now());
        while self.state == SchedulerState::Scheduled && !self.token.is_cancelled() {
            let Some(now) = ticks.next_tick() else {
                break;
            };
            if let Err(err) = self.on_tick(now, &mut paint) {
                warn!(%err, "paint failed");
            }
        }
        self.stats
    }

    /// Stops the loop for good; no paint happens after this returns.
    pub fn cancel(&mut self) {
        self.token.cancel();
        if self.state != SchedulerState::Cancelled {
            self.state = SchedulerState::Cancelled;
            debug!(
                ticks = self.stats.ticks,
                paints = self.stats.paints,
                "frame scheduler cancelled"
            );
        }
    }

    /// Token that cancels this scheduler from elsewhere.
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn frames_per_second(&self) -> u32 {
        self.frames_per_second
    }

    pub fn interval(&self) -> Duration {
        frame_interval(self.frames_per_second)
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RecordingSurface, SpectrumViewError};

    fn scheduler(fps: u32) -> FrameScheduler<RecordingSurface> {
        FrameScheduler::bind(RecordingSurface::new(SurfaceSize::new(100, 50)), fps)
    }

    /// Replays a fixed list of timestamps.
    struct ScriptedTicks(std::vec::IntoIter<Instant>);

    impl TickSource for ScriptedTicks {
        fn next_tick(&mut self) -> Option<Instant> {
            self.0.next()
        }
    }

    #[test]
    fn interval_is_never_zero() {
        assert_eq!(frame_interval(50), Duration::from_millis(20));
        assert_eq!(frame_interval(0), Duration::from_secs(1));
        assert!(frame_interval(u32::MAX) > Duration::ZERO);
    }

    #[test]
    fn gate_keeps_phase_after_a_late_tick() {
        let t0 = Instant::now();
        let mut gate = FrameGate::new(50, t0);

        assert!(!gate.poll(t0 + Duration::from_millis(19)));
        assert!(gate.poll(t0 + Duration::from_millis(27)));
        // Reference moved to 20ms, not 27ms, so 40ms is due.
        assert!(gate.poll(t0 + Duration::from_millis(40)));
        assert!(!gate.poll(t0 + Duration::from_millis(45)));
    }

    #[test]
    fn gates_sixty_hertz_ticks_down_to_fifty() {
        let t0 = Instant::now();
        let mut scheduler = scheduler(50);
        scheduler.start(t0);

        let mut paints = 0;
        let mut ticks = 0;
        for i in 1..=62u64 {
            ticks += 1;
            let painted = scheduler
                .on_tick(t0 + Duration::from_millis(16 * i), |_| Ok(()))
                .unwrap();
            if painted {
                paints += 1;
            }
        }

        assert!(paints < ticks);
        assert!((48..=50).contains(&paints), "painted {paints} times");
        assert_eq!(scheduler.stats().ticks, 62);
    }

    #[test]
    fn binds_surface_to_layout_size_once() {
        let scheduler = scheduler(30);
        assert_eq!(scheduler.surface().size(), SurfaceSize::new(100, 50));
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[test]
    fn idle_scheduler_does_not_paint() {
        let mut scheduler = scheduler(30);
        let painted = scheduler
            .on_tick(Instant::now() + Duration::from_secs(1), |_| Ok(()))
            .unwrap();
        assert!(!painted);
    }

    #[test]
    fn no_paint_after_cancel() {
        let t0 = Instant::now();
        let mut scheduler = scheduler(10);
        scheduler.start(t0);
        let token = scheduler.cancel_token();
        token.cancel();

        let painted = scheduler
            .on_tick(t0 + Duration::from_secs(5), |_| panic!("painted after cancel"))
            .unwrap();
        assert!(!painted);
        assert_eq!(scheduler.state(), SchedulerState::Cancelled);

        // Cancelled is terminal.
        scheduler.start(t0);
        assert_eq!(scheduler.state(), SchedulerState::Cancelled);
    }

    #[test]
    fn empty_surface_skips_paint_without_failing() {
        let t0 = Instant::now();
        let mut scheduler =
            FrameScheduler::bind(RecordingSurface::new(SurfaceSize::new(0, 40)), 25);
        scheduler.start(t0);

        let painted = scheduler
            .on_tick(t0 + Duration::from_secs(1), |_| panic!("painted an empty surface"))
            .unwrap();
        assert!(!painted);
    }

    #[test]
    fn changing_frame_rate_restarts_the_gate() {
        let t0 = Instant::now();
        let mut scheduler = scheduler(10);
        scheduler.start(t0);

        let t1 = t0 + Duration::from_millis(50);
        scheduler.set_frames_per_second(100, t1);
        assert_eq!(scheduler.interval(), Duration::from_millis(10));
        assert!(!scheduler.on_tick(t1 + Duration::from_millis(5), |_| Ok(())).unwrap());
        assert!(scheduler.on_tick(t1 + Duration::from_millis(10), |_| Ok(())).unwrap());

        scheduler.set_frames_per_second(0, t1);
        assert!(scheduler.interval() > Duration::ZERO);
    }

    #[test]
    fn run_survives_paint_errors_and_stops_with_the_source() {
        let t0 = Instant::now();
        let stamps: Vec<Instant> = (1..=10)
            .map(|i| t0 + Duration::from_secs(i))
            .collect();
        let mut ticks = ScriptedTicks(stamps.into_iter());
        let mut scheduler = scheduler(1);
        scheduler.start(t0);

        let mut calls = 0;
        let stats = scheduler.run(&mut ticks, |_| {
            calls += 1;
            Err(SpectrumViewError::msg("boom"))
        });

        assert_eq!(stats.ticks, 10);
        assert_eq!(stats.paints, 10);
        assert_eq!(calls, 10);
    }

    #[test]
    fn run_stops_once_cancelled_from_inside_a_paint() {
        let t0 = Instant::now();
        let stamps: Vec<Instant> = (1..=10)
            .map(|i| t0 + Duration::from_secs(i))
            .collect();
        let mut ticks = ScriptedTicks(stamps.into_iter());
        let mut scheduler = scheduler(1);
        scheduler.start(t0);
        let token = scheduler.cancel_token();

        let stats = scheduler.run(&mut ticks, |_| {
            token.cancel();
            Ok(())
        });
        assert_eq!(stats.paints, 1);
    }

    #[test]
    fn interval_ticks_follow_the_refresh_rate() {
        assert_eq!(IntervalTicks::new(50).period(), Duration::from_millis(20));
        assert_eq!(IntervalTicks::new(0).period(), frame_interval(0));
        assert!(!IntervalTicks::new(0).period().is_zero());
    }

    #[test]
    fn interval_ticks_end_at_the_deadline() {
        let mut ticks = IntervalTicks::new(1000).stop_after(Duration::ZERO);
        assert!(ticks.next_tick().is_none());
    }
}
