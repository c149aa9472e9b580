//! In-process stand-in for the audio plugin that feeds the view.
//!
//! It synthesises a test signal, runs a windowed FFT over the most recent
//! block, smooths each bin with a decaying monitor and answers draw requests
//! with a log-frequency spectrum, the same way the real plugin does.

use std::{
    collections::VecDeque,
    f32::consts::PI,
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use spectrum_view_core::{
    ConfigUpdate, Decoded, DrawRequest, LoopbackChannel, Message, MonitorMode, Result,
    SampleBuffer, SpectrumViewError, TickSource,
};
use tracing::{debug, info, trace, warn};

const WINDOW_LENGTH: usize = 2048;
const OUTPUT_POINTS: usize = 256;
const FREQUENCY_RANGE: (f32, f32) = (10.0, 20_000.0);
const MAGNITUDE_RANGE_DB: (f32, f32) = (-100.0, 6.0);
const DEFAULT_DECAY: f32 = 0.25;
const DEFAULT_FPS: u32 = 30;

/// Shape of the buffers the host sends back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    Pairs,
    Scalars,
}

/// Per-bin level follower. The smoothing factor depends on the frame rate
/// because the monitor is ticked once per draw request.
#[derive(Debug, Clone)]
struct Monitor {
    mode: MonitorMode,
    state: f32,
    smoothing: f32,
}

impl Monitor {
    fn new(mode: MonitorMode, frame_rate: u32) -> Self {
        let mut monitor = Self {
            mode,
            state: 0.0,
            smoothing: 0.0,
        };
        monitor.set_frame_rate(frame_rate);
        monitor
    }

    fn set_frame_rate(&mut self, frame_rate: u32) {
        let decay = match self.mode {
            MonitorMode::Sample => return,
            MonitorMode::Peak(decay) | MonitorMode::Rms(decay) => decay,
        };
        let frames = (decay * frame_rate.max(1) as f32).max(f32::EPSILON);
        self.smoothing = 0.5f32.powf(1.0 / frames);
    }

    fn tick(&mut self, value: f32) {
        match self.mode {
            MonitorMode::Sample => self.state = value,
            MonitorMode::Peak(_) => self.state = (self.state * self.smoothing).max(value.abs()),
            MonitorMode::Rms(_) => {
                self.state = self.state * self.smoothing + value * value * (1.0 - self.smoothing)
            }
        }
    }

    fn level(&self) -> f32 {
        match self.mode {
            MonitorMode::Rms(_) => self.state.sqrt(),
            MonitorMode::Sample | MonitorMode::Peak(_) => self.state,
        }
    }
}

/// Windowed FFT plus smoothing over the most recent block of samples.
pub struct SpectrumAnalyzer {
    sample_rate: f32,
    frame_rate: u32,
    mode: MonitorMode,
    interpolate: bool,
    history: VecDeque<f32>,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    monitors: Vec<Monitor>,
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: f32) -> Self {
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(WINDOW_LENGTH);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        let mode = MonitorMode::Rms(DEFAULT_DECAY);
        let monitors = vec![Monitor::new(mode, DEFAULT_FPS); spectrum.len()];

        Self {
            sample_rate,
            frame_rate: DEFAULT_FPS,
            mode,
            interpolate: true,
            history: VecDeque::with_capacity(WINDOW_LENGTH),
            plan,
            input,
            spectrum,
            scratch,
            monitors,
        }
    }

    pub fn push_samples(&mut self, samples: &[f32]) {
        for &sample in samples {
            if self.history.len() == WINDOW_LENGTH {
                self.history.pop_front();
            }
            self.history.push_back(sample);
        }
    }

    pub fn set_frame_rate(&mut self, frame_rate: u32) {
        self.frame_rate = frame_rate.max(1);
        for monitor in &mut self.monitors {
            monitor.set_frame_rate(self.frame_rate);
        }
    }

    pub fn set_mode(&mut self, mode: MonitorMode) {
        self.mode = mode;
        self.monitors = vec![Monitor::new(mode, self.frame_rate); self.monitors.len()];
    }

    /// Keeps the current mode but changes how fast it decays.
    pub fn set_decay(&mut self, decay: f32) {
        let mode = match self.mode {
            MonitorMode::Sample => MonitorMode::Sample,
            MonitorMode::Peak(_) => MonitorMode::Peak(decay),
            MonitorMode::Rms(_) => MonitorMode::Rms(decay),
        };
        for monitor in &mut self.monitors {
            monitor.mode = mode;
            monitor.set_frame_rate(self.frame_rate);
        }
        self.mode = mode;
    }

    pub fn set_interpolate(&mut self, interpolate: bool) {
        self.interpolate = interpolate;
    }

    /// Runs the FFT and advances every bin monitor by one frame.
    fn bin_levels(&mut self) -> Result<Vec<f32>> {
        let offset = WINDOW_LENGTH - self.history.len();
        self.input.fill(0.0);
        for (index, sample) in self.history.iter().enumerate() {
            let slot = offset + index;
            self.input[slot] = sample * hann_value(slot, WINDOW_LENGTH);
        }

        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .map_err(|err| SpectrumViewError::msg(format!("fft failed: {err}")))?;

        let normalization = WINDOW_LENGTH as f32;
        Ok(self
            .spectrum
            .iter()
            .zip(self.monitors.iter_mut())
            .map(|(bin, monitor)| {
                monitor.tick(bin.norm() / normalization);
                monitor.level()
            })
            .collect())
    }

    /// Log-frequency spectrum as normalised `(x, y)` pairs.
    pub fn pairs(&mut self) -> Result<Vec<(f32, f32)>> {
        let levels = self.bin_levels()?;
        let (min_freq, max_freq) = FREQUENCY_RANGE;
        let ratio = max_freq / min_freq;
        let bin_hz = self.sample_rate / WINDOW_LENGTH as f32;

        Ok((0..OUTPUT_POINTS)
            .map(|i| {
                let x = i as f32 / OUTPUT_POINTS as f32;
                let position = min_freq * ratio.powf(x) / bin_hz;
                let level = sample_bins(&levels, position, self.interpolate);
                (x, normalize_db(gain_to_db(level)))
            })
            .collect())
    }

    /// Linear-frequency magnitudes, one per bin, normalised to `[0, 1]`.
    pub fn scalars(&mut self) -> Result<Vec<f32>> {
        let levels = self.bin_levels()?;
        Ok(levels
            .into_iter()
            .map(|level| normalize_db(gain_to_db(level)))
            .collect())
    }
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("sample_rate", &self.sample_rate)
            .field("frame_rate", &self.frame_rate)
            .field("mode", &self.mode)
            .field("interpolate", &self.interpolate)
            .field("history", &self.history.len())
            .finish()
    }
}

fn sample_bins(levels: &[f32], position: f32, interpolate: bool) -> f32 {
    if levels.is_empty() {
        return 0.0;
    }
    let last = levels.len() - 1;
    let position = position.clamp(0.0, last as f32);
    if !interpolate {
        return levels[position.round() as usize];
    }
    let low = position.floor() as usize;
    let high = (low + 1).min(last);
    let t = position - low as f32;
    levels[low] * (1.0 - t) + levels[high] * t
}

fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.max(1e-10).log10()
}

fn normalize_db(db: f32) -> f32 {
    let (min, max) = MAGNITUDE_RANGE_DB;
    ((db - min) / (max - min)).clamp(0.0, 1.0)
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

/// Deterministic test tone: a slow log sweep over a steady A4 with a little
/// noise underneath.
#[derive(Debug, Clone)]
pub struct TestSignal {
    sample_rate: f32,
    time: f32,
    sweep_phase: f32,
    tone_phase: f32,
    noise: u32,
}

impl TestSignal {
    const SWEEP_SECONDS: f32 = 4.0;
    const SWEEP_RANGE: (f32, f32) = (40.0, 8_000.0);

    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            time: 0.0,
            sweep_phase: 0.0,
            tone_phase: 0.0,
            noise: 0x9e37_79b9,
        }
    }

    pub fn next_block(&mut self, len: usize) -> Vec<f32> {
        (0..len).map(|_| self.next_sample()).collect()
    }

    fn next_sample(&mut self) -> f32 {
        let (low, high) = Self::SWEEP_RANGE;
        let progress = (self.time / Self::SWEEP_SECONDS).fract();
        let sweep_hz = low * (high / low).powf(progress);

        self.sweep_phase = (self.sweep_phase + sweep_hz / self.sample_rate).fract();
        self.tone_phase = (self.tone_phase + 440.0 / self.sample_rate).fract();
        self.time += 1.0 / self.sample_rate;

        // xorshift32
        self.noise ^= self.noise << 13;
        self.noise ^= self.noise >> 17;
        self.noise ^= self.noise << 5;
        let noise = self.noise as f32 / u32::MAX as f32 - 0.5;

        0.5 * (2.0 * PI * self.sweep_phase).sin()
            + 0.25 * (2.0 * PI * self.tone_phase).sin()
            + 0.01 * noise
    }
}

/// Plays the host side of a [`LoopbackChannel`].
#[derive(Debug)]
pub struct ReferenceHost {
    channel: LoopbackChannel,
    analyzer: SpectrumAnalyzer,
    signal: TestSignal,
    sample_rate: f32,
    shape: ReplyShape,
    replies: u64,
}

impl ReferenceHost {
    pub fn new(channel: LoopbackChannel, sample_rate: f32, shape: ReplyShape) -> Self {
        Self {
            channel,
            analyzer: SpectrumAnalyzer::new(sample_rate),
            signal: TestSignal::new(sample_rate),
            sample_rate,
            shape,
            replies: 0,
        }
    }

    pub fn replies(&self) -> u64 {
        self.replies
    }

    /// Feeds `elapsed` worth of audio into the analyzer, then handles every
    /// message the view has sent since the last pump.
    pub fn pump(&mut self, elapsed: Duration) -> Result<()> {
        let samples = (elapsed.as_secs_f32() * self.sample_rate).round() as usize;
        if samples > 0 {
            let block = self.signal.next_block(samples);
            self.analyzer.push_samples(&block);
        }

        for text in self.channel.take_outbound()? {
            match Message::decode(&text) {
                Ok(Decoded::Known(message)) => self.handle(message)?,
                Ok(Decoded::Unrecognized { kind, inner }) => {
                    trace!(%kind, ?inner, "host ignoring unrecognised message");
                }
                Err(err) => warn!(%err, "host dropping malformed message"),
            }
        }
        Ok(())
    }

    fn handle(&mut self, message: Message) -> Result<()> {
        match message {
            Message::Init => debug!("view initialised"),
            Message::Resize { width, height } => info!(width, height, "view asked for a resize"),
            Message::SpectrumAnalyzerConfigUpdate(update) => self.apply(update),
            Message::DrawRequest(DrawRequest::Spectrum) => {
                let buffer = match self.shape {
                    ReplyShape::Pairs => SampleBuffer::Pairs(self.analyzer.pairs()?),
                    ReplyShape::Scalars => SampleBuffer::Scalars(self.analyzer.scalars()?),
                };
                let reply = Message::spectrum_data(buffer).encode()?;
                self.channel.deliver(&reply)?;
                self.replies += 1;
            }
            Message::DrawData(_) => warn!("host received draw data; only the view consumes it"),
        }
        Ok(())
    }

    fn apply(&mut self, update: ConfigUpdate) {
        debug!(?update, "analyzer config update");
        match update {
            ConfigUpdate::Fps(fps) => self.analyzer.set_frame_rate(fps),
            ConfigUpdate::MonitorMode(mode) => self.analyzer.set_mode(mode),
            ConfigUpdate::DecaySpeed(decay) => self.analyzer.set_decay(decay),
            ConfigUpdate::Interpolate(interpolate) => self.analyzer.set_interpolate(interpolate),
        }
    }
}

/// Tick source that gives the host a turn before every refresh, so replies
/// reach the view between frames.
pub struct PumpedTicks<'a, T: TickSource> {
    ticks: T,
    host: &'a mut ReferenceHost,
    last_pump: Instant,
}

impl<'a, T: TickSource> PumpedTicks<'a, T> {
    pub fn new(ticks: T, host: &'a mut ReferenceHost) -> Self {
        Self {
            ticks,
            host,
            last_pump: Instant::now(),
        }
    }
}

impl<T: TickSource> TickSource for PumpedTicks<'_, T> {
    fn next_tick(&mut self) -> Option<Instant> {
        let now = Instant::now();
        if let Err(err) = self.host.pump(now.duration_since(self.last_pump)) {
            warn!(%err, "host pump failed");
        }
        self.last_pump = now;
        self.ticks.next_tick()
    }
}
