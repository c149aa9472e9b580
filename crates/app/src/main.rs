mod ascii;
mod host;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use clap::{Args, Parser, Subcommand};
use spectrum_view_core::{
    timeline::frame_interval, Color, Decoded, DrawData, IntervalTicks, LoopbackChannel,
    MappingMode, Message, PluginBridge, RenderConfig, SampleBuffer, SpectrumView,
    SpectrumViewError, SurfaceSize,
};
use tracing_subscriber::EnvFilter;

use crate::{
    ascii::AsciiSurface,
    host::{PumpedTicks, ReferenceHost, ReplyShape},
};

const SAMPLE_RATE: f32 = 48_000.0;

fn main() -> spectrum_view_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Live {
            view,
            seconds,
            refresh_hz,
        } => run_live(&view, seconds, refresh_hz),
        Commands::Render { input, view } => run_render(&input, &view),
    }
}

fn run_live(args: &ViewArgs, seconds: f32, refresh_hz: u32) -> spectrum_view_core::Result<()> {
    let config = args.resolve()?;
    let shape = match config.mapping {
        MappingMode::Pairs => ReplyShape::Pairs,
        MappingMode::LogScalars { .. } => ReplyShape::Scalars,
    };
    tracing::info!(
        fps = config.frames_per_second,
        refresh_hz,
        seconds,
        ?shape,
        "starting live view"
    );

    let channel = LoopbackChannel::new();
    let bridge = PluginBridge::new(Arc::new(channel.clone()));
    let mut host = ReferenceHost::new(channel.clone(), SAMPLE_RATE, shape);
    let mut view = SpectrumView::mount(bridge, config, AsciiSurface::new(args.layout()))?;

    let duration = run_duration(seconds)?;
    let started = Instant::now();
    let stats = {
        let ticks = IntervalTicks::new(refresh_hz).stop_after(duration);
        let mut ticks = PumpedTicks::new(ticks, &mut host);
        view.run(&mut ticks)
    };
    let elapsed = started.elapsed().as_secs_f32().max(f32::EPSILON);

    tracing::info!(
        ticks = stats.ticks,
        paints = stats.paints,
        replies = host.replies(),
        achieved_fps = stats.paints as f32 / elapsed,
        "live view finished"
    );
    println!("{}", view.surface().render());

    view.unmount();
    Ok(())
}

/// Converts `--seconds` into a run length. Negative values run for zero time.
fn run_duration(seconds: f32) -> spectrum_view_core::Result<Duration> {
    Duration::try_from_secs_f32(seconds.max(0.0)).map_err(|_| {
        SpectrumViewError::InvalidConfig("--seconds must be a finite, representable duration")
    })
}

fn run_render(input: &Path, args: &ViewArgs) -> spectrum_view_core::Result<()> {
    tracing::info!(?input, "rendering a single message");
    let text = std::fs::read_to_string(input)?;

    let buffer = match Message::decode(&text)? {
        Decoded::Known(Message::DrawData(DrawData::Spectrum(buffer))) => buffer,
        Decoded::Known(message) => {
            tracing::warn!(?message, "message carries no spectrum data; nothing to draw");
            return Ok(());
        }
        Decoded::Unrecognized { kind, inner } => {
            tracing::warn!(%kind, ?inner, "unrecognised message; nothing to draw");
            return Ok(());
        }
    };

    let mut config = args.resolve()?;
    if matches!(buffer, SampleBuffer::Scalars(_)) && config.mapping == MappingMode::Pairs {
        tracing::debug!("scalar buffer; switching to the log mapping");
        config.mapping = MappingMode::LogScalars { scale: None };
    }
    let interval = frame_interval(config.frames_per_second);

    let channel = LoopbackChannel::new();
    let bridge = PluginBridge::new(Arc::new(channel.clone()));
    let mut view = SpectrumView::mount(bridge, config, AsciiSurface::new(args.layout()))?;
    channel.deliver(&text)?;

    let start = Instant::now();
    view.start(start);
    view.tick(start + interval)?;
    println!("{}", view.surface().render());

    view.unmount();
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Frame-gated spectrum view for audio plugins", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the view against a built-in reference host and print the last frame.
    Live {
        #[command(flatten)]
        view: ViewArgs,
        /// How long to run, in seconds.
        #[arg(long, default_value_t = 2.0)]
        seconds: f32,
        /// Simulated display refresh rate.
        #[arg(long, default_value_t = 60)]
        refresh_hz: u32,
    },
    /// Draw the spectrum carried by one wire message stored in a file.
    Render {
        /// Path to a JSON `drawData` message.
        input: PathBuf,
        #[command(flatten)]
        view: ViewArgs,
    },
}

/// Rendering options. Flags override values from `--config`.
#[derive(Args, Debug)]
struct ViewArgs {
    /// JSON file with rendering options.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Target frame rate.
    #[arg(long)]
    fps: Option<u32>,
    /// Fill the area below the curve.
    #[arg(long)]
    fill: bool,
    /// Snap points to whole pixels.
    #[arg(long)]
    no_anti_aliasing: bool,
    /// Stroke color, e.g. `rgb(0,0,0)` or `#202020`.
    #[arg(long)]
    stroke: Option<Color>,
    /// Expect scalar magnitudes and spread bins on a log axis.
    #[arg(long)]
    log_scale: bool,
    /// Surface width in characters.
    #[arg(long, default_value_t = 96)]
    columns: u32,
    /// Surface height in characters.
    #[arg(long, default_value_t = 24)]
    rows: u32,
}

impl ViewArgs {
    fn resolve(&self) -> spectrum_view_core::Result<RenderConfig> {
        let mut config = match &self.config {
            Some(path) => RenderConfig::load(path)?,
            None => RenderConfig::default(),
        };

        if let Some(fps) = self.fps {
            config.frames_per_second = fps;
        }
        if self.fill {
            config.fill = true;
        }
        if self.no_anti_aliasing {
            config.anti_aliasing = false;
        }
        if let Some(stroke) = self.stroke {
            config.stroke_style = stroke;
        }
        if self.log_scale {
            config.mapping = MappingMode::LogScalars { scale: None };
        }

        config.validate()?;
        Ok(config)
    }

    fn layout(&self) -> SurfaceSize {
        SurfaceSize::new(self.columns, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("spectrum-view").chain(args.iter().copied()))
            .expect("arguments should parse")
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse(&[
            "live",
            "--fps",
            "25",
            "--fill",
            "--no-anti-aliasing",
            "--stroke",
            "#ff0000",
        ]);
        let Commands::Live { view, .. } = cli.command else {
            panic!("expected the live command");
        };

        let config = view.resolve().unwrap();
        assert_eq!(config.frames_per_second, 25);
        assert!(config.fill);
        assert!(!config.anti_aliasing);
        assert_eq!(config.stroke_style, Color::rgb(255, 0, 0));
    }

    #[test]
    fn zero_fps_is_rejected() {
        let cli = parse(&["live", "--fps", "0"]);
        let Commands::Live { view, .. } = cli.command else {
            panic!("expected the live command");
        };
        assert!(view.resolve().is_err());
    }

    #[test]
    fn run_length_rejects_unrepresentable_seconds() {
        assert_eq!(run_duration(1.5).unwrap(), Duration::from_millis(1500));
        assert_eq!(run_duration(-3.0).unwrap(), Duration::ZERO);
        assert!(matches!(
            run_duration(f32::INFINITY),
            Err(SpectrumViewError::InvalidConfig(_))
        ));
        assert!(run_duration(f32::MAX).is_err());
    }

    #[test]
    fn render_takes_an_input_path() {
        let cli = parse(&["render", "frame.json", "--log-scale", "--columns", "40"]);
        let Commands::Render { input, view } = cli.command else {
            panic!("expected the render command");
        };
        assert_eq!(input, PathBuf::from("frame.json"));
        assert_eq!(view.layout(), SurfaceSize::new(40, 24));
        assert_eq!(
            view.resolve().unwrap().mapping,
            MappingMode::LogScalars { scale: None }
        );
    }
}
