//! Core library for Spectrum View.
//!
//! A spectrum view talks to an audio host over a plain string channel and
//! repaints a drawing surface at its own frame rate. The pieces, leaves
//! first:
//!
//! - [`bridge`] turns the host channel into typed [`Message`] traffic.
//! - [`timeline`] gates a fast refresh tick stream down to a target rate.
//! - [`render`] requests spectrum data each frame and draws the newest buffer.
//! - [`view`] mounts a renderer on a surface and ties the three together.

pub mod bridge;
pub mod config;
pub mod error;
pub mod mapping;
pub mod protocol;
pub mod render;
pub mod surface;
pub mod timeline;
pub mod view;

pub use bridge::{HostChannel, ListenerId, LoopbackChannel, PluginBridge, Subscription};
pub use config::{Color, MappingMode, RenderConfig};
pub use error::{Result, SpectrumViewError};
pub use protocol::{ConfigUpdate, Decoded, DrawData, DrawRequest, Message, MonitorMode, SampleBuffer};
pub use render::{FrameSummary, LatestBuffer, SpectrumRenderer};
pub use surface::{DrawOp, Point, RecordingSurface, Surface, SurfaceSize};
pub use timeline::{
    CancelToken, FrameGate, FrameScheduler, FrameStats, IntervalTicks, SchedulerState, TickSource,
};
pub use view::SpectrumView;
