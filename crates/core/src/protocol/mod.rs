//! Wire envelope exchanged with the host.
//!
//! Every message is JSON of the shape `{ "type": ..., "data": ... }` where the
//! payload is itself `{ "type": ..., "data"?: ... }`. Tag pairs this crate does
//! not know are reported as [`Decoded::Unrecognized`] instead of failing, so a
//! newer host can talk to an older view.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Result, SpectrumViewError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "data")]
pub enum Message {
    Init,
    Resize { width: f64, height: f64 },
    SpectrumAnalyzerConfigUpdate(ConfigUpdate),
    DrawRequest(DrawRequest),
    DrawData(DrawData),
}

/// Settings the view pushes to the host's analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "data")]
pub enum ConfigUpdate {
    Fps(u32),
    MonitorMode(MonitorMode),
    DecaySpeed(f32),
    Interpolate(bool),
}

/// Per-bin smoothing applied by the host. The payload is a decay time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "data")]
pub enum MonitorMode {
    Sample,
    Peak(f32),
    Rms(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "data")]
pub enum DrawRequest {
    Spectrum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "data")]
pub enum DrawData {
    Spectrum(SampleBuffer),
}

/// One spectrum snapshot as produced by the host.
///
/// On the wire this is either `[[x, y], ...]` or `[m0, m1, ...]`. An empty
/// array decodes as empty pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleBuffer {
    Pairs(Vec<(f32, f32)>),
    Scalars(Vec<f32>),
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::Pairs(Vec::new())
    }
}

impl SampleBuffer {
    pub fn len(&self) -> usize {
        match self {
            Self::Pairs(points) => points.len(),
            Self::Scalars(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Self::Pairs(_) => "pairs",
            Self::Scalars(_) => "scalars",
        }
    }
}

/// Outcome of decoding one inbound text message.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Known(Message),
    Unrecognized { kind: String, inner: Option<String> },
}

impl Message {
    pub fn fps(frames_per_second: u32) -> Self {
        Self::SpectrumAnalyzerConfigUpdate(ConfigUpdate::Fps(frames_per_second))
    }

    pub fn spectrum_request() -> Self {
        Self::DrawRequest(DrawRequest::Spectrum)
    }

    pub fn spectrum_data(buffer: SampleBuffer) -> Self {
        Self::DrawData(DrawData::Spectrum(buffer))
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a text message.
    ///
    /// Returns an error only for text that is not an envelope at all, or for a
    /// known tag pair whose payload does not match.
    pub fn decode(text: &str) -> Result<Decoded> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SpectrumViewError::msg("envelope is missing its `type` tag"))?;
        let inner = value
            .get("data")
            .and_then(|data| data.get("type"))
            .and_then(Value::as_str);

        if !is_recognized(kind, inner) {
            return Ok(Decoded::Unrecognized {
                kind: kind.to_string(),
                inner: inner.map(str::to_string),
            });
        }

        Ok(Decoded::Known(serde_json::from_value(value)?))
    }
}

fn is_recognized(kind: &str, inner: Option<&str>) -> bool {
    match (kind, inner) {
        ("init", _) | ("resize", _) => true,
        ("spectrumAnalyzerConfigUpdate", Some(inner)) => {
            matches!(inner, "fps" | "monitorMode" | "decaySpeed" | "interpolate")
        }
        ("drawRequest", Some("spectrum")) | ("drawData", Some("spectrum")) => true,
        _ => false,
    }
}
