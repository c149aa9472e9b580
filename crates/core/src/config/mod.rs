use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Result, SpectrumViewError};

pub const DEFAULT_FPS: u32 = 50;

/// Rendering options for one mounted spectrum view.
///
/// Field names follow the camelCase spelling used on the wire so the same
/// JSON can be shared with the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfig {
    pub frames_per_second: u32,
    pub fill: bool,
    pub anti_aliasing: bool,
    pub stroke_style: Color,
    /// Explicit surface width in pixels. Falls back to the layout size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Explicit surface height in pixels. Falls back to the layout size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub mapping: MappingMode,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames_per_second: DEFAULT_FPS,
            fill: false,
            anti_aliasing: true,
            stroke_style: Color::BLACK,
            width: None,
            height: None,
            mapping: MappingMode::Pairs,
        }
    }
}

impl RenderConfig {
    /// Parses and validates a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frames_per_second == 0 {
            return Err(SpectrumViewError::InvalidConfig(
                "framesPerSecond must be greater than zero",
            ));
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err(SpectrumViewError::InvalidConfig(
                "explicit surface dimensions must be non-zero",
            ));
        }
        if let MappingMode::LogScalars { scale: Some(scale) } = self.mapping {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(SpectrumViewError::InvalidConfig(
                    "log mapping scale must be a positive number",
                ));
            }
        }
        Ok(())
    }
}

/// How sample buffers are projected onto the surface.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum MappingMode {
    #[default]
    /// Normalised `(x, y)` pairs, linear on both axes with Y pointing up.
    Pairs,
    /// Plain magnitudes; bin index is spread logarithmically across the width.
    LogScalars {
        /// Pixels per unit of magnitude. `None` scales 1.0 to the full height.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale: Option<f32>,
    },
}

/// An sRGB color with 8-bit alpha, written in CSS notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub fn is_opaque(&self) -> bool {
        self.a == 255
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_opaque() {
            write!(f, "rgb({},{},{})", self.r, self.g, self.b)
        } else {
            let alpha = f32::from(self.a) / 255.0;
            write!(f, "rgba({},{},{},{alpha:.3})", self.r, self.g, self.b)
        }
    }
}

impl FromStr for Color {
    type Err = SpectrumViewError;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        let invalid = || SpectrumViewError::msg(format!("unsupported color `{s}`"));

        if let Some(hex) = text.strip_prefix('#') {
            if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            let channel = |range: std::ops::Range<usize>| {
                u8::from_str_radix(&hex[range], 16).map_err(|_| invalid())
            };
            return Ok(Color::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?));
        }

        let (body, with_alpha) = if let Some(rest) = text.strip_prefix("rgba(") {
            (rest, true)
        } else if let Some(rest) = text.strip_prefix("rgb(") {
            (rest, false)
        } else {
            return Err(invalid());
        };
        let body = body.strip_suffix(')').ok_or_else(invalid)?;
        let parts: Vec<&str> = body.split(',').map(str::trim).collect();
        let expected = if with_alpha { 4 } else { 3 };
        if parts.len() != expected {
            return Err(invalid());
        }

        let channel = |part: &str| part.parse::<u8>().map_err(|_| invalid());
        let a = if with_alpha {
            let alpha: f32 = parts[3].parse().map_err(|_| invalid())?;
            if !(0.0..=1.0).contains(&alpha) {
                return Err(invalid());
            }
            (alpha * 255.0).round() as u8
        } else {
            255
        };

        Ok(Color {
            r: channel(parts[0])?,
            g: channel(parts[1])?,
            b: channel(parts[2])?,
            a,
        })
    }
}

impl TryFrom<String> for Color {
    type Error = SpectrumViewError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_string()
    }
}
