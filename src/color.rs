// src/color.rs
use bevy_color::{ColorToComponents, LinearRgba, Srgba};
use serde::{Deserialize, Serialize};

/// sRGB colour with straight alpha.
///
/// Serialised as a `#RRGGBB` or `#RRGGBBAA` hex string so config files stay
/// readable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(Srgba);

impl Color {
    pub const WHITE: Color = Color(Srgba::WHITE);

    pub fn rgb_u8(r: u8, g: u8, b: u8) -> Self {
        Self(Srgba::rgb_u8(r, g, b))
    }

    pub fn hex(hex: &str) -> Result<Self, bevy_color::HexColorError> {
        Srgba::hex(hex).map(Self)
    }

    pub fn alpha(&self) -> f32 {
        self.0.alpha
    }

    /// Same colour, alpha replaced.
    pub fn with_alpha(self, alpha: f32) -> Self {
        Self(Srgba { alpha, ..self.0 })
    }

    /// Same colour, alpha multiplied by `factor`.
    pub fn fade(self, factor: f32) -> Self {
        self.with_alpha(self.0.alpha * factor)
    }

    pub fn into_linear_rgba(self) -> [f32; 4] {
        LinearRgba::from(self.0).to_f32_array()
    }

    pub fn into_linear_wgpu_color(self) -> wgpu::Color {
        let [r, g, b, a] = self.into_linear_rgba();
        wgpu::Color { r: r as f64, g: g as f64, b: b as f64, a: a as f64 }
    }
}

impl TryFrom<String> for Color {
    type Error = bevy_color::HexColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.0.to_hex()
    }
}
