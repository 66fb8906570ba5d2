//! Color values and material presets
//!
//! A color selection always resolves to an effective [`ColorPreset`]: the
//! declared preset when the value matches one exactly, otherwise a custom
//! preset carrying the default metalness and roughness.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Metalness above which a preset gets the metallic-look shading
pub const METALLIC_THRESHOLD: f32 = 0.5;

/// Metalness used for colors that match no preset
pub const DEFAULT_METALNESS: f32 = 0.1;

/// Roughness used for colors that match no preset
pub const DEFAULT_ROUGHNESS: f32 = 0.7;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ColorError {
    #[error("Unrecognized color value {0:?}, expected #rgb or #rrggbb")]
    Invalid(String),
}

/// 8-bit sRGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(0xff, 0xff, 0xff);
    pub const BLACK: Rgb = Rgb::new(0x00, 0x00, 0x00);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rgb` / `#rrggbb` (the leading `#` is optional, case-insensitive)
    pub fn parse(text: &str) -> Result<Self, ColorError> {
        let invalid = || ColorError::Invalid(text.to_string());
        let trimmed = text.trim();
        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        match hex.len() {
            3 => {
                let mut channels = [0u8; 3];
                for (slot, c) in channels.iter_mut().zip(hex.chars()) {
                    let nibble = c.to_digit(16).ok_or_else(invalid)? as u8;
                    *slot = nibble * 0x11;
                }
                Ok(Self::from_array(channels))
            }
            6 => {
                let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
                Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
            }
            _ => Err(invalid()),
        }
    }

    /// Lowercase `#rrggbb`
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    pub fn from_array(rgb: [u8; 3]) -> Self {
        Self::new(rgb[0], rgb[1], rgb[2])
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Self::WHITE
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Rgb {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Rgb {
    type Error = ColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

/// Which preset table a preset came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetFamily {
    Standard,
    Metallic,
    /// Synthesized for a color that matched no preset
    Custom,
}

/// Named color/material parameter combination
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorPreset {
    pub color: Rgb,
    pub display_name: &'static str,
    /// 0.0 - 1.0
    pub metalness: f32,
    /// 0.0 - 1.0
    pub roughness: f32,
    pub family: PresetFamily,
}

impl ColorPreset {
    const fn standard(color: Rgb, display_name: &'static str, metalness: f32, roughness: f32) -> Self {
        Self { color, display_name, metalness, roughness, family: PresetFamily::Standard }
    }

    const fn metallic(color: Rgb, display_name: &'static str, metalness: f32, roughness: f32) -> Self {
        Self { color, display_name, metalness, roughness, family: PresetFamily::Metallic }
    }

    /// Preset synthesized for an arbitrary color value
    pub fn custom(color: Rgb) -> Self {
        Self {
            color,
            display_name: "Custom",
            metalness: DEFAULT_METALNESS,
            roughness: DEFAULT_ROUGHNESS,
            family: PresetFamily::Custom,
        }
    }

    /// Whether shading should use the metallic look
    pub fn is_metallic_look(&self) -> bool {
        self.metalness > METALLIC_THRESHOLD
    }

    /// Environment-reflection intensity for the surface material
    pub fn env_intensity(&self) -> f32 {
        if self.is_metallic_look() { 0.7 } else { 0.5 }
    }

    /// Wireframe overlay opacity (dimmer on shiny presets)
    pub fn overlay_opacity(&self) -> f32 {
        if self.is_metallic_look() { 0.3 } else { 1.0 }
    }
}

/// Low-metalness presets
pub const STANDARD_PRESETS: &[ColorPreset] = &[
    ColorPreset::standard(Rgb::WHITE, "White", 0.3, 0.4),
    ColorPreset::standard(Rgb::new(0xd1, 0xd5, 0xdb), "Light Gray", 0.2, 0.5),
    ColorPreset::standard(Rgb::new(0x37, 0x41, 0x51), "Charcoal", 0.2, 0.6),
    ColorPreset::standard(Rgb::new(0xef, 0x44, 0x44), "Red", 0.1, 0.5),
    ColorPreset::standard(Rgb::new(0xf9, 0x73, 0x16), "Orange", 0.1, 0.5),
    ColorPreset::standard(Rgb::new(0xea, 0xb3, 0x08), "Yellow", 0.1, 0.5),
    ColorPreset::standard(Rgb::new(0x22, 0xc5, 0x5e), "Green", 0.1, 0.5),
    ColorPreset::standard(Rgb::new(0x3b, 0x82, 0xf6), "Blue", 0.1, 0.5),
    ColorPreset::standard(Rgb::new(0xa8, 0x55, 0xf7), "Purple", 0.1, 0.5),
    ColorPreset::standard(Rgb::new(0xec, 0x48, 0x99), "Pink", 0.1, 0.5),
];

/// High-metalness presets
pub const METALLIC_PRESETS: &[ColorPreset] = &[
    ColorPreset::metallic(Rgb::new(0xff, 0xd7, 0x00), "Gold", 0.9, 0.2),
    ColorPreset::metallic(Rgb::new(0xc0, 0xc0, 0xc0), "Silver", 0.9, 0.15),
    ColorPreset::metallic(Rgb::new(0xb8, 0x73, 0x33), "Copper", 0.85, 0.25),
    ColorPreset::metallic(Rgb::new(0xcd, 0x7f, 0x32), "Bronze", 0.8, 0.3),
    ColorPreset::metallic(Rgb::new(0xe8, 0xe8, 0xe8), "Chrome", 1.0, 0.05),
    ColorPreset::metallic(Rgb::new(0x87, 0x86, 0x81), "Titanium", 0.8, 0.35),
];

/// Resolve a color value to its effective preset
pub fn resolve_preset(color: Rgb) -> ColorPreset {
    STANDARD_PRESETS
        .iter()
        .chain(METALLIC_PRESETS)
        .find(|p| p.color == color)
        .copied()
        .unwrap_or_else(|| ColorPreset::custom(color))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(Rgb::parse("#ffffff").unwrap(), Rgb::WHITE);
        assert_eq!(Rgb::parse("FFD700").unwrap(), Rgb::new(0xff, 0xd7, 0x00));
        assert_eq!(Rgb::parse("#abc").unwrap(), Rgb::new(0xaa, 0xbb, 0xcc));
        assert_eq!(Rgb::parse("  #3B82F6 ").unwrap(), Rgb::new(0x3b, 0x82, 0xf6));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for text in ["", "#", "#12", "#12345", "#gggggg", "red", "#ff00ff00", "#ﬀﬀﬀ"] {
            assert!(Rgb::parse(text).is_err(), "accepted {:?}", text);
        }
    }

    #[test]
    fn test_hex_display() {
        assert_eq!(Rgb::new(0xef, 0x44, 0x44).to_string(), "#ef4444");
    }

    #[test]
    fn test_known_preset_resolves_exactly() {
        let gold = resolve_preset(Rgb::parse("#FFD700").unwrap());
        assert_eq!(gold.display_name, "Gold");
        assert_eq!(gold.metalness, 0.9);
        assert_eq!(gold.roughness, 0.2);
        assert_eq!(gold.family, PresetFamily::Metallic);

        let white = resolve_preset(Rgb::WHITE);
        assert_eq!(white.display_name, "White");
        assert_eq!(white.metalness, 0.3);
        assert_eq!(white.roughness, 0.4);
    }

    #[test]
    fn test_unknown_color_gets_defaults() {
        let custom = resolve_preset(Rgb::new(0x12, 0x34, 0x56));
        assert_eq!(custom.family, PresetFamily::Custom);
        assert_eq!(custom.metalness, DEFAULT_METALNESS);
        assert_eq!(custom.roughness, DEFAULT_ROUGHNESS);
        assert_eq!(custom.color, Rgb::new(0x12, 0x34, 0x56));
    }

    #[test]
    fn test_preset_values_unique_and_in_range() {
        let mut seen = HashSet::new();
        for preset in STANDARD_PRESETS.iter().chain(METALLIC_PRESETS) {
            assert!(seen.insert(preset.color), "duplicate preset color {}", preset.color);
            assert!((0.0..=1.0).contains(&preset.metalness));
            assert!((0.0..=1.0).contains(&preset.roughness));
        }
        assert!(STANDARD_PRESETS.iter().all(|p| !p.is_metallic_look()));
        assert!(METALLIC_PRESETS.iter().all(|p| p.is_metallic_look()));
    }

    #[test]
    fn test_shading_threshold() {
        let chrome = resolve_preset(Rgb::new(0xe8, 0xe8, 0xe8));
        assert_eq!(chrome.env_intensity(), 0.7);
        assert_eq!(chrome.overlay_opacity(), 0.3);

        let red = resolve_preset(Rgb::new(0xef, 0x44, 0x44));
        assert_eq!(red.env_intensity(), 0.5);
        assert_eq!(red.overlay_opacity(), 1.0);
    }
}
