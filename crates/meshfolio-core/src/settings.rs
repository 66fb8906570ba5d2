//! Display settings for the main viewer and the gallery preview rigs
//!
//! Values follow three.js conventions (degrees for fov, unitless light
//! intensities); the renderer converts them to its own units.

use serde::{Deserialize, Serialize};

use crate::color::Rgb;

/// All display settings from the `[viewer]` and `[preview]` tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GallerySettings {
    #[serde(default)]
    pub viewer: ViewerSettings,
    #[serde(default)]
    pub preview: PreviewSettings,
}

/// Main interactive viewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerSettings {
    #[serde(default = "default_background")]
    pub background: Rgb,
    /// Color applied when a model is first opened
    #[serde(default = "default_color")]
    pub default_color: Rgb,
    /// Whether the wireframe overlay starts visible
    #[serde(default = "default_true")]
    pub show_wireframe: bool,
    #[serde(default)]
    pub camera: CameraSettings,
    #[serde(default = "default_viewer_lighting")]
    pub lighting: LightingSettings,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            background: default_background(),
            default_color: default_color(),
            show_wireframe: true,
            camera: CameraSettings::default(),
            lighting: default_viewer_lighting(),
        }
    }
}

/// Gallery card preview rigs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewSettings {
    #[serde(default = "default_background")]
    pub background: Rgb,
    /// OrbitControls units: 2.0 is one revolution every 30 seconds
    #[serde(default = "default_auto_rotate_speed")]
    pub auto_rotate_speed: f32,
    #[serde(default)]
    pub enable_zoom: bool,
    #[serde(default)]
    pub camera: CameraSettings,
    #[serde(default)]
    pub lighting: LightingSettings,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            background: default_background(),
            auto_rotate_speed: default_auto_rotate_speed(),
            enable_zoom: false,
            camera: CameraSettings::default(),
            lighting: LightingSettings::default(),
        }
    }
}

/// Perspective camera placement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    #[serde(default = "default_camera_position")]
    pub position: [f32; 3],
    /// Vertical field of view in degrees
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            position: default_camera_position(),
            fov: default_fov(),
            near: default_near(),
            far: default_far(),
        }
    }
}

impl CameraSettings {
    /// Distance from the camera to the orbit target at the origin
    pub fn distance(&self) -> f32 {
        let [x, y, z] = self.position;
        (x * x + y * y + z * z).sqrt()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightingSettings {
    #[serde(default = "default_intensity")]
    pub ambient: f32,
    #[serde(default)]
    pub point: Option<PointLightSettings>,
    #[serde(default)]
    pub spot: Option<SpotLightSettings>,
}

impl Default for LightingSettings {
    fn default() -> Self {
        Self {
            ambient: default_intensity(),
            point: Some(PointLightSettings::default()),
            spot: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointLightSettings {
    #[serde(default = "default_point_position")]
    pub position: [f32; 3],
    #[serde(default = "default_light_intensity")]
    pub intensity: f32,
}

impl Default for PointLightSettings {
    fn default() -> Self {
        Self {
            position: default_point_position(),
            intensity: default_light_intensity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotLightSettings {
    #[serde(default = "default_spot_position")]
    pub position: [f32; 3],
    /// Cone half-angle in radians
    #[serde(default = "default_spot_angle")]
    pub angle: f32,
    /// 0.0 (hard edge) - 1.0 (fully soft)
    #[serde(default = "default_intensity")]
    pub penumbra: f32,
    #[serde(default = "default_light_intensity")]
    pub intensity: f32,
}

impl Default for SpotLightSettings {
    fn default() -> Self {
        Self {
            position: default_spot_position(),
            angle: default_spot_angle(),
            penumbra: default_intensity(),
            intensity: default_light_intensity(),
        }
    }
}

fn default_background() -> Rgb {
    Rgb::new(0x1a, 0x1a, 0x1a)
}

fn default_color() -> Rgb {
    Rgb::WHITE
}

fn default_true() -> bool {
    true
}

fn default_auto_rotate_speed() -> f32 {
    2.0
}

fn default_camera_position() -> [f32; 3] {
    [5.0, 5.0, 5.0]
}

fn default_fov() -> f32 {
    50.0
}

fn default_near() -> f32 {
    0.1
}

fn default_far() -> f32 {
    1000.0
}

fn default_intensity() -> f32 {
    1.0
}

fn default_light_intensity() -> f32 {
    1.5
}

fn default_point_position() -> [f32; 3] {
    [10.0, 10.0, 10.0]
}

fn default_spot_position() -> [f32; 3] {
    [-10.0, 10.0, -10.0]
}

fn default_spot_angle() -> f32 {
    0.3
}

fn default_viewer_lighting() -> LightingSettings {
    LightingSettings {
        spot: Some(SpotLightSettings::default()),
        ..LightingSettings::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tables_use_defaults() {
        let settings: GallerySettings = toml::from_str("[viewer]\n[preview]\n").unwrap();
        assert!(settings.viewer.show_wireframe);
        assert_eq!(settings.viewer.default_color, Rgb::WHITE);
        assert!(settings.viewer.lighting.spot.is_some());
        assert!(settings.preview.lighting.spot.is_none());
        assert_eq!(settings.preview.auto_rotate_speed, 2.0);
        assert!(!settings.preview.enable_zoom);
        assert_eq!(settings.viewer.camera.fov, 50.0);
    }

    #[test]
    fn test_overrides() {
        let text = r##"
[viewer]
background = "#000000"
show_wireframe = false

[viewer.camera]
position = [0.0, 3.0, 4.0]
"##;
        let settings: GallerySettings = toml::from_str(text).unwrap();
        assert_eq!(settings.viewer.background, Rgb::BLACK);
        assert!(!settings.viewer.show_wireframe);
        assert_eq!(settings.viewer.camera.distance(), 5.0);
        assert_eq!(settings.viewer.camera.near, 0.1);
    }

    #[test]
    fn test_bad_color_rejected() {
        let result: Result<GallerySettings, _> = toml::from_str("[viewer]\nbackground = \"dark\"\n");
        assert!(result.is_err());
    }
}
