//! Orbit cameras for the viewer and the preview rigs

use bevy::input::mouse::{AccumulatedMouseMotion, AccumulatedMouseScroll, MouseScrollUnit};
use bevy::prelude::*;
use bevy_egui::EguiContexts;
use meshfolio_core::settings::CameraSettings;
use std::f32::consts::TAU;

/// Elevation limit, just short of the poles
const MAX_ELEVATION: f32 = 1.5;
const MIN_DISTANCE: f32 = 1.0;
const MAX_DISTANCE: f32 = 100.0;
/// Pan distance per pixel, per unit of orbit distance
const PAN_SPEED: f32 = 0.002;

/// Orbit controller state for one camera
///
/// Y-up spherical coordinates around `target`.
#[derive(Debug, Clone, Component)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub distance: f32,
    pub target_distance: f32,
    pub azimuth: f32,
    pub elevation: f32,
    pub sensitivity: f32,
    pub zoom_speed: f32,
    pub smooth_factor: f32,
    /// OrbitControls units: 2.0 is one revolution per 30 seconds
    pub auto_rotate_speed: f32,
    pub enable_zoom: bool,
    pub enable_pan: bool,
    /// Whether pointer input drives this camera
    pub interactive: bool,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::from_settings(&CameraSettings::default())
    }
}

impl OrbitCamera {
    /// Start from a camera placed at `settings.position`, looking at the origin
    pub fn from_settings(settings: &CameraSettings) -> Self {
        let position = Vec3::from_array(settings.position);
        let distance = position.length().max(MIN_DISTANCE);
        let azimuth = position.x.atan2(position.z);
        let elevation = (position.y / distance).clamp(-1.0, 1.0).asin();

        Self {
            target: Vec3::ZERO,
            distance,
            target_distance: distance,
            azimuth,
            elevation,
            sensitivity: 0.005,
            zoom_speed: 0.1,
            smooth_factor: 0.15,
            auto_rotate_speed: 0.0,
            enable_zoom: true,
            enable_pan: true,
            interactive: true,
        }
    }

    pub fn with_auto_rotate(mut self, speed: f32) -> Self {
        self.auto_rotate_speed = speed;
        self
    }

    /// Gallery rigs rotate on their own and ignore the pointer
    pub fn preview(mut self, auto_rotate_speed: f32, enable_zoom: bool) -> Self {
        self.auto_rotate_speed = auto_rotate_speed;
        self.enable_zoom = enable_zoom;
        self.enable_pan = false;
        self.interactive = false;
        self
    }

    pub fn position(&self) -> Vec3 {
        orbit_position(self.target, self.distance, self.azimuth, self.elevation)
    }

    pub fn transform(&self) -> Transform {
        Transform::from_translation(self.position()).looking_at(self.target, Vec3::Y)
    }

    /// Rotate by a pointer drag in logical pixels
    pub fn drag(&mut self, delta: Vec2) {
        self.azimuth -= delta.x * self.sensitivity;
        self.elevation = (self.elevation - delta.y * self.sensitivity).clamp(-MAX_ELEVATION, MAX_ELEVATION);
    }

    /// Move the orbit target in the view plane by a pointer drag in logical pixels
    ///
    /// The model follows the pointer; speed grows with distance.
    pub fn pan(&mut self, delta: Vec2) {
        if !self.enable_pan {
            return;
        }
        let rotation = self.transform().rotation;
        let speed = self.distance * PAN_SPEED;
        self.target += rotation * Vec3::X * (-delta.x * speed) + rotation * Vec3::Y * (delta.y * speed);
    }

    /// Zoom by scroll lines; positive moves closer
    pub fn zoom(&mut self, lines: f32) {
        if !self.enable_zoom {
            return;
        }
        let factor = 1.0 - lines * self.zoom_speed;
        self.target_distance = (self.target_distance * factor).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    /// Advance auto-rotation and distance smoothing by `dt` seconds
    pub fn advance(&mut self, dt: f32) {
        self.azimuth = (self.azimuth + auto_rotate_step(self.auto_rotate_speed, dt)).rem_euclid(TAU);
        let lerp = 1.0 - (-self.smooth_factor * 60.0 * dt).exp();
        self.distance += (self.target_distance - self.distance) * lerp;
    }
}

/// Point on the orbit sphere
pub fn orbit_position(target: Vec3, distance: f32, azimuth: f32, elevation: f32) -> Vec3 {
    target
        + distance
            * Vec3::new(
                elevation.cos() * azimuth.sin(),
                elevation.sin(),
                elevation.cos() * azimuth.cos(),
            )
}

/// Azimuth change for one frame of auto-rotation
///
/// Matches OrbitControls: `speed` 1.0 takes 60 seconds per revolution.
pub fn auto_rotate_step(speed: f32, dt: f32) -> f32 {
    TAU / 60.0 * speed * dt
}

pub struct CameraPlugin;

impl Plugin for CameraPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, (orbit_input, advance_orbits).chain());
    }
}

fn orbit_input(
    mut cameras: Query<(&mut OrbitCamera, &Camera)>,
    mouse_motion: Res<AccumulatedMouseMotion>,
    mouse_scroll: Res<AccumulatedMouseScroll>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    touches: Res<Touches>,
    mut contexts: EguiContexts,
) {
    let egui_wants_pointer = contexts
        .ctx_mut()
        .map(|ctx| ctx.wants_pointer_input() || ctx.is_pointer_over_area())
        .unwrap_or(false);
    if egui_wants_pointer {
        return;
    }

    let lines = match mouse_scroll.unit {
        MouseScrollUnit::Line => mouse_scroll.delta.y,
        MouseScrollUnit::Pixel => mouse_scroll.delta.y / 40.0,
    };

    // One finger orbits, two fingers pan
    let touch_count = touches.iter().count();
    let touch_delta = touches.iter().map(|t| t.delta()).sum::<Vec2>();
    let (touch_drag, touch_pan) = match touch_count {
        1 => (touch_delta, Vec2::ZERO),
        2 => (Vec2::ZERO, touch_delta / 2.0),
        _ => (Vec2::ZERO, Vec2::ZERO),
    };

    for (mut orbit, camera) in &mut cameras {
        if !orbit.interactive || !camera.is_active {
            continue;
        }
        if mouse_button.pressed(MouseButton::Left) && mouse_motion.delta != Vec2::ZERO {
            orbit.drag(mouse_motion.delta);
        }
        if mouse_button.pressed(MouseButton::Right) && mouse_motion.delta != Vec2::ZERO {
            orbit.pan(mouse_motion.delta);
        }
        if touch_drag != Vec2::ZERO {
            orbit.drag(touch_drag);
        }
        if touch_pan != Vec2::ZERO {
            orbit.pan(touch_pan);
        }
        if lines != 0.0 {
            orbit.zoom(lines);
        }
    }
}

fn advance_orbits(mut cameras: Query<(&mut OrbitCamera, &mut Transform)>, time: Res<Time>) {
    let dt = time.delta_secs();
    for (mut orbit, mut transform) in &mut cameras {
        orbit.advance(dt);
        *transform = orbit.transform();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings_round_trips_position() {
        let settings = CameraSettings::default();
        let orbit = OrbitCamera::from_settings(&settings);
        let position = orbit.position();
        assert!((position - Vec3::new(5.0, 5.0, 5.0)).length() < 1e-4);
        assert!((orbit.distance - 75f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_auto_rotate_period() {
        // Speed 2.0 completes a revolution in 30 seconds
        let step = auto_rotate_step(2.0, 30.0);
        assert!((step - TAU).abs() < 1e-5);
        assert_eq!(auto_rotate_step(0.0, 1.0), 0.0);
    }

    #[test]
    fn test_advance_wraps_azimuth() {
        let mut orbit = OrbitCamera::default().with_auto_rotate(2.0);
        for _ in 0..100 {
            orbit.advance(1.0);
        }
        assert!((0.0..TAU).contains(&orbit.azimuth));
    }

    #[test]
    fn test_preview_ignores_zoom() {
        let mut orbit = OrbitCamera::default().preview(2.0, false);
        let before = orbit.target_distance;
        orbit.zoom(3.0);
        assert_eq!(orbit.target_distance, before);
        assert!(!orbit.interactive);
    }

    #[test]
    fn test_pan_moves_target_in_view_plane() {
        let mut orbit = OrbitCamera::default();
        let forward = (orbit.target - orbit.position()).normalize();
        let offset = orbit.position() - orbit.target;

        orbit.pan(Vec2::new(100.0, 40.0));
        assert!(orbit.target.length() > 0.0);
        assert!(orbit.target.dot(forward).abs() < 1e-4);
        // Camera travels with its target
        assert!((orbit.position() - orbit.target - offset).length() < 1e-4);

        // Dragging right moves the target to the camera's left
        let right = orbit.transform().rotation * Vec3::X;
        assert!(orbit.target.dot(right) < 0.0);
    }

    #[test]
    fn test_pan_speed_scales_with_distance() {
        let mut near = OrbitCamera::default();
        let mut far = OrbitCamera::default();
        far.distance *= 4.0;
        near.pan(Vec2::new(50.0, 0.0));
        far.pan(Vec2::new(50.0, 0.0));
        assert!((far.target.length() - 4.0 * near.target.length()).abs() < 1e-4);
    }

    #[test]
    fn test_preview_ignores_pan() {
        let mut orbit = OrbitCamera::default().preview(2.0, false);
        orbit.pan(Vec2::new(100.0, 100.0));
        assert_eq!(orbit.target, Vec3::ZERO);
    }

    #[test]
    fn test_zoom_and_drag_are_clamped() {
        let mut orbit = OrbitCamera::default();
        orbit.zoom(100.0);
        assert_eq!(orbit.target_distance, MIN_DISTANCE);
        orbit.drag(Vec2::new(0.0, -10_000.0));
        assert_eq!(orbit.elevation, MAX_ELEVATION);
    }
}
