//! Preview camera placement inside gallery cards

use bevy::camera::Viewport;
use bevy::math::Rect;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::render::SlotCamera;
use crate::session::{PreviewViewports, SlotRole};

/// Convert a logical-pixel rect to a physical viewport clipped to the window
///
/// Returns `None` when nothing of the rect is visible.
pub fn physical_viewport(rect: Rect, scale_factor: f32, window: UVec2) -> Option<Viewport> {
    let max = window.as_vec2();
    let min = (rect.min * scale_factor).round().clamp(Vec2::ZERO, max);
    let end = (rect.max * scale_factor).round().clamp(Vec2::ZERO, max);
    let size = end - min;
    if size.x < 1.0 || size.y < 1.0 {
        return None;
    }

    Some(Viewport {
        physical_position: min.as_uvec2(),
        physical_size: size.as_uvec2(),
        ..default()
    })
}

/// Point each preview camera at its card, or switch it off when the card is hidden
pub fn apply_preview_viewports(
    viewports: Res<PreviewViewports>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut cameras: Query<(&SlotCamera, &mut Camera)>,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    let size = UVec2::new(window.physical_width(), window.physical_height());

    for (slot, mut camera) in &mut cameras {
        if slot.role == SlotRole::Viewer {
            continue;
        }

        let viewport = viewports
            .rects
            .get(&slot.viewer)
            .and_then(|rect| physical_viewport(*rect, window.scale_factor(), size));

        match viewport {
            Some(viewport) => {
                camera.is_active = true;
                camera.viewport = Some(viewport);
            }
            None if camera.is_active => camera.is_active = false,
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_and_rounded() {
        let rect = Rect::new(10.0, 20.0, 110.0, 95.0);
        let viewport = physical_viewport(rect, 2.0, UVec2::new(1000, 1000)).unwrap();
        assert_eq!(viewport.physical_position, UVec2::new(20, 40));
        assert_eq!(viewport.physical_size, UVec2::new(200, 150));
    }

    #[test]
    fn test_clipped_to_window() {
        let rect = Rect::new(-50.0, 700.0, 150.0, 900.0);
        let viewport = physical_viewport(rect, 1.0, UVec2::new(800, 800)).unwrap();
        assert_eq!(viewport.physical_position, UVec2::new(0, 700));
        assert_eq!(viewport.physical_size, UVec2::new(150, 100));
    }

    #[test]
    fn test_offscreen_is_none() {
        let rect = Rect::new(0.0, 900.0, 200.0, 1100.0);
        assert!(physical_viewport(rect, 1.0, UVec2::new(800, 800)).is_none());
        assert!(physical_viewport(Rect::new(5.0, 5.0, 5.2, 50.0), 1.0, UVec2::new(800, 800)).is_none());
    }
}
