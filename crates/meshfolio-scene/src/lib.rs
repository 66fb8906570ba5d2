//! Meshfolio Scene - Bevy rendering for the viewer and the gallery previews
//!
//! Each live [`meshfolio_core::ViewerState`] is mirrored into its own scene
//! slot: an orbit camera, a light rig, and the decorated model, isolated on
//! a dedicated render layer. The UI crate only mutates [`GallerySession`]
//! and reports card rectangles through [`PreviewViewports`].

pub mod camera;
pub mod render;
pub mod session;
pub mod viewport;

use bevy::prelude::*;

/// Plugin that mirrors the gallery session into 3D scenes
pub struct MeshfolioScenePlugin;

impl Plugin for MeshfolioScenePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PreviewViewports>()
            .add_plugins(camera::CameraPlugin)
            .add_plugins(render::SlotsPlugin)
            .add_systems(Update, viewport::apply_preview_viewports.after(render::sync_slots));
    }
}

pub use camera::OrbitCamera;
pub use render::{BackgroundCamera, SceneSlots, SlotCamera};
pub use session::{GallerySession, LiveViewer, PreviewViewports, SlotRole};
