//! Bevy application setup

use bevy::camera::visibility::RenderLayers;
use bevy::prelude::*;
use bevy::winit::WinitSettings;
use bevy_egui::{EguiGlobalSettings, EguiPlugin, PrimaryEguiContext};
use bevy_picking::DefaultPickingPlugins;
use meshfolio_core::{AppState, GalleryConfig};
use meshfolio_scene::render::rgb_color;
use meshfolio_scene::{GallerySession, MeshfolioScenePlugin};

use crate::loads::LoadsPlugin;
use crate::ui::UiPlugin;

/// Draws after every scene slot
const UI_CAMERA_ORDER: isize = 10_000;

/// Run the Bevy application
pub fn run() {
    let config = match GalleryConfig::builtin() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid gallery configuration: {e}");
            return;
        }
    };
    tracing::info!(models = config.catalogue.len(), "Starting gallery");

    App::new()
        .insert_resource(ClearColor(rgb_color(config.settings.preview.background)))
        .insert_resource(WinitSettings::default())
        .add_plugins(
            DefaultPlugins
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "3MF Model Viewer".to_string(),
                        canvas: Some("#viewer-canvas".to_string()),
                        fit_canvas_to_parent: true,
                        prevent_default_event_handling: false,
                        ..default()
                    }),
                    ..default()
                })
                .set(AssetPlugin {
                    // Models are fetched directly; nothing goes through the asset server
                    file_path: "".to_string(),
                    meta_check: bevy::asset::AssetMetaCheck::Never,
                    ..default()
                }),
        )
        // Picking must be registered before EguiPlugin so egui can block it
        .add_plugins(DefaultPickingPlugins)
        .add_plugins(EguiPlugin::default())
        .insert_resource(GallerySession(AppState::new(config)))
        .add_plugins(MeshfolioScenePlugin)
        .add_plugins(LoadsPlugin)
        .add_plugins(UiPlugin)
        .add_systems(Startup, spawn_ui_camera)
        .run();
}

/// Egui gets its own camera so it never depends on which scene slots exist
fn spawn_ui_camera(mut commands: Commands, mut egui_settings: ResMut<EguiGlobalSettings>) {
    egui_settings.auto_create_primary_context = false;

    commands.spawn((
        PrimaryEguiContext,
        Camera3d::default(),
        RenderLayers::none(),
        Camera {
            order: UI_CAMERA_ORDER,
            clear_color: ClearColorConfig::None,
            ..default()
        },
    ));
}
