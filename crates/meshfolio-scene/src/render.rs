//! Scene slots: one camera, light rig and model per live viewer
//!
//! Every viewer state (the main viewer or one gallery preview) gets its own
//! render layer so slots never see each other's models or lights. Slots are
//! rebuilt when the viewer's asset or status changes and patched in place
//! when only the look (color, wireframe) changes. Meshes and materials are
//! removed from their asset stores as soon as a slot drops them.

use bevy::asset::RenderAssetUsages;
use bevy::camera::visibility::RenderLayers;
use bevy::prelude::*;
use bevy::render::render_resource::PrimitiveTopology;
use meshfolio_core::settings::{CameraSettings, LightingSettings};
use meshfolio_core::{
    AppView, DisplayTransform, LoadStatus, LoadedAsset, Material, MeshGeometry, Normalization, PartId,
    Rgb, ViewerId, ViewerState, WireframeOverlay,
};
use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;

use crate::camera::OrbitCamera;
use crate::session::{GallerySession, LiveViewer, SlotRole};

/// Light intensity conversion from unitless settings to lumens
const LUMENS_PER_INTENSITY: f32 = 12_000_000.0;
const AMBIENT_BRIGHTNESS: f32 = 300.0;
const LIGHT_RANGE: f32 = 100.0;

/// Pulls overlay lines in front of coplanar faces
const OVERLAY_DEPTH_BIAS: f32 = 8.0;

const PLACEHOLDER_SIZE: f32 = 1.0;
const LOADING_COLOR: Rgb = Rgb::new(0x80, 0x80, 0x80);
const ERROR_COLOR: Rgb = Rgb::new(0xc0, 0x50, 0x50);

/// Camera that only clears the window behind every slot
#[derive(Component)]
pub struct BackgroundCamera;

#[derive(Component, Debug, Clone, Copy)]
pub struct SlotCamera {
    pub viewer: ViewerId,
    pub role: SlotRole,
}

/// Root of a slot's model, carrying the catalogue display transform
#[derive(Component)]
pub struct SlotRig {
    pub viewer: ViewerId,
}

/// Drawable part surface
#[derive(Component)]
pub struct PartMesh {
    pub part: PartId,
}

/// Wireframe overlay lines of one part
#[derive(Component)]
pub struct OverlayLines {
    pub part: PartId,
}

/// Neutral cube shown while loading or after an error
#[derive(Component)]
pub struct Placeholder;

struct PartHandles {
    part: PartId,
    surface: Handle<StandardMaterial>,
    overlay: Option<(Entity, Handle<StandardMaterial>)>,
}

struct Slot {
    layers: RenderLayers,
    camera: Entity,
    lights: Vec<Entity>,
    rig: Entity,
    content: Option<Entity>,
    /// Asset revision and status the content was built for
    shown: Option<(u64, LoadStatus)>,
    look_revision: u64,
    parts: Vec<PartHandles>,
    meshes: Vec<Handle<Mesh>>,
    materials: Vec<Handle<StandardMaterial>>,
}

/// Scene slots by viewer
#[derive(Resource, Default)]
pub struct SceneSlots {
    slots: HashMap<ViewerId, Slot>,
}

impl SceneSlots {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

pub struct SlotsPlugin;

impl Plugin for SlotsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SceneSlots>()
            .add_systems(Startup, setup_environment)
            .add_systems(Update, (update_background, sync_slots).chain());
    }
}

fn setup_environment(mut commands: Commands, session: Res<GallerySession>) {
    let settings = session.settings();
    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: AMBIENT_BRIGHTNESS * settings.viewer.lighting.ambient,
        ..default()
    });

    commands.spawn((
        BackgroundCamera,
        Camera3d::default(),
        Camera {
            order: -1,
            clear_color: ClearColorConfig::Custom(rgb_color(settings.preview.background)),
            ..default()
        },
        RenderLayers::none(),
    ));
}

fn update_background(session: Res<GallerySession>, mut cameras: Query<&mut Camera, With<BackgroundCamera>>) {
    if !session.is_changed() {
        return;
    }
    let settings = session.settings();
    let background = match session.view() {
        AppView::Gallery => settings.preview.background,
        AppView::Viewer { .. } => settings.viewer.background,
    };
    for mut camera in &mut cameras {
        camera.clear_color = ClearColorConfig::Custom(rgb_color(background));
    }
}

pub fn sync_slots(
    mut commands: Commands,
    session: Res<GallerySession>,
    mut slots: ResMut<SceneSlots>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let live = session.live_viewers();

    let gone: Vec<ViewerId> = slots
        .slots
        .keys()
        .filter(|id| !live.iter().any(|v| v.state.id() == **id))
        .copied()
        .collect();
    for id in gone {
        if let Some(mut slot) = slots.slots.remove(&id) {
            release_content(&mut commands, &mut slot, &mut meshes, &mut materials);
            commands.entity(slot.rig).despawn();
            commands.entity(slot.camera).despawn();
            for light in slot.lights {
                commands.entity(light).despawn();
            }
            tracing::debug!(viewer = id.raw(), "Released scene slot");
        }
    }

    for viewer in &live {
        let id = viewer.state.id();
        let slot = slots
            .slots
            .entry(id)
            .or_insert_with(|| spawn_slot(&mut commands, &session, viewer));

        let key = (viewer.state.asset_revision(), viewer.state.status());
        if slot.shown != Some(key) {
            release_content(&mut commands, slot, &mut meshes, &mut materials);
            build_content(&mut commands, slot, viewer.state, &mut meshes, &mut materials);
            slot.shown = Some(key);
            slot.look_revision = viewer.state.look_revision();
        } else if slot.look_revision != viewer.state.look_revision() {
            if let Some(asset) = viewer.state.asset() {
                update_look(&mut commands, slot, asset, &mut materials);
            }
            slot.look_revision = viewer.state.look_revision();
        }
    }
}

fn spawn_slot(commands: &mut Commands, session: &GallerySession, viewer: &LiveViewer) -> Slot {
    let layers = RenderLayers::layer(viewer.layer);
    let settings = session.settings();
    let (camera_settings, lighting, orbit) = match viewer.role {
        SlotRole::Viewer => (
            &settings.viewer.camera,
            &settings.viewer.lighting,
            OrbitCamera::from_settings(&settings.viewer.camera),
        ),
        SlotRole::Preview { .. } => (
            &settings.preview.camera,
            &settings.preview.lighting,
            OrbitCamera::from_settings(&settings.preview.camera)
                .preview(settings.preview.auto_rotate_speed, settings.preview.enable_zoom),
        ),
    };

    let camera = commands
        .spawn((
            Camera3d::default(),
            Camera {
                order: viewer.layer as isize,
                clear_color: ClearColorConfig::None,
                // Previews switch on once their card has been laid out
                is_active: viewer.role == SlotRole::Viewer,
                ..default()
            },
            perspective(camera_settings),
            orbit.transform(),
            orbit,
            layers.clone(),
            SlotCamera {
                viewer: viewer.state.id(),
                role: viewer.role,
            },
        ))
        .id();

    let lights = spawn_lights(commands, lighting, &layers);

    let rig = commands
        .spawn((
            display_transform(viewer.display),
            Visibility::default(),
            layers.clone(),
            SlotRig {
                viewer: viewer.state.id(),
            },
        ))
        .id();

    tracing::debug!(viewer = viewer.state.id().raw(), layer = viewer.layer, "Spawned scene slot");

    Slot {
        layers,
        camera,
        lights,
        rig,
        content: None,
        shown: None,
        look_revision: 0,
        parts: Vec::new(),
        meshes: Vec::new(),
        materials: Vec::new(),
    }
}

fn perspective(camera: &CameraSettings) -> Projection {
    Projection::Perspective(PerspectiveProjection {
        fov: camera.fov.to_radians(),
        near: camera.near,
        far: camera.far,
        ..default()
    })
}

fn spawn_lights(commands: &mut Commands, lighting: &LightingSettings, layers: &RenderLayers) -> Vec<Entity> {
    let mut lights = Vec::new();

    if let Some(point) = &lighting.point {
        lights.push(
            commands
                .spawn((
                    PointLight {
                        intensity: point.intensity * LUMENS_PER_INTENSITY,
                        range: LIGHT_RANGE,
                        shadows_enabled: false,
                        ..default()
                    },
                    Transform::from_translation(Vec3::from_array(point.position)),
                    layers.clone(),
                ))
                .id(),
        );
    }

    if let Some(spot) = &lighting.spot {
        lights.push(
            commands
                .spawn((
                    SpotLight {
                        intensity: spot.intensity * LUMENS_PER_INTENSITY,
                        range: LIGHT_RANGE,
                        outer_angle: spot.angle,
                        inner_angle: spot.angle * (1.0 - spot.penumbra.clamp(0.0, 1.0)),
                        shadows_enabled: false,
                        ..default()
                    },
                    Transform::from_translation(Vec3::from_array(spot.position)).looking_at(Vec3::ZERO, Vec3::Y),
                    layers.clone(),
                ))
                .id(),
        );
    }

    lights
}

fn build_content(
    commands: &mut Commands,
    slot: &mut Slot,
    state: &ViewerState,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
) {
    match (state.status(), state.asset()) {
        (LoadStatus::Ready, Some(asset)) => {
            build_model(commands, slot, asset, state.normalization(), meshes, materials)
        }
        (LoadStatus::Error, _) => build_placeholder(commands, slot, ERROR_COLOR, meshes, materials),
        (LoadStatus::Loading, _) => build_placeholder(commands, slot, LOADING_COLOR, meshes, materials),
        _ => {}
    }
}

fn build_model(
    commands: &mut Commands,
    slot: &mut Slot,
    asset: &LoadedAsset,
    normalization: Option<&Normalization>,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
) {
    let content = commands
        .spawn((
            content_transform(asset, normalization),
            Visibility::default(),
            slot.layers.clone(),
            ChildOf(slot.rig),
        ))
        .id();

    for (id, placement) in asset.part_placements() {
        let Some(part) = asset.part(id) else {
            continue;
        };

        let surface_handle = meshes.add(surface_mesh(&part.geometry, placement));
        let material = part.material.unwrap_or_else(|| fallback_material(LOADING_COLOR));
        let surface = materials.add(surface_material(&material));
        commands.spawn((
            Mesh3d(surface_handle.clone()),
            MeshMaterial3d(surface.clone()),
            Transform::default(),
            slot.layers.clone(),
            PartMesh { part: id },
            ChildOf(content),
        ));
        slot.meshes.push(surface_handle);
        slot.materials.push(surface.clone());

        let overlay = part.overlay.as_ref().map(|overlay| {
            let lines = meshes.add(overlay_mesh(&overlay.segments, placement));
            let material = materials.add(overlay_material(overlay));
            let entity = commands
                .spawn((
                    Mesh3d(lines.clone()),
                    MeshMaterial3d(material.clone()),
                    Transform::default(),
                    overlay_visibility(overlay.visible),
                    slot.layers.clone(),
                    OverlayLines { part: id },
                    ChildOf(content),
                ))
                .id();
            slot.meshes.push(lines);
            slot.materials.push(material.clone());
            (entity, material)
        });

        slot.parts.push(PartHandles {
            part: id,
            surface,
            overlay,
        });
    }

    slot.content = Some(content);
}

fn build_placeholder(
    commands: &mut Commands,
    slot: &mut Slot,
    color: Rgb,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
) {
    let mesh = meshes.add(Cuboid::from_length(PLACEHOLDER_SIZE));
    let material = materials.add(surface_material(&fallback_material(color)));
    let content = commands
        .spawn((
            Mesh3d(mesh.clone()),
            MeshMaterial3d(material.clone()),
            Transform::default(),
            Visibility::default(),
            slot.layers.clone(),
            Placeholder,
            ChildOf(slot.rig),
        ))
        .id();
    slot.meshes.push(mesh);
    slot.materials.push(material);
    slot.content = Some(content);
}

fn update_look(
    commands: &mut Commands,
    slot: &Slot,
    asset: &LoadedAsset,
    materials: &mut Assets<StandardMaterial>,
) {
    for handles in &slot.parts {
        let Some(part) = asset.part(handles.part) else {
            continue;
        };

        if let (Some(material), Some(surface)) = (part.material, materials.get_mut(&handles.surface)) {
            apply_surface(surface, &material);
        }

        if let (Some(overlay), Some((entity, handle))) = (&part.overlay, &handles.overlay) {
            if let Some(lines) = materials.get_mut(handle) {
                apply_overlay(lines, overlay);
            }
            commands.entity(*entity).insert(overlay_visibility(overlay.visible));
        }
    }
}

fn release_content(
    commands: &mut Commands,
    slot: &mut Slot,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
) {
    if let Some(content) = slot.content.take() {
        commands.entity(content).despawn();
    }
    for mesh in slot.meshes.drain(..) {
        meshes.remove(&mesh);
    }
    for material in slot.materials.drain(..) {
        materials.remove(&material);
    }
    slot.parts.clear();
}

pub fn rgb_color(color: Rgb) -> Color {
    Color::srgb_u8(color.r, color.g, color.b)
}

fn fallback_material(color: Rgb) -> Material {
    Material {
        base_color: color,
        metalness: 0.0,
        roughness: 0.8,
        env_intensity: 0.5,
    }
}

/// PBR material for a decorated part
///
/// Environment intensity drives specular reflectance; both default to 0.5.
pub fn surface_material(material: &Material) -> StandardMaterial {
    let mut out = StandardMaterial {
        double_sided: true,
        cull_mode: None,
        ..default()
    };
    apply_surface(&mut out, material);
    out
}

fn apply_surface(out: &mut StandardMaterial, material: &Material) {
    out.base_color = rgb_color(material.base_color);
    out.metallic = material.metalness;
    out.perceptual_roughness = material.roughness;
    out.reflectance = material.env_intensity;
}

pub fn overlay_material(overlay: &WireframeOverlay) -> StandardMaterial {
    let mut out = StandardMaterial {
        unlit: true,
        depth_bias: OVERLAY_DEPTH_BIAS,
        ..default()
    };
    apply_overlay(&mut out, overlay);
    out
}

fn apply_overlay(out: &mut StandardMaterial, overlay: &WireframeOverlay) {
    out.base_color = rgb_color(overlay.color).with_alpha(overlay.opacity);
    out.alpha_mode = if overlay.opacity < 1.0 {
        AlphaMode::Blend
    } else {
        AlphaMode::Opaque
    };
}

fn overlay_visibility(visible: bool) -> Visibility {
    if visible {
        Visibility::Inherited
    } else {
        Visibility::Hidden
    }
}

/// Flat-shaded triangle list with `placement` baked into the positions
pub fn surface_mesh(geometry: &MeshGeometry, placement: Mat4) -> Mesh {
    let mut positions = Vec::with_capacity(geometry.triangle_count() * 3);
    let mut normals = Vec::with_capacity(geometry.triangle_count() * 3);

    for &triangle in &geometry.triangles {
        let corners = geometry
            .triangle_positions(triangle)
            .map(|p| placement.transform_point3(p));
        let normal = (corners[1] - corners[0])
            .cross(corners[2] - corners[0])
            .normalize_or_zero();
        for corner in corners {
            positions.push(corner.to_array());
            normals.push(normal.to_array());
        }
    }

    Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, normals)
}

/// Line list for overlay segments with `placement` baked in
pub fn overlay_mesh(segments: &[[Vec3; 2]], placement: Mat4) -> Mesh {
    let positions: Vec<[f32; 3]> = segments
        .iter()
        .flat_map(|segment| segment.map(|p| placement.transform_point3(p).to_array()))
        .collect();

    Mesh::new(PrimitiveTopology::LineList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
}

/// Rotation taking the Z-up model space to the Y-up display space
pub fn z_up_to_y_up() -> Quat {
    Quat::from_rotation_x(-FRAC_PI_2)
}

/// Transform of a model under its rig: normalized, centered, then stood upright
pub fn content_transform(asset: &LoadedAsset, normalization: Option<&Normalization>) -> Transform {
    let center = normalization
        .map(|n| n.bounds.center())
        .unwrap_or_else(|| asset.world_bounds().center());
    let matrix = Mat4::from_quat(z_up_to_y_up()) * Mat4::from_translation(-center) * asset.root.transform;
    Transform::from_matrix(matrix)
}

fn display_transform(display: Option<&DisplayTransform>) -> Transform {
    match display {
        Some(display) => Transform {
            translation: Vec3::from_array(display.position),
            rotation: display.rotation_quat(),
            scale: Vec3::from_array(display.scale),
        },
        None => Transform::IDENTITY,
    }
}
