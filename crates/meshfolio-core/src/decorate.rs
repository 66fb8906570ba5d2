//! Presentation decoration: materials and wireframe overlays
//!
//! [`decorate`] is safe to call repeatedly. The first call derives overlay
//! geometry from each part's mesh; later calls only rewrite the material and
//! overlay parameters in place.

use glam::Vec3;
use std::collections::HashMap;
use std::sync::Arc;

use crate::asset::{LoadedAsset, MeshGeometry};
use crate::color::{ColorPreset, Rgb};

/// Faces meeting at less than this angle (degrees) share no overlay edge
pub const EDGE_THRESHOLD_DEGREES: f32 = 1.0;

/// Vertex positions are merged after rounding to this many decimal places
const MERGE_PRECISION: f32 = 1e4;

/// Surface material of one part
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub base_color: Rgb,
    pub metalness: f32,
    pub roughness: f32,
    /// Environment reflection strength
    pub env_intensity: f32,
}

impl Material {
    pub fn from_preset(preset: &ColorPreset) -> Self {
        Self {
            base_color: preset.color,
            metalness: preset.metalness,
            roughness: preset.roughness,
            env_intensity: preset.env_intensity(),
        }
    }
}

/// Edge lines drawn over a part, in the part's local space
#[derive(Debug, Clone, PartialEq)]
pub struct WireframeOverlay {
    pub segments: Arc<[[Vec3; 2]]>,
    pub color: Rgb,
    pub opacity: f32,
    pub visible: bool,
}

/// Counts from one [`decorate`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecorateReport {
    pub parts: usize,
    /// Overlays whose geometry was computed during this pass
    pub overlays_derived: usize,
}

/// Assign materials and overlays to every drawable part of `asset`
pub fn decorate(asset: &mut LoadedAsset, preset: &ColorPreset, wireframe_visible: bool) -> DecorateReport {
    let mut report = DecorateReport::default();
    let mut derived: HashMap<*const MeshGeometry, Arc<[[Vec3; 2]]>> = HashMap::new();
    let opacity = preset.overlay_opacity();

    for part in &mut asset.parts {
        report.parts += 1;

        let material = Material::from_preset(preset);
        match &mut part.material {
            Some(existing) => *existing = material,
            None => part.material = Some(material),
        }

        match &mut part.overlay {
            Some(overlay) => {
                overlay.color = Rgb::BLACK;
                overlay.opacity = opacity;
                overlay.visible = wireframe_visible;
            }
            None => {
                let segments = derived
                    .entry(Arc::as_ptr(&part.geometry))
                    .or_insert_with(|| {
                        report.overlays_derived += 1;
                        edge_segments(&part.geometry, EDGE_THRESHOLD_DEGREES).into()
                    })
                    .clone();
                part.overlay = Some(WireframeOverlay {
                    segments,
                    color: Rgb::BLACK,
                    opacity,
                    visible: wireframe_visible,
                });
            }
        }
    }

    report
}

/// Show or hide every overlay, leaving materials alone
pub fn set_wireframe_visible(asset: &mut LoadedAsset, visible: bool) -> usize {
    let mut touched = 0;
    for overlay in asset.parts.iter_mut().filter_map(|p| p.overlay.as_mut()) {
        overlay.visible = visible;
        touched += 1;
    }
    touched
}

type VertexKey = [i64; 3];

struct EdgeEntry {
    start: Vec3,
    end: Vec3,
    normal: Vec3,
}

/// Feature edges of a mesh
///
/// An edge is kept when the two faces sharing it differ in orientation by
/// more than `threshold_degrees`, or when only one face uses it. Degenerate
/// triangles are skipped. Output order follows triangle order.
pub fn edge_segments(geometry: &MeshGeometry, threshold_degrees: f32) -> Vec<[Vec3; 2]> {
    let threshold_dot = threshold_degrees.to_radians().cos();
    let mut segments = Vec::new();
    let mut slots: HashMap<(VertexKey, VertexKey), usize> = HashMap::new();
    let mut open: Vec<Option<EdgeEntry>> = Vec::new();

    for &triangle in &geometry.triangles {
        let corners = geometry.triangle_positions(triangle);
        let keys = corners.map(vertex_key);
        if keys[0] == keys[1] || keys[1] == keys[2] || keys[2] == keys[0] {
            continue;
        }

        let normal = (corners[1] - corners[0])
            .cross(corners[2] - corners[0])
            .normalize_or_zero();

        for j in 0..3 {
            let next = (j + 1) % 3;
            let forward = (keys[j], keys[next]);
            let reverse = (keys[next], keys[j]);

            if let Some(&slot) = slots.get(&reverse) {
                if let Some(entry) = open[slot].take() {
                    if normal.dot(entry.normal) <= threshold_dot {
                        segments.push([entry.start, entry.end]);
                    }
                    continue;
                }
            }

            if !slots.contains_key(&forward) {
                slots.insert(forward, open.len());
                open.push(Some(EdgeEntry {
                    start: corners[j],
                    end: corners[next],
                    normal,
                }));
            }
        }
    }

    segments.extend(open.into_iter().flatten().map(|e| [e.start, e.end]));
    segments
}

fn vertex_key(p: Vec3) -> VertexKey {
    [p.x, p.y, p.z].map(|c| (c * MERGE_PRECISION).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::LoadedAsset;
    use crate::color::{resolve_preset, METALLIC_PRESETS, STANDARD_PRESETS};
    use crate::threemf::fixtures::box_package;
    use crate::threemf::Package;

    fn box_asset() -> LoadedAsset {
        let package = Package::read(&box_package([2.0, 2.0, 2.0])).unwrap();
        LoadedAsset::from_package("box", &package).unwrap()
    }

    #[test]
    fn test_box_has_twelve_feature_edges() {
        let asset = box_asset();
        let segments = edge_segments(&asset.parts[0].geometry, EDGE_THRESHOLD_DEGREES);
        assert_eq!(segments.len(), 12);
        for [a, b] in segments {
            assert!(((a - b).length() - 2.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_open_triangle_keeps_boundary() {
        let geometry = MeshGeometry {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            triangles: vec![[0, 1, 2]],
        };
        assert_eq!(edge_segments(&geometry, EDGE_THRESHOLD_DEGREES).len(), 3);
    }

    #[test]
    fn test_degenerate_triangles_skipped() {
        let geometry = MeshGeometry {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::new(0.00001, 0.0, 0.0)],
            triangles: vec![[0, 1, 2]],
        };
        assert!(edge_segments(&geometry, EDGE_THRESHOLD_DEGREES).is_empty());
    }

    #[test]
    fn test_decorate_assigns_material_and_overlay() {
        let mut asset = box_asset();
        let white = resolve_preset(Rgb::WHITE);
        let report = decorate(&mut asset, &white, true);

        assert_eq!(report, DecorateReport { parts: 1, overlays_derived: 1 });
        let part = &asset.parts[0];
        assert!(part.is_decorated());

        let material = part.material.unwrap();
        assert_eq!(material.base_color, Rgb::WHITE);
        assert_eq!(material.metalness, white.metalness);
        assert_eq!(material.env_intensity, 0.5);

        let overlay = part.overlay.as_ref().unwrap();
        assert_eq!(overlay.color, Rgb::BLACK);
        assert_eq!(overlay.opacity, 1.0);
        assert!(overlay.visible);
    }

    #[test]
    fn test_redecorate_keeps_overlay_geometry() {
        let mut asset = box_asset();
        decorate(&mut asset, &STANDARD_PRESETS[0], true);
        let before = asset.parts[0].overlay.as_ref().unwrap().segments.clone();

        let gold = METALLIC_PRESETS[0];
        let report = decorate(&mut asset, &gold, false);
        assert_eq!(report.overlays_derived, 0);

        let part = &asset.parts[0];
        let overlay = part.overlay.as_ref().unwrap();
        assert!(Arc::ptr_eq(&before, &overlay.segments));
        assert_eq!(overlay.opacity, 0.3);
        assert!(!overlay.visible);
        assert_eq!(part.material.unwrap().env_intensity, 0.7);
        assert_eq!(part.material.unwrap().base_color, gold.color);
    }

    #[test]
    fn test_decorate_is_idempotent() {
        let mut asset = box_asset();
        let preset = STANDARD_PRESETS[3];
        decorate(&mut asset, &preset, true);
        let material = asset.parts[0].material;
        let overlay = asset.parts[0].overlay.clone();

        decorate(&mut asset, &preset, true);
        assert_eq!(asset.parts[0].material, material);
        assert_eq!(asset.parts[0].overlay, overlay);
    }

    #[test]
    fn test_visibility_toggle_leaves_material() {
        let mut asset = box_asset();
        decorate(&mut asset, &METALLIC_PRESETS[1], true);
        let material = asset.parts[0].material;

        assert_eq!(set_wireframe_visible(&mut asset, false), 1);
        assert!(!asset.parts[0].overlay.as_ref().unwrap().visible);
        assert_eq!(asset.parts[0].material, material);
    }

    #[test]
    fn test_undecorated_visibility_is_noop() {
        let mut asset = box_asset();
        assert_eq!(set_wireframe_visible(&mut asset, true), 0);
        assert!(asset.parts[0].overlay.is_none());
    }
}
