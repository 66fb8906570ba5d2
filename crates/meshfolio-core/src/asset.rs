//! Loaded model scene graph
//!
//! A [`LoadedAsset`] is a tree of [`SceneNode`]s whose leaves point into an
//! arena of [`DrawablePart`]s. Derived presentation data (materials and
//! wireframe overlays) hangs off the parts, so dropping the asset drops
//! everything attached to it.

use glam::{Mat4, Vec3};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::decorate::{Material, WireframeOverlay};
use crate::threemf::{parse_transform, ObjectXml, Package, ThreeMfError};

/// Index of a part in [`LoadedAsset::parts`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartId(pub usize);

impl PartId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a scene node is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Transform-only node
    Group,
    /// Leaf carrying geometry
    Drawable(PartId),
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    /// Transform relative to the parent node
    pub transform: Mat4,
    pub role: NodeRole,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn group(name: impl Into<String>, transform: Mat4) -> Self {
        Self {
            name: name.into(),
            transform,
            role: NodeRole::Group,
            children: Vec::new(),
        }
    }

    pub fn is_drawable(&self) -> bool {
        matches!(self.role, NodeRole::Drawable(_))
    }
}

/// Triangle mesh with indices validated against the vertex list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshGeometry {
    pub positions: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl MeshGeometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Corner positions of one triangle
    pub fn triangle_positions(&self, triangle: [u32; 3]) -> [Vec3; 3] {
        triangle.map(|i| self.positions[i as usize])
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.positions.iter().copied())
    }
}

/// Leaf of the scene graph with its presentation attachments
#[derive(Debug, Clone)]
pub struct DrawablePart {
    pub name: String,
    /// Shared between parts that instance the same object
    pub geometry: Arc<MeshGeometry>,
    pub material: Option<Material>,
    pub overlay: Option<WireframeOverlay>,
}

impl DrawablePart {
    pub fn new(name: impl Into<String>, geometry: Arc<MeshGeometry>) -> Self {
        Self {
            name: name.into(),
            geometry,
            material: None,
            overlay: None,
        }
    }

    pub fn is_decorated(&self) -> bool {
        self.material.is_some() && self.overlay.is_some()
    }
}

/// Axis-aligned bounding box; empty when `min > max`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |b, p| b.including(p))
    }

    pub fn including(self, point: Vec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    pub fn union(self, other: Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            (self.min + self.max) * 0.5
        }
    }

    pub fn max_dimension(&self) -> f32 {
        self.size().max_element()
    }
}

/// Scene graph built from one loaded file, owned by one viewer
#[derive(Debug, Clone)]
pub struct LoadedAsset {
    /// Location the asset was loaded from
    pub source: String,
    pub root: SceneNode,
    pub parts: Vec<DrawablePart>,
    pub metadata: BTreeMap<String, String>,
    pub unit: String,
}

impl LoadedAsset {
    /// Build the scene graph for a parsed package
    ///
    /// Build items become children of the root; components become groups.
    /// Every mesh reference yields its own part so decorations stay per part,
    /// while geometry is shared between references to the same object.
    pub fn from_package(source: &str, package: &Package) -> Result<Self, ThreeMfError> {
        let model = package.root();
        let mut builder = Builder {
            package,
            parts: Vec::new(),
            geometry: HashMap::new(),
            stack: Vec::new(),
        };

        let mut root = SceneNode::group("root", Mat4::IDENTITY);
        for item in &model.build.items {
            let transform = parse_optional_transform(item.transform.as_deref())?;
            let node = builder.object_node(
                package.root_path(),
                item.path.as_deref(),
                item.object_id,
                transform,
            )?;
            root.children.push(node);
        }

        let metadata = model
            .metadata
            .iter()
            .filter(|m| !m.value.trim().is_empty())
            .map(|m| (m.name.clone(), m.value.trim().to_string()))
            .collect();

        Ok(Self {
            source: source.to_string(),
            root,
            parts: builder.parts,
            metadata,
            unit: model.unit.clone().unwrap_or_else(|| "millimeter".to_string()),
        })
    }

    pub fn part(&self, id: PartId) -> Option<&DrawablePart> {
        self.parts.get(id.0)
    }

    pub fn part_ids(&self) -> impl Iterator<Item = PartId> {
        (0..self.parts.len()).map(PartId)
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata_value("Title")
    }

    pub fn designer(&self) -> Option<&str> {
        self.metadata_value("Designer")
    }

    fn metadata_value(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn vertex_count(&self) -> usize {
        self.parts.iter().map(|p| p.geometry.vertex_count()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.parts.iter().map(|p| p.geometry.triangle_count()).sum()
    }

    /// Transform of every drawable part relative to the root node
    ///
    /// The root's own transform is excluded; it is applied by whoever
    /// places the asset as a whole.
    pub fn part_placements(&self) -> Vec<(PartId, Mat4)> {
        let mut out = Vec::with_capacity(self.parts.len());
        for child in &self.root.children {
            collect_placements(child, Mat4::IDENTITY, &mut out);
        }
        out
    }

    /// Bounds of all vertices with every transform applied, root included
    pub fn world_bounds(&self) -> Aabb {
        self.part_placements()
            .into_iter()
            .filter_map(|(id, placement)| {
                let part = self.part(id)?;
                let world = self.root.transform * placement;
                Some(Aabb::from_points(
                    part.geometry.positions.iter().map(|p| world.transform_point3(*p)),
                ))
            })
            .fold(Aabb::EMPTY, Aabb::union)
    }
}

fn collect_placements(node: &SceneNode, parent: Mat4, out: &mut Vec<(PartId, Mat4)>) {
    let world = parent * node.transform;
    if let NodeRole::Drawable(id) = node.role {
        out.push((id, world));
    }
    for child in &node.children {
        collect_placements(child, world, out);
    }
}

fn parse_optional_transform(text: Option<&str>) -> Result<Mat4, ThreeMfError> {
    match text {
        Some(t) if !t.trim().is_empty() => parse_transform(t),
        _ => Ok(Mat4::IDENTITY),
    }
}

struct Builder<'a> {
    package: &'a Package,
    parts: Vec<DrawablePart>,
    geometry: HashMap<(String, u32), Arc<MeshGeometry>>,
    /// Objects currently being expanded, for cycle detection
    stack: Vec<(String, u32)>,
}

impl Builder<'_> {
    fn object_node(
        &mut self,
        from_part: &str,
        path: Option<&str>,
        id: u32,
        transform: Mat4,
    ) -> Result<SceneNode, ThreeMfError> {
        let (part_path, object) = self.package.resolve_object(from_part, path, id)?;
        let key = (part_path.clone(), id);
        if self.stack.contains(&key) {
            return Err(ThreeMfError::ComponentCycle(id));
        }

        let name = object
            .name
            .clone()
            .unwrap_or_else(|| format!("object {}", id));

        if object.mesh.is_some() {
            let geometry = self.geometry_for(&key, object)?;
            let part_id = PartId(self.parts.len());
            self.parts.push(DrawablePart::new(name.clone(), geometry));
            return Ok(SceneNode {
                name,
                transform,
                role: NodeRole::Drawable(part_id),
                children: Vec::new(),
            });
        }

        let mut node = SceneNode::group(name, transform);
        if let Some(components) = &object.components {
            self.stack.push(key);
            for component in &components.component {
                let child_transform = parse_optional_transform(component.transform.as_deref())?;
                let child = self.object_node(
                    &part_path,
                    component.path.as_deref(),
                    component.object_id,
                    child_transform,
                )?;
                node.children.push(child);
            }
            self.stack.pop();
        }
        Ok(node)
    }

    fn geometry_for(
        &mut self,
        key: &(String, u32),
        object: &ObjectXml,
    ) -> Result<Arc<MeshGeometry>, ThreeMfError> {
        if let Some(geometry) = self.geometry.get(key) {
            return Ok(geometry.clone());
        }

        let geometry = Arc::new(mesh_geometry(object)?);
        self.geometry.insert(key.clone(), geometry.clone());
        Ok(geometry)
    }
}

fn mesh_geometry(object: &ObjectXml) -> Result<MeshGeometry, ThreeMfError> {
    let Some(mesh) = &object.mesh else {
        return Ok(MeshGeometry::default());
    };

    let positions: Vec<Vec3> = mesh
        .vertices
        .vertex
        .iter()
        .map(|v| Vec3::new(v.x, v.y, v.z))
        .collect();
    let count = positions.len();

    let triangles = mesh
        .triangles
        .triangle
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let indices = [t.v1, t.v2, t.v3];
            match indices.iter().find(|&&v| v as usize >= count) {
                Some(&index) => Err(ThreeMfError::BadIndex {
                    object: object.id,
                    triangle: i,
                    index,
                    count,
                }),
                None => Ok(indices),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MeshGeometry {
        positions,
        triangles,
    })
}
