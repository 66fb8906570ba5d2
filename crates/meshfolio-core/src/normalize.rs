//! Uniform rescale to the display volume

use glam::{Mat4, Vec3};
use thiserror::Error;

use crate::asset::{Aabb, LoadedAsset};

/// Largest bounding dimension after normalization, in display units
pub const TARGET_SIZE: f32 = 5.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("empty geometry")]
    Empty,
    #[error("non-finite bounding box")]
    NonFinite,
}

/// Outcome of [`normalize`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    /// Uniform factor applied to the root transform
    pub scale: f32,
    /// World bounds after scaling
    pub bounds: Aabb,
}

/// Scale `asset` so its largest bounding dimension equals [`TARGET_SIZE`]
pub fn normalize(asset: &mut LoadedAsset) -> Result<Normalization, GeometryError> {
    let bounds = asset.world_bounds();
    if bounds.is_empty() {
        return Err(GeometryError::Empty);
    }
    if !bounds.min.is_finite() || !bounds.max.is_finite() {
        return Err(GeometryError::NonFinite);
    }

    let max_dim = bounds.max_dimension();
    if max_dim <= 0.0 {
        return Err(GeometryError::Empty);
    }

    let scale = TARGET_SIZE / max_dim;
    if !scale.is_finite() {
        return Err(GeometryError::NonFinite);
    }

    asset.root.transform = Mat4::from_scale(Vec3::splat(scale)) * asset.root.transform;
    let bounds = asset.world_bounds();
    tracing::debug!(source = %asset.source, scale, "Normalized asset");
    Ok(Normalization { scale, bounds })
}
