//! Asset loading
//!
//! Bytes come from a [`ModelSource`] (browser fetch in the viewer, in-memory
//! maps in tests); parsing and scene graph construction happen here.

use std::future::Future;
use thiserror::Error;

use crate::asset::LoadedAsset;
use crate::normalize::GeometryError;
use crate::threemf::{Package, ThreeMfError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("Failed to fetch {location}: {reason}")]
    Fetch { location: String, reason: String },
    #[error("Fetching {location} returned HTTP {status}")]
    Http { location: String, status: u16 },
    #[error("Invalid 3MF package: {0}")]
    Package(#[from] ThreeMfError),
    #[error("Invalid geometry: {0}")]
    Geometry(#[from] GeometryError),
}

/// Bytes received so far for one load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadProgress {
    pub loaded: u64,
    /// Unknown when the server sends no content length
    pub total: Option<u64>,
}

impl LoadProgress {
    /// Completed fraction in `0.0..=1.0`, if the total is known
    pub fn fraction(&self) -> Option<f32> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.loaded as f64 / total as f64).clamp(0.0, 1.0) as f32),
            None => None,
        }
    }
}

/// Where model bytes come from
pub trait ModelSource {
    /// Fetch the raw file at `location`, reporting progress as bytes arrive
    fn fetch<'a>(
        &'a self,
        location: &'a str,
        progress: &'a mut dyn FnMut(LoadProgress),
    ) -> impl Future<Output = Result<Vec<u8>, LoadError>> + 'a;
}

/// Fetch and parse one asset
///
/// The result is not yet normalized or decorated.
pub async fn load_asset<S: ModelSource>(
    source: &S,
    location: &str,
    progress: &mut dyn FnMut(LoadProgress),
) -> Result<LoadedAsset, LoadError> {
    tracing::info!(location = %location, "Loading model");
    let bytes = source.fetch(location, progress).await?;
    parse_asset(location, &bytes)
}

/// Parse an already fetched file
pub fn parse_asset(location: &str, bytes: &[u8]) -> Result<LoadedAsset, LoadError> {
    let package = Package::read(bytes)?;
    let asset = LoadedAsset::from_package(location, &package)?;
    tracing::info!(
        location = %location,
        parts = asset.parts.len(),
        triangles = asset.triangle_count(),
        "Model parsed"
    );
    Ok(asset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threemf::fixtures::box_package;
    use std::collections::HashMap;

    struct MapSource(HashMap<String, Vec<u8>>);

    impl ModelSource for MapSource {
        async fn fetch<'a>(
            &'a self,
            location: &'a str,
            progress: &'a mut dyn FnMut(LoadProgress),
        ) -> Result<Vec<u8>, LoadError> {
            let bytes = self.0.get(location).cloned().ok_or_else(|| LoadError::Http {
                location: location.to_string(),
                status: 404,
            })?;
            let total = bytes.len() as u64;
            progress(LoadProgress {
                loaded: total / 2,
                total: Some(total),
            });
            progress(LoadProgress {
                loaded: total,
                total: Some(total),
            });
            Ok(bytes)
        }
    }

    #[test]
    fn test_progress_fraction() {
        assert_eq!(LoadProgress { loaded: 5, total: Some(10) }.fraction(), Some(0.5));
        assert_eq!(LoadProgress { loaded: 5, total: None }.fraction(), None);
        assert_eq!(LoadProgress { loaded: 0, total: Some(0) }.fraction(), Some(1.0));
        assert_eq!(LoadProgress { loaded: 20, total: Some(10) }.fraction(), Some(1.0));
    }

    #[tokio::test]
    async fn test_load_reports_progress() {
        let source = MapSource(HashMap::from([("/box.3mf".to_string(), box_package([1.0, 2.0, 3.0]))]));
        let mut seen = Vec::new();
        let asset = load_asset(&source, "/box.3mf", &mut |p| seen.push(p)).await.unwrap();

        assert_eq!(asset.parts.len(), 1);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen.last().and_then(LoadProgress::fraction), Some(1.0));
    }

    #[tokio::test]
    async fn test_missing_location() {
        let source = MapSource(HashMap::new());
        let err = load_asset(&source, "/nope.3mf", &mut |_| {}).await.unwrap_err();
        assert_eq!(
            err,
            LoadError::Http {
                location: "/nope.3mf".to_string(),
                status: 404
            }
        );
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_asset("/x.3mf", b"not a zip"),
            Err(LoadError::Package(ThreeMfError::Archive(_)))
        ));
    }
}
