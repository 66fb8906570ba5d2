//! Static model catalogue
//!
//! The catalogue ships embedded in the binary (`gallery.toml`) together with
//! the display settings. It is configuration, never edited at runtime.

use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::settings::GallerySettings;

/// Gallery configuration compiled into the crate
pub const BUILTIN_GALLERY: &str = include_str!("../gallery.toml");

/// Extension appended to a model's name for downloads
pub const DOWNLOAD_EXTENSION: &str = "3mf";

#[derive(Error, Debug)]
pub enum CatalogueError {
    #[error("Failed to parse gallery configuration: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Catalogue contains no models")]
    Empty,
    #[error("Duplicate model name in catalogue: {0}")]
    DuplicateName(String),
}

/// Default display transform for a model's preview rig
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayTransform {
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
    #[serde(default)]
    pub position: [f32; 3],
    /// Euler XYZ rotation in radians
    #[serde(default)]
    pub rotation: [f32; 3],
}

impl Default for DisplayTransform {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            position: [0.0; 3],
            rotation: [0.0; 3],
        }
    }
}

fn default_scale() -> [f32; 3] {
    [1.0; 3]
}

impl DisplayTransform {
    pub fn rotation_quat(&self) -> Quat {
        let [x, y, z] = self.rotation;
        Quat::from_euler(EulerRot::XYZ, x, y, z)
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::from_array(self.scale),
            self.rotation_quat(),
            Vec3::from_array(self.position),
        )
    }
}

/// One catalogue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    /// URI of the packaged mesh file
    pub source: String,
    pub description: String,
    #[serde(default)]
    pub display: DisplayTransform,
}

impl ModelDescriptor {
    /// Suggested filename for the download action
    pub fn download_filename(&self) -> String {
        format!("{}.{}", self.name, DOWNLOAD_EXTENSION)
    }
}

/// Ordered list of catalogue entries
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    models: Vec<ModelDescriptor>,
}

impl Catalogue {
    /// Build a catalogue, rejecting empty lists and duplicate names
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self, CatalogueError> {
        if models.is_empty() {
            return Err(CatalogueError::Empty);
        }

        let mut names = HashSet::new();
        for model in &models {
            if !names.insert(model.name.as_str()) {
                return Err(CatalogueError::DuplicateName(model.name.clone()));
            }
        }

        Ok(Self { models })
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn get(&self, index: usize) -> Option<&ModelDescriptor> {
        self.models.get(index)
    }

    pub fn find_by_name(&self, name: &str) -> Option<(usize, &ModelDescriptor)> {
        self.models.iter().enumerate().find(|(_, m)| m.name == name)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[derive(Deserialize)]
struct GalleryFile {
    #[serde(flatten)]
    settings: GallerySettings,
    #[serde(default, rename = "model")]
    models: Vec<ModelDescriptor>,
}

/// Display settings and catalogue parsed from one TOML document
#[derive(Debug, Clone)]
pub struct GalleryConfig {
    pub settings: GallerySettings,
    pub catalogue: Catalogue,
}

impl GalleryConfig {
    pub fn from_toml(text: &str) -> Result<Self, CatalogueError> {
        let file: GalleryFile = toml::from_str(text)?;
        let catalogue = Catalogue::new(file.models)?;
        tracing::debug!(models = catalogue.len(), "Gallery configuration parsed");
        Ok(Self {
            settings: file.settings,
            catalogue,
        })
    }

    /// The configuration embedded at build time
    pub fn builtin() -> Result<Self, CatalogueError> {
        Self::from_toml(BUILTIN_GALLERY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalogue() {
        let config = GalleryConfig::builtin().unwrap();
        let names: Vec<&str> = config.catalogue.models().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Ear Cuffs", "Cube Gears", "Torus", "Sphere", "Box"]);

        let (index, gears) = config.catalogue.find_by_name("Cube Gears").unwrap();
        assert_eq!(index, 1);
        assert_eq!(gears.source, "/models/cube_gears_prod.3mf");
        assert!((gears.display.rotation[1] - std::f32::consts::FRAC_PI_4).abs() < 1e-6);
        assert_eq!(gears.download_filename(), "Cube Gears.3mf");
    }

    #[test]
    fn test_display_transform_defaults() {
        let text = r#"
[[model]]
name = "Plain"
source = "/models/plain.3mf"
description = "No display table"
"#;
        let config = GalleryConfig::from_toml(text).unwrap();
        let plain = config.catalogue.get(0).unwrap();
        assert_eq!(plain.display, DisplayTransform::default());
        assert_eq!(plain.display.to_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_empty_catalogue_rejected() {
        assert!(matches!(GalleryConfig::from_toml("[viewer]\n"), Err(CatalogueError::Empty)));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let text = r#"
[[model]]
name = "Twin"
source = "/a.3mf"
description = "first"

[[model]]
name = "Twin"
source = "/b.3mf"
description = "second"
"#;
        match GalleryConfig::from_toml(text) {
            Err(CatalogueError::DuplicateName(name)) => assert_eq!(name, "Twin"),
            other => panic!("unexpected result: {:?}", other.map(|c| c.catalogue.len())),
        }
    }
}
