//! Meshfolio Core - Catalogue, 3MF loading, and the presentation pipeline
//!
//! This crate holds everything that does not need a renderer:
//! - Catalogue and display settings parsed from the embedded `gallery.toml`
//! - 3MF package reading (ZIP container, OPC relationships, model XML)
//! - The scene graph produced by the loader and the normalize/decorate stages
//! - Per-viewer state machine with stale-load discard, and gallery routing

pub mod asset;
pub mod catalogue;
pub mod color;
pub mod decorate;
pub mod gallery;
pub mod loader;
pub mod normalize;
pub mod settings;
pub mod threemf;
pub mod viewer;

pub use asset::{Aabb, DrawablePart, LoadedAsset, MeshGeometry, NodeRole, PartId, SceneNode};
pub use catalogue::{Catalogue, CatalogueError, DisplayTransform, GalleryConfig, ModelDescriptor};
pub use color::{ColorError, ColorPreset, PresetFamily, Rgb};
pub use decorate::{decorate, set_wireframe_visible, DecorateReport, Material, WireframeOverlay};
pub use gallery::{AppState, AppView, GalleryError, PreviewPipeline};
pub use loader::{load_asset, parse_asset, LoadError, LoadProgress, ModelSource};
pub use normalize::{normalize, GeometryError, Normalization, TARGET_SIZE};
pub use settings::GallerySettings;
pub use threemf::{Package, ThreeMfError};
pub use viewer::{Completion, LoadStatus, LoadTicket, ViewerId, ViewerState};
