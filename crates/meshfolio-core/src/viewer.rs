//! Per-viewer state machine
//!
//! ```text
//! Idle --select--> Loading --complete(Ok)--> Ready
//!                     |                        |
//!                     +--complete(Err)--> Error |
//!                                          ^    |
//!              select(other) from any state: back to Loading
//! ```
//!
//! Every `select` issues a [`LoadTicket`]. A completion only applies if its
//! ticket is the newest one for this viewer; older results are dropped, so
//! the most recent selection always wins.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::asset::LoadedAsset;
use crate::color::{resolve_preset, ColorError, ColorPreset, Rgb};
use crate::decorate::{decorate, set_wireframe_visible};
use crate::loader::{LoadError, LoadProgress};
use crate::normalize::{normalize, Normalization};

static NEXT_VIEWER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one viewer instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewerId(u64);

impl ViewerId {
    pub fn next() -> Self {
        Self(NEXT_VIEWER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Identifies one requested load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub viewer: ViewerId,
    pub generation: u64,
    pub location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

/// Result of handing a finished load to a viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The result was current and moved the viewer to this status
    Applied(LoadStatus),
    /// A newer selection superseded the ticket; the result was dropped
    Stale,
}

/// Display state owned by one viewer (main viewer or gallery preview)
#[derive(Debug)]
pub struct ViewerState {
    id: ViewerId,
    initial_color: Rgb,
    initial_wireframe: bool,
    wanted: Option<String>,
    generation: u64,
    status: LoadStatus,
    asset: Option<LoadedAsset>,
    normalization: Option<Normalization>,
    error: Option<LoadError>,
    progress: Option<LoadProgress>,
    wireframe_visible: bool,
    active_color: Rgb,
    active_preset: ColorPreset,
    asset_revision: u64,
    look_revision: u64,
}

impl ViewerState {
    pub fn new(color: Rgb, wireframe_visible: bool) -> Self {
        Self {
            id: ViewerId::next(),
            initial_color: color,
            initial_wireframe: wireframe_visible,
            wanted: None,
            generation: 0,
            status: LoadStatus::Idle,
            asset: None,
            normalization: None,
            error: None,
            progress: None,
            wireframe_visible,
            active_color: color,
            active_preset: resolve_preset(color),
            asset_revision: 0,
            look_revision: 0,
        }
    }

    pub fn id(&self) -> ViewerId {
        self.id
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    /// Location of the most recent selection
    pub fn location(&self) -> Option<&str> {
        self.wanted.as_deref()
    }

    pub fn asset(&self) -> Option<&LoadedAsset> {
        self.asset.as_ref()
    }

    pub fn normalization(&self) -> Option<&Normalization> {
        self.normalization.as_ref()
    }

    pub fn error(&self) -> Option<&LoadError> {
        self.error.as_ref()
    }

    pub fn progress(&self) -> Option<LoadProgress> {
        self.progress
    }

    pub fn wireframe_visible(&self) -> bool {
        self.wireframe_visible
    }

    pub fn active_color(&self) -> Rgb {
        self.active_color
    }

    /// Effective preset for the active color
    pub fn active_preset(&self) -> &ColorPreset {
        &self.active_preset
    }

    /// Bumped whenever the asset is replaced or dropped
    pub fn asset_revision(&self) -> u64 {
        self.asset_revision
    }

    /// Bumped whenever materials or overlay visibility change
    pub fn look_revision(&self) -> u64 {
        self.look_revision
    }

    /// Start loading `location`
    ///
    /// Returns `None` when that location is already loading or shown.
    /// Selecting it again from `Error` retries.
    pub fn select(&mut self, location: &str) -> Option<LoadTicket> {
        if self.wanted.as_deref() == Some(location)
            && matches!(self.status, LoadStatus::Loading | LoadStatus::Ready)
        {
            return None;
        }

        self.generation += 1;
        self.wanted = Some(location.to_string());
        self.status = LoadStatus::Loading;
        self.error = None;
        self.progress = None;
        self.normalization = None;
        self.wireframe_visible = self.initial_wireframe;
        self.active_color = self.initial_color;
        self.active_preset = resolve_preset(self.initial_color);
        if self.asset.take().is_some() {
            self.asset_revision += 1;
        }
        self.look_revision += 1;

        tracing::debug!(
            viewer = self.id.raw(),
            generation = self.generation,
            location = %location,
            "Viewer selected model"
        );

        Some(LoadTicket {
            viewer: self.id,
            generation: self.generation,
            location: location.to_string(),
        })
    }

    /// Whether a result for `ticket` would still be applied
    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.viewer == self.id
            && ticket.generation == self.generation
            && self.status == LoadStatus::Loading
            && self.wanted.as_deref() == Some(ticket.location.as_str())
    }

    /// Record download progress; ignored for stale tickets
    pub fn report_progress(&mut self, ticket: &LoadTicket, progress: LoadProgress) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.progress = Some(progress);
        true
    }

    /// Apply a finished load: normalize and decorate on success
    pub fn complete(&mut self, ticket: &LoadTicket, result: Result<LoadedAsset, LoadError>) -> Completion {
        if !self.is_current(ticket) {
            tracing::debug!(
                viewer = self.id.raw(),
                generation = ticket.generation,
                location = %ticket.location,
                "Discarding stale load result"
            );
            return Completion::Stale;
        }

        let prepared = result.and_then(|mut asset| {
            let normalization = normalize(&mut asset)?;
            decorate(&mut asset, &self.active_preset, self.wireframe_visible);
            Ok((asset, normalization))
        });

        match prepared {
            Ok((asset, normalization)) => {
                tracing::info!(
                    viewer = self.id.raw(),
                    location = %ticket.location,
                    parts = asset.parts.len(),
                    scale = normalization.scale,
                    "Model ready"
                );
                self.asset = Some(asset);
                self.normalization = Some(normalization);
                self.status = LoadStatus::Ready;
            }
            Err(e) => {
                tracing::error!(
                    viewer = self.id.raw(),
                    location = %ticket.location,
                    "Failed to load model: {}",
                    e
                );
                self.error = Some(e);
                self.status = LoadStatus::Error;
            }
        }

        self.progress = None;
        self.asset_revision += 1;
        self.look_revision += 1;
        Completion::Applied(self.status)
    }

    /// Flip overlay visibility; returns the new value
    pub fn toggle_wireframe(&mut self) -> bool {
        self.set_wireframe(!self.wireframe_visible);
        self.wireframe_visible
    }

    pub fn set_wireframe(&mut self, visible: bool) {
        if self.wireframe_visible == visible {
            return;
        }
        self.wireframe_visible = visible;
        if let Some(asset) = &mut self.asset {
            set_wireframe_visible(asset, visible);
        }
        self.look_revision += 1;
    }

    /// Change the active color and redecorate in place
    pub fn set_color(&mut self, color: Rgb) {
        self.active_color = color;
        self.active_preset = resolve_preset(color);
        if let Some(asset) = &mut self.asset {
            decorate(asset, &self.active_preset, self.wireframe_visible);
        }
        self.look_revision += 1;
    }

    /// Parse typed color text; invalid text leaves the color unchanged
    pub fn set_color_text(&mut self, text: &str) -> Result<(), ColorError> {
        let color = Rgb::parse(text)?;
        self.set_color(color);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::METALLIC_PRESETS;
    use crate::loader::parse_asset;
    use crate::threemf::fixtures::box_package;

    fn box_asset(location: &str) -> Result<LoadedAsset, LoadError> {
        parse_asset(location, &box_package([4.0, 2.0, 1.0]))
    }

    fn not_found(location: &str) -> Result<LoadedAsset, LoadError> {
        Err(LoadError::Http {
            location: location.to_string(),
            status: 404,
        })
    }

    #[test]
    fn test_load_to_ready() {
        let mut viewer = ViewerState::new(Rgb::WHITE, true);
        assert_eq!(viewer.status(), LoadStatus::Idle);

        let ticket = viewer.select("/a.3mf").unwrap();
        assert_eq!(viewer.status(), LoadStatus::Loading);
        assert_eq!(
            viewer.complete(&ticket, box_asset("/a.3mf")),
            Completion::Applied(LoadStatus::Ready)
        );

        let asset = viewer.asset().unwrap();
        assert!(asset.parts.iter().all(|p| p.is_decorated()));
        assert!(viewer.wireframe_visible());
        assert!((asset.world_bounds().max_dimension() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_reselect_same_location_is_noop() {
        let mut viewer = ViewerState::new(Rgb::WHITE, true);
        let ticket = viewer.select("/a.3mf").unwrap();
        assert!(viewer.select("/a.3mf").is_none());

        viewer.complete(&ticket, box_asset("/a.3mf"));
        assert!(viewer.select("/a.3mf").is_none());
        assert_eq!(viewer.status(), LoadStatus::Ready);
    }

    #[test]
    fn test_newer_selection_wins() {
        let mut viewer = ViewerState::new(Rgb::WHITE, true);
        let a = viewer.select("/a.3mf").unwrap();
        let b = viewer.select("/b.3mf").unwrap();

        assert_eq!(viewer.complete(&a, box_asset("/a.3mf")), Completion::Stale);
        assert_eq!(viewer.status(), LoadStatus::Loading);
        assert!(!viewer.report_progress(&a, LoadProgress::default()));

        assert_eq!(
            viewer.complete(&b, box_asset("/b.3mf")),
            Completion::Applied(LoadStatus::Ready)
        );
        assert_eq!(viewer.asset().unwrap().source, "/b.3mf");
    }

    #[test]
    fn test_duplicate_completion_is_stale() {
        let mut viewer = ViewerState::new(Rgb::WHITE, true);
        let ticket = viewer.select("/a.3mf").unwrap();
        viewer.complete(&ticket, box_asset("/a.3mf"));
        assert_eq!(viewer.complete(&ticket, not_found("/a.3mf")), Completion::Stale);
        assert_eq!(viewer.status(), LoadStatus::Ready);
    }

    #[test]
    fn test_error_then_retry() {
        let mut viewer = ViewerState::new(Rgb::WHITE, true);
        let ticket = viewer.select("/a.3mf").unwrap();
        viewer.complete(&ticket, not_found("/a.3mf"));
        assert_eq!(viewer.status(), LoadStatus::Error);
        assert!(viewer.asset().is_none());
        assert!(viewer.error().is_some());

        let retry = viewer.select("/a.3mf").unwrap();
        assert!(viewer.error().is_none());
        viewer.complete(&retry, box_asset("/a.3mf"));
        assert_eq!(viewer.status(), LoadStatus::Ready);
    }

    #[test]
    fn test_toggle_wireframe_twice() {
        let mut viewer = ViewerState::new(Rgb::WHITE, true);
        let ticket = viewer.select("/a.3mf").unwrap();
        viewer.complete(&ticket, box_asset("/a.3mf"));
        let material = viewer.asset().unwrap().parts[0].material;
        let revision = viewer.asset_revision();

        assert!(!viewer.toggle_wireframe());
        assert!(!viewer.asset().unwrap().parts[0].overlay.as_ref().unwrap().visible);
        assert!(viewer.toggle_wireframe());
        assert!(viewer.asset().unwrap().parts[0].overlay.as_ref().unwrap().visible);

        assert_eq!(viewer.asset().unwrap().parts[0].material, material);
        assert_eq!(viewer.asset_revision(), revision);
        assert_eq!(viewer.status(), LoadStatus::Ready);
    }

    #[test]
    fn test_set_color_resolves_preset() {
        let mut viewer = ViewerState::new(Rgb::WHITE, false);
        let ticket = viewer.select("/a.3mf").unwrap();
        viewer.complete(&ticket, box_asset("/a.3mf"));

        let chrome = METALLIC_PRESETS[4];
        viewer.set_color(chrome.color);
        let material = viewer.asset().unwrap().parts[0].material.unwrap();
        assert_eq!(material.metalness, chrome.metalness);
        assert_eq!(material.roughness, chrome.roughness);

        viewer.set_color_text("#123456").unwrap();
        let material = viewer.asset().unwrap().parts[0].material.unwrap();
        assert_eq!(material.metalness, 0.1);
        assert_eq!(material.roughness, 0.7);
    }

    #[test]
    fn test_invalid_color_text_keeps_color() {
        let mut viewer = ViewerState::new(Rgb::WHITE, true);
        let revision = viewer.look_revision();
        assert!(viewer.set_color_text("not a color").is_err());
        assert_eq!(viewer.active_color(), Rgb::WHITE);
        assert_eq!(viewer.look_revision(), revision);
    }

    #[test]
    fn test_empty_model_is_error() {
        let empty = r#"<model unit="millimeter" xmlns="http://schemas.microsoft.com/3dmanufacturing/core/2015/02">
  <resources/>
  <build/>
</model>"#;
        let bytes = crate::threemf::fixtures::package(&[("3D/3dmodel.model", empty)]);
        let mut viewer = ViewerState::new(Rgb::WHITE, true);
        let ticket = viewer.select("/empty.3mf").unwrap();

        viewer.complete(&ticket, parse_asset("/empty.3mf", &bytes));
        assert_eq!(viewer.status(), LoadStatus::Error);
        assert_eq!(
            viewer.error(),
            Some(&LoadError::Geometry(crate::normalize::GeometryError::Empty))
        );
    }
}
