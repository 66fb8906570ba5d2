//! Application-level routing between the gallery and the viewer
//!
//! [`AppState`] owns every live [`ViewerState`]: one per gallery preview, or
//! the single main viewer. Load requests are queued as tickets for the host
//! to fetch; finished loads are routed back by viewer id.

use thiserror::Error;

use crate::asset::LoadedAsset;
use crate::catalogue::{Catalogue, DisplayTransform, GalleryConfig, ModelDescriptor};
use crate::color::Rgb;
use crate::loader::{LoadError, LoadProgress};
use crate::settings::GallerySettings;
use crate::viewer::{Completion, LoadTicket, ViewerId, ViewerState};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GalleryError {
    #[error("No model at catalogue index {0}")]
    UnknownModel(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppView {
    Gallery,
    /// Full viewer for the catalogue entry at `model`
    Viewer { model: usize },
}

/// Preview rig for one gallery card
#[derive(Debug)]
pub struct PreviewPipeline {
    pub model: usize,
    pub display: DisplayTransform,
    pub state: ViewerState,
}

#[derive(Debug)]
pub struct AppState {
    catalogue: Catalogue,
    settings: GallerySettings,
    view: AppView,
    previews: Vec<PreviewPipeline>,
    viewer: Option<ViewerState>,
    requests: Vec<LoadTicket>,
}

impl AppState {
    /// Start in the gallery with one preview load queued per model
    pub fn new(config: GalleryConfig) -> Self {
        let mut state = Self {
            catalogue: config.catalogue,
            settings: config.settings,
            view: AppView::Gallery,
            previews: Vec::new(),
            viewer: None,
            requests: Vec::new(),
        };
        state.build_previews();
        state
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn settings(&self) -> &GallerySettings {
        &self.settings
    }

    pub fn view(&self) -> AppView {
        self.view
    }

    pub fn previews(&self) -> &[PreviewPipeline] {
        &self.previews
    }

    pub fn viewer(&self) -> Option<&ViewerState> {
        self.viewer.as_ref()
    }

    pub fn viewer_mut(&mut self) -> Option<&mut ViewerState> {
        self.viewer.as_mut()
    }

    /// Descriptor shown in the main viewer
    pub fn current_model(&self) -> Option<&ModelDescriptor> {
        match self.view {
            AppView::Viewer { model } => self.catalogue.get(model),
            AppView::Gallery => None,
        }
    }

    /// Switch to the full viewer, tearing down every preview
    pub fn open_model(&mut self, index: usize) -> Result<(), GalleryError> {
        let descriptor = self
            .catalogue
            .get(index)
            .ok_or(GalleryError::UnknownModel(index))?;

        tracing::info!(model = %descriptor.name, "Opening viewer");
        let viewer_settings = &self.settings.viewer;
        let mut viewer = ViewerState::new(viewer_settings.default_color, viewer_settings.show_wireframe);
        if let Some(ticket) = viewer.select(&descriptor.source) {
            self.requests.push(ticket);
        }

        self.previews.clear();
        self.viewer = Some(viewer);
        self.view = AppView::Viewer { model: index };
        self.drop_orphaned_requests();
        Ok(())
    }

    /// Drop the main viewer and rebuild the gallery previews
    pub fn back_to_gallery(&mut self) {
        if self.view == AppView::Gallery {
            return;
        }
        tracing::info!("Returning to gallery");
        self.viewer = None;
        self.view = AppView::Gallery;
        self.build_previews();
        self.drop_orphaned_requests();
    }

    /// Reselect the current model in the main viewer; only restarts after an error
    pub fn retry(&mut self) -> bool {
        let Some(source) = self.current_model().map(|d| d.source.clone()) else {
            return false;
        };
        let ticket = self.viewer.as_mut().and_then(|v| v.select(&source));
        match ticket {
            Some(ticket) => {
                self.requests.push(ticket);
                true
            }
            None => false,
        }
    }

    pub fn has_requests(&self) -> bool {
        !self.requests.is_empty()
    }

    /// Loads requested since the last call
    pub fn take_requests(&mut self) -> Vec<LoadTicket> {
        std::mem::take(&mut self.requests)
    }

    pub fn report_progress(&mut self, ticket: &LoadTicket, progress: LoadProgress) -> bool {
        self.state_for(ticket)
            .map(|s| s.report_progress(ticket, progress))
            .unwrap_or(false)
    }

    /// Hand a finished load to the viewer that asked for it
    ///
    /// Results for viewers that no longer exist are dropped.
    pub fn complete(&mut self, ticket: &LoadTicket, result: Result<LoadedAsset, LoadError>) -> Completion {
        match self.state_for(ticket) {
            Some(state) => state.complete(ticket, result),
            None => {
                tracing::debug!(location = %ticket.location, "Load finished for a closed viewer");
                Completion::Stale
            }
        }
    }

    fn state_for(&mut self, ticket: &LoadTicket) -> Option<&mut ViewerState> {
        if let Some(viewer) = self.viewer.as_mut().filter(|v| v.id() == ticket.viewer) {
            return Some(viewer);
        }
        self.previews
            .iter_mut()
            .map(|p| &mut p.state)
            .find(|s| s.id() == ticket.viewer)
    }

    /// Forget queued loads whose viewer has been torn down
    fn drop_orphaned_requests(&mut self) {
        let live: Vec<ViewerId> = self
            .viewer
            .iter()
            .chain(self.previews.iter().map(|p| &p.state))
            .map(|s| s.id())
            .collect();
        self.requests.retain(|t| live.contains(&t.viewer));
    }

    fn build_previews(&mut self) {
        let color = self.preview_color();
        self.previews = self
            .catalogue
            .models()
            .iter()
            .enumerate()
            .map(|(model, descriptor)| {
                let mut state = ViewerState::new(color, false);
                if let Some(ticket) = state.select(&descriptor.source) {
                    self.requests.push(ticket);
                }
                PreviewPipeline {
                    model,
                    display: descriptor.display.clone(),
                    state,
                }
            })
            .collect();
    }

    fn preview_color(&self) -> Rgb {
        self.settings.viewer.default_color
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_asset;
    use crate::threemf::fixtures::box_package;
    use crate::viewer::LoadStatus;

    fn app() -> AppState {
        AppState::new(GalleryConfig::builtin().unwrap())
    }

    #[test]
    fn test_gallery_queues_one_load_per_model() {
        let mut state = app();
        assert_eq!(state.view(), AppView::Gallery);
        assert_eq!(state.previews().len(), 5);

        let requests = state.take_requests();
        assert_eq!(requests.len(), 5);
        assert_eq!(requests[1].location, "/models/cube_gears_prod.3mf");
        assert!(state.take_requests().is_empty());

        for preview in state.previews() {
            assert!(!preview.state.wireframe_visible());
            assert_eq!(preview.state.status(), LoadStatus::Loading);
        }
    }

    #[test]
    fn test_previews_are_isolated() {
        let mut state = app();
        let requests = state.take_requests();

        state.complete(
            &requests[0],
            Err(LoadError::Fetch {
                location: requests[0].location.clone(),
                reason: "offline".to_string(),
            }),
        );
        state.complete(&requests[2], parse_asset(&requests[2].location, &box_package([1.0, 1.0, 1.0])));

        let statuses: Vec<_> = state.previews().iter().map(|p| p.state.status()).collect();
        assert_eq!(
            statuses,
            [
                LoadStatus::Error,
                LoadStatus::Loading,
                LoadStatus::Ready,
                LoadStatus::Loading,
                LoadStatus::Loading
            ]
        );
    }

    #[test]
    fn test_open_model_tears_down_previews() {
        let mut state = app();
        let preview_requests = state.take_requests();

        state.open_model(1).unwrap();
        assert_eq!(state.view(), AppView::Viewer { model: 1 });
        assert!(state.previews().is_empty());
        assert_eq!(state.current_model().unwrap().name, "Cube Gears");

        let viewer = state.viewer().unwrap();
        assert!(viewer.wireframe_visible());
        assert_eq!(viewer.active_color(), Rgb::WHITE);

        // Preview results arriving after teardown are dropped
        let late = parse_asset(&preview_requests[1].location, &box_package([1.0, 1.0, 1.0]));
        assert_eq!(state.complete(&preview_requests[1], late), Completion::Stale);
        assert_eq!(state.viewer().unwrap().status(), LoadStatus::Loading);

        let requests = state.take_requests();
        assert_eq!(requests.len(), 1);
        let bytes = box_package([1.0, 1.0, 1.0]);
        state.complete(&requests[0], parse_asset(&requests[0].location, &bytes));
        assert_eq!(state.viewer().unwrap().status(), LoadStatus::Ready);
    }

    #[test]
    fn test_back_to_gallery_rebuilds_previews() {
        let mut state = app();
        state.take_requests();
        state.open_model(0).unwrap();
        let viewer_request = state.take_requests().remove(0);

        state.back_to_gallery();
        assert_eq!(state.view(), AppView::Gallery);
        assert!(state.viewer().is_none());
        assert_eq!(state.previews().len(), 5);
        assert_eq!(state.take_requests().len(), 5);

        let late = parse_asset(&viewer_request.location, &box_package([1.0, 1.0, 1.0]));
        assert_eq!(state.complete(&viewer_request, late), Completion::Stale);
    }

    #[test]
    fn test_switching_views_drops_queued_loads_of_closed_viewers() {
        let mut state = app();
        assert_eq!(state.previews().len(), 5);

        // Preview tickets were never taken; the viewer replaces them
        state.open_model(3).unwrap();
        let requests = state.take_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].viewer, state.viewer().unwrap().id());

        state.back_to_gallery();
        state.open_model(4).unwrap();
        // Viewer ticket never taken before leaving
        state.back_to_gallery();
        let requests = state.take_requests();
        assert_eq!(requests.len(), 5);
        let previews: Vec<ViewerId> = state.previews().iter().map(|p| p.state.id()).collect();
        assert!(requests.iter().all(|t| previews.contains(&t.viewer)));
    }

    #[test]
    fn test_unknown_model() {
        let mut state = app();
        assert_eq!(state.open_model(42), Err(GalleryError::UnknownModel(42)));
        assert_eq!(state.view(), AppView::Gallery);
    }

    #[test]
    fn test_retry_only_after_error() {
        let mut state = app();
        state.open_model(2).unwrap();
        state.take_requests();
        assert!(!state.retry());

        let ticket = LoadTicket {
            viewer: state.viewer().unwrap().id(),
            generation: 1,
            location: state.current_model().unwrap().source.clone(),
        };
        state.complete(
            &ticket,
            Err(LoadError::Http {
                location: ticket.location.clone(),
                status: 500,
            }),
        );
        assert_eq!(state.viewer().unwrap().status(), LoadStatus::Error);
        assert!(state.retry());
        assert_eq!(state.take_requests().len(), 1);
    }
}
