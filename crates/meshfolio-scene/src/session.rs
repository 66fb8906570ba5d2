//! Application state shared between the UI and the renderer

use bevy::math::Rect;
use bevy::prelude::*;
use meshfolio_core::{AppState, DisplayTransform, ViewerId, ViewerState};
use std::collections::HashMap;

/// The gallery/viewer state machine as a Bevy resource
#[derive(Resource, Deref, DerefMut)]
pub struct GallerySession(pub AppState);

/// Which part of the app a scene slot renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRole {
    /// Full-window interactive viewer
    Viewer,
    /// Gallery card for the catalogue entry at `model`
    Preview { model: usize },
}

/// A live viewer state and how it should be presented
pub struct LiveViewer<'a> {
    pub role: SlotRole,
    /// Render layer and camera order offset
    pub layer: usize,
    pub display: Option<&'a DisplayTransform>,
    pub state: &'a ViewerState,
}

impl GallerySession {
    /// Every viewer that currently needs a scene
    pub fn live_viewers(&self) -> Vec<LiveViewer<'_>> {
        let mut live = Vec::with_capacity(self.previews().len() + 1);
        if let Some(state) = self.viewer() {
            live.push(LiveViewer {
                role: SlotRole::Viewer,
                layer: 1,
                display: None,
                state,
            });
        }
        live.extend(self.previews().iter().enumerate().map(|(i, preview)| LiveViewer {
            role: SlotRole::Preview {
                model: preview.model,
            },
            layer: i + 2,
            display: Some(&preview.display),
            state: &preview.state,
        }));
        live
    }
}

/// Screen rectangles (logical pixels) of the gallery card previews drawn this frame
///
/// Written by the UI, read by the renderer to place preview cameras.
#[derive(Resource, Default, Debug)]
pub struct PreviewViewports {
    pub rects: HashMap<ViewerId, Rect>,
}
