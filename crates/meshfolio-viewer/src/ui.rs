//! Gallery and viewer overlays using bevy_egui

use bevy::ecs::system::SystemParam;
use bevy::math::Rect;
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};
use meshfolio_core::color::{METALLIC_PRESETS, STANDARD_PRESETS};
use meshfolio_core::{AppView, ColorPreset, LoadStatus, ModelDescriptor, Rgb, ViewerState};
use meshfolio_scene::{GallerySession, PreviewViewports};

use crate::download::download;

const CARD_WIDTH: f32 = 320.0;
const PREVIEW_HEIGHT: f32 = 220.0;
const CARD_GAP: f32 = 16.0;
const SWATCH_SIZE: f32 = 28.0;
const SWATCH_COLUMNS: usize = 5;
const CHROME_WIDTH: f32 = 300.0;

pub struct UiPlugin;

impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ColorInput>()
            .add_systems(EguiPrimaryContextPass, ui_system);
    }
}

/// Color picker popup state
#[derive(Resource, Default)]
pub struct ColorInput {
    open: bool,
    text: String,
    /// Color the text field was last synced to
    shown: Option<Rgb>,
    error: Option<String>,
}

#[derive(SystemParam)]
pub struct UiParams<'w, 's> {
    pub contexts: EguiContexts<'w, 's>,
    pub session: ResMut<'w, GallerySession>,
    pub viewports: ResMut<'w, PreviewViewports>,
    pub color_input: ResMut<'w, ColorInput>,
}

/// User intent collected while drawing, applied once the frame's UI is built
#[derive(Debug, Clone, PartialEq)]
enum UiAction {
    Open(usize),
    Back,
    Retry,
    Download(usize),
    ToggleWireframe,
    SetColor(Rgb),
    SetColorText(String),
}

fn ui_system(mut params: UiParams) {
    let Ok(ctx) = params.contexts.ctx_mut() else { return };

    params.viewports.rects.clear();
    let actions = match params.session.view() {
        AppView::Gallery => gallery_ui(ctx, &params.session, &mut params.viewports),
        AppView::Viewer { model } => viewer_ui(ctx, &params.session, model, &mut params.color_input),
    };

    for action in actions {
        apply_action(&mut params.session, &mut params.color_input, action);
    }
}

fn apply_action(session: &mut GallerySession, input: &mut ColorInput, action: UiAction) {
    match action {
        UiAction::Open(index) => {
            *input = ColorInput::default();
            if let Err(e) = session.open_model(index) {
                tracing::warn!("Cannot open model: {e}");
            }
        }
        UiAction::Back => session.back_to_gallery(),
        UiAction::Retry => {
            if !session.retry() {
                tracing::debug!("Retry ignored, viewer is not in error");
            }
        }
        UiAction::Download(index) => {
            if let Some(model) = session.catalogue().get(index) {
                if let Err(e) = download(&model.source, &model.download_filename()) {
                    tracing::error!(model = %model.name, "Download failed: {e:#}");
                }
            }
        }
        UiAction::ToggleWireframe => {
            if let Some(viewer) = session.viewer_mut() {
                viewer.toggle_wireframe();
            }
        }
        UiAction::SetColor(color) => {
            if let Some(viewer) = session.viewer_mut() {
                viewer.set_color(color);
            }
        }
        UiAction::SetColorText(text) => {
            if let Some(viewer) = session.viewer_mut() {
                input.error = viewer.set_color_text(&text).err().map(|e| e.to_string());
            }
        }
    }
}

fn gallery_ui(ctx: &egui::Context, session: &GallerySession, viewports: &mut PreviewViewports) -> Vec<UiAction> {
    let mut actions = Vec::new();

    // No panel fill: the preview cameras draw underneath the cards
    egui::CentralPanel::default()
        .frame(egui::Frame::NONE.inner_margin(24.0))
        .show(ctx, |ui| {
            egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| {
                ui.vertical_centered(|ui| {
                    ui.add_space(16.0);
                    ui.heading(egui::RichText::new("3MF Model Viewer").size(32.0).strong());
                    ui.label(egui::RichText::new("Explore and download 3D printable models").size(16.0).weak());
                    ui.add_space(24.0);
                });

                let columns = card_columns(ui.available_width());
                let models = session.catalogue().models();
                for (row, chunk) in models.chunks(columns).enumerate() {
                    ui.horizontal(|ui| {
                        ui.spacing_mut().item_spacing.x = CARD_GAP;
                        for (col, model) in chunk.iter().enumerate() {
                            let index = row * columns + col;
                            let preview = session
                                .previews()
                                .iter()
                                .find(|p| p.model == index)
                                .map(|p| &p.state);
                            model_card(ui, index, model, preview, viewports, &mut actions);
                        }
                    });
                    ui.add_space(CARD_GAP);
                }
            });
        });

    actions
}

fn model_card(
    ui: &mut egui::Ui,
    index: usize,
    model: &ModelDescriptor,
    preview: Option<&ViewerState>,
    viewports: &mut PreviewViewports,
    actions: &mut Vec<UiAction>,
) {
    egui::Frame::group(ui.style()).show(ui, |ui| {
        ui.set_width(CARD_WIDTH);

        let (rect, _) = ui.allocate_exact_size(egui::vec2(CARD_WIDTH, PREVIEW_HEIGHT), egui::Sense::hover());
        if let Some(state) = preview {
            if let Some(visible) = visible_rect(rect, ui.clip_rect()) {
                viewports.rects.insert(state.id(), visible);
            }
            preview_status(ui, rect, state);
        }

        ui.add_space(8.0);
        ui.label(egui::RichText::new(&model.name).size(18.0).strong());
        ui.add(egui::Label::new(egui::RichText::new(&model.description).weak()).wrap());
        ui.add_space(8.0);
        ui.horizontal(|ui| {
            if ui.button("View Model").clicked() {
                actions.push(UiAction::Open(index));
            }
            if ui.button("Download").clicked() {
                actions.push(UiAction::Download(index));
            }
        });
    });
}

fn preview_status(ui: &egui::Ui, rect: egui::Rect, state: &ViewerState) {
    let text = match state.status() {
        LoadStatus::Loading | LoadStatus::Idle => "Loading...",
        LoadStatus::Error => "Preview unavailable",
        LoadStatus::Ready => return,
    };
    ui.painter_at(rect).text(
        rect.center_bottom() - egui::vec2(0.0, 12.0),
        egui::Align2::CENTER_BOTTOM,
        text,
        egui::FontId::proportional(14.0),
        ui.visuals().weak_text_color(),
    );
}

fn viewer_ui(ctx: &egui::Context, session: &GallerySession, model: usize, input: &mut ColorInput) -> Vec<UiAction> {
    let mut actions = Vec::new();
    let (Some(descriptor), Some(viewer)) = (session.catalogue().get(model), session.viewer()) else {
        return actions;
    };

    egui::Area::new(egui::Id::new("viewer_header"))
        .anchor(egui::Align2::LEFT_TOP, [16.0, 16.0])
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.set_max_width(CHROME_WIDTH);
                if ui.button("← Back to Gallery").clicked() {
                    actions.push(UiAction::Back);
                }
                ui.add_space(4.0);
                ui.heading(&descriptor.name);
                ui.add(egui::Label::new(egui::RichText::new(&descriptor.description).weak()).wrap());
                model_details(ui, viewer);
            });
        });

    egui::Area::new(egui::Id::new("viewer_controls"))
        .anchor(egui::Align2::RIGHT_TOP, [-16.0, 16.0])
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.horizontal(|ui| {
                    if ui.button("Download").clicked() {
                        actions.push(UiAction::Download(model));
                    }
                    if ui.button(wireframe_label(viewer.wireframe_visible())).clicked() {
                        actions.push(UiAction::ToggleWireframe);
                    }
                    if ui.add(egui::Button::new("Color").selected(input.open)).clicked() {
                        input.open = !input.open;
                    }
                });
                if input.open {
                    ui.separator();
                    color_picker(ui, viewer, input, &mut actions);
                }
            });
        });

    match viewer.status() {
        LoadStatus::Loading => {
            egui::Area::new(egui::Id::new("viewer_loading"))
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .show(ctx, |ui| {
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        ui.set_width(240.0);
                        ui.label("Loading model...");
                        let bar = match viewer.progress().and_then(|p| p.fraction()) {
                            Some(fraction) => egui::ProgressBar::new(fraction).show_percentage(),
                            None => egui::ProgressBar::new(0.0).animate(true),
                        };
                        ui.add(bar);
                    });
                });
        }
        LoadStatus::Error => {
            egui::Window::new("Failed to load model")
                .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    if let Some(error) = viewer.error() {
                        ui.colored_label(ui.visuals().error_fg_color, error.to_string());
                    }
                    ui.add_space(8.0);
                    ui.horizontal(|ui| {
                        if ui.button("Retry").clicked() {
                            actions.push(UiAction::Retry);
                        }
                        if ui.button("Back to Gallery").clicked() {
                            actions.push(UiAction::Back);
                        }
                    });
                });
        }
        LoadStatus::Idle | LoadStatus::Ready => {}
    }

    actions
}

fn model_details(ui: &mut egui::Ui, viewer: &ViewerState) {
    let Some(asset) = viewer.asset() else { return };

    ui.separator();
    egui::Grid::new("model_details").num_columns(2).show(ui, |ui| {
        if let Some(title) = asset.title() {
            ui.label("Title");
            ui.label(title);
            ui.end_row();
        }
        if let Some(designer) = asset.designer() {
            ui.label("Designer");
            ui.label(designer);
            ui.end_row();
        }
        ui.label("Unit");
        ui.label(&asset.unit);
        ui.end_row();
        ui.label("Parts");
        ui.label(asset.parts.len().to_string());
        ui.end_row();
        ui.label("Triangles");
        ui.label(asset.triangle_count().to_string());
        ui.end_row();
    });
}

fn color_picker(ui: &mut egui::Ui, viewer: &ViewerState, input: &mut ColorInput, actions: &mut Vec<UiAction>) {
    let active = viewer.active_color();
    if input.shown != Some(active) {
        input.text = active.to_hex();
        input.shown = Some(active);
        input.error = None;
    }

    preset_grid(ui, "Standard", STANDARD_PRESETS, viewer.active_preset(), actions);
    ui.add_space(6.0);
    preset_grid(ui, "Metallic", METALLIC_PRESETS, viewer.active_preset(), actions);
    ui.separator();

    ui.horizontal(|ui| {
        let mut rgb = active.to_array();
        if egui::color_picker::color_edit_button_srgb(ui, &mut rgb).changed() {
            actions.push(UiAction::SetColor(Rgb::from_array(rgb)));
        }
        let response = ui.add(
            egui::TextEdit::singleline(&mut input.text)
                .desired_width(90.0)
                .hint_text("#rrggbb"),
        );
        if response.lost_focus() {
            actions.push(UiAction::SetColorText(input.text.clone()));
        }
    });

    if let Some(error) = &input.error {
        ui.colored_label(ui.visuals().error_fg_color, error);
    }
}

fn preset_grid(ui: &mut egui::Ui, title: &str, presets: &[ColorPreset], active: &ColorPreset, actions: &mut Vec<UiAction>) {
    ui.label(egui::RichText::new(title).strong());
    egui::Grid::new(title).spacing([6.0, 6.0]).show(ui, |ui| {
        for (i, preset) in presets.iter().enumerate() {
            let selected = active.family == preset.family && active.color == preset.color;
            let stroke = if selected {
                egui::Stroke::new(2.0, ui.visuals().selection.stroke.color)
            } else {
                egui::Stroke::new(1.0, egui::Color32::from_gray(60))
            };
            let swatch = egui::Button::new("")
                .fill(color32(preset.color))
                .stroke(stroke)
                .min_size(egui::vec2(SWATCH_SIZE, SWATCH_SIZE));
            if ui.add(swatch).on_hover_text(preset.display_name).clicked() {
                actions.push(UiAction::SetColor(preset.color));
            }
            if (i + 1) % SWATCH_COLUMNS == 0 {
                ui.end_row();
            }
        }
    });
}

fn color32(color: Rgb) -> egui::Color32 {
    egui::Color32::from_rgb(color.r, color.g, color.b)
}

fn wireframe_label(visible: bool) -> &'static str {
    if visible { "Hide Wireframe" } else { "Show Wireframe" }
}

/// Cards per row for the available width
fn card_columns(width: f32) -> usize {
    (((width + CARD_GAP) / (CARD_WIDTH + CARD_GAP)).floor() as usize).max(1)
}

/// Part of a card preview inside the scroll area's clip, in logical pixels
fn visible_rect(rect: egui::Rect, clip: egui::Rect) -> Option<Rect> {
    let visible = rect.intersect(clip);
    visible
        .is_positive()
        .then(|| Rect::new(visible.min.x, visible.min.y, visible.max.x, visible.max.y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshfolio_core::{AppState, GalleryConfig};

    fn session() -> GallerySession {
        GallerySession(AppState::new(GalleryConfig::builtin().unwrap()))
    }

    #[test]
    fn test_card_columns() {
        assert_eq!(card_columns(100.0), 1);
        assert_eq!(card_columns(CARD_WIDTH * 2.0 + CARD_GAP), 2);
        assert_eq!(card_columns(1400.0), 4);
    }

    #[test]
    fn test_scrolled_out_card_has_no_rect() {
        let clip = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(800.0, 600.0));
        let below = egui::Rect::from_min_size(egui::pos2(10.0, 700.0), egui::vec2(320.0, 220.0));
        assert!(visible_rect(below, clip).is_none());

        let partial = egui::Rect::from_min_size(egui::pos2(10.0, 500.0), egui::vec2(320.0, 220.0));
        let rect = visible_rect(partial, clip).unwrap();
        assert_eq!(rect.height(), 100.0);
    }

    #[test]
    fn test_wireframe_label_tracks_state() {
        assert_eq!(wireframe_label(true), "Hide Wireframe");
        assert_eq!(wireframe_label(false), "Show Wireframe");
    }

    #[test]
    fn test_invalid_color_text_is_reported() {
        let mut session = session();
        let mut input = ColorInput::default();
        apply_action(&mut session, &mut input, UiAction::Open(0));
        let before = session.viewer().unwrap().active_color();

        apply_action(&mut session, &mut input, UiAction::SetColorText("not a color".into()));
        assert!(input.error.is_some());
        assert_eq!(session.viewer().unwrap().active_color(), before);

        apply_action(&mut session, &mut input, UiAction::SetColorText("#FFD700".into()));
        assert!(input.error.is_none());
        assert_eq!(session.viewer().unwrap().active_color(), Rgb::new(0xff, 0xd7, 0x00));
    }

    #[test]
    fn test_back_and_open_switch_views() {
        let mut session = session();
        let mut input = ColorInput::default();
        apply_action(&mut session, &mut input, UiAction::Open(1));
        assert_eq!(session.view(), AppView::Viewer { model: 1 });
        assert!(session.previews().is_empty());

        apply_action(&mut session, &mut input, UiAction::Back);
        assert_eq!(session.view(), AppView::Gallery);
        assert_eq!(session.previews().len(), session.catalogue().len());
    }
}
