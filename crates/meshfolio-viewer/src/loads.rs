//! Model fetching over HTTP and hand-off of finished loads to the session

use bevy::prelude::*;
use meshfolio_core::{
    load_asset, Completion, LoadError, LoadProgress, LoadStatus, LoadTicket, LoadedAsset, ModelSource,
};
use meshfolio_scene::GallerySession;
use std::sync::{Arc, Mutex, PoisonError, TryLockError};

pub struct LoadsPlugin;

impl Plugin for LoadsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LoadInbox>()
            .add_systems(Update, (dispatch_loads, apply_loads).chain());
    }
}

/// Something a background load reported
pub enum LoadEvent {
    Progress(LoadTicket, LoadProgress),
    Done(LoadTicket, Result<LoadedAsset, LoadError>),
}

/// Events from in-flight loads, drained once per frame
#[derive(Resource, Default, Clone)]
pub struct LoadInbox(pub Arc<Mutex<Vec<LoadEvent>>>);

impl LoadInbox {
    fn push(&self, event: LoadEvent) {
        // Deliver even after a holder panicked
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}

/// Fetches model files with the browser's fetch API
pub struct WebSource;

impl ModelSource for WebSource {
    async fn fetch<'a>(
        &'a self,
        location: &'a str,
        progress: &'a mut dyn FnMut(LoadProgress),
    ) -> Result<Vec<u8>, LoadError> {
        fetch_model(location, progress).await
    }
}

/// Start every load the session queued since last frame
fn dispatch_loads(mut session: ResMut<GallerySession>, inbox: Res<LoadInbox>) {
    if !session.has_requests() {
        return;
    }
    for ticket in session.take_requests() {
        tracing::debug!(location = %ticket.location, viewer = ticket.viewer.raw(), "Dispatching load");
        spawn_load(ticket, inbox.clone());
    }
}

/// Route finished and in-progress loads back to their viewers
fn apply_loads(mut session: ResMut<GallerySession>, inbox: Res<LoadInbox>) {
    // Take the events and release the lock before touching the session
    let events = match inbox.0.try_lock() {
        Ok(mut events) => std::mem::take(&mut *events),
        Err(TryLockError::Poisoned(poisoned)) => std::mem::take(&mut *poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => return,
    };

    for event in events {
        match event {
            LoadEvent::Progress(ticket, progress) => {
                session.report_progress(&ticket, progress);
            }
            LoadEvent::Done(ticket, result) => match session.complete(&ticket, result) {
                Completion::Applied(LoadStatus::Ready) => {
                    tracing::info!(location = %ticket.location, "Model ready");
                }
                Completion::Applied(status) => {
                    tracing::warn!(location = %ticket.location, ?status, "Model failed to load");
                }
                Completion::Stale => {
                    tracing::debug!(location = %ticket.location, "Discarded superseded load");
                }
            },
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn spawn_load(ticket: LoadTicket, inbox: LoadInbox) {
    wasm_bindgen_futures::spawn_local(async move {
        let progress_inbox = inbox.clone();
        let progress_ticket = ticket.clone();
        let mut report = move |progress: LoadProgress| {
            progress_inbox.push(LoadEvent::Progress(progress_ticket.clone(), progress));
        };
        let result = load_asset(&WebSource, &ticket.location, &mut report).await;
        inbox.push(LoadEvent::Done(ticket, result));
    });
}

#[cfg(not(target_arch = "wasm32"))]
fn spawn_load(ticket: LoadTicket, inbox: LoadInbox) {
    let mut ignore = |_: LoadProgress| {};
    let result = bevy::tasks::block_on(load_asset(&WebSource, &ticket.location, &mut ignore));
    inbox.push(LoadEvent::Done(ticket, result));
}

#[cfg(target_arch = "wasm32")]
async fn fetch_model(location: &str, progress: &mut dyn FnMut(LoadProgress)) -> Result<Vec<u8>, LoadError> {
    let fetch_error = |e: anyhow::Error| LoadError::Fetch {
        location: location.to_string(),
        reason: format!("{e:#}"),
    };

    let response = web::request(location).await.map_err(fetch_error)?;
    if !response.ok() {
        return Err(LoadError::Http {
            location: location.to_string(),
            status: response.status(),
        });
    }
    web::read_body(&response, progress).await.map_err(fetch_error)
}

#[cfg(not(target_arch = "wasm32"))]
async fn fetch_model(location: &str, _progress: &mut dyn FnMut(LoadProgress)) -> Result<Vec<u8>, LoadError> {
    Err(LoadError::Fetch {
        location: location.to_string(),
        reason: "model fetch is only available in the browser".to_string(),
    })
}

#[cfg(target_arch = "wasm32")]
mod web {
    use anyhow::{anyhow, Context};
    use js_sys::{Reflect, Uint8Array};
    use meshfolio_core::LoadProgress;
    use wasm_bindgen::{JsCast, JsValue};
    use wasm_bindgen_futures::JsFuture;
    use web_sys::{ReadableStreamDefaultReader, Response};

    fn js_error(value: JsValue) -> anyhow::Error {
        anyhow!("{value:?}")
    }

    pub async fn request(location: &str) -> anyhow::Result<Response> {
        let window = web_sys::window().context("no window")?;
        let response = JsFuture::from(window.fetch_with_str(location))
            .await
            .map_err(js_error)
            .context("fetch failed")?;
        response.dyn_into().map_err(|_| anyhow!("response cast failed"))
    }

    fn content_length(response: &Response) -> Option<u64> {
        response
            .headers()
            .get("content-length")
            .ok()
            .flatten()
            .and_then(|value| value.parse().ok())
    }

    /// Stream the body, reporting bytes received against Content-Length
    pub async fn read_body(response: &Response, progress: &mut dyn FnMut(LoadProgress)) -> anyhow::Result<Vec<u8>> {
        let total = content_length(response);

        let Some(body) = response.body() else {
            let promise = response.array_buffer().map_err(js_error)?;
            let buffer = JsFuture::from(promise).await.map_err(js_error)?;
            let bytes = Uint8Array::new(&buffer).to_vec();
            progress(LoadProgress {
                loaded: bytes.len() as u64,
                total,
            });
            return Ok(bytes);
        };

        let reader: ReadableStreamDefaultReader = body
            .get_reader()
            .dyn_into()
            .map_err(|_| anyhow!("stream reader cast failed"))?;

        let mut bytes = Vec::with_capacity(total.unwrap_or(0) as usize);
        loop {
            let chunk = JsFuture::from(reader.read())
                .await
                .map_err(js_error)
                .context("reading response body")?;
            let done = Reflect::get(&chunk, &JsValue::from_str("done"))
                .map_err(js_error)?
                .as_bool()
                .unwrap_or(true);
            if done {
                break;
            }

            let value = Reflect::get(&chunk, &JsValue::from_str("value")).map_err(js_error)?;
            let array = Uint8Array::new(&value);
            let start = bytes.len();
            bytes.resize(start + array.length() as usize, 0);
            array.copy_to(&mut bytes[start..]);

            progress(LoadProgress {
                loaded: bytes.len() as u64,
                total,
            });
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_fetch_reports_fetch_error() {
        let mut ignore = |_: LoadProgress| {};
        let result = bevy::tasks::block_on(load_asset(&WebSource, "/models/box_prod.3mf", &mut ignore));
        assert!(matches!(result, Err(LoadError::Fetch { .. })));
    }

    #[test]
    fn test_poisoned_inbox_still_delivers() {
        let inbox = LoadInbox::default();
        let shared = inbox.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.0.lock().unwrap();
            panic!("holder died");
        })
        .join();
        assert!(inbox.0.is_poisoned());

        let mut app = App::new();
        let config = meshfolio_core::GalleryConfig::builtin().unwrap();
        let mut state = meshfolio_core::AppState::new(config);
        let ticket = state.take_requests().remove(0);
        app.insert_resource(GallerySession(state))
            .insert_resource(inbox.clone())
            .add_systems(Update, apply_loads);

        inbox.push(LoadEvent::Done(
            ticket.clone(),
            Err(LoadError::Http {
                location: ticket.location.clone(),
                status: 404,
            }),
        ));
        app.update();

        let session = app.world().resource::<GallerySession>();
        let preview = session.previews().iter().find(|p| p.state.id() == ticket.viewer).unwrap();
        assert_eq!(preview.state.status(), LoadStatus::Error);
    }

    #[test]
    fn test_inbox_routes_failures_to_the_viewer() {
        let mut app = App::new();
        let config = meshfolio_core::GalleryConfig::builtin().unwrap();
        app.insert_resource(GallerySession(meshfolio_core::AppState::new(config)))
            .add_plugins(LoadsPlugin);

        app.update();

        let session = app.world().resource::<GallerySession>();
        assert!(!session.has_requests());
        assert!(session
            .previews()
            .iter()
            .all(|p| p.state.status() == LoadStatus::Error));
    }
}
