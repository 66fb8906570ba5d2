//! Meshfolio Viewer - 3MF model gallery in the browser
//!
//! Gallery cards with rotating previews, a full viewer with orbit controls,
//! color presets and a wireframe overlay, and direct file downloads.

mod app;
mod download;
mod loads;
mod ui;

use wasm_bindgen::prelude::*;

/// WASM entry point
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();

    tracing_wasm::set_as_global_default_with_config(
        tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(tracing::Level::WARN)
            .build(),
    );

    app::run();
}
