//! Save a catalogue file through a temporary download link

#[cfg(target_arch = "wasm32")]
pub fn download(url: &str, filename: &str) -> anyhow::Result<()> {
    use anyhow::{anyhow, Context};
    use wasm_bindgen::JsCast;
    use web_sys::HtmlAnchorElement;

    let document = web_sys::window()
        .and_then(|w| w.document())
        .context("no document")?;
    let body = document.body().context("document has no body")?;

    let anchor: HtmlAnchorElement = document
        .create_element("a")
        .map_err(|e| anyhow!("failed to create link: {e:?}"))?
        .dyn_into()
        .map_err(|_| anyhow!("link cast failed"))?;
    anchor.set_href(url);
    anchor.set_download(filename);

    body.append_child(&anchor)
        .map_err(|e| anyhow!("failed to attach link: {e:?}"))?;
    anchor.click();
    body.remove_child(&anchor)
        .map_err(|e| anyhow!("failed to detach link: {e:?}"))?;

    tracing::info!(url, filename, "Download started");
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
pub fn download(url: &str, _filename: &str) -> anyhow::Result<()> {
    anyhow::bail!("downloads are only available in the browser ({url})")
}
