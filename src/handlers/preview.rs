//! Preview handler: instruments markup and writes the sandbox host page.

use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;

use prism::{
    artifact::CodeArtifact,
    preview::{FileFrameHost, PreviewEngine, Viewport},
};

pub fn run(artifact: &CodeArtifact, out_dir: &Path, viewport: Viewport, color: bool) -> Result<()> {
    let mut engine = PreviewEngine::new(FileFrameHost::new(out_dir));
    engine.set_viewport(viewport)?;
    engine.render(artifact.source())?;

    let page = engine.host().page_path();
    if color {
        println!("{} {}", "preview:".green(), page.display());
    } else {
        println!("preview: {}", page.display());
    }
    if let Some(doc) = engine.document() {
        log::info!(
            "sandbox \"{}\", viewport {}, instance {}, {} bytes instrumented",
            doc.sandbox,
            doc.viewport,
            doc.instance_key,
            doc.srcdoc.len()
        );
    }
    Ok(())
}
