//! Frame host that writes a standalone page embedding the sandboxed frame.
//!
//! The page owns the message listener: it validates the `type` tag before
//! trusting `error`, shows the overlay, and logs every forwarded error.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};

use super::{message::IFRAME_ERROR_TYPE, FrameHost, SandboxDocument, Viewport};

pub struct FileFrameHost {
    dir: PathBuf,
    last: Option<SandboxDocument>,
}

impl FileFrameHost {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), last: None }
    }

    pub fn page_path(&self) -> PathBuf {
        self.dir.join("preview.html")
    }

    fn write(&self, doc: &SandboxDocument) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.page_path();
        fs::write(&path, host_page(doc))
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::debug!("wrote preview host page {}", path.display());
        Ok(())
    }
}

impl FrameHost for FileFrameHost {
    fn mount(&mut self, doc: &SandboxDocument) -> Result<()> {
        self.write(doc)?;
        self.last = Some(doc.clone());
        Ok(())
    }

    fn resize(&mut self, viewport: Viewport) -> Result<()> {
        if let Some(mut doc) = self.last.take() {
            doc.viewport = viewport;
            let res = self.write(&doc);
            self.last = Some(doc);
            res?;
        }
        Ok(())
    }
}

/// Full host page: sized container, sandboxed frame keyed by instance, listener and overlay.
pub fn host_page(doc: &SandboxDocument) -> String {
    let width = doc
        .viewport
        .width()
        .map(|w| format!("{}px", w))
        .unwrap_or_else(|| "100%".to_string());
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Prism preview</title>
<style>
  html, body {{ margin: 0; height: 100%; background: #f4f4f5; }}
  #stage {{ width: {width}; max-width: 100%; height: 100%; margin: 0 auto; background: #fff; position: relative; }}
  iframe {{ border: 0; width: 100%; height: 100%; }}
  #overlay {{ display: none; position: absolute; left: 0; right: 0; bottom: 0; padding: 12px;
             background: #7f1d1d; color: #fff; font: 13px monospace; white-space: pre-wrap; }}
</style>
</head>
<body>
<div id="stage">
  <iframe id="frame" data-instance="{key}" sandbox="{sandbox}" srcdoc="{srcdoc}"></iframe>
  <div id="overlay"></div>
</div>
<script>
  window.addEventListener("message", function (e) {{
    var d = e.data;
    if (!d || d.type !== "{tag}" || typeof d.error !== "string") {{ return; }}
    var o = document.getElementById("overlay");
    o.textContent = d.error;
    o.style.display = "block";
    o.onclick = function () {{ o.style.display = "none"; }};
    console.error(d.error);
  }});
</script>
</body>
</html>
"#,
        width = width,
        key = doc.instance_key,
        sandbox = doc.sandbox,
        srcdoc = escape_attr(&doc.srcdoc),
        tag = IFRAME_ERROR_TYPE,
    )
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
