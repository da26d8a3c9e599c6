//! Isolated preview engine: renders untrusted HTML/JS in a sandboxed frame and
//! surfaces its uncaught errors through the cross-context message channel.

use anyhow::Result;

use crate::{
    capture::{CapturedEvent, EventKind, EventLog},
    recovery::Rerun,
};

pub mod host;
pub mod instrument;
pub mod message;
pub mod viewport;

pub use host::FileFrameHost;
pub use viewport::Viewport;

/// Capabilities granted to the sandboxed frame. Nothing else: no forms, popups or top navigation.
pub const SANDBOX_CAPABILITIES: &str = "allow-scripts allow-same-origin";

/// Everything a host needs to (re)create the sandboxed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxDocument {
    /// Instrumented content for the frame's `srcdoc`.
    pub srcdoc: String,
    pub sandbox: &'static str,
    /// Bumped on every retry; a host must recreate the frame when it changes.
    pub instance_key: u64,
    pub viewport: Viewport,
}

/// The embedding side of the sandbox.
pub trait FrameHost {
    /// Discard any previous frame and create a fresh one for `doc`.
    fn mount(&mut self, doc: &SandboxDocument) -> Result<()>;

    /// Change the display width without recreating the frame.
    fn resize(&mut self, _viewport: Viewport) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayState {
    Empty,
    Live,
    Errored { error: String },
}

pub struct PreviewEngine<H> {
    host: H,
    content: Option<String>,
    instance_key: u64,
    viewport: Viewport,
    overlay: Option<String>,
    events: EventLog,
}

impl<H: FrameHost> PreviewEngine<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            content: None,
            instance_key: 0,
            viewport: Viewport::Full,
            overlay: None,
            events: EventLog::new(),
        }
    }

    /// Render new content. Any error overlay from the previous content is cleared.
    pub fn render(&mut self, html: &str) -> Result<()> {
        self.content = Some(html.to_string());
        self.overlay = None;
        self.events.clear();
        self.mount()
    }

    /// Tear down and recreate the frame from the same content.
    pub fn retry(&mut self) -> Result<()> {
        self.instance_key += 1;
        self.overlay = None;
        self.events.clear();
        log::debug!("preview retry, instance key {}", self.instance_key);
        if self.content.is_none() {
            return Ok(());
        }
        self.mount()
    }

    /// Feed one raw cross-context message. Malformed or foreign messages are dropped.
    pub fn receive_message(&mut self, raw: &str) -> Option<&CapturedEvent> {
        let Some(error) = message::parse_error(raw) else {
            log::debug!("dropping unrecognized frame message ({} bytes)", raw.len());
            return None;
        };
        self.overlay = Some(error.clone());
        Some(self.events.push(EventKind::Error, error))
    }

    pub fn dismiss_error(&mut self) {
        self.overlay = None;
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.viewport = viewport;
        self.host.resize(viewport)
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn instance_key(&self) -> u64 {
        self.instance_key
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn overlay(&self) -> Option<&str> {
        self.overlay.as_deref()
    }

    pub fn state(&self) -> DisplayState {
        match (&self.content, &self.overlay) {
            (None, _) => DisplayState::Empty,
            (Some(_), Some(error)) => DisplayState::Errored { error: error.clone() },
            (Some(_), None) => DisplayState::Live,
        }
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// The document the frame is currently showing.
    pub fn document(&self) -> Option<SandboxDocument> {
        self.content.as_deref().map(|html| SandboxDocument {
            srcdoc: instrument::inject(html),
            sandbox: SANDBOX_CAPABILITIES,
            instance_key: self.instance_key,
            viewport: self.viewport,
        })
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn mount(&mut self) -> Result<()> {
        match self.document() {
            Some(doc) => self.host.mount(&doc),
            None => Ok(()),
        }
    }
}

impl<H: FrameHost> Rerun for PreviewEngine<H> {
    async fn rerun(&mut self) -> Result<()> {
        self.retry()
    }
}
