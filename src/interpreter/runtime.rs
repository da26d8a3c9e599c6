//! Narrow seam between the engine and the interpreter it drives.

use thiserror::Error;

use super::{animation::AnimationHandle, output::ExportFormat};

/// One observation reported by the runtime, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    Stdout(String),
    Stderr(String),
    /// The patched "show" rasterized the current figure.
    Plot { mime: String, data: String },
    /// The patched interactive "show" serialized a figure.
    Chart(serde_json::Value),
    FrameRequested(AnimationHandle),
    FrameCancelled(AnimationHandle),
    Exception { message: String, traceback: Option<String> },
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("package '{0}' was not found")]
    NotFound(String),
    #[error("installing '{name}' failed: {reason}")]
    Failed { name: String, reason: String },
    #[error("interpreter unavailable: {0}")]
    Unavailable(String),
}

/// An interpreter the engine can boot, feed, and tear down.
///
/// `Err` results mean the runtime itself failed; exceptions raised by the
/// executed code arrive as [`RuntimeEvent::Exception`].
#[allow(async_fn_in_trait)]
pub trait InterpreterRuntime {
    /// Start the interpreter and load the baseline packages.
    async fn boot(&mut self, baseline: &[String]) -> anyhow::Result<()>;

    async fn install(&mut self, name: &str) -> Result<(), InstallError>;

    /// The subset of `modules` the interpreter cannot import as things stand.
    async fn unresolved_modules(&mut self, modules: &[String]) -> anyhow::Result<Vec<String>> {
        Ok(modules.to_vec())
    }

    async fn list_packages(&mut self) -> anyhow::Result<Vec<String>>;

    /// Fresh global namespace with the show/frame adapters installed. Safe to repeat.
    async fn install_adapters(&mut self) -> anyhow::Result<()>;

    async fn execute(&mut self, code: &str) -> anyhow::Result<Vec<RuntimeEvent>>;

    /// Invoke one scheduled frame callback; the handle is consumed.
    async fn run_frame(
        &mut self,
        handle: AnimationHandle,
        timestamp_ms: f64,
    ) -> anyhow::Result<Vec<RuntimeEvent>>;

    async fn cancel_frame(&mut self, handle: AnimationHandle) -> anyhow::Result<()>;

    /// Re-render the retained figure; `None` when there is none.
    async fn export_figure(&mut self, format: ExportFormat) -> anyhow::Result<Option<Vec<u8>>>;

    async fn shutdown(&mut self);
}
