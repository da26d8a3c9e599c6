//! Embedded interpreter engine: runs Python artifacts with auto-installed
//! packages, redirected plot output and managed frame loops.

use anyhow::Context;
use thiserror::Error;

use crate::{
    artifact::looks_like_markup,
    capture::{EventKind, EventLog},
    recovery::Rerun,
};

pub mod animation;
pub mod imports;
pub mod output;
pub mod python;
pub mod runtime;
pub mod session;
pub mod shared;

pub use animation::{AnimationHandle, AnimationRegistry};
pub use output::{ExportFormat, OutputNode, OutputTarget};
pub use python::PythonProcess;
pub use runtime::{InstallError, InterpreterRuntime, RuntimeEvent};
pub use session::{InterpreterSession, Lifecycle};
pub use shared::SharedInterpreter;

pub const MARKUP_REJECTED: &str =
    "This looks like HTML, not Python. Open it in the preview instead of running it.";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("interpreter unavailable: {0}")]
    Unavailable(String),
    #[error("interpreter is busy ({0})")]
    Busy(String),
    #[error("no figure to export")]
    NoFigure,
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

pub struct InterpreterEngine<R> {
    runtime: R,
    baseline: Vec<String>,
    session: InterpreterSession,
    output: OutputTarget,
    events: EventLog,
    last_script: Option<String>,
}

impl<R: InterpreterRuntime> InterpreterEngine<R> {
    pub fn new(runtime: R, baseline: Vec<String>) -> Self {
        Self {
            runtime,
            baseline,
            session: InterpreterSession::default(),
            output: OutputTarget::default(),
            events: EventLog::new(),
            last_script: None,
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.session.lifecycle
    }

    /// Whether the host should offer a run affordance.
    pub fn can_run(&self) -> bool {
        !matches!(self.session.lifecycle, Lifecycle::Unavailable(_))
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn output(&self) -> &OutputTarget {
        &self.output
    }

    pub fn has_visual_output(&self) -> bool {
        !self.output.is_empty()
    }

    pub fn last_error(&self) -> Option<String> {
        self.events.last_error().map(|e| e.full_text())
    }

    pub fn active_frames(&self) -> usize {
        self.session.frames.len()
    }

    pub fn last_script(&self) -> Option<&str> {
        self.last_script.as_deref()
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Bring the runtime up once. Later calls are no-ops while ready.
    pub async fn boot(&mut self) -> Result<(), EngineError> {
        match &self.session.lifecycle {
            Lifecycle::Ready => return Ok(()),
            Lifecycle::Loading => return Err(EngineError::Busy("loading".into())),
            Lifecycle::Executing => return Err(EngineError::Busy("executing".into())),
            Lifecycle::Unavailable(reason) => return Err(EngineError::Unavailable(reason.clone())),
            Lifecycle::Uninitialized => {}
        }

        self.session.lifecycle = Lifecycle::Loading;
        log::debug!("interpreter loading, baseline: {:?}", self.baseline);
        let booted = self.runtime.boot(&self.baseline).await;
        let listed = match booted {
            Ok(()) => self.runtime.list_packages().await,
            Err(e) => Err(e),
        };
        match listed {
            Ok(names) => {
                self.session.replace_installed(names);
                for name in &self.baseline {
                    self.session.mark_installed(name);
                }
                self.session.lifecycle = Lifecycle::Ready;
                log::debug!("interpreter ready");
                Ok(())
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                log::error!("interpreter failed to load: {}", reason);
                self.events.error(format!("Interpreter failed to load: {}", reason));
                self.session.lifecycle = Lifecycle::Unavailable(reason.clone());
                Err(EngineError::Unavailable(reason))
            }
        }
    }

    /// Execute a script. Progress and failures are reported through [`Self::events`];
    /// an `Err` means the run never started.
    pub async fn run(&mut self, script: &str) -> Result<(), EngineError> {
        self.last_script = Some(script.to_string());

        if looks_like_markup(script) {
            self.events.clear();
            self.events.error(MARKUP_REJECTED);
            return Ok(());
        }

        self.boot().await?;
        if self.session.lifecycle != Lifecycle::Ready {
            return Err(EngineError::Busy(self.session.lifecycle.to_string()));
        }
        self.session.lifecycle = Lifecycle::Executing;

        let result = self.execute_prepared(script).await;
        self.finish(result)
    }

    async fn execute_prepared(&mut self, script: &str) -> anyhow::Result<()> {
        // stale loops must stop before anything from this run executes
        self.cancel_all_frames().await?;
        self.output.clear();
        self.events.clear();

        self.install_missing(script).await;

        self.runtime
            .install_adapters()
            .await
            .context("failed to install output adapters")?;
        let produced = self.runtime.execute(script).await?;
        self.apply(produced, EventKind::Error);
        Ok(())
    }

    /// Invoke every frame callback scheduled so far. Returns how many ran.
    pub async fn tick_frames(&mut self, timestamp_ms: f64) -> Result<usize, EngineError> {
        if self.session.lifecycle != Lifecycle::Ready {
            return Err(EngineError::Busy(self.session.lifecycle.to_string()));
        }
        let due = self.session.frames.drain();
        if due.is_empty() {
            return Ok(0);
        }
        self.session.lifecycle = Lifecycle::Executing;
        let mut ran = 0;
        let mut result = Ok(());
        for handle in due {
            match self.runtime.run_frame(handle, timestamp_ms).await {
                Ok(produced) => {
                    ran += 1;
                    self.apply(produced, EventKind::AnimationFrameError);
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.finish(result)?;
        Ok(ran)
    }

    pub async fn install(&mut self, name: &str) -> Result<(), InstallError> {
        if let Err(e) = self.boot().await {
            return Err(InstallError::Unavailable(e.to_string()));
        }
        if self.session.is_installed(name) {
            return Ok(());
        }
        self.runtime.install(name).await?;
        self.session.mark_installed(name);
        log::info!("installed package {}", name);
        if let Err(e) = self.refresh_installed().await {
            log::warn!("could not refresh package list: {:#}", e);
        }
        Ok(())
    }

    /// Installed package names, sorted.
    pub fn list_installed(&self) -> Vec<String> {
        self.session.installed()
    }

    /// Re-read the package list from the runtime.
    pub async fn refresh_installed(&mut self) -> Result<Vec<String>, EngineError> {
        let names = self.runtime.list_packages().await?;
        self.session.replace_installed(names);
        for name in &self.baseline {
            self.session.mark_installed(name);
        }
        Ok(self.session.installed())
    }

    /// Re-render the most recently shown figure, falling back to the rendered
    /// image for PNG when the runtime has no figure to offer.
    pub async fn export(&mut self, format: ExportFormat) -> Result<Vec<u8>, EngineError> {
        if self.output.figure_retained() && self.session.lifecycle == Lifecycle::Ready {
            match self.runtime.export_figure(format).await {
                Ok(Some(bytes)) => return Ok(bytes),
                Ok(None) => {}
                Err(e) => log::warn!("figure export failed: {:#}", e),
            }
        }
        if format == ExportFormat::Png {
            if let Some(Ok(bytes)) = self.output.last_image().and_then(|n| n.image_bytes()) {
                return Ok(bytes);
            }
        }
        Err(EngineError::NoFigure)
    }

    /// Full environment reset: the runtime is torn down and everything learned is forgotten.
    pub async fn reset(&mut self) {
        self.runtime.shutdown().await;
        self.session = InterpreterSession::default();
        self.output.clear();
        self.events.clear();
        log::debug!("interpreter reset");
    }

    async fn cancel_all_frames(&mut self) -> anyhow::Result<()> {
        for handle in self.session.frames.drain() {
            self.runtime.cancel_frame(handle).await?;
        }
        Ok(())
    }

    /// Best effort: failures are warnings and the run goes on.
    async fn install_missing(&mut self, script: &str) {
        let candidates = imports::candidate_modules(script);
        if candidates.is_empty() {
            return;
        }
        // the interpreter knows its own stdlib and what is already importable
        let unresolved = match self.runtime.unresolved_modules(&candidates).await {
            Ok(modules) => modules,
            Err(e) => {
                log::warn!("could not resolve imports: {:#}", e);
                candidates
            }
        };
        let missing: Vec<String> = imports::packages_for(&unresolved)
            .into_iter()
            .filter(|p| !self.session.is_installed(p))
            .collect();
        if missing.is_empty() {
            return;
        }
        for name in &missing {
            self.events.log(format!("Installing {}...", name));
            match self.runtime.install(name).await {
                Ok(()) => {
                    self.session.mark_installed(name);
                    self.events.log(format!("Installed {}", name));
                    log::info!("installed package {}", name);
                }
                Err(e) => {
                    self.events.warn(format!("Failed to install {}: {}", name, e));
                    log::warn!("install of {} failed: {}", name, e);
                }
            }
        }
        match self.runtime.list_packages().await {
            Ok(names) => {
                self.session.replace_installed(names);
                for name in &self.baseline {
                    self.session.mark_installed(name);
                }
            }
            Err(e) => log::warn!("could not refresh package list: {:#}", e),
        }
    }

    /// Translate runtime observations into captured events, keeping their order.
    fn apply(&mut self, produced: Vec<RuntimeEvent>, exception_kind: EventKind) {
        for ev in produced {
            match ev {
                RuntimeEvent::Stdout(text) => self.events.log(trim_newline(text)),
                RuntimeEvent::Stderr(text) => self.events.error(trim_newline(text)),
                RuntimeEvent::Plot { mime, data } => {
                    self.output.append(OutputNode::Image { mime: mime.clone(), data });
                    self.events.push(
                        EventKind::PlotRendered,
                        format!("Figure {} rendered ({})", self.output.len(), mime),
                    );
                }
                RuntimeEvent::Chart(spec) => {
                    self.output.append(OutputNode::Chart { spec });
                    self.events.push(
                        EventKind::PlotRendered,
                        format!("Interactive chart {} rendered", self.output.len()),
                    );
                }
                RuntimeEvent::FrameRequested(h) => self.session.frames.register(h),
                RuntimeEvent::FrameCancelled(h) => {
                    self.session.frames.release(h);
                }
                RuntimeEvent::Exception { message, traceback } => {
                    self.events.push_with_traceback(exception_kind, message, traceback);
                }
            }
        }
    }

    /// Return to ready after a run or frame batch. A runtime failure is captured, not raised.
    fn finish(&mut self, result: anyhow::Result<()>) -> Result<(), EngineError> {
        match result {
            Ok(()) => {
                self.session.lifecycle = Lifecycle::Ready;
                Ok(())
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                log::error!("interpreter runtime failed: {}", reason);
                self.events.error(format!("Interpreter crashed: {}", reason));
                self.session.lifecycle = Lifecycle::Unavailable(reason);
                Ok(())
            }
        }
    }
}

impl<R: InterpreterRuntime> Rerun for InterpreterEngine<R> {
    async fn rerun(&mut self) -> anyhow::Result<()> {
        let Some(script) = self.last_script.clone() else {
            return Ok(());
        };
        self.run(&script).await?;
        Ok(())
    }
}

fn trim_newline(mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    text
}
