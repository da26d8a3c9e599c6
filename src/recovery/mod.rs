//! Uniform retry/autofix surface over both engines.

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::capture::EventLog;

pub mod classify;
pub mod llm_fix;

pub use classify::{classify, ErrorCategory, ParsedError};

/// An engine that can re-execute its current artifact unchanged.
#[allow(async_fn_in_trait)]
pub trait Rerun {
    async fn rerun(&mut self) -> anyhow::Result<()>;
}

/// Corrected code handed back by the generation collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub code: String,
    pub explanation: String,
}

/// External code generator asked to repair failing code.
#[allow(async_fn_in_trait)]
pub trait FixGenerator {
    async fn regenerate(&self, code: &str, error_context: &str) -> anyhow::Result<GeneratedArtifact>;
}

/// Placeholder generator for hosts without an autofix collaborator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAutofix;

impl FixGenerator for NoAutofix {
    async fn regenerate(&self, _code: &str, _error_context: &str) -> anyhow::Result<GeneratedArtifact> {
        anyhow::bail!("no autofix generator configured")
    }
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("a fix is already in flight")]
    FixInFlight,
    #[error("nothing to fix: no captured errors")]
    NoError,
    #[error("autofix is not available")]
    Unavailable,
    #[error("fix generation failed: {0:#}")]
    Generation(anyhow::Error),
}

/// Stateless apart from the in-flight autofix flag.
#[derive(Debug)]
pub struct RecoveryCoordinator<G = NoAutofix> {
    generator: Option<G>,
    fix_in_flight: AtomicBool,
}

impl RecoveryCoordinator<NoAutofix> {
    pub fn retry_only() -> Self {
        Self { generator: None, fix_in_flight: AtomicBool::new(false) }
    }
}

impl<G: FixGenerator> RecoveryCoordinator<G> {
    pub fn new(generator: G) -> Self {
        Self { generator: Some(generator), fix_in_flight: AtomicBool::new(false) }
    }

    pub fn autofix_available(&self) -> bool {
        self.generator.is_some()
    }

    pub fn generator(&self) -> Option<&G> {
        self.generator.as_ref()
    }

    pub fn fix_in_flight(&self) -> bool {
        self.fix_in_flight.load(Ordering::Acquire)
    }

    /// Classify the most recent error in `log`, if any.
    pub fn diagnose(&self, log: &EventLog) -> Option<ParsedError> {
        log.last_error().map(|e| classify(&e.full_text()))
    }

    pub async fn offer_retry<T: Rerun>(&self, target: &mut T) -> anyhow::Result<()> {
        target.rerun().await
    }

    /// Hand the failing code and the full accumulated error text to the generator.
    /// A second request while one is pending is refused.
    pub async fn offer_autofix(
        &self,
        current_code: &str,
        error_context: &str,
    ) -> Result<GeneratedArtifact, RecoveryError> {
        let generator = self.generator.as_ref().ok_or(RecoveryError::Unavailable)?;
        if error_context.trim().is_empty() {
            return Err(RecoveryError::NoError);
        }
        if self
            .fix_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RecoveryError::FixInFlight);
        }
        let _guard = InFlight(&self.fix_in_flight);

        log::info!("requesting autofix ({} bytes of error context)", error_context.len());
        generator
            .regenerate(current_code, error_context)
            .await
            .map_err(RecoveryError::Generation)
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
