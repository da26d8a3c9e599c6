//! Process-wide handle to the single interpreter engine.
//!
//! The runtime is not reentrant: a run either waits its turn (`run`) or is
//! refused while another is in flight (`try_run`). Runs never interleave.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use super::{EngineError, InterpreterEngine, InterpreterRuntime};

pub struct SharedInterpreter<R> {
    inner: Arc<Mutex<InterpreterEngine<R>>>,
}

impl<R> Clone for SharedInterpreter<R> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<R: InterpreterRuntime> SharedInterpreter<R> {
    pub fn new(engine: InterpreterEngine<R>) -> Self {
        Self { inner: Arc::new(Mutex::new(engine)) }
    }

    /// Queue behind any in-flight run, then execute.
    pub async fn run(&self, script: &str) -> Result<(), EngineError> {
        self.inner.lock().await.run(script).await
    }

    /// Execute now, or refuse with `Busy` if a run, boot or frame batch holds the engine.
    pub async fn try_run(&self, script: &str) -> Result<(), EngineError> {
        let mut engine = self
            .inner
            .try_lock()
            .map_err(|_| EngineError::Busy("another run is in flight".into()))?;
        engine.run(script).await
    }

    pub async fn lock(&self) -> MutexGuard<'_, InterpreterEngine<R>> {
        self.inner.lock().await
    }
}
