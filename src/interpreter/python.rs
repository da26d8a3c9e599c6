//! Python interpreter process bootstrap and NDJSON I/O glue.
//!
//! One long-lived `python -u` child runs `bootstrap.py`. Each request is a JSON
//! line on stdin; the reply is zero or more event lines followed by a `done` line.
//!
//! The child starts with a scrubbed environment inside a scratch directory, in
//! its own process group. The bootstrap then installs a permanent audit hook
//! that refuses process spawning, signals to other processes and writes outside
//! the scratch directory. Package installs run `pip` from this side instead.

use std::{
    collections::HashMap,
    env,
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    process::{Child, ChildStdin, ChildStdout, Command},
};

use super::{
    animation::AnimationHandle,
    imports::module_for_package,
    output::ExportFormat,
    runtime::{InstallError, InterpreterRuntime, RuntimeEvent},
};

const BOOTSTRAP: &str = include_str!("bootstrap.py");

/// Host variables the interpreter and pip still see. Everything else,
/// API keys included, is dropped.
const PASSTHROUGH_ENV: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "VIRTUAL_ENV",
    "CONDA_PREFIX",
    "PYTHONPATH",
    "PYTHONHOME",
    "SYSTEMROOT",
    "PIP_INDEX_URL",
    "PIP_EXTRA_INDEX_URL",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
    "http_proxy",
    "https_proxy",
    "no_proxy",
];

struct ProcessHandle {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "ev", rename_all = "snake_case")]
enum Wire {
    Stdout { text: String },
    Stderr { text: String },
    Plot { mime: String, data: String },
    Chart { spec: Value },
    FrameRequested { id: u64 },
    FrameCancelled { id: u64 },
    Exception { message: String, traceback: Option<String> },
    Done {
        ok: bool,
        #[serde(default)]
        data: Value,
        #[serde(default)]
        error: Option<String>,
    },
}

#[derive(Debug)]
struct Reply {
    events: Vec<RuntimeEvent>,
    ok: bool,
    data: Value,
    error: Option<String>,
}

impl Reply {
    fn into_result(self) -> Result<(Vec<RuntimeEvent>, Value)> {
        if self.ok {
            Ok((self.events, self.data))
        } else {
            Err(anyhow!(self.error.unwrap_or_else(|| "interpreter request failed".into())))
        }
    }
}

#[derive(Debug, Deserialize)]
struct BootReport {
    version: String,
    #[serde(default)]
    missing: Vec<MissingPackage>,
}

#[derive(Debug, Deserialize)]
struct MissingPackage {
    package: String,
    error: String,
}

pub struct PythonProcess {
    python_bin: String,
    scratch_dir: PathBuf,
    memory_mb: u64,
    handle: Option<ProcessHandle>,
}

impl PythonProcess {
    pub fn new(python_bin: impl Into<String>) -> Self {
        Self {
            python_bin: python_bin.into(),
            scratch_dir: env::temp_dir().join("prism").join("sandbox"),
            memory_mb: 0,
            handle: None,
        }
    }

    /// Directory the interpreter runs in and may write to.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Address-space limit in MiB; 0 leaves it unlimited.
    pub fn with_memory_limit(mut self, mb: u64) -> Self {
        self.memory_mb = mb;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    fn prepare_scratch(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.scratch_dir)
            .with_context(|| format!("failed to create {}", self.scratch_dir.display()))?;
        fs::canonicalize(&self.scratch_dir)
            .with_context(|| format!("failed to resolve {}", self.scratch_dir.display()))
    }

    /// `python_bin` with a scrubbed environment, running inside `scratch`.
    fn sandboxed_command(&self, scratch: &Path) -> Command {
        let mut cmd = Command::new(&self.python_bin);
        cmd.env_clear();
        for key in PASSTHROUGH_ENV {
            if let Some(value) = env::var_os(key) {
                cmd.env(key, value);
            }
        }
        cmd.env("TMPDIR", scratch)
            .env("MPLCONFIGDIR", scratch.join(".matplotlib"))
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .current_dir(scratch)
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }

    async fn start(&self) -> Result<ProcessHandle> {
        let scratch = self.prepare_scratch()?;
        let mut cmd = self.sandboxed_command(&scratch);
        cmd.arg("-u") // unbuffered
            .arg("-c")
            .arg(BOOTSTRAP)
            .arg(&scratch)
            .arg(self.memory_mb.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child: Child = cmd
            .spawn()
            .with_context(|| format!("failed to start {}", self.python_bin))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;

        Ok(ProcessHandle { child, stdin, stdout: BufReader::new(stdout).lines() })
    }

    async fn request(&mut self, req: Value) -> Result<Reply> {
        let handle = self.handle.as_mut().ok_or_else(|| anyhow!("interpreter is not running"))?;
        let reply = exchange(handle, &req).await;
        if reply.is_err() {
            // the pipe is unusable once a request fails mid-flight
            if let Some(mut h) = self.handle.take() {
                let _ = h.child.kill().await;
            }
        }
        reply
    }

    /// Import each package inside the interpreter; returns the ones that failed.
    async fn load(&mut self, packages: &[String]) -> Result<BootReport> {
        let modules: serde_json::Map<String, Value> = packages
            .iter()
            .map(|p| (p.clone(), Value::String(module_for_package(p))))
            .collect();
        let (_, data) = self
            .request(json!({ "op": "boot", "packages": packages, "modules": modules }))
            .await?
            .into_result()?;
        Ok(serde_json::from_value(data)?)
    }

    /// `pip install` in its own process, outside the audit hook.
    async fn pip_install(&self, name: &str) -> Result<(), InstallError> {
        if name.is_empty() || name.starts_with('-') {
            return Err(InstallError::Failed { name: name.to_string(), reason: "invalid package name".into() });
        }
        let scratch = self.prepare_scratch().map_err(|e| InstallError::Unavailable(format!("{:#}", e)))?;
        log::debug!("pip install {}", name);
        let output = self
            .sandboxed_command(&scratch)
            .args(["-m", "pip", "install", "--disable-pip-version-check", "--no-input", "-q"])
            .args(["--retries", "1"])
            .arg(OsStr::new(name))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| InstallError::Unavailable(format!("failed to run pip: {}", e)))?;
        if output.status.success() {
            return Ok(());
        }
        Err(pip_failure(name, &String::from_utf8_lossy(&output.stderr)))
    }
}

fn pip_failure(name: &str, stderr: &str) -> InstallError {
    if stderr.contains("No matching distribution") || stderr.contains("Could not find a version") {
        return InstallError::NotFound(name.to_string());
    }
    let reason = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("pip exited with an error")
        .to_string();
    InstallError::Failed { name: name.to_string(), reason }
}

async fn exchange(handle: &mut ProcessHandle, req: &Value) -> Result<Reply> {
    let mut line = serde_json::to_string(req)?;
    line.push('\n');
    handle.stdin.write_all(line.as_bytes()).await.context("interpreter stdin closed")?;
    handle.stdin.flush().await?;

    let mut events = Vec::new();
    while let Some(line) = handle.stdout.next_line().await? {
        let wire = match serde_json::from_str::<Wire>(&line) {
            Ok(w) => w,
            Err(e) => {
                log::debug!("skipping unparseable interpreter line: {}", e);
                continue;
            }
        };
        match wire {
            Wire::Stdout { text } => events.push(RuntimeEvent::Stdout(text)),
            Wire::Stderr { text } => events.push(RuntimeEvent::Stderr(text)),
            Wire::Plot { mime, data } => events.push(RuntimeEvent::Plot { mime, data }),
            Wire::Chart { spec } => events.push(RuntimeEvent::Chart(spec)),
            Wire::FrameRequested { id } => events.push(RuntimeEvent::FrameRequested(AnimationHandle(id))),
            Wire::FrameCancelled { id } => events.push(RuntimeEvent::FrameCancelled(AnimationHandle(id))),
            Wire::Exception { message, traceback } => {
                events.push(RuntimeEvent::Exception { message, traceback })
            }
            Wire::Done { ok, data, error } => {
                return Ok(Reply { events, ok, data, error });
            }
        }
    }
    bail!("interpreter process exited")
}

impl InterpreterRuntime for PythonProcess {
    async fn boot(&mut self, baseline: &[String]) -> Result<()> {
        if self.handle.is_none() {
            self.handle = Some(self.start().await?);
        }
        let report = self.load(baseline).await.context("baseline packages failed to load")?;
        let version = report.version;
        if !report.missing.is_empty() {
            let mut reasons: HashMap<String, String> = HashMap::new();
            for missing in &report.missing {
                log::info!("fetching baseline package {} ({})", missing.package, missing.error);
                if let Err(e) = self.pip_install(&missing.package).await {
                    reasons.insert(missing.package.clone(), e.to_string());
                }
            }
            let retry: Vec<String> = report.missing.into_iter().map(|m| m.package).collect();
            let report = self.load(&retry).await.context("baseline packages failed to load")?;
            if let Some(still) = report.missing.first() {
                let reason = reasons.remove(&still.package).unwrap_or_else(|| still.error.clone());
                bail!("baseline package '{}' could not be loaded: {}", still.package, reason);
            }
        }
        log::info!("python {} ready", version);
        Ok(())
    }

    async fn install(&mut self, name: &str) -> Result<(), InstallError> {
        self.pip_install(name).await?;
        if self.handle.is_some() {
            self.request(json!({ "op": "refresh" }))
                .await
                .and_then(Reply::into_result)
                .map_err(|e| InstallError::Unavailable(format!("{:#}", e)))?;
        }
        Ok(())
    }

    async fn unresolved_modules(&mut self, modules: &[String]) -> Result<Vec<String>> {
        let (_, data) = self.request(json!({ "op": "resolve", "modules": modules })).await?.into_result()?;
        Ok(serde_json::from_value(data)?)
    }

    async fn list_packages(&mut self) -> Result<Vec<String>> {
        let (_, data) = self.request(json!({ "op": "list" })).await?.into_result()?;
        Ok(serde_json::from_value(data)?)
    }

    async fn install_adapters(&mut self) -> Result<()> {
        self.request(json!({ "op": "adapters" })).await?.into_result()?;
        Ok(())
    }

    async fn execute(&mut self, code: &str) -> Result<Vec<RuntimeEvent>> {
        let (events, _) = self.request(json!({ "op": "exec", "code": code })).await?.into_result()?;
        Ok(events)
    }

    async fn run_frame(&mut self, handle: AnimationHandle, timestamp_ms: f64) -> Result<Vec<RuntimeEvent>> {
        let (events, _) = self
            .request(json!({ "op": "frame", "id": handle.0, "ts": timestamp_ms }))
            .await?
            .into_result()?;
        Ok(events)
    }

    async fn cancel_frame(&mut self, handle: AnimationHandle) -> Result<()> {
        self.request(json!({ "op": "cancel", "id": handle.0 })).await?.into_result()?;
        Ok(())
    }

    async fn export_figure(&mut self, format: ExportFormat) -> Result<Option<Vec<u8>>> {
        let (_, data) = self
            .request(json!({ "op": "export", "format": format.extension() }))
            .await?
            .into_result()?;
        match data.as_str() {
            Some(encoded) => Ok(Some(STANDARD.decode(encoded).context("invalid export payload")?)),
            None => Ok(None),
        }
    }

    async fn shutdown(&mut self) {
        if let Some(mut h) = self.handle.take() {
            drop(h.stdin);
            let _ = h.child.kill().await;
        }
    }
}
