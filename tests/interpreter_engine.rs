use std::collections::BTreeSet;

use anyhow::{bail, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use prism::{
    capture::EventKind,
    interpreter::{
        AnimationHandle, EngineError, ExportFormat, InstallError, InterpreterEngine,
        InterpreterRuntime, Lifecycle, RuntimeEvent, SharedInterpreter, MARKUP_REJECTED,
    },
    recovery::{classify, ErrorCategory, RecoveryCoordinator},
};

/// In-memory runtime driven by a tiny line language:
/// `print X`, `show`, `chart`, `raise X`, `animate`, `die`. Anything else is ignored.
#[derive(Default)]
struct Scripted {
    journal: Vec<String>,
    packages: BTreeSet<String>,
    available: BTreeSet<String>,
    /// Modules the runtime can already import without installing anything.
    importable: BTreeSet<String>,
    fail_resolve: bool,
    fail_boot: bool,
    next_handle: u64,
    /// What a frame callback does when invoked.
    frame_body: FrameBody,
    figure: bool,
}

#[derive(Default, Clone, Copy, PartialEq)]
enum FrameBody {
    #[default]
    Reschedule,
    Raise,
}

impl Scripted {
    fn with_packages(names: &[&str]) -> Self {
        Self { packages: names.iter().map(|s| s.to_string()).collect(), ..Default::default() }
    }

    fn count(&self, prefix: &str) -> usize {
        self.journal.iter().filter(|e| e.starts_with(prefix)).count()
    }

    fn request_frame(&mut self) -> RuntimeEvent {
        self.next_handle += 1;
        RuntimeEvent::FrameRequested(AnimationHandle(self.next_handle))
    }
}

impl InterpreterRuntime for Scripted {
    async fn boot(&mut self, baseline: &[String]) -> Result<()> {
        self.journal.push("boot".into());
        if self.fail_boot {
            bail!("no interpreter on PATH");
        }
        self.packages.extend(baseline.iter().cloned());
        Ok(())
    }

    async fn install(&mut self, name: &str) -> Result<(), InstallError> {
        self.journal.push(format!("install:{}", name));
        if !self.available.contains(name) {
            return Err(InstallError::NotFound(name.to_string()));
        }
        self.packages.insert(name.to_string());
        Ok(())
    }

    async fn unresolved_modules(&mut self, modules: &[String]) -> Result<Vec<String>> {
        self.journal.push(format!("resolve:{}", modules.join(",")));
        if self.fail_resolve {
            bail!("resolver unavailable");
        }
        Ok(modules.iter().filter(|m| !self.importable.contains(*m)).cloned().collect())
    }

    async fn list_packages(&mut self) -> Result<Vec<String>> {
        Ok(self.packages.iter().cloned().collect())
    }

    async fn install_adapters(&mut self) -> Result<()> {
        self.journal.push("adapters".into());
        Ok(())
    }

    async fn execute(&mut self, code: &str) -> Result<Vec<RuntimeEvent>> {
        self.journal.push("exec".into());
        let mut out = Vec::new();
        for line in code.lines().map(str::trim) {
            if let Some(text) = line.strip_prefix("print ") {
                out.push(RuntimeEvent::Stdout(format!("{}\n", text)));
            } else if line == "show" {
                self.figure = true;
                let n = out.iter().filter(|e| matches!(e, RuntimeEvent::Plot { .. })).count() as u8;
                out.push(RuntimeEvent::Plot { mime: "image/png".into(), data: STANDARD.encode([n]) });
            } else if line == "chart" {
                out.push(RuntimeEvent::Chart(serde_json::json!({ "data": [] })));
            } else if let Some(msg) = line.strip_prefix("raise ") {
                out.push(RuntimeEvent::Exception {
                    message: msg.to_string(),
                    traceback: Some("Traceback (most recent call last):\n  line 3".into()),
                });
                break;
            } else if line == "animate" {
                out.push(self.request_frame());
            } else if line == "die" {
                bail!("interpreter process exited");
            }
        }
        Ok(out)
    }

    async fn run_frame(&mut self, handle: AnimationHandle, _ts: f64) -> Result<Vec<RuntimeEvent>> {
        self.journal.push(format!("frame:{}", handle.0));
        match self.frame_body {
            FrameBody::Reschedule => Ok(vec![self.request_frame()]),
            FrameBody::Raise => Ok(vec![RuntimeEvent::Exception {
                message: "ZeroDivisionError: division by zero".into(),
                traceback: None,
            }]),
        }
    }

    async fn cancel_frame(&mut self, handle: AnimationHandle) -> Result<()> {
        self.journal.push(format!("cancel:{}", handle.0));
        Ok(())
    }

    async fn export_figure(&mut self, format: ExportFormat) -> Result<Option<Vec<u8>>> {
        if !self.figure || format == ExportFormat::Pdf {
            return Ok(None);
        }
        Ok(Some(format.extension().as_bytes().to_vec()))
    }

    async fn shutdown(&mut self) {
        self.journal.push("shutdown".into());
        self.packages.clear();
    }
}

fn engine(runtime: Scripted, baseline: &[&str]) -> InterpreterEngine<Scripted> {
    InterpreterEngine::new(runtime, baseline.iter().map(|s| s.to_string()).collect())
}

#[tokio::test]
async fn markup_is_rejected_without_touching_the_interpreter() {
    let mut engine = engine(Scripted::default(), &[]);
    engine.run("  <!DOCTYPE html><html><body></body></html>").await.unwrap();

    assert_eq!(engine.events().len(), 1);
    let ev = &engine.events().events()[0];
    assert_eq!(ev.kind, EventKind::Error);
    assert_eq!(ev.text, MARKUP_REJECTED);
    assert!(engine.runtime().journal.is_empty());
    assert_eq!(*engine.lifecycle(), Lifecycle::Uninitialized);
}

#[tokio::test]
async fn print_with_baseline_package_yields_one_log() {
    let mut engine = engine(Scripted::default(), &["numpy"]);
    engine
        .run("import numpy as np\nprint 6")
        .await
        .unwrap();

    let events = engine.events().events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Log);
    assert_eq!(events[0].text, "6");
    assert!(!engine.events().has_errors());
    assert_eq!(engine.runtime().count("install:"), 0);
    assert_eq!(*engine.lifecycle(), Lifecycle::Ready);
}

#[tokio::test]
async fn two_shows_append_two_images_in_order() {
    let mut engine = engine(Scripted::default(), &["matplotlib"]);
    engine
        .run("import matplotlib.pyplot as plt\nshow\nshow")
        .await
        .unwrap();

    let images: Vec<Vec<u8>> = engine
        .output()
        .images()
        .map(|n| n.image_bytes().unwrap().unwrap())
        .collect();
    assert_eq!(images, vec![vec![0], vec![1]]);
    assert!(!engine.events().has_errors());
    let plots = engine.events().events().iter().filter(|e| e.kind == EventKind::PlotRendered).count();
    assert_eq!(plots, 2);
    assert!(engine.has_visual_output());
}

#[tokio::test]
async fn frames_from_previous_run_are_cancelled_before_next_exec() {
    let mut engine = engine(Scripted::default(), &[]);
    engine.run("animate\nanimate").await.unwrap();
    assert_eq!(engine.active_frames(), 2);

    engine.run("print again").await.unwrap();
    assert_eq!(engine.active_frames(), 0);

    let journal = &engine.runtime().journal;
    let second_exec = journal.iter().rposition(|e| e == "exec").unwrap();
    let cancels: Vec<usize> = journal
        .iter()
        .enumerate()
        .filter(|(_, e)| e.starts_with("cancel:"))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(cancels.len(), 2);
    assert!(cancels.iter().all(|&i| i < second_exec));
}

#[tokio::test]
async fn new_run_clears_previous_output_and_events() {
    let mut engine = engine(Scripted::default(), &[]);
    engine.run("show\nraise ValueError: bad").await.unwrap();
    assert!(engine.events().has_errors());

    engine.run("print ok").await.unwrap();
    assert!(engine.output().is_empty());
    assert_eq!(engine.events().len(), 1);
    assert!(engine.last_error().is_none());
}

#[tokio::test]
async fn exception_is_captured_and_engine_stays_ready() {
    let mut engine = engine(Scripted::default(), &[]);
    engine
        .run("print before\nraise NameError: name 'x' is not defined\nprint after")
        .await
        .unwrap();

    let err = engine.events().last_error().unwrap();
    assert_eq!(err.text, "NameError: name 'x' is not defined");
    assert!(err.traceback.as_deref().unwrap().contains("line 3"));
    assert_eq!(*engine.lifecycle(), Lifecycle::Ready);

    let parsed = RecoveryCoordinator::retry_only().diagnose(engine.events()).unwrap();
    assert_eq!(parsed.category, ErrorCategory::RuntimeError);
    assert_eq!(parsed.line_number, Some(3));
    assert_eq!(parsed.message, "NameError: name 'x' is not defined");

    engine.run("print fine").await.unwrap();
    assert!(!engine.events().has_errors());
}

#[tokio::test]
async fn missing_packages_are_installed_with_progress() {
    let mut runtime = Scripted::default();
    runtime.available.insert("scikit-learn".into());
    let mut engine = engine(runtime, &[]);
    engine
        .run("from sklearn.linear_model import LinearRegression\nimport os\nprint done")
        .await
        .unwrap();

    let texts: Vec<&str> = engine.events().events().iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["Installing scikit-learn...", "Installed scikit-learn", "done"]);
    assert!(engine.list_installed().contains(&"scikit-learn".to_string()));

    // already present: no second install
    engine.run("import sklearn\nprint again").await.unwrap();
    assert_eq!(engine.runtime().count("install:"), 1);
}

#[tokio::test]
async fn failed_install_warns_and_still_executes() {
    let mut engine = engine(Scripted::default(), &[]);
    engine.run("import notapackage\nprint ran").await.unwrap();

    let events = engine.events().events();
    assert_eq!(events[0].text, "Installing notapackage...");
    assert_eq!(events[1].kind, EventKind::Warning);
    assert!(events[1].text.starts_with("Failed to install notapackage"));
    assert_eq!(events[2].text, "ran");
    assert!(!engine.events().has_errors());
}

#[tokio::test]
async fn importable_modules_are_not_installed() {
    let mut rt = Scripted::default();
    rt.available.insert("pyyaml".into());
    rt.importable.insert("sitecustom_helpers".into());
    let mut eng = engine(rt, &[]);
    eng.run("import json\nimport yaml\nimport sitecustom_helpers\nprint ok").await.unwrap();

    let rt = eng.runtime();
    assert_eq!(rt.count("resolve:yaml,sitecustom_helpers"), 1);
    assert_eq!(rt.count("install:"), 1);
    assert_eq!(rt.count("install:pyyaml"), 1);
}

#[tokio::test]
async fn resolver_failure_falls_back_to_installing_candidates() {
    let mut rt = Scripted::default();
    rt.fail_resolve = true;
    rt.available.insert("pyyaml".into());
    let mut eng = engine(rt, &[]);
    eng.run("import yaml\nprint ok").await.unwrap();

    assert_eq!(eng.runtime().count("install:pyyaml"), 1);
    assert_eq!(*eng.lifecycle(), Lifecycle::Ready);
    assert!(!eng.events().has_errors());
}

#[tokio::test]
async fn stdlib_only_script_never_asks_the_resolver() {
    let mut eng = engine(Scripted::default(), &[]);
    eng.run("import os, sys\nimport concurrent.futures\nprint ok").await.unwrap();
    assert_eq!(eng.runtime().count("resolve:"), 0);
}

#[tokio::test]
async fn install_is_idempotent() {
    let mut runtime = Scripted::with_packages(&["numpy"]);
    runtime.available.insert("sympy".into());
    let mut engine = engine(runtime, &[]);

    engine.install("sympy").await.unwrap();
    let before = engine.list_installed();
    engine.install("sympy").await.unwrap();
    engine.install("SymPy").await.unwrap();

    assert_eq!(engine.list_installed(), before);
    assert_eq!(engine.runtime().count("install:"), 1);
}

#[tokio::test]
async fn install_of_unknown_package_is_not_found() {
    let mut engine = engine(Scripted::default(), &[]);
    let err = engine.install("nope").await.unwrap_err();
    assert!(matches!(err, InstallError::NotFound(name) if name == "nope"));
}

#[tokio::test]
async fn boot_failure_makes_engine_unavailable() {
    let runtime = Scripted { fail_boot: true, ..Default::default() };
    let mut engine = engine(runtime, &["numpy"]);

    let err = engine.run("print 1").await.unwrap_err();
    assert!(matches!(err, EngineError::Unavailable(_)));
    assert!(!engine.can_run());
    assert!(engine.last_error().unwrap().contains("no interpreter on PATH"));

    // no second attempt while unavailable
    assert!(engine.run("print 1").await.is_err());
    assert_eq!(engine.runtime().count("boot"), 1);
}

#[tokio::test]
async fn runtime_crash_is_captured_not_raised() {
    let mut engine = engine(Scripted::default(), &[]);
    engine.run("die").await.unwrap();
    assert!(engine.last_error().unwrap().starts_with("Interpreter crashed"));
    assert!(!engine.can_run());
}

#[tokio::test]
async fn frame_loop_reschedules_until_next_run() {
    let mut engine = engine(Scripted::default(), &[]);
    engine.run("animate").await.unwrap();

    assert_eq!(engine.tick_frames(16.0).await.unwrap(), 1);
    assert_eq!(engine.tick_frames(32.0).await.unwrap(), 1);
    assert_eq!(engine.active_frames(), 1);
    assert_eq!(engine.runtime().count("frame:"), 2);
}

#[tokio::test]
async fn frame_exception_becomes_animation_error() {
    let runtime = Scripted { frame_body: FrameBody::Raise, ..Default::default() };
    let mut engine = engine(runtime, &[]);
    engine.run("animate").await.unwrap();

    engine.tick_frames(16.0).await.unwrap();
    let err = engine.events().last_error().unwrap();
    assert_eq!(err.kind, EventKind::AnimationFrameError);
    assert_eq!(classify(&err.full_text()).category, ErrorCategory::RuntimeError);
    assert_eq!(engine.active_frames(), 0);
    assert_eq!(*engine.lifecycle(), Lifecycle::Ready);
    assert_eq!(engine.tick_frames(32.0).await.unwrap(), 0);
}

#[tokio::test]
async fn export_prefers_runtime_then_falls_back_to_png() {
    let mut engine = engine(Scripted::default(), &[]);
    engine.run("show").await.unwrap();

    assert_eq!(engine.export(ExportFormat::Svg).await.unwrap(), b"svg".to_vec());
    // runtime cannot do pdf, and only png has an image fallback
    assert!(matches!(engine.export(ExportFormat::Pdf).await, Err(EngineError::NoFigure)));

    engine.run("chart").await.unwrap();
    assert!(matches!(engine.export(ExportFormat::Png).await, Err(EngineError::NoFigure)));
}

#[tokio::test]
async fn reset_forgets_everything() {
    let mut runtime = Scripted::default();
    runtime.available.insert("sympy".into());
    let mut engine = engine(runtime, &[]);
    engine.install("sympy").await.unwrap();
    engine.run("animate\nshow").await.unwrap();

    engine.reset().await;
    assert_eq!(*engine.lifecycle(), Lifecycle::Uninitialized);
    assert!(engine.list_installed().is_empty());
    assert_eq!(engine.active_frames(), 0);
    assert!(engine.output().is_empty());
    assert!(engine.events().is_empty());

    engine.run("print back").await.unwrap();
    assert_eq!(engine.runtime().count("boot"), 2);
}

#[tokio::test]
async fn retry_reruns_last_script() {
    let mut engine = engine(Scripted::default(), &[]);
    engine.run("raise TypeError: x is not a function").await.unwrap();

    RecoveryCoordinator::retry_only().offer_retry(&mut engine).await.unwrap();
    assert_eq!(engine.runtime().count("exec"), 2);
    assert_eq!(engine.events().errors().count(), 1);
}

#[tokio::test]
async fn shared_interpreter_refuses_concurrent_run() {
    let shared = SharedInterpreter::new(engine(Scripted::default(), &[]));
    let other = shared.clone();

    let guard = shared.lock().await;
    let err = other.try_run("print 1").await.unwrap_err();
    assert!(matches!(err, EngineError::Busy(_)));
    drop(guard);

    other.try_run("print 1").await.unwrap();
    shared.run("print 2").await.unwrap();
    let engine = shared.lock().await;
    assert_eq!(engine.runtime().count("exec"), 2);
}
