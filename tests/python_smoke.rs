use std::process::Command;

use prism::{
    capture::EventKind,
    interpreter::{EngineError, InterpreterEngine, Lifecycle, PythonProcess},
};

fn python_available() -> bool {
    Command::new("python3").arg("--version").output().map(|o| o.status.success()).unwrap_or(false)
}

fn sandboxed(scratch: &std::path::Path, baseline: &[&str]) -> InterpreterEngine<PythonProcess> {
    InterpreterEngine::new(
        PythonProcess::new("python3").with_scratch_dir(scratch),
        baseline.iter().map(|s| s.to_string()).collect(),
    )
}

fn kinds_and_texts(engine: &InterpreterEngine<PythonProcess>) -> Vec<(EventKind, String)> {
    engine.events().events().iter().map(|e| (e.kind, e.text.clone())).collect()
}

#[tokio::test]
async fn real_interpreter_round_trip() {
    if !python_available() {
        println!("python3 not found, skipping");
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let mut engine = sandboxed(scratch.path(), &[]);
    engine
        .run("import sys\nprint(1 + 2 + 3)\nsys.stderr.write('careful\\n')\n")
        .await
        .unwrap();
    let events: Vec<(EventKind, &str)> =
        engine.events().events().iter().map(|e| (e.kind, e.text.as_str())).collect();
    assert_eq!(events, vec![(EventKind::Log, "6"), (EventKind::Error, "careful")]);
    assert_eq!(*engine.lifecycle(), Lifecycle::Ready);

    // state does not leak between runs
    engine.run("print(sys)").await.unwrap();
    let err = engine.events().last_error().unwrap();
    assert!(err.text.starts_with("NameError"));

    let script = "\
n = [0]
def tick(ts):
    n[0] += 1
    print('frame', n[0])
    if n[0] < 2:
        request_animation_frame(tick)
request_animation_frame(tick)
";
    engine.run(script).await.unwrap();
    assert_eq!(engine.active_frames(), 1);
    engine.tick_frames(16.0).await.unwrap();
    engine.tick_frames(32.0).await.unwrap();
    assert_eq!(engine.active_frames(), 0);
    let logs: Vec<&str> = engine.events().events().iter().map(|e| e.text.as_str()).collect();
    assert_eq!(logs, vec!["frame 1", "frame 2"]);

    engine.run("def f(:\n  pass").await.unwrap();
    assert!(engine.events().last_error().unwrap().text.starts_with("SyntaxError"));

    engine.reset().await;
    assert!(!engine.runtime().is_running());
}

#[tokio::test]
async fn partial_lines_keep_their_order_across_streams() {
    if !python_available() {
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let mut engine = sandboxed(scratch.path(), &[]);
    engine
        .run("import sys\nprint('a', end='')\nsys.stderr.write('b\\n')\nprint('c')\n")
        .await
        .unwrap();
    assert_eq!(
        kinds_and_texts(&engine),
        vec![
            (EventKind::Log, "a".to_string()),
            (EventKind::Error, "b".to_string()),
            (EventKind::Log, "c".to_string()),
        ]
    );
    engine.reset().await;
}

#[tokio::test]
async fn writes_are_confined_to_the_scratch_dir() {
    if !python_available() {
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let target = outside.path().join("escape.txt");
    let mut engine = sandboxed(scratch.path(), &[]);

    engine.run(&format!("open({:?}, 'w').write('x')", target.display().to_string())).await.unwrap();
    let err = engine.events().last_error().unwrap();
    assert!(err.text.starts_with("PermissionError"), "{}", err.text);
    assert!(!target.exists());

    engine.run(&format!("import os\nos.remove({:?})", outside.path().display().to_string())).await.unwrap();
    assert!(engine.events().last_error().unwrap().text.starts_with("PermissionError"));
    assert!(outside.path().exists());

    engine.run("open('inside.txt', 'w').write('ok')\nimport tempfile\ntempfile.mkstemp()").await.unwrap();
    assert!(!engine.events().has_errors(), "{:?}", kinds_and_texts(&engine));
    assert_eq!(std::fs::read_to_string(scratch.path().join("inside.txt")).unwrap(), "ok");
    engine.reset().await;
}

#[cfg(unix)]
#[tokio::test]
async fn host_processes_cannot_be_signalled_or_spawned() {
    if !python_available() {
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let mut engine = sandboxed(scratch.path(), &[]);

    engine.run("import os, signal\nos.kill(os.getppid(), signal.SIGTERM)").await.unwrap();
    assert!(engine.events().last_error().unwrap().text.starts_with("PermissionError"));
    // still here, and the interpreter still answers
    assert_eq!(*engine.lifecycle(), Lifecycle::Ready);

    engine.run("import subprocess\nsubprocess.run(['true'])").await.unwrap();
    assert!(engine.events().last_error().unwrap().text.starts_with("PermissionError"));

    engine.run("import os\nos.system('true')").await.unwrap();
    assert!(engine.events().last_error().unwrap().text.starts_with("PermissionError"));

    engine.run("import ctypes, os\nctypes.CDLL(None).kill(os.getppid(), 15)").await.unwrap();
    assert!(engine.events().last_error().unwrap().text.starts_with("PermissionError"));

    engine.run("print('alive')").await.unwrap();
    assert_eq!(kinds_and_texts(&engine), vec![(EventKind::Log, "alive".to_string())]);
    engine.reset().await;
}

#[tokio::test]
async fn host_secrets_are_not_inherited() {
    if !python_available() {
        return;
    }
    std::env::set_var("PRISM_SMOKE_SECRET", "hunter2");
    let scratch = tempfile::tempdir().unwrap();
    let mut engine = sandboxed(scratch.path(), &[]);
    engine
        .run("import os\nprint('PRISM_SMOKE_SECRET' in os.environ)\nprint(os.getcwd() == os.path.realpath(os.environ['TMPDIR']))")
        .await
        .unwrap();
    let logs: Vec<String> = kinds_and_texts(&engine).into_iter().map(|(_, t)| t).collect();
    assert_eq!(logs, vec!["False", "True"]);
    engine.reset().await;
}

#[tokio::test]
async fn stdlib_and_importable_modules_are_not_installed() {
    if !python_available() {
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let mut engine = sandboxed(scratch.path(), &[]);
    engine.run("import opcode, sre_parse, _thread\nimport pip\nprint('ok')").await.unwrap();
    assert_eq!(kinds_and_texts(&engine), vec![(EventKind::Log, "ok".to_string())]);
    engine.reset().await;
}

#[tokio::test]
async fn frame_callback_exception_is_an_animation_error() {
    if !python_available() {
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let mut engine = sandboxed(scratch.path(), &[]);
    engine.run("def tick(ts):\n    1 / 0\nrequest_animation_frame(tick)").await.unwrap();
    assert_eq!(engine.tick_frames(16.0).await.unwrap(), 1);

    let err = engine.events().last_error().unwrap();
    assert_eq!(err.kind, EventKind::AnimationFrameError);
    assert!(err.text.starts_with("ZeroDivisionError"));
    assert_eq!(engine.active_frames(), 0);
    assert_eq!(*engine.lifecycle(), Lifecycle::Ready);
    engine.reset().await;
}

#[tokio::test]
async fn importable_baseline_boots_ready() {
    if !python_available() {
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let mut engine = sandboxed(scratch.path(), &["pip"]);
    engine.boot().await.unwrap();
    assert_eq!(*engine.lifecycle(), Lifecycle::Ready);
    let installed = engine.refresh_installed().await.unwrap();
    assert!(installed.iter().any(|p| p == "pip"), "{:?}", installed);
    engine.reset().await;
}

#[tokio::test]
async fn unfetchable_baseline_makes_the_engine_unavailable() {
    if !python_available() {
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let mut engine = sandboxed(scratch.path(), &["prism-no-such-package-zz"]);
    match engine.boot().await {
        Err(EngineError::Unavailable(reason)) => {
            assert!(reason.contains("prism-no-such-package-zz"), "{}", reason);
            assert!(reason.contains("could not be loaded"), "{}", reason);
        }
        other => panic!("expected unavailable, got {:?}", other.map(|_| ())),
    }
    assert!(!engine.can_run());
    engine.reset().await;
}

#[tokio::test]
async fn installing_an_unknown_package_fails() {
    if !python_available() {
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let mut engine = sandboxed(scratch.path(), &[]);
    assert!(engine.install("prism-no-such-package-zz").await.is_err());
    assert!(!engine.list_installed().contains(&"prism-no-such-package-zz".to_string()));
    engine.reset().await;
}
