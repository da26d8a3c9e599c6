//! Script handler: runs Python through the embedded interpreter, drives
//! animation frames, writes visual output, and optionally autofixes.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{bail, Context, Result};

use prism::{
    config::Config,
    interpreter::{ExportFormat, InterpreterEngine, OutputNode, PythonProcess},
    printer::{EventPrinter, MarkdownPrinter},
    recovery::{llm_fix::LlmFixGenerator, RecoveryCoordinator},
};

pub struct ScriptOptions {
    pub out_dir: PathBuf,
    pub exports: Vec<ExportFormat>,
    pub frames: Option<usize>,
    pub frame_interval: Duration,
    pub install: Vec<String>,
    pub list_packages: bool,
    pub fix: Option<FixSettings>,
}

pub struct FixSettings {
    pub model: String,
    pub attempts: usize,
}

pub async fn run(cfg: &Config, source: Option<&str>, opts: &ScriptOptions, printer: &EventPrinter) -> Result<()> {
    let runtime = PythonProcess::new(cfg.python_bin())
        .with_scratch_dir(cfg.sandbox_dir())
        .with_memory_limit(cfg.sandbox_memory_mb());
    let mut engine = InterpreterEngine::new(runtime, cfg.baseline_packages());
    let outcome = drive(cfg, &mut engine, source, opts, printer).await;
    engine.reset().await;
    outcome
}

async fn drive(
    cfg: &Config,
    engine: &mut InterpreterEngine<PythonProcess>,
    source: Option<&str>,
    opts: &ScriptOptions,
    printer: &EventPrinter,
) -> Result<()> {
    for name in &opts.install {
        match engine.install(name).await {
            Ok(()) => eprintln!("installed {}", name),
            Err(e) => eprintln!("{}", e),
        }
    }
    if opts.list_packages {
        if let Err(e) = engine.boot().await {
            printer.print_all(engine.events().events());
            bail!(e);
        }
        for name in engine.refresh_installed().await? {
            println!("{}", name);
        }
    }

    let Some(source) = source else {
        return Ok(());
    };

    let coordinator = match &opts.fix {
        Some(fix) => Some(RecoveryCoordinator::new(LlmFixGenerator::from_config(cfg, &fix.model)?)),
        None => None,
    };
    let attempts = opts.fix.as_ref().map(|f| f.attempts).unwrap_or(0);

    let mut code = source.to_string();
    let mut attempt = 0;
    loop {
        execute_once(engine, &code, opts, printer).await?;

        if !engine.events().has_errors() {
            return Ok(());
        }
        if let Some(parsed) = RecoveryCoordinator::retry_only().diagnose(engine.events()) {
            printer.print_diagnosis(&parsed);
        }
        let Some(coord) = coordinator.as_ref() else { break };
        if attempt >= attempts {
            break;
        }
        attempt += 1;

        eprintln!("requesting fix ({}/{})...", attempt, attempts);
        let fixed = coord.offer_autofix(&code, &engine.events().error_context()).await?;
        if !fixed.explanation.is_empty() {
            MarkdownPrinter::default().print(&fixed.explanation);
        }
        code = fixed.code;
    }
    bail!("script finished with errors")
}

async fn execute_once(
    engine: &mut InterpreterEngine<PythonProcess>,
    code: &str,
    opts: &ScriptOptions,
    printer: &EventPrinter,
) -> Result<()> {
    let started = engine.run(code).await;
    printer.print_all(engine.events().events());
    started?;

    if let Some(max) = opts.frames {
        drive_frames(engine, max, opts.frame_interval, printer).await?;
    }

    if engine.has_visual_output() {
        write_output(engine, &opts.out_dir)?;
    }
    for format in &opts.exports {
        match engine.export(*format).await {
            Ok(bytes) => {
                fs::create_dir_all(&opts.out_dir)
                    .with_context(|| format!("failed to create {}", opts.out_dir.display()))?;
                let path = opts.out_dir.join(format!("figure.{}", format.extension()));
                fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
                eprintln!("exported {}", path.display());
            }
            Err(e) => eprintln!("export {}: {}", format, e),
        }
    }
    Ok(())
}

async fn drive_frames(
    engine: &mut InterpreterEngine<PythonProcess>,
    max: usize,
    interval: Duration,
    printer: &EventPrinter,
) -> Result<()> {
    let start = Instant::now();
    for _ in 0..max {
        if engine.active_frames() == 0 || !engine.can_run() {
            break;
        }
        tokio::time::sleep(interval).await;
        let mark = engine.events().next_seq();
        engine.tick_frames(start.elapsed().as_secs_f64() * 1000.0).await?;
        printer.print_all(engine.events().since(mark));
    }
    Ok(())
}

fn write_output(engine: &InterpreterEngine<PythonProcess>, out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("failed to create {}", out_dir.display()))?;
    for (i, node) in engine.output().nodes().iter().enumerate() {
        let (path, bytes) = match node {
            OutputNode::Image { .. } => match node.image_bytes() {
                Some(bytes) => (out_dir.join(format!("plot-{}.png", i + 1)), bytes?),
                None => continue,
            },
            OutputNode::Chart { spec } => {
                (out_dir.join(format!("chart-{}.json", i + 1)), serde_json::to_vec_pretty(spec)?)
            }
        };
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}
