mod cli;
mod handlers;

use std::{
    fs,
    io::{self, Read},
    path::PathBuf,
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use is_terminal::IsTerminal;
use log::LevelFilter;

use prism::{
    artifact::{ArtifactKind, CodeArtifact},
    config::Config,
    interpreter::ExportFormat,
    logger,
    preview::Viewport,
    printer::EventPrinter,
};

use handlers::script::{FixSettings, ScriptOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // Load config
    let cfg = Config::load();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        match logger::parse_level(&cfg.get("PRISM_LOG_LEVEL").unwrap_or_default()) {
            Ok(level) => level,
            Err(e) => {
                eprintln!("ignoring PRISM_LOG_LEVEL: {}", e);
                LevelFilter::Warn
            }
        }
    };
    if let Err(e) = logger::init(level) {
        eprintln!("failed to initialize logging: {}", e);
    }

    // Source: FILE argument, else piped stdin
    let source = match args.file.as_deref() {
        Some(path) => Some(fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?),
        None if !io::stdin().is_terminal() => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Some(buf)
        }
        None => None,
    };

    let explicit_kind = if args.preview {
        Some(ArtifactKind::Markup)
    } else if args.run {
        Some(ArtifactKind::Script)
    } else if let Some(k) = args.kind.as_deref() {
        Some(ArtifactKind::parse(k).ok_or_else(|| anyhow!("unknown kind: {} (expected markup or script)", k))?)
    } else {
        None
    };

    let artifact = source.map(|src| match explicit_kind {
        Some(kind) => CodeArtifact::with_kind(src, kind),
        None => CodeArtifact::new(src),
    });

    let out_dir = args.out.as_deref().map(PathBuf::from).unwrap_or_else(|| cfg.output_dir());
    let color = io::stdout().is_terminal() && !args.json;

    let package_ops = !args.install.is_empty() || args.list_packages;
    let artifact = match artifact {
        Some(a) => Some(a),
        None if package_ops => None,
        None => bail!("no input: pass a FILE or pipe code on stdin"),
    };

    match artifact.as_ref().map(|a| a.kind()) {
        Some(ArtifactKind::Markup) => {
            if package_ops {
                bail!("--install and --list-packages only apply to Python scripts");
            }
            let viewport_name = args
                .viewport
                .clone()
                .or_else(|| cfg.get("PREVIEW_VIEWPORT"))
                .unwrap_or_default();
            let viewport = if viewport_name.is_empty() {
                Viewport::default()
            } else {
                Viewport::parse(&viewport_name).ok_or_else(|| anyhow!("unknown viewport: {}", viewport_name))?
            };
            let artifact = artifact.as_ref().ok_or_else(|| anyhow!("no input"))?;
            log::debug!("previewing artifact {}", artifact.fingerprint());
            handlers::preview::run(artifact, &out_dir, viewport, color)
        }
        _ => {
            let mut exports = Vec::new();
            for name in &args.export {
                exports.push(ExportFormat::parse(name).ok_or_else(|| anyhow!("unknown export format: {}", name))?);
            }

            let fix = if args.fix {
                Some(FixSettings {
                    model: args
                        .model
                        .clone()
                        .or_else(|| cfg.get("DEFAULT_MODEL"))
                        .unwrap_or_else(|| "gpt-4o".to_string()),
                    attempts: cfg.get_usize("AUTOFIX_ATTEMPTS").unwrap_or(1),
                })
            } else {
                None
            };

            let opts = ScriptOptions {
                out_dir,
                exports,
                frames: args.frames.map(|n| n.min(cfg.get_usize("MAX_FRAMES").unwrap_or(600))),
                frame_interval: Duration::from_millis(cfg.get_u64("FRAME_INTERVAL_MS").unwrap_or(16)),
                install: args.install.clone(),
                list_packages: args.list_packages,
                fix,
            };
            let printer = EventPrinter { color, json: args.json };
            if let Some(a) = artifact.as_ref() {
                log::debug!("running artifact {}", a.fingerprint());
            }
            handlers::script::run(&cfg, artifact.as_ref().map(|a| a.source()), &opts, &printer).await
        }
    }
}
