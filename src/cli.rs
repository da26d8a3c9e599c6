use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "prism", about = "Run generated HTML/JS or Python in a sandboxed live preview", version)]
#[command(group(ArgGroup::new("mode").args(["preview", "run"]).multiple(false)))]
pub struct Cli {
    /// Source file to execute. Reads stdin when omitted.
    #[arg(value_name = "FILE")]
    pub file: Option<String>,

    /// Override content detection (markup|script).
    #[arg(long)]
    pub kind: Option<String>,

    /// Render as HTML/JS in the sandboxed preview.
    #[arg(short = 'p', long)]
    pub preview: bool,

    /// Run as Python in the embedded interpreter.
    #[arg(short = 'r', long)]
    pub run: bool,

    /// Preview width: full, mobile (375px), tablet (768px) or desktop (1280px).
    #[arg(long)]
    pub viewport: Option<String>,

    /// Directory for the preview page, plots and exports.
    #[arg(short = 'o', long = "out")]
    pub out: Option<String>,

    /// Export the last shown figure (png|svg|pdf). Can be repeated.
    #[arg(long = "export", action = clap::ArgAction::Append)]
    pub export: Vec<String>,

    /// Drive up to N animation frames after the script finishes.
    #[arg(long)]
    pub frames: Option<usize>,

    /// Install a package into the interpreter before running. Can be repeated.
    #[arg(long = "install", action = clap::ArgAction::Append)]
    pub install: Vec<String>,

    /// List installed interpreter packages.
    #[arg(long = "list-packages")]
    pub list_packages: bool,

    /// Ask the model to fix the code when it fails, then run the fix.
    #[arg(long)]
    pub fix: bool,

    /// Model used for autofix.
    #[arg(long)]
    pub model: Option<String>,

    /// Print captured events as JSON lines.
    #[arg(long)]
    pub json: bool,

    /// Debug logging on stderr.
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
