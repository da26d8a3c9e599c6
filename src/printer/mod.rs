//! Printers: captured-event console lines and markdown (termimad).

use owo_colors::OwoColorize;
use termimad::MadSkin;

use crate::{
    capture::{CapturedEvent, EventKind},
    recovery::ParsedError,
};

/// Renders captured events as terminal lines: errors red, warnings yellow.
pub struct EventPrinter {
    pub color: bool,
    pub json: bool,
}

impl EventPrinter {
    pub fn print(&self, event: &CapturedEvent) {
        if self.json {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{}", line);
            }
            return;
        }
        println!("{}", self.format(event));
    }

    pub fn print_all<'a>(&self, events: impl IntoIterator<Item = &'a CapturedEvent>) {
        for ev in events {
            self.print(ev);
        }
    }

    pub fn format(&self, event: &CapturedEvent) -> String {
        let text = event.full_text();
        if !self.color {
            return match event.kind {
                EventKind::Log => text,
                EventKind::Warning => format!("warning: {}", text),
                EventKind::Error | EventKind::AnimationFrameError => format!("error: {}", text),
                EventKind::PlotRendered => format!("[{}]", text),
            };
        }
        match event.kind {
            EventKind::Log => text,
            EventKind::Warning => format!("{}", text.yellow()),
            EventKind::Error | EventKind::AnimationFrameError => format!("{}", text.red()),
            EventKind::PlotRendered => format!("{}", format!("[{}]", text).cyan()),
        }
    }

    pub fn print_diagnosis(&self, parsed: &ParsedError) {
        let line = parsed
            .line_number
            .map(|n| format!(" (line {})", n))
            .unwrap_or_default();
        let header = format!("{}{}: {}", parsed.category, line, parsed.message);
        if self.color {
            eprintln!("{}", header.red().bold());
        } else {
            eprintln!("{}", header);
        }
    }
}

#[derive(Default)]
pub struct MarkdownPrinter {
    pub skin: MadSkin,
}

impl MarkdownPrinter {
    pub fn print(&self, text: &str) {
        self.skin.print_text(text);
        println!();
    }
}
