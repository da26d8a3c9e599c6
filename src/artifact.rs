//! Code artifacts handed to the engines and the markup/script discriminant.

use serde::{Deserialize, Serialize};

/// Which engine should execute an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// HTML/JS rendered by the isolated preview engine.
    Markup,
    /// Python run by the embedded interpreter engine.
    Script,
}

impl ArtifactKind {
    /// Cheap prefix heuristic: trimmed content opening with a doctype or `<html` is markup.
    pub fn detect(source: &str) -> Self {
        if looks_like_markup(source) {
            Self::Markup
        } else {
            Self::Script
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markup" | "html" => Some(Self::Markup),
            "script" | "python" | "py" => Some(Self::Script),
            _ => None,
        }
    }
}

pub fn looks_like_markup(source: &str) -> bool {
    let head: String = source
        .trim_start()
        .chars()
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Generated source plus the engine that should execute it.
///
/// Immutable once built; a new artifact replaces the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeArtifact {
    source: String,
    kind: ArtifactKind,
}

impl CodeArtifact {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let kind = ArtifactKind::detect(&source);
        Self { source, kind }
    }

    /// Build with an explicit kind tag from the producer; the tag wins over the heuristic.
    pub fn with_kind(source: impl Into<String>, kind: ArtifactKind) -> Self {
        Self { source: source.into(), kind }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Short content hash, used for naming files derived from this artifact.
    pub fn fingerprint(&self) -> String {
        let digest = md5::compute(self.source.as_bytes());
        format!("{:x}", digest)[..12].to_string()
    }
}
