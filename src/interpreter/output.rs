//! Output target that executed code renders visuals into.

use std::fmt;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum OutputNode {
    /// Rasterized figure, base64 encoded.
    Image { mime: String, data: String },
    /// Serialized interactive chart for a host-side renderer.
    Chart { spec: serde_json::Value },
}

impl OutputNode {
    pub fn image_bytes(&self) -> Option<Result<Vec<u8>>> {
        match self {
            Self::Image { data, .. } => Some(STANDARD.decode(data).context("invalid image payload")),
            Self::Chart { .. } => None,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct OutputTarget {
    nodes: Vec<OutputNode>,
    figure_retained: bool,
}

impl OutputTarget {
    pub fn append(&mut self, node: OutputNode) {
        if matches!(node, OutputNode::Image { .. }) {
            self.figure_retained = true;
        }
        self.nodes.push(node);
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.figure_retained = false;
    }

    pub fn nodes(&self) -> &[OutputNode] {
        &self.nodes
    }

    pub fn images(&self) -> impl Iterator<Item = &OutputNode> {
        self.nodes.iter().filter(|n| matches!(n, OutputNode::Image { .. }))
    }

    pub fn last_image(&self) -> Option<&OutputNode> {
        self.images().last()
    }

    /// Whether the runtime still holds the figure behind the last image.
    pub fn figure_retained(&self) -> bool {
        self.figure_retained
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    Svg,
    Pdf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
            Self::Pdf => "pdf",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "svg" => Some(Self::Svg),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
