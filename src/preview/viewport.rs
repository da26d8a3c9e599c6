//! Fixed-width display modes simulating device classes.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Viewport {
    #[default]
    Full,
    Mobile,
    Tablet,
    Desktop,
}

impl Viewport {
    /// Pixel width of the rendering viewport; `None` means full width.
    pub fn width(self) -> Option<u32> {
        match self {
            Self::Full => None,
            Self::Mobile => Some(375),
            Self::Tablet => Some(768),
            Self::Desktop => Some(1280),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Some(Self::Full),
            "mobile" => Some(Self::Mobile),
            "tablet" => Some(Self::Tablet),
            "desktop" => Some(Self::Desktop),
            _ => None,
        }
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.width() {
            Some(w) => write!(f, "{:?} ({}px)", self, w),
            None => f.write_str("Full"),
        }
    }
}
