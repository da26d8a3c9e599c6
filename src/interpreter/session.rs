//! Process-wide interpreter state: lifecycle, installed packages, live frame loops.

use std::{collections::BTreeSet, fmt};

use super::{animation::AnimationRegistry, imports::normalize_package};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Loading,
    Ready,
    Executing,
    /// Bootstrap failed; terminal until a full reset.
    Unavailable(String),
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Loading => f.write_str("loading"),
            Self::Ready => f.write_str("ready"),
            Self::Executing => f.write_str("executing"),
            Self::Unavailable(reason) => write!(f, "unavailable ({})", reason),
        }
    }
}

#[derive(Debug, Default)]
pub struct InterpreterSession {
    pub lifecycle: Lifecycle,
    installed: BTreeSet<String>,
    pub frames: AnimationRegistry,
}

impl InterpreterSession {
    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.contains(&normalize_package(name))
    }

    /// Record a package; re-adding a known name is a no-op.
    pub fn mark_installed(&mut self, name: &str) {
        self.installed.insert(normalize_package(name));
    }

    pub fn replace_installed<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.installed = names
            .into_iter()
            .map(|n| normalize_package(n.as_ref()))
            .filter(|n| !n.is_empty())
            .collect();
    }

    /// Installed names in sorted order.
    pub fn installed(&self) -> Vec<String> {
        self.installed.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installing_twice_keeps_one_entry() {
        let mut s = InterpreterSession::default();
        s.mark_installed("numpy");
        let before = s.installed();
        s.mark_installed("NumPy");
        assert_eq!(s.installed(), before);
        assert!(s.is_installed("numpy"));
    }

    #[test]
    fn replace_normalizes_names() {
        let mut s = InterpreterSession::default();
        s.replace_installed(["Pillow", "scikit_learn", ""]);
        assert_eq!(s.installed(), vec!["pillow", "scikit-learn"]);
    }

    #[test]
    fn unavailable_displays_reason() {
        assert_eq!(Lifecycle::Unavailable("no python".into()).to_string(), "unavailable (no python)");
    }
}
