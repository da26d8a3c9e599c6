use std::{
    collections::HashMap,
    env,
    fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use directories::BaseDirs;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&default_config_path())
    }

    /// Defaults, then the rc file at `path`, then matching environment variables.
    pub fn load_from(path: &Path) -> Self {
        let mut map = default_map();

        if let Ok(file) = fs::File::open(path) {
            let reader = BufReader::new(file);
            for line in reader.lines().map_while(Result::ok) {
                if let Some((k, v)) = parse_line(&line) {
                    map.insert(k, v);
                }
            }
        }

        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path: path.to_path_buf() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Ok(v) = env::var(key) {
            return Some(v);
        }
        self.inner.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.trim().parse::<usize>().ok())
    }

    /// Comma separated list, blanks dropped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.get("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("prism").join("output"))
    }

    pub fn python_bin(&self) -> String {
        self.get("PYTHON_BIN").unwrap_or_else(|| "python3".into())
    }

    pub fn baseline_packages(&self) -> Vec<String> {
        self.get_list("BASELINE_PACKAGES")
    }

    /// Working directory of the interpreter; the only place its code may write.
    pub fn sandbox_dir(&self) -> PathBuf {
        self.get("SANDBOX_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("prism").join("sandbox"))
    }

    /// Address-space cap for the interpreter in MiB, 0 for none.
    pub fn sandbox_memory_mb(&self) -> u64 {
        self.get_u64("SANDBOX_MEMORY_MB").unwrap_or(0)
    }
}

fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (k, v) = line.split_once('=')?;
    Some((k.trim().to_string(), v.trim().to_string()))
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "OPENAI_API_KEY",
        "API_BASE_URL",
        "REQUEST_TIMEOUT",
        "DEFAULT_MODEL",
        "PYTHON_BIN",
        "BASELINE_PACKAGES",
        "OUTPUT_DIR",
        "SANDBOX_DIR",
        "SANDBOX_MEMORY_MB",
        "PREVIEW_VIEWPORT",
        "FRAME_INTERVAL_MS",
        "MAX_FRAMES",
        "AUTOFIX_ATTEMPTS",
    ];

    KEYS.contains(&k) || k.starts_with("PRISM_") || k.starts_with("OPENAI_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("prism").join(".prismrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();
    let out = env::temp_dir().join("prism").join("output");
    m.insert("OUTPUT_DIR".into(), out.to_string_lossy().into_owned());
    let sandbox = env::temp_dir().join("prism").join("sandbox");
    m.insert("SANDBOX_DIR".into(), sandbox.to_string_lossy().into_owned());
    m.insert("SANDBOX_MEMORY_MB".into(), "0".into());

    m.insert("PYTHON_BIN".into(), "python3".into());
    m.insert("BASELINE_PACKAGES".into(), "numpy,matplotlib".into());
    m.insert("PREVIEW_VIEWPORT".into(), "full".into());

    m.insert("FRAME_INTERVAL_MS".into(), "16".into());
    m.insert("MAX_FRAMES".into(), "600".into());
    m.insert("AUTOFIX_ATTEMPTS".into(), "1".into());
    m.insert("REQUEST_TIMEOUT".into(), "60".into());

    m.insert("DEFAULT_MODEL".into(), "gpt-4o".into());
    m.insert("API_BASE_URL".into(), "default".into());
    m.insert("PRISM_LOG_LEVEL".into(), "warn".into());

    m
}
