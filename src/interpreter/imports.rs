//! Finds the third-party packages a script imports.

use std::sync::OnceLock;

use regex::Regex;

/// Modules that ship with the interpreter. The runtime gets the final say on
/// anything not listed here.
const STDLIB: &[&str] = &[
    "__future__", "abc", "aifc", "argparse", "array", "ast", "asynchat", "asyncio", "asyncore",
    "atexit", "audioop", "base64", "bdb", "binascii", "bisect", "builtins", "bz2", "calendar",
    "cgi", "cgitb", "chunk", "cmath", "cmd", "code", "codecs", "codeop", "collections",
    "colorsys", "compileall", "concurrent", "configparser", "contextlib", "contextvars", "copy",
    "copyreg", "cProfile", "crypt", "csv", "ctypes", "curses", "dataclasses", "datetime", "dbm",
    "decimal", "difflib", "dis", "doctest", "email", "encodings", "enum", "errno",
    "faulthandler", "fcntl", "filecmp", "fileinput", "fnmatch", "fractions", "ftplib",
    "functools", "gc", "getopt", "getpass", "gettext", "glob", "graphlib", "grp", "gzip",
    "hashlib", "heapq", "hmac", "html", "http", "imaplib", "imghdr", "importlib", "inspect",
    "io", "ipaddress", "itertools", "json", "keyword", "linecache", "locale", "logging", "lzma",
    "mailbox", "mailcap", "marshal", "math", "mimetypes", "mmap", "modulefinder",
    "multiprocessing", "netrc", "nis", "nntplib", "numbers", "operator", "optparse", "os",
    "ossaudiodev", "pathlib", "pdb", "pickle", "pickletools", "pipes", "pkgutil", "platform",
    "plistlib", "poplib", "posix", "pprint", "profile", "pstats", "pty", "pwd", "py_compile",
    "pyclbr", "pydoc", "pyexpat", "queue", "quopri", "random", "re", "readline", "reprlib",
    "resource", "rlcompleter", "runpy", "sched", "secrets", "select", "selectors", "shelve",
    "shlex", "shutil", "signal", "site", "smtpd", "smtplib", "sndhdr", "socket", "socketserver",
    "spwd", "sqlite3", "ssl", "stat", "statistics", "string", "stringprep", "struct",
    "subprocess", "sunau", "symtable", "sys", "sysconfig", "syslog", "tabnanny", "tarfile",
    "telnetlib", "tempfile", "termios", "textwrap", "threading", "time", "timeit", "tkinter",
    "token", "tokenize", "tomllib", "trace", "traceback", "tracemalloc", "tty", "turtle",
    "types", "typing", "unicodedata", "unittest", "urllib", "uu", "uuid", "venv", "warnings",
    "wave", "weakref", "webbrowser", "wsgiref", "xdrlib", "xml", "xmlrpc", "zipapp", "zipfile",
    "zipimport", "zlib", "zoneinfo",
];

/// Import names whose distribution is published under another name.
const ALIASES: &[(&str, &str)] = &[
    ("sklearn", "scikit-learn"),
    ("PIL", "pillow"),
    ("cv2", "opencv-python"),
    ("bs4", "beautifulsoup4"),
    ("yaml", "pyyaml"),
    ("skimage", "scikit-image"),
    ("dateutil", "python-dateutil"),
];

/// Namespace modules shipped inside another distribution.
const BUNDLED: &[(&str, &str)] = &[("mpl_toolkits", "matplotlib")];

fn import_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^import\s+(.+)$").ok()).as_ref()
}

fn from_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^from\s+([A-Za-z_][\w.]*)\s+import\b").ok())
        .as_ref()
}

/// Canonical distribution name: lowercase with `_` and `.` folded to `-`.
pub fn normalize_package(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace(['_', '.'], "-")
}

/// Distribution name for a top-level import name, or `None` for stdlib modules.
pub fn package_for_module(module: &str) -> Option<String> {
    if STDLIB.contains(&module) {
        return None;
    }
    let name = ALIASES
        .iter()
        .chain(BUNDLED)
        .find(|(m, _)| *m == module)
        .map(|(_, pkg)| *pkg)
        .unwrap_or(module);
    Some(normalize_package(name))
}

/// Import name for a distribution, used when preloading baseline packages.
pub fn module_for_package(package: &str) -> String {
    let pkg = normalize_package(package);
    ALIASES
        .iter()
        .find(|(_, p)| *p == pkg)
        .map(|(m, _)| m.to_string())
        .unwrap_or_else(|| pkg.replace('-', "_"))
}

/// Top-level module names imported anywhere in `script`, first appearance first.
pub fn scan_modules(script: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |m: &str| {
        if is_identifier(m) && !found.iter().any(|f| f == m) {
            found.push(m.to_string());
        }
    };

    for raw in script.lines() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if let Some(caps) = from_re().and_then(|re| re.captures(line)) {
            if let Some(m) = caps.get(1) {
                push(top_level(m.as_str()));
            }
        } else if let Some(caps) = import_re().and_then(|re| re.captures(line)) {
            if let Some(list) = caps.get(1) {
                for item in list.as_str().split(',') {
                    let module = item.split_whitespace().next().unwrap_or("");
                    push(top_level(module));
                }
            }
        }
    }
    found
}

/// Imported top-level modules that might need installing: everything not known
/// to ship with the interpreter.
pub fn candidate_modules(script: &str) -> Vec<String> {
    scan_modules(script).into_iter().filter(|m| !STDLIB.contains(&m.as_str())).collect()
}

/// Distribution names for `modules`, deduplicated and normalized.
pub fn packages_for(modules: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for pkg in modules.iter().filter_map(|m| package_for_module(m)) {
        if !out.contains(&pkg) {
            out.push(pkg);
        }
    }
    out
}

fn top_level(module: &str) -> &str {
    module.split('.').next().unwrap_or("")
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
