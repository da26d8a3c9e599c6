//! Sandboxed live preview for generated code: HTML/JS in an isolated frame,
//! Python in an embedded interpreter, and a shared recovery surface.

pub mod artifact;
pub mod capture;
pub mod config;
pub mod interpreter;
pub mod llm;
pub mod logger;
pub mod preview;
pub mod printer;
pub mod recovery;
