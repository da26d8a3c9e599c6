//! Command handlers: one per artifact kind.

pub mod preview;
pub mod script;
