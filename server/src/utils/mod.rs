//! Shared helpers

pub mod file;
pub mod otlp;
pub mod retry;
pub mod time;
