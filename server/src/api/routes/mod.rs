//! API route handlers

pub mod collector;
pub mod health;
pub mod stats;
