//! Domain logic: span decoding and assembly, and the collector pipeline

pub mod pipeline;
pub mod traces;

pub use pipeline::{CollectorService, PipelineError, PipelineStats, SpanIntake};
pub use traces::{Document, Span};
