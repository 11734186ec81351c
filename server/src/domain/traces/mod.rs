//! Span decoding and document assembly
//!
//! - `decode` - OTLP payload (protobuf or JSON) into flattened spans
//! - `span` - span to document conversion

mod decode;
mod span;

pub use decode::{DecodeError, PayloadFormat, decode, decode_request};
pub use span::{AssembleOptions, AssemblyError, Document, Span};
