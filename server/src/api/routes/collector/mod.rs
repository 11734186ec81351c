//! Trace intake endpoints
//!
//! - `POST /traces` pushes spans straight into the pipeline
//! - `POST /queue/traces` publishes the raw payload to the queue stream

mod encoding;
mod queue;
mod traces;

pub use encoding::IngestAck;

use axum::Router;
use axum::routing::post;

use crate::data::topics::StreamTopic;
use crate::domain::SpanIntake;

#[derive(Clone)]
pub struct CollectorState {
    pub intake: SpanIntake,
    /// `None` when the queue is disabled
    pub queue_topic: Option<StreamTopic>,
}

pub fn routes(state: CollectorState) -> Router {
    Router::new()
        .route("/traces", post(traces::push))
        .route("/queue/traces", post(queue::publish))
        .with_state(state)
}
