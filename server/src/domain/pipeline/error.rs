//! Pipeline error types

use crate::data::store::StoreError;
use crate::data::topics::TopicError;

/// Failure that terminates the worker group
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to join consumer group '{group}' on topic '{topic}': {source}")]
    QueueJoin {
        topic: String,
        group: String,
        #[source]
        source: TopicError,
    },

    #[error("queue subscription ended: {0}")]
    QueueReceive(#[source] TopicError),

    #[error("span channel closed")]
    SpanChannelClosed,

    #[error("batch channel closed")]
    BatchChannelClosed,

    #[error("pipeline worker aborted: {0}")]
    WorkerAborted(String),
}

/// Failure to make a document's index available; the document is skipped
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("index existence check failed: {0}")]
    ExistenceCheck(#[source] StoreError),

    #[error("index creation failed: {0}")]
    Create(#[source] StoreError),

    #[error("index creation was not acknowledged")]
    NotAcknowledged,

    #[error("no mapping registered for index base name '{0}'")]
    UnknownMapping(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_join_display() {
        let err = PipelineError::QueueJoin {
            topic: "traces".to_string(),
            group: "tracedock".to_string(),
            source: TopicError::ConsumerGroup("NOPERM".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("'tracedock'"));
        assert!(msg.contains("'traces'"));
        assert!(msg.contains("NOPERM"));
    }

    #[test]
    fn test_provisioning_display() {
        assert_eq!(
            ProvisioningError::UnknownMapping("metric".to_string()).to_string(),
            "no mapping registered for index base name 'metric'"
        );
    }
}
