use dlq_api::error::BrokerError;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};

fn is_timeout(e: &KafkaError) -> bool {
    matches!(
        e.rdkafka_error_code(),
        Some(
            RDKafkaErrorCode::OperationTimedOut
                | RDKafkaErrorCode::MessageTimedOut
                | RDKafkaErrorCode::RequestTimedOut
        )
    )
}

/// Metadata, offset and poll failures: timeouts stay timeouts, the rest is unavailability.
pub(crate) fn client_error(ctx: &str, e: KafkaError) -> BrokerError {
    if is_timeout(&e) {
        BrokerError::timeout(format!("{ctx}: {e}"))
    } else {
        BrokerError::unavailable(format!("{ctx}: {e}"))
    }
}

/// Publish failures: anything that is not a timeout is a rejection.
pub(crate) fn publish_error(topic: &str, e: KafkaError) -> BrokerError {
    if is_timeout(&e) {
        BrokerError::timeout(format!("publish to {topic}: {e}"))
    } else {
        BrokerError::rejected(format!("publish to {topic}: {e}"))
    }
}

/// Run a blocking client call off the async workers.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, BrokerError>
where
    F: FnOnce() -> Result<T, BrokerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BrokerError::unavailable(format!("blocking client task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlq_api::error::BrokerErrorKind;

    #[test]
    fn timeouts_are_recognised() {
        let e = KafkaError::MetadataFetch(RDKafkaErrorCode::OperationTimedOut);
        assert_eq!(client_error("metadata", e).kind, BrokerErrorKind::Timeout);

        let e = KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut);
        assert_eq!(publish_error("orders", e).kind, BrokerErrorKind::Timeout);
    }

    #[test]
    fn other_errors_keep_their_class() {
        let e = KafkaError::MetadataFetch(RDKafkaErrorCode::BrokerTransportFailure);
        let err = client_error("metadata", e);
        assert_eq!(err.kind, BrokerErrorKind::Unavailable);
        assert!(err.message.starts_with("metadata: "));

        let e = KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge);
        let err = publish_error("orders", e);
        assert_eq!(err.kind, BrokerErrorKind::Rejected);
        assert!(err.message.contains("orders"));
    }
}
