//! Delivery loop: drains one subscription into a transport sink.
//!
//! Each write is bounded by a timeout. The loop ends when the peer goes away,
//! when the broker evicts the subscriber or shuts down, or when the transport
//! fails. The subscription is dropped on exit, which unregisters it.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use rickybot_types::error::DeliveryError;

use super::broker::Subscription;

/// Why the server is closing a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The subscriber's buffer overflowed.
    SlowConsumer,
    /// The server is shutting down.
    GoingAway,
}

impl CloseReason {
    /// WebSocket close status code.
    pub fn code(self) -> u16 {
        match self {
            CloseReason::SlowConsumer => 1008,
            CloseReason::GoingAway => 1001,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            CloseReason::SlowConsumer => "connection too slow to keep up with messages",
            CloseReason::GoingAway => "server shutting down",
        }
    }
}

/// How a delivery loop ended without a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryEnd {
    PeerClosed,
    Evicted,
    BrokerShutdown,
}

/// Outbound half of a live connection.
pub trait NotificationSink: Send {
    fn send(&mut self, payload: Bytes) -> impl Future<Output = Result<(), DeliveryError>> + Send;

    fn close(&mut self, reason: CloseReason) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Write every payload of `subscription` to `sink` until the loop ends.
///
/// `peer_closed` is fired by whoever watches the inbound half of the
/// connection. An eviction also interrupts a write that is in progress.
pub async fn deliver<S: NotificationSink>(
    mut subscription: Subscription,
    sink: &mut S,
    write_timeout: Duration,
    peer_closed: CancellationToken,
) -> Result<DeliveryEnd, DeliveryError> {
    let evicted = subscription.evicted().clone();
    let shutdown = subscription.broker_shutdown().clone();

    let outcome = loop {
        let payload = tokio::select! {
            biased;
            _ = peer_closed.cancelled() => break Ok(DeliveryEnd::PeerClosed),
            _ = evicted.cancelled() => break Ok(DeliveryEnd::Evicted),
            _ = shutdown.cancelled() => break Ok(DeliveryEnd::BrokerShutdown),
            payload = subscription.recv() => match payload {
                Some(payload) => payload,
                None => break Ok(DeliveryEnd::BrokerShutdown),
            },
        };

        let write = tokio::time::timeout(write_timeout, sink.send(payload));
        let result = tokio::select! {
            biased;
            _ = evicted.cancelled() => break Ok(DeliveryEnd::Evicted),
            result = write => result,
        };
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => break Err(err),
            Err(_) => break Err(DeliveryError::Timeout(write_timeout)),
        }
    };

    let reason = match outcome {
        Ok(DeliveryEnd::Evicted) => Some(CloseReason::SlowConsumer),
        Ok(DeliveryEnd::BrokerShutdown) => Some(CloseReason::GoingAway),
        _ => None,
    };
    if let Some(reason) = reason {
        // Best effort: the peer may already be unreachable.
        let _ = tokio::time::timeout(write_timeout, sink.close(reason)).await;
    }

    debug!(
        subscriber_id = subscription.id(),
        session_id = %subscription.tag(),
        outcome = ?outcome,
        "Delivery loop finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use rickybot_types::session::SessionId;

    use crate::notify::broker::NotificationBroker;

    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<Bytes>>>,
        closes: Arc<Mutex<Vec<CloseReason>>>,
        stall: bool,
        fail: bool,
    }

    impl NotificationSink for RecordingSink {
        async fn send(&mut self, payload: Bytes) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Transport("connection reset".to_string()));
            }
            if self.stall {
                std::future::pending::<()>().await;
            }
            self.sent.lock().unwrap().push(payload);
            Ok(())
        }

        async fn close(&mut self, reason: CloseReason) -> Result<(), DeliveryError> {
            self.closes.lock().unwrap().push(reason);
            Ok(())
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn delivers_until_peer_closes() {
        let broker = Arc::new(NotificationBroker::new(4));
        let tag = SessionId::new();
        let subscription = broker.subscribe(tag);
        let sink = RecordingSink::default();
        let sent = Arc::clone(&sink.sent);
        let peer_closed = CancellationToken::new();

        let task = {
            let peer_closed = peer_closed.clone();
            let mut sink = sink.clone();
            tokio::spawn(async move {
                deliver(subscription, &mut sink, Duration::from_secs(5), peer_closed).await
            })
        };

        broker.publish(&tag, Bytes::from("one"));
        broker.publish(&tag, Bytes::from("two"));
        wait_until(|| sent.lock().unwrap().len() == 2).await;

        peer_closed.cancel();
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, DeliveryEnd::PeerClosed);
        assert_eq!(*sent.lock().unwrap(), vec![Bytes::from("one"), Bytes::from("two")]);
        assert_eq!(broker.subscriber_count(), 0);
        assert!(sink.closes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn eviction_interrupts_stalled_write() {
        let broker = Arc::new(NotificationBroker::new(1));
        let tag = SessionId::new();
        let subscription = broker.subscribe(tag);
        let sink = RecordingSink {
            stall: true,
            ..Default::default()
        };
        let closes = Arc::clone(&sink.closes);

        let task = {
            let mut sink = sink.clone();
            tokio::spawn(async move {
                deliver(
                    subscription,
                    &mut sink,
                    Duration::from_secs(30),
                    CancellationToken::new(),
                )
                .await
            })
        };

        // First payload is picked up and stalls in the sink; the next fills
        // the buffer; the one after overflows and evicts.
        broker.publish(&tag, Bytes::from("a"));
        wait_until(|| {
            broker.publish(&tag, Bytes::from("x"));
            task.is_finished()
        })
        .await;

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, DeliveryEnd::Evicted);
        assert_eq!(*closes.lock().unwrap(), vec![CloseReason::SlowConsumer]);
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn write_timeout_ends_loop() {
        let broker = NotificationBroker::new(4);
        let tag = SessionId::new();
        let subscription = broker.subscribe(tag);
        let mut sink = RecordingSink {
            stall: true,
            ..Default::default()
        };

        broker.publish(&tag, Bytes::from("slow"));
        let result = deliver(
            subscription,
            &mut sink,
            Duration::from_millis(50),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(DeliveryError::Timeout(_))));
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn transport_error_ends_loop() {
        let broker = NotificationBroker::new(4);
        let tag = SessionId::new();
        let subscription = broker.subscribe(tag);
        let mut sink = RecordingSink {
            fail: true,
            ..Default::default()
        };

        broker.publish(&tag, Bytes::from("boom"));
        let result = deliver(
            subscription,
            &mut sink,
            Duration::from_secs(5),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(DeliveryError::Transport(_))));
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn broker_shutdown_closes_going_away() {
        let broker = NotificationBroker::new(4);
        let subscription = broker.subscribe(SessionId::new());
        let mut sink = RecordingSink::default();

        broker.shutdown();
        let outcome = deliver(
            subscription,
            &mut sink,
            Duration::from_secs(5),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, DeliveryEnd::BrokerShutdown);
        assert_eq!(*sink.closes.lock().unwrap(), vec![CloseReason::GoingAway]);
    }

    #[test]
    fn close_reason_codes() {
        assert_eq!(CloseReason::SlowConsumer.code(), 1008);
        assert_eq!(CloseReason::GoingAway.code(), 1001);
        assert_eq!(
            CloseReason::SlowConsumer.message(),
            "connection too slow to keep up with messages"
        );
    }
}
