//! Per-run event channel for live pipeline progress.
//!
//! Single producer (the run's worker task), single consumer (the SSE
//! stream). Publishing never blocks the worker: events land in an unbounded
//! queue and a slow or absent consumer simply lets them accumulate until the
//! run ends, an accepted bound for short-lived single-consumer runs.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const EVENT_PHASE: &str = "phase";
pub const EVENT_PROGRESS: &str = "progress";
pub const EVENT_DONE: &str = "done";
pub const EVENT_ERROR: &str = "error";

#[derive(Debug)]
struct ChannelEvent {
    name: String,
    data: Value,
}

/// Publish/subscribe channel delivering one run's events to exactly one
/// live listener stream.
///
/// The stream yields `event: <name>\ndata: <json>\n\n` framed records in
/// publish order and terminates immediately after delivering a `done` or
/// `error` event; the channel is closed from that point on and further
/// publishes are dropped.
#[derive(Debug)]
pub struct EventChannel {
    tx: mpsc::UnboundedSender<ChannelEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<ChannelEvent>>>,
    /// Shared with the consumer stream, which closes the channel when it
    /// delivers a terminal event.
    closed: Arc<AtomicBool>,
}

impl EventChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue an event for the consumer. Fire-and-forget: a no-op once the
    /// channel is closed, and never an error if the consumer is gone.
    pub fn publish(&self, event: &str, data: Value) {
        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!(event, "event channel closed, dropping event");
            return;
        }
        let _ = self.tx.send(ChannelEvent {
            name: event.to_string(),
            data,
        });
    }

    /// Close the channel exogenously, injecting a terminal `done` event so
    /// a consumer stream that has not yet seen a terminal event still
    /// terminates.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.tx.send(ChannelEvent {
            name: EVENT_DONE.to_string(),
            data: Value::Object(serde_json::Map::new()),
        });
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Consume the channel as a stream of SSE-framed records.
    ///
    /// Only the first caller receives events; the receiver is taken out of
    /// the channel, so a second stream ends immediately.
    pub fn stream(&self) -> impl futures::Stream<Item = String> + Send + 'static {
        let receiver = match self.rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let closed = Arc::clone(&self.closed);
        async_stream::stream! {
            let Some(mut receiver) = receiver else {
                return;
            };
            while let Some(event) = receiver.recv().await {
                let terminal = event.name == EVENT_DONE || event.name == EVENT_ERROR;
                yield format!("event: {}\ndata: {}\n\n", event.name, event.data);
                if terminal {
                    closed.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn delivers_events_in_publish_order() {
        let channel = Arc::new(EventChannel::new());
        channel.publish(EVENT_PHASE, json!({"phase": "scanning"}));
        channel.publish(EVENT_PROGRESS, json!({"processed": 1}));
        channel.publish(EVENT_DONE, json!({}));

        let frames: Vec<String> = channel.stream().collect().await;
        assert_eq!(frames.len(), 3);
        assert!(frames[0].starts_with("event: phase\n"));
        assert!(frames[1].starts_with("event: progress\n"));
        assert!(frames[2].starts_with("event: done\n"));
        assert!(frames[2].ends_with("\n\n"));
    }

    #[tokio::test]
    async fn stream_terminates_on_done_and_ignores_later_publishes() {
        let channel = Arc::new(EventChannel::new());
        channel.publish(EVENT_DONE, json!({}));
        channel.publish(EVENT_PROGRESS, json!({"processed": 99}));

        let frames: Vec<String> = channel.stream().collect().await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("event: done\n"));
        assert!(channel.is_closed());

        // Channel is closed now; this publish is dropped entirely.
        channel.publish(EVENT_PROGRESS, json!({"processed": 100}));
    }

    #[tokio::test]
    async fn error_event_is_terminal() {
        let channel = Arc::new(EventChannel::new());
        channel.publish(EVENT_ERROR, json!({"error": "boom"}));
        channel.publish(EVENT_DONE, json!({}));

        let frames: Vec<String> = channel.stream().collect().await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("event: error\n"));
    }

    #[tokio::test]
    async fn close_injects_terminal_done() {
        let channel = Arc::new(EventChannel::new());
        channel.publish(EVENT_PHASE, json!({"phase": "scanning"}));
        channel.close();

        let frames: Vec<String> = channel.stream().collect().await;
        assert_eq!(frames.len(), 2);
        assert!(frames[1].starts_with("event: done\ndata: {}"));
    }

    #[tokio::test]
    async fn second_stream_ends_immediately() {
        let channel = Arc::new(EventChannel::new());
        channel.publish(EVENT_DONE, json!({}));
        let first: Vec<String> = channel.stream().collect().await;
        assert_eq!(first.len(), 1);
        let second: Vec<String> = channel.stream().collect().await;
        assert!(second.is_empty());
    }
}
