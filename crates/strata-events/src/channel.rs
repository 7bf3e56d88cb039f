//! Per-turn event channel.
//!
//! A bounded mpsc channel connects the executor (producer) to the SSE
//! consumer. Lossless events await channel capacity, which is what
//! slows the ReAct loop when the consumer lags. Lossy indicator
//! updates use `try_send` and are counted, not delivered, when the
//! channel is full. The sink yields to the scheduler after every emit
//! so the consumer can drain between loop iterations.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tracing::trace;

use crate::event::ConversationEvent;

/// Default channel depth before the producer applies back-pressure.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Create a connected sink/receiver pair for one turn.
#[must_use]
pub fn turn_channel(capacity: usize) -> (EventSink, EventReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let sink = EventSink {
        tx,
        recorded: Arc::new(Mutex::new(Vec::new())),
        dropped_indicators: Arc::new(AtomicU64::new(0)),
    };
    (sink, EventReceiver { rx })
}

/// Producer half of the turn event channel.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ConversationEvent>,
    recorded: Arc<Mutex<Vec<ConversationEvent>>>,
    dropped_indicators: Arc<AtomicU64>,
}

impl EventSink {
    /// Emit an event.
    ///
    /// Lossless events are also recorded for session persistence.
    /// Always yields afterwards so the consumer task gets a chance to
    /// drain before the producer continues.
    pub async fn emit(&self, event: ConversationEvent) {
        if event.is_lossy() {
            if self.tx.try_send(event).is_err() {
                let dropped = self.dropped_indicators.fetch_add(1, Ordering::Relaxed);
                trace!(dropped = dropped.saturating_add(1), "Dropped indicator update");
            }
        } else {
            {
                let mut recorded = self.recorded.lock().await;
                recorded.push(event.clone());
            }
            // A closed receiver means the client went away; the turn
            // still runs to completion for accounting.
            let _ = self.tx.send(event).await;
        }

        tokio::task::yield_now().await;
    }

    /// Events recorded so far (lossless only), for the session log.
    pub async fn recorded(&self) -> Vec<ConversationEvent> {
        self.recorded.lock().await.clone()
    }

    /// Number of indicator updates dropped under back-pressure.
    #[must_use]
    pub fn dropped_indicator_count(&self) -> u64 {
        self.dropped_indicators.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("dropped_indicators", &self.dropped_indicator_count())
            .finish_non_exhaustive()
    }
}

/// Consumer half of the turn event channel.
pub struct EventReceiver {
    rx: mpsc::Receiver<ConversationEvent>,
}

impl EventReceiver {
    /// Receive the next event; `None` once the turn is over and the
    /// channel drained.
    pub async fn recv(&mut self) -> Option<ConversationEvent> {
        self.rx.recv().await
    }

    /// Convert into the underlying receiver for stream adapters.
    #[must_use]
    pub fn into_inner(self) -> mpsc::Receiver<ConversationEvent> {
        self.rx
    }
}

impl std::fmt::Debug for EventReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReceiver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventMeta, IndicatorState, IndicatorTarget};
    use strata_core::SessionId;

    fn meta() -> EventMeta {
        EventMeta::new(SessionId::new(), 1, "anthropic", "claude-sonnet-4-20250514")
    }

    fn indicator() -> ConversationEvent {
        ConversationEvent::StatusIndicatorUpdate {
            meta: meta(),
            target: IndicatorTarget::Llm,
            state: IndicatorState::Busy,
        }
    }

    fn step(n: u64) -> ConversationEvent {
        ConversationEvent::ConversationLlmStep {
            meta: meta(),
            step_number: n,
            step_name: "Tool Selection".into(),
        }
    }

    #[tokio::test]
    async fn test_emission_order_preserved() {
        let (sink, mut rx) = turn_channel(16);
        sink.emit(step(1)).await;
        sink.emit(step(2)).await;
        sink.emit(step(3)).await;
        drop(sink);

        let mut numbers = Vec::new();
        while let Some(event) = rx.recv().await {
            if let ConversationEvent::ConversationLlmStep { step_number, .. } = event {
                numbers.push(step_number);
            }
        }
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_indicators_dropped_when_full() {
        let (sink, mut rx) = turn_channel(1);
        // Fill the single slot with a lossless event.
        sink.emit(step(1)).await;
        // Indicator cannot fit; it is dropped, not awaited.
        sink.emit(indicator()).await;
        assert_eq!(sink.dropped_indicator_count(), 1);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "conversation_llm_step");
    }

    #[tokio::test]
    async fn test_lossless_events_recorded() {
        let (sink, _rx) = turn_channel(16);
        sink.emit(step(1)).await;
        sink.emit(indicator()).await;
        let recorded = sink.recorded().await;
        // Indicators are transient; only the step is recorded.
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].event_type(), "conversation_llm_step");
    }

    #[tokio::test]
    async fn test_closed_receiver_does_not_fail_emit() {
        let (sink, rx) = turn_channel(2);
        drop(rx);
        sink.emit(step(1)).await;
        assert_eq!(sink.recorded().await.len(), 1);
    }
}
