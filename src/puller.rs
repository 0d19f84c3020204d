//! Bounded Batch Acquirer
//!
//! Pulls one batch from a subscription, stopping at whichever cap is hit
//! first: wall-clock time, message count or cumulative payload bytes.
//! Messages are acknowledged as they arrive, so a crash after a pull loses the
//! batch rather than redelivering it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::transport::{Disposition, Message, ReceiveHandler, Subscription};

/// Caps for one pull
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_duration: Duration,
    pub max_batch_size: usize,
    /// Cumulative payload bytes
    pub max_throughput: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(30),
            max_batch_size: 1000,
            max_throughput: 10 * 1024 * 1024,
        }
    }
}

impl BatchLimits {
    fn reached(&self, state: &BatchState, started: Instant) -> bool {
        state.messages.len() >= self.max_batch_size
            || state.bytes >= self.max_throughput
            || started.elapsed() >= self.max_duration
    }
}

#[derive(Debug, Default)]
struct BatchState {
    messages: Vec<Message>,
    bytes: usize,
    closed: bool,
}

/// Pulls bounded batches from one subscription
pub struct BatchAcquirer {
    subscription: Arc<dyn Subscription>,
    limits: BatchLimits,
}

impl BatchAcquirer {
    pub fn new(subscription: Arc<dyn Subscription>, limits: BatchLimits) -> Self {
        Self { subscription, limits }
    }

    pub fn limits(&self) -> &BatchLimits {
        &self.limits
    }

    /// Receive until a cap is reached.
    ///
    /// An empty batch is not an error. A failing subscription is only an
    /// error when nothing was received before it failed.
    pub async fn pull(&self) -> PipelineResult<Vec<Message>> {
        if self.limits.max_batch_size == 0 || self.limits.max_throughput == 0 {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let state = Arc::new(Mutex::new(BatchState::default()));
        let cancel = CancellationToken::new();

        let handler: ReceiveHandler = {
            let state = Arc::clone(&state);
            let cancel = cancel.clone();
            let limits = self.limits;
            Arc::new(move |message: Message| {
                let mut state = state.lock();
                if state.closed {
                    return Disposition::Nack;
                }
                state.bytes += message.len();
                state.messages.push(message);
                if limits.reached(&state, started) {
                    state.closed = true;
                    cancel.cancel();
                }
                Disposition::Ack
            })
        };

        let received = tokio::time::timeout(
            self.limits.max_duration,
            self.subscription.receive(cancel.clone(), handler),
        )
        .await;
        cancel.cancel();

        let (messages, bytes) = {
            let mut state = state.lock();
            state.closed = true;
            (std::mem::take(&mut state.messages), state.bytes)
        };

        match received {
            Err(_) => debug!(elapsed = ?started.elapsed(), "pull stopped by time cap"),
            Ok(Ok(())) => {}
            Ok(Err(e)) if messages.is_empty() => {
                return Err(PipelineError::Receive(e.to_string()));
            }
            Ok(Err(e)) => warn!(error = %e, received = messages.len(), "subscription failed mid-batch"),
        }

        info!(messages = messages.len(), bytes, "pulled batch");
        Ok(messages)
    }
}
