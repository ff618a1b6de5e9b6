//! The partitioned request lanes.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use common::RequestId;
use tokio::sync::{RwLock, mpsc};

use crate::error::{Result, SequencerError};
use crate::push::PushChannels;
use crate::request::{CheckoutOutcome, CheckoutRequest, RequestHandler};

/// Sequencer tuning knobs.
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Number of ordered lanes (partitions).
    pub lanes: usize,
    /// Buffered requests per lane before submit applies backpressure.
    pub lane_capacity: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            lanes: 8,
            lane_capacity: 256,
        }
    }
}

/// Derives the lane for a partition key.
pub fn partition_for(key: &str, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % lanes as u64) as usize
}

/// Routes checkout requests to ordered lanes and records their terminal
/// outcomes.
///
/// Delivery is at-least-once from the caller's point of view: a request
/// id whose terminal outcome is already recorded is acknowledged by
/// re-pushing that outcome instead of invoking the handler again.
pub struct Sequencer {
    senders: Vec<mpsc::Sender<CheckoutRequest>>,
    workers: Vec<tokio::task::JoinHandle<()>>,
    outcomes: Arc<RwLock<HashMap<RequestId, CheckoutOutcome>>>,
    push: PushChannels,
}

impl Sequencer {
    /// Starts the lane workers over the given handler.
    pub fn start<H: RequestHandler>(
        handler: Arc<H>,
        push: PushChannels,
        config: SequencerConfig,
    ) -> Self {
        let outcomes: Arc<RwLock<HashMap<RequestId, CheckoutOutcome>>> = Arc::default();
        let mut senders = Vec::with_capacity(config.lanes);
        let mut workers = Vec::with_capacity(config.lanes);

        for lane in 0..config.lanes {
            let (tx, mut rx) = mpsc::channel::<CheckoutRequest>(config.lane_capacity);
            senders.push(tx);

            let handler = Arc::clone(&handler);
            let outcomes = Arc::clone(&outcomes);
            let push = push.clone();
            workers.push(tokio::spawn(async move {
                while let Some(request) = rx.recv().await {
                    let request_id = request.request_id;

                    // Redelivered request: acknowledge with the recorded
                    // outcome, no second effect.
                    let known = outcomes.read().await.get(&request_id).cloned();
                    if let Some(outcome) = known {
                        metrics::counter!("sequencer_redeliveries_total").increment(1);
                        push.publish(outcome).await;
                        continue;
                    }

                    tracing::debug!(%request_id, lane, "processing checkout request");
                    let outcome = handler.handle(request).await;

                    // Record the terminal outcome before acknowledging; a
                    // crash before this point leads to reprocessing, after
                    // it to a no-op redelivery.
                    outcomes.write().await.insert(request_id, outcome.clone());
                    metrics::counter!("sequencer_requests_processed_total").increment(1);
                    push.publish(outcome).await;
                }
            }));
        }

        Self {
            senders,
            workers,
            outcomes,
            push,
        }
    }

    /// Submits a request to its product's lane, waiting for lane capacity.
    #[tracing::instrument(skip(self, request), fields(request_id = %request.request_id))]
    pub async fn submit(&self, request: CheckoutRequest) -> Result<()> {
        let lane = partition_for(request.product_id.as_str(), self.senders.len());
        self.senders[lane]
            .send(request)
            .await
            .map_err(|_| SequencerError::Closed)
    }

    /// Returns the recorded terminal outcome for a request, if any.
    pub async fn outcome(&self, request_id: RequestId) -> Option<CheckoutOutcome> {
        self.outcomes.read().await.get(&request_id).cloned()
    }

    /// Returns the push-channel registry outcomes are published to.
    pub fn push_channels(&self) -> &PushChannels {
        &self.push
    }

    /// Closes the lanes and waits for in-flight requests to finish.
    pub async fn shutdown(self) {
        drop(self.senders);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}
