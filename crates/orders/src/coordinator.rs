//! Sequencer-facing checkout handler.

use std::sync::Arc;

use async_trait::async_trait;
use sequencer::{CheckoutOutcome, CheckoutRequest, RequestHandler};

use crate::checkout::CheckoutService;

/// Adapts [`CheckoutService::initiate_checkout`] to the sequencer's
/// handler seam: domain failures become rejected outcomes, never panics,
/// so one bad request cannot take down its lane.
pub struct CheckoutCoordinator {
    checkout: Arc<CheckoutService>,
}

impl CheckoutCoordinator {
    /// Creates a coordinator over the checkout service.
    pub fn new(checkout: Arc<CheckoutService>) -> Self {
        Self { checkout }
    }
}

#[async_trait]
impl RequestHandler for CheckoutCoordinator {
    async fn handle(&self, request: CheckoutRequest) -> CheckoutOutcome {
        match self.checkout.initiate_checkout(&request).await {
            Ok(order) => CheckoutOutcome::completed(&request, order.id),
            Err(e) => {
                tracing::info!(
                    request_id = %request.request_id,
                    error = %e,
                    "checkout rejected"
                );
                CheckoutOutcome::rejected(&request, e.to_string())
            }
        }
    }
}
