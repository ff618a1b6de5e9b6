//! HTTP API server and process wiring for the fulfillment backend.
//!
//! Exposes the admission queue, checkout sequencer, and order use cases
//! over REST, with structured logging (tracing) and Prometheus metrics,
//! and owns the four background loops: issuance worker, reservation
//! sweeper, outbox relay, and dead-letter monitor.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use coupon::{
    AdmissionConfig, AdmissionQueue, CouponRedemption, CouponStore, InMemoryCouponStore,
    InMemoryQueueStore, InMemoryUserCouponStore, IssuanceConfig, IssuanceWorker,
};
use inventory::StockLedger;
use keyed_lock::LockRegistry;
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{
    CatalogPricing, CheckoutConfig, CheckoutCoordinator, CheckoutService, InMemoryOrderStore,
    InMemoryPaymentGateway, ReservationSweeper,
};
use outbox::{
    CircuitBreaker, DeadLetterMonitor, HandlerRegistry, IdempotentDelivery,
    InMemoryIdempotencyStore, InMemoryOutboxStore, OutboxRelay, RecordingPublisher, RelayConfig,
    RetryPolicy,
};
use sequencer::{PushChannels, Sequencer, SequencerConfig};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub admission: Arc<AdmissionQueue>,
    pub coupons: Arc<dyn CouponStore>,
    pub checkout: Arc<CheckoutService>,
    pub sequencer: Arc<Sequencer>,
    pub push: PushChannels,
    pub pricing: Arc<CatalogPricing>,
    pub ledger: Arc<StockLedger>,
}

/// The background loops that keep the pipeline moving.
pub struct BackgroundWorkers {
    locks: Arc<LockRegistry>,
    issuance: Arc<IssuanceWorker>,
    sweeper: Arc<ReservationSweeper>,
    relay: Arc<OutboxRelay>,
    dlq: Arc<DeadLetterMonitor>,
    admission: Arc<AdmissionQueue>,
    redemption: Arc<CouponRedemption>,
}

impl BackgroundWorkers {
    /// Spawns every loop; abort the returned handles on shutdown.
    pub fn spawn_all(self, config: &Config) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = vec![
            self.locks
                .spawn_sweeper(config.lock_sweep_every, config.lock_sweep_every),
            self.issuance.spawn(config.issuance_poll),
            self.sweeper.spawn(config.reservation_sweep_every),
            self.relay.spawn(config.relay_poll),
            self.dlq.spawn(config.dlq_poll),
        ];

        // Ticket TTL collection and grant expiry share the sweep cadence.
        let admission = self.admission;
        let redemption = self.redemption;
        let every = config.reservation_sweep_every;
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = chrono::Utc::now();
                if let Err(e) = admission.expire_stale(now).await {
                    tracing::error!(error = %e, "ticket expiry pass failed");
                }
                if let Err(e) = redemption.expire_lapsed(now).await {
                    tracing::error!(error = %e, "grant expiry pass failed");
                }
            }
        }));

        handles
    }
}

/// Creates the default application state over in-memory stores, plus the
/// background workers ready to spawn.
pub fn create_default_state(config: &Config) -> (Arc<AppState>, BackgroundWorkers) {
    let locks = Arc::new(LockRegistry::new());
    let ledger = Arc::new(StockLedger::new(locks.clone(), config.lock_wait));
    let outbox_store = Arc::new(InMemoryOutboxStore::new());
    let coupons = Arc::new(InMemoryCouponStore::new());
    let grants = Arc::new(InMemoryUserCouponStore::new());
    let queue_store = Arc::new(InMemoryQueueStore::new());
    let order_store = Arc::new(InMemoryOrderStore::new());

    let redemption = Arc::new(CouponRedemption::new(
        coupons.clone(),
        grants.clone(),
        locks.clone(),
        config.lock_wait,
    ));
    let pricing = Arc::new(CatalogPricing::new(redemption.clone()));

    let checkout = Arc::new(CheckoutService::new(
        order_store,
        ledger.clone(),
        pricing.clone(),
        Arc::new(InMemoryPaymentGateway::new()),
        redemption.clone(),
        outbox_store.clone(),
        locks.clone(),
        CheckoutConfig {
            lock_wait: config.lock_wait,
            reservation_ttl_minutes: config.reservation_ttl_minutes,
        },
    ));

    let admission = Arc::new(AdmissionQueue::new(
        coupons.clone(),
        queue_store.clone(),
        locks.clone(),
        AdmissionConfig {
            lock_wait: config.lock_wait,
            ticket_ttl: config.ticket_ttl,
        },
    ));
    let issuance = Arc::new(IssuanceWorker::new(
        coupons.clone(),
        queue_store,
        grants,
        outbox_store.clone(),
        locks.clone(),
        IssuanceConfig {
            batch_size: config.issuance_batch_size,
            lock_wait: config.lock_wait,
        },
    ));

    let push = PushChannels::new();
    let sequencer = Arc::new(Sequencer::start(
        Arc::new(CheckoutCoordinator::new(checkout.clone())),
        push.clone(),
        SequencerConfig {
            lanes: config.sequencer_lanes,
            lane_capacity: config.sequencer_lane_capacity,
        },
    ));

    // Downstream delivery: payment completions forwarded idempotently to
    // the (stand-in) fulfillment feed.
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(IdempotentDelivery::new(
        "fulfillment-feed",
        orders::PAYMENT_COMPLETED,
        RecordingPublisher::new(),
        Arc::new(InMemoryIdempotencyStore::new()),
        Arc::new(CircuitBreaker::new(5, std::time::Duration::from_secs(30))),
        outbox::DEFAULT_RETENTION,
    )));

    let retry = RetryPolicy {
        max_attempts: config.relay_max_retries,
        base_delay: config.relay_base_delay,
        ..RetryPolicy::default()
    };
    let relay = Arc::new(OutboxRelay::new(
        outbox_store.clone(),
        Arc::new(registry),
        RelayConfig {
            batch_size: config.relay_batch_size,
            retry,
        },
    ));
    let dlq = Arc::new(DeadLetterMonitor::new(
        outbox_store,
        config.relay_max_retries,
        config.dlq_alert_threshold,
    ));
    let sweeper = Arc::new(ReservationSweeper::new(ledger.clone(), checkout.clone()));

    let state = Arc::new(AppState {
        admission: admission.clone(),
        coupons,
        checkout,
        sequencer,
        push,
        pricing,
        ledger,
    });
    let workers = BackgroundWorkers {
        locks,
        issuance,
        sweeper,
        relay,
        dlq,
        admission,
        redemption,
    };

    (state, workers)
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", post(routes::checkout::register_product))
        .route("/coupons", post(routes::coupons::create))
        .route("/coupons/{id}/issue", post(routes::coupons::issue))
        .route("/coupons/{id}/queue", get(routes::coupons::queue_depth))
        .route("/coupons/queue/{ticket_id}", get(routes::coupons::ticket_status))
        .route("/checkout", post(routes::checkout::submit))
        .route("/checkout/{request_id}", get(routes::checkout::outcome))
        .route("/orders/{id}", get(routes::checkout::get_order))
        .route("/orders/{id}/payment", post(routes::checkout::pay))
        .route("/orders/{id}/cancel", post(routes::checkout::cancel))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
