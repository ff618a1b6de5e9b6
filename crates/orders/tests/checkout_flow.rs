//! End-to-end checkout flows across the lock registry, stock ledger,
//! coupon pipeline, sequencer, and outbox.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use common::{Money, ProductId, UserId};
use coupon::{
    AdmissionConfig, AdmissionQueue, Coupon, CouponRedemption, CouponStore, DiscountRule,
    InMemoryCouponStore, InMemoryQueueStore, InMemoryUserCouponStore, IssuanceConfig,
    IssuanceWorker, UserCouponState, UserCouponStore,
};
use inventory::{ReservationState, StockLedger};
use keyed_lock::LockRegistry;
use orders::{
    CatalogPricing, CheckoutConfig, CheckoutCoordinator, CheckoutError, CheckoutService,
    InMemoryOrderStore, InMemoryPaymentGateway, OrderState, ReservationSweeper,
};
use outbox::{InMemoryOutboxStore, OutboxStore};
use sequencer::{CheckoutRequest, OutcomeKind, PushChannels, Sequencer, SequencerConfig};

const LOCK_WAIT: Duration = Duration::from_secs(5);

struct Fixture {
    ledger: Arc<StockLedger>,
    orders: Arc<InMemoryOrderStore>,
    outbox: Arc<InMemoryOutboxStore>,
    pricing: Arc<CatalogPricing>,
    payments: InMemoryPaymentGateway,
    checkout: Arc<CheckoutService>,
    admission: AdmissionQueue,
    issuance: IssuanceWorker,
    grants: Arc<InMemoryUserCouponStore>,
    coupons: Arc<InMemoryCouponStore>,
}

async fn fixture(reservation_ttl_minutes: i64) -> Fixture {
    let locks = Arc::new(LockRegistry::new());
    let ledger = Arc::new(StockLedger::new(locks.clone(), LOCK_WAIT));
    let orders = Arc::new(InMemoryOrderStore::new());
    let outbox = Arc::new(InMemoryOutboxStore::new());
    let coupons = Arc::new(InMemoryCouponStore::new());
    let grants = Arc::new(InMemoryUserCouponStore::new());
    let queue_store = Arc::new(InMemoryQueueStore::new());
    let payments = InMemoryPaymentGateway::new();

    let redemption = Arc::new(CouponRedemption::new(
        coupons.clone(),
        grants.clone(),
        locks.clone(),
        LOCK_WAIT,
    ));
    let pricing = Arc::new(CatalogPricing::new(redemption.clone()));

    let checkout = Arc::new(CheckoutService::new(
        orders.clone(),
        ledger.clone(),
        pricing.clone(),
        Arc::new(payments.clone()),
        redemption,
        outbox.clone(),
        locks.clone(),
        CheckoutConfig {
            lock_wait: LOCK_WAIT,
            reservation_ttl_minutes,
        },
    ));

    let admission = AdmissionQueue::new(
        coupons.clone(),
        queue_store.clone(),
        locks.clone(),
        AdmissionConfig::default(),
    );
    let issuance = IssuanceWorker::new(
        coupons.clone(),
        queue_store,
        grants.clone(),
        outbox.clone(),
        locks,
        IssuanceConfig::default(),
    );

    Fixture {
        ledger,
        orders,
        outbox,
        pricing,
        payments,
        checkout,
        admission,
        issuance,
        grants,
        coupons,
    }
}

async fn seed_product(f: &Fixture, sku: &str, price_cents: i64, stock: u32) -> ProductId {
    let product = ProductId::new(sku);
    f.pricing
        .register_product(product.clone(), format!("{sku} item"), Money::from_cents(price_cents))
        .await;
    f.ledger.set_on_hand(product.clone(), stock).await.unwrap();
    product
}

async fn seed_coupon(f: &Fixture, total: u32, discount: DiscountRule, min_cents: i64) -> Coupon {
    let now = Utc::now();
    let coupon = Coupon::new(
        "Sale",
        discount,
        Money::from_cents(min_cents),
        total,
        now - TimeDelta::hours(1),
        now + TimeDelta::hours(1),
    );
    f.coupons.insert(coupon.clone()).await.unwrap();
    coupon
}

fn event_types(events: &[outbox::OutboxEvent]) -> Vec<&str> {
    events.iter().map(|e| e.event_type.as_str()).collect()
}

#[tokio::test]
async fn checkout_then_payment_commits_stock() {
    let f = fixture(15).await;
    let product = seed_product(&f, "SKU-1", 1000, 10).await;
    let user = UserId::new();

    let request = CheckoutRequest::new(user, product.clone(), 2);
    let order = f.checkout.initiate_checkout(&request).await.unwrap();

    assert_eq!(order.state, OrderState::PendingPayment);
    assert_eq!(order.net.cents(), 2000);
    assert_eq!(order.reservation_ids.len(), 1);
    // Two units held, none committed yet.
    assert_eq!(f.ledger.available(&product).await.unwrap(), 8);

    let paid = f.checkout.process_payment(order.id).await.unwrap();
    assert_eq!(paid.state, OrderState::Paid);
    assert!(paid.payment_id.is_some());
    assert_eq!(f.payments.payment_count(), 1);

    // The hold became a committed decrement.
    let reservation = f
        .ledger
        .get_reservation(order.reservation_ids[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reservation.state, ReservationState::Confirmed);
    assert_eq!(f.ledger.available(&product).await.unwrap(), 8);

    let events = f.outbox.all().await;
    assert_eq!(event_types(&events), vec!["order.created", "payment.completed"]);
}

#[tokio::test]
async fn insufficient_stock_rejects_and_leaves_nothing_behind() {
    let f = fixture(15).await;
    let product = seed_product(&f, "SKU-1", 1000, 1).await;

    let request = CheckoutRequest::new(UserId::new(), product.clone(), 2);
    let result = f.checkout.initiate_checkout(&request).await;
    assert!(matches!(result, Err(CheckoutError::Inventory(_))));

    assert_eq!(f.ledger.available(&product).await.unwrap(), 1);
    assert_eq!(f.orders.order_count().await, 0);
    assert!(f.outbox.all().await.is_empty());
}

#[tokio::test]
async fn declined_payment_keeps_the_order_pending() {
    let f = fixture(15).await;
    let product = seed_product(&f, "SKU-1", 1000, 5).await;

    let request = CheckoutRequest::new(UserId::new(), product.clone(), 1);
    let order = f.checkout.initiate_checkout(&request).await.unwrap();

    f.payments.set_fail_on_charge(true);
    let result = f.checkout.process_payment(order.id).await;
    assert!(matches!(result, Err(CheckoutError::Payment(_))));

    let stored = f.checkout.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.state, OrderState::PendingPayment);
    // The hold is still active; retrying payment stays possible.
    assert_eq!(f.ledger.available(&product).await.unwrap(), 4);

    // A retry after the gateway recovers succeeds.
    f.payments.set_fail_on_charge(false);
    let paid = f.checkout.process_payment(order.id).await.unwrap();
    assert_eq!(paid.state, OrderState::Paid);
}

#[tokio::test]
async fn cancel_pending_order_releases_the_hold() {
    let f = fixture(15).await;
    let product = seed_product(&f, "SKU-1", 1000, 5).await;

    let request = CheckoutRequest::new(UserId::new(), product.clone(), 3);
    let order = f.checkout.initiate_checkout(&request).await.unwrap();
    assert_eq!(f.ledger.available(&product).await.unwrap(), 2);

    let cancelled = f.checkout.cancel_order(order.id, "changed my mind").await.unwrap();
    assert_eq!(cancelled.state, OrderState::Cancelled);
    assert_eq!(f.ledger.available(&product).await.unwrap(), 5);

    let events = f.outbox.all().await;
    assert_eq!(event_types(&events), vec!["order.created", "order.cancelled"]);
}

#[tokio::test]
async fn cancel_paid_order_refunds() {
    let f = fixture(15).await;
    let product = seed_product(&f, "SKU-1", 1000, 5).await;

    let request = CheckoutRequest::new(UserId::new(), product, 1);
    let order = f.checkout.initiate_checkout(&request).await.unwrap();
    f.checkout.process_payment(order.id).await.unwrap();
    assert_eq!(f.payments.payment_count(), 1);

    let cancelled = f.checkout.cancel_order(order.id, "return").await.unwrap();
    assert_eq!(cancelled.state, OrderState::Cancelled);
    assert_eq!(f.payments.payment_count(), 0);
}

#[tokio::test]
async fn expired_reservation_expires_the_order_once() {
    let f = fixture(0).await;
    let product = seed_product(&f, "SKU-1", 1000, 5).await;

    let request = CheckoutRequest::new(UserId::new(), product.clone(), 2);
    let order = f.checkout.initiate_checkout(&request).await.unwrap();
    assert_eq!(f.ledger.available(&product).await.unwrap(), 3);

    let sweeper = ReservationSweeper::new(f.ledger.clone(), f.checkout.clone());

    // TTL of zero minutes: the hold is already lapsed.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(sweeper.run_once().await.unwrap(), 1);

    let stored = f.checkout.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.state, OrderState::Expired);
    assert_eq!(f.ledger.available(&product).await.unwrap(), 5);

    // The next sweep finds nothing to expire.
    assert_eq!(sweeper.run_once().await.unwrap(), 0);

    let events = f.outbox.all().await;
    assert_eq!(event_types(&events), vec!["order.created", "order.expired"]);

    // An expired order cannot take payment anymore.
    let result = f.checkout.process_payment(order.id).await;
    assert!(matches!(
        result,
        Err(CheckoutError::InvalidStateTransition { .. })
    ));
}

#[tokio::test]
async fn coupon_flows_from_queue_to_paid_order() {
    let f = fixture(15).await;
    let product = seed_product(&f, "SKU-1", 10_000, 5).await;
    let coupon = seed_coupon(&f, 10, DiscountRule::Percentage(20), 5000).await;
    let user = UserId::new();

    // Win a grant through the admission queue.
    f.admission.enqueue(user, coupon.id).await.unwrap();
    f.issuance.run_once().await.unwrap();
    assert!(f.grants.has_non_expired(user, coupon.id).await.unwrap());

    // Checkout with the coupon applied.
    let request = CheckoutRequest::new(user, product, 1).with_coupon(coupon.id);
    let order = f.checkout.initiate_checkout(&request).await.unwrap();
    assert_eq!(order.gross.cents(), 10_000);
    assert_eq!(order.discount.cents(), 2000);
    assert_eq!(order.net.cents(), 8000);

    // Payment consumes the grant.
    f.checkout.process_payment(order.id).await.unwrap();
    let grant = f
        .grants
        .redeemable_for(user, coupon.id)
        .await
        .unwrap();
    assert!(grant.is_none(), "grant was marked used");

    // A second checkout with the spent coupon is rejected at pricing.
    let request = CheckoutRequest::new(user, ProductId::new("SKU-1"), 1).with_coupon(coupon.id);
    let result = f.checkout.initiate_checkout(&request).await;
    assert!(matches!(result, Err(CheckoutError::Coupon(_))));
}

#[tokio::test]
async fn coupon_below_minimum_rejects_the_checkout() {
    let f = fixture(15).await;
    let product = seed_product(&f, "SKU-1", 1000, 5).await;
    let coupon = seed_coupon(&f, 10, DiscountRule::FixedAmount(Money::from_cents(500)), 5000).await;
    let user = UserId::new();

    f.admission.enqueue(user, coupon.id).await.unwrap();
    f.issuance.run_once().await.unwrap();

    // 1 unit at $10 misses the $50 minimum.
    let request = CheckoutRequest::new(user, product.clone(), 1).with_coupon(coupon.id);
    let result = f.checkout.initiate_checkout(&request).await;
    assert!(matches!(result, Err(CheckoutError::Coupon(_))));

    // The grant survives the rejection.
    assert!(
        f.grants
            .redeemable_for(user, coupon.id)
            .await
            .unwrap()
            .is_some()
    );
    // No hold was left behind.
    assert_eq!(f.ledger.available(&product).await.unwrap(), 5);
}

#[tokio::test]
async fn declined_payment_does_not_consume_the_grant() {
    let f = fixture(15).await;
    let product = seed_product(&f, "SKU-1", 10_000, 5).await;
    let coupon = seed_coupon(&f, 10, DiscountRule::Percentage(10), 0).await;
    let user = UserId::new();

    f.admission.enqueue(user, coupon.id).await.unwrap();
    f.issuance.run_once().await.unwrap();

    let request = CheckoutRequest::new(user, product, 1).with_coupon(coupon.id);
    let order = f.checkout.initiate_checkout(&request).await.unwrap();

    f.payments.set_fail_on_charge(true);
    assert!(f.checkout.process_payment(order.id).await.is_err());

    let grant = f
        .grants
        .redeemable_for(user, coupon.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(grant.state, UserCouponState::Issued);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequencer_serializes_the_last_unit() {
    let f = fixture(15).await;
    let product = seed_product(&f, "SKU-LAST", 1000, 1).await;

    let push = PushChannels::new();
    let coordinator = Arc::new(CheckoutCoordinator::new(f.checkout.clone()));
    let sequencer = Sequencer::start(
        coordinator,
        push.clone(),
        SequencerConfig {
            lanes: 4,
            lane_capacity: 16,
        },
    );

    let alice = UserId::new();
    let bob = UserId::new();
    let mut alice_rx = push.subscribe(alice).await;
    let mut bob_rx = push.subscribe(bob).await;

    // Same partition (same product), submitted in this order.
    sequencer
        .submit(CheckoutRequest::new(alice, product.clone(), 1))
        .await
        .unwrap();
    sequencer
        .submit(CheckoutRequest::new(bob, product.clone(), 1))
        .await
        .unwrap();

    let alice_outcome = alice_rx.recv().await.unwrap();
    let bob_outcome = bob_rx.recv().await.unwrap();

    // Arrival order decided the winner: first request got the last unit.
    assert!(matches!(alice_outcome.kind, OutcomeKind::Completed { .. }));
    assert!(matches!(bob_outcome.kind, OutcomeKind::Rejected { .. }));
    assert!(alice_outcome.processed_at <= bob_outcome.processed_at);
    assert_eq!(f.ledger.available(&product).await.unwrap(), 0);

    sequencer.shutdown().await;
}
