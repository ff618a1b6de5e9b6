use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use common::{Money, UserId};
use coupon::{
    AdmissionConfig, AdmissionQueue, Coupon, CouponStore, DiscountRule, InMemoryCouponStore,
    InMemoryQueueStore,
};
use criterion::{Criterion, criterion_group, criterion_main};
use keyed_lock::LockRegistry;

fn open_coupon(total_quantity: u32) -> Coupon {
    let now = Utc::now();
    Coupon::new(
        "Bench",
        DiscountRule::Percentage(10),
        Money::zero(),
        total_quantity,
        now - TimeDelta::hours(1),
        now + TimeDelta::hours(1),
    )
}

fn bench_enqueue(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let coupons = Arc::new(InMemoryCouponStore::new());
    let coupon = open_coupon(u32::MAX);
    let coupon_id = coupon.id;
    rt.block_on(async { coupons.insert(coupon).await.unwrap() });

    let queue = AdmissionQueue::new(
        coupons,
        Arc::new(InMemoryQueueStore::new()),
        Arc::new(LockRegistry::new()),
        AdmissionConfig {
            lock_wait: Duration::from_secs(5),
            ticket_ttl: Duration::from_secs(3600),
        },
    );

    c.bench_function("admission/enqueue", |b| {
        b.iter(|| {
            rt.block_on(async {
                queue.enqueue(UserId::new(), coupon_id).await.unwrap();
            });
        });
    });
}

fn bench_enqueue_reject_at_capacity(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let coupons = Arc::new(InMemoryCouponStore::new());
    let coupon = open_coupon(1);
    let coupon_id = coupon.id;
    rt.block_on(async { coupons.insert(coupon).await.unwrap() });

    let queue = AdmissionQueue::new(
        coupons,
        Arc::new(InMemoryQueueStore::new()),
        Arc::new(LockRegistry::new()),
        AdmissionConfig {
            lock_wait: Duration::from_secs(5),
            ticket_ttl: Duration::from_secs(3600),
        },
    );

    // Fill the single slot; every benched call takes the rejection path.
    rt.block_on(async {
        queue.enqueue(UserId::new(), coupon_id).await.unwrap();
    });

    c.bench_function("admission/enqueue_queue_full", |b| {
        b.iter(|| {
            rt.block_on(async {
                let _ = queue.enqueue(UserId::new(), coupon_id).await;
            });
        });
    });
}

criterion_group!(benches, bench_enqueue, bench_enqueue_reject_at_capacity);
criterion_main!(benches);
