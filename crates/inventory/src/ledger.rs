//! The stock ledger.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, ReservationId, UserId};
use keyed_lock::LockRegistry;
use tokio::sync::RwLock;

use crate::{InventoryError, ReservationState, Result, StockReservation};

#[derive(Debug, Default, Clone)]
struct ProductStock {
    on_hand: u32,
    reserved: u32,
    /// Bumped on every mutation; second line of defense against lost
    /// updates from out-of-process races.
    version: u64,
}

impl ProductStock {
    fn available(&self) -> u32 {
        self.on_hand.saturating_sub(self.reserved)
    }
}

/// Result of one expiry sweep.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    /// Reservations transitioned to Expired, with their stock released.
    pub expired: Vec<StockReservation>,
    /// Orders linked to expired reservations, each listed once even if
    /// several of its reservations lapsed in the same sweep.
    pub orders_to_expire: Vec<OrderId>,
}

/// Tracks per-product on-hand and reserved quantities plus reservation
/// records. All counter mutations run under the product's keyed lock.
pub struct StockLedger {
    products: RwLock<HashMap<ProductId, ProductStock>>,
    reservations: RwLock<HashMap<ReservationId, StockReservation>>,
    locks: Arc<LockRegistry>,
    lock_wait: Duration,
}

impl StockLedger {
    /// Creates an empty ledger using the given lock registry.
    pub fn new(locks: Arc<LockRegistry>, lock_wait: Duration) -> Self {
        Self {
            products: RwLock::new(HashMap::new()),
            reservations: RwLock::new(HashMap::new()),
            locks,
            lock_wait,
        }
    }

    fn lock_key(product_id: &ProductId) -> String {
        format!("stock:{product_id}")
    }

    /// Registers a product or replaces its on-hand quantity.
    pub async fn set_on_hand(&self, product_id: ProductId, quantity: u32) -> Result<()> {
        let _guard = self
            .locks
            .acquire(&Self::lock_key(&product_id), self.lock_wait)
            .await?;
        let mut products = self.products.write().await;
        let stock = products.entry(product_id).or_default();
        stock.on_hand = quantity;
        stock.version += 1;
        Ok(())
    }

    /// Returns the currently available quantity (`on_hand - reserved`).
    pub async fn available(&self, product_id: &ProductId) -> Result<u32> {
        let products = self.products.read().await;
        let stock = products
            .get(product_id)
            .ok_or_else(|| InventoryError::UnknownProduct(product_id.clone()))?;
        Ok(stock.available())
    }

    /// Returns true when `quantity` units are currently available.
    pub async fn check_availability(&self, product_id: &ProductId, quantity: u32) -> Result<bool> {
        Ok(self.available(product_id).await? >= quantity)
    }

    /// Atomically moves `quantity` units from available to reserved.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        let _guard = self
            .locks
            .acquire(&Self::lock_key(product_id), self.lock_wait)
            .await?;
        let mut products = self.products.write().await;
        let stock = products
            .get_mut(product_id)
            .ok_or_else(|| InventoryError::UnknownProduct(product_id.clone()))?;

        if stock.available() < quantity {
            return Err(InventoryError::InsufficientStock {
                product_id: product_id.clone(),
                requested: quantity,
                available: stock.available(),
            });
        }

        stock.reserved += quantity;
        stock.version += 1;
        metrics::counter!("stock_reserved_total").increment(u64::from(quantity));
        Ok(())
    }

    /// Rolls a prior reservation of `quantity` units back to available.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        let _guard = self
            .locks
            .acquire(&Self::lock_key(product_id), self.lock_wait)
            .await?;
        let mut products = self.products.write().await;
        self.release_locked(&mut products, product_id, quantity)
    }

    /// Release with the product lock already held by the caller.
    fn release_locked(
        &self,
        products: &mut HashMap<ProductId, ProductStock>,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<()> {
        let stock = products
            .get_mut(product_id)
            .ok_or_else(|| InventoryError::UnknownProduct(product_id.clone()))?;

        if stock.reserved < quantity {
            return Err(InventoryError::CounterUnderflow {
                product_id: product_id.clone(),
            });
        }
        stock.reserved -= quantity;
        stock.version += 1;
        metrics::counter!("stock_released_total").increment(u64::from(quantity));
        Ok(())
    }

    /// Creates an active reservation record holding `quantity` units for
    /// `ttl_minutes`.
    #[tracing::instrument(skip(self))]
    pub async fn create_reservation(
        &self,
        product_id: ProductId,
        user_id: UserId,
        quantity: u32,
        ttl_minutes: i64,
    ) -> Result<StockReservation> {
        self.reserve(&product_id, quantity).await?;

        let reservation = StockReservation::new(product_id, user_id, quantity, ttl_minutes);
        self.reservations
            .write()
            .await
            .insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    /// Links a reservation to the order it was made for.
    pub async fn attach_order(
        &self,
        reservation_id: ReservationId,
        order_id: OrderId,
    ) -> Result<()> {
        let mut reservations = self.reservations.write().await;
        let reservation = reservations
            .get_mut(&reservation_id)
            .ok_or(InventoryError::ReservationNotFound(reservation_id))?;
        reservation.order_id = Some(order_id);
        Ok(())
    }

    /// Returns a reservation by ID.
    pub async fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<StockReservation>> {
        Ok(self.reservations.read().await.get(&reservation_id).cloned())
    }

    /// Converts a hold into a committed decrement of on-hand stock.
    ///
    /// Idempotent: confirming an already-confirmed reservation is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_reservation(&self, reservation_id: ReservationId) -> Result<()> {
        let product_id = {
            let reservations = self.reservations.read().await;
            let reservation = reservations
                .get(&reservation_id)
                .ok_or(InventoryError::ReservationNotFound(reservation_id))?;
            reservation.product_id.clone()
        };

        let _guard = self
            .locks
            .acquire(&Self::lock_key(&product_id), self.lock_wait)
            .await?;
        let mut reservations = self.reservations.write().await;
        let reservation = reservations
            .get_mut(&reservation_id)
            .ok_or(InventoryError::ReservationNotFound(reservation_id))?;

        match reservation.state {
            ReservationState::Confirmed => return Ok(()),
            ReservationState::Active => {}
            current => {
                return Err(InventoryError::InvalidStateTransition {
                    current,
                    action: "confirm",
                });
            }
        }

        let mut products = self.products.write().await;
        let stock = products
            .get_mut(&product_id)
            .ok_or_else(|| InventoryError::UnknownProduct(product_id.clone()))?;
        if stock.reserved < reservation.quantity || stock.on_hand < reservation.quantity {
            return Err(InventoryError::CounterUnderflow {
                product_id: product_id.clone(),
            });
        }
        stock.reserved -= reservation.quantity;
        stock.on_hand -= reservation.quantity;
        stock.version += 1;

        reservation.state = ReservationState::Confirmed;
        metrics::counter!("reservations_confirmed_total").increment(1);
        Ok(())
    }

    /// Releases a hold back to available stock (checkout cancellation).
    #[tracing::instrument(skip(self))]
    pub async fn cancel_reservation(&self, reservation_id: ReservationId) -> Result<()> {
        let product_id = {
            let reservations = self.reservations.read().await;
            let reservation = reservations
                .get(&reservation_id)
                .ok_or(InventoryError::ReservationNotFound(reservation_id))?;
            reservation.product_id.clone()
        };

        let _guard = self
            .locks
            .acquire(&Self::lock_key(&product_id), self.lock_wait)
            .await?;
        let mut reservations = self.reservations.write().await;
        let reservation = reservations
            .get_mut(&reservation_id)
            .ok_or(InventoryError::ReservationNotFound(reservation_id))?;

        if !reservation.state.can_cancel() {
            return Err(InventoryError::InvalidStateTransition {
                current: reservation.state,
                action: "cancel",
            });
        }

        let mut products = self.products.write().await;
        self.release_locked(&mut products, &product_id, reservation.quantity)?;
        reservation.state = ReservationState::Cancelled;
        metrics::counter!("reservations_cancelled_total").increment(1);
        Ok(())
    }

    /// Expires lapsed ACTIVE reservations, releasing their stock.
    ///
    /// Orders linked to expired reservations are reported deduplicated so
    /// a single order is only expired once even with multiple holds.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepOutcome> {
        let lapsed: Vec<ReservationId> = {
            let reservations = self.reservations.read().await;
            reservations
                .values()
                .filter(|r| r.is_expired(now))
                .map(|r| r.id)
                .collect()
        };

        let mut outcome = SweepOutcome::default();
        for reservation_id in lapsed {
            let product_id = {
                let reservations = self.reservations.read().await;
                match reservations.get(&reservation_id) {
                    Some(r) => r.product_id.clone(),
                    None => continue,
                }
            };

            let _guard = self
                .locks
                .acquire(&Self::lock_key(&product_id), self.lock_wait)
                .await?;
            let mut reservations = self.reservations.write().await;
            let Some(reservation) = reservations.get_mut(&reservation_id) else {
                continue;
            };
            // Re-check under the lock; the hold may have been confirmed
            // or cancelled while we were queueing.
            if !reservation.is_expired(now) {
                continue;
            }

            let mut products = self.products.write().await;
            self.release_locked(&mut products, &product_id, reservation.quantity)?;
            reservation.state = ReservationState::Expired;
            metrics::counter!("reservations_expired_total").increment(1);

            if let Some(order_id) = reservation.order_id
                && !outcome.orders_to_expire.contains(&order_id)
            {
                outcome.orders_to_expire.push(order_id);
            }
            outcome.expired.push(reservation.clone());
        }

        if !outcome.expired.is_empty() {
            tracing::info!(
                expired = outcome.expired.len(),
                orders = outcome.orders_to_expire.len(),
                "swept expired reservations"
            );
        }
        Ok(outcome)
    }
}
