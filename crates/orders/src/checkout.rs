//! The checkout use cases.

use std::sync::Arc;
use std::time::Duration;

use common::OrderId;
use coupon::CouponRedemption;
use inventory::StockLedger;
use keyed_lock::LockRegistry;
use outbox::{OutboxEvent, OutboxStore};
use sequencer::CheckoutRequest;

use crate::error::{CheckoutError, Result};
use crate::events::{
    ORDER_CANCELLED, ORDER_CREATED, ORDER_EXPIRED, OrderCancelledPayload, OrderCreatedPayload,
    OrderExpiredPayload, PAYMENT_COMPLETED, PaymentCompletedPayload,
};
use crate::order::Order;
use crate::payment::PaymentGateway;
use crate::pricing::PricingService;
use crate::store::OrderStore;

/// Checkout tuning knobs.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Bounded wait for per-order locks.
    pub lock_wait: Duration,
    /// How long a stock hold backs a pending order.
    pub reservation_ttl_minutes: i64,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_secs(3),
            reservation_ttl_minutes: 15,
        }
    }
}

/// Orchestrates checkout: reserve stock, price, create the order, take
/// payment, cancel, expire. Every state change appends its outbox event
/// inside the same locked mutation scope.
pub struct CheckoutService {
    orders: Arc<dyn OrderStore>,
    ledger: Arc<StockLedger>,
    pricing: Arc<dyn PricingService>,
    payments: Arc<dyn PaymentGateway>,
    redemption: Arc<CouponRedemption>,
    outbox: Arc<dyn OutboxStore>,
    locks: Arc<LockRegistry>,
    config: CheckoutConfig,
}

impl CheckoutService {
    /// Creates the service over its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        ledger: Arc<StockLedger>,
        pricing: Arc<dyn PricingService>,
        payments: Arc<dyn PaymentGateway>,
        redemption: Arc<CouponRedemption>,
        outbox: Arc<dyn OutboxStore>,
        locks: Arc<LockRegistry>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            orders,
            ledger,
            pricing,
            payments,
            redemption,
            outbox,
            locks,
            config,
        }
    }

    /// Creates a pending-payment order backed by a stock hold.
    ///
    /// Called from a sequencer lane, so requests for the same product are
    /// already serialized; the ledger's own lock makes the reservation
    /// safe regardless. If anything after the reservation fails, the hold
    /// is released as compensation.
    #[tracing::instrument(skip(self, request), fields(request_id = %request.request_id))]
    pub async fn initiate_checkout(&self, request: &CheckoutRequest) -> Result<Order> {
        let cart = self
            .pricing
            .price(
                request.user_id,
                &request.product_id,
                request.quantity,
                request.gift_wrap,
                request.coupon_id,
            )
            .await?;

        let reservation = self
            .ledger
            .create_reservation(
                request.product_id.clone(),
                request.user_id,
                request.quantity,
                self.config.reservation_ttl_minutes,
            )
            .await?;

        match self.persist_new_order(request, cart, reservation.id).await {
            Ok(order) => {
                metrics::counter!("checkouts_initiated_total").increment(1);
                Ok(order)
            }
            Err(e) => {
                // Compensating release so the hold does not dangle until
                // the sweep.
                if let Err(release_err) = self.ledger.cancel_reservation(reservation.id).await {
                    tracing::error!(
                        reservation_id = %reservation.id,
                        error = %release_err,
                        "failed to release reservation after checkout error"
                    );
                }
                Err(e)
            }
        }
    }

    async fn persist_new_order(
        &self,
        request: &CheckoutRequest,
        cart: crate::pricing::PricedCart,
        reservation_id: common::ReservationId,
    ) -> Result<Order> {
        let mut order = Order::new(
            request.user_id,
            cart.lines,
            cart.gross,
            cart.discount,
            cart.net,
        );
        order.coupon_id = request.coupon_id;
        order.reservation_ids.push(reservation_id);

        self.ledger.attach_order(reservation_id, order.id).await?;

        let _guard = self
            .locks
            .acquire(&format!("order:{}", order.id), self.config.lock_wait)
            .await?;
        self.orders.insert(order.clone()).await?;
        self.outbox
            .append(OutboxEvent::new(
                ORDER_CREATED,
                "Order",
                order.id,
                &OrderCreatedPayload {
                    order_id: order.id,
                    user_id: order.user_id,
                    gross_cents: order.gross.cents(),
                    discount_cents: order.discount.cents(),
                    net_cents: order.net.cents(),
                    coupon_id: order.coupon_id,
                    reservation_ids: order.reservation_ids.clone(),
                },
            )?)
            .await?;

        Ok(order)
    }

    /// Takes payment for a pending order: charge, confirm the stock
    /// holds, redeem the coupon, transition to Paid.
    ///
    /// A gateway failure leaves the order PendingPayment. A coupon
    /// redemption failure after a successful charge refunds the charge as
    /// compensation.
    #[tracing::instrument(skip(self))]
    pub async fn process_payment(&self, order_id: OrderId) -> Result<Order> {
        let _guard = self
            .locks
            .acquire(&format!("order:{order_id}"), self.config.lock_wait)
            .await?;

        let mut order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;
        if !order.state.can_pay() {
            return Err(CheckoutError::InvalidStateTransition {
                current: order.state,
                action: "pay",
            });
        }

        let payment = self
            .payments
            .charge(order_id, order.user_id, order.net)
            .await?;

        if let Some(coupon_id) = order.coupon_id
            && let Err(e) = self.redemption.redeem(order.user_id, coupon_id).await
        {
            self.payments.refund(&payment.payment_id).await?;
            return Err(e.into());
        }

        for reservation_id in &order.reservation_ids {
            self.ledger.confirm_reservation(*reservation_id).await?;
        }

        order.mark_paid(payment.payment_id.clone())?;
        self.orders.update_versioned(order.clone()).await?;
        self.outbox
            .append(OutboxEvent::new(
                PAYMENT_COMPLETED,
                "Order",
                order.id,
                &PaymentCompletedPayload {
                    order_id: order.id,
                    user_id: order.user_id,
                    payment_id: payment.payment_id,
                    amount_cents: order.net.cents(),
                },
            )?)
            .await?;

        metrics::counter!("payments_completed_total").increment(1);
        Ok(order)
    }

    /// Cancels an order, releasing its holds and refunding if paid.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId, reason: &str) -> Result<Order> {
        let _guard = self
            .locks
            .acquire(&format!("order:{order_id}"), self.config.lock_wait)
            .await?;

        let mut order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;
        if !order.state.can_cancel() {
            return Err(CheckoutError::InvalidStateTransition {
                current: order.state,
                action: "cancel",
            });
        }

        let refunded = if let Some(payment_id) = &order.payment_id {
            self.payments.refund(payment_id).await?;
            true
        } else {
            false
        };

        for reservation_id in &order.reservation_ids {
            if let Some(reservation) = self.ledger.get_reservation(*reservation_id).await?
                && reservation.state.can_cancel()
            {
                self.ledger.cancel_reservation(*reservation_id).await?;
            }
        }

        order.cancel(reason)?;
        self.orders.update_versioned(order.clone()).await?;
        self.outbox
            .append(OutboxEvent::new(
                ORDER_CANCELLED,
                "Order",
                order.id,
                &OrderCancelledPayload {
                    order_id: order.id,
                    user_id: order.user_id,
                    reason: reason.to_string(),
                    refunded,
                },
            )?)
            .await?;

        metrics::counter!("orders_cancelled_total").increment(1);
        Ok(order)
    }

    /// Expires a pending order whose stock hold lapsed. Returns None when
    /// the order is already terminal, so a sweep that reports the same
    /// order twice only expires it once.
    #[tracing::instrument(skip(self))]
    pub async fn expire_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let _guard = self
            .locks
            .acquire(&format!("order:{order_id}"), self.config.lock_wait)
            .await?;

        let mut order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;
        if !order.state.can_expire() {
            return Ok(None);
        }

        order.expire()?;
        self.orders.update_versioned(order.clone()).await?;
        self.outbox
            .append(OutboxEvent::new(
                ORDER_EXPIRED,
                "Order",
                order.id,
                &OrderExpiredPayload {
                    order_id: order.id,
                    user_id: order.user_id,
                },
            )?)
            .await?;

        metrics::counter!("orders_expired_total").increment(1);
        tracing::info!(%order_id, "expired pending order");
        Ok(Some(order))
    }

    /// Returns an order by ID.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.orders.get(order_id).await
    }
}
