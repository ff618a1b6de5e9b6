//! Payment gateway seam and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, OrderId, UserId};

use crate::error::{CheckoutError, Result};

/// Result of a successful charge.
#[derive(Debug, Clone)]
pub struct PaymentResult {
    /// The gateway's payment reference.
    pub payment_id: String,
}

/// Trait for payment gateway operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges the user for an order.
    async fn charge(
        &self,
        order_id: OrderId,
        user_id: UserId,
        amount: Money,
    ) -> Result<PaymentResult>;

    /// Refunds a prior charge.
    async fn refund(&self, payment_id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    payments: HashMap<String, (OrderId, Money)>,
    next_id: u32,
    fail_on_charge: bool,
}

/// In-memory payment gateway for testing and the default wiring.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to decline charges.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state.write().unwrap().fail_on_charge = fail;
    }

    /// Returns the number of captured (non-refunded) payments.
    pub fn payment_count(&self) -> usize {
        self.state.read().unwrap().payments.len()
    }

    /// Returns true if a payment exists with the given ID.
    pub fn has_payment(&self, payment_id: &str) -> bool {
        self.state.read().unwrap().payments.contains_key(payment_id)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn charge(
        &self,
        order_id: OrderId,
        _user_id: UserId,
        amount: Money,
    ) -> Result<PaymentResult> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_charge {
            return Err(CheckoutError::Payment("card declined".to_string()));
        }

        state.next_id += 1;
        let payment_id = format!("PAY-{:04}", state.next_id);
        state.payments.insert(payment_id.clone(), (order_id, amount));

        Ok(PaymentResult { payment_id })
    }

    async fn refund(&self, payment_id: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.payments.remove(payment_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn charge_and_refund() {
        let gateway = InMemoryPaymentGateway::new();

        let result = gateway
            .charge(OrderId::new(), UserId::new(), Money::from_cents(1500))
            .await
            .unwrap();
        assert!(result.payment_id.starts_with("PAY-"));
        assert_eq!(gateway.payment_count(), 1);

        gateway.refund(&result.payment_id).await.unwrap();
        assert_eq!(gateway.payment_count(), 0);
    }

    #[tokio::test]
    async fn declined_charge_captures_nothing() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_fail_on_charge(true);

        let result = gateway
            .charge(OrderId::new(), UserId::new(), Money::from_cents(100))
            .await;
        assert!(matches!(result, Err(CheckoutError::Payment(_))));
        assert_eq!(gateway.payment_count(), 0);
    }

    #[tokio::test]
    async fn sequential_payment_ids() {
        let gateway = InMemoryPaymentGateway::new();
        let r1 = gateway
            .charge(OrderId::new(), UserId::new(), Money::from_cents(1))
            .await
            .unwrap();
        let r2 = gateway
            .charge(OrderId::new(), UserId::new(), Money::from_cents(1))
            .await
            .unwrap();
        assert_eq!(r1.payment_id, "PAY-0001");
        assert_eq!(r2.payment_id, "PAY-0002");
    }
}
