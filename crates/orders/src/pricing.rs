//! Pricing collaborator seam.
//!
//! Catalog contents and price computation are external concerns; the
//! checkout flow consumes them through this narrow contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CouponId, Money, ProductId, UserId};
use coupon::CouponRedemption;
use tokio::sync::RwLock;

use crate::error::{CheckoutError, Result};
use crate::order::OrderLine;

/// A priced cart: the lines plus the three monetary totals.
#[derive(Debug, Clone)]
pub struct PricedCart {
    /// Priced line items.
    pub lines: Vec<OrderLine>,
    /// Total before discount.
    pub gross: Money,
    /// Coupon discount.
    pub discount: Money,
    /// Amount to charge.
    pub net: Money,
}

/// Computes the price of a checkout request, coupon included.
#[async_trait]
pub trait PricingService: Send + Sync {
    /// Prices `quantity` units of a product for a user, applying the
    /// user's grant for `coupon_id` when given.
    async fn price(
        &self,
        user_id: UserId,
        product_id: &ProductId,
        quantity: u32,
        gift_wrap: bool,
        coupon_id: Option<CouponId>,
    ) -> Result<PricedCart>;
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    name: String,
    unit_price: Money,
}

/// Pricing backed by an in-memory product catalog and the coupon
/// redemption service for discounts.
pub struct CatalogPricing {
    products: RwLock<HashMap<ProductId, CatalogEntry>>,
    redemption: Arc<CouponRedemption>,
}

impl CatalogPricing {
    /// Creates an empty catalog.
    pub fn new(redemption: Arc<CouponRedemption>) -> Self {
        Self {
            products: RwLock::new(HashMap::new()),
            redemption,
        }
    }

    /// Registers or replaces a product.
    pub async fn register_product(
        &self,
        product_id: ProductId,
        name: impl Into<String>,
        unit_price: Money,
    ) {
        self.products.write().await.insert(
            product_id,
            CatalogEntry {
                name: name.into(),
                unit_price,
            },
        );
    }
}

#[async_trait]
impl PricingService for CatalogPricing {
    async fn price(
        &self,
        user_id: UserId,
        product_id: &ProductId,
        quantity: u32,
        gift_wrap: bool,
        coupon_id: Option<CouponId>,
    ) -> Result<PricedCart> {
        let entry = {
            let products = self.products.read().await;
            products
                .get(product_id)
                .cloned()
                .ok_or_else(|| CheckoutError::UnknownProduct(product_id.clone()))?
        };

        let mut line = OrderLine::new(
            product_id.clone(),
            entry.name,
            quantity,
            entry.unit_price,
        );
        line.gift_wrap = gift_wrap;

        let gross = line.total();
        let discount = match coupon_id {
            Some(coupon_id) => self.redemption.quote(user_id, coupon_id, gross).await?,
            None => Money::zero(),
        };
        let net = gross.saturating_sub(discount);

        Ok(PricedCart {
            lines: vec![line],
            gross,
            discount,
            net,
        })
    }
}
