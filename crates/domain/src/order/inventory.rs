//! Concurrency-safe stock reservation.

use std::collections::BTreeMap;
use std::time::Instant;

use common::ProductId;
use store::{ProductRecord, Transaction};

use crate::DomainError;

use super::{CheckoutItem, Money, OrderError, OrderItem};

/// A product line whose stock has been taken inside the open transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedLine {
    /// The product as read under lock, before the decrement.
    pub product: ProductRecord,
    pub quantity: u32,
}

impl ReservedLine {
    /// Builds the order item, freezing the current catalog price.
    pub fn to_order_item(&self) -> OrderItem {
        OrderItem {
            product_id: self.product.id,
            product_name: self.product.name.clone(),
            image_url: self.product.image_url.clone(),
            quantity: self.quantity,
            unit_price: Money::from_cents(self.product.price_cents),
        }
    }
}

/// Reserves and returns product stock.
///
/// All product rows of one checkout are locked in a single batched call, so
/// overlapping checkouts queue on the same rows in the same order. A second
/// checkout on a locked product waits for the first to commit or roll back
/// and then sees its decrement.
pub struct InventoryLedger;

impl InventoryLedger {
    /// Takes stock for every line or for none.
    ///
    /// Fails with [`OrderError::ResourceNotFound`] if a product does not
    /// exist and with [`OrderError::InsufficientStock`] if a line asks for more
    /// than is available. Both are detected before any stock is touched.
    /// Decrements stay uncommitted until the caller commits `tx`.
    pub async fn reserve<T: Transaction>(
        tx: &mut T,
        lines: &[CheckoutItem],
    ) -> Result<Vec<ReservedLine>, DomainError> {
        let mut requested: BTreeMap<ProductId, u32> = BTreeMap::new();
        for line in lines {
            *requested.entry(line.product_id).or_default() += line.quantity.max(0) as u32;
        }
        let ids: Vec<ProductId> = requested.keys().copied().collect();

        let started = Instant::now();
        let rows = tx.lock_products(&ids).await?;
        metrics::histogram!("stock_lock_wait_seconds").record(started.elapsed().as_secs_f64());

        let products: BTreeMap<ProductId, ProductRecord> =
            rows.into_iter().map(|p| (p.id, p)).collect();

        if let Some(missing) = ids.iter().find(|id| !products.contains_key(id)) {
            return Err(OrderError::ResourceNotFound {
                resource: "product",
                id: missing.to_string(),
            }
            .into());
        }

        for (id, quantity) in &requested {
            let product = &products[id];
            if i64::from(*quantity) > i64::from(product.stock) {
                tracing::debug!(
                    product_id = %id,
                    available = product.stock,
                    requested = quantity,
                    "insufficient stock"
                );
                return Err(OrderError::InsufficientStock {
                    product_name: product.name.clone(),
                    available: product.stock,
                    requested: *quantity,
                }
                .into());
            }
        }

        for (id, quantity) in &requested {
            tx.decrement_stock(*id, *quantity as i32).await?;
        }

        Ok(lines
            .iter()
            .map(|line| ReservedLine {
                product: products[&line.product_id].clone(),
                quantity: line.quantity.max(0) as u32,
            })
            .collect())
    }

    /// Returns the quantities of `items` to stock.
    ///
    /// Products that no longer exist are skipped.
    pub async fn restock<T: Transaction>(
        tx: &mut T,
        items: &[OrderItem],
    ) -> Result<(), DomainError> {
        let ids: Vec<ProductId> = items.iter().map(|i| i.product_id).collect();
        let locked = tx.lock_products(&ids).await?;

        for item in items {
            if locked.iter().any(|p| p.id == item.product_id) {
                tx.restock(item.product_id, item.quantity as i32).await?;
            } else {
                tracing::warn!(product_id = %item.product_id, "cannot restock missing product");
            }
        }
        Ok(())
    }
}
