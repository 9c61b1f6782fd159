//! Order Aggregate
//!
//! Only the slice of the order lifecycle that debits or credits stock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Money, Sku};
use crate::domain::events::{DomainEvent, OrderEvent};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: String,
    order_number: String,
    user_id: String,
    status: OrderStatus,
    items: Vec<LineItem>,
    total: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem { pub product_id: String, pub variant_id: String, pub sku: Sku, pub name: String, pub quantity: u32, pub unit_price: Money, pub total: Money }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Confirmed, Cancelled, Refunded }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Confirmed => "confirmed", Self::Cancelled => "cancelled", Self::Refunded => "refunded" }
    }
}

impl Order {
    pub fn create(user_id: impl Into<String>, currency: &str) -> Self {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let order_number = format!("ORD-{}", now.format("%Y%m%d%H%M%S%3f"));
        Self {
            id, order_number, user_id: user_id.into(), status: OrderStatus::Pending,
            items: vec![], total: Money::zero(currency), created_at: now, updated_at: now, events: vec![],
        }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn user_id(&self) -> &str { &self.user_id }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn total(&self) -> &Money { &self.total }
    pub fn items(&self) -> &[LineItem] { &self.items }

    pub fn add_item(&mut self, item: LineItem) { self.items.push(item); self.recalculate(); }

    pub fn confirm(&mut self) -> Result<(), OrderError> {
        if self.items.is_empty() { return Err(OrderError::NoItems); }
        if self.status != OrderStatus::Pending { return Err(OrderError::InvalidTransition(self.status)); }
        self.status = OrderStatus::Confirmed;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: self.id.clone(), user_id: self.user_id.clone(), total: self.total.amount() }));
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !matches!(self.status, OrderStatus::Pending | OrderStatus::Confirmed) { return Err(OrderError::InvalidTransition(self.status)); }
        self.status = OrderStatus::Cancelled;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id.clone() }));
        Ok(())
    }

    pub fn refund(&mut self) -> Result<(), OrderError> {
        if self.status != OrderStatus::Confirmed { return Err(OrderError::InvalidTransition(self.status)); }
        self.status = OrderStatus::Refunded;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Refunded { order_id: self.id.clone() }));
        Ok(())
    }

    fn recalculate(&mut self) {
        self.total = self.items.iter().fold(Money::zero(self.total.currency()), |acc, i| acc.add(&i.total).unwrap_or(acc));
        self.touch();
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { NoItems, InvalidTransition(OrderStatus) }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "No items"),
            Self::InvalidTransition(from) => write!(f, "Order cannot change state from {from:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn line() -> LineItem {
        LineItem {
            product_id: "P1".into(), variant_id: "V1".into(), sku: Sku::new("W001").unwrap(), name: "Musk".into(),
            quantity: 2, unit_price: Money::inr(Decimal::new(10, 0)), total: Money::inr(Decimal::new(20, 0)),
        }
    }

    #[test]
    fn test_order_workflow() {
        let mut order = Order::create("U1", "INR");
        assert_eq!(order.confirm(), Err(OrderError::NoItems));
        order.add_item(line());
        order.confirm().unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(order.total().amount(), Decimal::new(20, 0));
        order.cancel().unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.cancel(), Err(OrderError::InvalidTransition(OrderStatus::Cancelled)));
        assert_eq!(order.take_events().len(), 2);
    }

    #[test]
    fn test_refund_requires_confirmed() {
        let mut order = Order::create("U1", "INR");
        order.add_item(line());
        assert!(order.refund().is_err());
        order.confirm().unwrap();
        order.refund().unwrap();
        assert_eq!(order.status(), OrderStatus::Refunded);
    }
}
