//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use crate::domain::aggregates::StockStatus;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Inventory(InventoryEvent),
    Order(OrderEvent),
}

impl DomainEvent {
    /// Subject suffix used when the event leaves the process.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Inventory(InventoryEvent::StockReserved { .. }) => "inventory.reserved",
            Self::Inventory(InventoryEvent::StockReleased { .. }) => "inventory.released",
            Self::Inventory(InventoryEvent::StockAdjusted { .. }) => "inventory.adjusted",
            Self::Inventory(InventoryEvent::StatusReconciled { .. }) => "inventory.reconciled",
            Self::Order(OrderEvent::Placed { .. }) => "order.placed",
            Self::Order(OrderEvent::Cancelled { .. }) => "order.cancelled",
            Self::Order(OrderEvent::Refunded { .. }) => "order.refunded",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InventoryEvent {
    StockReserved { product_id: String, variant_id: String, quantity: u32, stock: u32, stock_status: StockStatus },
    StockReleased { product_id: String, variant_id: String, quantity: u32, stock: u32 },
    StockAdjusted { product_id: String, variant_id: String, previous: u32, stock: u32, stock_status: StockStatus },
    StatusReconciled { updated_count: u64 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: String, user_id: String, total: Decimal },
    Cancelled { order_id: String },
    Refunded { order_id: String },
}
