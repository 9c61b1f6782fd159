//! Storefront Inventory
//!
//! Stock consistency core for the jewelry and fragrance storefront.
//!
//! ## Features
//! - Per-variant stock ledger with a derived stock status
//! - Stock resolution by variant id, SKU or product id
//! - Batch availability validation
//! - Transactional stock reservation and release
//! - Deduplicated low/out-of-stock alerts
//! - Cart synchronization and checkout

pub mod api;
pub mod config;
pub mod domain;
pub mod inventory;
pub mod publisher;
pub mod services;
pub mod store;

use thiserror::Error;

use crate::domain::aggregates::{CartError, OrderError};
use crate::domain::value_objects::QuantityError;
use crate::store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient stock. Available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Cart item not found")]
    CartItemNotFound,

    #[error("Currency mismatch")]
    CurrencyMismatch,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Invalid order state: {0}")]
    InvalidOrderState(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for InventoryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Aborted(msg) => Self::TransactionAborted(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<QuantityError> for InventoryError {
    fn from(e: QuantityError) -> Self { Self::InvalidQuantity(e.requested()) }
}

impl From<CartError> for InventoryError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound => Self::CartItemNotFound,
            CartError::CurrencyMismatch => Self::CurrencyMismatch,
        }
    }
}

impl From<OrderError> for InventoryError {
    fn from(e: OrderError) -> Self { Self::InvalidOrderState(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, InventoryError>;
