//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod notification;

pub use product::{Product, StockStatus, Variant};
pub use order::{Order, OrderError, OrderStatus, LineItem};
pub use cart::{Cart, CartError, CartItem};
pub use notification::{AlertMetadata, Notification, NotificationFilter, NotificationKind, Severity};
