//! Application services composed over the stock core.

mod cart;
mod checkout;
mod notifications;

pub use cart::{AddCartItem, CartService};
pub use checkout::{CheckoutService, PlacedOrder};
pub use notifications::NotificationService;

/// Currency for carts created on first use.
pub const DEFAULT_CURRENCY: &str = "INR";
