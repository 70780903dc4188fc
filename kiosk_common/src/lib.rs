//! Shared value types for the kiosk storefront.
//!
//! This crate holds the types that cross every boundary in the system: [`Money`] and [`Currency`]
//! with checked arithmetic, and [`Secret`] for keeping gateway credentials out of logs.
pub mod helpers;
mod money;
mod secret;

pub use money::{Currency, Money, MoneyError};
pub use secret::Secret;
