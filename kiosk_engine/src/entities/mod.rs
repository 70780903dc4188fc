mod order;
mod product;
mod user;

pub use order::{NewOrder, Order, DEFAULT_PAYMENT_WINDOW_MINUTES};
pub use product::{Product, UNLIMITED_STOCK};
pub use user::User;
