//! The ports the engine is written against: the error taxonomy and the storage seam.
//!
//! Backends (SQLite in production, the in-memory store in tests) implement [`ShopDatabase`] and
//! [`UnitOfWork`]; everything above the ports is backend-agnostic.
mod database;
mod errors;

pub use database::{ShopDatabase, UnitOfWork};
pub use errors::ShopError;
