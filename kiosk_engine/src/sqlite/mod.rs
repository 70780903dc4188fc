//! The SQLite backend: the authoritative store for users, products and orders.
pub mod db;
mod sqlite_impl;

pub use sqlite_impl::{SqliteDatabase, SqliteUnitOfWork};
