//! Kiosk Engine
//!
//! The core of the kiosk storefront: orders, inventory, payments and the background jobs that
//! reconcile them. It is front-end agnostic; the HTTP server, bots and admin tooling all sit on
//! top of this crate.
//!
//! The library is organised around a few seams:
//! 1. Storage ([`traits::ShopDatabase`] / [`traits::UnitOfWork`]). Every logical operation runs in
//!    exactly one unit of work. SQLite is the production backend ([`SqliteDatabase`]); an
//!    in-memory backend lives in [`test_utils`].
//! 2. Payment gateways ([`gateways`]). Each upstream provider implements
//!    [`gateways::PaymentGateway`]; the [`gateways::PaymentGatewayFactory`] constructs only the
//!    ones that are enabled and fully configured.
//! 3. Services ([`services`]). [`OrderService`] owns the order lifecycle and the expiration
//!    sweep, [`PaymentService`] everything that crosses a gateway boundary.
//! 4. Events ([`events`]). Aggregates queue domain events; services publish them on an
//!    [`events::EventBus`] after their unit of work commits.
//!
//! The [`scheduler::TaskScheduler`] drives the periodic jobs (expiration sweep, payment
//! reconciliation) with capped-backoff retries.
pub mod db_types;
pub mod entities;
pub mod events;
pub mod gateways;
pub mod scheduler;
pub mod services;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use services::{OrderService, PaymentService};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
