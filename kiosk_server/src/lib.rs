//! The HTTP surface of the kiosk storefront.
//!
//! Thin actix-web handlers over the engine's services, plus the process-level wiring: database
//! pool, event bus, the asynchronous webhook worker and the background job scheduler. All
//! business rules live in `kiosk_engine`; this crate only translates HTTP to service calls and
//! engine errors to status codes.
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod routes;
pub mod server;
pub mod webhook_worker;
