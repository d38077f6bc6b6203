//! x402 order facilitator server.
//!
//! Sells products from an order-fulfillment platform behind an HTTP 402
//! challenge. A first `POST /orders` prices the order and answers with the
//! payment requirements; a second one carrying `X-PAYMENT` verifies the
//! signed authorization, collects it into the custodial wallet and pays the
//! platform.
//!
//! # Modules
//!
//! - [`handlers`] — Axum route handlers and router builder
//! - [`service`] — The purchase flow behind the handlers
//! - [`error`] — API error responses
//! - [`config`] — Server configuration with environment variable expansion

pub mod config;
pub mod error;
pub mod handlers;
pub mod service;

pub use handlers::{FacilitatorState, facilitator_router};
pub use service::{OrderService, ServiceSettings};
