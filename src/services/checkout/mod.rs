//! The checkout and entitlement activation subsystem.
//!
//! A purchase runs through six pieces: the [`order_builder`] resolves a
//! selection into a priced draft order, the [`discount`] validator adjusts
//! it, the [`session_store`] persists it across the gateway redirect, the
//! [`gateway`] adapter talks to the payment processor, the [`entitlement`]
//! service grants the purchased benefit, and [`flow`] orchestrates the
//! whole state machine.

pub mod discount;
pub mod entitlement;
pub mod flow;
pub mod gateway;
pub mod order_builder;
pub mod session_store;

pub use discount::DiscountValidator;
pub use entitlement::EntitlementService;
pub use flow::{CallbackOutcome, CheckoutFlow, SubmitOutcome};
pub use gateway::{HttpPaymentGateway, PaymentGateway, PaymentRequest};
pub use order_builder::OrderBuilder;
pub use session_store::{CheckoutSessionStore, InMemorySessionStore, SqlSessionStore};
