pub mod checkout;

pub use checkout::{
    BillingCycle, Entitlement, Order, OrderState, PurchasableItem, VerificationResult,
};
