//! `paystream-payments`: SQLite persistence for products and payments.
//!
//! Payments always reference an existing product; every payment read or
//! write returns a [`Payment`] snapshot with the product loaded, which is the
//! value handed to the live feed after a successful write.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::Store;
pub use types::{InputPayment, InputProduct, Payment, PaymentEvent, PaymentEventKind, Product};
