use thiserror::Error;

/// Errors that can occur during product and payment operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    /// A payment input references a product that does not exist.
    #[error("product not found: {id}")]
    ProductNotFound { id: i64 },

    /// The product is still referenced by at least one payment.
    #[error("product {id} still has {payments} payment(s)")]
    ProductInUse { id: i64, payments: i64 },

    /// The request body failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A thread panicked while holding the connection.
    #[error("database connection poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StoreError>;
