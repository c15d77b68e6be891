use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// A product that payments can be made against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: f64,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 timestamp of the last update.
    pub updated_at: String,
}

/// A recorded payment.
///
/// Values of this type are detached snapshots: nothing in them points back
/// at the database row, so they can be handed to other tasks freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub product_id: i64,
    /// The linked product, loaded alongside the payment.
    pub product: Option<Product>,
    pub price_paid: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// Body of product create/update requests.
#[derive(Debug, Clone, Deserialize)]
pub struct InputProduct {
    pub name: String,
    pub price: f64,
}

impl InputProduct {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::InvalidInput("name is required".to_string()));
        }
        if !(self.price.is_finite() && self.price > 0.0) {
            return Err(StoreError::InvalidInput(
                "price must be a positive number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Body of payment create/update requests.
///
/// Field names follow the existing client contract (`productid`, `pricepaid`).
#[derive(Debug, Clone, Deserialize)]
pub struct InputPayment {
    #[serde(rename = "productid")]
    pub product_id: i64,
    #[serde(rename = "pricepaid")]
    pub price_paid: f64,
}

impl InputPayment {
    pub fn validate(&self) -> Result<()> {
        if self.product_id <= 0 {
            return Err(StoreError::InvalidInput("productid is required".to_string()));
        }
        if !(self.price_paid.is_finite() && self.price_paid > 0.0) {
            return Err(StoreError::InvalidInput(
                "pricepaid must be a positive number".to_string(),
            ));
        }
        Ok(())
    }
}

/// What happened to the payment carried by a [`PaymentEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentEventKind {
    Created,
    Updated,
}

impl PaymentEventKind {
    /// SSE event name sent to live-feed clients.
    pub fn event_name(&self) -> &'static str {
        match self {
            PaymentEventKind::Created => "payment.created",
            PaymentEventKind::Updated => "payment.updated",
        }
    }
}

/// Message published on the live payment feed after a successful write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentEvent {
    pub kind: PaymentEventKind,
    pub payment: Payment,
}

impl PaymentEvent {
    pub fn created(payment: Payment) -> Self {
        Self {
            kind: PaymentEventKind::Created,
            payment,
        }
    }

    pub fn updated(payment: Payment) -> Self {
        Self {
            kind: PaymentEventKind::Updated,
            payment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_payment_uses_legacy_field_names() {
        let input: InputPayment =
            serde_json::from_str(r#"{"productid":7,"pricepaid":19.99}"#).unwrap();
        assert_eq!(input.product_id, 7);
        assert_eq!(input.price_paid, 19.99);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn input_payment_rejects_zero_values() {
        let input = InputPayment {
            product_id: 0,
            price_paid: 10.0,
        };
        assert!(matches!(input.validate(), Err(StoreError::InvalidInput(_))));

        let input = InputPayment {
            product_id: 1,
            price_paid: 0.0,
        };
        assert!(matches!(input.validate(), Err(StoreError::InvalidInput(_))));
    }

    #[test]
    fn input_product_requires_name() {
        let input = InputProduct {
            name: "  ".to_string(),
            price: 3.5,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn event_names() {
        assert_eq!(PaymentEventKind::Created.event_name(), "payment.created");
        assert_eq!(PaymentEventKind::Updated.event_name(), "payment.updated");
    }
}
