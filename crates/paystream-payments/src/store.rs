use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, instrument};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::{InputPayment, InputProduct, Payment, Product};

const PAYMENT_COLUMNS: &str = "p.id, p.product_id, p.price_paid, p.created_at, p.updated_at,
     pr.id, pr.name, pr.price, pr.created_at, pr.updated_at";

/// Thread-safe store for products and payments.
///
/// Wraps a single SQLite connection in a `Mutex`; one connection is enough
/// for a single-node deployment.
pub struct Store {
    db: Mutex<Connection>,
}

impl Store {
    /// Wrap an open connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }

    // --- products ------------------------------------------------------------

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub fn create_product(&self, input: &InputProduct) -> Result<Product> {
        input.validate()?;
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.conn()?;
        db.execute(
            "INSERT INTO products (name, price, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![input.name, input.price, now],
        )?;
        let id = db.last_insert_rowid();
        debug!(product_id = id, "product created");
        Ok(Product {
            id,
            name: input.name.clone(),
            price: input.price,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    #[instrument(skip(self))]
    pub fn list_products(&self) -> Result<Vec<Product>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT id, name, price, created_at, updated_at
             FROM products ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_product)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    #[instrument(skip(self))]
    pub fn get_product(&self, id: i64) -> Result<Product> {
        let db = self.conn()?;
        find_product(&db, id)?.ok_or(StoreError::NotFound {
            entity: "product",
            id,
        })
    }

    #[instrument(skip(self, input))]
    pub fn update_product(&self, id: i64, input: &InputProduct) -> Result<Product> {
        input.validate()?;
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.conn()?;
        let rows_changed = db.execute(
            "UPDATE products SET name = ?1, price = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![input.name, input.price, now, id],
        )?;
        if rows_changed == 0 {
            return Err(StoreError::NotFound {
                entity: "product",
                id,
            });
        }
        find_product(&db, id)?.ok_or(StoreError::NotFound {
            entity: "product",
            id,
        })
    }

    /// Delete a product. Refused while payments still reference it.
    #[instrument(skip(self))]
    pub fn delete_product(&self, id: i64) -> Result<()> {
        let db = self.conn()?;
        let payments: i64 = db.query_row(
            "SELECT COUNT(*) FROM payments WHERE product_id = ?1",
            [id],
            |row| row.get(0),
        )?;
        if payments > 0 {
            return Err(StoreError::ProductInUse { id, payments });
        }
        let rows_changed = db.execute("DELETE FROM products WHERE id = ?1", [id])?;
        if rows_changed == 0 {
            return Err(StoreError::NotFound {
                entity: "product",
                id,
            });
        }
        Ok(())
    }

    // --- payments ------------------------------------------------------------

    /// Record a payment against an existing product.
    #[instrument(skip(self, input), fields(product_id = input.product_id))]
    pub fn create_payment(&self, input: &InputPayment) -> Result<Payment> {
        input.validate()?;
        let db = self.conn()?;
        let product = find_product(&db, input.product_id)?.ok_or(StoreError::ProductNotFound {
            id: input.product_id,
        })?;

        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO payments (product_id, price_paid, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![input.product_id, input.price_paid, now],
        )?;
        let id = db.last_insert_rowid();
        debug!(payment_id = id, "payment created");
        Ok(Payment {
            id,
            product_id: product.id,
            product: Some(product),
            price_paid: input.price_paid,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    #[instrument(skip(self))]
    pub fn list_payments(&self) -> Result<Vec<Payment>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS}
             FROM payments p LEFT JOIN products pr ON pr.id = p.product_id
             ORDER BY p.id"
        ))?;
        let rows = stmt.query_map([], row_to_payment)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    #[instrument(skip(self))]
    pub fn get_payment(&self, id: i64) -> Result<Payment> {
        let db = self.conn()?;
        find_payment(&db, id)?.ok_or(StoreError::NotFound {
            entity: "payment",
            id,
        })
    }

    /// Point a payment at a (possibly different) product and amount.
    #[instrument(skip(self, input), fields(product_id = input.product_id))]
    pub fn update_payment(&self, id: i64, input: &InputPayment) -> Result<Payment> {
        input.validate()?;
        let db = self.conn()?;
        if find_payment(&db, id)?.is_none() {
            return Err(StoreError::NotFound {
                entity: "payment",
                id,
            });
        }
        if find_product(&db, input.product_id)?.is_none() {
            return Err(StoreError::ProductNotFound {
                id: input.product_id,
            });
        }

        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "UPDATE payments SET product_id = ?1, price_paid = ?2, updated_at = ?3
             WHERE id = ?4",
            rusqlite::params![input.product_id, input.price_paid, now, id],
        )?;
        debug!(payment_id = id, "payment updated");
        find_payment(&db, id)?.ok_or(StoreError::NotFound {
            entity: "payment",
            id,
        })
    }

    #[instrument(skip(self))]
    pub fn delete_payment(&self, id: i64) -> Result<()> {
        let db = self.conn()?;
        let rows_changed = db.execute("DELETE FROM payments WHERE id = ?1", [id])?;
        if rows_changed == 0 {
            return Err(StoreError::NotFound {
                entity: "payment",
                id,
            });
        }
        Ok(())
    }
}

fn find_product(db: &Connection, id: i64) -> Result<Option<Product>> {
    Ok(db
        .query_row(
            "SELECT id, name, price, created_at, updated_at FROM products WHERE id = ?1",
            [id],
            row_to_product,
        )
        .optional()?)
}

fn find_payment(db: &Connection, id: i64) -> Result<Option<Payment>> {
    Ok(db
        .query_row(
            &format!(
                "SELECT {PAYMENT_COLUMNS}
                 FROM payments p LEFT JOIN products pr ON pr.id = p.product_id
                 WHERE p.id = ?1"
            ),
            [id],
            row_to_payment,
        )
        .optional()?)
}

/// Map a SQLite row to a `Product`.
fn row_to_product(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        price: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// Map a joined payments/products row to a `Payment`.
fn row_to_payment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Payment> {
    let product = match row.get::<_, Option<i64>>(5)? {
        Some(id) => Some(Product {
            id,
            name: row.get(6)?,
            price: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        }),
        None => None,
    };
    Ok(Payment {
        id: row.get(0)?,
        product_id: row.get(1)?,
        product,
        price_paid: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn widget(store: &Store) -> Product {
        store
            .create_product(&InputProduct {
                name: "widget".to_string(),
                price: 19.99,
            })
            .unwrap()
    }

    #[test]
    fn product_crud() {
        let store = store();
        let p = widget(&store);
        assert_eq!(store.get_product(p.id).unwrap(), p);

        let updated = store
            .update_product(
                p.id,
                &InputProduct {
                    name: "gadget".to_string(),
                    price: 5.0,
                },
            )
            .unwrap();
        assert_eq!(updated.name, "gadget");
        assert_eq!(store.list_products().unwrap().len(), 1);

        store.delete_product(p.id).unwrap();
        assert!(matches!(
            store.get_product(p.id),
            Err(StoreError::NotFound { entity: "product", .. })
        ));
    }

    #[test]
    fn payment_requires_existing_product() {
        let store = store();
        let err = store
            .create_payment(&InputPayment {
                product_id: 42,
                price_paid: 1.0,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::ProductNotFound { id: 42 }));
    }

    #[test]
    fn payment_snapshot_includes_product() {
        let store = store();
        let product = widget(&store);
        let payment = store
            .create_payment(&InputPayment {
                product_id: product.id,
                price_paid: 19.99,
            })
            .unwrap();
        assert_eq!(payment.product.as_ref(), Some(&product));
        assert_eq!(store.get_payment(payment.id).unwrap(), payment);

        let all = store.list_payments().unwrap();
        assert_eq!(all, vec![payment]);
    }

    #[test]
    fn update_payment_switches_product() {
        let store = store();
        let a = widget(&store);
        let b = store
            .create_product(&InputProduct {
                name: "other".to_string(),
                price: 2.5,
            })
            .unwrap();
        let payment = store
            .create_payment(&InputPayment {
                product_id: a.id,
                price_paid: 19.99,
            })
            .unwrap();

        let updated = store
            .update_payment(
                payment.id,
                &InputPayment {
                    product_id: b.id,
                    price_paid: 2.5,
                },
            )
            .unwrap();
        assert_eq!(updated.product_id, b.id);
        assert_eq!(updated.product.map(|p| p.name), Some("other".to_string()));
        assert_eq!(updated.price_paid, 2.5);
        assert_eq!(updated.created_at, payment.created_at);

        let err = store
            .update_payment(
                payment.id,
                &InputPayment {
                    product_id: 999,
                    price_paid: 1.0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::ProductNotFound { id: 999 }));
    }

    #[test]
    fn product_with_payments_cannot_be_deleted() {
        let store = store();
        let product = widget(&store);
        let payment = store
            .create_payment(&InputPayment {
                product_id: product.id,
                price_paid: 1.0,
            })
            .unwrap();

        assert!(matches!(
            store.delete_product(product.id),
            Err(StoreError::ProductInUse { payments: 1, .. })
        ));
        store.delete_payment(payment.id).unwrap();
        store.delete_product(product.id).unwrap();
    }

    #[test]
    fn delete_missing_payment_is_not_found() {
        let store = store();
        assert!(matches!(
            store.delete_payment(1),
            Err(StoreError::NotFound { entity: "payment", id: 1 })
        ));
    }
}
