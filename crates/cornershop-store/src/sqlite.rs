//! SQLite implementation of the Store trait (the relational store).
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! `tokio::task::spawn_blocking`. Every multi-statement write runs in a
//! transaction.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use rust_decimal::Decimal;

use cornershop_core::{
    validate_product, validate_sale, validate_sale_draft, Backend, Product, Sale, SaleDraft,
    SaleId, SaleItem,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{Store, UpsertOutcome};

/// How long SQLite waits on a locked database before reporting `BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

fn parse_decimal(value: &str, column: &str) -> Result<Decimal> {
    Decimal::from_str(value)
        .map_err(|e| StoreError::InvalidData(format!("{} {:?}: {}", column, value, e)))
}

fn parse_date(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StoreError::InvalidData(format!("sale date {}", millis)))
}

fn parse_sale_id(value: &str) -> Result<SaleId> {
    SaleId::parse(value).map_err(StoreError::from)
}

const PRODUCT_COLUMNS: &str = "name, category, price, stock_quantity";

fn product_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn build_product((name, category, price, stock): (String, String, String, i64)) -> Result<Product> {
    Ok(Product {
        name,
        category,
        price: parse_decimal(&price, "price")?,
        stock_quantity: stock,
    })
}

fn select_product(conn: &Connection, name: &str) -> Result<Option<Product>> {
    conn.query_row(
        &format!("SELECT {} FROM products WHERE name = ?1", PRODUCT_COLUMNS),
        params![name.trim()],
        product_from_row,
    )
    .optional()?
    .map(build_product)
    .transpose()
}

fn select_items(conn: &Connection, sale_id: &str) -> Result<Vec<SaleItem>> {
    let mut stmt = conn.prepare(
        "SELECT product_name, quantity, unit_price FROM sale_items
         WHERE sale_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map(params![sale_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(product_name, quantity, unit_price)| {
            Ok(SaleItem {
                product_name,
                quantity,
                unit_price: parse_decimal(&unit_price, "unit_price")?,
            })
        })
        .collect()
}

fn select_sale(conn: &Connection, id: &str) -> Result<Option<Sale>> {
    let header = conn
        .query_row(
            "SELECT id, date, total, is_cancelled FROM sales WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                ))
            },
        )
        .optional()?;

    match header {
        None => Ok(None),
        Some((id, date, total, is_cancelled)) => Ok(Some(Sale {
            items: select_items(conn, &id)?,
            id: parse_sale_id(&id)?,
            date: parse_date(date)?,
            total: parse_decimal(&total, "total")?,
            is_cancelled,
        })),
    }
}

/// Insert or overwrite a product. Returns whether it already existed.
fn write_product(tx: &Transaction<'_>, product: &Product) -> Result<bool> {
    let existed = tx
        .query_row(
            "SELECT 1 FROM products WHERE name = ?1",
            params![product.name.trim()],
            |_| Ok(()),
        )
        .optional()?
        .is_some();

    if existed {
        tx.execute(
            "UPDATE products SET name = ?1, category = ?2, price = ?3, stock_quantity = ?4
             WHERE name = ?1",
            params![
                product.name.trim(),
                product.category,
                product.price.to_string(),
                product.stock_quantity
            ],
        )?;
    } else {
        tx.execute(
            "INSERT INTO products (name, category, price, stock_quantity) VALUES (?1, ?2, ?3, ?4)",
            params![
                product.name.trim(),
                product.category,
                product.price.to_string(),
                product.stock_quantity
            ],
        )?;
    }
    Ok(existed)
}

/// Insert or overwrite a sale and replace its items. Returns whether it
/// already existed.
fn write_sale(tx: &Transaction<'_>, sale: &Sale) -> Result<bool> {
    let existed = tx
        .query_row(
            "SELECT 1 FROM sales WHERE id = ?1",
            params![sale.id.as_str()],
            |_| Ok(()),
        )
        .optional()?
        .is_some();

    tx.execute(
        "INSERT INTO sales (id, date, total, is_cancelled) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
             date = excluded.date,
             total = excluded.total,
             is_cancelled = excluded.is_cancelled",
        params![
            sale.id.as_str(),
            sale.date.timestamp_millis(),
            sale.total.to_string(),
            sale.is_cancelled
        ],
    )?;

    tx.execute(
        "DELETE FROM sale_items WHERE sale_id = ?1",
        params![sale.id.as_str()],
    )?;
    for (position, item) in sale.items.iter().enumerate() {
        tx.execute(
            "INSERT INTO sale_items (sale_id, position, product_name, quantity, unit_price)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sale.id.as_str(),
                position as i64,
                item.product_name,
                item.quantity,
                item.unit_price.to_string()
            ],
        )?;
    }
    Ok(existed)
}

/// Atomic relative stock update guarded against going negative.
fn adjust_stock(conn: &Connection, name: &str, delta: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE products SET stock_quantity = stock_quantity + ?2
         WHERE name = ?1 AND stock_quantity + ?2 >= 0",
        params![name.trim(), delta],
    )?;
    if changed > 0 {
        return Ok(());
    }

    let available: Option<i64> = conn
        .query_row(
            "SELECT stock_quantity FROM products WHERE name = ?1",
            params![name.trim()],
            |row| row.get(0),
        )
        .optional()?;

    match available {
        None => Err(StoreError::NotFound(format!("product {}", name))),
        Some(available) => Err(StoreError::InsufficientStock {
            name: name.to_string(),
            available,
            requested: -delta,
        }),
    }
}

/// Compare-and-set on a product's stock. A stock already at `new` succeeds.
fn compare_and_set_stock(conn: &Connection, name: &str, expected: i64, new: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE products SET stock_quantity = ?3 WHERE name = ?1 AND stock_quantity = ?2",
        params![name.trim(), expected, new],
    )?;
    if changed > 0 {
        return Ok(());
    }

    let current: Option<i64> = conn
        .query_row(
            "SELECT stock_quantity FROM products WHERE name = ?1",
            params![name.trim()],
            |row| row.get(0),
        )
        .optional()?;

    match current {
        None => Err(StoreError::NotFound(format!("product {}", name))),
        Some(current) if current == new => Ok(()),
        Some(current) => Err(StoreError::Conflict(format!(
            "stock of {} is {}, expected {}",
            name, current, expected
        ))),
    }
}

fn outcome(existed: bool) -> UpsertOutcome {
    if existed {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Inserted
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn backend(&self) -> Backend {
        Backend::Relational
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {} FROM products", PRODUCT_COLUMNS))?;
            let rows = stmt
                .query_map([], product_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(build_product).collect()
        })
        .await
    }

    async fn get_product(&self, name: &str) -> Result<Option<Product>> {
        let name = name.to_string();
        self.run(move |conn| select_product(conn, &name)).await
    }

    async fn upsert_product(&self, product: &Product) -> Result<UpsertOutcome> {
        validate_product(product)?;
        let product = product.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let existed = write_product(&tx, &product)?;
            tx.commit()?;
            tracing::debug!(product = %product.name, existed, "relational store upserted product");
            Ok(outcome(existed))
        })
        .await
    }

    async fn apply_stock_delta(&self, name: &str, delta: i64) -> Result<()> {
        let name = name.to_string();
        self.run(move |conn| adjust_stock(conn, &name, delta)).await
    }

    async fn update_details(&self, product: &Product) -> Result<()> {
        validate_product(product)?;
        let product = product.clone();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE products SET category = ?2, price = ?3 WHERE name = ?1",
                params![product.name.trim(), product.category, product.price.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("product {}", product.name)));
            }
            tracing::debug!(product = %product.name, "relational store updated product details");
            Ok(())
        })
        .await
    }

    async fn set_stock_if(&self, name: &str, expected: i64, new: i64) -> Result<()> {
        if new < 0 {
            return Err(StoreError::InvalidData(format!(
                "stock of {} cannot be negative: {}",
                name, new
            )));
        }
        let name = name.to_string();
        self.run(move |conn| compare_and_set_stock(conn, &name, expected, new))
            .await
    }

    async fn list_sales(&self) -> Result<Vec<Sale>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sale_id, product_name, quantity, unit_price FROM sale_items
                 ORDER BY sale_id, position",
            )?;
            let item_rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut items: HashMap<String, Vec<SaleItem>> = HashMap::new();
            for (sale_id, product_name, quantity, unit_price) in item_rows {
                items.entry(sale_id).or_default().push(SaleItem {
                    product_name,
                    quantity,
                    unit_price: parse_decimal(&unit_price, "unit_price")?,
                });
            }

            let mut stmt = conn.prepare("SELECT id, date, total, is_cancelled FROM sales")?;
            let sale_rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            sale_rows
                .into_iter()
                .map(|(id, date, total, is_cancelled)| {
                    Ok(Sale {
                        items: items.remove(&id).unwrap_or_default(),
                        id: parse_sale_id(&id)?,
                        date: parse_date(date)?,
                        total: parse_decimal(&total, "total")?,
                        is_cancelled,
                    })
                })
                .collect()
        })
        .await
    }

    async fn get_sale(&self, id: &SaleId) -> Result<Option<Sale>> {
        let id = id.clone();
        self.run(move |conn| select_sale(conn, id.as_str())).await
    }

    async fn upsert_sale(&self, sale: &Sale) -> Result<UpsertOutcome> {
        validate_sale(sale)?;
        let sale = sale.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let existed = write_sale(&tx, &sale)?;
            tx.commit()?;
            tracing::debug!(sale = %sale.id, existed, "relational store upserted sale");
            Ok(outcome(existed))
        })
        .await
    }

    async fn set_cancelled(&self, id: &SaleId, cancelled: bool) -> Result<()> {
        let id = id.clone();
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE sales SET is_cancelled = ?2 WHERE id = ?1",
                params![id.as_str(), cancelled],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("sale {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn search_products(&self, term: &str) -> Result<Vec<Product>> {
        let term = term.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM products WHERE instr(lower(name), lower(?1)) > 0 ORDER BY name",
                PRODUCT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![term], product_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(build_product).collect()
        })
        .await
    }

    async fn create_product(&self, product: &Product) -> Result<()> {
        validate_product(product)?;
        let product = product.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            if select_product(&tx, &product.name)?.is_some() {
                return Err(StoreError::Conflict(format!(
                    "product {} already exists",
                    product.name
                )));
            }
            write_product(&tx, &product)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn record_sale(&self, draft: &SaleDraft) -> Result<Sale> {
        validate_sale_draft(draft)?;
        let sale = draft.clone().into_sale(SaleId::generate());

        let sale = self
            .run(move |conn| {
                let tx = conn.transaction()?;
                for item in &sale.items {
                    adjust_stock(&tx, &item.product_name, -item.quantity)?;
                }
                if write_sale(&tx, &sale)? {
                    return Err(StoreError::Conflict(format!("sale {} already exists", sale.id)));
                }
                tx.commit()?;
                Ok(sale)
            })
            .await?;

        tracing::info!(sale = %sale.id, total = %sale.total, "relational store recorded sale");
        Ok(sale)
    }

    async fn cancel_sale(&self, id: &SaleId) -> Result<bool> {
        let id = id.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let sale = select_sale(&tx, id.as_str())?
                .ok_or_else(|| StoreError::NotFound(format!("sale {}", id)))?;
            if sale.is_cancelled {
                return Ok(false);
            }

            for item in &sale.items {
                match adjust_stock(&tx, &item.product_name, item.quantity) {
                    Ok(()) => {}
                    Err(StoreError::NotFound(_)) => {
                        tracing::warn!(product = %item.product_name, sale = %id, "cannot restock missing product");
                    }
                    Err(e) => return Err(e),
                }
            }
            tx.execute(
                "UPDATE sales SET is_cancelled = 1 WHERE id = ?1",
                params![id.as_str()],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn recent_sales(&self, limit: usize) -> Result<Vec<Sale>> {
        self.run(move |conn| {
            let mut stmt =
                conn.prepare("SELECT id FROM sales ORDER BY date DESC, id DESC LIMIT ?1")?;
            let ids = stmt
                .query_map(params![limit as i64], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut sales = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(sale) = select_sale(conn, &id)? {
                    sales.push(sale);
                }
            }
            Ok(sales)
        })
        .await
    }
}
