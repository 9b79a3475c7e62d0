// src/db.rs
use crate::error::StoreError;
use crate::models::{NewUser, StockEntry, StockInput, User};
use crate::store::{StockStore, UserStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use rust_decimal::Decimal;
use scylla::frame::response::result::{CqlValue, Row};
use scylla::{query::Query, Session, SessionBuilder};
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

// Portfolio scale: every entry lives in one partition so the clustering key
// gives insertion order.
const STOCK_BUCKET: i32 = 0;
const MAX_ID_ATTEMPTS: usize = 16;

const STOCK_COLUMNS: &str = "id, symbol, buy_price, target1, target2, cut_loss, note, created_at";

pub struct ScyllaStore {
    session: Session,
    last_stock_id: AtomicI64,
    last_user_id: AtomicI64,
}

impl ScyllaStore {
    /// Connects, creates the keyspace and tables if missing, and seeds the id counters.
    pub async fn connect(nodes: &[String]) -> Result<Self, StoreError> {
        let mut builder = SessionBuilder::new();
        for node in nodes {
            builder = builder.known_node(node);
        }
        let session = builder.build().await.map_err(db_err)?;

        session.query("CREATE KEYSPACE IF NOT EXISTS portfolio WITH REPLICATION = {'class': 'SimpleStrategy', 'replication_factor': 1}", &[]).await.map_err(db_err)?;
        session.query("CREATE TABLE IF NOT EXISTS portfolio.stocks (bucket INT, id BIGINT, symbol TEXT, buy_price TEXT, target1 TEXT, target2 TEXT, cut_loss TEXT, note TEXT, created_at TIMESTAMP, PRIMARY KEY (bucket, id)) WITH CLUSTERING ORDER BY (id ASC)", &[]).await.map_err(db_err)?;
        session.query("CREATE TABLE IF NOT EXISTS portfolio.users (username TEXT PRIMARY KEY, id BIGINT, password_hash TEXT, is_admin BOOLEAN)", &[]).await.map_err(db_err)?;

        let last_stock_id = max_id(
            &session,
            Query::new("SELECT MAX(id) FROM portfolio.stocks WHERE bucket = ?"),
            (STOCK_BUCKET,),
        )
        .await?;
        let last_user_id = max_id(
            &session,
            Query::new("SELECT MAX(id) FROM portfolio.users"),
            (),
        )
        .await?;

        info!(
            "Successfully connected to ScyllaDB (last stock id {}, last user id {}).",
            last_stock_id, last_user_id
        );
        Ok(Self {
            session,
            last_stock_id: AtomicI64::new(last_stock_id),
            last_user_id: AtomicI64::new(last_user_id),
        })
    }
}

#[async_trait]
impl StockStore for ScyllaStore {
    async fn create(
        &self,
        input: StockInput,
        created_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let query = Query::new(format!(
            "INSERT INTO portfolio.stocks (bucket, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
            STOCK_COLUMNS
        ));
        let buy_price = input.buy_price.to_string();
        let target1 = input.target1.map(|d| d.to_string());
        let target2 = input.target2.map(|d| d.to_string());
        let cut_loss = input.cut_loss.map(|d| d.to_string());

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.last_stock_id.fetch_add(1, Ordering::SeqCst) + 1;
            let result = self
                .session
                .query(
                    query.clone(),
                    (
                        STOCK_BUCKET,
                        id,
                        input.symbol.as_str(),
                        buy_price.as_str(),
                        target1.as_deref(),
                        target2.as_deref(),
                        cut_loss.as_deref(),
                        input.note.as_deref(),
                        created_at.timestamp_millis(),
                    ),
                )
                .await
                .map_err(db_err)?;
            if applied(&result.rows)? {
                info!("Stored stock entry {} ({})", id, input.symbol);
                return Ok(id);
            }
            // Another process took this id.
            warn!("Stock id {} already in use, retrying", id);
        }
        Err(StoreError::Database(
            "could not allocate a stock id".to_string(),
        ))
    }

    async fn get(&self, id: i64) -> Result<StockEntry, StoreError> {
        let query = Query::new(format!(
            "SELECT {} FROM portfolio.stocks WHERE bucket = ? AND id = ?",
            STOCK_COLUMNS
        ));
        let result = self
            .session
            .query(query, (STOCK_BUCKET, id))
            .await
            .map_err(db_err)?;
        match result.rows.and_then(|rows| rows.into_iter().next()) {
            Some(row) => stock_from_row(&row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn list(&self) -> Result<Vec<StockEntry>, StoreError> {
        let query = Query::new(format!(
            "SELECT {} FROM portfolio.stocks WHERE bucket = ?",
            STOCK_COLUMNS
        ));
        let result = self
            .session
            .query(query, (STOCK_BUCKET,))
            .await
            .map_err(db_err)?;
        let entries = result
            .rows
            .unwrap_or_default()
            .iter()
            .map(stock_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        info!("Fetched {} stock entries", entries.len());
        Ok(entries)
    }

    async fn update(&self, id: i64, input: StockInput) -> Result<(), StoreError> {
        let query = Query::new("UPDATE portfolio.stocks SET symbol = ?, buy_price = ?, target1 = ?, target2 = ?, cut_loss = ?, note = ? WHERE bucket = ? AND id = ? IF EXISTS");
        let result = self
            .session
            .query(
                query,
                (
                    input.symbol,
                    input.buy_price.to_string(),
                    input.target1.map(|d| d.to_string()),
                    input.target2.map(|d| d.to_string()),
                    input.cut_loss.map(|d| d.to_string()),
                    input.note,
                    STOCK_BUCKET,
                    id,
                ),
            )
            .await
            .map_err(db_err)?;
        if applied(&result.rows)? {
            Ok(())
        } else {
            Err(StoreError::NotFound(id))
        }
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let query = Query::new("DELETE FROM portfolio.stocks WHERE bucket = ? AND id = ? IF EXISTS");
        let result = self
            .session
            .query(query, (STOCK_BUCKET, id))
            .await
            .map_err(db_err)?;
        if applied(&result.rows)? {
            Ok(())
        } else {
            Err(StoreError::NotFound(id))
        }
    }
}

#[async_trait]
impl UserStore for ScyllaStore {
    async fn create_user(&self, user: NewUser) -> Result<i64, StoreError> {
        let id = self.last_user_id.fetch_add(1, Ordering::SeqCst) + 1;
        let query = Query::new("INSERT INTO portfolio.users (username, id, password_hash, is_admin) VALUES (?, ?, ?, ?) IF NOT EXISTS");
        let result = self
            .session
            .query(
                query,
                (
                    user.username.as_str(),
                    id,
                    user.password_hash.as_str(),
                    user.is_admin,
                ),
            )
            .await
            .map_err(db_err)?;
        if applied(&result.rows)? {
            info!("Registered user {}", user.username);
            Ok(id)
        } else {
            Err(StoreError::DuplicateUser(user.username))
        }
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let query = Query::new(
            "SELECT id, username, password_hash, is_admin FROM portfolio.users WHERE username = ?",
        );
        let result = self
            .session
            .query(query, (username,))
            .await
            .map_err(db_err)?;
        match result.rows.and_then(|rows| rows.into_iter().next()) {
            Some(row) => Ok(Some(User {
                id: bigint(&row, 0)?,
                username: text(&row, 1)?,
                password_hash: text(&row, 2)?,
                is_admin: column(&row, 3)
                    .and_then(|v| v.as_boolean())
                    .unwrap_or(false),
            })),
            None => Ok(None),
        }
    }
}

fn db_err<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Database(e.to_string())
}

async fn max_id(
    session: &Session,
    query: Query,
    values: impl scylla::frame::value::ValueList,
) -> Result<i64, StoreError> {
    let result = session.query(query, values).await.map_err(db_err)?;
    Ok(result
        .rows
        .and_then(|rows| rows.into_iter().next())
        .and_then(|row| column(&row, 0).and_then(|v| v.as_bigint()))
        .unwrap_or(0))
}

/// Reads the `[applied]` flag of a lightweight transaction.
fn applied(rows: &Option<Vec<Row>>) -> Result<bool, StoreError> {
    rows.as_ref()
        .and_then(|rows| rows.first())
        .and_then(|row| column(row, 0))
        .and_then(|v| v.as_boolean())
        .ok_or_else(|| StoreError::MalformedRow("missing [applied] column".to_string()))
}

fn column(row: &Row, idx: usize) -> Option<&CqlValue> {
    row.columns.get(idx).and_then(|c| c.as_ref())
}

fn bigint(row: &Row, idx: usize) -> Result<i64, StoreError> {
    column(row, idx)
        .and_then(|v| v.as_bigint())
        .ok_or_else(|| StoreError::MalformedRow(format!("column {} is not a bigint", idx)))
}

fn text(row: &Row, idx: usize) -> Result<String, StoreError> {
    column(row, idx)
        .and_then(|v| v.as_text())
        .map(|s| s.to_string())
        .ok_or_else(|| StoreError::MalformedRow(format!("column {} is not text", idx)))
}

fn optional_decimal(row: &Row, idx: usize) -> Result<Option<Decimal>, StoreError> {
    match column(row, idx).and_then(|v| v.as_text()) {
        Some(s) if !s.is_empty() => Decimal::from_str(s)
            .map(Some)
            .map_err(|e| StoreError::MalformedRow(format!("column {}: {}", idx, e))),
        _ => Ok(None),
    }
}

fn stock_from_row(row: &Row) -> Result<StockEntry, StoreError> {
    let id = bigint(row, 0)?;
    let buy_price = optional_decimal(row, 2)?
        .ok_or_else(|| StoreError::MalformedRow(format!("stock {} has no buy price", id)))?;
    let created_at = column(row, 7).and_then(|v| match v {
        CqlValue::Timestamp(ts) => DateTime::<Utc>::from_timestamp_millis(ts.num_milliseconds()),
        _ => None,
    });
    Ok(StockEntry {
        id,
        symbol: text(row, 1)?,
        buy_price,
        target1: optional_decimal(row, 3)?,
        target2: optional_decimal(row, 4)?,
        cut_loss: optional_decimal(row, 5)?,
        note: column(row, 6).and_then(|v| v.as_text()).map(|s| s.to_string()),
        created_at,
    })
}
