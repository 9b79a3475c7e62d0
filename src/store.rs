// src/store.rs
use crate::error::StoreError;
use crate::models::{NewUser, StockEntry, StockInput, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

/// Persistent table of portfolio entries.
///
/// Callers are expected to have checked authorization already.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn create(
        &self,
        input: StockInput,
        created_at: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    async fn get(&self, id: i64) -> Result<StockEntry, StoreError>;

    /// All entries in insertion order.
    async fn list(&self) -> Result<Vec<StockEntry>, StoreError>;

    /// Replaces every mutable field. `id` and `created_at` are kept.
    async fn update(&self, id: i64, input: StockInput) -> Result<(), StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<i64, StoreError>;

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;
}

/// Store kept in process memory. Backs `memory://` and the tests.
pub struct MemoryStore {
    stocks: RwLock<BTreeMap<i64, StockEntry>>,
    users: RwLock<BTreeMap<String, User>>,
    next_stock_id: AtomicI64,
    next_user_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            stocks: RwLock::new(BTreeMap::new()),
            users: RwLock::new(BTreeMap::new()),
            next_stock_id: AtomicI64::new(1),
            next_user_id: AtomicI64::new(1),
        }
    }

    pub fn stock_count(&self) -> usize {
        self.stocks.read().map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Database("memory store lock poisoned".to_string())
}

#[async_trait]
impl StockStore for MemoryStore {
    async fn create(
        &self,
        input: StockInput,
        created_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let id = self.next_stock_id.fetch_add(1, Ordering::SeqCst);
        let entry = StockEntry {
            id,
            symbol: input.symbol,
            buy_price: input.buy_price,
            target1: input.target1,
            target2: input.target2,
            cut_loss: input.cut_loss,
            note: input.note,
            created_at: Some(created_at),
        };
        self.stocks.write().map_err(poisoned)?.insert(id, entry);
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<StockEntry, StoreError> {
        self.stocks
            .read()
            .map_err(poisoned)?
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<StockEntry>, StoreError> {
        // Ids are handed out in increasing order, so key order is insertion order.
        Ok(self.stocks.read().map_err(poisoned)?.values().cloned().collect())
    }

    async fn update(&self, id: i64, input: StockInput) -> Result<(), StoreError> {
        let mut stocks = self.stocks.write().map_err(poisoned)?;
        let entry = stocks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        entry.symbol = input.symbol;
        entry.buy_price = input.buy_price;
        entry.target1 = input.target1;
        entry.target2 = input.target2;
        entry.cut_loss = input.cut_loss;
        entry.note = input.note;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.stocks
            .write()
            .map_err(poisoned)?
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<i64, StoreError> {
        let mut users = self.users.write().map_err(poisoned)?;
        if users.contains_key(&user.username) {
            return Err(StoreError::DuplicateUser(user.username));
        }
        let id = self.next_user_id.fetch_add(1, Ordering::SeqCst);
        users.insert(
            user.username.clone(),
            User {
                id,
                username: user.username,
                password_hash: user.password_hash,
                is_admin: user.is_admin,
            },
        );
        Ok(id)
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().map_err(poisoned)?.get(username).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input(symbol: &str) -> StockInput {
        StockInput {
            symbol: symbol.to_string(),
            buy_price: dec!(10),
            target1: Some(dec!(12)),
            target2: Some(dec!(14)),
            cut_loss: Some(dec!(9)),
            note: Some("first".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_get_and_list_in_insertion_order() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let a = store.create(input("BBB"), now).await.unwrap();
        let b = store.create(input("AAA"), now).await.unwrap();
        assert_ne!(a, b);

        let fetched = store.get(a).await.unwrap();
        assert_eq!(fetched.symbol, "BBB");
        assert_eq!(fetched.created_at, Some(now));

        let symbols: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.symbol)
            .collect();
        assert_eq!(symbols, vec!["BBB", "AAA"]);
    }

    #[tokio::test]
    async fn test_update_replaces_every_mutable_field() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let id = store.create(input("ABC"), now).await.unwrap();

        let replacement = StockInput {
            symbol: "XYZ".to_string(),
            buy_price: dec!(11),
            target1: None,
            target2: None,
            cut_loss: None,
            note: None,
        };
        store.update(id, replacement).await.unwrap();

        let entry = store.get(id).await.unwrap();
        assert_eq!(entry.symbol, "XYZ");
        assert_eq!(entry.buy_price, dec!(11));
        assert_eq!(entry.target1, None);
        assert_eq!(entry.target2, None);
        assert_eq!(entry.cut_loss, None);
        assert_eq!(entry.note, None);
        assert_eq!(entry.created_at, Some(now));
    }

    #[tokio::test]
    async fn test_missing_ids_are_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.get(42).await, Err(StoreError::NotFound(42))));
        assert!(matches!(
            store.update(42, input("ABC")).await,
            Err(StoreError::NotFound(42))
        ));
        assert!(matches!(store.delete(42).await, Err(StoreError::NotFound(42))));
    }

    #[tokio::test]
    async fn test_delete_removes_from_listing() {
        let store = MemoryStore::new();
        let id = store.create(input("ABC"), Utc::now()).await.unwrap();
        store.delete(id).await.unwrap();
        assert!(store.list().await.unwrap().iter().all(|e| e.id != id));
        assert!(matches!(store.delete(id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_usernames_are_unique() {
        let store = MemoryStore::new();
        let user = NewUser {
            username: "alice".to_string(),
            password_hash: "h".to_string(),
            is_admin: true,
        };
        store.create_user(user.clone()).await.unwrap();
        assert!(matches!(
            store.create_user(user).await,
            Err(StoreError::DuplicateUser(_))
        ));
        let found = store.find_user("alice").await.unwrap().unwrap();
        assert!(found.is_admin);
        assert!(store.find_user("bob").await.unwrap().is_none());
    }
}
