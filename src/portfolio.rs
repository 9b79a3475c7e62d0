// src/portfolio.rs
use crate::auth::Identity;
use crate::error::StoreError;
use crate::models::{StockEntry, StockInput, ViewRow};
use crate::store::StockStore;
use crate::valuation::Valuation;
use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("Admin access required")]
    Forbidden,

    #[error("Symbol {0} does not exist or has not traded today")]
    NotTradable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Stock entry lifecycle. Every mutation takes the caller's identity and
/// checks it before touching the store.
pub struct Portfolio {
    stocks: Arc<dyn StockStore>,
    valuation: Valuation,
}

impl Portfolio {
    pub fn new(stocks: Arc<dyn StockStore>, valuation: Valuation) -> Self {
        Portfolio { stocks, valuation }
    }

    /// All entries with live prices, in listing order.
    pub async fn listing(&self) -> Result<Vec<ViewRow>, StoreError> {
        let entries = self.stocks.list().await?;
        Ok(self.valuation.enrich_all(entries).await)
    }

    /// Loads an entry for editing.
    pub async fn entry(&self, identity: &Identity, id: i64) -> Result<StockEntry, PortfolioError> {
        require_admin(identity)?;
        Ok(self.stocks.get(id).await?)
    }

    pub async fn add(&self, identity: &Identity, input: StockInput) -> Result<i64, PortfolioError> {
        require_admin(identity)?;
        if !self.valuation.validate_symbol_tradable(&input.symbol).await {
            warn!("Rejected {}: no trades today", input.symbol);
            return Err(PortfolioError::NotTradable(input.symbol));
        }
        let symbol = input.symbol.clone();
        let id = self.stocks.create(input, Utc::now()).await?;
        info!("{} added stock entry {} ({})", identity.username, id, symbol);
        Ok(id)
    }

    pub async fn edit(
        &self,
        identity: &Identity,
        id: i64,
        input: StockInput,
    ) -> Result<(), PortfolioError> {
        require_admin(identity)?;
        self.stocks.update(id, input).await?;
        info!("{} updated stock entry {}", identity.username, id);
        Ok(())
    }

    pub async fn remove(&self, identity: &Identity, id: i64) -> Result<(), PortfolioError> {
        require_admin(identity)?;
        self.stocks.delete(id).await?;
        info!("{} deleted stock entry {}", identity.username, id);
        Ok(())
    }
}

/// Gate for admin-only actions.
pub fn require_admin(identity: &Identity) -> Result<(), PortfolioError> {
    if identity.is_admin {
        Ok(())
    } else {
        warn!("{} attempted an admin-only action", identity.username);
        Err(PortfolioError::Forbidden)
    }
}
