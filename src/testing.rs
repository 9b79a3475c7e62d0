// src/testing.rs
use crate::error::Unavailable;
use crate::gateway::MarketData;
use crate::intraday::IntradayTrade;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Canned market data. Symbols without a price have "no data".
#[derive(Default)]
pub struct StubMarket {
    prices: HashMap<String, Decimal>,
    failing: HashSet<String>,
    tapes: HashMap<String, Vec<IntradayTrade>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StubMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, symbol: &str, price: Decimal) -> Self {
        self.prices.insert(symbol.to_string(), price);
        self
    }

    pub fn with_failure(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    pub fn with_tape(mut self, symbol: &str, trades: Vec<IntradayTrade>) -> Self {
        self.tapes.insert(symbol.to_string(), trades);
        self
    }

    /// Symbols passed to `latest_close_price`, in call order.
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl MarketData for StubMarket {
    async fn latest_close_price(
        &self,
        symbol: &str,
        _as_of: NaiveDate,
    ) -> Result<Decimal, Unavailable> {
        self.calls.lock().unwrap().push(symbol.to_string());
        if self.failing.contains(symbol) {
            return Err(Unavailable::Transport("connection reset".to_string()));
        }
        self.prices
            .get(symbol)
            .copied()
            .ok_or_else(|| Unavailable::NoData(symbol.to_string()))
    }

    async fn has_trade_today(&self, symbol: &str) -> bool {
        !self.failing.contains(symbol) && self.prices.contains_key(symbol)
    }

    async fn intraday_trades(
        &self,
        symbol: &str,
        page_size: u32,
    ) -> Result<Vec<IntradayTrade>, Unavailable> {
        match self.tapes.get(symbol) {
            Some(trades) => Ok(trades.iter().take(page_size as usize).cloned().collect()),
            None => Err(Unavailable::NoData(symbol.to_string())),
        }
    }
}
