// src/valuation.rs
use crate::gateway::MarketData;
use crate::models::{StockEntry, ViewRow};
use chrono::{FixedOffset, NaiveDate, Utc};
use log::{debug, warn};
use rust_decimal::Decimal;
use std::sync::Arc;

const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Enriches stored entries with the latest market price.
///
/// Lookups run one at a time in listing order; a failed lookup only blanks
/// that row's price columns.
pub struct Valuation {
    market: Arc<dyn MarketData>,
    market_offset: FixedOffset,
}

impl Valuation {
    pub fn new(market: Arc<dyn MarketData>, market_offset: FixedOffset) -> Self {
        Valuation {
            market,
            market_offset,
        }
    }

    /// Current date on the exchange's clock.
    pub fn market_today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.market_offset).date_naive()
    }

    pub async fn enrich(&self, entry: StockEntry, as_of: NaiveDate) -> ViewRow {
        let latest_price = match self.market.latest_close_price(&entry.symbol, as_of).await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!("Error fetching price for {}: {}", entry.symbol, e);
                None
            }
        };
        let profit_loss_pct = latest_price.and_then(|p| profit_loss_pct(p, entry.buy_price));
        debug!(
            "{}: latest {:?}, profit/loss {:?}%",
            entry.symbol, latest_price, profit_loss_pct
        );

        ViewRow {
            id: entry.id,
            symbol: entry.symbol,
            buy_price: entry.buy_price,
            latest_price,
            profit_loss_pct,
            target1: entry.target1,
            target2: entry.target2,
            cut_loss: entry.cut_loss,
            note: entry.note,
            created_at: entry
                .created_at
                .map(|t| t.format(CREATED_AT_FORMAT).to_string())
                .unwrap_or_else(|| "N/A".to_string()),
        }
    }

    pub async fn enrich_all(&self, entries: Vec<StockEntry>) -> Vec<ViewRow> {
        let as_of = self.market_today();
        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            rows.push(self.enrich(entry, as_of).await);
        }
        rows
    }

    /// Admit gate for new entries.
    pub async fn validate_symbol_tradable(&self, symbol: &str) -> bool {
        self.market.has_trade_today(symbol).await
    }
}

/// `(latest - buy) * 100 / buy`; `None` when `buy` is zero or the result
/// does not fit in a `Decimal`.
pub fn profit_loss_pct(latest: Decimal, buy: Decimal) -> Option<Decimal> {
    latest
        .checked_sub(buy)?
        .checked_mul(Decimal::ONE_HUNDRED)?
        .checked_div(buy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubMarket;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn entry(id: i64, symbol: &str, buy_price: Decimal) -> StockEntry {
        StockEntry {
            id,
            symbol: symbol.to_string(),
            buy_price,
            target1: Some(dec!(15)),
            target2: None,
            cut_loss: Some(dec!(8)),
            note: Some("swing".to_string()),
            created_at: Some(Utc.with_ymd_and_hms(2024, 5, 10, 2, 30, 0).unwrap()),
        }
    }

    fn valuation(market: StubMarket) -> Valuation {
        Valuation::new(Arc::new(market), FixedOffset::east_opt(7 * 3600).unwrap())
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    #[test]
    fn test_profit_loss_formula() {
        assert_eq!(profit_loss_pct(dec!(12.0), dec!(10.0)), Some(dec!(20)));
        assert_eq!(profit_loss_pct(dec!(8), dec!(10)), Some(dec!(-20)));
        assert_eq!(profit_loss_pct(dec!(10), dec!(10)), Some(dec!(0)));
        assert_eq!(profit_loss_pct(dec!(1), dec!(3)).map(|d| d.round_dp(4)), Some(dec!(-66.6667)));
        assert_eq!(profit_loss_pct(dec!(12), dec!(0)), None);
        assert_eq!(profit_loss_pct(dec!(12), Decimal::MAX), None);
        assert_eq!(profit_loss_pct(Decimal::MAX, Decimal::MIN), None);
    }

    #[tokio::test]
    async fn test_enrich_huge_buy_price_keeps_row_without_pct() {
        let v = valuation(StubMarket::new().with_price("ABC", dec!(12)));
        let huge = Decimal::from_str_exact("1000000000000000000000000000").unwrap();
        let row = v.enrich(entry(1, "ABC", huge), today()).await;

        assert_eq!(row.latest_price, Some(dec!(12)));
        assert_eq!(row.profit_loss_pct, None);
    }

    #[tokio::test]
    async fn test_enrich_with_price() {
        let v = valuation(StubMarket::new().with_price("ABC", dec!(12.0)));
        let row = v.enrich(entry(1, "ABC", dec!(10.0)), today()).await;

        assert_eq!(row.latest_price, Some(dec!(12.0)));
        assert_eq!(row.profit_loss_pct, Some(dec!(20)));
        assert_eq!(row.target1, Some(dec!(15)));
        assert_eq!(row.cut_loss, Some(dec!(8)));
        assert_eq!(row.note.as_deref(), Some("swing"));
        assert_eq!(row.created_at, "2024-05-10 02:30:00");
    }

    #[tokio::test]
    async fn test_enrich_without_data_keeps_row() {
        let v = valuation(StubMarket::new());
        let row = v.enrich(entry(1, "ABC", dec!(10.0)), today()).await;

        assert_eq!(row.symbol, "ABC");
        assert_eq!(row.latest_price, None);
        assert_eq!(row.profit_loss_pct, None);
    }

    #[tokio::test]
    async fn test_provider_failure_is_treated_as_no_data() {
        let v = valuation(StubMarket::new().with_failure("ABC"));
        let row = v.enrich(entry(1, "ABC", dec!(10.0)), today()).await;
        assert_eq!(row.latest_price, None);
        assert_eq!(row.profit_loss_pct, None);
    }

    #[tokio::test]
    async fn test_missing_created_at_renders_na() {
        let v = valuation(StubMarket::new());
        let mut e = entry(1, "ABC", dec!(10));
        e.created_at = None;
        assert_eq!(v.enrich(e, today()).await.created_at, "N/A");
    }

    #[tokio::test]
    async fn test_enrich_all_keeps_order_and_every_row() {
        let market = StubMarket::new()
            .with_price("AAA", dec!(5))
            .with_failure("BBB")
            .with_price("CCC", dec!(30));
        let calls = market.calls();
        let v = valuation(market);

        let rows = v
            .enrich_all(vec![
                entry(3, "CCC", dec!(20)),
                entry(1, "AAA", dec!(10)),
                entry(2, "BBB", dec!(10)),
                entry(4, "DDD", dec!(10)),
            ])
            .await;

        let ids: Vec<_> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 1, 2, 4]);
        assert_eq!(rows[0].profit_loss_pct, Some(dec!(50)));
        assert_eq!(rows[1].profit_loss_pct, Some(dec!(-50)));
        assert_eq!(rows[2].latest_price, None);
        assert_eq!(rows[3].latest_price, None);
        // One lookup per entry, in listing order.
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["CCC", "AAA", "BBB", "DDD"]
        );
    }

    #[tokio::test]
    async fn test_validate_symbol_tradable() {
        let v = valuation(StubMarket::new().with_price("ABC", dec!(1)).with_failure("ERR"));
        assert!(v.validate_symbol_tradable("ABC").await);
        assert!(!v.validate_symbol_tradable("XYZ").await);
        assert!(!v.validate_symbol_tradable("ERR").await);
    }
}
