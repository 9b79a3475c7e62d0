// src/gateway.rs
use crate::config::ProviderConfig;
use crate::error::Unavailable;
use crate::intraday::{InvestorClass, IntradayTrade, TradeSide};
use async_trait::async_trait;
use chrono::{Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use log::{debug, info, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

/// Market data the portfolio needs from the outside world.
///
/// Implementations degrade to [`Unavailable`] on any data or network problem;
/// they never panic on provider input.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Closing price of `symbol` on `as_of`.
    async fn latest_close_price(&self, symbol: &str, as_of: NaiveDate)
        -> Result<Decimal, Unavailable>;

    /// Whether `symbol` traded at least once on the current market date.
    async fn has_trade_today(&self, symbol: &str) -> bool;

    /// The most recent `page_size` executions for `symbol`, in tape order.
    async fn intraday_trades(
        &self,
        symbol: &str,
        page_size: u32,
    ) -> Result<Vec<IntradayTrade>, Unavailable>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

#[derive(Deserialize)]
struct BarData {
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    #[serde(default)]
    volume: u64,
    #[serde(rename = "tradingDate")]
    trading_date: String,
}

#[derive(Deserialize)]
struct BarsResponse {
    #[serde(default)]
    data: Vec<BarData>,
}

#[derive(Deserialize)]
struct TickData {
    #[serde(rename = "p")]
    price: Decimal,
    #[serde(rename = "v")]
    volume: u64,
    #[serde(rename = "a", default)]
    side: String,
    #[serde(rename = "t")]
    time: String,
    #[serde(rename = "investorType", default)]
    investor_type: Option<String>,
}

#[derive(Deserialize)]
struct TicksResponse {
    #[serde(default)]
    data: Vec<TickData>,
}

/// HTTP client for the TCBS public market data API.
pub struct TcbsClient {
    client: Client,
    base_url: String,
    market_offset: FixedOffset,
}

impl TcbsClient {
    /// Fails when the provider's terms have not been accepted.
    pub fn new(config: &ProviderConfig) -> Result<Self, Unavailable> {
        if config.consent.trim().is_empty() {
            return Err(Unavailable::ConsentRequired);
        }
        let client = Client::builder()
            .user_agent(concat!("portfolio_tracker/", env!("CARGO_PKG_VERSION")))
            .build()?;
        info!(
            "Market data provider at {} (terms accepted: {:?})",
            config.base_url, config.consent
        );
        Ok(TcbsClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            market_offset: config.market_offset,
        })
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.market_offset).date_naive()
    }

    /// Daily bars between `start` and `end`, both inclusive, in market time.
    pub async fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, Unavailable> {
        let from = self.midnight_timestamp(start)?;
        let to = self.midnight_timestamp(end + Duration::days(1))?;
        let url = format!("{}/stock-insight/v2/stock/bars-long-term", self.base_url);
        debug!("Fetching daily bars for {} from {} to {}", symbol, start, end);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("ticker", symbol.to_string()),
                ("type", "stock".to_string()),
                ("resolution", "D".to_string()),
                ("from", from.to_string()),
                ("to", to.to_string()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Unavailable::Status(response.status().as_u16()));
        }
        let body = response.json::<BarsResponse>().await?;
        parse_bars(body)
    }

    fn midnight_timestamp(&self, date: NaiveDate) -> Result<i64, Unavailable> {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| Unavailable::Decode(format!("invalid date {}", date)))?;
        self.market_offset
            .from_local_datetime(&midnight)
            .single()
            .map(|dt| dt.timestamp())
            .ok_or_else(|| Unavailable::Decode(format!("ambiguous date {}", date)))
    }
}

#[async_trait]
impl MarketData for TcbsClient {
    async fn latest_close_price(
        &self,
        symbol: &str,
        as_of: NaiveDate,
    ) -> Result<Decimal, Unavailable> {
        let bars = self.daily_bars(symbol, as_of, as_of).await?;
        close_on(&bars, as_of).ok_or_else(|| Unavailable::NoData(symbol.to_string()))
    }

    async fn has_trade_today(&self, symbol: &str) -> bool {
        let today = self.today();
        match self.daily_bars(symbol, today, today).await {
            Ok(bars) => bars.iter().any(|b| b.date == today),
            Err(e) => {
                warn!("Error checking stock info for {}: {}", symbol, e);
                false
            }
        }
    }

    async fn intraday_trades(
        &self,
        symbol: &str,
        page_size: u32,
    ) -> Result<Vec<IntradayTrade>, Unavailable> {
        let url = format!(
            "{}/stock-insight/v1/intraday/{}/his/paging",
            self.base_url, symbol
        );
        let response = self
            .client
            .get(&url)
            .query(&[
                ("page", "0".to_string()),
                ("size", page_size.to_string()),
                ("headIndex", "-1".to_string()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Unavailable::Status(response.status().as_u16()));
        }
        let body = response.json::<TicksResponse>().await?;
        let trades = parse_ticks(body);
        info!("Fetched {} intraday trades for {}", trades.len(), symbol);
        if trades.is_empty() {
            return Err(Unavailable::NoData(symbol.to_string()));
        }
        Ok(trades)
    }
}

fn parse_bars(body: BarsResponse) -> Result<Vec<DailyBar>, Unavailable> {
    body.data
        .into_iter()
        .map(|bar| {
            let day = bar.trading_date.get(..10).unwrap_or(&bar.trading_date);
            let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| {
                Unavailable::Decode(format!("bad trading date {:?}: {}", bar.trading_date, e))
            })?;
            Ok(DailyBar {
                date,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            })
        })
        .collect()
}

/// Close of the last bar dated `as_of`.
fn close_on(bars: &[DailyBar], as_of: NaiveDate) -> Option<Decimal> {
    bars.iter().rev().find(|b| b.date == as_of).map(|b| b.close)
}

fn parse_ticks(body: TicksResponse) -> Vec<IntradayTrade> {
    body.data
        .into_iter()
        .map(|tick| {
            let investor = tick
                .investor_type
                .as_deref()
                .and_then(|t| t.parse::<InvestorClass>().ok())
                .unwrap_or_else(|| InvestorClass::classify(tick.price, tick.volume));
            IntradayTrade {
                time: tick.time,
                price: tick.price,
                volume: tick.volume,
                side: TradeSide::from_code(&tick.side),
                investor,
            }
        })
        .collect()
}
