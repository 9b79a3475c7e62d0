// src/intraday.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trades worth less than this (price x volume) are retail noise.
pub const WOLF_MIN_VALUE: i64 = 100_000_000;
pub const SHARK_MIN_VALUE: i64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InvestorClass {
    Sheep,
    Wolf,
    Shark,
}

impl InvestorClass {
    pub const ALL: [InvestorClass; 3] = [InvestorClass::Sheep, InvestorClass::Wolf, InvestorClass::Shark];

    pub fn classify(price: Decimal, volume: u64) -> InvestorClass {
        let value = match price.checked_mul(Decimal::from(volume)) {
            Some(value) => value,
            None => return InvestorClass::Shark,
        };
        if value >= Decimal::from(SHARK_MIN_VALUE) {
            InvestorClass::Shark
        } else if value >= Decimal::from(WOLF_MIN_VALUE) {
            InvestorClass::Wolf
        } else {
            InvestorClass::Sheep
        }
    }
}

impl fmt::Display for InvestorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvestorClass::Sheep => write!(f, "SHEEP"),
            InvestorClass::Wolf => write!(f, "WOLF"),
            InvestorClass::Shark => write!(f, "SHARK"),
        }
    }
}

impl FromStr for InvestorClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SHEEP" => Ok(InvestorClass::Sheep),
            "WOLF" => Ok(InvestorClass::Wolf),
            "SHARK" => Ok(InvestorClass::Shark),
            other => Err(format!("unknown investor class: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeSide {
    Buy,
    Sell,
    Unknown,
}

impl TradeSide {
    /// Provider codes: `BU` buy-initiated, `SD` sell-initiated.
    pub fn from_code(code: &str) -> TradeSide {
        match code {
            "BU" => TradeSide::Buy,
            "SD" => TradeSide::Sell,
            _ => TradeSide::Unknown,
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "Buy"),
            TradeSide::Sell => write!(f, "Sell"),
            TradeSide::Unknown => write!(f, "-"),
        }
    }
}

/// One execution on the tape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntradayTrade {
    pub time: String,
    pub price: Decimal,
    pub volume: u64,
    pub side: TradeSide,
    pub investor: InvestorClass,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub investor: InvestorClass,
    pub buy_volume: u64,
    pub sell_volume: u64,
    pub unknown_volume: u64,
    pub trade_count: usize,
}

impl SummaryRow {
    pub fn net_volume(&self) -> i128 {
        self.buy_volume as i128 - self.sell_volume as i128
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntradayReport {
    pub symbol: String,
    pub classes: Vec<InvestorClass>,
    pub total_trades: usize,
    pub summary: Vec<SummaryRow>,
    pub details: Vec<IntradayTrade>,
}

/// Classes shown when the caller picks none.
pub fn default_classes() -> Vec<InvestorClass> {
    vec![InvestorClass::Wolf, InvestorClass::Shark]
}

/// Filters the tape to `classes` and pivots volume by class and side.
pub fn build_report(
    symbol: &str,
    trades: Vec<IntradayTrade>,
    classes: &[InvestorClass],
) -> IntradayReport {
    let mut classes: Vec<InvestorClass> = if classes.is_empty() {
        default_classes()
    } else {
        classes.to_vec()
    };
    classes.sort();
    classes.dedup();

    let total_trades = trades.len();
    let details: Vec<IntradayTrade> = trades
        .into_iter()
        .filter(|t| classes.contains(&t.investor))
        .collect();

    let summary = classes
        .iter()
        .map(|class| {
            let mut row = SummaryRow {
                investor: *class,
                buy_volume: 0,
                sell_volume: 0,
                unknown_volume: 0,
                trade_count: 0,
            };
            for trade in details.iter().filter(|t| t.investor == *class) {
                row.trade_count += 1;
                match trade.side {
                    TradeSide::Buy => row.buy_volume += trade.volume,
                    TradeSide::Sell => row.sell_volume += trade.volume,
                    TradeSide::Unknown => row.unknown_volume += trade.volume,
                }
            }
            row
        })
        .collect();

    IntradayReport {
        symbol: symbol.to_string(),
        classes,
        total_trades,
        summary,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(time: &str, price: Decimal, volume: u64, side: TradeSide) -> IntradayTrade {
        IntradayTrade {
            time: time.to_string(),
            price,
            volume,
            side,
            investor: InvestorClass::classify(price, volume),
        }
    }

    #[test]
    fn test_classify_by_trade_value() {
        assert_eq!(InvestorClass::classify(dec!(25000), 100), InvestorClass::Sheep);
        assert_eq!(InvestorClass::classify(dec!(25000), 4_000), InvestorClass::Wolf);
        assert_eq!(InvestorClass::classify(dec!(25000), 40_000), InvestorClass::Shark);
        assert_eq!(InvestorClass::classify(dec!(100000), 1_000), InvestorClass::Wolf);
    }

    #[test]
    fn test_classify_overflowing_value_is_shark() {
        assert_eq!(InvestorClass::classify(Decimal::MAX, u64::MAX), InvestorClass::Shark);
    }

    #[test]
    fn test_class_names_parse_case_insensitively() {
        assert_eq!("shark".parse::<InvestorClass>(), Ok(InvestorClass::Shark));
        assert_eq!(" Wolf ".parse::<InvestorClass>(), Ok(InvestorClass::Wolf));
        assert!("fox".parse::<InvestorClass>().is_err());
        assert_eq!(InvestorClass::Sheep.to_string(), "SHEEP");
    }

    #[test]
    fn test_side_codes() {
        assert_eq!(TradeSide::from_code("BU"), TradeSide::Buy);
        assert_eq!(TradeSide::from_code("SD"), TradeSide::Sell);
        assert_eq!(TradeSide::from_code(""), TradeSide::Unknown);
    }

    #[test]
    fn test_report_defaults_to_large_investors() {
        let tape = vec![
            trade("09:15:00", dec!(25000), 100, TradeSide::Buy),
            trade("09:16:00", dec!(25000), 5_000, TradeSide::Buy),
            trade("09:17:00", dec!(25000), 50_000, TradeSide::Sell),
        ];
        let report = build_report("HPG", tape, &[]);

        assert_eq!(report.classes, vec![InvestorClass::Wolf, InvestorClass::Shark]);
        assert_eq!(report.total_trades, 3);
        assert_eq!(report.details.len(), 2);
        assert!(report.details.iter().all(|t| t.investor != InvestorClass::Sheep));
    }

    #[test]
    fn test_report_pivots_volume_by_class_and_side() {
        let tape = vec![
            trade("09:15:00", dec!(25000), 5_000, TradeSide::Buy),
            trade("09:16:00", dec!(25000), 6_000, TradeSide::Sell),
            trade("09:17:00", dec!(25000), 7_000, TradeSide::Buy),
            trade("09:18:00", dec!(25000), 8_000, TradeSide::Unknown),
            trade("09:19:00", dec!(25000), 50_000, TradeSide::Sell),
        ];
        let report = build_report("HPG", tape, &[InvestorClass::Wolf, InvestorClass::Shark]);

        let wolf = &report.summary[0];
        assert_eq!(wolf.investor, InvestorClass::Wolf);
        assert_eq!(wolf.buy_volume, 12_000);
        assert_eq!(wolf.sell_volume, 6_000);
        assert_eq!(wolf.unknown_volume, 8_000);
        assert_eq!(wolf.trade_count, 4);
        assert_eq!(wolf.net_volume(), 6_000);

        let shark = &report.summary[1];
        assert_eq!(shark.investor, InvestorClass::Shark);
        assert_eq!(shark.sell_volume, 50_000);
        assert_eq!(shark.net_volume(), -50_000);
    }

    #[test]
    fn test_report_keeps_tape_order_and_dedups_classes() {
        let tape = vec![
            trade("09:17:00", dec!(10), 1, TradeSide::Buy),
            trade("09:15:00", dec!(10), 2, TradeSide::Sell),
        ];
        let report = build_report(
            "ABC",
            tape,
            &[InvestorClass::Sheep, InvestorClass::Sheep],
        );
        assert_eq!(report.classes, vec![InvestorClass::Sheep]);
        let times: Vec<_> = report.details.iter().map(|t| t.time.as_str()).collect();
        assert_eq!(times, vec!["09:17:00", "09:15:00"]);
        assert_eq!(report.summary.len(), 1);
    }
}
