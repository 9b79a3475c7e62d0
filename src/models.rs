// src/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

pub const SYMBOL_MAX_LEN: usize = 10;
pub const NOTE_MAX_LEN: usize = 200;
pub const USERNAME_MAX_LEN: usize = 150;
/// Largest price a form may carry; keeps profit/loss arithmetic in range.
pub const PRICE_MAX: i64 = 1_000_000_000_000;

/// A stored portfolio entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockEntry {
    pub id: i64,
    pub symbol: String,
    pub buy_price: Decimal,
    pub target1: Option<Decimal>,
    pub target2: Option<Decimal>,
    pub cut_loss: Option<Decimal>,
    pub note: Option<String>,
    /// Absent only on rows written before the column existed.
    pub created_at: Option<DateTime<Utc>>,
}

/// The mutable fields of a stock entry, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct StockInput {
    pub symbol: String,
    pub buy_price: Decimal,
    pub target1: Option<Decimal>,
    pub target2: Option<Decimal>,
    pub cut_loss: Option<Decimal>,
    pub note: Option<String>,
}

/// Raw add/edit form body. Every field arrives as text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockForm {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub buy_price: String,
    #[serde(default)]
    pub target1: String,
    #[serde(default)]
    pub target2: String,
    #[serde(default)]
    pub cut_loss: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} must be a number, got {value:?}")]
    NotANumber { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("{field} must be at most {max}")]
    TooLarge { field: &'static str, max: i64 },
}

impl StockForm {
    pub fn validate(&self) -> Result<StockInput, ValidationError> {
        let symbol = self.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(ValidationError::Required("symbol"));
        }
        if symbol.chars().count() > SYMBOL_MAX_LEN {
            return Err(ValidationError::TooLong {
                field: "symbol",
                max: SYMBOL_MAX_LEN,
            });
        }

        let buy_price = parse_price("buy_price", &self.buy_price)?
            .ok_or(ValidationError::Required("buy_price"))?;

        let note = match self.note.trim() {
            "" => None,
            n if n.chars().count() > NOTE_MAX_LEN => {
                return Err(ValidationError::TooLong {
                    field: "note",
                    max: NOTE_MAX_LEN,
                })
            }
            n => Some(n.to_string()),
        };

        Ok(StockInput {
            symbol,
            buy_price,
            target1: parse_price("target1", &self.target1)?,
            target2: parse_price("target2", &self.target2)?,
            cut_loss: parse_price("cut_loss", &self.cut_loss)?,
            note,
        })
    }
}

impl From<&StockEntry> for StockForm {
    fn from(entry: &StockEntry) -> Self {
        let text = |v: &Option<Decimal>| v.map(|d| d.to_string()).unwrap_or_default();
        StockForm {
            symbol: entry.symbol.clone(),
            buy_price: entry.buy_price.to_string(),
            target1: text(&entry.target1),
            target2: text(&entry.target2),
            cut_loss: text(&entry.cut_loss),
            note: entry.note.clone().unwrap_or_default(),
        }
    }
}

/// Empty text means "not set".
fn parse_price(field: &'static str, raw: &str) -> Result<Option<Decimal>, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let value = Decimal::from_str(raw).map_err(|_| ValidationError::NotANumber {
        field,
        value: raw.to_string(),
    })?;
    if value <= Decimal::ZERO {
        return Err(ValidationError::NotPositive(field));
    }
    if value > Decimal::from(PRICE_MAX) {
        return Err(ValidationError::TooLarge {
            field,
            max: PRICE_MAX,
        });
    }
    Ok(Some(value))
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
}

/// A stock entry enriched with live market context, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewRow {
    pub id: i64,
    pub symbol: String,
    pub buy_price: Decimal,
    pub latest_price: Option<Decimal>,
    pub profit_loss_pct: Option<Decimal>,
    pub target1: Option<Decimal>,
    pub target2: Option<Decimal>,
    pub cut_loss: Option<Decimal>,
    pub note: Option<String>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn form(symbol: &str, buy_price: &str) -> StockForm {
        StockForm {
            symbol: symbol.to_string(),
            buy_price: buy_price.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_minimal_form() {
        let input = form(" vnm ", "65.4").validate().unwrap();
        assert_eq!(input.symbol, "VNM");
        assert_eq!(input.buy_price, dec!(65.4));
        assert_eq!(input.target1, None);
        assert_eq!(input.target2, None);
        assert_eq!(input.cut_loss, None);
        assert_eq!(input.note, None);
    }

    #[test]
    fn test_validate_full_form() {
        let f = StockForm {
            symbol: "FPT".into(),
            buy_price: "100".into(),
            target1: "120".into(),
            target2: " 130.5 ".into(),
            cut_loss: "90".into(),
            note: "  long term  ".into(),
        };
        let input = f.validate().unwrap();
        assert_eq!(input.target1, Some(dec!(120)));
        assert_eq!(input.target2, Some(dec!(130.5)));
        assert_eq!(input.cut_loss, Some(dec!(90)));
        assert_eq!(input.note.as_deref(), Some("long term"));
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        assert_eq!(
            form("", "10").validate(),
            Err(ValidationError::Required("symbol"))
        );
        assert_eq!(
            form("ABC", "  ").validate(),
            Err(ValidationError::Required("buy_price"))
        );
    }

    #[test]
    fn test_validate_rejects_bad_numbers() {
        assert!(matches!(
            form("ABC", "ten").validate(),
            Err(ValidationError::NotANumber { field: "buy_price", .. })
        ));
        assert_eq!(
            form("ABC", "0").validate(),
            Err(ValidationError::NotPositive("buy_price"))
        );
        let mut f = form("ABC", "10");
        f.cut_loss = "-1".into();
        assert_eq!(f.validate(), Err(ValidationError::NotPositive("cut_loss")));
    }

    #[test]
    fn test_validate_rejects_out_of_range_prices() {
        assert_eq!(
            form("ABC", "1000000000000000000000000000").validate(),
            Err(ValidationError::TooLarge {
                field: "buy_price",
                max: PRICE_MAX
            })
        );
        let mut f = form("ABC", "10");
        f.target2 = "1000000000000.01".into();
        assert!(matches!(
            f.validate(),
            Err(ValidationError::TooLarge { field: "target2", .. })
        ));
        assert_eq!(
            form("ABC", &PRICE_MAX.to_string()).validate().unwrap().buy_price,
            Decimal::from(PRICE_MAX)
        );
    }

    #[test]
    fn test_validate_rejects_long_symbol_and_note() {
        assert!(matches!(
            form("ABCDEFGHIJK", "10").validate(),
            Err(ValidationError::TooLong { field: "symbol", .. })
        ));
        let mut f = form("ABC", "10");
        f.note = "x".repeat(NOTE_MAX_LEN + 1);
        assert!(matches!(
            f.validate(),
            Err(ValidationError::TooLong { field: "note", .. })
        ));
    }

    #[test]
    fn test_form_from_entry_prefills_fields() {
        let entry = StockEntry {
            id: 1,
            symbol: "HPG".into(),
            buy_price: dec!(27.5),
            target1: Some(dec!(30)),
            target2: None,
            cut_loss: Some(dec!(25)),
            note: None,
            created_at: None,
        };
        let f = StockForm::from(&entry);
        assert_eq!(f.buy_price, "27.5");
        assert_eq!(f.target1, "30");
        assert_eq!(f.target2, "");
        assert_eq!(f.note, "");
        assert_eq!(f.validate().unwrap().cut_loss, Some(dec!(25)));
    }
}
