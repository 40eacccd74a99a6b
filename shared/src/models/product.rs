//! Product catalog models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unit of measure a product is stocked in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Piece,
    Weight,
    Volume,
    Package,
    Box,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Piece => "piece",
            Unit::Weight => "weight",
            Unit::Volume => "volume",
            Unit::Package => "package",
            Unit::Box => "box",
        }
    }

    /// Weight and volume are measured; everything else is counted.
    pub fn allows_fraction(&self) -> bool {
        matches!(self, Unit::Weight | Unit::Volume)
    }

    /// Check that a quantity is expressible in this unit.
    pub fn accepts(&self, quantity: Decimal) -> bool {
        self.allows_fraction() || quantity.fract().is_zero()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "piece" => Ok(Unit::Piece),
            "weight" => Ok(Unit::Weight),
            "volume" => Ok(Unit::Volume),
            "package" => Ok(Unit::Package),
            "box" => Ok(Unit::Box),
            other => Err(format!("unknown unit '{}'", other)),
        }
    }
}

/// A product in the catalog.
///
/// `stock` is a cached projection of the stock ledger and is only ever
/// written by the ledger's apply step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub unique_code: String,
    pub name: String,
    pub unit: Unit,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub stock: Decimal,
    pub image: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            id: self.id,
            unique_code: self.unique_code.clone(),
            name: self.name.clone(),
            unit: self.unit,
            sell_price: self.sell_price,
            stock: self.stock,
            image: self.image.clone(),
        }
    }
}

/// Compact product view returned by barcode lookups
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: Uuid,
    pub unique_code: String,
    pub name: String,
    pub unit: Unit,
    pub sell_price: Decimal,
    pub stock: Decimal,
    pub image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_round_trips_through_str() {
        for unit in [Unit::Piece, Unit::Weight, Unit::Volume, Unit::Package, Unit::Box] {
            assert_eq!(unit.as_str().parse::<Unit>().unwrap(), unit);
        }
        assert!("crate".parse::<Unit>().is_err());
    }

    #[test]
    fn test_counted_units_reject_fractions() {
        let half = Decimal::new(5, 1);
        assert!(!Unit::Piece.accepts(half));
        assert!(!Unit::Box.accepts(half));
        assert!(Unit::Weight.accepts(half));
        assert!(Unit::Volume.accepts(half));
        assert!(Unit::Package.accepts(Decimal::from(3)));
    }
}
