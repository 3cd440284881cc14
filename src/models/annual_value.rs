use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Named annual purchase value ranges offered on the initiation form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum AnnualValueBucket {
    #[serde(rename = "0-100k")]
    UpTo100k,
    #[serde(rename = "100k-500k")]
    UpTo500k,
    #[serde(rename = "500k-1M")]
    UpTo1M,
    #[serde(rename = "1M+")]
    Over1M,
}

impl AnnualValueBucket {
    /// Representative amount stored for the range.
    pub fn ceiling(&self) -> Decimal {
        match self {
            AnnualValueBucket::UpTo100k => Decimal::from(100_000),
            AnnualValueBucket::UpTo500k => Decimal::from(500_000),
            AnnualValueBucket::UpTo1M => Decimal::from(1_000_000),
            AnnualValueBucket::Over1M => Decimal::from(2_000_000),
        }
    }

    /// Range a stored amount falls into. Boundaries are inclusive upper bounds.
    pub fn for_amount(amount: Decimal) -> Self {
        if amount <= Decimal::from(100_000) {
            AnnualValueBucket::UpTo100k
        } else if amount <= Decimal::from(500_000) {
            AnnualValueBucket::UpTo500k
        } else if amount <= Decimal::from(1_000_000) {
            AnnualValueBucket::UpTo1M
        } else {
            AnnualValueBucket::Over1M
        }
    }
}

/// Either a raw amount or one of the named ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum AnnualPurchaseValue {
    Bucket(AnnualValueBucket),
    Amount(Decimal),
}

impl AnnualPurchaseValue {
    pub fn normalize(&self) -> Decimal {
        match self {
            AnnualPurchaseValue::Bucket(bucket) => bucket.ceiling(),
            AnnualPurchaseValue::Amount(amount) => *amount,
        }
    }
}
