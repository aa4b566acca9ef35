//! Metric type library.
//!
//! Every metric value is stored as a neutral [`Decimal`]; the kind decides
//! how that decimal converts to a semantic value and which arithmetic is
//! legal on it. The set of kinds is closed: dispatch is a `match`, and
//! unknown kind tags are rejected at the parse boundary (see
//! [`crate::registry`] for the fail-closed string-tag path).

use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Validation failure in the metric type library.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricError {
    /// A value failed the kind-specific validation rules.
    #[error("invalid metric value: {0}")]
    InvalidValue(String),

    /// A kind tag did not resolve to a known metric kind.
    #[error("unsupported metric kind: {0}")]
    UnsupportedKind(String),
}

/// The measurement kind of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Non-negative integer counts (pages read, exercises done).
    Number,
    /// Durations, stored as decimal seconds.
    Time,
    /// A done/not-done flag; not combinable.
    Boolean,
    /// A value in `[0, 100]`.
    Percentage,
}

/// A typed metric value, the semantic side of a stored decimal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricValue {
    /// Integer count
    Number(i64),
    /// Duration (whole seconds)
    Time(Duration),
    /// Done / not done
    Boolean(bool),
    /// Percentage in `[0, 100]`
    Percentage(Decimal),
}

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

impl MetricKind {
    /// The lowercase tag this kind serializes as.
    pub fn tag(&self) -> &'static str {
        match self {
            MetricKind::Number => "number",
            MetricKind::Time => "time",
            MetricKind::Boolean => "boolean",
            MetricKind::Percentage => "percentage",
        }
    }

    /// The additive zero for this kind's raw representation.
    pub fn zero(&self) -> Decimal {
        Decimal::ZERO
    }

    /// Convert a stored decimal to the kind's semantic value.
    pub fn get(&self, raw: Decimal) -> Result<MetricValue, MetricError> {
        match self {
            MetricKind::Number => {
                check_non_negative(raw, "number")?;
                let n = raw.trunc().to_i64().ok_or_else(|| {
                    MetricError::InvalidValue(format!("number out of range: {raw}"))
                })?;
                Ok(MetricValue::Number(n))
            }
            MetricKind::Time => {
                check_non_negative(raw, "time")?;
                let secs = raw.trunc().to_u64().ok_or_else(|| {
                    MetricError::InvalidValue(format!("time out of range: {raw} seconds"))
                })?;
                Ok(MetricValue::Time(Duration::from_secs(secs)))
            }
            MetricKind::Boolean => {
                if raw == Decimal::ZERO {
                    Ok(MetricValue::Boolean(false))
                } else if raw == Decimal::ONE {
                    Ok(MetricValue::Boolean(true))
                } else {
                    Err(MetricError::InvalidValue(format!(
                        "boolean must be 0 or 1, got {raw}"
                    )))
                }
            }
            MetricKind::Percentage => {
                check_percentage(raw)?;
                Ok(MetricValue::Percentage(raw))
            }
        }
    }

    /// Convert a semantic value back to its stored decimal.
    pub fn put(&self, value: &MetricValue) -> Result<Decimal, MetricError> {
        match (self, value) {
            (MetricKind::Number, MetricValue::Number(n)) => {
                if *n < 0 {
                    return Err(MetricError::InvalidValue(format!("negative number: {n}")));
                }
                Ok(Decimal::from(*n))
            }
            // Durations are non-negative by construction; emit whole seconds
            // to match the truncation in `get`.
            (MetricKind::Time, MetricValue::Time(d)) => Ok(Decimal::from(d.as_secs())),
            (MetricKind::Boolean, MetricValue::Boolean(b)) => {
                Ok(if *b { Decimal::ONE } else { Decimal::ZERO })
            }
            (MetricKind::Percentage, MetricValue::Percentage(p)) => {
                check_percentage(*p)?;
                Ok(*p)
            }
            (kind, value) => Err(MetricError::InvalidValue(format!(
                "expected a {} value, got {value:?}",
                kind.tag()
            ))),
        }
    }

    /// Add two raw values under this kind's rules.
    pub fn add(&self, a: Decimal, b: Decimal) -> Result<Decimal, MetricError> {
        match self {
            MetricKind::Number => {
                check_non_negative(a, "number")?;
                check_non_negative(b, "number")?;
                Ok(a + b)
            }
            MetricKind::Time => {
                check_non_negative(a, "time")?;
                check_non_negative(b, "time")?;
                Ok(a + b)
            }
            MetricKind::Boolean => Err(MetricError::InvalidValue(
                "cannot add boolean values".to_string(),
            )),
            MetricKind::Percentage => {
                check_percentage(a)?;
                check_percentage(b)?;
                if a + b > HUNDRED {
                    return Err(MetricError::InvalidValue(format!(
                        "percentage sum exceeds 100: {a} + {b}"
                    )));
                }
                Ok(a + b)
            }
        }
    }

    /// Subtract `b` from `a` under this kind's rules.
    ///
    /// Number subtraction validates that both operands are non-negative but
    /// leaves the result unclamped; a negative result is a legal delta.
    pub fn subtract(&self, a: Decimal, b: Decimal) -> Result<Decimal, MetricError> {
        match self {
            MetricKind::Number => {
                check_non_negative(a, "number")?;
                check_non_negative(b, "number")?;
                Ok(a - b)
            }
            MetricKind::Time => {
                check_non_negative(a, "time")?;
                check_non_negative(b, "time")?;
                if a < b {
                    return Err(MetricError::InvalidValue(format!(
                        "time subtraction would be negative: {a} - {b}"
                    )));
                }
                Ok(a - b)
            }
            MetricKind::Boolean => Err(MetricError::InvalidValue(
                "cannot subtract boolean values".to_string(),
            )),
            MetricKind::Percentage => {
                check_percentage(a)?;
                check_percentage(b)?;
                if a - b < Decimal::ZERO {
                    return Err(MetricError::InvalidValue(format!(
                        "percentage subtraction would be negative: {a} - {b}"
                    )));
                }
                Ok(a - b)
            }
        }
    }

    /// Fold `add` over a sequence of raw values, starting from zero.
    /// Boolean values are never combinable, so boolean `sum` always fails.
    pub fn sum<I>(&self, values: I) -> Result<Decimal, MetricError>
    where
        I: IntoIterator<Item = Decimal>,
    {
        if *self == MetricKind::Boolean {
            return Err(MetricError::InvalidValue(
                "cannot sum boolean values".to_string(),
            ));
        }
        let mut total = self.zero();
        for value in values {
            total = self.add(total, value)?;
        }
        Ok(total)
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "number" => Ok(MetricKind::Number),
            "time" => Ok(MetricKind::Time),
            "boolean" => Ok(MetricKind::Boolean),
            "percentage" => Ok(MetricKind::Percentage),
            other => Err(MetricError::UnsupportedKind(other.to_string())),
        }
    }
}

fn check_non_negative(value: Decimal, what: &str) -> Result<(), MetricError> {
    if value < Decimal::ZERO {
        return Err(MetricError::InvalidValue(format!(
            "negative {what} value: {value}"
        )));
    }
    Ok(())
}

fn check_percentage(value: Decimal) -> Result<(), MetricError> {
    if value < Decimal::ZERO || value > HUNDRED {
        return Err(MetricError::InvalidValue(format!(
            "percentage out of range [0, 100]: {value}"
        )));
    }
    Ok(())
}
