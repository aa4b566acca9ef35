//! Metric kind registry.
//!
//! Maps a stored kind tag to its metric library behavior. Unknown tags
//! resolve to a sentinel whose every operation fails with
//! [`MetricError::UnsupportedKind`] — fail-closed rather than a silent
//! fallback, so records carrying a stale tag surface the problem at the
//! first arithmetic attempt instead of corrupting a total.

use rust_decimal::Decimal;

use crate::metric::{MetricError, MetricKind, MetricValue};

/// Resolve a kind tag to its behavior.
pub fn resolve(tag: &str) -> ResolvedKind {
    match tag.parse::<MetricKind>() {
        Ok(kind) => ResolvedKind::Supported(kind),
        Err(_) => ResolvedKind::Unsupported(tag.to_string()),
    }
}

/// Outcome of resolving a kind tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedKind {
    /// A known kind; operations delegate to the metric library.
    Supported(MetricKind),
    /// An unknown tag; every operation fails.
    Unsupported(String),
}

impl ResolvedKind {
    /// The resolved kind, or `UnsupportedKind` for the sentinel.
    pub fn kind(&self) -> Result<MetricKind, MetricError> {
        match self {
            ResolvedKind::Supported(kind) => Ok(*kind),
            ResolvedKind::Unsupported(tag) => Err(MetricError::UnsupportedKind(tag.clone())),
        }
    }

    /// Convert a stored decimal to a typed value.
    pub fn get(&self, raw: Decimal) -> Result<MetricValue, MetricError> {
        self.kind()?.get(raw)
    }

    /// Convert a typed value to its stored decimal.
    pub fn put(&self, value: &MetricValue) -> Result<Decimal, MetricError> {
        self.kind()?.put(value)
    }

    /// Add two raw values.
    pub fn add(&self, a: Decimal, b: Decimal) -> Result<Decimal, MetricError> {
        self.kind()?.add(a, b)
    }

    /// Subtract two raw values.
    pub fn subtract(&self, a: Decimal, b: Decimal) -> Result<Decimal, MetricError> {
        self.kind()?.subtract(a, b)
    }

    /// Sum a sequence of raw values.
    pub fn sum<I>(&self, values: I) -> Result<Decimal, MetricError>
    where
        I: IntoIterator<Item = Decimal>,
    {
        self.kind()?.sum(values)
    }
}
