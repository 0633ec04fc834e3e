//! Identifier types
//!
//! Two identities exist for every figure:
//! - [`CorrelationKey`]: generated on the client, stable for the figure's whole
//!   lifetime in the form
//! - [`ServerId`]: assigned by the backend on first successful save

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;
use uuid::Uuid;

/// Client-generated correlation key (uuid v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationKey(pub Uuid);

impl CorrelationKey {
    /// Generate a fresh key
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Server-assigned identifier
///
/// The backend hands ids out as strings holding integers. They are kept as
/// strings on the wire; [`ServerId::numeric_order`] gives the ordering used
/// when placing newly created figures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub String);

impl ServerId {
    /// Create from anything string-like
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare two ids as numeric strings
    ///
    /// Both numeric: integer comparison. Numeric ids sort before
    /// non-numeric ones, and non-numeric ids compare lexically.
    #[must_use]
    pub fn numeric_order(&self, other: &Self) -> Ordering {
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<u64> for ServerId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_keys_are_unique() {
        let a = CorrelationKey::new();
        let b = CorrelationKey::new();
        assert_ne!(a, b);
    }

    #[test]
    fn correlation_key_parse_roundtrip() {
        let key = CorrelationKey::new();
        let parsed: CorrelationKey = key.to_string().parse().unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn numeric_order_compares_as_integers() {
        let nine = ServerId::from("9");
        let ten = ServerId::from("10");
        assert_eq!(nine.numeric_order(&ten), Ordering::Less);
        // Lexical order would say otherwise
        assert!(nine.0 > ten.0);
    }

    #[test]
    fn numeric_ids_sort_before_others() {
        let numeric = ServerId::from("42");
        let other = ServerId::from("tmp-1");
        assert_eq!(numeric.numeric_order(&other), Ordering::Less);
        assert_eq!(other.numeric_order(&numeric), Ordering::Greater);
    }
}
