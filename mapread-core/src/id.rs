use std::{fmt, num::ParseIntError, str::FromStr};

/// Opaque identifier naming one element in the store.
///
/// Identifiers are totally ordered so that a staged candidate set can be
/// emitted in a stable order.
///
/// # Examples
/// ```
/// use mapread_core::ElementId;
///
/// let id: ElementId = "42".parse()?;
/// assert_eq!(id, ElementId::new(42));
/// assert!("-1".parse::<ElementId>().is_err());
/// # Ok::<(), std::num::ParseIntError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ElementId(u64);

impl ElementId {
    /// Wrap a raw identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Return the raw identifier.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ElementId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ElementId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}
