//! Slot cardinalities.
//!
//! Three multiplicities, ordered from most to least restrictive:
//! [`Cardinality::SingleValue`] < [`Cardinality::UniqueTypes`] < [`Cardinality::Free`].
//! Merging two inherited slot definitions keeps the more restrictive one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How many values, and of which value-types, a slot may hold.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    /// At most one value.
    SingleValue,
    /// Any number of values, but no two with the same value-type.
    UniqueTypes,
    /// Any combination; exact duplicates collapse.
    #[default]
    Free,
}

impl Cardinality {
    /// The more restrictive of two cardinalities.
    pub fn merge(self, other: Self) -> Self {
        self.min(other)
    }

    /// Merge an arbitrary set, starting from [`Cardinality::Free`].
    pub fn merge_all(cardinalities: impl IntoIterator<Item = Self>) -> Self {
        cardinalities.into_iter().fold(Self::Free, Self::merge)
    }

    pub fn single_value(self) -> bool {
        self == Self::SingleValue
    }

    pub fn unique_types(self) -> bool {
        self == Self::UniqueTypes
    }
}

impl FromStr for Cardinality {
    type Err = ConfigError;

    /// Accepts the display labels and their short forms, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single-value" | "single" => Ok(Self::SingleValue),
            "unique-types" | "unique" => Ok(Self::UniqueTypes),
            "free" => Ok(Self::Free),
            _ => Err(ConfigError::Cardinality {
                label: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleValue => write!(f, "single-value"),
            Self::UniqueTypes => write!(f, "unique-types"),
            Self::Free => write!(f, "free"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_takes_more_restrictive() {
        assert_eq!(
            Cardinality::SingleValue.merge(Cardinality::Free),
            Cardinality::SingleValue
        );
        assert_eq!(
            Cardinality::Free.merge(Cardinality::UniqueTypes),
            Cardinality::UniqueTypes
        );
        assert_eq!(
            Cardinality::UniqueTypes.merge(Cardinality::SingleValue),
            Cardinality::SingleValue
        );
    }

    #[test]
    fn merge_all_defaults_to_free() {
        assert_eq!(Cardinality::merge_all([]), Cardinality::Free);
        assert_eq!(
            Cardinality::merge_all([Cardinality::Free, Cardinality::UniqueTypes]),
            Cardinality::UniqueTypes
        );
    }

    #[test]
    fn parse_accepts_short_labels() {
        assert_eq!("Single".parse::<Cardinality>().unwrap(), Cardinality::SingleValue);
        assert_eq!("unique".parse::<Cardinality>().unwrap(), Cardinality::UniqueTypes);
        assert!(matches!(
            "many".parse::<Cardinality>(),
            Err(ConfigError::Cardinality { label }) if label == "many"
        ));
    }

    #[test]
    fn display_labels_parse_back() {
        for cardinality in [Cardinality::SingleValue, Cardinality::UniqueTypes, Cardinality::Free] {
            assert_eq!(cardinality.to_string().parse::<Cardinality>().unwrap(), cardinality);
        }
    }
}
