//! Catalog and price visibility tiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-wide setting for what anonymous visitors may see.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreAccessMode {
    Closed,
    #[default]
    Partial,
    Open,
}

impl FromStr for StoreAccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "closed" => Ok(Self::Closed),
            "partial" => Ok(Self::Partial),
            "open" => Ok(Self::Open),
            other => Err(format!("unknown access mode '{other}'")),
        }
    }
}

impl fmt::Display for StoreAccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::Partial => f.write_str("partial"),
            Self::Open => f.write_str("open"),
        }
    }
}

/// What a caller may see.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visibility {
    pub show_catalog: bool,
    pub show_prices: bool,
}

impl Visibility {
    /// Authenticated callers always see everything; anonymous ones get the
    /// store's configured tier.
    pub const fn resolve(mode: StoreAccessMode, is_authenticated: bool) -> Self {
        if is_authenticated {
            return Self { show_catalog: true, show_prices: true };
        }
        match mode {
            StoreAccessMode::Closed => Self { show_catalog: false, show_prices: false },
            StoreAccessMode::Partial => Self { show_catalog: true, show_prices: false },
            StoreAccessMode::Open => Self { show_catalog: true, show_prices: true },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_tiers() {
        assert_eq!(Visibility::resolve(StoreAccessMode::Closed, false), Visibility { show_catalog: false, show_prices: false });
        assert_eq!(Visibility::resolve(StoreAccessMode::Partial, false), Visibility { show_catalog: true, show_prices: false });
        assert_eq!(Visibility::resolve(StoreAccessMode::Open, false), Visibility { show_catalog: true, show_prices: true });
    }

    #[test]
    fn test_authenticated_always_open() {
        for mode in [StoreAccessMode::Closed, StoreAccessMode::Partial, StoreAccessMode::Open] {
            assert_eq!(Visibility::resolve(mode, true), Visibility { show_catalog: true, show_prices: true });
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("OPEN".parse::<StoreAccessMode>().unwrap(), StoreAccessMode::Open);
        assert_eq!(" closed ".parse::<StoreAccessMode>().unwrap(), StoreAccessMode::Closed);
        assert!("members".parse::<StoreAccessMode>().is_err());
    }
}
