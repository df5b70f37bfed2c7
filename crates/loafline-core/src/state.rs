//! Inventory states and shelf-life parameters.
//!
//! Finished goods move through a closed set of storage states. Ambient stock
//! ages against `max_age_ambient`; freezing parks it against the (long)
//! frozen limit; thawing at a destination starts a fresh, shorter window.
//! Thawed is terminal: thawed stock is never refrozen and never shipped on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage state of aggregate inventory.
///
/// Invariants enforced by the planning engine:
/// - frozen inventory lives only at nodes with frozen storage;
/// - thawed is produced only by thaw-on-arrival at a breadroom accepting
///   frozen inbound, and resets the shelf-life window;
/// - freeze transitions happen only at frozen-buffer nodes;
/// - a unit occupies exactly one state on any date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageState {
    Ambient,
    Frozen,
    Thawed,
}

impl StorageState {
    /// All states, in canonical order.
    pub const ALL: [StorageState; 3] = [
        StorageState::Ambient,
        StorageState::Frozen,
        StorageState::Thawed,
    ];

    /// Whether demand can be satisfied out of this state.
    ///
    /// Frozen stock is never sold as-is; it must thaw first.
    pub fn satisfies_demand(&self) -> bool {
        matches!(self, StorageState::Ambient | StorageState::Thawed)
    }

    /// Short stable token used in composite serialization keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageState::Ambient => "ambient",
            StorageState::Frozen => "frozen",
            StorageState::Thawed => "thawed",
        }
    }

    /// Parse the token produced by [`StorageState::as_str`].
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "ambient" => Some(StorageState::Ambient),
            "frozen" => Some(StorageState::Frozen),
            "thawed" => Some(StorageState::Thawed),
            _ => None,
        }
    }
}

impl fmt::Display for StorageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shelf-life limits in days, by state, plus the delivery freshness floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShelfLifeParams {
    /// Maximum age of ambient stock, production to consumption (days).
    pub max_age_ambient: u32,
    /// Maximum age of frozen stock (days). Effectively long; windows longer
    /// than the horizon are not emitted as constraints.
    pub max_age_frozen: u32,
    /// Maximum age of thawed stock, thaw date to consumption (days).
    /// The window resets on thaw.
    pub max_age_thawed: u32,
    /// Minimum remaining shelf life a delivered unit must carry (days).
    pub min_remaining_at_delivery: u32,
}

impl ShelfLifeParams {
    /// Shelf-life cap for goods arriving in the given state.
    pub fn max_age(&self, state: StorageState) -> u32 {
        match state {
            StorageState::Ambient => self.max_age_ambient,
            StorageState::Frozen => self.max_age_frozen,
            StorageState::Thawed => self.max_age_thawed,
        }
    }

    /// Consumption window for demand satisfied out of the given state,
    /// after reserving the delivery freshness floor.
    pub fn demand_window(&self, state: StorageState) -> u32 {
        self.max_age(state)
            .saturating_sub(self.min_remaining_at_delivery)
    }
}

impl Default for ShelfLifeParams {
    fn default() -> Self {
        Self {
            max_age_ambient: 17,
            max_age_frozen: 120,
            max_age_thawed: 14,
            min_remaining_at_delivery: 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_tokens_round_trip() {
        for state in StorageState::ALL {
            assert_eq!(StorageState::parse(state.as_str()), Some(state));
        }
        assert_eq!(StorageState::parse("fresh"), None);
    }

    #[test]
    fn test_demand_eligibility() {
        assert!(StorageState::Ambient.satisfies_demand());
        assert!(StorageState::Thawed.satisfies_demand());
        assert!(!StorageState::Frozen.satisfies_demand());
    }

    #[test]
    fn test_demand_window_reserves_freshness_floor() {
        let params = ShelfLifeParams::default();
        assert_eq!(params.demand_window(StorageState::Ambient), 10);
        assert_eq!(params.demand_window(StorageState::Thawed), 7);
    }

    #[test]
    fn test_demand_window_saturates() {
        let params = ShelfLifeParams {
            max_age_ambient: 5,
            min_remaining_at_delivery: 9,
            ..ShelfLifeParams::default()
        };
        assert_eq!(params.demand_window(StorageState::Ambient), 0);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&StorageState::Ambient).unwrap();
        assert_eq!(json, "\"ambient\"");
    }
}
