use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};

/// Free-form statistics blob attached to teams and players.
///
/// Values are usually strings scraped verbatim from a stats panel, but nested
/// structures (e.g. a player's recent match history) are allowed.
pub type Stats = BTreeMap<String, serde_json::Value>;

/// Lifecycle state of a match, inferred from partial page signals.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MatchStatus {
    #[default]
    Upcoming,
    Live,
    Completed,
}

/// Lifecycle state of an event (tournament or league stage).
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EventStatus {
    #[default]
    Upcoming,
    Ongoing,
    Completed,
}
