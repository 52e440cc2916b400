use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::MatchStatus;

/// Score text stored when no numeric score is known yet.
pub const SCORE_TBD: &str = "TBD";

/// One side of a match, as far as the page identifies it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamRef {
    /// Stable team id; absent when the page only shows a name.
    pub id: Option<String>,
    pub name: String,
}

/// A match as recovered by the match list or match detail extractor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRecord {
    pub id: String,
    pub team1: Option<TeamRef>,
    pub team2: Option<TeamRef>,
    pub date: Option<NaiveDateTime>,
    /// Raw date/time text the status was inferred from.
    pub date_text: String,
    pub event_id: Option<String>,
    pub event_name: Option<String>,
    pub status: MatchStatus,
    pub score: String,
    pub match_url: Option<String>,
    pub match_format: Option<String>,
    /// `None` when the record comes from a list page and says nothing about
    /// maps; `Some` replaces the stored map set wholesale.
    pub maps: Option<Vec<MapRecord>>,
}

/// Statistics for one map of a match.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapRecord {
    pub map_name: Option<String>,
    pub team1_score: Option<i32>,
    pub team2_score: Option<i32>,
    pub team1_attack: Option<i32>,
    pub team1_defense: Option<i32>,
    pub team2_attack: Option<i32>,
    pub team2_defense: Option<i32>,
    /// Keyed by player name.
    pub player_stats: BTreeMap<String, PlayerMapStats>,
}

/// A single player's line on a map scoreboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerMapStats {
    pub agent: String,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    pub acs: i32,
    pub team: String,
}

/// A match row as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub id: String,
    pub team1_id: Option<String>,
    pub team2_id: Option<String>,
    pub date: Option<NaiveDateTime>,
    pub event_id: Option<String>,
    pub event_name: Option<String>,
    pub status: MatchStatus,
    pub score: String,
    pub match_url: Option<String>,
    pub match_format: Option<String>,
    pub last_updated: DateTime<Utc>,
}

/// A map statistics row, exclusively owned by its match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapStatistic {
    pub id: i64,
    pub match_id: String,
    pub map_name: Option<String>,
    pub team1_score: Option<i32>,
    pub team2_score: Option<i32>,
    pub team1_attack: Option<i32>,
    pub team1_defense: Option<i32>,
    pub team2_attack: Option<i32>,
    pub team2_defense: Option<i32>,
    pub player_stats: BTreeMap<String, PlayerMapStats>,
    pub last_updated: DateTime<Utc>,
}
