use chrono::{DateTime, Utc};
use serde::Serialize;

use super::common::Stats;

/// A player as recovered by an extractor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerRecord {
    pub id: String,
    pub name: String,
    pub team_id: Option<String>,
    /// Display name of the current team, when the page shows one. Not stored.
    pub team_name: Option<String>,
    pub role: Option<String>,
    pub country: Option<String>,
    pub image_url: Option<String>,
    pub agent_pool: Vec<String>,
    pub stats: Stats,
}

impl PlayerRecord {
    /// A minimal record carrying only the identifying fields.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            team_id: None,
            team_name: None,
            role: None,
            country: None,
            image_url: None,
            agent_pool: Vec::new(),
            stats: Stats::new(),
        }
    }
}

/// A player row as persisted in the store.
///
/// `team_id` is a lookup reference only: players may briefly have no team.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub team_id: Option<String>,
    pub role: Option<String>,
    pub country: Option<String>,
    pub image_url: Option<String>,
    pub agent_pool: Vec<String>,
    pub stats: Stats,
    pub last_updated: DateTime<Utc>,
}
