use chrono::{DateTime, Utc};
use serde::Serialize;

use super::common::Stats;
use super::player::PlayerRecord;

/// A team as recovered by an extractor.
///
/// List and search extractors fill only `id` and `name`; the team detail
/// extractor adds metadata, stats and the embedded roster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamRecord {
    pub id: String,
    pub name: String,
    pub region: Option<String>,
    pub logo_url: Option<String>,
    pub stats: Stats,
    pub roster: Vec<PlayerRecord>,
}

impl TeamRecord {
    /// A minimal record carrying only the identifying fields.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            region: None,
            logo_url: None,
            stats: Stats::new(),
            roster: Vec::new(),
        }
    }
}

/// A team row as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub region: Option<String>,
    pub logo_url: Option<String>,
    pub stats: Stats,
    pub last_updated: DateTime<Utc>,
}
