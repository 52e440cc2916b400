//! The capability set every upstream source offers.
//!
//! Implementations do their work in fallible `try_*` functions and recover at
//! this boundary: a failure is logged and turned into an empty result, so a
//! drifting page template never takes a refresh job down with it.

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::model::{EventRecord, MatchRecord, PlayerRecord, TeamRecord};

#[async_trait]
pub trait Source: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Recent and upcoming matches, list-level depth (no maps).
    async fn get_matches(&self, limit: usize) -> Vec<MatchRecord>;

    async fn get_match_details(&self, match_id: &str) -> Option<MatchRecord>;

    async fn get_team_details(&self, team_id: &str) -> Option<TeamRecord>;

    async fn get_team_players(&self, _team_id: &str) -> Vec<PlayerRecord> {
        Vec::new()
    }

    async fn get_player_details(&self, _player_id: &str) -> Option<PlayerRecord> {
        None
    }

    async fn search_teams(&self, _query: &str, _limit: usize) -> Vec<TeamRecord> {
        Vec::new()
    }

    async fn search_players(&self, _query: &str, _limit: usize) -> Vec<PlayerRecord> {
        Vec::new()
    }

    async fn get_events(&self, _limit: usize) -> Vec<EventRecord> {
        Vec::new()
    }

    async fn get_event_details(&self, _event_id: &str) -> Option<EventRecord> {
        None
    }
}

/// Unwrap `result`, logging the failure and falling back to the empty value.
pub(crate) fn recovered<T: Default>(source: &str, operation: &str, result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(
                source,
                operation,
                kind = %e.kind(),
                error = %e,
                "extraction failed"
            );
            T::default()
        }
    }
}
