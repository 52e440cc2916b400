//! Refresh jobs: extraction through the sources, persistence through the
//! sync engine.
//!
//! Sources never fail across their boundary and upsert failures are logged
//! per item, so a job only errors when the store cannot even be read.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::model::{Match, Team};
use crate::scheduler::{Job, JobRunner};
use crate::source::Source;
use crate::sync::SyncEngine;

/// The sources and the sync engine the jobs work with.
///
/// The primary source serves teams, players and events; match refreshes walk
/// every source in order.
pub struct Pipeline {
    primary: Arc<dyn Source>,
    secondary: Vec<Arc<dyn Source>>,
    sync: Arc<SyncEngine>,
}

impl Pipeline {
    pub fn new(sync: Arc<SyncEngine>, primary: Arc<dyn Source>) -> Self {
        Self {
            primary,
            secondary: Vec::new(),
            sync,
        }
    }

    /// Add a source consulted for matches after the primary one.
    pub fn with_source(mut self, source: Arc<dyn Source>) -> Self {
        self.secondary.push(source);
        self
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    fn sources(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        std::iter::once(&self.primary).chain(&self.secondary)
    }

    /// Walk each source's match list, fetch every listed match in detail and
    /// upsert it. Returns how many matches were stored.
    #[instrument(skip(self))]
    pub async fn refresh_recent_matches(&self, limit: usize) -> usize {
        let mut stored = 0;
        for source in self.sources() {
            let listed = source.get_matches(limit).await;
            debug!(source = source.name(), count = listed.len(), "match list fetched");

            for item in &listed {
                let Some(detail) = source.get_match_details(&item.id).await else {
                    debug!(source = source.name(), id = %item.id, "no detail, skipping match");
                    continue;
                };
                if self.sync.upsert_match(&detail).await.is_ok() {
                    stored += 1;
                }
            }
        }
        info!(stored, "recent matches refreshed");
        stored
    }

    /// Refresh one match on demand from the first source that has it.
    #[instrument(skip(self))]
    pub async fn refresh_match(&self, match_id: &str) -> Result<Option<Match>> {
        for source in self.sources() {
            if let Some(detail) = source.get_match_details(match_id).await {
                return self.sync.upsert_match(&detail).await.map(Some);
            }
        }
        Ok(None)
    }

    /// Refresh one team, its roster and each rostered player's detail page.
    /// `None` when the team could not be extracted at all.
    #[instrument(skip(self))]
    pub async fn refresh_team(&self, team_id: &str) -> Result<Option<Team>> {
        let Some(record) = self.primary.get_team_details(team_id).await else {
            return Ok(None);
        };
        let team = self.sync.upsert_team(&record).await?;

        for entry in &record.roster {
            let Some(mut player) = self.primary.get_player_details(&entry.id).await else {
                continue;
            };
            if player.team_id.is_none() {
                player.team_id = Some(team_id.to_string());
            }
            if let Err(e) = self.sync.upsert_player(&player).await {
                warn!(player = %player.id, error = %e, "player detail not stored");
            }
        }
        Ok(Some(team))
    }

    /// Refresh every stored team. Returns how many were refreshed.
    #[instrument(skip(self))]
    pub async fn refresh_teams_and_players(&self) -> Result<usize> {
        let teams = self.sync.store().list_teams().await?;
        let mut refreshed = 0;
        for team in &teams {
            match self.refresh_team(&team.id).await {
                Ok(Some(_)) => refreshed += 1,
                Ok(None) => debug!(id = %team.id, "team not found upstream"),
                Err(e) => warn!(id = %team.id, error = %e, "team refresh failed"),
            }
        }
        info!(refreshed, total = teams.len(), "teams refreshed");
        Ok(refreshed)
    }

    /// Upsert the primary source's event list. Returns how many were stored.
    #[instrument(skip(self))]
    pub async fn refresh_events(&self, limit: usize) -> usize {
        let mut stored = 0;
        for event in self.primary.get_events(limit).await {
            if self.sync.upsert_event(&event).await.is_ok() {
                stored += 1;
            }
        }
        info!(stored, "events refreshed");
        stored
    }
}

#[async_trait]
impl JobRunner for Pipeline {
    async fn run(&self, job: Job, limit: usize) -> Result<()> {
        match job {
            Job::FastRefresh | Job::ComprehensiveRefresh => {
                self.refresh_recent_matches(limit).await;
            }
            Job::TeamRefresh => {
                self.refresh_teams_and_players().await?;
                self.refresh_events(limit).await;
            }
        }
        self.sync.prune_locks();
        Ok(())
    }
}
