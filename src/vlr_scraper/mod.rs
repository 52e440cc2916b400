//! vlr.gg extractors.
//!
//! Every page is fetched through the shared [`Fetcher`] and parsed
//! synchronously, so no parsed document is ever held across an await point.

pub(crate) mod events;
pub(crate) mod match_detail;
pub(crate) mod matchlist;
pub(crate) mod player;
pub(crate) mod search;
pub(crate) mod team;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::{IngestError, Result};
use crate::extract::{is_not_found_page, with_document};
use crate::fetcher::Fetcher;
use crate::model::{EventRecord, MatchRecord, PlayerRecord, TeamRecord};
use crate::normalize::title_case;
use crate::source::{recovered, Source};

pub(crate) const BASE_URL: &str = "https://www.vlr.gg";

const NAME: &str = "vlr";

/// How many search hits to consider when a team page has to be found by name.
const TEAM_SEARCH_LIMIT: usize = 5;

/// Extractors for vlr.gg, the primary source.
pub struct VlrSource {
    fetcher: Arc<Fetcher>,
}

impl VlrSource {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetch a page and run `parse` over it, mapping the soft 404 page to
    /// [`IngestError::PageNotFound`].
    async fn parse_page<T>(
        &self,
        url: &str,
        parse: impl FnOnce(&scraper::ElementRef) -> Result<T>,
    ) -> Result<T> {
        let body = self.fetcher.fetch(url).await?;
        with_document(&body, |root| {
            if is_not_found_page(root) {
                return Err(IngestError::PageNotFound {
                    url: url.to_owned(),
                });
            }
            parse(root)
        })
    }

    async fn try_get_matches(&self, limit: usize) -> Result<Vec<MatchRecord>> {
        let url = format!("{BASE_URL}/matches");
        let matches = self
            .parse_page(&url, |root| matchlist::parse_matchlist(root, limit))
            .await?;
        debug!(count = matches.len(), "parsed match list");
        Ok(matches)
    }

    async fn try_get_match_details(&self, match_id: &str) -> Result<MatchRecord> {
        let url = format!("{BASE_URL}/{match_id}");
        let record = self
            .parse_page(&url, |root| {
                match_detail::parse_match_detail(match_id, &url, root)
            })
            .await?;
        debug!(
            id = match_id,
            maps = record.maps.as_ref().map_or(0, Vec::len),
            "parsed match detail"
        );
        Ok(record)
    }

    async fn try_get_team_details(&self, team_id: &str) -> Result<TeamRecord> {
        let url = format!("{BASE_URL}/team/{team_id}");
        match self
            .parse_page(&url, |root| team::parse_team(team_id, root))
            .await
        {
            Err(e) if e.is_not_found() => self.find_team_by_name(team_id).await,
            result => result,
        }
    }

    /// Look a team up by its id read as a name (`"team-liquid"` -> `"team liquid"`)
    /// and parse the first hit's page under the original id. Without hits the
    /// result is a minimal record so callers still get the identifying fields.
    async fn find_team_by_name(&self, team_id: &str) -> Result<TeamRecord> {
        let query = team_id.replace('-', " ");
        let hits = self.try_search_teams(&query, TEAM_SEARCH_LIMIT).await?;
        let Some(hit) = hits.first() else {
            debug!(id = team_id, "no search hits, using minimal team record");
            return Ok(TeamRecord::new(team_id, title_case(team_id)));
        };

        let url = format!("{BASE_URL}/team/{}", hit.id);
        debug!(id = team_id, found = %hit.id, "team found through search");
        self.parse_page(&url, |root| team::parse_team(team_id, root))
            .await
    }

    async fn try_get_team_players(&self, team_id: &str) -> Result<Vec<PlayerRecord>> {
        let url = format!("{BASE_URL}/team/{team_id}");
        let players = self
            .parse_page(&url, |root| team::parse_team_players(team_id, root))
            .await?;
        debug!(id = team_id, count = players.len(), "parsed team players");
        Ok(players)
    }

    async fn try_get_player_details(&self, player_id: &str) -> Result<Option<PlayerRecord>> {
        let url = format!("{BASE_URL}/player/{player_id}");
        self.parse_page(&url, |root| player::parse_player(player_id, root))
            .await
    }

    async fn try_search_teams(&self, query: &str, limit: usize) -> Result<Vec<TeamRecord>> {
        let url = search::search_url(query, "teams")?;
        self.parse_page(&url, |root| search::parse_team_results(root, limit))
            .await
    }

    async fn try_search_players(&self, query: &str, limit: usize) -> Result<Vec<PlayerRecord>> {
        let url = search::search_url(query, "players")?;
        self.parse_page(&url, |root| search::parse_player_results(root, limit))
            .await
    }

    async fn try_get_events(&self, limit: usize) -> Result<Vec<EventRecord>> {
        let url = format!("{BASE_URL}/events");
        let today = chrono::Utc::now().date_naive();
        let events = self
            .parse_page(&url, |root| events::parse_events(root, limit, today))
            .await?;
        debug!(count = events.len(), "parsed event list");
        Ok(events)
    }

    async fn try_get_event_details(&self, event_id: &str) -> Result<EventRecord> {
        let url = format!("{BASE_URL}/event/{event_id}");
        let today = chrono::Utc::now().date_naive();
        self.parse_page(&url, |root| {
            events::parse_event_detail(event_id, &url, root, today)
        })
        .await
    }
}

#[async_trait]
impl Source for VlrSource {
    fn name(&self) -> &'static str {
        NAME
    }

    #[instrument(skip(self))]
    async fn get_matches(&self, limit: usize) -> Vec<MatchRecord> {
        recovered(NAME, "get_matches", self.try_get_matches(limit).await)
    }

    #[instrument(skip(self))]
    async fn get_match_details(&self, match_id: &str) -> Option<MatchRecord> {
        recovered(
            NAME,
            "get_match_details",
            self.try_get_match_details(match_id).await.map(Some),
        )
    }

    #[instrument(skip(self))]
    async fn get_team_details(&self, team_id: &str) -> Option<TeamRecord> {
        recovered(
            NAME,
            "get_team_details",
            self.try_get_team_details(team_id).await.map(Some),
        )
    }

    #[instrument(skip(self))]
    async fn get_team_players(&self, team_id: &str) -> Vec<PlayerRecord> {
        recovered(
            NAME,
            "get_team_players",
            self.try_get_team_players(team_id).await,
        )
    }

    #[instrument(skip(self))]
    async fn get_player_details(&self, player_id: &str) -> Option<PlayerRecord> {
        recovered(
            NAME,
            "get_player_details",
            self.try_get_player_details(player_id).await,
        )
    }

    #[instrument(skip(self))]
    async fn search_teams(&self, query: &str, limit: usize) -> Vec<TeamRecord> {
        recovered(
            NAME,
            "search_teams",
            self.try_search_teams(query, limit).await,
        )
    }

    #[instrument(skip(self))]
    async fn search_players(&self, query: &str, limit: usize) -> Vec<PlayerRecord> {
        recovered(
            NAME,
            "search_players",
            self.try_search_players(query, limit).await,
        )
    }

    #[instrument(skip(self))]
    async fn get_events(&self, limit: usize) -> Vec<EventRecord> {
        recovered(NAME, "get_events", self.try_get_events(limit).await)
    }

    #[instrument(skip(self))]
    async fn get_event_details(&self, event_id: &str) -> Option<EventRecord> {
        recovered(
            NAME,
            "get_event_details",
            self.try_get_event_details(event_id).await.map(Some),
        )
    }
}
