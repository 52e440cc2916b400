//! bo3.gg extractors: match list, match detail and team detail.
//!
//! bo3.gg renders most of its pages client-side, so the server-rendered
//! markup is thin and often empty. Whatever is present is parsed; an empty
//! page simply yields nothing.

use std::sync::Arc;

use async_trait::async_trait;
use itertools::Itertools;
use scraper::ElementRef;
use tracing::{debug, instrument, warn};

use crate::error::{IngestError, Result};
use crate::extract::{
    absolute_url, element_text, id_after, is_not_found_page, non_empty, with_document,
    SelectorChain,
};
use crate::fetcher::Fetcher;
use crate::model::{MapRecord, MatchRecord, PlayerRecord, TeamRecord, TeamRef, SCORE_TBD};
use crate::normalize::{format_score, infer_match_status, parse_date, slugify};
use crate::source::{recovered, Source};

const BASE_URL: &str = "https://bo3.gg";

const NAME: &str = "bo3";

/// Extractors for bo3.gg, the secondary source.
pub struct Bo3Source {
    fetcher: Arc<Fetcher>,
}

impl Bo3Source {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    async fn parse_page<T>(
        &self,
        url: &str,
        parse: impl FnOnce(&ElementRef) -> Result<T>,
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
        let url = format!("{BASE_URL}/matches/current");
        let matches = self
            .parse_page(&url, |root| parse_matchlist(root, limit))
            .await?;
        debug!(count = matches.len(), "parsed match list");
        Ok(matches)
    }

    async fn try_get_match_details(&self, match_id: &str) -> Result<MatchRecord> {
        let url = format!("{BASE_URL}/matches/{match_id}");
        self.parse_page(&url, |root| parse_match_detail(match_id, &url, root))
            .await
    }

    async fn try_get_team_details(&self, team_id: &str) -> Result<TeamRecord> {
        let url = format!("{BASE_URL}/teams/{team_id}");
        self.parse_page(&url, |root| parse_team(team_id, root))
            .await
    }
}

#[async_trait]
impl Source for Bo3Source {
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
}

fn team_ref(link: &ElementRef, name_chain: &SelectorChain) -> Option<TeamRef> {
    let name = name_chain
        .leading_text(link)
        .or_else(|| non_empty(element_text(link)))?;
    let id = link
        .value()
        .attr("href")
        .and_then(|href| id_after(href, "/teams/"))
        .unwrap_or_else(|| slugify(&name));
    Some(TeamRef { id: Some(id), name })
}

fn parse_matchlist(root: &ElementRef, limit: usize) -> Result<Vec<MatchRecord>> {
    let items = SelectorChain::new(&["a.c-global-match-link", "a[href^='/matches/']"])?;
    let teams = SelectorChain::new(&[".c-match-team", ".team"])?;
    let team_name = SelectorChain::new(&[".team-name", ".c-match-team__name"])?;
    let scores = SelectorChain::new(&[".c-match-score__value", ".score"])?;
    let status = SelectorChain::new(&[".c-match-status", ".match-status"])?;
    let time = SelectorChain::new(&["time[datetime]", "[data-time]"])?;
    let event = SelectorChain::new(&[".c-match-tournament", ".tournament-name"])?;

    let mut matches = Vec::new();
    for item in items.all(root) {
        if matches.len() >= limit {
            break;
        }
        let Some(id) = item
            .value()
            .attr("href")
            .and_then(|href| id_after(href, "/matches/"))
        else {
            warn!("skipping match item without id");
            continue;
        };
        let sides = teams.all(&item);
        let [t1, t2] = sides.as_slice() else {
            warn!(id = %id, "skipping match item without two teams");
            continue;
        };
        let (Some(team1), Some(team2)) = (team_ref(t1, &team_name), team_ref(t2, &team_name))
        else {
            warn!(id = %id, "skipping match item with unnamed team");
            continue;
        };

        let score_parts = scores.all(&item).iter().map(element_text).collect_vec();
        let score = match score_parts.as_slice() {
            [a, b] => format_score(a, b),
            _ => SCORE_TBD.to_string(),
        };
        let status_text = status.text(&item).unwrap_or_default();
        let date = time
            .attr(&item, "datetime")
            .or_else(|| time.attr(&item, "data-time"))
            .and_then(|t| parse_date(&t));

        matches.push(MatchRecord {
            match_url: Some(format!("{BASE_URL}/matches/{id}")),
            id,
            // List items name their teams but don't link them.
            team1: Some(TeamRef {
                id: None,
                ..team1
            }),
            team2: Some(TeamRef {
                id: None,
                ..team2
            }),
            date,
            status: infer_match_status(&status_text, &score),
            date_text: status_text,
            event_id: None,
            event_name: event.text(&item),
            score,
            match_format: None,
            maps: None,
        });
    }
    Ok(matches)
}

fn parse_match_detail(match_id: &str, url: &str, root: &ElementRef) -> Result<MatchRecord> {
    let team_links = SelectorChain::new(&[".c-match-header a[href^='/teams/']", "a[href^='/teams/']"])?;
    let team_name = SelectorChain::new(&[".c-match-team__name", ".team-name"])?;
    let scores = SelectorChain::new(&[".c-match-header .c-match-score__value", ".match-score span"])?;
    let status = SelectorChain::new(&[".c-match-header .c-match-status", ".match-status"])?;
    let time = SelectorChain::new(&[".c-match-header time[datetime]", "time[datetime]"])?;
    let event = SelectorChain::new(&["a[href^='/tournaments/']"])?;
    let format = SelectorChain::new(&[".c-match-format", ".match-format"])?;
    let maps = SelectorChain::new(&[".c-match-map", ".match-map"])?;
    let map_name = SelectorChain::new(&[".c-match-map__name", ".map-name"])?;
    let map_scores = SelectorChain::new(&[".c-match-map__score", ".map-score"])?;

    let links = team_links.all(root);
    let [l1, l2, ..] = links.as_slice() else {
        return Err(IngestError::ElementNotFound {
            context: "match teams",
        });
    };
    let team1 = team_ref(l1, &team_name).ok_or(IngestError::ElementNotFound {
        context: "first team name",
    })?;
    let team2 = team_ref(l2, &team_name).ok_or(IngestError::ElementNotFound {
        context: "second team name",
    })?;

    let parts = scores.all(root).iter().map(element_text).collect_vec();
    let score = match parts.as_slice() {
        [a, b, ..] => format_score(a, b),
        _ => SCORE_TBD.to_string(),
    };
    let status_text = status.text(root).unwrap_or_default();

    let event_link = event.first(root);
    let event_id = event_link
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| id_after(href, "/tournaments/"));
    let event_name = event_link.and_then(|a| non_empty(element_text(&a)));

    let maps = maps
        .all(root)
        .iter()
        .filter_map(|m| {
            let name = map_name.leading_text(m);
            let values = map_scores
                .all(m)
                .iter()
                .map(|s| element_text(s).parse::<i32>().ok())
                .collect_vec();
            let (team1_score, team2_score) = match values.as_slice() {
                [a, b, ..] => (*a, *b),
                _ => (None, None),
            };
            if name.is_none() && team1_score.is_none() {
                warn!(id = match_id, "skipping unparsable map");
                return None;
            }
            Some(MapRecord {
                map_name: name,
                team1_score,
                team2_score,
                ..MapRecord::default()
            })
        })
        .collect_vec();

    Ok(MatchRecord {
        id: match_id.to_string(),
        team1: Some(team1),
        team2: Some(team2),
        date: time.attr(root, "datetime").and_then(|t| parse_date(&t)),
        status: infer_match_status(&status_text, &score),
        date_text: status_text,
        event_id,
        event_name,
        score,
        match_url: Some(url.to_string()),
        match_format: format
            .text(root)
            .map(|f| f.to_lowercase().replace(' ', "")),
        maps: Some(maps),
    })
}

fn parse_team(team_id: &str, root: &ElementRef) -> Result<TeamRecord> {
    let name = SelectorChain::new(&[".c-team-header h1", "h1"])?
        .leading_text(root)
        .and_then(non_empty)
        .ok_or(IngestError::ElementNotFound {
            context: "team name",
        })?;
    let players = SelectorChain::new(&["a[href^='/players/']"])?;
    let player_name = SelectorChain::new(&[".c-player-nickname", ".nickname"])?;

    let roster = players
        .all(root)
        .iter()
        .filter_map(|a| {
            let id = a
                .value()
                .attr("href")
                .and_then(|href| id_after(href, "/players/"))?;
            let name = player_name
                .leading_text(a)
                .or_else(|| non_empty(element_text(a)))?;
            let mut player = PlayerRecord::new(id, name);
            player.team_id = Some(team_id.to_string());
            Some(player)
        })
        .unique_by(|p| p.id.clone())
        .collect();

    Ok(TeamRecord {
        id: team_id.to_string(),
        name,
        region: SelectorChain::new(&[".c-team-country", ".team-country"])?.text(root),
        logo_url: SelectorChain::new(&[".c-team-header img", ".team-logo img"])?
            .attr(root, "src")
            .map(|src| absolute_url(BASE_URL, &src)),
        stats: Default::default(),
        roster,
    })
}
