use scraper::ElementRef;
use tracing::warn;

use crate::error::{IngestError, Result};
use crate::extract::{id_after, non_empty, SelectorChain};
use crate::model::{PlayerRecord, TeamRecord};
use crate::vlr_scraper::BASE_URL;

/// Build the search URL for `query`, restricted to one result `kind`
/// (`"teams"` or `"players"`).
pub(crate) fn search_url(query: &str, kind: &str) -> Result<String> {
    let base = format!("{BASE_URL}/search/");
    reqwest::Url::parse_with_params(&base, &[("q", query), ("type", kind)])
        .map(String::from)
        .map_err(|e| IngestError::InvalidUrl {
            url: base,
            reason: e.to_string(),
        })
}

/// One search hit: the linked entity id and its display title.
fn parse_hit(item: &ElementRef, prefix: &str, title: &SelectorChain) -> Option<(String, String)> {
    let href = item
        .value()
        .attr("href")
        .map(str::to_string)
        .or_else(|| SelectorChain::new(&["a[href]"]).ok()?.attr(item, "href"))?;
    let id = id_after(&href, prefix)?;
    let name = title.leading_text(item).and_then(non_empty)?;
    Some((id, name))
}

pub(crate) fn parse_team_results(root: &ElementRef, limit: usize) -> Result<Vec<TeamRecord>> {
    let items = SelectorChain::new(&["a.search-item[href^='/team/']", ".search-item.team"])?;
    let title = SelectorChain::new(&[".search-item-title", ".search-item-text"])?;

    Ok(items
        .all(root)
        .iter()
        .filter_map(|item| {
            let hit = parse_hit(item, "/team/", &title);
            if hit.is_none() {
                warn!("skipping unparsable team search result");
            }
            hit
        })
        .take(limit)
        .map(|(id, name)| TeamRecord::new(id, name))
        .collect())
}

pub(crate) fn parse_player_results(root: &ElementRef, limit: usize) -> Result<Vec<PlayerRecord>> {
    let items = SelectorChain::new(&[
        "a.search-item[href^='/player/']",
        ".search-item.search-item-player",
    ])?;
    let title = SelectorChain::new(&[".search-item-title", ".search-item-text"])?;
    let subtitle = SelectorChain::new(&[".search-item-subtitle"])?;

    Ok(items
        .all(root)
        .iter()
        .filter_map(|item| {
            let Some((id, name)) = parse_hit(item, "/player/", &title) else {
                warn!("skipping unparsable player search result");
                return None;
            };
            let mut player = PlayerRecord::new(id, name);
            player.team_name = subtitle.text(item);
            Some(player)
        })
        .take(limit)
        .collect())
}
