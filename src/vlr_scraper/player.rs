use itertools::Itertools;
use scraper::ElementRef;
use serde_json::{json, Value};

use crate::error::Result;
use crate::extract::{
    absolute_url, element_text, first_segment, id_after, non_empty, select_text, title_prefix,
    SelectorChain,
};
use crate::model::{PlayerRecord, Stats};
use crate::vlr_scraper::BASE_URL;

/// Rows of recent matches kept in `stats.match_history`.
const MATCH_HISTORY_LIMIT: usize = 10;

/// Parse a player page. `None` when not even the player's name can be found.
pub(crate) fn parse_player(player_id: &str, root: &ElementRef) -> Result<Option<PlayerRecord>> {
    let name = SelectorChain::new(&[
        ".player-header h1.wf-title",
        ".player-header-name h2",
        ".wf-title",
        "h1.header-title",
    ])?
    .leading_text(root)
    .or_else(|| title_prefix(root, &[':']));
    let Some(name) = name else {
        return Ok(None);
    };

    let mut player = PlayerRecord::new(player_id, name);

    if let Some(team) = current_team(root)? {
        player.team_id = team
            .value()
            .attr("href")
            .and_then(|href| id_after(href, "/team/"));
        player.team_name = non_empty(select_text(&team));
    }

    player.role = SelectorChain::new(&[".player-role"])?.text(root);
    player.country = SelectorChain::new(&[".player-header div.ge-text-light", ".player-country"])?
        .all(root)
        .iter()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .last();
    player.image_url = SelectorChain::new(&[".player-header div.wf-avatar img"])?
        .attr(root, "src")
        .map(|src| absolute_url(BASE_URL, &src));
    player.agent_pool = parse_agent_pool(root)?;

    let mut stats = parse_header_stats(root)?;
    if let Some(real_name) = SelectorChain::new(&["h2.player-real-name"])?.text(root) {
        stats.insert("real_name".to_string(), Value::from(real_name));
    }
    stats.insert(
        "match_history".to_string(),
        Value::Array(parse_match_history(root)?),
    );
    player.stats = stats;

    Ok(Some(player))
}

/// The first entry under the "Current Teams" label, else the header team link.
fn current_team<'a>(root: &ElementRef<'a>) -> Result<Option<ElementRef<'a>>> {
    let labels = SelectorChain::new(&["h2.wf-label"])?;
    let team_links = SelectorChain::new(&["a.wf-module-item"])?;

    let from_section = labels
        .all(root)
        .into_iter()
        .find(|l| element_text(l).contains("Current Teams"))
        .and_then(|l| l.next_siblings().find_map(ElementRef::wrap))
        .and_then(|card| team_links.first(&card));

    Ok(from_section.or(SelectorChain::new(&[".player-header-team a"])?.first(root)))
}

fn parse_header_stats(root: &ElementRef) -> Result<Stats> {
    let items = SelectorChain::new(&[".player-header-stats-container .stat-item"])?;
    let label = SelectorChain::new(&[".stat-label"])?;
    let value = SelectorChain::new(&[".stat-value"])?;

    Ok(items
        .all(root)
        .iter()
        .filter_map(|item| {
            let label = label.text(item)?;
            let value = value.text(item)?;
            Some((label.to_lowercase(), Value::from(value)))
        })
        .collect())
}

/// Agents in the order the agent table lists them (most played first).
fn parse_agent_pool(root: &ElementRef) -> Result<Vec<String>> {
    let icons = SelectorChain::new(&["table.wf-table tbody tr td:first-child img"])?;
    Ok(icons
        .all(root)
        .iter()
        .filter_map(|img| {
            img.value()
                .attr("alt")
                .or_else(|| img.value().attr("title"))
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
        })
        .unique()
        .collect())
}

fn parse_match_history(root: &ElementRef) -> Result<Vec<Value>> {
    let rows = SelectorChain::new(&[".mod-table tbody tr"])?;
    let date = SelectorChain::new(&[".mod-date"])?;
    let event = SelectorChain::new(&[".mod-event"])?;
    let link = SelectorChain::new(&[".mod-match a"])?;
    let team1 = SelectorChain::new(&[".mod-team-a"])?;
    let team2 = SelectorChain::new(&[".mod-team-b"])?;
    let score = SelectorChain::new(&[".mod-score"])?;

    Ok(rows
        .all(root)
        .iter()
        .filter_map(|row| {
            let href = link.attr(row, "href")?;
            Some(json!({
                "date": date.text(row),
                "event": event.text(row),
                "match_id": first_segment(&href),
                "team1": team1.text(row),
                "team2": team2.text(row),
                "score": score.text(row),
            }))
        })
        .take(MATCH_HISTORY_LIMIT)
        .collect())
}
