use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;
use scraper::ElementRef;
use tracing::warn;

use crate::error::{IngestError, Result};
use crate::extract::{element_text, id_after, non_empty, SelectorChain};
use crate::model::{MapRecord, MatchRecord, PlayerMapStats, TeamRef, SCORE_TBD};
use crate::normalize::{format_score, infer_match_status, parse_date, slugify};

static SERIES_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bbo\s?(\d)\b").unwrap());
static LEADING_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+").unwrap());

struct Selectors {
    header: SelectorChain,
    team_links: SelectorChain,
    team_name: SelectorChain,
    date_ts: SelectorChain,
    date_text: SelectorChain,
    event_link: SelectorChain,
    event_name: SelectorChain,
    score_parts: SelectorChain,
    notes: SelectorChain,
    games: SelectorChain,
    map: MapSelectors,
}

struct MapSelectors {
    name: SelectorChain,
    teams: SelectorChain,
    score: SelectorChain,
    attack: SelectorChain,
    defense: SelectorChain,
    halves: SelectorChain,
    tables: SelectorChain,
    rows: SelectorChain,
    player_name: SelectorChain,
    agent: SelectorChain,
    stat_cells: SelectorChain,
    stat_value: SelectorChain,
}

impl Selectors {
    fn new() -> Result<Self> {
        Ok(Self {
            header: SelectorChain::new(&["div.match-header", ".match-header"])?,
            team_links: SelectorChain::new(&[
                "div.match-header-vs a.match-header-link",
                ".match-header-link",
            ])?,
            team_name: SelectorChain::new(&[".wf-title-med", ".match-header-link-name"])?,
            date_ts: SelectorChain::new(&[
                "div.match-header-date .moment-tz-convert[data-utc-ts]",
            ])?,
            date_text: SelectorChain::new(&["div.match-header-date", ".match-header-date"])?,
            event_link: SelectorChain::new(&["a.match-header-event"])?,
            event_name: SelectorChain::new(&[
                "a.match-header-event div div:first-child",
                ".match-header-event",
            ])?,
            score_parts: SelectorChain::new(&[
                "div.match-header-vs-score .js-spoiler span:not(.match-header-vs-score-colon)",
                "div.match-header-vs-score span:not(.match-header-vs-score-colon)",
            ])?,
            notes: SelectorChain::new(&[".match-header-vs-note"])?,
            games: SelectorChain::new(&["div.vm-stats-game:not([data-game-id='all'])"])?,
            map: MapSelectors {
                name: SelectorChain::new(&[
                    "div.vm-stats-game-header div.map div:first-child span",
                    ".map-name",
                ])?,
                teams: SelectorChain::new(&["div.vm-stats-game-header div.team"])?,
                score: SelectorChain::new(&["div.score", ".score"])?,
                attack: SelectorChain::new(&["span.mod-t"])?,
                defense: SelectorChain::new(&["span.mod-ct"])?,
                halves: SelectorChain::new(&[".mod-half"])?,
                tables: SelectorChain::new(&["table.wf-table-inset", "table"])?,
                rows: SelectorChain::new(&["tbody tr:has(td.mod-player)", "tr.st-stats"])?,
                player_name: SelectorChain::new(&[
                    "td.mod-player a div.text-of",
                    "td.mod-player div:first-child",
                    ".mod-player",
                ])?,
                agent: SelectorChain::new(&["td.mod-agents img", ".mod-agent img"])?,
                stat_cells: SelectorChain::new(&["td.mod-stat"])?,
                stat_value: SelectorChain::new(&["span.mod-both", "span"])?,
            },
        })
    }
}

/// Parse a match page into an enriched record including its map set.
pub(crate) fn parse_match_detail(
    match_id: &str,
    url: &str,
    root: &ElementRef,
) -> Result<MatchRecord> {
    let selectors = Selectors::new()?;
    let header = selectors
        .header
        .first(root)
        .ok_or(IngestError::ElementNotFound {
            context: "match header",
        })?;

    let links = selectors.team_links.all(&header);
    let [link1, link2, ..] = links.as_slice() else {
        return Err(IngestError::ElementNotFound {
            context: "match header team links",
        });
    };
    let team1 = parse_team_ref(&selectors, link1)?;
    let team2 = parse_team_ref(&selectors, link2)?;

    let date_text = selectors
        .date_text
        .text(&header)
        .unwrap_or_default();
    let date = selectors
        .date_ts
        .attr(&header, "data-utc-ts")
        .and_then(|ts| parse_date(&ts))
        .or_else(|| parse_date(&date_text));

    let event_id = selectors
        .event_link
        .attr(&header, "href")
        .and_then(|href| id_after(&href, "/event/"));
    let event_name = selectors.event_name.leading_text(&header);

    let parts = selectors
        .score_parts
        .all(&header)
        .iter()
        .map(element_text)
        .collect_vec();
    let score = match parts.as_slice() {
        [a, b] => format_score(a, b),
        _ => SCORE_TBD.to_string(),
    };

    let notes = selectors
        .notes
        .all(&header)
        .iter()
        .map(element_text)
        .collect_vec();
    let match_format = notes
        .iter()
        .find_map(|n| SERIES_FORMAT.captures(n))
        .map(|c| format!("bo{}", &c[1]));
    let status = infer_match_status(&format!("{date_text} {}", notes.join(" ")), &score);

    let maps = selectors
        .games
        .all(root)
        .iter()
        .filter_map(|game| match parse_map(&selectors.map, game, &team1, &team2) {
            Ok(map) => Some(map),
            Err(e) => {
                warn!(id = match_id, error = %e, "skipping unparsable map");
                None
            }
        })
        .collect_vec();

    Ok(MatchRecord {
        id: match_id.to_string(),
        team1: Some(team1),
        team2: Some(team2),
        date,
        date_text,
        event_id,
        event_name,
        status,
        score,
        match_url: Some(url.to_string()),
        match_format,
        maps: Some(maps),
    })
}

fn parse_team_ref(selectors: &Selectors, link: &ElementRef) -> Result<TeamRef> {
    let name = selectors
        .team_name
        .leading_text(link)
        .and_then(non_empty)
        .ok_or(IngestError::ElementNotFound {
            context: "match header team name",
        })?;
    let id = link
        .value()
        .attr("href")
        .and_then(|href| id_after(href, "/team/"))
        .unwrap_or_else(|| slugify(&name));
    Ok(TeamRef { id: Some(id), name })
}

fn parse_map(
    selectors: &MapSelectors,
    game: &ElementRef,
    team1: &TeamRef,
    team2: &TeamRef,
) -> Result<MapRecord> {
    let map_name = selectors.name.leading_text(game);

    let mut map = MapRecord {
        map_name,
        ..MapRecord::default()
    };

    let sides = selectors.teams.all(game);
    if let [side1, side2] = sides.as_slice() {
        map.team1_score = selectors.score.text(side1).and_then(|s| int_value(&s));
        map.team2_score = selectors.score.text(side2).and_then(|s| int_value(&s));
        map.team1_attack = selectors.attack.text(side1).and_then(|s| int_value(&s));
        map.team1_defense = selectors.defense.text(side1).and_then(|s| int_value(&s));
        map.team2_attack = selectors.attack.text(side2).and_then(|s| int_value(&s));
        map.team2_defense = selectors.defense.text(side2).and_then(|s| int_value(&s));
    } else {
        // Older layout: bare score and half cells in team order.
        let scores = selectors.score.all(game);
        if let [s1, s2, ..] = scores.as_slice() {
            map.team1_score = int_value(&element_text(s1));
            map.team2_score = int_value(&element_text(s2));
        }
        let halves = selectors.halves.all(game);
        if let [a1, d1, a2, d2, ..] = halves.as_slice() {
            map.team1_attack = int_value(&element_text(a1));
            map.team1_defense = int_value(&element_text(d1));
            map.team2_attack = int_value(&element_text(a2));
            map.team2_defense = int_value(&element_text(d2));
        }
    }

    if map.map_name.is_none() && map.team1_score.is_none() && map.team2_score.is_none() {
        return Err(IngestError::ElementNotFound {
            context: "map name or score",
        });
    }

    for (table, team) in selectors.tables.all(game).iter().zip([team1, team2]) {
        for row in selectors.rows.all(table) {
            if let Some((name, stats)) = parse_player_row(selectors, &row, &team.name) {
                map.player_stats.insert(name, stats);
            }
        }
    }

    Ok(map)
}

/// One scoreboard row. The stat columns are rating, ACS, kills, deaths,
/// assists, in that order; each cell shows the both-sides value first.
fn parse_player_row(
    selectors: &MapSelectors,
    row: &ElementRef,
    team: &str,
) -> Option<(String, PlayerMapStats)> {
    let name = selectors.player_name.leading_text(row).and_then(non_empty)?;
    let agent = selectors
        .agent
        .attr(row, "title")
        .or_else(|| selectors.agent.attr(row, "alt"))
        .unwrap_or_default();

    let cells = selectors.stat_cells.all(row);
    let stat = |index: usize| -> i32 {
        cells
            .get(index)
            .and_then(|cell| {
                selectors
                    .stat_value
                    .text(cell)
                    .or_else(|| non_empty(element_text(cell)))
            })
            .and_then(|t| int_value(&t))
            .unwrap_or_default()
    };

    Some((
        name,
        PlayerMapStats {
            agent,
            acs: stat(1),
            kills: stat(2),
            deaths: stat(3),
            assists: stat(4),
            team: team.to_string(),
        },
    ))
}

fn int_value(text: &str) -> Option<i32> {
    LEADING_INT
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
}
