use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use scraper::{CaseSensitivity, ElementRef};
use tracing::warn;

use crate::error::{IngestError, Result};
use crate::extract::{absolute_url, first_segment, non_empty, select_text, SelectorChain};
use crate::model::{MatchRecord, TeamRef, SCORE_TBD};
use crate::normalize::{format_score, infer_match_status, parse_day};
use crate::vlr_scraper::BASE_URL;

const MATCH_TIME_FORMAT: &str = "%I:%M %p";

struct Selectors {
    entries: SelectorChain,
    time: SelectorChain,
    eta: SelectorChain,
    teams: SelectorChain,
    team_name: SelectorChain,
    team_score: SelectorChain,
    event: SelectorChain,
}

impl Selectors {
    fn new() -> Result<Self> {
        Ok(Self {
            // Date headings and match rows, in document order.
            entries: SelectorChain::new(&["div.wf-label.mod-large, a.match-item"])?,
            time: SelectorChain::new(&["div.match-item-time"])?,
            eta: SelectorChain::new(&["div.match-item-eta"])?,
            teams: SelectorChain::new(&["div.match-item-vs div.match-item-vs-team"])?,
            team_name: SelectorChain::new(&[
                "div.match-item-vs-team-name div.text-of",
                "div.match-item-vs-team-name",
            ])?,
            team_score: SelectorChain::new(&["div.match-item-vs-team-score"])?,
            event: SelectorChain::new(&[
                "div.match-item-event.text-of",
                "div.match-item-event",
            ])?,
        })
    }
}

/// Parse the match list, keeping at most `limit` valid records.
///
/// Rows are grouped under date headings; the last heading seen dates every
/// row below it. Rows that fail to parse are skipped.
pub(crate) fn parse_matchlist(root: &ElementRef, limit: usize) -> Result<Vec<MatchRecord>> {
    let selectors = Selectors::new()?;
    let mut matches = Vec::new();
    let mut last_date: Option<NaiveDate> = None;

    for element in selectors.entries.all(root) {
        if matches.len() >= limit {
            break;
        }
        if element
            .value()
            .has_class("wf-label", CaseSensitivity::CaseSensitive)
        {
            last_date = parse_day(&select_text(&element));
            continue;
        }
        match parse_match_item(&selectors, &element, last_date) {
            Ok(item) => matches.push(item),
            Err(e) => warn!(error = %e, "skipping unparsable match item"),
        }
    }
    Ok(matches)
}

fn parse_match_item(
    selectors: &Selectors,
    element: &ElementRef,
    day: Option<NaiveDate>,
) -> Result<MatchRecord> {
    let href = element
        .value()
        .attr("href")
        .ok_or(IngestError::ElementNotFound {
            context: "match item href",
        })?;
    let id = first_segment(href).ok_or(IngestError::ElementNotFound {
        context: "match id in href",
    })?;

    let teams = selectors.teams.all(element);
    let [team1, team2] = teams.as_slice() else {
        return Err(IngestError::ElementNotFound {
            context: "two match item teams",
        });
    };
    let (team1_name, team1_score) = parse_team(selectors, team1)?;
    let (team2_name, team2_score) = parse_team(selectors, team2)?;
    let score = format_score(&team1_score, &team2_score);

    let time_text = selectors.time.text(element).unwrap_or_default();
    let eta_text = selectors.eta.text(element).unwrap_or_default();
    let status = infer_match_status(&format!("{time_text} {eta_text}"), &score);

    let date = day.and_then(|d| {
        NaiveTime::parse_from_str(&time_text, MATCH_TIME_FORMAT)
            .ok()
            .map(|t| NaiveDateTime::new(d, t))
    });

    let event_name = selectors
        .event
        .first(element)
        .and_then(|e| e.text().map(str::trim).filter(|t| !t.is_empty()).last())
        .map(str::to_string);

    Ok(MatchRecord {
        id,
        team1: Some(TeamRef {
            id: None,
            name: team1_name,
        }),
        team2: Some(TeamRef {
            id: None,
            name: team2_name,
        }),
        date,
        date_text: time_text,
        event_id: None,
        event_name,
        status,
        score,
        match_url: Some(absolute_url(BASE_URL, href)),
        match_format: None,
        maps: None,
    })
}

/// Team name and raw score cell of one side of a match row.
fn parse_team(selectors: &Selectors, team: &ElementRef) -> Result<(String, String)> {
    let name = selectors
        .team_name
        .leading_text(team)
        .and_then(non_empty)
        .ok_or(IngestError::ElementNotFound {
            context: "match item team name",
        })?;
    let score = selectors
        .team_score
        .text(team)
        .unwrap_or_else(|| SCORE_TBD.to_string());
    Ok((name, score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::with_document;
    use crate::model::MatchStatus;

    fn item(id: u32, team1: &str, team2: &str, time: &str, scores: (&str, &str)) -> String {
        format!(
            r#"<a href="/{id}/{t1}-vs-{t2}" class="wf-module-item match-item">
                 <div class="match-item-time">{time}</div>
                 <div class="match-item-vs">
                   <div class="match-item-vs-team">
                     <div class="match-item-vs-team-name"><div class="text-of"><span class="flag mod-us"></span> {team1}</div></div>
                     <div class="match-item-vs-team-score">{s1}</div>
                   </div>
                   <div class="match-item-vs-team">
                     <div class="match-item-vs-team-name"><div class="text-of">{team2}</div></div>
                     <div class="match-item-vs-team-score">{s2}</div>
                   </div>
                 </div>
                 <div class="match-item-eta"><div class="ml-status">Upcoming</div></div>
                 <div class="match-item-event text-of">
                   <div class="match-item-event-series text-of">Playoffs</div>
                   Champions Tour 2025
                 </div>
               </a>"#,
            t1 = team1.to_lowercase(),
            t2 = team2.to_lowercase(),
            s1 = scores.0,
            s2 = scores.1,
        )
    }

    fn page(items: &[String]) -> String {
        format!(
            r#"<html><body><div id="wrapper">
                 <div class="wf-label mod-large">Thu, April 17, 2025 <span class="wf-tag">Today</span></div>
                 <div class="wf-card">{}</div>
               </div></body></html>"#,
            items.join("\n")
        )
    }

    #[test]
    fn test_parse_matchlist_skips_malformed_item() {
        let mut items: Vec<String> = (1..=10)
            .map(|i| item(400_000 + i, "Sentinels", "G2", "7:00 PM", ("–", "–")))
            .collect();
        // No second team: unparsable.
        items[4] = r#"<a href="/400005/broken" class="wf-module-item match-item">
                        <div class="match-item-vs"><div class="match-item-vs-team">
                          <div class="match-item-vs-team-name"><div class="text-of">Solo</div></div>
                        </div></div>
                      </a>"#
            .to_string();

        let matches = with_document(&page(&items), |root| parse_matchlist(root, 50)).unwrap();
        assert_eq!(matches.len(), 9);
        assert!(matches.iter().all(|m| m.id != "400005"));
    }

    #[test]
    fn test_parse_matchlist_fields() {
        let items = vec![
            item(353177, "Sentinels", "G2", "7:00 PM", ("2", "1")),
            item(353178, "Fnatic", "NRG", "LIVE", ("1", "0")),
            item(353179, "Paper Rex", "DRX", "9:00 PM", ("–", "–")),
        ];
        let matches = with_document(&page(&items), |root| parse_matchlist(root, 10)).unwrap();
        assert_eq!(matches.len(), 3);

        let first = &matches[0];
        assert_eq!(first.id, "353177");
        assert_eq!(first.team1.as_ref().map(|t| t.name.as_str()), Some("Sentinels"));
        assert_eq!(first.team2.as_ref().map(|t| t.name.as_str()), Some("G2"));
        assert_eq!(first.score, "2-1");
        assert_eq!(first.status, MatchStatus::Completed);
        assert_eq!(
            first.date.map(|d| d.to_string()).as_deref(),
            Some("2025-04-17 19:00:00")
        );
        assert_eq!(first.event_name.as_deref(), Some("Champions Tour 2025"));
        assert_eq!(
            first.match_url.as_deref(),
            Some("https://www.vlr.gg/353177/sentinels-vs-g2")
        );
        assert!(first.maps.is_none());

        assert_eq!(matches[1].status, MatchStatus::Live);
        assert_eq!(matches[2].status, MatchStatus::Upcoming);
        assert_eq!(matches[2].score, SCORE_TBD);
    }

    #[test]
    fn test_parse_matchlist_respects_limit() {
        let items: Vec<String> = (1..=5)
            .map(|i| item(i, "A", "B", "1:00 PM", ("–", "–")))
            .collect();
        let matches = with_document(&page(&items), |root| parse_matchlist(root, 2)).unwrap();
        assert_eq!(matches.len(), 2);
    }
}
