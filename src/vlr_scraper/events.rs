use std::str::FromStr;

use chrono::NaiveDate;
use itertools::Itertools;
use scraper::ElementRef;
use tracing::warn;

use crate::error::{IngestError, Result};
use crate::extract::{absolute_url, element_text, first_segment, id_after, non_empty, SelectorChain};
use crate::model::{EventRecord, EventStatus};
use crate::normalize::{infer_event_status, parse_date_range};
use crate::vlr_scraper::BASE_URL;

/// Explicit status text wins; otherwise the status follows from the dates.
fn resolve_status(explicit: Option<String>, dates: &str, today: NaiveDate) -> EventStatus {
    explicit
        .and_then(|s| EventStatus::from_str(s.trim()).ok())
        .unwrap_or_else(|| infer_event_status(parse_date_range(dates), today))
}

/// Country code from a `flag mod-xx` icon.
fn flag_code(element: &ElementRef) -> Option<String> {
    element
        .value()
        .classes()
        .find_map(|c| c.strip_prefix("mod-"))
        .map(str::to_uppercase)
}

struct ListSelectors {
    items: SelectorChain,
    title: SelectorChain,
    status: SelectorChain,
    prize: SelectorChain,
    dates: SelectorChain,
    location: SelectorChain,
    flag: SelectorChain,
    thumb: SelectorChain,
}

impl ListSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            items: SelectorChain::new(&["a.event-item", ".event-item"])?,
            title: SelectorChain::new(&["div.event-item-title", ".event-item-title"])?,
            status: SelectorChain::new(&["span.event-item-desc-item-status"])?,
            prize: SelectorChain::new(&[".event-item-desc-item.mod-prize"])?,
            dates: SelectorChain::new(&[".event-item-desc-item.mod-dates"])?,
            location: SelectorChain::new(&[".event-item-desc-item.mod-location"])?,
            flag: SelectorChain::new(&[".event-item-desc-item.mod-location i.flag"])?,
            thumb: SelectorChain::new(&["div.event-item-thumb img", ".event-item-thumb img"])?,
        })
    }
}

/// Parse the event list, keeping at most `limit` valid records.
pub(crate) fn parse_events(
    root: &ElementRef,
    limit: usize,
    today: NaiveDate,
) -> Result<Vec<EventRecord>> {
    let selectors = ListSelectors::new()?;
    Ok(selectors
        .items
        .all(root)
        .iter()
        .filter_map(|item| match parse_event_item(&selectors, item, today) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "skipping unparsable event item");
                None
            }
        })
        .take(limit)
        .collect())
}

fn parse_event_item(
    selectors: &ListSelectors,
    item: &ElementRef,
    today: NaiveDate,
) -> Result<EventRecord> {
    let href = item
        .value()
        .attr("href")
        .map(str::to_string)
        .or_else(|| SelectorChain::new(&["a[href]"]).ok()?.attr(item, "href"))
        .ok_or(IngestError::ElementNotFound {
            context: "event item href",
        })?;
    let id = id_after(&href, "/event/").ok_or(IngestError::ElementNotFound {
        context: "event id in href",
    })?;
    let name = selectors
        .title
        .leading_text(item)
        .and_then(non_empty)
        .ok_or(IngestError::ElementNotFound {
            context: "event item title",
        })?;

    let dates = selectors.dates.leading_text(item).unwrap_or_default();
    let range = parse_date_range(&dates);
    let region = selectors
        .location
        .leading_text(item)
        .or_else(|| selectors.flag.first(item).and_then(|f| flag_code(&f)));

    Ok(EventRecord {
        id,
        name,
        region,
        start_date: range.start,
        end_date: range.end,
        prize_pool: selectors.prize.leading_text(item),
        status: resolve_status(selectors.status.text(item), &dates, today),
        event_url: Some(absolute_url(BASE_URL, &href)),
        logo_url: selectors
            .thumb
            .attr(item, "src")
            .map(|src| absolute_url(BASE_URL, &src)),
        match_ids: Vec::new(),
    })
}

/// Parse an event page, including the ids of the matches it lists.
pub(crate) fn parse_event_detail(
    event_id: &str,
    url: &str,
    root: &ElementRef,
    today: NaiveDate,
) -> Result<EventRecord> {
    let name = SelectorChain::new(&[".event-header h1.wf-title", ".wf-title"])?
        .leading_text(root)
        .and_then(non_empty)
        .ok_or(IngestError::ElementNotFound {
            context: "event title",
        })?;

    let dates = desc_value(root, "dates", ".event-desc-item-value.mod-dates")?.unwrap_or_default();
    let range = parse_date_range(&dates);
    let region = desc_value(root, "location", ".event-desc-item-value.mod-location")?;
    let prize_pool = desc_value(root, "prize", ".event-desc-item-value.mod-prize")?;
    let status = SelectorChain::new(&[".event-desc-item-value.mod-status", ".event-status"])?
        .text(root);

    let logo_url = SelectorChain::new(&[".event-header-thumb img", ".wf-avatar img"])?
        .attr(root, "src")
        .map(|src| absolute_url(BASE_URL, &src));

    let match_ids = SelectorChain::new(&["a.match-item", "a.bracket-item"])?
        .all(root)
        .iter()
        .filter_map(|a| a.value().attr("href").and_then(first_segment))
        .filter(|id| id.chars().all(|c| c.is_ascii_digit()))
        .unique()
        .collect();

    Ok(EventRecord {
        id: event_id.to_string(),
        name,
        region,
        start_date: range.start,
        end_date: range.end,
        prize_pool,
        status: resolve_status(status, &dates, today),
        event_url: Some(url.to_string()),
        logo_url,
        match_ids,
    })
}

/// Value of the header description item whose label mentions `label`, else
/// the first element matching `fallback`.
fn desc_value(root: &ElementRef, label: &str, fallback: &str) -> Result<Option<String>> {
    let items = SelectorChain::new(&[".event-desc-item"])?;
    let label_chain = SelectorChain::new(&[".event-desc-item-label"])?;
    let value_chain = SelectorChain::new(&[".event-desc-item-value"])?;

    let labelled = items.all(root).into_iter().find_map(|item| {
        let text = label_chain.text(&item)?;
        if text.to_lowercase().contains(label) {
            value_chain.first(&item).map(|v| element_text(&v))
        } else {
            None
        }
    });
    Ok(labelled
        .and_then(non_empty)
        .or_else(|| SelectorChain::new(&[fallback]).ok()?.text(root)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::with_document;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const EVENTS: &str = r#"<html><body><div class="events-container">
        <a class="wf-card mod-flex event-item" href="/event/2283/champions-tour-2025-masters">
          <div class="event-item-thumb"><img src="//owcdn.net/img/masters.png"></div>
          <div class="event-item-inner">
            <div class="event-item-title">Champions Tour 2025: Masters</div>
            <div class="event-item-desc-row">
              <div class="event-item-desc-item"><span class="event-item-desc-item-status mod-ongoing">ongoing</span></div>
              <div class="event-item-desc-item mod-prize">$1,000,000<div class="event-item-desc-item-label">Prize Pool</div></div>
              <div class="event-item-desc-item mod-dates">Apr 15 - Apr 30, 2025<div class="event-item-desc-item-label">Dates</div></div>
              <div class="event-item-desc-item mod-location"><i class="flag mod-th"></i></div>
            </div>
          </div>
        </a>
        <a class="wf-card mod-flex event-item" href="/event/2300/challengers-2025">
          <div class="event-item-inner">
            <div class="event-item-title">Challengers 2025</div>
            <div class="event-item-desc-item mod-dates">Jun 1 - Jun 20, 2025</div>
          </div>
        </a>
        <a class="wf-card mod-flex event-item" href="/events">
          <div class="event-item-title">Not an event</div>
        </a>
      </div></body></html>"#;

    #[test]
    fn test_parse_events() {
        let events = with_document(EVENTS, |root| parse_events(root, 10, day(2025, 4, 1))).unwrap();
        assert_eq!(events.len(), 2);

        let masters = &events[0];
        assert_eq!(masters.id, "2283");
        assert_eq!(masters.name, "Champions Tour 2025: Masters");
        assert_eq!(masters.status, EventStatus::Ongoing);
        assert_eq!(masters.prize_pool.as_deref(), Some("$1,000,000"));
        assert_eq!(masters.start_date, Some(day(2025, 4, 15)));
        assert_eq!(masters.end_date, Some(day(2025, 4, 30)));
        assert_eq!(masters.region.as_deref(), Some("TH"));
        assert_eq!(
            masters.logo_url.as_deref(),
            Some("https://owcdn.net/img/masters.png")
        );

        // No status text: inferred from the dates.
        assert_eq!(events[1].status, EventStatus::Upcoming);
        let later = with_document(EVENTS, |root| parse_events(root, 10, day(2025, 7, 1))).unwrap();
        assert_eq!(later[1].status, EventStatus::Completed);
    }

    #[test]
    fn test_parse_event_detail() {
        let page = r#"<html><body>
            <div class="event-header">
              <div class="event-header-thumb"><img src="/img/event.png"></div>
              <h1 class="wf-title">Champions Tour 2025: Masters</h1>
              <div class="event-desc-item"><div class="event-desc-item-label">Dates</div>
                <div class="event-desc-item-value">Apr 15 - 30, 2025</div></div>
              <div class="event-desc-item"><div class="event-desc-item-label">Prize pool</div>
                <div class="event-desc-item-value">$1,000,000 USD</div></div>
              <div class="event-desc-item"><div class="event-desc-item-label">Location</div>
                <div class="event-desc-item-value"><i class="flag mod-th"></i> Bangkok, Thailand</div></div>
            </div>
            <div class="wf-card event-group-container">
              <a class="wf-module-item match-item" href="/353177/sen-vs-g2">x</a>
              <a class="wf-module-item match-item" href="/353178/fnc-vs-nrg">y</a>
              <a class="wf-module-item match-item" href="/353177/sen-vs-g2">dup</a>
            </div>
          </body></html>"#;
        let event = with_document(page, |root| {
            parse_event_detail("2283", "https://www.vlr.gg/event/2283", root, day(2025, 4, 20))
        })
        .unwrap();

        assert_eq!(event.name, "Champions Tour 2025: Masters");
        assert_eq!(event.start_date, Some(day(2025, 4, 15)));
        assert_eq!(event.end_date, Some(day(2025, 4, 30)));
        assert_eq!(event.prize_pool.as_deref(), Some("$1,000,000 USD"));
        assert_eq!(event.region.as_deref(), Some("Bangkok, Thailand"));
        assert_eq!(event.status, EventStatus::Ongoing);
        assert_eq!(event.match_ids, ["353177", "353178"]);
        assert_eq!(
            event.logo_url.as_deref(),
            Some("https://www.vlr.gg/img/event.png")
        );
    }
}
