use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::common::EventStatus;

/// An event as recovered by the event list or event detail extractor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub id: String,
    pub name: String,
    pub region: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub prize_pool: Option<String>,
    pub status: EventStatus,
    pub event_url: Option<String>,
    pub logo_url: Option<String>,
    /// Ids of matches listed on the event page (detail extraction only).
    pub match_ids: Vec<String>,
}

/// An event row as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub region: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub prize_pool: Option<String>,
    pub status: EventStatus,
    pub event_url: Option<String>,
    pub logo_url: Option<String>,
    pub last_updated: DateTime<Utc>,
}
