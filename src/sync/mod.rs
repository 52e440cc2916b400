//! Idempotent upserts of extracted records into the [`Store`].
//!
//! Every upsert holds the per-entity lock for its whole read-modify-write
//! transaction, so an on-demand refresh racing a scheduled one for the same
//! id is serialized rather than interleaved. Each write is last-write-wins on
//! all non-identifying fields; an absent field clears the stored value.

mod locks;

pub use locks::KeyedLocks;

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, error, instrument, warn};

use crate::error::Result;
use crate::model::{
    Event, EventRecord, Match, MatchRecord, Player, PlayerRecord, Team, TeamRecord, TeamRef,
};
use crate::normalize::slugify;
use crate::store::Store;

pub struct SyncEngine {
    store: Store,
    locks: KeyedLocks,
}

impl SyncEngine {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Drop lock entries for ids no writer currently holds.
    pub fn prune_locks(&self) {
        self.locks.prune();
    }

    /// Upsert a team, then every player of its embedded roster with `team_id`
    /// pointing at it. A failing roster entry is logged and does not fail the
    /// team write.
    #[instrument(skip(self, record), fields(id = %record.id))]
    pub async fn upsert_team(&self, record: &TeamRecord) -> Result<Team> {
        let team = {
            let _guard = self.locks.lock(format!("team:{}", record.id)).await;
            self.write_team(record).await.inspect_err(|e| {
                error!(kind = %e.kind(), error = %e, "team upsert failed");
            })?
        };

        for entry in &record.roster {
            let mut player = entry.clone();
            player.team_id = Some(record.id.clone());
            if let Err(e) = self.upsert_player(&player).await {
                warn!(player = %player.id, error = %e, "skipping roster entry");
            }
        }
        debug!(roster = record.roster.len(), "team upserted");
        Ok(team)
    }

    async fn write_team(&self, record: &TeamRecord) -> Result<Team> {
        let mut tx = self.store.begin_write().await?;
        let stamp = next_stamp(&mut tx, "teams", &record.id).await?;
        let stats = serde_json::to_string(&record.stats)?;

        sqlx::query(
            r#"
            INSERT INTO teams (id, name, region, logo_url, stats, last_updated)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                region = excluded.region,
                logo_url = excluded.logo_url,
                stats = excluded.stats,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.region)
        .bind(&record.logo_url)
        .bind(stats)
        .bind(stamp)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Team {
            id: record.id.clone(),
            name: record.name.clone(),
            region: record.region.clone(),
            logo_url: record.logo_url.clone(),
            stats: record.stats.clone(),
            last_updated: stamp,
        })
    }

    #[instrument(skip(self, record), fields(id = %record.id))]
    pub async fn upsert_player(&self, record: &PlayerRecord) -> Result<Player> {
        let _guard = self.locks.lock(format!("player:{}", record.id)).await;
        self.write_player(record).await.inspect_err(|e| {
            error!(kind = %e.kind(), error = %e, "player upsert failed");
        })
    }

    async fn write_player(&self, record: &PlayerRecord) -> Result<Player> {
        let mut tx = self.store.begin_write().await?;
        let stamp = next_stamp(&mut tx, "players", &record.id).await?;

        sqlx::query(
            r#"
            INSERT INTO players (id, name, team_id, role, country, image_url, agent_pool, stats, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                team_id = excluded.team_id,
                role = excluded.role,
                country = excluded.country,
                image_url = excluded.image_url,
                agent_pool = excluded.agent_pool,
                stats = excluded.stats,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.team_id)
        .bind(&record.role)
        .bind(&record.country)
        .bind(&record.image_url)
        .bind(serde_json::to_string(&record.agent_pool)?)
        .bind(serde_json::to_string(&record.stats)?)
        .bind(stamp)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Player {
            id: record.id.clone(),
            name: record.name.clone(),
            team_id: record.team_id.clone(),
            role: record.role.clone(),
            country: record.country.clone(),
            image_url: record.image_url.clone(),
            agent_pool: record.agent_pool.clone(),
            stats: record.stats.clone(),
            last_updated: stamp,
        })
    }

    /// Upsert a match. Both teams get stub rows first when they don't exist
    /// yet; when the record carries maps, the stored map set is replaced by
    /// them in the same transaction as the match row.
    #[instrument(skip(self, record), fields(id = %record.id))]
    pub async fn upsert_match(&self, record: &MatchRecord) -> Result<Match> {
        let result: Result<Match> = async {
            let team1_id = self.ensure_team_stub(record.team1.as_ref()).await?;
            let team2_id = self.ensure_team_stub(record.team2.as_ref()).await?;
            let _guard = self.locks.lock(format!("match:{}", record.id)).await;
            self.write_match(record, team1_id, team2_id).await
        }
        .await;
        result.inspect_err(|e| {
            error!(kind = %e.kind(), error = %e, "match upsert failed");
        })
    }

    /// Make sure the team a match side refers to exists, returning its id.
    /// An existing row is left alone.
    async fn ensure_team_stub(&self, side: Option<&TeamRef>) -> Result<Option<String>> {
        let Some(side) = side else {
            return Ok(None);
        };
        let id = side.id.clone().unwrap_or_else(|| slugify(&side.name));
        if id.is_empty() {
            return Ok(None);
        }

        let _guard = self.locks.lock(format!("team:{id}")).await;
        let inserted = sqlx::query(
            r#"
            INSERT INTO teams (id, name, stats, last_updated)
            VALUES (?, ?, '{}', ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(&side.name)
        .bind(Utc::now())
        .execute(self.store.pool())
        .await?
        .rows_affected();
        if inserted > 0 {
            debug!(team = %id, "created team stub");
        }
        Ok(Some(id))
    }

    async fn write_match(
        &self,
        record: &MatchRecord,
        team1_id: Option<String>,
        team2_id: Option<String>,
    ) -> Result<Match> {
        let mut tx = self.store.begin_write().await?;
        let stamp = next_stamp(&mut tx, "matches", &record.id).await?;

        sqlx::query(
            r#"
            INSERT INTO matches (id, team1_id, team2_id, date, event_id, event_name, status, score, match_url, match_format, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                team1_id = excluded.team1_id,
                team2_id = excluded.team2_id,
                date = excluded.date,
                event_id = excluded.event_id,
                event_name = excluded.event_name,
                status = excluded.status,
                score = excluded.score,
                match_url = excluded.match_url,
                match_format = excluded.match_format,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&record.id)
        .bind(&team1_id)
        .bind(&team2_id)
        .bind(record.date)
        .bind(&record.event_id)
        .bind(&record.event_name)
        .bind(record.status.as_ref())
        .bind(&record.score)
        .bind(&record.match_url)
        .bind(&record.match_format)
        .bind(stamp)
        .execute(&mut *tx)
        .await?;

        if let Some(maps) = &record.maps {
            sqlx::query("DELETE FROM map_statistics WHERE match_id = ?")
                .bind(&record.id)
                .execute(&mut *tx)
                .await?;
            for map in maps {
                sqlx::query(
                    r#"
                    INSERT INTO map_statistics (match_id, map_name, team1_score, team2_score, team1_attack, team1_defense, team2_attack, team2_defense, player_stats, last_updated)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&record.id)
                .bind(&map.map_name)
                .bind(map.team1_score)
                .bind(map.team2_score)
                .bind(map.team1_attack)
                .bind(map.team1_defense)
                .bind(map.team2_attack)
                .bind(map.team2_defense)
                .bind(serde_json::to_string(&map.player_stats)?)
                .bind(stamp)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;

        Ok(Match {
            id: record.id.clone(),
            team1_id,
            team2_id,
            date: record.date,
            event_id: record.event_id.clone(),
            event_name: record.event_name.clone(),
            status: record.status,
            score: record.score.clone(),
            match_url: record.match_url.clone(),
            match_format: record.match_format.clone(),
            last_updated: stamp,
        })
    }

    /// Upsert an event. Matches may name an event that has no row yet, so
    /// nothing here touches matches.
    #[instrument(skip(self, record), fields(id = %record.id))]
    pub async fn upsert_event(&self, record: &EventRecord) -> Result<Event> {
        let _guard = self.locks.lock(format!("event:{}", record.id)).await;
        self.write_event(record).await.inspect_err(|e| {
            error!(kind = %e.kind(), error = %e, "event upsert failed");
        })
    }

    async fn write_event(&self, record: &EventRecord) -> Result<Event> {
        let mut tx = self.store.begin_write().await?;
        let stamp = next_stamp(&mut tx, "events", &record.id).await?;

        sqlx::query(
            r#"
            INSERT INTO events (id, name, region, start_date, end_date, prize_pool, status, event_url, logo_url, last_updated)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                region = excluded.region,
                start_date = excluded.start_date,
                end_date = excluded.end_date,
                prize_pool = excluded.prize_pool,
                status = excluded.status,
                event_url = excluded.event_url,
                logo_url = excluded.logo_url,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.region)
        .bind(record.start_date)
        .bind(record.end_date)
        .bind(&record.prize_pool)
        .bind(record.status.as_ref())
        .bind(&record.event_url)
        .bind(&record.logo_url)
        .bind(stamp)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Event {
            id: record.id.clone(),
            name: record.name.clone(),
            region: record.region.clone(),
            start_date: record.start_date,
            end_date: record.end_date,
            prize_pool: record.prize_pool.clone(),
            status: record.status,
            event_url: record.event_url.clone(),
            logo_url: record.logo_url.clone(),
            last_updated: stamp,
        })
    }
}

/// The `last_updated` value for a write: now, but never earlier than the
/// stamp already stored, so stamps only move forward even if the clock steps
/// back.
async fn next_stamp(
    tx: &mut Transaction<'_, Sqlite>,
    table: &'static str,
    id: &str,
) -> Result<DateTime<Utc>> {
    let previous: Option<DateTime<Utc>> =
        sqlx::query_scalar(&format!("SELECT last_updated FROM {table} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
    let now = Utc::now();
    Ok(previous.map_or(now, |p| p.max(now)))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::model::{EventStatus, MapRecord, MatchStatus, PlayerMapStats, SCORE_TBD};

    async fn engine() -> SyncEngine {
        SyncEngine::new(Store::in_memory().await.unwrap())
    }

    fn team_record() -> TeamRecord {
        let mut team = TeamRecord::new("2", "Sentinels");
        team.region = Some("United States".to_string());
        team.stats.insert("tag".to_string(), json!("SEN"));
        team.roster = vec![PlayerRecord::new("9", "TenZ"), PlayerRecord::new("4004", "zekken")];
        team
    }

    fn map(name: &str, team1: i32, team2: i32) -> MapRecord {
        let mut player_stats = BTreeMap::new();
        player_stats.insert(
            "TenZ".to_string(),
            PlayerMapStats {
                agent: "jett".to_string(),
                kills: 20,
                deaths: 12,
                assists: 4,
                acs: 260,
                team: "Sentinels".to_string(),
            },
        );
        MapRecord {
            map_name: Some(name.to_string()),
            team1_score: Some(team1),
            team2_score: Some(team2),
            player_stats,
            ..MapRecord::default()
        }
    }

    fn match_record(maps: Option<Vec<MapRecord>>) -> MatchRecord {
        MatchRecord {
            id: "353177".to_string(),
            team1: Some(TeamRef {
                id: Some("2".to_string()),
                name: "Sentinels".to_string(),
            }),
            team2: Some(TeamRef {
                id: None,
                name: "G2 Esports".to_string(),
            }),
            date: None,
            date_text: String::new(),
            event_id: Some("2283".to_string()),
            event_name: Some("Masters".to_string()),
            status: MatchStatus::Completed,
            score: "2-1".to_string(),
            match_url: Some("https://www.vlr.gg/353177".to_string()),
            match_format: Some("bo3".to_string()),
            maps,
        }
    }

    #[tokio::test]
    async fn test_upsert_team_is_idempotent() {
        let sync = engine().await;
        let record = team_record();

        let first = sync.upsert_team(&record).await.unwrap();
        let second = sync.upsert_team(&record).await.unwrap();
        assert!(second.last_updated >= first.last_updated);

        let teams = sync.store().list_teams().await.unwrap();
        assert_eq!(teams.len(), 1);
        let stored = &teams[0];
        assert_eq!(stored.name, "Sentinels");
        assert_eq!(stored.region.as_deref(), Some("United States"));
        assert_eq!(stored.stats["tag"], "SEN");
    }

    #[tokio::test]
    async fn test_upsert_overwrites_absent_fields() {
        let sync = engine().await;
        sync.upsert_team(&team_record()).await.unwrap();

        let bare = TeamRecord::new("2", "Sentinels");
        sync.upsert_team(&bare).await.unwrap();

        let stored = sync.store().get_team("2").await.unwrap().unwrap();
        assert_eq!(stored.region, None);
        assert!(stored.stats.is_empty());
    }

    #[tokio::test]
    async fn test_team_roster_cascades_to_players() {
        let sync = engine().await;
        sync.upsert_team(&team_record()).await.unwrap();

        let players = sync.store().players_for_team("2").await.unwrap();
        let names: Vec<_> = players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["TenZ", "zekken"]);
        assert!(players.iter().all(|p| p.team_id.as_deref() == Some("2")));
    }

    #[tokio::test]
    async fn test_match_creates_team_stubs_first() {
        let sync = engine().await;
        let stored = sync.upsert_match(&match_record(None)).await.unwrap();
        assert_eq!(stored.team1_id.as_deref(), Some("2"));
        assert_eq!(stored.team2_id.as_deref(), Some("g2-esports"));

        let teams = sync.store().list_teams().await.unwrap();
        let ids: Vec<_> = teams.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["g2-esports", "2"]);

        let stored = sync.store().get_match("353177").await.unwrap().unwrap();
        assert_eq!(stored.status, MatchStatus::Completed);
        assert_eq!(stored.event_name.as_deref(), Some("Masters"));
    }

    #[tokio::test]
    async fn test_stub_never_downgrades_existing_team() {
        let sync = engine().await;
        sync.upsert_team(&team_record()).await.unwrap();
        sync.upsert_match(&match_record(None)).await.unwrap();

        let team = sync.store().get_team("2").await.unwrap().unwrap();
        assert_eq!(team.region.as_deref(), Some("United States"));
        assert_eq!(team.stats["tag"], "SEN");
    }

    #[tokio::test]
    async fn test_maps_are_replaced_wholesale() {
        let sync = engine().await;
        let two_maps = match_record(Some(vec![map("Ascent", 13, 8), map("Lotus", 11, 13)]));
        sync.upsert_match(&two_maps).await.unwrap();
        assert_eq!(sync.store().map_statistics("353177").await.unwrap().len(), 2);

        let one_map = match_record(Some(vec![map("Sunset", 13, 5)]));
        sync.upsert_match(&one_map).await.unwrap();
        let maps = sync.store().map_statistics("353177").await.unwrap();
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].map_name.as_deref(), Some("Sunset"));
        assert_eq!(maps[0].player_stats["TenZ"].acs, 260);
    }

    #[tokio::test]
    async fn test_list_level_match_keeps_stored_maps() {
        let sync = engine().await;
        sync.upsert_match(&match_record(Some(vec![map("Ascent", 13, 8)])))
            .await
            .unwrap();

        let mut listed = match_record(None);
        listed.score = SCORE_TBD.to_string();
        listed.status = MatchStatus::Live;
        sync.upsert_match(&listed).await.unwrap();

        assert_eq!(sync.store().map_statistics("353177").await.unwrap().len(), 1);
        let stored = sync.store().get_match("353177").await.unwrap().unwrap();
        assert_eq!(stored.status, MatchStatus::Live);
    }

    #[tokio::test]
    async fn test_upsert_event_and_player() {
        let sync = engine().await;
        let event = EventRecord {
            id: "2283".to_string(),
            name: "Champions Tour 2025: Masters".to_string(),
            region: Some("TH".to_string()),
            start_date: chrono::NaiveDate::from_ymd_opt(2025, 4, 15),
            end_date: chrono::NaiveDate::from_ymd_opt(2025, 4, 30),
            prize_pool: Some("$1,000,000".to_string()),
            status: EventStatus::Ongoing,
            event_url: None,
            logo_url: None,
            match_ids: vec!["353177".to_string()],
        };
        sync.upsert_event(&event).await.unwrap();
        let stored = sync.store().get_event("2283").await.unwrap().unwrap();
        assert_eq!(stored.status, EventStatus::Ongoing);
        assert_eq!(stored.end_date, event.end_date);

        let mut player = PlayerRecord::new("9", "TenZ");
        player.agent_pool = vec!["jett".to_string(), "raze".to_string()];
        sync.upsert_player(&player).await.unwrap();
        let stored = sync.store().get_player("9").await.unwrap().unwrap();
        assert_eq!(stored.agent_pool, ["jett", "raze"]);
        assert_eq!(stored.team_id, None);
    }

    #[tokio::test]
    async fn test_failed_map_write_rolls_back_match() {
        let sync = engine().await;
        sync.upsert_match(&match_record(Some(vec![map("Bind", 13, 9)])))
            .await
            .unwrap();
        sqlx::query(
            r#"
            CREATE TRIGGER reject_broken_map BEFORE INSERT ON map_statistics
            WHEN NEW.map_name = 'Broken'
            BEGIN SELECT RAISE(ABORT, 'map rejected'); END
            "#,
        )
        .execute(sync.store().pool())
        .await
        .unwrap();

        let mut rescored = match_record(Some(vec![map("Ascent", 13, 2), map("Broken", 0, 13)]));
        rescored.score = "1-2".to_string();
        rescored.status = MatchStatus::Live;
        let err = sync.upsert_match(&rescored).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Persistence);

        let stored = sync.store().get_match("353177").await.unwrap().unwrap();
        assert_eq!(stored.score, "2-1");
        assert_eq!(stored.status, MatchStatus::Completed);
        let maps = sync.store().map_statistics("353177").await.unwrap();
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].map_name.as_deref(), Some("Bind"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_on_file_store() {
        let path = std::env::temp_dir().join(format!("vlr-sync-writers-{}.db", std::process::id()));
        let url = format!("sqlite://{}", path.display());
        let store = Store::connect(&url, 5).await.unwrap();
        store.init_schema().await.unwrap();
        let sync = std::sync::Arc::new(SyncEngine::new(store));

        let writers: Vec<_> = (0..40)
            .map(|i| {
                let sync = sync.clone();
                tokio::spawn(async move {
                    sync.upsert_team(&TeamRecord::new(format!("{i}"), format!("Team {i}")))
                        .await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }
        assert_eq!(sync.store().list_teams().await.unwrap().len(), 40);

        sync.store().pool().close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }
}
