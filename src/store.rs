//! The SQLite entity store: connection setup, schema bootstrap and reads.
//!
//! Writes go through [`crate::sync::SyncEngine`], which owns the upsert
//! semantics. Structured blobs (`stats`, `agent_pool`, `player_stats`) are kept
//! as JSON text.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use crate::error::{IngestError, Result};
use crate::model::{Event, MapStatistic, Match, Player, Team};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS teams (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        region TEXT,
        logo_url TEXT,
        stats TEXT NOT NULL DEFAULT '{}',
        last_updated TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS players (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        team_id TEXT,
        role TEXT,
        country TEXT,
        image_url TEXT,
        agent_pool TEXT NOT NULL DEFAULT '[]',
        stats TEXT NOT NULL DEFAULT '{}',
        last_updated TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS matches (
        id TEXT PRIMARY KEY,
        team1_id TEXT,
        team2_id TEXT,
        date TEXT,
        event_id TEXT,
        event_name TEXT,
        status TEXT NOT NULL,
        score TEXT NOT NULL,
        match_url TEXT,
        match_format TEXT,
        last_updated TEXT NOT NULL,
        FOREIGN KEY (team1_id) REFERENCES teams (id),
        FOREIGN KEY (team2_id) REFERENCES teams (id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS map_statistics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        match_id TEXT NOT NULL,
        map_name TEXT,
        team1_score INTEGER,
        team2_score INTEGER,
        team1_attack INTEGER,
        team1_defense INTEGER,
        team2_attack INTEGER,
        team2_defense INTEGER,
        player_stats TEXT NOT NULL DEFAULT '{}',
        last_updated TEXT NOT NULL,
        FOREIGN KEY (match_id) REFERENCES matches (id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        region TEXT,
        start_date TEXT,
        end_date TEXT,
        prize_pool TEXT,
        status TEXT NOT NULL,
        event_url TEXT,
        logo_url TEXT,
        last_updated TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_players_team ON players(team_id)",
    "CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(date)",
    "CREATE INDEX IF NOT EXISTS idx_map_statistics_match ON map_statistics(match_id)",
];

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to the entity store. Cloning is cheap and shares the pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `url`, e.g.
    /// `sqlite://data/vlr-sync.db`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let file_path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        if let Some(parent) = Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| IngestError::StoreDir {
                        path: parent.display().to_string(),
                        source: e,
                    })?;
            }
        }

        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        debug!(url, "connected to store");
        Ok(Self { pool })
    }

    /// A private in-memory database with the schema already in place.
    ///
    /// The pool is pinned to one connection that never expires, since every
    /// new connection to `:memory:` would see a fresh, empty database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a write transaction that holds the database write lock from its
    /// first statement on.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Create any missing tables and indexes.
    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("store schema ready");
        Ok(())
    }

    pub async fn get_team(&self, id: &str) -> Result<Option<Team>> {
        sqlx::query("SELECT * FROM teams WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| team_from_row(&row))
            .transpose()
    }

    pub async fn list_teams(&self) -> Result<Vec<Team>> {
        sqlx::query("SELECT * FROM teams ORDER BY name")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(team_from_row)
            .collect()
    }

    pub async fn get_player(&self, id: &str) -> Result<Option<Player>> {
        sqlx::query("SELECT * FROM players WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| player_from_row(&row))
            .transpose()
    }

    pub async fn players_for_team(&self, team_id: &str) -> Result<Vec<Player>> {
        sqlx::query("SELECT * FROM players WHERE team_id = ? ORDER BY name")
            .bind(team_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(player_from_row)
            .collect()
    }

    pub async fn get_match(&self, id: &str) -> Result<Option<Match>> {
        sqlx::query("SELECT * FROM matches WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| match_from_row(&row))
            .transpose()
    }

    /// Map rows of a match in the order they were written.
    pub async fn map_statistics(&self, match_id: &str) -> Result<Vec<MapStatistic>> {
        sqlx::query("SELECT * FROM map_statistics WHERE match_id = ? ORDER BY id")
            .bind(match_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(map_from_row)
            .collect()
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<Event>> {
        sqlx::query("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| event_from_row(&row))
            .transpose()
    }
}

fn json_column<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T> {
    let text: String = row.try_get(column)?;
    Ok(serde_json::from_str(&text)?)
}

fn enum_column<T: FromStr>(row: &SqliteRow, column: &'static str) -> Result<T> {
    let value: String = row.try_get(column)?;
    T::from_str(&value).map_err(|_| IngestError::InvalidColumn { column, value })
}

fn team_from_row(row: &SqliteRow) -> Result<Team> {
    Ok(Team {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        region: row.try_get("region")?,
        logo_url: row.try_get("logo_url")?,
        stats: json_column(row, "stats")?,
        last_updated: row.try_get("last_updated")?,
    })
}

fn player_from_row(row: &SqliteRow) -> Result<Player> {
    Ok(Player {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        team_id: row.try_get("team_id")?,
        role: row.try_get("role")?,
        country: row.try_get("country")?,
        image_url: row.try_get("image_url")?,
        agent_pool: json_column(row, "agent_pool")?,
        stats: json_column(row, "stats")?,
        last_updated: row.try_get("last_updated")?,
    })
}

fn match_from_row(row: &SqliteRow) -> Result<Match> {
    Ok(Match {
        id: row.try_get("id")?,
        team1_id: row.try_get("team1_id")?,
        team2_id: row.try_get("team2_id")?,
        date: row.try_get("date")?,
        event_id: row.try_get("event_id")?,
        event_name: row.try_get("event_name")?,
        status: enum_column(row, "status")?,
        score: row.try_get("score")?,
        match_url: row.try_get("match_url")?,
        match_format: row.try_get("match_format")?,
        last_updated: row.try_get("last_updated")?,
    })
}

fn map_from_row(row: &SqliteRow) -> Result<MapStatistic> {
    Ok(MapStatistic {
        id: row.try_get("id")?,
        match_id: row.try_get("match_id")?,
        map_name: row.try_get("map_name")?,
        team1_score: row.try_get("team1_score")?,
        team2_score: row.try_get("team2_score")?,
        team1_attack: row.try_get("team1_attack")?,
        team1_defense: row.try_get("team1_defense")?,
        team2_attack: row.try_get("team2_attack")?,
        team2_defense: row.try_get("team2_defense")?,
        player_stats: json_column(row, "player_stats")?,
        last_updated: row.try_get("last_updated")?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<Event> {
    Ok(Event {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        region: row.try_get("region")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        prize_pool: row.try_get("prize_pool")?,
        status: enum_column(row, "status")?,
        event_url: row.try_get("event_url")?,
        logo_url: row.try_get("logo_url")?,
        last_updated: row.try_get("last_updated")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        store.init_schema().await.unwrap();
        assert!(store.list_teams().await.unwrap().is_empty());
        assert_eq!(store.get_match("1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_status_is_rejected() {
        let store = Store::in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO events (id, name, status, last_updated) VALUES ('1', 'Masters', 'paused', '2025-04-17T19:00:00Z')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let err = store.get_event("1").await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::InvalidColumn { column: "status", .. }
        ));
    }

    #[tokio::test]
    async fn test_match_requires_existing_teams() {
        let store = Store::in_memory().await.unwrap();
        let orphan = sqlx::query(
            "INSERT INTO matches (id, team1_id, status, score, last_updated) VALUES ('1', 'ghost', 'upcoming', 'TBD', '2025-04-17T19:00:00Z')",
        )
        .execute(store.pool())
        .await;
        assert!(orphan.is_err());
    }

    #[tokio::test]
    async fn test_connect_reports_unusable_directory() {
        let blocker = std::env::temp_dir().join(format!("vlr-sync-blocker-{}", std::process::id()));
        std::fs::write(&blocker, "not a directory").unwrap();
        let url = format!("sqlite://{}/nested/vlr-sync.db", blocker.display());

        let err = Store::connect(&url, 1).await.unwrap_err();
        assert!(matches!(err, IngestError::StoreDir { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Persistence);

        std::fs::remove_file(&blocker).unwrap();
    }
}
