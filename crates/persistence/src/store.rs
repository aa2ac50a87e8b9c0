//! SQLite save store.

use crate::{PersistenceError, SavedHolding, SavedSelections};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

const SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS saves (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        note TEXT,
        saved_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS holdings (
        save_id INTEGER NOT NULL REFERENCES saves(id) ON DELETE CASCADE,
        slot INTEGER NOT NULL,
        kind TEXT NOT NULL,
        name TEXT NOT NULL,
        level INTEGER NOT NULL,
        PRIMARY KEY (save_id, slot)
    )",
];

/// Section of a save a stored row belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HoldingKind {
    Unique,
    Certificate,
    Chest,
}

impl HoldingKind {
    fn as_str(self) -> &'static str {
        match self {
            HoldingKind::Unique => "unique",
            HoldingKind::Certificate => "certificate",
            HoldingKind::Chest => "chest",
        }
    }

    fn parse(s: &str) -> Result<Self, PersistenceError> {
        match s {
            "unique" => Ok(HoldingKind::Unique),
            "certificate" => Ok(HoldingKind::Certificate),
            "chest" => Ok(HoldingKind::Chest),
            other => Err(malformed(format!("unknown kind {other:?}"))),
        }
    }
}

fn malformed(detail: String) -> PersistenceError {
    warn!(%detail, "rejected stored row");
    PersistenceError::MalformedRow(detail)
}

/// Create the parent directory of a file-backed SQLite URL.
///
/// In-memory URLs and bare file names need nothing.
pub fn ensure_db_dir(url: &str) -> Result<(), PersistenceError> {
    let Some(path) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(':') {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Returns the default SQLite URL used for local saves.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/main.db"
}

/// Open (creating if needed) the save database and ensure the schema exists.
pub async fn init_db(url: &str) -> Result<SqlitePool, PersistenceError> {
    ensure_db_dir(url)?;
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    for stmt in SCHEMA {
        sqlx::query(stmt).execute(&pool).await?;
    }
    info!(url, "save database ready");
    Ok(pool)
}

/// Create a named save, or return the existing one with that name.
pub async fn create_save(
    pool: &SqlitePool,
    name: &str,
    note: Option<&str>,
) -> Result<i64, PersistenceError> {
    let row = sqlx::query(
        "INSERT INTO saves (name, note, saved_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET note = COALESCE(excluded.note, saves.note)
         RETURNING id",
    )
    .bind(name)
    .bind(note)
    .bind(Utc::now().to_rfc3339())
    .fetch_one(pool)
    .await?;
    Ok(row.try_get("id")?)
}

pub async fn find_save(pool: &SqlitePool, name: &str) -> Result<Option<i64>, PersistenceError> {
    let row = sqlx::query("SELECT id FROM saves WHERE name = ?1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => Ok(Some(row.try_get("id")?)),
        None => Ok(None),
    }
}

/// Replace every stored holding of a save in one transaction.
pub async fn write_selections(
    pool: &SqlitePool,
    save_id: i64,
    saved: &SavedSelections,
) -> Result<(), PersistenceError> {
    let mut tx = pool.begin().await?;
    let stamp = saved.saved_at.unwrap_or_else(Utc::now).to_rfc3339();
    let updated = sqlx::query("UPDATE saves SET saved_at = ?1 WHERE id = ?2")
        .bind(stamp)
        .bind(save_id)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(PersistenceError::UnknownSave(save_id));
    }
    sqlx::query("DELETE FROM holdings WHERE save_id = ?1")
        .bind(save_id)
        .execute(&mut *tx)
        .await?;

    let unique = saved
        .unique
        .iter()
        .map(|(name, &level)| (HoldingKind::Unique, name.as_str(), level));
    let certificate = saved
        .certificate
        .iter()
        .map(|c| (HoldingKind::Certificate, c.name.as_str(), c.level));
    let chests = saved
        .chests
        .iter()
        .map(|c| (HoldingKind::Chest, c.name.as_str(), c.level));
    let mut slots = 0i64;
    for (kind, name, level) in unique.chain(certificate).chain(chests) {
        sqlx::query(
            "INSERT INTO holdings (save_id, slot, kind, name, level) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(save_id)
        .bind(slots)
        .bind(kind.as_str())
        .bind(name)
        .bind(level)
        .execute(&mut *tx)
        .await?;
        slots += 1;
    }
    tx.commit().await?;
    debug!(save_id, rows = slots, "selections written");
    Ok(())
}

/// Load a save's holdings in stored order.
pub async fn read_selections(
    pool: &SqlitePool,
    save_id: i64,
) -> Result<SavedSelections, PersistenceError> {
    let save = sqlx::query("SELECT saved_at FROM saves WHERE id = ?1")
        .bind(save_id)
        .fetch_optional(pool)
        .await?
        .ok_or(PersistenceError::UnknownSave(save_id))?;
    let stamp: String = save.try_get("saved_at")?;
    let saved_at = DateTime::parse_from_rfc3339(&stamp)
        .map_err(|e| malformed(format!("saved_at {stamp:?}: {e}")))?
        .with_timezone(&Utc);

    let rows = sqlx::query("SELECT kind, name, level FROM holdings WHERE save_id = ?1 ORDER BY slot")
        .bind(save_id)
        .fetch_all(pool)
        .await?;
    let mut saved = SavedSelections {
        saved_at: Some(saved_at),
        ..Default::default()
    };
    for row in rows {
        let kind: String = row.try_get("kind")?;
        let name: String = row.try_get("name")?;
        let level: i32 = row.try_get("level")?;
        match HoldingKind::parse(&kind)? {
            HoldingKind::Unique => {
                if saved.unique.insert(name.clone(), level).is_some() {
                    return Err(malformed(format!("treasure {name:?} stored twice")));
                }
            }
            HoldingKind::Certificate => {
                if saved.certificate.is_some() {
                    return Err(malformed("more than one certificate stored".into()));
                }
                saved.certificate = Some(SavedHolding::new(name, level));
            }
            HoldingKind::Chest => saved.chests.push(SavedHolding::new(name, level)),
        }
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        init_db("sqlite::memory:").await.unwrap()
    }

    fn sample() -> SavedSelections {
        let mut unique = std::collections::BTreeMap::new();
        unique.insert("Goggles".to_string(), 4);
        unique.insert("Lantern".to_string(), 0);
        SavedSelections {
            unique,
            certificate: Some(SavedHolding::new("Cookie Run: 7M Points Certificate", 2)),
            chests: vec![
                SavedHolding::new("Coin", 3),
                SavedHolding::new("Bell", -1),
                SavedHolding::new("Coin", 9),
            ],
            saved_at: None,
        }
    }

    #[tokio::test]
    async fn create_save_is_idempotent_by_name() {
        let pool = memory_pool().await;
        let a = create_save(&pool, "default", Some("first")).await.unwrap();
        let b = create_save(&pool, "default", None).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(find_save(&pool, "default").await.unwrap(), Some(a));
        assert_eq!(find_save(&pool, "other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_then_read_preserves_sections_and_order() {
        let pool = memory_pool().await;
        let id = create_save(&pool, "default", None).await.unwrap();
        let saved = sample();
        write_selections(&pool, id, &saved).await.unwrap();
        let back = read_selections(&pool, id).await.unwrap();
        assert_eq!(back.unique, saved.unique);
        assert_eq!(back.certificate, saved.certificate);
        assert_eq!(back.chests, saved.chests);
        assert!(back.saved_at.is_some());
    }

    #[tokio::test]
    async fn rewrite_replaces_previous_rows() {
        let pool = memory_pool().await;
        let id = create_save(&pool, "default", None).await.unwrap();
        write_selections(&pool, id, &sample()).await.unwrap();
        let smaller = SavedSelections {
            chests: vec![SavedHolding::new("Bell", 1)],
            ..Default::default()
        };
        write_selections(&pool, id, &smaller).await.unwrap();
        let back = read_selections(&pool, id).await.unwrap();
        assert!(back.unique.is_empty());
        assert!(back.certificate.is_none());
        assert_eq!(back.chests, smaller.chests);
    }

    #[tokio::test]
    async fn unknown_save_is_rejected() {
        let pool = memory_pool().await;
        assert!(matches!(
            write_selections(&pool, 42, &sample()).await,
            Err(PersistenceError::UnknownSave(42))
        ));
        assert!(matches!(
            read_selections(&pool, 42).await,
            Err(PersistenceError::UnknownSave(42))
        ));
    }

    #[tokio::test]
    async fn file_url_creates_missing_directories() {
        let dir = std::env::temp_dir().join(format!("crystal-calc-db-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let db = dir.join("nested").join("main.db");
        let url = format!("sqlite://{}", db.display());
        let pool = init_db(&url).await.unwrap();
        create_save(&pool, "default", None).await.unwrap();
        pool.close().await;
        assert!(db.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn memory_urls_need_no_directory() {
        assert!(ensure_db_dir("sqlite::memory:").is_ok());
        assert!(ensure_db_dir("sqlite://main.db").is_ok());
    }

    #[tokio::test]
    async fn unknown_row_kind_is_malformed() {
        let pool = memory_pool().await;
        let id = create_save(&pool, "default", None).await.unwrap();
        sqlx::query("INSERT INTO holdings (save_id, slot, kind, name, level) VALUES (?1, 0, 'gem', 'Coin', 1)")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();
        assert!(matches!(
            read_selections(&pool, id).await,
            Err(PersistenceError::MalformedRow(_))
        ));
    }

    #[test]
    fn url_is_sqlite() {
        assert!(default_sqlite_url().starts_with("sqlite://"));
    }
}
