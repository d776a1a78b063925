use std::{collections::BTreeMap, path::Path};

use miette::{Context, IntoDiagnostic, Result};
use rusqlite::{
    params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
    Connection, OptionalExtension, Row, ToSql,
};
use time::OffsetDateTime;
use tracing::debug;

use super::Store;
use crate::types::{
    AssetId, Capture, MediaAsset, NewCapture, SubmissionRecord, Template, Visibility,
};

const ASSET_COLUMNS: &str =
    "e.id, e.title, e.template_name, e.template_content, e.template_env, e.privacy, e.duration";

#[derive(Debug)]
pub struct Sqlite {
    conn: Connection,
}

impl Sqlite {
    /// Open the database file at the given path, creating it and its tables
    /// if needed.
    pub fn open(p: &Path) -> Result<Self> {
        let conn = Connection::open(p)
            .into_diagnostic()
            .wrap_err("Could not open sqlite file")?;
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().into_diagnostic()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self { conn };
        db.create_tables().wrap_err("Could not create tables")?;
        Ok(db)
    }

    /// Create the tables if they do not already exist
    fn create_tables(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "BEGIN;
                CREATE TABLE IF NOT EXISTS events (
                    id                  INTEGER PRIMARY KEY,
                    title               TEXT NOT NULL,
                    template_name       TEXT,
                    template_content    TEXT,
                    template_env        TEXT NOT NULL DEFAULT '{}',
                    privacy             TEXT NOT NULL DEFAULT 'public',
                    duration            INTEGER
                );
                CREATE TABLE IF NOT EXISTS submissions (
                    id                  INTEGER PRIMARY KEY,
                    event_id            INTEGER NOT NULL,
                    tag                 TEXT NOT NULL,
                    url                 TEXT NOT NULL,
                    hd                  INTEGER NOT NULL DEFAULT 0,
                    token_protection    INTEGER NOT NULL DEFAULT 0,
                    submitted           INTEGER NOT NULL,

                    FOREIGN KEY (event_id)
                        REFERENCES events (id)
                        ON DELETE CASCADE
                );
                CREATE TABLE IF NOT EXISTS pictures (
                    id                  INTEGER PRIMARY KEY,
                    event_id            INTEGER NOT NULL,
                    file                TEXT NOT NULL,
                    width               INTEGER NOT NULL,
                    height              INTEGER NOT NULL,
                    size                INTEGER NOT NULL,
                    notes               TEXT NOT NULL DEFAULT '',
                    created             INTEGER NOT NULL,

                    FOREIGN KEY (event_id)
                        REFERENCES events (id)
                        ON DELETE CASCADE
                );
                CREATE INDEX IF NOT EXISTS submissions_tag ON submissions (tag);
                CREATE INDEX IF NOT EXISTS pictures_event ON pictures (event_id);
                COMMIT;",
            )
            .into_diagnostic()?;
        Ok(())
    }

    fn query_assets(&self, query: &str, limit: Option<usize>) -> Result<Vec<MediaAsset>> {
        // A negative LIMIT means no limit in sqlite
        let limit = limit.map_or(-1, |l| l as i64);

        let mut stmt = self.conn.prepare(query).into_diagnostic()?;
        let assets = stmt
            .query_map([limit], asset_from_row)
            .into_diagnostic()
            .wrap_err("Could not query event rows")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .into_diagnostic()?;
        Ok(assets)
    }
}

impl Store for Sqlite {
    fn pending_durations(&self, limit: Option<usize>) -> Result<Vec<MediaAsset>> {
        self.query_assets(
            &format!(
                "SELECT {ASSET_COLUMNS} FROM events e
                WHERE e.duration IS NULL
                ORDER BY e.id
                LIMIT ?"
            ),
            limit,
        )
    }

    fn pending_screencaptures(&self, limit: Option<usize>) -> Result<Vec<MediaAsset>> {
        self.query_assets(
            &format!(
                "SELECT {ASSET_COLUMNS} FROM events e
                WHERE e.duration IS NOT NULL
                AND NOT EXISTS (SELECT 1 FROM pictures p WHERE p.event_id = e.id)
                ORDER BY e.id
                LIMIT ?"
            ),
            limit,
        )
    }

    fn asset(&self, id: AssetId) -> Result<Option<MediaAsset>> {
        self.conn
            .query_row(
                &format!("SELECT {ASSET_COLUMNS} FROM events e WHERE e.id = ?"),
                [id],
                asset_from_row,
            )
            .optional()
            .into_diagnostic()
            .wrap_err("Could not query event row")
    }

    fn set_duration(&self, id: AssetId, seconds: u64) -> Result<bool> {
        debug!("Set duration of event {id} to {seconds}s");
        let changed = self
            .conn
            .execute(
                "UPDATE events
                SET duration = ?
                WHERE id = ? AND duration IS NULL",
                params![seconds, id],
            )
            .into_diagnostic()
            .wrap_err("Could not update event duration")?;

        Ok(changed == 1)
    }

    fn best_submission(&self, tag: &str) -> Result<Option<SubmissionRecord>> {
        self.conn
            .query_row(
                "SELECT id, event_id, tag, url, hd, token_protection, submitted
                FROM submissions
                WHERE tag = ?
                ORDER BY hd DESC, submitted DESC, id DESC
                LIMIT 1",
                [tag],
                |row| {
                    Ok(SubmissionRecord {
                        id: row.get(0)?,
                        asset_id: row.get(1)?,
                        tag: row.get(2)?,
                        url: row.get(3)?,
                        hd: row.get(4)?,
                        token_protection: row.get(5)?,
                        submitted: row.get(6)?,
                    })
                },
            )
            .optional()
            .into_diagnostic()
            .wrap_err("Could not query submission row")
    }

    fn count_captures(&self, id: AssetId) -> Result<usize> {
        self.conn
            .query_row(
                "SELECT COUNT(id) FROM pictures WHERE event_id = ?",
                [id],
                |row| row.get(0),
            )
            .into_diagnostic()
    }

    fn add_captures(&self, captures: &[NewCapture]) -> Result<Vec<i64>> {
        let tx = self
            .conn
            .unchecked_transaction()
            .into_diagnostic()
            .wrap_err("Could not start transaction")?;
        let created = OffsetDateTime::now_utc().unix_timestamp();

        let mut ids = Vec::with_capacity(captures.len());
        for capture in captures {
            debug!("Add picture '{}' to event {}", capture.notes, capture.asset_id);
            let id = tx
                .query_row(
                    "INSERT INTO pictures (event_id, file, width, height, size, notes, created)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    RETURNING id",
                    params![
                        capture.asset_id,
                        capture.file.to_string_lossy(),
                        capture.width,
                        capture.height,
                        capture.size,
                        capture.notes,
                        created,
                    ],
                    |row| row.get(0),
                )
                .into_diagnostic()
                .wrap_err("Could not insert picture row")?;
            ids.push(id);
        }

        tx.commit().into_diagnostic()?;
        Ok(ids)
    }

    fn captures(&self, id: AssetId) -> Result<Vec<Capture>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, event_id, file, width, height, size, notes, created
                FROM pictures
                WHERE event_id = ?
                ORDER BY created DESC, id DESC",
            )
            .into_diagnostic()?;

        let captures = stmt
            .query_map([id], |row| {
                Ok(Capture {
                    id: row.get(0)?,
                    asset_id: row.get(1)?,
                    file: row.get::<_, String>(2)?.into(),
                    width: row.get(3)?,
                    height: row.get(4)?,
                    size: row.get(5)?,
                    notes: row.get(6)?,
                    created: row.get(7)?,
                })
            })
            .into_diagnostic()
            .wrap_err("Could not query picture rows")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .into_diagnostic()?;
        Ok(captures)
    }
}

#[cfg(test)]
impl Sqlite {
    pub fn insert_asset(
        &self,
        title: &str,
        template: Option<&Template>,
        template_env: &[(&str, &str)],
        visibility: Visibility,
    ) -> Result<AssetId> {
        let env: BTreeMap<String, String> = template_env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        self.conn
            .query_row(
                "INSERT INTO events (title, template_name, template_content, template_env, privacy)
                VALUES (?, ?, ?, ?, ?)
                RETURNING id",
                params![
                    title,
                    template.map(|t| &t.name),
                    template.map(|t| &t.content),
                    SqliteEnv(env),
                    SqliteVisibility(visibility),
                ],
                |row| row.get(0),
            )
            .into_diagnostic()
    }

    pub fn set_template_env(&self, id: AssetId, template_env: &[(&str, &str)]) -> Result<()> {
        let env = template_env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.conn
            .execute(
                "UPDATE events SET template_env = ? WHERE id = ?",
                params![SqliteEnv(env), id],
            )
            .into_diagnostic()?;
        Ok(())
    }

    pub fn force_duration(&self, id: AssetId, seconds: u64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE events SET duration = ? WHERE id = ?",
                params![seconds, id],
            )
            .into_diagnostic()?;
        Ok(())
    }

    pub fn insert_submission(
        &self,
        asset_id: AssetId,
        tag: &str,
        hd: bool,
        token_protection: bool,
        submitted: i64,
    ) -> Result<i64> {
        self.conn
            .query_row(
                "INSERT INTO submissions (event_id, tag, url, hd, token_protection, submitted)
                VALUES (?, ?, 'https://s3.com/asomething.mov', ?, ?, ?)
                RETURNING id",
                params![asset_id, tag, hd, token_protection, submitted],
                |row| row.get(0),
            )
            .into_diagnostic()
    }
}

fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<MediaAsset> {
    let template_name: Option<String> = row.get(2)?;
    let template_content: Option<String> = row.get(3)?;
    let env: SqliteEnv = row.get(4)?;
    let visibility: SqliteVisibility = row.get(5)?;

    Ok(MediaAsset {
        id: row.get(0)?,
        title: row.get(1)?,
        template: template_name.map(|name| Template {
            name,
            content: template_content.unwrap_or_default(),
        }),
        template_env: env.0,
        visibility: visibility.0,
        duration: row.get(6)?,
    })
}

/// Wrapper around the template parameters so that they can be stored as a
/// JSON object. Non-string values are kept in their JSON representation.
#[derive(Debug)]
struct SqliteEnv(BTreeMap<String, String>);

impl FromSql for SqliteEnv {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let json: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(value.as_str()?).map_err(|e| FromSqlError::Other(Box::new(e)))?;

        let env = json
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                v => (k, v.to_string()),
            })
            .collect();

        Ok(SqliteEnv(env))
    }
}

impl ToSql for SqliteEnv {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let json = serde_json::to_string(&self.0)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(json))
    }
}

/// Wrapper around [Visibility] so that it can be read from/written to sqlite
#[derive(Debug)]
struct SqliteVisibility(Visibility);

impl FromSql for SqliteVisibility {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(SqliteVisibility(Visibility::from_privacy(value.as_str()?)))
    }
}

impl ToSql for SqliteVisibility {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_privacy()))
    }
}
