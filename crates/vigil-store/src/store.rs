use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use vigil_core::types::{Embedding, Representation, RepresentationKind, StoredReference};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS face_references (
    id          TEXT PRIMARY KEY,
    user        TEXT NOT NULL,
    kind        TEXT NOT NULL,
    model_label TEXT NOT NULL,
    embedding   TEXT,
    payload     BLOB,
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_face_references_user
    ON face_references(user, active);

CREATE TABLE IF NOT EXISTS audit_log (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    user      TEXT NOT NULL,
    action    TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    details   TEXT
);
CREATE INDEX IF NOT EXISTS idx_audit_log_user
    ON audit_log(user, timestamp);

CREATE TABLE IF NOT EXISTS alerts (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    recipient  TEXT NOT NULL,
    title      TEXT NOT NULL,
    message    TEXT NOT NULL,
    kind       TEXT NOT NULL,
    created_at TEXT NOT NULL,
    read       INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_alerts_recipient
    ON alerts(recipient, read);
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// One verification attempt as recorded in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub user: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub details: serde_json::Value,
}

/// A queued notification for an administrator account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAlert {
    pub id: i64,
    pub recipient: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

/// Handle to the vigil database. Clone-safe; all calls run on the
/// connection's worker thread.
#[derive(Clone)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path` and bootstrap the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).await?;
        Self::init(conn).await
    }

    /// In-memory database, for tests and the CLI's dry-run mode.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    // --- face references ---

    /// Insert a new active reference for `user` and return it.
    pub async fn insert_reference(
        &self,
        user: &str,
        representation: Representation,
        model_label: &str,
    ) -> Result<StoredReference, StoreError> {
        let reference = StoredReference {
            id: Uuid::new_v4().to_string(),
            user: user.to_string(),
            model_label: model_label.to_string(),
            representation,
            active: true,
            created_at: Utc::now(),
        };

        let row = ReferenceRow::from_reference(&reference)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO face_references
                         (id, user, kind, model_label, embedding, payload, active, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
                    rusqlite::params![
                        row.id,
                        row.user,
                        row.kind,
                        row.model_label,
                        row.embedding,
                        row.payload,
                        row.created_at,
                    ],
                )?;
                Ok(())
            })
            .await?;

        tracing::info!(
            user = %reference.user,
            reference = %reference.id,
            kind = reference.representation.kind().as_str(),
            "stored face reference"
        );
        Ok(reference)
    }

    /// All active references for a user, oldest first.
    pub async fn active_references(&self, user: &str) -> Result<Vec<StoredReference>, StoreError> {
        let user = user.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user, kind, model_label, embedding, payload, active, created_at
                     FROM face_references
                     WHERE user = ?1 AND active = 1
                     ORDER BY created_at ASC, rowid ASC",
                )?;
                let rows = stmt
                    .query_map([user], ReferenceRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(ReferenceRow::into_reference).collect()
    }

    /// Soft-delete a single reference. Returns whether a row changed.
    pub async fn deactivate_reference(&self, user: &str, id: &str) -> Result<bool, StoreError> {
        let (user, id) = (user.to_string(), id.to_string());
        let changed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE face_references SET active = 0 WHERE user = ?1 AND id = ?2",
                    [user, id],
                )?;
                Ok(n)
            })
            .await?;
        Ok(changed > 0)
    }

    /// Soft-delete every active reference for a user (face update supersedes
    /// the old captures). Returns the number of rows deactivated.
    pub async fn deactivate_all(&self, user: &str) -> Result<usize, StoreError> {
        let user = user.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE face_references SET active = 0 WHERE user = ?1 AND active = 1",
                    [user],
                )?;
                Ok(n)
            })
            .await?;
        Ok(changed)
    }

    /// Physically remove all of a user's references (account deletion only).
    pub async fn delete_user_references(&self, user: &str) -> Result<usize, StoreError> {
        let user = user.to_string();
        let removed = self
            .conn
            .call(move |conn| {
                let n = conn.execute("DELETE FROM face_references WHERE user = ?1", [user])?;
                Ok(n)
            })
            .await?;
        Ok(removed)
    }

    /// Total active references across all users (status endpoint).
    pub async fn count_active_references(&self) -> Result<i64, StoreError> {
        let count = self
            .conn
            .call(|conn| {
                let n = conn.query_row(
                    "SELECT COUNT(*) FROM face_references WHERE active = 1",
                    [],
                    |row| row.get::<_, i64>(0),
                )?;
                Ok(n)
            })
            .await?;
        Ok(count)
    }

    // --- audit log ---

    /// Append a verification-attempt record.
    pub async fn append_audit(
        &self,
        user: &str,
        action: &str,
        details: serde_json::Value,
    ) -> Result<(), StoreError> {
        let (user, action) = (user.to_string(), action.to_string());
        let timestamp = Utc::now().to_rfc3339();
        let details = details.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO audit_log (user, action, timestamp, details)
                     VALUES (?1, ?2, ?3, ?4)",
                    [user, action, timestamp, details],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Most recent audit entries for a user, newest first.
    pub async fn recent_audit(
        &self,
        user: &str,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        let user = user.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user, action, timestamp, details
                     FROM audit_log
                     WHERE user = ?1
                     ORDER BY id DESC
                     LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![user, limit as i64], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, Option<String>>(4)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, user, action, timestamp, details)| {
                Ok(AuditEntry {
                    id,
                    user,
                    action,
                    timestamp: parse_timestamp(&timestamp)?,
                    details: details
                        .as_deref()
                        .map(|d| serde_json::from_str(d).unwrap_or(serde_json::Value::Null))
                        .unwrap_or(serde_json::Value::Null),
                })
            })
            .collect()
    }

    // --- admin alerts ---

    /// Queue an alert for every administrator recipient.
    pub async fn insert_alert(
        &self,
        recipients: &[String],
        title: &str,
        message: &str,
        kind: &str,
    ) -> Result<(), StoreError> {
        let recipients = recipients.to_vec();
        let (title, message, kind) = (title.to_string(), message.to_string(), kind.to_string());
        let created_at = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for recipient in &recipients {
                    tx.execute(
                        "INSERT INTO alerts (recipient, title, message, kind, created_at, read)
                         VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                        [recipient, &title, &message, &kind, &created_at],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Unread alerts for one recipient, newest first.
    pub async fn unread_alerts(&self, recipient: &str) -> Result<Vec<AdminAlert>, StoreError> {
        let recipient = recipient.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, recipient, title, message, kind, created_at, read
                     FROM alerts
                     WHERE recipient = ?1 AND read = 0
                     ORDER BY id DESC",
                )?;
                let rows = stmt
                    .query_map([recipient], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, i64>(6)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, recipient, title, message, kind, created_at, read)| {
                Ok(AdminAlert {
                    id,
                    recipient,
                    title,
                    message,
                    kind,
                    created_at: parse_timestamp(&created_at)?,
                    read: read != 0,
                })
            })
            .collect()
    }

    /// Mark a single alert as read. Returns whether a row changed.
    pub async fn mark_alert_read(&self, id: i64) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .call(move |conn| {
                let n = conn.execute("UPDATE alerts SET read = 1 WHERE id = ?1", [id])?;
                Ok(n)
            })
            .await?;
        Ok(changed > 0)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow(format!("bad timestamp {raw:?}: {e}")))
}

/// Flat row shape shuttled across the connection thread boundary.
struct ReferenceRow {
    id: String,
    user: String,
    kind: String,
    model_label: String,
    embedding: Option<String>,
    payload: Option<Vec<u8>>,
    active: bool,
    created_at: String,
}

impl ReferenceRow {
    fn from_reference(reference: &StoredReference) -> Result<Self, StoreError> {
        let (embedding, payload) = match &reference.representation {
            Representation::Embedding(e) => {
                let json = serde_json::to_string(e)
                    .map_err(|err| StoreError::CorruptRow(err.to_string()))?;
                (Some(json), None)
            }
            Representation::RawImage(bytes) => (None, Some(bytes.clone())),
        };
        Ok(Self {
            id: reference.id.clone(),
            user: reference.user.clone(),
            kind: reference.representation.kind().as_str().to_string(),
            model_label: reference.model_label.clone(),
            embedding,
            payload,
            active: reference.active,
            created_at: reference.created_at.to_rfc3339(),
        })
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user: row.get(1)?,
            kind: row.get(2)?,
            model_label: row.get(3)?,
            embedding: row.get(4)?,
            payload: row.get(5)?,
            active: row.get::<_, i64>(6)? != 0,
            created_at: row.get(7)?,
        })
    }

    fn into_reference(self) -> Result<StoredReference, StoreError> {
        let kind = RepresentationKind::parse(&self.kind)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown kind {:?}", self.kind)))?;

        let representation = match kind {
            RepresentationKind::Embedding => {
                let json = self.embedding.ok_or_else(|| {
                    StoreError::CorruptRow(format!("embedding row {} has no vector", self.id))
                })?;
                let embedding: Embedding = serde_json::from_str(&json)
                    .map_err(|e| StoreError::CorruptRow(e.to_string()))?;
                Representation::Embedding(embedding)
            }
            RepresentationKind::RawImage => {
                let bytes = self.payload.ok_or_else(|| {
                    StoreError::CorruptRow(format!("raw_image row {} has no payload", self.id))
                })?;
                Representation::RawImage(bytes)
            }
        };

        Ok(StoredReference {
            id: self.id,
            user: self.user,
            model_label: self.model_label,
            representation,
            active: self.active,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}
