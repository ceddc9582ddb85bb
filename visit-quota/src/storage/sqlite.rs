//! SQLite host storage
//!
//! Keeps the member directory, per-user meta values and site options in
//! three tables. Deleting a member deletes its meta rows.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::error::{QuotaError, Result};
use crate::host::{Member, MemberRegistry, OptionStore, UserDirectory, UserId, UserMetaStore};

/// Host storage over a SQLite pool
#[derive(Clone)]
pub struct SqliteHost {
    db: SqlitePool,
}

fn db_id(id: UserId) -> Result<i64> {
    i64::try_from(id).map_err(|_| QuotaError::Storage(format!("User id out of range: {}", id)))
}

impl SqliteHost {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Connect and create the tables
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = SqlitePool::connect(database_url).await?;
        let host = Self::new(db);
        host.init_db().await?;
        info!("Connected to {}", database_url);
        Ok(host)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                roles TEXT NOT NULL DEFAULT '[]',
                super_admin BOOLEAN NOT NULL DEFAULT 0,
                profile_url TEXT,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS usermeta (
                user_id INTEGER NOT NULL,
                meta_key TEXT NOT NULL,
                meta_value TEXT NOT NULL,
                PRIMARY KEY (user_id, meta_key)
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS options (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// All members, ordered by id
    pub async fn list_members(&self) -> Result<Vec<Member>> {
        let rows = sqlx::query("SELECT id, roles, super_admin, profile_url FROM users ORDER BY id")
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(row_to_member).collect()
    }
}

fn row_to_member(row: sqlx::sqlite::SqliteRow) -> Result<Member> {
    let id: i64 = row.try_get("id")?;
    let roles: String = row.try_get("roles")?;
    let roles: BTreeSet<String> = serde_json::from_str(&roles)?;

    Ok(Member {
        id: id as UserId,
        roles,
        super_admin: row.try_get("super_admin")?,
        profile_url: row.try_get("profile_url")?,
    })
}

#[async_trait]
impl UserDirectory for SqliteHost {
    async fn find_member(&self, id: UserId) -> Result<Option<Member>> {
        let row = sqlx::query("SELECT id, roles, super_admin, profile_url FROM users WHERE id = ?")
            .bind(db_id(id)?)
            .fetch_optional(&self.db)
            .await?;

        row.map(row_to_member).transpose()
    }
}

#[async_trait]
impl MemberRegistry for SqliteHost {
    async fn upsert_member(&self, member: Member) -> Result<()> {
        let roles = serde_json::to_string(&member.roles)?;

        sqlx::query(
            r#"
            INSERT INTO users (id, roles, super_admin, profile_url, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                roles = excluded.roles,
                super_admin = excluded.super_admin,
                profile_url = excluded.profile_url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(db_id(member.id)?)
        .bind(&roles)
        .bind(member.super_admin)
        .bind(&member.profile_url)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        debug!("Stored member {}", member.id);
        Ok(())
    }

    async fn remove_member(&self, id: UserId) -> Result<bool> {
        let id = db_id(id)?;
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM usermeta WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserMetaStore for SqliteHost {
    async fn get_meta(&self, user: UserId, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT meta_value FROM usermeta WHERE user_id = ? AND meta_key = ?",
        )
        .bind(db_id(user)?)
        .bind(key)
        .fetch_optional(&self.db)
        .await?;

        Ok(value)
    }

    async fn set_meta(&self, user: UserId, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO usermeta (user_id, meta_key, meta_value) VALUES (?, ?, ?)
            ON CONFLICT(user_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value
            "#,
        )
        .bind(db_id(user)?)
        .bind(key)
        .bind(value)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl OptionStore for SqliteHost {
    async fn get_option(&self, name: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM options WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.db)
            .await?;

        Ok(value)
    }

    async fn set_option(&self, name: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO options (name, value) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(name)
        .bind(value)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
