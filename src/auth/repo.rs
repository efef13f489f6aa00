use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, ProfileChanges, UserRecord, DEFAULT_PHOTO};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already in use")]
    DuplicateEmail,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateEmail,
            _ => StoreError::Other(e.into()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for user records. All lookups skip inactive users.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, user: NewUser) -> StoreResult<UserRecord>;
    async fn find_active_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;
    async fn find_active_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>>;
    async fn list_active(&self) -> StoreResult<Vec<UserRecord>>;
    /// Returns `None` when the user is gone or inactive.
    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> StoreResult<Option<UserRecord>>;
    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> StoreResult<Option<UserRecord>>;
    /// Soft delete. Returns false when there was no active user to deactivate.
    async fn deactivate(&self, id: Uuid) -> StoreResult<bool>;
}

const USER_COLUMNS: &str = "id, name, email, phone, photo, password_hash, role, \
                            password_changed_at, active, created_at";

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, user: NewUser) -> StoreResult<UserRecord> {
        let sql = format!(
            "INSERT INTO users (id, name, email, phone, photo, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(DEFAULT_PHOTO)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .fetch_one(&self.db)
            .await?;
        Ok(row)
    }

    async fn find_active_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND active");
        let row = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn find_active_by_id(&self, id: Uuid) -> StoreResult<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND active");
        let row = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn list_active(&self) -> StoreResult<Vec<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE active ORDER BY created_at");
        let rows = sqlx::query_as::<_, UserRecord>(&sql)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> StoreResult<Option<UserRecord>> {
        let sql = format!(
            "UPDATE users SET password_hash = $2, password_changed_at = $3 \
             WHERE id = $1 AND active \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(password_hash)
            .bind(changed_at)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> StoreResult<Option<UserRecord>> {
        let sql = format!(
            "UPDATE users SET \
                 name = COALESCE($2, name), \
                 email = COALESCE($3, email), \
                 phone = COALESCE($4, phone) \
             WHERE id = $1 AND active \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .bind(changes.name)
            .bind(changes.email)
            .bind(changes.phone)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    async fn deactivate(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE users SET active = FALSE WHERE id = $1 AND active")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
