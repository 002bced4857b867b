use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, Session, User};
use crate::db::is_unique_violation;
use crate::error::{AppError, AppResult};

/// Storage of accounts and their current refresh session.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fails with `UserExists` when the login is taken.
    async fn create(&self, user: NewUser) -> AppResult<Uuid>;
    async fn get_by_login(&self, login: &str) -> AppResult<Option<User>>;
    async fn get_by_id(&self, id: Uuid) -> AppResult<User>;
    /// Only a stored, unexpired session matches.
    async fn get_by_refresh_token(&self, refresh_token: &str) -> AppResult<User>;
    async fn set_session(&self, id: Uuid, session: Session) -> AppResult<()>;
}

#[derive(Clone)]
pub struct PgUserDirectory {
    db: PgPool,
}

impl PgUserDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn create(&self, user: NewUser) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        let res = sqlx::query(
            r#"
            INSERT INTO users (id, login, password_hash)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(id)
        .bind(&user.login)
        .bind(&user.password_hash)
        .execute(&self.db)
        .await;

        match res {
            Ok(_) => Ok(id),
            Err(e) if is_unique_violation(&e) => {
                debug!(login = %user.login, "login already taken");
                Err(AppError::UserExists)
            }
            Err(e) => Err(anyhow::Error::new(e).context("insert user").into()),
        }
    }

    async fn get_by_login(&self, login: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, login, password_hash, created_at
            FROM users
            WHERE login = $1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.db)
        .await
        .context("select user by login")?;
        Ok(user)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"SELECT id, login, password_hash, created_at FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("select user by id")?
        .ok_or(AppError::UserNotFound)
    }

    async fn get_by_refresh_token(&self, refresh_token: &str) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, login, password_hash, created_at
            FROM users
            WHERE refresh_token = $1 AND refresh_expires_at > NOW()
            "#,
        )
        .bind(refresh_token)
        .fetch_optional(&self.db)
        .await
        .context("select user by refresh token")?
        .ok_or(AppError::UserNotFound)
    }

    async fn set_session(&self, id: Uuid, session: Session) -> AppResult<()> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET refresh_token = $1, refresh_expires_at = $2, last_visit_at = NOW()
             WHERE id = $3
            "#,
        )
        .bind(&session.refresh_token)
        .bind(session.expires_at)
        .bind(id)
        .execute(&self.db)
        .await
        .context("update user session")?;

        if res.rows_affected() == 0 {
            return Err(AppError::UserNotFound);
        }
        Ok(())
    }
}
