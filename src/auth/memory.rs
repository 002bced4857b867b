use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo::UserDirectory;
use crate::auth::repo_types::{NewUser, Session, User};
use crate::error::{AppError, AppResult};

struct Record {
    user: User,
    session: Option<Session>,
}

/// Process-local user directory.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<Uuid, Record>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn login_of(&self, id: Uuid) -> Option<String> {
        self.users.read().await.get(&id).map(|r| r.user.login.clone())
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn create(&self, user: NewUser) -> AppResult<Uuid> {
        let mut users = self.users.write().await;
        if users.values().any(|r| r.user.login == user.login) {
            return Err(AppError::UserExists);
        }
        let id = Uuid::new_v4();
        users.insert(
            id,
            Record {
                user: User {
                    id,
                    login: user.login,
                    password_hash: user.password_hash,
                    created_at: OffsetDateTime::now_utc(),
                },
                session: None,
            },
        );
        Ok(id)
    }

    async fn get_by_login(&self, login: &str) -> AppResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|r| r.user.login == login)
            .map(|r| r.user.clone()))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        self.users
            .read()
            .await
            .get(&id)
            .map(|r| r.user.clone())
            .ok_or(AppError::UserNotFound)
    }

    async fn get_by_refresh_token(&self, refresh_token: &str) -> AppResult<User> {
        let now = OffsetDateTime::now_utc();
        let users = self.users.read().await;
        users
            .values()
            .find(|r| {
                r.session
                    .as_ref()
                    .is_some_and(|s| s.refresh_token == refresh_token && s.expires_at > now)
            })
            .map(|r| r.user.clone())
            .ok_or(AppError::UserNotFound)
    }

    async fn set_session(&self, id: Uuid, session: Session) -> AppResult<()> {
        let mut users = self.users.write().await;
        let record = users.get_mut(&id).ok_or(AppError::UserNotFound)?;
        record.session = Some(session);
        Ok(())
    }
}
