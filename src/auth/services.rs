use std::sync::Arc;

use anyhow::Context;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::dto::{PublicUser, Tokens};
use crate::auth::jwt::TokenManager;
use crate::auth::password::CredentialHasher;
use crate::auth::repo::UserDirectory;
use crate::auth::repo_types::{NewUser, Session};
use crate::error::{AppError, AppResult};

const LOGIN_MIN: usize = 3;
const LOGIN_MAX: usize = 30;
const PASSWORD_MIN: usize = 6;

/// Sign-up, sign-in and refresh-token rotation.
pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    hasher: CredentialHasher,
    tokens: Arc<TokenManager>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        hasher: CredentialHasher,
        tokens: Arc<TokenManager>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
            access_ttl,
            refresh_ttl,
        }
    }

    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, login: &str, password: &str) -> AppResult<PublicUser> {
        let login_len = login.chars().count();
        if !(LOGIN_MIN..=LOGIN_MAX).contains(&login_len) {
            return Err(AppError::invalid(
                "login",
                format!("length must be between {LOGIN_MIN} and {LOGIN_MAX}"),
            ));
        }
        if password.chars().count() < PASSWORD_MIN {
            return Err(AppError::invalid(
                "password",
                format!("must be at least {PASSWORD_MIN} characters"),
            ));
        }

        let password_hash = self.hash(password).await?;

        // Duplicates surface from the insert itself.
        let id = match self
            .users
            .create(NewUser {
                login: login.to_string(),
                password_hash,
            })
            .await
        {
            Ok(id) => id,
            Err(AppError::UserExists) => {
                warn!(login = %login, "login already registered");
                return Err(AppError::UserExists);
            }
            Err(e) => {
                error!(error = %e, "create user failed");
                return Err(e);
            }
        };

        let user = self.users.get_by_id(id).await.map_err(|e| {
            error!(error = %e, user_id = %id, "re-read created user failed");
            e
        })?;

        info!(user_id = %user.id, login = %user.login, "user registered");
        Ok(user.into())
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, login: &str, password: &str) -> AppResult<Tokens> {
        let user = match self.users.get_by_login(login).await? {
            Some(u) => u,
            None => {
                let decoy = self.hasher.decoy_hash().to_string();
                self.check(password, &decoy).await?;
                warn!(login = %login, "sign-in unknown login");
                return Err(AppError::InvalidCredentials);
            }
        };

        if !self.check(password, &user.password_hash).await? {
            warn!(user_id = %user.id, "sign-in invalid password");
            return Err(AppError::InvalidCredentials);
        }

        let tokens = self.create_session(user.id).await?;
        info!(user_id = %user.id, "user signed in");
        Ok(tokens)
    }

    /// Exchanges the current refresh token for a new pair. The presented token
    /// stops working as soon as the new session is stored.
    #[instrument(skip_all)]
    pub async fn refresh_tokens(&self, refresh_token: &str) -> AppResult<Tokens> {
        if refresh_token.is_empty() {
            return Err(AppError::invalid("refresh_token", "must not be empty"));
        }

        let user = self
            .users
            .get_by_refresh_token(refresh_token)
            .await
            .map_err(|e| {
                match &e {
                    AppError::UserNotFound => warn!("unknown or expired refresh token"),
                    other => error!(error = %other, "lookup by refresh token failed"),
                }
                e
            })?;

        let tokens = self.create_session(user.id).await?;
        info!(user_id = %user.id, "tokens refreshed");
        Ok(tokens)
    }

    pub async fn get_user(&self, id: Uuid) -> AppResult<PublicUser> {
        Ok(self.users.get_by_id(id).await?.into())
    }

    /// Nothing is persisted until both tokens exist; a failed write leaves the
    /// previous session in place.
    async fn create_session(&self, user_id: Uuid) -> AppResult<Tokens> {
        let access_token = self
            .tokens
            .new_access_token(user_id, self.access_ttl)
            .context("sign access token")?;
        let refresh_token = self
            .tokens
            .new_refresh_token()
            .context("generate refresh token")?;

        let session = Session {
            refresh_token: refresh_token.clone(),
            expires_at: OffsetDateTime::now_utc() + self.refresh_ttl,
        };
        self.users.set_session(user_id, session).await.map_err(|e| {
            error!(error = %e, user_id = %user_id, "store session failed");
            e
        })?;

        Ok(Tokens {
            access_token,
            refresh_token,
        })
    }

    async fn hash(&self, password: &str) -> AppResult<String> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .context("hashing task panicked")?
            .context("hash password")?;
        Ok(hash)
    }

    async fn check(&self, password: &str, hash: &str) -> AppResult<bool> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let hash = hash.to_string();
        let ok = tokio::task::spawn_blocking(move || hasher.check(&password, &hash))
            .await
            .context("verify task panicked")?;
        Ok(ok)
    }
}

#[cfg(test)]
pub(crate) fn test_service(users: Arc<dyn UserDirectory>) -> AuthService {
    use crate::auth::{jwt, password};

    let tokens = Arc::new(TokenManager::new(&jwt::test_config()).expect("token manager"));
    AuthService::new(
        users,
        password::test_hasher(),
        tokens,
        Duration::minutes(5),
        Duration::hours(1),
    )
}
