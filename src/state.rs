use std::sync::Arc;

use time::Duration;
use tracing::{info, warn};

use crate::ads::{
    memory::InMemoryAdDirectory,
    repo::{AdDirectory, PgAdDirectory},
    services::AdService,
};
use crate::auth::{
    jwt::TokenManager,
    memory::InMemoryUserDirectory,
    password::CredentialHasher,
    repo::{PgUserDirectory, UserDirectory},
    services::AuthService,
};
use crate::config::{AppConfig, StorageBackend};
use crate::db;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: Arc<TokenManager>,
    pub auth: Arc<AuthService>,
    pub ads: Arc<AdService>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let (users, ads): (Arc<dyn UserDirectory>, Arc<dyn AdDirectory>) = match config.storage {
            StorageBackend::Postgres => {
                let pool = db::connect(&config).await?;
                info!("connected to postgres");
                (
                    Arc::new(PgUserDirectory::new(pool.clone())) as Arc<dyn UserDirectory>,
                    Arc::new(PgAdDirectory::new(pool)) as Arc<dyn AdDirectory>,
                )
            }
            StorageBackend::Memory => {
                warn!("using in-memory storage; data is lost on restart");
                in_memory()
            }
        };
        Self::from_parts(config, users, ads)
    }

    pub fn from_parts(
        config: AppConfig,
        users: Arc<dyn UserDirectory>,
        ads: Arc<dyn AdDirectory>,
    ) -> anyhow::Result<Self> {
        let tokens = Arc::new(TokenManager::new(&config.jwt)?);
        let hasher = CredentialHasher::new(&config.hash)?;
        let auth = AuthService::new(
            users,
            hasher,
            tokens.clone(),
            Duration::minutes(config.jwt.access_ttl_minutes),
            Duration::minutes(config.jwt.refresh_ttl_minutes),
        );

        Ok(Self {
            config: Arc::new(config),
            tokens,
            auth: Arc::new(auth),
            ads: Arc::new(AdService::new(ads)),
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::auth::jwt::test_config;
        use crate::config::HashConfig;

        let config = AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            storage: StorageBackend::Memory,
            database_url: None,
            database_max_connections: 1,
            jwt: test_config(),
            hash: HashConfig {
                memory_kib: argon2::Params::MIN_M_COST,
                iterations: 1,
                parallelism: 1,
            },
        };
        let (users, ads) = in_memory();
        Self::from_parts(config, users, ads).expect("fake state")
    }
}

fn in_memory() -> (Arc<dyn UserDirectory>, Arc<dyn AdDirectory>) {
    let users = Arc::new(InMemoryUserDirectory::new());
    let ads = Arc::new(InMemoryAdDirectory::new(users.clone()));
    (users as Arc<dyn UserDirectory>, ads as Arc<dyn AdDirectory>)
}
