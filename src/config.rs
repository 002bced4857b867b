use anyhow::Context;

const DEFAULT_ACCESS_TTL_MINUTES: i64 = 60;
const DEFAULT_REFRESH_TTL_MINUTES: i64 = 60 * 24 * 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Argon2 work factor.
#[derive(Debug, Clone)]
pub struct HashConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub hash: HashConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| get(key).and_then(|v| v.trim().parse::<i64>().ok());
        let parsed_u32 = |key: &str| get(key).and_then(|v| v.trim().parse::<u32>().ok());

        let storage = match get("STORAGE_BACKEND").as_deref() {
            None | Some("postgres") => StorageBackend::Postgres,
            Some("memory") => StorageBackend::Memory,
            Some(other) => anyhow::bail!("unknown STORAGE_BACKEND {other:?}"),
        };

        let database_url = get("DATABASE_URL").filter(|v| !v.is_empty());
        if storage == StorageBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set for the postgres storage backend");
        }

        let secret = get("JWT_SECRET")
            .filter(|v| !v.is_empty())
            .context("JWT_SECRET must be set and non-empty")?;

        let defaults = HashConfig::default();
        let jwt = JwtConfig {
            secret,
            issuer: get("JWT_ISSUER").unwrap_or_else(|| "marketplace".into()),
            audience: get("JWT_AUDIENCE").unwrap_or_else(|| "marketplace-users".into()),
            access_ttl_minutes: parsed("ACCESS_TOKEN_TTL_MINUTES")
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_ACCESS_TTL_MINUTES),
            refresh_ttl_minutes: parsed("REFRESH_TOKEN_TTL_MINUTES")
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_REFRESH_TTL_MINUTES),
        };

        Ok(Self {
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: get("APP_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            storage,
            database_url,
            database_max_connections: parsed_u32("DATABASE_MAX_CONNECTIONS").unwrap_or(10),
            jwt,
            hash: HashConfig {
                memory_kib: parsed_u32("HASH_MEMORY_KIB").unwrap_or(defaults.memory_kib),
                iterations: parsed_u32("HASH_ITERATIONS").unwrap_or(defaults.iterations),
                parallelism: parsed_u32("HASH_PARALLELISM").unwrap_or(defaults.parallelism),
            },
        })
    }
}
