use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::ads::repo_types::{Ad, AdWithAuthor, GetAdsQuery, NewAd};
use crate::error::{AppError, AppResult};

/// Column list for `ads` SELECT queries.
const COLUMNS: &str = "a.id, a.user_id, a.title, a.description, a.image_url, a.price, a.created_at";

/// Storage of listings.
#[async_trait]
pub trait AdDirectory: Send + Sync {
    async fn create(&self, ad: NewAd) -> AppResult<Uuid>;
    /// Writes the mutable fields; the owner is never changed.
    async fn update(&self, id: Uuid, ad: &Ad) -> AppResult<()>;
    async fn get_by_id(&self, id: Uuid) -> AppResult<Ad>;
    async fn get_by_id_with_author(&self, id: Uuid) -> AppResult<AdWithAuthor>;
    /// Filtered, sorted page. Rows with equal sort keys are ordered by id.
    async fn get_all(&self, query: &GetAdsQuery) -> AppResult<Vec<AdWithAuthor>>;
    async fn delete(&self, id: Uuid) -> AppResult<()>;
}

#[derive(Clone)]
pub struct PgAdDirectory {
    db: PgPool,
}

impl PgAdDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

/// Builds the listing SQL. Sort column and direction come from closed enums;
/// everything user-supplied is bound.
fn listing_sql(query: &GetAdsQuery) -> String {
    let mut conditions: Vec<String> = Vec::new();
    let mut bind_idx = 1u32;

    if query.min_price_bound().is_some() {
        conditions.push(format!("a.price >= ${bind_idx}"));
        bind_idx += 1;
    }
    if query.max_price_bound().is_some() {
        conditions.push(format!("a.price <= ${bind_idx}"));
        bind_idx += 1;
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let dir = query.sort_dir.keyword();
    format!(
        "SELECT {COLUMNS}, u.login AS author_login \
         FROM ads a \
         JOIN users u ON u.id = a.user_id \
         {where_clause} \
         ORDER BY {col} {dir}, a.id {dir} \
         LIMIT ${bind_idx} OFFSET ${}",
        bind_idx + 1,
        col = query.sort_by.column(),
    )
}

#[async_trait]
impl AdDirectory for PgAdDirectory {
    async fn create(&self, ad: NewAd) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO ads (id, user_id, title, description, image_url, price)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(ad.user_id)
        .bind(&ad.title)
        .bind(&ad.description)
        .bind(&ad.image_url)
        .bind(ad.price)
        .execute(&self.db)
        .await
        .context("insert ad")?;
        Ok(id)
    }

    async fn update(&self, id: Uuid, ad: &Ad) -> AppResult<()> {
        let res = sqlx::query(
            r#"
            UPDATE ads
               SET title = $1, description = $2, image_url = $3, price = $4
             WHERE id = $5
            "#,
        )
        .bind(&ad.title)
        .bind(&ad.description)
        .bind(&ad.image_url)
        .bind(ad.price)
        .bind(id)
        .execute(&self.db)
        .await
        .context("update ad")?;

        if res.rows_affected() == 0 {
            return Err(AppError::AdNotFound);
        }
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Ad> {
        let sql = format!("SELECT {COLUMNS} FROM ads a WHERE a.id = $1");
        sqlx::query_as::<_, Ad>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("select ad by id")?
            .ok_or(AppError::AdNotFound)
    }

    async fn get_by_id_with_author(&self, id: Uuid) -> AppResult<AdWithAuthor> {
        let sql = format!(
            "SELECT {COLUMNS}, u.login AS author_login \
             FROM ads a JOIN users u ON u.id = a.user_id \
             WHERE a.id = $1"
        );
        sqlx::query_as::<_, AdWithAuthor>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("select ad with author")?
            .ok_or(AppError::AdNotFound)
    }

    async fn get_all(&self, query: &GetAdsQuery) -> AppResult<Vec<AdWithAuthor>> {
        let sql = listing_sql(query);
        let mut q = sqlx::query_as::<_, AdWithAuthor>(&sql);
        if let Some(min) = query.min_price_bound() {
            q = q.bind(min);
        }
        if let Some(max) = query.max_price_bound() {
            q = q.bind(max);
        }
        let rows = q
            .bind(query.limit())
            .bind(query.offset())
            .fetch_all(&self.db)
            .await
            .context("list ads")?;
        Ok(rows)
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let res = sqlx::query("DELETE FROM ads WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete ad")?;

        if res.rows_affected() == 0 {
            return Err(AppError::AdNotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ads::repo_types::{SortBy, SortDir};

    fn squash(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn unfiltered_listing() {
        let sql = squash(&listing_sql(&GetAdsQuery::default()));
        assert!(!sql.contains("WHERE"));
        assert!(sql.ends_with("ORDER BY a.created_at DESC, a.id DESC LIMIT $1 OFFSET $2"));
    }

    #[test]
    fn both_price_bounds() {
        let sql = squash(&listing_sql(&GetAdsQuery {
            min_price: 5.0,
            max_price: 50.0,
            sort_by: SortBy::Price,
            sort_dir: SortDir::Asc,
            ..Default::default()
        }));
        assert!(sql.contains("WHERE a.price >= $1 AND a.price <= $2"));
        assert!(sql.ends_with("ORDER BY a.price ASC, a.id ASC LIMIT $3 OFFSET $4"));
    }

    #[test]
    fn only_max_bound() {
        let sql = squash(&listing_sql(&GetAdsQuery {
            max_price: 50.0,
            ..Default::default()
        }));
        assert!(sql.contains("WHERE a.price <= $1"));
        assert!(sql.ends_with("LIMIT $2 OFFSET $3"));
    }
}
