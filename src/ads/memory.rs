use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::ads::repo::AdDirectory;
use crate::ads::repo_types::{Ad, AdWithAuthor, GetAdsQuery, NewAd, SortBy, SortDir};
use crate::auth::memory::InMemoryUserDirectory;
use crate::error::{AppError, AppResult};

/// Process-local ad directory. Author logins are resolved through the
/// in-memory user directory it was built with.
pub struct InMemoryAdDirectory {
    ads: RwLock<HashMap<Uuid, Ad>>,
    users: Arc<InMemoryUserDirectory>,
}

impl InMemoryAdDirectory {
    pub fn new(users: Arc<InMemoryUserDirectory>) -> Self {
        Self {
            ads: RwLock::new(HashMap::new()),
            users,
        }
    }

    async fn with_author(&self, ad: Ad) -> AppResult<AdWithAuthor> {
        let author_login = self.users.login_of(ad.user_id).await.ok_or_else(|| {
            anyhow::anyhow!("ad {} references missing user {}", ad.id, ad.user_id)
        })?;
        Ok(AdWithAuthor { ad, author_login })
    }
}

fn compare(a: &Ad, b: &Ad, query: &GetAdsQuery) -> Ordering {
    let primary = match query.sort_by {
        SortBy::Date => a.created_at.cmp(&b.created_at),
        SortBy::Price => a.price.total_cmp(&b.price),
    };
    let ord = primary.then_with(|| a.id.cmp(&b.id));
    match query.sort_dir {
        SortDir::Asc => ord,
        SortDir::Desc => ord.reverse(),
    }
}

#[async_trait]
impl AdDirectory for InMemoryAdDirectory {
    async fn create(&self, ad: NewAd) -> AppResult<Uuid> {
        let id = Uuid::new_v4();
        self.ads.write().await.insert(
            id,
            Ad {
                id,
                user_id: ad.user_id,
                title: ad.title,
                description: ad.description,
                image_url: ad.image_url,
                price: ad.price,
                created_at: OffsetDateTime::now_utc(),
            },
        );
        Ok(id)
    }

    async fn update(&self, id: Uuid, ad: &Ad) -> AppResult<()> {
        let mut ads = self.ads.write().await;
        let stored = ads.get_mut(&id).ok_or(AppError::AdNotFound)?;
        stored.title = ad.title.clone();
        stored.description = ad.description.clone();
        stored.image_url = ad.image_url.clone();
        stored.price = ad.price;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Ad> {
        self.ads
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AppError::AdNotFound)
    }

    async fn get_by_id_with_author(&self, id: Uuid) -> AppResult<AdWithAuthor> {
        let ad = self.get_by_id(id).await?;
        self.with_author(ad).await
    }

    async fn get_all(&self, query: &GetAdsQuery) -> AppResult<Vec<AdWithAuthor>> {
        let mut page: Vec<Ad> = {
            let ads = self.ads.read().await;
            ads.values()
                .filter(|a| query.min_price_bound().map_or(true, |min| a.price >= min))
                .filter(|a| query.max_price_bound().map_or(true, |max| a.price <= max))
                .cloned()
                .collect()
        };
        page.sort_by(|a, b| compare(a, b, query));

        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit()).unwrap_or(usize::MAX);

        let mut out = Vec::new();
        for ad in page.into_iter().skip(offset).take(limit) {
            out.push(self.with_author(ad).await?);
        }
        Ok(out)
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.ads
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(AppError::AdNotFound)
    }
}
