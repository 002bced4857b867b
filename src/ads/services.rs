use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::ads::dto::{CreateAd, UpdateAd};
use crate::ads::repo::AdDirectory;
use crate::ads::repo_types::{Ad, AdResponse, GetAdsQuery, NewAd};
use crate::error::{AppError, AppResult};

const TITLE_MAX: usize = 100;
const DESCRIPTION_MAX: usize = 1000;

pub struct AdService {
    ads: Arc<dyn AdDirectory>,
}

fn validate(title: &str, description: &str, image_url: Option<&str>, price: f64) -> AppResult<()> {
    let title_len = title.chars().count();
    if title_len < 1 || title_len > TITLE_MAX {
        return Err(AppError::invalid(
            "title",
            format!("length must be between 1 and {TITLE_MAX}"),
        ));
    }
    if description.chars().count() > DESCRIPTION_MAX {
        return Err(AppError::invalid(
            "description",
            format!("length must be at most {DESCRIPTION_MAX}"),
        ));
    }
    if let Some(url) = image_url {
        if !is_absolute_uri(url) {
            return Err(AppError::invalid("image_url", "must be an absolute URI"));
        }
    }
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::invalid("price", "must be a non-negative number"));
    }
    Ok(())
}

/// Absolute URL with a host. Raw non-ASCII and stray spaces are rejected
/// rather than silently percent-encoded.
fn is_absolute_uri(s: &str) -> bool {
    if !s.is_ascii() || s.contains(char::is_whitespace) {
        return false;
    }
    match Url::parse(s) {
        Ok(url) => url.has_host(),
        Err(_) => false,
    }
}

/// Empty string means "no image".
fn normalize_image_url(url: Option<String>) -> Option<String> {
    url.filter(|u| !u.is_empty())
}

impl AdService {
    pub fn new(ads: Arc<dyn AdDirectory>) -> Self {
        Self { ads }
    }

    #[instrument(skip(self, input))]
    pub async fn create(&self, input: CreateAd, owner_id: Uuid) -> AppResult<Ad> {
        let image_url = normalize_image_url(input.image_url);
        validate(
            &input.title,
            &input.description,
            image_url.as_deref(),
            input.price,
        )?;

        let id = self
            .ads
            .create(NewAd {
                user_id: owner_id,
                title: input.title,
                description: input.description,
                image_url,
                price: input.price,
            })
            .await
            .map_err(|e| {
                error!(error = %e, "create ad failed");
                e
            })?;

        // Return the row as stored, with server-assigned fields.
        let ad = self.ads.get_by_id(id).await?;
        info!(ad_id = %ad.id, user_id = %owner_id, "ad created");
        Ok(ad)
    }

    #[instrument(skip(self, input))]
    pub async fn update(&self, ad_id: Uuid, requester_id: Uuid, input: UpdateAd) -> AppResult<Ad> {
        let mut ad = self.ads.get_by_id(ad_id).await?;
        if ad.user_id != requester_id {
            warn!(ad_id = %ad_id, user_id = %requester_id, "update by non-owner");
            return Err(AppError::Forbidden);
        }

        if let Some(title) = input.title {
            ad.title = title;
        }
        if let Some(description) = input.description {
            ad.description = description;
        }
        if input.image_url.is_some() {
            ad.image_url = normalize_image_url(input.image_url);
        }
        if let Some(price) = input.price {
            ad.price = price;
        }
        validate(&ad.title, &ad.description, ad.image_url.as_deref(), ad.price)?;

        self.ads.update(ad_id, &ad).await.map_err(|e| {
            if !matches!(e, AppError::AdNotFound) {
                error!(error = %e, ad_id = %ad_id, "update ad failed");
            }
            e
        })?;

        info!(ad_id = %ad_id, "ad updated");
        Ok(ad)
    }

    #[cfg(test)]
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Ad> {
        self.ads.get_by_id(id).await
    }

    #[instrument(skip(self))]
    pub async fn get_by_id_with_author(
        &self,
        id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> AppResult<AdResponse> {
        let ad = self.ads.get_by_id_with_author(id).await?;
        Ok(AdResponse::for_viewer(ad, viewer_id))
    }

    #[instrument(skip(self))]
    pub async fn get_all(
        &self,
        query: &GetAdsQuery,
        viewer_id: Option<Uuid>,
    ) -> AppResult<Vec<AdResponse>> {
        let ads = self.ads.get_all(query).await.map_err(|e| {
            error!(error = %e, "list ads failed");
            e
        })?;
        Ok(ads
            .into_iter()
            .map(|ad| AdResponse::for_viewer(ad, viewer_id))
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, ad_id: Uuid, requester_id: Uuid) -> AppResult<()> {
        let ad = self.ads.get_by_id(ad_id).await?;
        if ad.user_id != requester_id {
            warn!(ad_id = %ad_id, user_id = %requester_id, "delete by non-owner");
            return Err(AppError::Forbidden);
        }
        self.ads.delete(ad_id).await?;
        info!(ad_id = %ad_id, "ad deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ads::memory::InMemoryAdDirectory;
    use crate::ads::repo_types::{SortBy, SortDir};
    use crate::auth::memory::InMemoryUserDirectory;
    use crate::auth::repo::UserDirectory;
    use crate::auth::repo_types::NewUser;

    struct Fixture {
        svc: AdService,
        users: Arc<InMemoryUserDirectory>,
    }

    impl Fixture {
        fn new() -> Self {
            let users = Arc::new(InMemoryUserDirectory::new());
            let ads = Arc::new(InMemoryAdDirectory::new(users.clone()));
            Self {
                svc: AdService::new(ads),
                users,
            }
        }

        async fn user(&self, login: &str) -> Uuid {
            self.users
                .create(NewUser {
                    login: login.into(),
                    password_hash: "x".into(),
                })
                .await
                .unwrap()
        }
    }

    fn input(title: &str, price: f64) -> CreateAd {
        CreateAd {
            title: title.into(),
            description: "desc".into(),
            image_url: None,
            price,
        }
    }

    #[tokio::test]
    async fn title_length_bounds() {
        let fx = Fixture::new();
        let owner = fx.user("alice").await;

        assert!(matches!(
            fx.svc.create(input("", 1.0), owner).await,
            Err(AppError::InvalidInput { field: "title", .. })
        ));
        assert!(fx.svc.create(input(&"t".repeat(100), 1.0), owner).await.is_ok());
        assert!(matches!(
            fx.svc.create(input(&"t".repeat(101), 1.0), owner).await,
            Err(AppError::InvalidInput { field: "title", .. })
        ));
    }

    #[tokio::test]
    async fn other_fields_validated() {
        let fx = Fixture::new();
        let owner = fx.user("alice").await;

        let long = CreateAd {
            description: "d".repeat(1001),
            ..input("ok", 1.0)
        };
        assert!(matches!(
            fx.svc.create(long, owner).await,
            Err(AppError::InvalidInput { field: "description", .. })
        ));

        let bad_url = CreateAd {
            image_url: Some("not a url".into()),
            ..input("ok", 1.0)
        };
        assert!(matches!(
            fx.svc.create(bad_url, owner).await,
            Err(AppError::InvalidInput { field: "image_url", .. })
        ));

        let relative = CreateAd {
            image_url: Some("/images/1.png".into()),
            ..input("ok", 1.0)
        };
        assert!(fx.svc.create(relative, owner).await.is_err());

        assert!(matches!(
            fx.svc.create(input("ok", -0.5), owner).await,
            Err(AppError::InvalidInput { field: "price", .. })
        ));
        assert!(fx.svc.create(input("ok", f64::NAN), owner).await.is_err());
        assert!(fx.svc.create(input("free", 0.0), owner).await.is_ok());
    }

    #[test]
    fn image_url_must_be_absolute_with_host() {
        assert!(is_absolute_uri("https://img.example.com/a.png"));
        assert!(is_absolute_uri("http://localhost:9000/b/c.jpg?x=1"));
        assert!(!is_absolute_uri("mailto:bob@example.com"));
        assert!(!is_absolute_uri("https://a.com/ünï.png"));
        assert!(!is_absolute_uri("https://a.com/a b.png"));
        assert!(!is_absolute_uri("img.example.com/a.png"));
    }

    #[tokio::test]
    async fn create_then_fetch_roundtrip() {
        let fx = Fixture::new();
        let owner = fx.user("alice").await;
        let created = fx
            .svc
            .create(
                CreateAd {
                    title: "Road bike".into(),
                    description: "Barely used".into(),
                    image_url: Some("https://img.example.com/bike.png".into()),
                    price: 420.5,
                },
                owner,
            )
            .await
            .unwrap();

        let fetched = fx.svc.get_by_id(created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.title, "Road bike");
        assert_eq!(fetched.description, "Barely used");
        assert_eq!(
            fetched.image_url.as_deref(),
            Some("https://img.example.com/bike.png")
        );
        assert_eq!(fetched.price, 420.5);
        assert_eq!(fetched.user_id, owner);
    }

    #[tokio::test]
    async fn partial_update_keeps_absent_fields() {
        let fx = Fixture::new();
        let owner = fx.user("alice").await;
        let ad = fx
            .svc
            .create(
                CreateAd {
                    image_url: Some("https://img.example.com/a.png".into()),
                    ..input("Lamp", 15.0)
                },
                owner,
            )
            .await
            .unwrap();

        let updated = fx
            .svc
            .update(
                ad.id,
                owner,
                UpdateAd {
                    price: Some(12.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.price, 12.0);
        assert_eq!(updated.title, "Lamp");
        assert_eq!(updated.image_url, ad.image_url);

        let cleared = fx
            .svc
            .update(
                ad.id,
                owner,
                UpdateAd {
                    image_url: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.image_url, None);
        assert_eq!(fx.svc.get_by_id(ad.id).await.unwrap(), cleared);
    }

    #[tokio::test]
    async fn update_revalidates_merged_ad() {
        let fx = Fixture::new();
        let owner = fx.user("alice").await;
        let ad = fx.svc.create(input("Lamp", 15.0), owner).await.unwrap();

        let res = fx
            .svc
            .update(
                ad.id,
                owner,
                UpdateAd {
                    title: Some(String::new()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(res, Err(AppError::InvalidInput { field: "title", .. })));
        assert_eq!(fx.svc.get_by_id(ad.id).await.unwrap(), ad);
    }

    #[tokio::test]
    async fn non_owner_cannot_update_or_delete() {
        let fx = Fixture::new();
        let owner = fx.user("alice").await;
        let stranger = fx.user("mallory").await;
        let ad = fx.svc.create(input("Lamp", 15.0), owner).await.unwrap();

        let res = fx
            .svc
            .update(
                ad.id,
                stranger,
                UpdateAd {
                    title: Some("Mine now".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(res, Err(AppError::Forbidden)));
        assert_eq!(fx.svc.get_by_id(ad.id).await.unwrap(), ad);

        assert!(matches!(
            fx.svc.delete(ad.id, stranger).await,
            Err(AppError::Forbidden)
        ));
        assert!(fx.svc.get_by_id(ad.id).await.is_ok());
    }

    #[tokio::test]
    async fn missing_ad_is_not_found() {
        let fx = Fixture::new();
        let owner = fx.user("alice").await;
        let missing = Uuid::new_v4();

        assert!(matches!(
            fx.svc.update(missing, owner, UpdateAd::default()).await,
            Err(AppError::AdNotFound)
        ));
        assert!(matches!(
            fx.svc.get_by_id_with_author(missing, None).await,
            Err(AppError::AdNotFound)
        ));
    }

    #[tokio::test]
    async fn delete_missing_is_not_found_every_time() {
        let fx = Fixture::new();
        let owner = fx.user("alice").await;
        let ad = fx.svc.create(input("Lamp", 15.0), owner).await.unwrap();

        fx.svc.delete(ad.id, owner).await.unwrap();
        for _ in 0..2 {
            assert!(matches!(
                fx.svc.delete(ad.id, owner).await,
                Err(AppError::AdNotFound)
            ));
        }
        assert!(matches!(
            fx.svc.delete(Uuid::new_v4(), owner).await,
            Err(AppError::AdNotFound)
        ));
    }

    #[tokio::test]
    async fn ownership_flag_per_viewer() {
        let fx = Fixture::new();
        let owner = fx.user("alice").await;
        let other = fx.user("bob").await;
        let ad = fx.svc.create(input("Lamp", 15.0), owner).await.unwrap();

        let anon = fx.svc.get_by_id_with_author(ad.id, None).await.unwrap();
        assert_eq!(anon.is_owner, None);
        assert_eq!(anon.ad.author_login, "alice");

        let mine = fx.svc.get_by_id_with_author(ad.id, Some(owner)).await.unwrap();
        assert_eq!(mine.is_owner, Some(true));

        let theirs = fx.svc.get_by_id_with_author(ad.id, Some(other)).await.unwrap();
        assert_eq!(theirs.is_owner, Some(false));
    }

    #[tokio::test]
    async fn equal_price_bounds_select_exact_price() {
        let fx = Fixture::new();
        let owner = fx.user("alice").await;
        for price in [10.0, 49.99, 50.0, 50.0, 50.01, 100.0] {
            fx.svc.create(input("item", price), owner).await.unwrap();
        }

        let query = GetAdsQuery {
            min_price: 50.0,
            max_price: 50.0,
            ..Default::default()
        };
        let ads = fx.svc.get_all(&query, None).await.unwrap();
        assert_eq!(ads.len(), 2);
        assert!(ads.iter().all(|a| a.ad.ad.price == 50.0));
    }

    #[tokio::test]
    async fn second_page_is_items_eleven_to_twenty() {
        let fx = Fixture::new();
        let owner = fx.user("alice").await;
        for i in 0..25 {
            fx.svc
                .create(input(&format!("item {i}"), f64::from(i)), owner)
                .await
                .unwrap();
        }

        let base = GetAdsQuery {
            sort_by: SortBy::Price,
            sort_dir: SortDir::Asc,
            limit: 100,
            ..Default::default()
        };
        let all = fx.svc.get_all(&base, None).await.unwrap();
        assert_eq!(all.len(), 25);

        let page2 = fx
            .svc
            .get_all(
                &GetAdsQuery {
                    page: 2,
                    limit: 10,
                    ..base.clone()
                },
                None,
            )
            .await
            .unwrap();
        let got: Vec<Uuid> = page2.iter().map(|a| a.ad.ad.id).collect();
        let want: Vec<Uuid> = all[10..20].iter().map(|a| a.ad.ad.id).collect();
        assert_eq!(got, want);
        assert_eq!(page2[0].ad.ad.price, 10.0);
    }

    #[tokio::test]
    async fn equal_sort_keys_page_without_overlap() {
        let fx = Fixture::new();
        let owner = fx.user("alice").await;
        for i in 0..15 {
            fx.svc.create(input(&format!("item {i}"), 5.0), owner).await.unwrap();
        }

        let by_price = GetAdsQuery {
            sort_by: SortBy::Price,
            limit: 5,
            ..Default::default()
        };
        let mut seen = Vec::new();
        for page in 1..=3 {
            let items = fx
                .svc
                .get_all(&GetAdsQuery { page, ..by_price.clone() }, None)
                .await
                .unwrap();
            seen.extend(items.into_iter().map(|a| a.ad.ad.id));
        }
        let mut unique = seen.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 15);

        let newest = fx.svc.get_all(&GetAdsQuery::default(), None).await.unwrap();
        assert!(newest
            .windows(2)
            .all(|w| w[0].ad.ad.created_at >= w[1].ad.ad.created_at));
    }

    #[tokio::test]
    async fn listing_marks_viewer_ownership() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        fx.svc.create(input("alice's", 1.0), alice).await.unwrap();
        fx.svc.create(input("bob's", 2.0), bob).await.unwrap();

        let listed = fx
            .svc
            .get_all(&GetAdsQuery::default(), Some(alice))
            .await
            .unwrap();
        for item in &listed {
            assert_eq!(item.is_owner, Some(item.ad.ad.user_id == alice));
        }
        let anon = fx.svc.get_all(&GetAdsQuery::default(), None).await.unwrap();
        assert!(anon.iter().all(|a| a.is_owner.is_none()));
    }
}
