use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_LIMIT: i64 = 10;

/// Ad record in the database. `user_id` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Ad {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub price: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields needed to insert an ad; id and created_at are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewAd {
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub price: f64,
}

/// Ad joined with its author's login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdWithAuthor {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub ad: Ad,
    pub author_login: String,
}

/// What a viewer gets back. `is_owner` is left out entirely for anonymous
/// viewers so "not yours" and "unknown" stay distinguishable.
#[derive(Debug, Clone, Serialize)]
pub struct AdResponse {
    #[serde(flatten)]
    pub ad: AdWithAuthor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_owner: Option<bool>,
}

impl AdResponse {
    pub fn for_viewer(ad: AdWithAuthor, viewer: Option<Uuid>) -> Self {
        let is_owner = viewer.map(|v| v == ad.ad.user_id);
        Self { ad, is_owner }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    Date,
    Price,
}

impl SortBy {
    /// `price` selects price; `date`, `created_at` and anything else select date.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "price" => SortBy::Price,
            _ => SortBy::Date,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            SortBy::Date => "a.created_at",
            SortBy::Price => "a.price",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

impl SortDir {
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("asc") {
            SortDir::Asc
        } else {
            SortDir::Desc
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// Listing parameters. A zero price bound means "no bound".
#[derive(Debug, Clone, PartialEq)]
pub struct GetAdsQuery {
    pub page: i64,
    pub limit: i64,
    pub sort_by: SortBy,
    pub sort_dir: SortDir,
    pub min_price: f64,
    pub max_price: f64,
}

impl Default for GetAdsQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
            sort_by: SortBy::Date,
            sort_dir: SortDir::Desc,
            min_price: 0.0,
            max_price: 0.0,
        }
    }
}

impl GetAdsQuery {
    pub fn limit(&self) -> i64 {
        if self.limit > 0 {
            self.limit
        } else {
            DEFAULT_LIMIT
        }
    }

    pub fn offset(&self) -> i64 {
        if self.page > 1 {
            (self.page - 1).saturating_mul(self.limit())
        } else {
            0
        }
    }

    pub fn min_price_bound(&self) -> Option<f64> {
        (self.min_price > 0.0).then_some(self.min_price)
    }

    pub fn max_price_bound(&self) -> Option<f64> {
        (self.max_price > 0.0).then_some(self.max_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_defaults() {
        let q = GetAdsQuery {
            page: 0,
            limit: 0,
            ..Default::default()
        };
        assert_eq!(q.limit(), 10);
        assert_eq!(q.offset(), 0);

        let first = GetAdsQuery {
            page: 1,
            limit: 25,
            ..Default::default()
        };
        let below = GetAdsQuery { page: -3, ..first.clone() };
        assert_eq!(first.offset(), below.offset());

        let third = GetAdsQuery { page: 3, ..first };
        assert_eq!(third.offset(), 50);
    }

    #[test]
    fn zero_price_is_no_bound() {
        let q = GetAdsQuery::default();
        assert_eq!(q.min_price_bound(), None);
        assert_eq!(q.max_price_bound(), None);
        let q = GetAdsQuery {
            min_price: 50.0,
            max_price: 50.0,
            ..Default::default()
        };
        assert_eq!(q.min_price_bound(), Some(50.0));
        assert_eq!(q.max_price_bound(), Some(50.0));
    }

    #[test]
    fn sort_parsing() {
        assert_eq!(SortBy::parse("price"), SortBy::Price);
        assert_eq!(SortBy::parse("date"), SortBy::Date);
        assert_eq!(SortBy::parse("created_at"), SortBy::Date);
        assert_eq!(SortBy::parse("; DROP TABLE ads"), SortBy::Date);
        assert_eq!(SortDir::parse("ASC"), SortDir::Asc);
        assert_eq!(SortDir::parse("aSc"), SortDir::Asc);
        assert_eq!(SortDir::parse("up"), SortDir::Desc);
        assert_eq!(SortDir::parse(""), SortDir::Desc);
    }

    #[test]
    fn ownership_flag_is_omitted_for_anonymous() {
        let ad = AdWithAuthor {
            ad: Ad {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                title: "Bike".into(),
                description: String::new(),
                image_url: None,
                price: 10.0,
                created_at: OffsetDateTime::now_utc(),
            },
            author_login: "alice".into(),
        };
        let owner = ad.ad.user_id;

        let anon = serde_json::to_value(AdResponse::for_viewer(ad.clone(), None)).unwrap();
        assert!(anon.get("is_owner").is_none());
        assert_eq!(anon["author_login"], "alice");
        assert_eq!(anon["title"], "Bike");

        let stranger =
            serde_json::to_value(AdResponse::for_viewer(ad.clone(), Some(Uuid::new_v4())))
                .unwrap();
        assert_eq!(stranger["is_owner"], false);

        let mine = serde_json::to_value(AdResponse::for_viewer(ad, Some(owner))).unwrap();
        assert_eq!(mine["is_owner"], true);
    }
}
