use serde::Deserialize;

use crate::ads::repo_types::{GetAdsQuery, SortBy, SortDir, DEFAULT_LIMIT};
use crate::error::{AppError, AppResult};

/// Body of `POST /ads`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAd {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub price: f64,
}

/// Body of `PUT /ads/:id`. `None` leaves the stored value alone; an empty
/// `image_url` clears the image.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAd {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub price: Option<f64>,
}

/// Query string of `GET /ads`. Values stay raw so that paging can fall back
/// to defaults while a malformed price bound is still rejected.
#[derive(Debug, Default, Deserialize)]
pub struct ListAdsParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
}

/// Missing, empty, unparsable and non-positive values all mean `default`.
fn positive_or(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(default)
}

/// An empty bound is the same as no bound.
fn price_bound(field: &'static str, raw: Option<&str>) -> AppResult<f64> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(0.0),
        Some(v) => v,
    };
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(AppError::invalid(field, "must be a non-negative number")),
    }
}

impl TryFrom<ListAdsParams> for GetAdsQuery {
    type Error = AppError;

    fn try_from(p: ListAdsParams) -> AppResult<Self> {
        let min_price = price_bound("min_price", p.min_price.as_deref())?;
        let max_price = price_bound("max_price", p.max_price.as_deref())?;

        Ok(GetAdsQuery {
            page: positive_or(p.page.as_deref(), 1),
            limit: positive_or(p.limit.as_deref(), DEFAULT_LIMIT),
            sort_by: p.sort_by.as_deref().map(SortBy::parse).unwrap_or_default(),
            sort_dir: p.sort_dir.as_deref().map(SortDir::parse).unwrap_or_default(),
            min_price,
            max_price,
        })
    }
}
