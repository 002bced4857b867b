use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    ads::{
        dto::{CreateAd, ListAdsParams, UpdateAd},
        repo_types::{Ad, AdResponse, GetAdsQuery},
    },
    auth::extractors::{AuthUser, MaybeAuthUser},
    error::AppResult,
    extract::{JsonBody, PathParam, QueryParams},
    state::AppState,
};

pub fn ads_routes() -> Router<AppState> {
    Router::new()
        .route("/ads", get(list_ads).post(create_ad))
        .route("/ads/:id", get(get_ad).put(update_ad).delete(delete_ad))
}

#[instrument(skip(state, body))]
pub async fn create_ad(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(body): JsonBody<CreateAd>,
) -> AppResult<(StatusCode, HeaderMap, Json<Ad>)> {
    let ad = state.ads.create(body, user_id).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/v1/ads/{}", ad.id).parse::<HeaderValue>() {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(ad)))
}

#[instrument(skip(state))]
pub async fn list_ads(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    QueryParams(params): QueryParams<ListAdsParams>,
) -> AppResult<Json<Vec<AdResponse>>> {
    let query = GetAdsQuery::try_from(params)?;
    let ads = state.ads.get_all(&query, viewer).await?;
    Ok(Json(ads))
}

#[instrument(skip(state))]
pub async fn get_ad(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    PathParam(id): PathParam<Uuid>,
) -> AppResult<Json<AdResponse>> {
    let ad = state.ads.get_by_id_with_author(id, viewer).await?;
    Ok(Json(ad))
}

#[instrument(skip(state, body))]
pub async fn update_ad(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    PathParam(id): PathParam<Uuid>,
    JsonBody(body): JsonBody<UpdateAd>,
) -> AppResult<Json<Ad>> {
    let ad = state.ads.update(id, user_id, body).await?;
    Ok(Json(ad))
}

#[instrument(skip(state))]
pub async fn delete_ad(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    PathParam(id): PathParam<Uuid>,
) -> AppResult<StatusCode> {
    state.ads.delete(id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
