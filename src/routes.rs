use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    routing::get,
};
use sea_orm::prelude::Date;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    AppState,
    entities::{movie, user},
    error::{ApiError, ApiResult, StoreError},
    models::{
        Created, MovieFilter, MovieUpdate, NewGenre, NewMovie, NewReview, NewUser, UserReview,
    },
    queries,
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tables", get(tables))
        .route("/populate", get(populate))
        .route("/movies", get(list_movies).post(create_movie).put(update_movie))
        .route("/movies/{id}", get(movie_detail))
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(user_detail))
        .route("/genres", axum::routing::post(create_genre))
        .route("/reviews", axum::routing::post(create_review))
        .route("/reviews/{username}", get(user_reviews))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any)),
        )
}

fn ok() -> Json<Value> {
    Json(json!({ "message": "ok" }))
}

pub async fn tables(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    queries::create_tables(&state.db).await.map_err(|err| {
        ApiError::from_store(err, StatusCode::INTERNAL_SERVER_ERROR, "Create tables failed")
    })?;
    Ok(ok())
}

pub async fn populate(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    queries::populate_tables(&state.db).await.map_err(|err| {
        ApiError::from_store(err, StatusCode::INTERNAL_SERVER_ERROR, "Populate table failed")
    })?;
    Ok(ok())
}

/// `GET /movies`, optionally narrowed with `?since=YYYY-MM-DD&limit=N`.
/// `limit` is only meaningful together with `since`.
pub async fn list_movies(
    State(state): State<Arc<AppState>>,
    query: Result<Query<MovieFilter>, QueryRejection>,
) -> ApiResult<Json<Vec<movie::Model>>> {
    let Query(filter) = query.map_err(|rejection| {
        tracing::debug!(error = %rejection, "rejected query string");
        ApiError::bad_request("Invalid query string")
    })?;
    let movies = match (filter.since, filter.limit) {
        (Some(since), limit) => {
            let limit = limit.unwrap_or(state.config.default_page_limit);
            queries::list_movies(&state.db, u64::from(limit), since).await?
        },
        (None, Some(_)) => return Err(ApiError::bad_request("limit requires since")),
        (None, None) => queries::list_all_movies(&state.db).await?,
    };
    Ok(Json(movies))
}

pub async fn movie_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Json<movie::Model>> {
    Ok(Json(queries::get_movie(&state.db, id).await?))
}

pub async fn list_users(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<user::Model>>> {
    Ok(Json(queries::list_users(&state.db).await?))
}

pub async fn user_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Json<user::Model>> {
    Ok(Json(queries::get_user(&state.db, id).await?))
}

pub async fn create_movie(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewMovie>, JsonRejection>,
) -> ApiResult<Json<movie::Model>> {
    let Json(req) = body.map_err(reject_body)?;
    let title = required(req.title, "title")?;
    let genre = required(req.genre, "genre")?;

    const FAILED: &str = "Unable to add movie";
    let release_date = parse_date(req.release_date.as_deref()).ok_or_else(|| {
        tracing::warn!(%title, "missing or invalid release_date");
        ApiError::bad_request(FAILED)
    })?;

    let movie = queries::add_movie(&state.db, &title, release_date, &genre)
        .await
        .map_err(|err| ApiError::from_store(err, StatusCode::BAD_REQUEST, FAILED))?;
    Ok(Json(movie))
}

pub async fn update_movie(
    State(state): State<Arc<AppState>>,
    body: Result<Json<MovieUpdate>, JsonRejection>,
) -> ApiResult<Json<Created>> {
    let Json(req) = body.map_err(reject_body)?;
    let title = required(req.title, "title")?;
    let new_title = required(req.new_title, "new_title")?;
    let genre = required(req.genre, "genre")?;

    const FAILED: &str = "Unable to update movie";
    let release_date =
        parse_date(req.release_date.as_deref()).ok_or_else(|| ApiError::bad_request(FAILED))?;

    let id = queries::update_movie(&state.db, &title, &new_title, release_date, &genre)
        .await
        .map_err(|err| match err {
            err @ StoreError::NotFound(_) => ApiError::from(err),
            err => ApiError::from_store(err, StatusCode::BAD_REQUEST, FAILED),
        })?;
    Ok(Json(Created { id }))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = body.map_err(reject_body)?;
    let username = required(req.username, "username")?;
    queries::add_user(&state.db, &username)
        .await
        .map_err(|err| ApiError::from_store(err, StatusCode::BAD_REQUEST, "Unable to add user"))?;
    Ok(ok())
}

pub async fn create_genre(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewGenre>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(req) = body.map_err(reject_body)?;
    let name = required(req.name, "name")?;
    queries::add_movie_genre(&state.db, &name)
        .await
        .map_err(|err| ApiError::from_store(err, StatusCode::BAD_REQUEST, "Unable to add genre"))?;
    Ok(ok())
}

pub async fn create_review(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewReview>, JsonRejection>,
) -> ApiResult<Json<Created>> {
    let Json(req) = body.map_err(reject_body)?;
    let username = required(req.username, "username")?;
    let movie_title = required(req.movie_title, "movie_title")?;
    let rating = required(req.rating, "rating")?;
    let review_text = required(req.review_text, "review_text")?;

    let id = queries::create_movie_review(&state.db, &username, &movie_title, rating, &review_text)
        .await
        .map_err(|err| ApiError::from_store(err, StatusCode::BAD_REQUEST, "Unable to add review"))?;
    Ok(Json(Created { id }))
}

pub async fn user_reviews(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> ApiResult<Json<Vec<UserReview>>> {
    Ok(Json(queries::list_user_reviews(&state.db, &username).await?))
}

fn required<T>(value: Option<T>, field: &'static str) -> ApiResult<T> {
    value.ok_or_else(|| ApiError::bad_request(format!("Missing field: {field}")))
}

fn parse_date(value: Option<&str>) -> Option<Date> {
    value?.trim().parse().ok()
}

fn reject_body(rejection: JsonRejection) -> ApiError {
    tracing::debug!(error = %rejection, "rejected request body");
    ApiError::bad_request("Invalid JSON body")
}
