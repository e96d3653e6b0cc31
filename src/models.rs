use sea_orm::{FromQueryResult, prelude::Date};
use serde::{Deserialize, Serialize};

/// Body of `POST /movies`. Fields are optional so that a missing key can be
/// reported as a 400 rather than a deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct NewMovie {
    pub title: Option<String>,
    pub genre: Option<String>,
    pub release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MovieUpdate {
    pub title: Option<String>,
    pub new_title: Option<String>,
    pub genre: Option<String>,
    pub release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MovieFilter {
    pub since: Option<Date>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewGenre {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewReview {
    pub username: Option<String>,
    pub movie_title: Option<String>,
    pub rating: Option<i32>,
    pub review_text: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Created {
    pub id: i32,
}

/// One review joined with its author and movie.
#[derive(Clone, Debug, PartialEq, FromQueryResult, Serialize)]
pub struct UserReview {
    pub username: String,
    pub title: String,
    pub review_text: Option<String>,
    pub release_date: Option<Date>,
    pub rating: Option<i32>,
}
