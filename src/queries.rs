use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    prelude::Date,
    sea_query::{
        Expr, IntoColumnRef, IntoTableRef, OnConflict, Order, Query, SimpleExpr, SubQueryStatement,
    },
};
use tracing::debug;

use crate::{
    entities::{genre, movie, review, user},
    error::{StoreError, StoreResult},
    models::UserReview,
};

const SEED_USERS: [&str; 3] = ["user1", "user2", "user3"];
const SEED_GENRES: [&str; 3] = ["Comedy", "Drama", "Action"];
const SEED_MOVIES: [(&str, &str); 3] =
    [("Movie 1", "Comedy"), ("Movie 2", "Drama"), ("Movie 3", "Action")];

/// Creates all five tables in one transaction. Safe to call repeatedly.
pub async fn create_tables(db: &DatabaseConnection) -> StoreResult<()> {
    let backend = db.get_database_backend();
    let txn = db.begin().await?;
    for stmt in migration::create_table_statements() {
        txn.execute(backend.build(&stmt)).await?;
    }
    txn.commit().await?;
    debug!("tables created");
    Ok(())
}

/// Inserts the demo users, genres and movies, skipping rows that already exist.
pub async fn populate_tables(db: &DatabaseConnection) -> StoreResult<()> {
    let txn = db.begin().await?;

    user::Entity::insert_many(SEED_USERS.map(|username| user::ActiveModel {
        username: Set(username.to_string()),
        ..Default::default()
    }))
    .on_conflict(OnConflict::column(user::Column::Username).do_nothing().to_owned())
    .exec_without_returning(&txn)
    .await?;

    genre::Entity::insert_many(SEED_GENRES.map(|name| genre::ActiveModel {
        name: Set(name.to_string()),
        ..Default::default()
    }))
    .on_conflict(OnConflict::column(genre::Column::Name).do_nothing().to_owned())
    .exec_without_returning(&txn)
    .await?;

    txn.commit().await?;

    let today = chrono::Local::now().date_naive();
    let mut insert = Query::insert();
    insert.into_table(movie::Entity).columns([
        movie::Column::Title,
        movie::Column::ReleaseDate,
        movie::Column::GenreId,
    ]);
    for (title, genre) in SEED_MOVIES {
        insert.values_panic([title.into(), today.into(), genre_id_of(genre)]);
    }
    insert.on_conflict(OnConflict::column(movie::Column::Title).do_nothing().to_owned());

    let backend = db.get_database_backend();
    db.execute(backend.build(&insert)).await?;

    debug!("seed rows inserted");
    Ok(())
}

pub async fn list_all_movies(db: &DatabaseConnection) -> StoreResult<Vec<movie::Model>> {
    Ok(movie::Entity::find().order_by_asc(movie::Column::Id).all(db).await?)
}

pub async fn get_movie(db: &DatabaseConnection, id: i32) -> StoreResult<movie::Model> {
    debug!(id, "fetching movie");
    movie::Entity::find_by_id(id).one(db).await?.ok_or(StoreError::NotFound("movie"))
}

pub async fn list_users(db: &DatabaseConnection) -> StoreResult<Vec<user::Model>> {
    Ok(user::Entity::find().order_by_asc(user::Column::Id).all(db).await?)
}

pub async fn get_user(db: &DatabaseConnection, id: i32) -> StoreResult<user::Model> {
    debug!(id, "fetching user");
    user::Entity::find_by_id(id).one(db).await?.ok_or(StoreError::NotFound("user"))
}

pub async fn add_user(db: &DatabaseConnection, username: &str) -> StoreResult<()> {
    let model = user::ActiveModel { username: Set(username.to_string()), ..Default::default() };
    user::Entity::insert(model).exec_without_returning(db).await?;
    debug!(%username, "user added");
    Ok(())
}

pub async fn add_movie_genre(db: &DatabaseConnection, name: &str) -> StoreResult<()> {
    let model = genre::ActiveModel { name: Set(name.to_string()), ..Default::default() };
    genre::Entity::insert(model).exec_without_returning(db).await?;
    debug!(%name, "genre added");
    Ok(())
}

/// Inserts a movie, resolving `genre` to its id inside the statement.
/// An unknown genre rolls the insert back.
pub async fn add_movie(
    db: &DatabaseConnection,
    title: &str,
    release_date: Date,
    genre: &str,
) -> StoreResult<movie::Model> {
    let insert = Query::insert()
        .into_table(movie::Entity)
        .columns([movie::Column::Title, movie::Column::ReleaseDate, movie::Column::GenreId])
        .values_panic([title.into(), release_date.into(), genre_id_of(genre)])
        .returning_all()
        .to_owned();

    let txn = db.begin().await?;
    let movie = movie::Entity::find()
        .from_raw_sql(db.get_database_backend().build(&insert))
        .one(&txn)
        .await?
        .ok_or(DbErr::RecordNotInserted)?;

    if movie.genre_id.is_none() {
        txn.rollback().await?;
        return Err(StoreError::UnresolvedReference { kind: "genre", name: genre.to_string() });
    }
    txn.commit().await?;

    debug!(id = movie.id, %title, "movie added");
    Ok(movie)
}

/// Movies released on or after `since`, at most `limit` of them.
pub async fn list_movies(
    db: &DatabaseConnection,
    limit: u64,
    since: Date,
) -> StoreResult<Vec<movie::Model>> {
    Ok(movie::Entity::find()
        .filter(movie::Column::ReleaseDate.gte(since))
        .order_by_asc(movie::Column::Id)
        .limit(limit)
        .all(db)
        .await?)
}

/// Rewrites the movie currently titled `title` and returns its id.
pub async fn update_movie(
    db: &DatabaseConnection,
    title: &str,
    new_title: &str,
    release_date: Date,
    genre: &str,
) -> StoreResult<i32> {
    let update = Query::update()
        .table(movie::Entity)
        .values([
            (movie::Column::Title, new_title.into()),
            (movie::Column::ReleaseDate, release_date.into()),
            (movie::Column::GenreId, genre_id_of(genre)),
        ])
        .and_where(movie::Column::Title.eq(title))
        .returning(Query::returning().columns([movie::Column::Id, movie::Column::GenreId]))
        .to_owned();

    let txn = db.begin().await?;
    let Some(row) = txn.query_one(db.get_database_backend().build(&update)).await? else {
        txn.rollback().await?;
        return Err(StoreError::NotFound("movie"));
    };

    let genre_id: Option<i32> = row.try_get("", "genre_id")?;
    if genre_id.is_none() {
        txn.rollback().await?;
        return Err(StoreError::UnresolvedReference { kind: "genre", name: genre.to_string() });
    }
    let id: i32 = row.try_get("", "id")?;
    txn.commit().await?;

    debug!(id, %title, %new_title, "movie updated");
    Ok(id)
}

/// Records a review by `username` of `movie_title` and returns its id.
pub async fn create_movie_review(
    db: &DatabaseConnection,
    username: &str,
    movie_title: &str,
    rating: i32,
    review_text: &str,
) -> StoreResult<i32> {
    let insert = Query::insert()
        .into_table(review::Entity)
        .columns([
            review::Column::UserId,
            review::Column::MovieId,
            review::Column::Rating,
            review::Column::ReviewText,
        ])
        .values_panic([
            user_id_of(username),
            movie_id_of(movie_title),
            rating.into(),
            review_text.into(),
        ])
        .returning(Query::returning().columns([
            review::Column::Id,
            review::Column::UserId,
            review::Column::MovieId,
        ]))
        .to_owned();

    let txn = db.begin().await?;
    let row = txn
        .query_one(db.get_database_backend().build(&insert))
        .await?
        .ok_or(DbErr::RecordNotInserted)?;

    let user_id: Option<i32> = row.try_get("", "user_id")?;
    let movie_id: Option<i32> = row.try_get("", "movie_id")?;
    let unresolved = match (user_id, movie_id) {
        (None, _) => Some(("user", username)),
        (_, None) => Some(("movie", movie_title)),
        _ => None,
    };
    if let Some((kind, name)) = unresolved {
        txn.rollback().await?;
        return Err(StoreError::UnresolvedReference { kind, name: name.to_string() });
    }
    let id: i32 = row.try_get("", "id")?;
    txn.commit().await?;

    debug!(id, %username, %movie_title, "review added");
    Ok(id)
}

pub async fn list_user_reviews(
    db: &DatabaseConnection,
    username: &str,
) -> StoreResult<Vec<UserReview>> {
    let select = Query::select()
        .column((user::Entity, user::Column::Username))
        .column((movie::Entity, movie::Column::Title))
        .column((review::Entity, review::Column::ReviewText))
        .column((movie::Entity, movie::Column::ReleaseDate))
        .column((review::Entity, review::Column::Rating))
        .from(review::Entity)
        .inner_join(
            user::Entity,
            Expr::col((user::Entity, user::Column::Id))
                .equals((review::Entity, review::Column::UserId)),
        )
        .inner_join(
            movie::Entity,
            Expr::col((movie::Entity, movie::Column::Id))
                .equals((review::Entity, review::Column::MovieId)),
        )
        .and_where(user::Column::Username.eq(username))
        .order_by((review::Entity, review::Column::Id), Order::Asc)
        .to_owned();

    let stmt = db.get_database_backend().build(&select);
    Ok(UserReview::find_by_statement(stmt).all(db).await?)
}

fn genre_id_of(name: &str) -> SimpleExpr {
    id_lookup(genre::Entity, genre::Column::Id, genre::Column::Name.eq(name))
}

fn user_id_of(username: &str) -> SimpleExpr {
    id_lookup(user::Entity, user::Column::Id, user::Column::Username.eq(username))
}

fn movie_id_of(title: &str) -> SimpleExpr {
    id_lookup(movie::Entity, movie::Column::Id, movie::Column::Title.eq(title))
}

/// `(SELECT id FROM table WHERE cond)`, yielding NULL when nothing matches.
fn id_lookup(table: impl IntoTableRef, id: impl IntoColumnRef, cond: SimpleExpr) -> SimpleExpr {
    let select = Query::select().column(id).from(table).and_where(cond).to_owned();
    SimpleExpr::SubQuery(None, Box::new(SubQueryStatement::SelectStatement(select)))
}

#[cfg(test)]
mod tests {
    use sea_orm::PaginatorTrait;

    use super::*;
    use crate::db::test_db;

    fn date(s: &str) -> Date {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn create_tables_is_idempotent() {
        let db = test_db().await;
        create_tables(&db).await.unwrap();
        create_tables(&db).await.unwrap();
        assert!(list_all_movies(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn populate_twice_leaves_three_of_each() {
        let db = test_db().await;
        populate_tables(&db).await.unwrap();
        populate_tables(&db).await.unwrap();

        assert_eq!(user::Entity::find().count(&db).await.unwrap(), 3);
        assert_eq!(genre::Entity::find().count(&db).await.unwrap(), 3);
        assert_eq!(movie::Entity::find().count(&db).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn seed_movies_point_at_their_genres() {
        let db = test_db().await;
        populate_tables(&db).await.unwrap();

        let movies = list_all_movies(&db).await.unwrap();
        let genres: Vec<Option<i32>> = movies.iter().map(|m| m.genre_id).collect();
        assert_eq!(genres, vec![Some(1), Some(2), Some(3)]);
        let today = chrono::Local::now().date_naive();
        assert!(movies.iter().all(|m| m.release_date == Some(today)));
    }

    #[tokio::test]
    async fn added_movie_can_be_fetched() {
        let db = test_db().await;
        populate_tables(&db).await.unwrap();

        let added = add_movie(&db, "Inception", date("2010-07-16"), "Action").await.unwrap();
        assert_eq!(added.title, "Inception");
        assert_eq!(added.genre_id, Some(3));

        let fetched = get_movie(&db, added.id).await.unwrap();
        assert_eq!(fetched, added);
        assert_eq!(fetched.release_date, Some(date("2010-07-16")));
    }

    #[tokio::test]
    async fn unknown_genre_is_rejected_and_rolled_back() {
        let db = test_db().await;
        populate_tables(&db).await.unwrap();

        let err = add_movie(&db, "Heat", date("1995-12-15"), "Crime").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnresolvedReference { kind: "genre", ref name } if name == "Crime"
        ));
        assert_eq!(movie::Entity::find().count(&db).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn duplicate_title_is_a_store_error() {
        let db = test_db().await;
        populate_tables(&db).await.unwrap();

        let err = add_movie(&db, "Movie 1", date("2000-01-01"), "Drama").await.unwrap_err();
        assert!(matches!(err, StoreError::Db(_)));
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let db = test_db().await;
        assert!(matches!(get_movie(&db, 9999).await, Err(StoreError::NotFound("movie"))));
        assert!(matches!(get_user(&db, 9999).await, Err(StoreError::NotFound("user"))));
    }

    #[tokio::test]
    async fn users_and_genres_can_be_added() {
        let db = test_db().await;
        add_user(&db, "alice").await.unwrap();
        add_movie_genre(&db, "Horror").await.unwrap();

        let users = list_users(&db).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(get_user(&db, users[0].id).await.unwrap().username, "alice");

        add_movie(&db, "Alien", date("1979-05-25"), "Horror").await.unwrap();
        assert!(matches!(add_user(&db, "alice").await, Err(StoreError::Db(_))));
    }

    #[tokio::test]
    async fn list_movies_filters_by_date_and_caps_count() {
        let db = test_db().await;
        add_movie_genre(&db, "Drama").await.unwrap();
        add_movie(&db, "Old", date("1990-01-01"), "Drama").await.unwrap();
        add_movie(&db, "Newer", date("2015-06-01"), "Drama").await.unwrap();
        add_movie(&db, "Newest", date("2020-03-01"), "Drama").await.unwrap();

        let recent = list_movies(&db, 10, date("2000-01-01")).await.unwrap();
        let titles: Vec<&str> = recent.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["Newer", "Newest"]);

        assert_eq!(list_movies(&db, 1, date("2000-01-01")).await.unwrap().len(), 1);
        assert_eq!(list_movies(&db, 10, date("2015-06-01")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_movie_matches_by_old_title() {
        let db = test_db().await;
        populate_tables(&db).await.unwrap();

        let id = update_movie(&db, "Movie 1", "Movie One", date("1999-09-09"), "Action")
            .await
            .unwrap();

        let movie = get_movie(&db, id).await.unwrap();
        assert_eq!(movie.title, "Movie One");
        assert_eq!(movie.release_date, Some(date("1999-09-09")));
        assert_eq!(movie.genre_id, Some(3));
    }

    #[tokio::test]
    async fn update_movie_reports_missing_title_and_genre() {
        let db = test_db().await;
        populate_tables(&db).await.unwrap();

        let err = update_movie(&db, "Nope", "Still nope", date("2001-01-01"), "Drama").await;
        assert!(matches!(err, Err(StoreError::NotFound("movie"))));

        let err = update_movie(&db, "Movie 2", "Renamed", date("2001-01-01"), "Western").await;
        assert!(matches!(err, Err(StoreError::UnresolvedReference { kind: "genre", .. })));
        assert_eq!(get_movie(&db, 2).await.unwrap().title, "Movie 2");
    }

    #[tokio::test]
    async fn reviews_are_listed_per_user() {
        let db = test_db().await;
        populate_tables(&db).await.unwrap();

        let first = create_movie_review(&db, "user1", "Movie 1", 4, "fun").await.unwrap();
        let second = create_movie_review(&db, "user1", "Movie 3", 2, "loud").await.unwrap();
        create_movie_review(&db, "user2", "Movie 2", 5, "moving").await.unwrap();
        assert!(second > first);

        let reviews = list_user_reviews(&db, "user1").await.unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].username, "user1");
        assert_eq!(reviews[0].title, "Movie 1");
        assert_eq!(reviews[0].review_text.as_deref(), Some("fun"));
        assert_eq!(reviews[0].rating, Some(4));
        assert_eq!(reviews[1].title, "Movie 3");

        assert!(list_user_reviews(&db, "user3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn review_with_unknown_user_or_movie_is_rejected() {
        let db = test_db().await;
        populate_tables(&db).await.unwrap();

        let err = create_movie_review(&db, "ghost", "Movie 1", 3, "?").await.unwrap_err();
        assert!(matches!(err, StoreError::UnresolvedReference { kind: "user", .. }));

        let err = create_movie_review(&db, "user1", "Missing", 3, "?").await.unwrap_err();
        assert!(matches!(err, StoreError::UnresolvedReference { kind: "movie", .. }));

        assert_eq!(review::Entity::find().count(&db).await.unwrap(), 0);
    }
}
