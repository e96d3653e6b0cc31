use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for stmt in create_table_statements() {
            manager.create_table(stmt).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Watchlist::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Reviews::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Movies::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Genres::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Users::Table).to_owned()).await?;
        Ok(())
    }
}

/// `CREATE TABLE IF NOT EXISTS` for every table, ordered so that each
/// foreign key points at a table created before it.
pub fn create_table_statements() -> Vec<TableCreateStatement> {
    let users = Table::create()
        .table(Users::Table)
        .if_not_exists()
        .col(pk_auto(Users::Id))
        .col(string_len_uniq(Users::Username, 50))
        .to_owned();

    let genres = Table::create()
        .table(Genres::Table)
        .if_not_exists()
        .col(pk_auto(Genres::Id))
        .col(string_len_uniq(Genres::Name, 100))
        .to_owned();

    let movies = Table::create()
        .table(Movies::Table)
        .if_not_exists()
        .col(pk_auto(Movies::Id))
        .col(string_len_uniq(Movies::Title, 200))
        .col(date_null(Movies::ReleaseDate))
        .col(integer_null(Movies::GenreId))
        .foreign_key(
            ForeignKey::create()
                .name("fk_movies_genre_id")
                .from(Movies::Table, Movies::GenreId)
                .to(Genres::Table, Genres::Id),
        )
        .to_owned();

    let reviews = Table::create()
        .table(Reviews::Table)
        .if_not_exists()
        .col(pk_auto(Reviews::Id))
        .col(integer_null(Reviews::UserId))
        .col(integer_null(Reviews::MovieId))
        .col(integer_null(Reviews::Rating))
        .col(text_null(Reviews::ReviewText))
        .col(date_null(Reviews::ReviewDate).default(Expr::current_date()))
        .foreign_key(
            ForeignKey::create()
                .name("fk_reviews_user_id")
                .from(Reviews::Table, Reviews::UserId)
                .to(Users::Table, Users::Id),
        )
        .foreign_key(
            ForeignKey::create()
                .name("fk_reviews_movie_id")
                .from(Reviews::Table, Reviews::MovieId)
                .to(Movies::Table, Movies::Id),
        )
        .to_owned();

    let watchlist = Table::create()
        .table(Watchlist::Table)
        .if_not_exists()
        .col(integer(Watchlist::UserId))
        .col(integer(Watchlist::MovieId))
        .col(date_null(Watchlist::AddedDate).default(Expr::current_date()))
        .primary_key(Index::create().col(Watchlist::UserId).col(Watchlist::MovieId))
        .foreign_key(
            ForeignKey::create()
                .name("fk_watchlist_user_id")
                .from(Watchlist::Table, Watchlist::UserId)
                .to(Users::Table, Users::Id),
        )
        .foreign_key(
            ForeignKey::create()
                .name("fk_watchlist_movie_id")
                .from(Watchlist::Table, Watchlist::MovieId)
                .to(Movies::Table, Movies::Id),
        )
        .to_owned();

    vec![users, genres, movies, reviews, watchlist]
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Username,
}

#[derive(DeriveIden)]
enum Genres {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum Movies {
    Table,
    Id,
    Title,
    ReleaseDate,
    GenreId,
}

#[derive(DeriveIden)]
enum Reviews {
    Table,
    Id,
    UserId,
    MovieId,
    Rating,
    ReviewText,
    ReviewDate,
}

#[derive(DeriveIden)]
enum Watchlist {
    Table,
    UserId,
    MovieId,
    AddedDate,
}
