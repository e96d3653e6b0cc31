use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};

use crate::config::DatabaseConfig;

/// Opens the connection pool shared by every request.
pub async fn connect(
    config: &DatabaseConfig,
    migrate: bool,
) -> Result<DatabaseConnection, sea_orm::DbErr> {
    let mut opts = ConnectOptions::new(config.url());
    opts.max_connections(config.max_connections).sqlx_logging(false);

    let db = Database::connect(opts).await?;
    tracing::info!(backend = ?db.get_database_backend(), "connected to database");

    if migrate {
        Migrator::up(&db, None).await?;
        tracing::info!("migrations applied");
    }

    Ok(db)
}

/// A fresh in-memory store with the schema in place.
#[cfg(test)]
pub async fn test_db() -> DatabaseConnection {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    // An in-memory sqlite database lives only as long as its connection.
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await.unwrap();
    crate::queries::create_tables(&db).await.unwrap();
    db
}
