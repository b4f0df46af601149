use crate::config::DatabaseConfig;
use crate::entities::{transaction_entity, user_entity};
use crate::error::AppResult;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};

pub type DbPool = DatabaseConnection;

pub async fn create_pool(config: &DatabaseConfig) -> AppResult<DbPool> {
    let mut options = ConnectOptions::new(config.url.clone());
    options.max_connections(config.max_connections);
    let pool = Database::connect(options).await?;
    Ok(pool)
}

/// Create missing tables from the entity definitions.
///
/// Idempotent; safe to run on every startup.
pub async fn run_migrations(pool: &DbPool) -> AppResult<()> {
    create_table_if_missing(pool, user_entity::Entity).await?;
    create_table_if_missing(pool, transaction_entity::Entity).await?;
    Ok(())
}

async fn create_table_if_missing<E: EntityTrait>(pool: &DbPool, entity: E) -> AppResult<()> {
    let backend = pool.get_database_backend();
    let schema = Schema::new(backend);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    pool.execute(backend.build(&statement)).await?;
    Ok(())
}
