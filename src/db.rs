use rocket_db_pools::{sqlx, Database};

#[derive(Database)]
#[database("contacts_db")]
pub struct ContactsDb(sqlx::PgPool);

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Apply pending schema migrations.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}
