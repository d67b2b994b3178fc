#[macro_use]
extern crate rocket;

pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod jobs;
pub mod models;
pub mod progress;
pub mod request_logger;
pub mod routes;

use crate::config::{ImportConfig, ProgressBackend};
use crate::db::ContactsDb;
use crate::import::{ContactImporter, PgContactStore};
use crate::jobs::{ImportDispatcher, JobQueue, RetryPolicy};
use crate::progress::{
    MemoryProgressStore, PgProgressStore, ProgressHub, ProgressStore, SessionChannels,
};
use crate::request_logger::RequestLogger;
use env_logger::Env;
use rocket::data::{ByteUnit, Limits};
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_db_pools::sqlx::PgPool;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// Room for multipart framing on top of the largest accepted file.
const UPLOAD_LIMIT_SLACK: u64 = 1024 * 1024;

pub fn rocket() -> Rocket<Build> {
    init_logger();

    let import_config = ImportConfig::from_env();
    log::info!(
        "uploads stored in {} (max {} bytes), progress backend {:?}",
        import_config.upload_dir.display(),
        import_config.max_upload_bytes,
        import_config.progress_backend
    );

    let upload_limit = ByteUnit::from(import_config.max_upload_bytes + UPLOAD_LIMIT_SLACK);
    let figment = rocket::Config::figment().merge((
        "limits",
        Limits::default()
            .limit("file", upload_limit)
            .limit("data-form", upload_limit),
    ));

    // Configure CORS
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Delete]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    rocket::custom(figment)
        .attach(RequestLogger)
        .attach(ContactsDb::init())
        .attach(cors)
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match ContactsDb::fetch(&rocket) {
                    Some(db) => {
                        let pool = (**db).clone();
                        match db::run_migrations(&pool).await {
                            Ok(_) => {
                                log::info!("database migrations successful");
                                Ok(rocket)
                            }
                            Err(e) => {
                                log::error!("database migrations failed: {}", e);
                                Err(rocket)
                            }
                        }
                    }
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            },
        ))
        // Wire the pool, job queue and progress plumbing into managed state
        .attach(AdHoc::try_on_ignite(
            "Import Services",
            move |rocket| async move {
                match ContactsDb::fetch(&rocket) {
                    Some(db) => {
                        let pool = (**db).clone();

                        let store: Arc<dyn ProgressStore> = match import_config.progress_backend
                        {
                            ProgressBackend::Memory => Arc::new(MemoryProgressStore::new()),
                            ProgressBackend::Postgres => {
                                Arc::new(PgProgressStore::new(pool.clone()))
                            }
                        };
                        let channels = Arc::new(SessionChannels::new());
                        let hub = ProgressHub::new(
                            store,
                            channels.clone(),
                            import_config.progress_ttl,
                        );
                        let importer = ContactImporter::new(
                            Arc::new(PgContactStore::new(pool.clone())),
                            hub.clone(),
                        );

                        Ok(rocket
                            .manage(JobQueue::new(pool.clone()))
                            .manage(pool)
                            .manage(hub)
                            .manage(channels)
                            .manage(importer)
                            .manage(import_config))
                    }
                    None => Err(rocket),
                }
            },
        ))
        // Spawn the import dispatcher and the progress sweeper in background
        .attach(AdHoc::on_liftoff("Spawn Import Workers", |rocket| {
            Box::pin(async move {
                let pool = rocket.state::<PgPool>().cloned();
                let importer = rocket.state::<ContactImporter>().cloned();
                let config = rocket.state::<ImportConfig>().cloned();
                let channels = rocket.state::<Arc<SessionChannels>>().cloned();

                let (Some(pool), Some(importer), Some(config), Some(channels)) =
                    (pool, importer, config, channels)
                else {
                    log::error!("failed to spawn import workers: managed state missing");
                    return;
                };

                let policy = RetryPolicy {
                    timeout: config.job_timeout,
                    max_attempts: config.max_attempts,
                    backoff: config.retry_backoff,
                };
                let hub = importer.progress().clone();

                let dispatcher = ImportDispatcher::new(
                    pool,
                    importer,
                    policy,
                    config.poll_interval,
                    config.workers,
                );
                tokio::spawn(async move {
                    log::info!("starting import dispatcher");
                    dispatcher.run().await
                });

                tokio::spawn(progress::sweeper::run(hub, channels, config.sweep_interval));
            })
        }))
        .mount(
            "/api/v1",
            openapi_get_routes![
                routes::health::health_check,
                routes::contacts::list_contacts,
                routes::progress::get_progress,
                routes::progress::clear_progress,
            ],
        )
        .mount(
            "/api/v1",
            routes![
                routes::contacts::upload_contacts,
                routes::progress::stream_progress,
            ],
        )
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Contacts API", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use crate::import::{ContactImporter, MemoryContactStore};
    use crate::progress::{DEFAULT_PROGRESS_TTL, MemoryProgressStore, ProgressHub, SessionChannels};
    use chrono::NaiveDate;
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use rocket_db_pools::sqlx::{self, PgPool};
    use std::sync::Arc;

    pub use database::{TestDatabase, TestDatabaseError};

    /// In-memory progress plumbing plus the channels it broadcasts to.
    pub fn memory_progress() -> (ProgressHub, Arc<SessionChannels>) {
        let channels = Arc::new(SessionChannels::new());
        let hub = ProgressHub::new(
            Arc::new(MemoryProgressStore::new()),
            channels.clone(),
            DEFAULT_PROGRESS_TTL,
        );
        (hub, channels)
    }

    /// Importer over in-memory contacts and progress.
    pub fn memory_importer(
        contacts: Arc<MemoryContactStore>,
    ) -> (ContactImporter, Arc<SessionChannels>) {
        let (hub, channels) = memory_progress();
        (ContactImporter::new(contacts, hub), channels)
    }

    /// Convenience helpers for seeding contact rows in tests.
    pub struct TestFixtures<'a> {
        pool: &'a PgPool,
    }

    impl<'a> TestFixtures<'a> {
        /// Create a fixture helper bound to the provided pool.
        pub fn new(pool: &'a PgPool) -> Self {
            Self { pool }
        }

        /// Insert a contact row, returning the new id.
        pub async fn insert_contact(
            &self,
            name: &str,
            email: &str,
            phone: Option<&str>,
            birthdate: Option<NaiveDate>,
        ) -> Result<i32, sqlx::Error> {
            sqlx::query_scalar(
                "INSERT INTO contacts (name, email, phone, birthdate) VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .bind(name)
            .bind(email)
            .bind(phone)
            .bind(birthdate)
            .fetch_one(self.pool)
            .await
        }
    }

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use testcontainers_modules::postgres::Postgres;
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use thiserror::Error;
        use tokio::runtime::Handle;
        use uuid::Uuid;

        static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("TEST_DATABASE_URL not set")]
            MissingUrl,
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Ephemeral database factory for integration tests.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            admin_options: PgConnectOptions,
            database_name: String,
            container: Option<ContainerAsync<Postgres>>,
        }

        impl TestDatabase {
            /// Provision a fresh database from `TEST_DATABASE_URL`, or from a
            /// disposable Postgres container when `TEST_USE_CONTAINER=1`.
            pub async fn new_from_env() -> Result<Self, TestDatabaseError> {
                if let Ok(url) = std::env::var("TEST_DATABASE_URL") {
                    return Self::with_base_url(&url, None).await;
                }

                let use_container = std::env::var("TEST_USE_CONTAINER")
                    .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false);
                if use_container {
                    return Self::new().await;
                }

                Err(TestDatabaseError::MissingUrl)
            }

            /// Provision a fresh database by launching a disposable Postgres container.
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let container = Postgres::default().start().await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let admin_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                Self::with_base_url(&admin_url, Some(container)).await
            }

            async fn with_base_url(
                url: &str,
                container: Option<ContainerAsync<Postgres>>,
            ) -> Result<Self, TestDatabaseError> {
                let base_options: PgConnectOptions = url.parse().map_err(TestDatabaseError::Sqlx)?;
                let base_options = base_options.log_statements(LevelFilter::Off);

                let base_name = base_options
                    .get_database()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "postgres".to_string());

                let admin_options = base_options.clone().database("postgres");
                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(admin_options.clone())
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                let new_db_name = format!("{}_{}", base_name, Uuid::new_v4().simple());
                let create_sql = format!("CREATE DATABASE \"{}\" TEMPLATE template0", new_db_name);
                sqlx::query(&create_sql)
                    .execute(&admin_pool)
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;
                admin_pool.close().await;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(base_options.clone().database(&new_db_name))
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    admin_options,
                    database_name: new_db_name,
                    container,
                })
            }

            /// Cloneable connection pool for use in tests and Rocket state.
            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            /// Convenience method returning a clone of the pooled connection handle.
            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Close pool connections and drop the ephemeral database.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }

                drop_database_with_fallback(self.admin_options.clone(), &self.database_name)
                    .await
                    .map_err(TestDatabaseError::Sqlx)?;

                if let Some(container) = self.container.take() {
                    drop(container);
                }

                Ok(())
            }
        }

        async fn drop_database_with_fallback(
            admin_options: PgConnectOptions,
            database_name: &str,
        ) -> Result<(), sqlx::Error> {
            let admin_pool = PgPoolOptions::new()
                .max_connections(1)
                .connect_with(admin_options)
                .await?;

            let drop_force = format!("DROP DATABASE \"{}\" WITH (FORCE)", database_name);
            match sqlx::query(&drop_force).execute(&admin_pool).await {
                Ok(_) => Ok(()),
                Err(err) if force_drop_unsupported(&err) => {
                    let drop_sql = format!("DROP DATABASE \"{}\"", database_name);
                    sqlx::query(&drop_sql).execute(&admin_pool).await?;
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }

        fn force_drop_unsupported(err: &sqlx::Error) -> bool {
            matches!(
                err,
                sqlx::Error::Database(db_err)
                    if db_err
                        .code()
                        .map(|code| code == "42601" || code == "0A000")
                        .unwrap_or(false)
            )
        }

        impl Drop for TestDatabase {
            fn drop(&mut self) {
                if let Some(pool) = self.pool.take() {
                    let admin_options = self.admin_options.clone();
                    let db_name = self.database_name.clone();
                    if let Ok(handle) = Handle::try_current() {
                        handle.spawn(async move {
                            pool.close().await;
                            let _ =
                                drop_database_with_fallback(admin_options.clone(), &db_name).await;
                        });
                    } else {
                        std::thread::spawn(move || {
                            if let Ok(rt) = tokio::runtime::Runtime::new() {
                                rt.block_on(async move {
                                    pool.close().await;
                                    let _ = drop_database_with_fallback(
                                        admin_options.clone(),
                                        &db_name,
                                    )
                                    .await;
                                });
                            }
                        });
                    }
                }

                if let Some(container) = self.container.take() {
                    drop(container);
                }
            }
        }
    }

    type StateHook = Box<dyn FnOnce(Rocket<Build>) -> Rocket<Build> + Send>;

    /// Builder for constructing Rocket instances tailored for integration tests.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        pg_pool: Option<PgPool>,
        state: Vec<StateHook>,
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                ..Self::default()
            }
        }

        /// Mount routes under `/api/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api/v1".to_string(), routes));
            self
        }

        /// Manage a `PgPool` instance for tests that exercise database-backed routes.
        pub fn manage_pg_pool(mut self, pool: PgPool) -> Self {
            self.pg_pool = Some(pool);
            self
        }

        /// Manage any other piece of state (progress hub, channels, config...).
        pub fn manage<T: Send + Sync + 'static>(mut self, state: T) -> Self {
            self.state.push(Box::new(move |rocket| rocket.manage(state)));
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment);

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(pool) = self.pg_pool {
                rocket = rocket.manage(pool);
            }

            for hook in self.state {
                rocket = hook(rocket);
            }

            rocket
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
