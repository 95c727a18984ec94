//! Throwaway PostgreSQL databases for `PgStore` tests.
//!
//! One container is started per test binary and every test gets its own
//! freshly migrated database inside it. With `TEST_DATABASE_URL` set, an
//! existing server is used instead of a container.

use crate::PgStore;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgConnection};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres as PostgresImage;
use tokio::sync::OnceCell;
use uuid::Uuid;

struct Server {
    /// Connection to the `postgres` maintenance database
    admin: PgConnectOptions,
    _container: Option<ContainerAsync<PostgresImage>>,
}

static SERVER: OnceCell<Server> = OnceCell::const_new();

async fn start_server() -> Server {
    if let Ok(url) = std::env::var("TEST_DATABASE_URL") {
        return Server {
            admin: url.parse().expect("Invalid TEST_DATABASE_URL"),
            _container: None,
        };
    }

    let container = PostgresImage::default()
        .with_user("duka_test")
        .with_password("duka_test_password")
        .with_db_name("duka_test")
        .with_env_var("POSTGRES_INITDB_ARGS", "--auth-host=trust")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get container port");
    let host = std::env::var("TESTCONTAINERS_HOST_OVERRIDE").unwrap_or_else(|_| "localhost".to_string());

    Server {
        admin: PgConnectOptions::new()
            .host(&host)
            .port(port)
            .username("duka_test")
            .password("duka_test_password")
            .database("postgres"),
        _container: Some(container),
    }
}

/// A store over a new, migrated database
pub async fn pg_store() -> PgStore {
    let server = SERVER.get_or_init(start_server).await;
    let name = format!("duka_store_test_{}", Uuid::new_v4().simple());

    let mut conn = PgConnection::connect_with(&server.admin)
        .await
        .expect("Failed to connect to postgres database");
    sqlx::query(&format!("CREATE DATABASE \"{}\"", name))
        .execute(&mut conn)
        .await
        .expect("Failed to create test database");
    conn.close().await.expect("Failed to close admin connection");

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect_with(server.admin.clone().database(&name))
        .await
        .expect("Failed to connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    PgStore::new(pool)
}
