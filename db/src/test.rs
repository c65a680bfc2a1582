//! Scratch Postgres databases for the `test-postgres` tests. Each test gets a
//! fresh database with the migrations applied, dropped again afterwards.

use std::future::Future;

use anyhow::{Context, Result};
use deadpool_diesel::Manager;
use diesel::{pg::PgConnection, prelude::*};
use diesel_migrations::MigrationHarness;

use crate::{pg::MIGRATIONS, Pool, PoolExt, StoreError};

/// Server connection settings from `TEST_DATABASE_*`, falling back to
/// `DATABASE_*` and then to a local server.
struct ServerSettings {
    base_url: String,
    maintenance_db: String,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let var = |name: &str| {
            std::env::var(format!("TEST_DATABASE_{name}"))
                .or_else(|_| std::env::var(format!("DATABASE_{name}")))
                .ok()
        };

        let host = var("HOST").unwrap_or_else(|| "localhost".to_string());
        let port = match var("PORT") {
            Some(port) => port.parse::<u16>().context("parsing database port")?,
            None => 5432,
        };
        let user = var("USER").unwrap_or_else(|| "postgres".to_string());
        let password = var("PASSWORD").unwrap_or_default();

        Ok(ServerSettings {
            base_url: format!("postgresql://{user}:{password}@{host}:{port}"),
            maintenance_db: var("GLOBAL_DB").unwrap_or_else(|| "postgres".to_string()),
        })
    }

    fn maintenance_url(&self) -> String {
        format!("{}/{}", self.base_url, self.maintenance_db)
    }
}

#[derive(Clone)]
pub struct TestDatabase {
    pub name: String,
    pub url: String,
    pub pool: Pool,
    maintenance_url: String,
}

impl TestDatabase {
    pub async fn create() -> Result<TestDatabase> {
        let settings = ServerSettings::from_env()?;
        let name = format!("visuasort_test_{}", crate::new_uuid().simple());
        let maintenance_url = settings.maintenance_url();

        let mut conn = PgConnection::establish(&maintenance_url)
            .with_context(|| format!("connecting to {}", settings.maintenance_db))?;
        diesel::sql_query(format!(r#"CREATE DATABASE "{name}""#)).execute(&mut conn)?;

        let url = format!("{}/{name}", settings.base_url);
        let pool = Pool::builder(Manager::new(url.clone(), deadpool_diesel::Runtime::Tokio1))
            .max_size(4)
            .build()?;
        pool.interact(|conn| {
            conn.run_pending_migrations(MIGRATIONS)
                .map(|_| ())
                .map_err(|e| StoreError::Migration(e.to_string()))
        })
        .await?;

        Ok(TestDatabase {
            name,
            url,
            pool,
            maintenance_url,
        })
    }

    pub fn drop_db(&self) -> Result<()> {
        let mut conn = PgConnection::establish(&self.maintenance_url)?;
        diesel::sql_query(format!(r#"DROP DATABASE "{}" (FORCE)"#, self.name))
            .execute(&mut conn)?;
        Ok(())
    }
}

pub async fn run_database_test<F, R>(f: F)
where
    F: FnOnce(TestDatabase) -> R,
    R: Future<Output = Result<()>>,
{
    let database = TestDatabase::create().await.expect("Creating database");
    let result = f(database.clone()).await;
    database.drop_db().expect("Cleaning up");
    result.unwrap();
}
