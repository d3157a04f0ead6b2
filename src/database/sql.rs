use anyhow::Result;
use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::{PhotoIndex, PhotoRecord};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS Photos (
        S3Key VARCHAR(1024) NOT NULL,
        Description TEXT,
        Email VARCHAR(320)
    )"#;

const SELECT_ALL: &str =
    "SELECT S3Key AS s3_key, Description AS description, Email AS email FROM Photos";

fn build_insert_qry(placeholder: impl Fn(usize) -> String) -> String {
    format!(
        "INSERT INTO Photos (S3Key, Description, Email) VALUES ({}, {}, {})",
        placeholder(1),
        placeholder(2),
        placeholder(3),
    )
}

fn build_delete_qry(placeholder: impl Fn(usize) -> String) -> String {
    format!("DELETE FROM Photos WHERE S3Key = {}", placeholder(1))
}

/// Builds a pooled index backend for one sqlx driver.
///
/// The three drivers only differ in pool type and placeholder syntax, so the
/// implementation is shared through a macro rather than a generic over
/// `sqlx::Database`.
macro_rules! sql_index {
    ( $name:ident, $pool:ty, $options:ty, $placeholder:expr, $driver:expr ) => {
        pub struct $name {
            pool: $pool,
            insert_qry: String,
            delete_qry: String,
        }

        impl $name {
            /// Connect to the given database.
            ///
            /// This will build a connection pool with a maximum of
            /// `pool_size` connections.
            pub async fn connect(connection_uri: &str, pool_size: u32) -> Result<Self> {
                let pool = <$options>::new()
                    .max_connections(pool_size.max(1))
                    .connect(connection_uri)
                    .await?;

                info!(driver = $driver, "connected photo index");
                Ok(Self {
                    pool,
                    insert_qry: build_insert_qry($placeholder),
                    delete_qry: build_delete_qry($placeholder),
                })
            }
        }

        #[async_trait]
        impl PhotoIndex for $name {
            async fn ensure_tables(&self) -> Result<()> {
                info!("building tables");
                sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
                Ok(())
            }

            async fn insert(&self, record: &PhotoRecord) -> Result<()> {
                sqlx::query(&self.insert_qry)
                    .bind(&record.key)
                    .bind(&record.description)
                    .bind(&record.email)
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }

            async fn remove(&self, key: &str) -> Result<bool> {
                let result = sqlx::query(&self.delete_qry)
                    .bind(key)
                    .execute(&self.pool)
                    .await?;
                Ok(result.rows_affected() > 0)
            }

            async fn list(&self) -> Result<Vec<PhotoRecord>> {
                let rows = sqlx::query(SELECT_ALL).fetch_all(&self.pool).await?;

                rows.iter()
                    .map(|row| {
                        let description: Option<String> = row.try_get("description")?;
                        Ok(PhotoRecord {
                            key: row.try_get("s3_key")?,
                            description: description.unwrap_or_default(),
                            email: row.try_get("email")?,
                        })
                    })
                    .collect()
            }
        }
    };
}

sql_index!(PostgresIndex, PgPool, PgPoolOptions, |i| format!("${}", i), "postgres");
sql_index!(MySQLIndex, MySqlPool, MySqlPoolOptions, |_| "?".to_string(), "mysql");
sql_index!(SqliteIndex, SqlitePool, SqlitePoolOptions, |_| "?".to_string(), "sqlite");
