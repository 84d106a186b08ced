//! PostgreSQL implementation of the asset and activity repositories.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

use crate::domain::{
    Activity, ActivityFilter, ActivityRepository, AppError, Asset, AssetFilter, AssetRepository,
    DatabaseError, FileStatus, NewActivity,
};

const ASSET_COLUMNS: &str = "content_hash, creator, owner, file_name, description, cover_image, \
     length, size, label, nft_status, file_status, price, nft_token, chain, version, \
     created_at, updated_at";

const ACTIVITY_COLUMNS: &str = "id, event_type, creator, content_hash, source, target, state, \
     tx_hash, nft_token, price, start_date, end_date";

/// PostgreSQL connection pool configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// PostgreSQL database client with connection pooling
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client with custom configuration
    pub async fn new(database_url: &str, config: PostgresConfig) -> Result<Self, AppError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client with default configuration
    pub async fn with_defaults(database_url: &str) -> Result<Self, AppError> {
        Self::new(database_url, PostgresConfig::default()).await
    }

    /// Run database migrations using sqlx migrate
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying connection pool (for testing)
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_asset(row: &sqlx::postgres::PgRow) -> Result<Asset, AppError> {
        Ok(Asset {
            content_hash: row.try_get("content_hash").map_err(DatabaseError::from)?,
            creator: row.try_get("creator").map_err(DatabaseError::from)?,
            owner: row.try_get("owner").map_err(DatabaseError::from)?,
            file_name: row.try_get("file_name").map_err(DatabaseError::from)?,
            description: row.try_get("description").map_err(DatabaseError::from)?,
            cover_image: row.try_get("cover_image").map_err(DatabaseError::from)?,
            length: row.try_get("length").map_err(DatabaseError::from)?,
            size: row.try_get("size").map_err(DatabaseError::from)?,
            label: row.try_get("label").map_err(DatabaseError::from)?,
            nft_status: parse_column(row, "nft_status")?,
            file_status: parse_column(row, "file_status")?,
            price: row.try_get("price").map_err(DatabaseError::from)?,
            nft_token: row.try_get("nft_token").map_err(DatabaseError::from)?,
            chain: row.try_get("chain").map_err(DatabaseError::from)?,
            version: row.try_get("version").map_err(DatabaseError::from)?,
            created_at: row.try_get("created_at").map_err(DatabaseError::from)?,
            updated_at: row.try_get("updated_at").map_err(DatabaseError::from)?,
        })
    }

    fn row_to_activity(row: &sqlx::postgres::PgRow) -> Result<Activity, AppError> {
        Ok(Activity {
            id: row.try_get("id").map_err(DatabaseError::from)?,
            event_type: parse_column(row, "event_type")?,
            creator: row.try_get("creator").map_err(DatabaseError::from)?,
            content_hash: row.try_get("content_hash").map_err(DatabaseError::from)?,
            source: row.try_get("source").map_err(DatabaseError::from)?,
            target: row.try_get("target").map_err(DatabaseError::from)?,
            state: parse_column(row, "state")?,
            tx_hash: row.try_get("tx_hash").map_err(DatabaseError::from)?,
            nft_token: row.try_get("nft_token").map_err(DatabaseError::from)?,
            price: row.try_get("price").map_err(DatabaseError::from)?,
            start_date: row.try_get("start_date").map_err(DatabaseError::from)?,
            end_date: row.try_get("end_date").map_err(DatabaseError::from)?,
        })
    }
}

/// Reads a text column holding one of the domain's lowercase enum names.
fn parse_column<T>(row: &sqlx::postgres::PgRow, column: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column).map_err(DatabaseError::from)?;
    raw.parse().map_err(|e: T::Err| {
        AppError::Database(DatabaseError::Query(format!(
            "column {} holds unknown value '{}': {}",
            column, raw, e
        )))
    })
}

#[async_trait]
impl AssetRepository for PostgresClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn asset_exists(&self, content_hash: &str) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM assets WHERE content_hash = $1)")
            .bind(content_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(row.try_get::<bool, _>(0).map_err(DatabaseError::from)?)
    }

    #[instrument(skip(self, asset), fields(content_hash = %asset.content_hash))]
    async fn create_asset(&self, asset: &Asset) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO assets (content_hash, creator, owner, file_name, description,
                                cover_image, length, size, label, nft_status, file_status,
                                price, nft_token, chain, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(&asset.content_hash)
        .bind(&asset.creator)
        .bind(&asset.owner)
        .bind(&asset.file_name)
        .bind(&asset.description)
        .bind(&asset.cover_image)
        .bind(&asset.length)
        .bind(asset.size)
        .bind(&asset.label)
        .bind(asset.nft_status.as_str())
        .bind(asset.file_status.as_str())
        .bind(&asset.price)
        .bind(&asset.nft_token)
        .bind(&asset.chain)
        .bind(asset.version)
        .bind(asset.created_at)
        .bind(asset.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_asset(&self, content_hash: &str) -> Result<Option<Asset>, AppError> {
        let query = format!("SELECT {} FROM assets WHERE content_hash = $1", ASSET_COLUMNS);
        let row = sqlx::query(&query)
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?;

        row.as_ref().map(Self::row_to_asset).transpose()
    }

    #[instrument(skip(self))]
    async fn find_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>, AppError> {
        let file_statuses: Vec<String> = filter
            .file_statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let query = format!(
            r#"
            SELECT {}
            FROM assets
            WHERE ($1::TEXT IS NULL OR owner = $1)
              AND ($2::TEXT IS NULL OR creator = $2)
              AND ($3::TEXT IS NULL OR nft_status = $3)
              AND (cardinality($4::TEXT[]) = 0 OR file_status = ANY($4))
            ORDER BY content_hash
            "#,
            ASSET_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(&filter.owner)
            .bind(&filter.creator)
            .bind(filter.nft_status.map(|s| s.as_str()))
            .bind(&file_statuses)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from)?;

        rows.iter().map(Self::row_to_asset).collect()
    }

    #[instrument(skip(self, asset), fields(content_hash = %asset.content_hash, version = asset.version))]
    async fn update_asset(&self, asset: &Asset) -> Result<Asset, AppError> {
        let query = format!(
            r#"
            UPDATE assets
            SET owner = $1,
                nft_status = $2,
                price = $3,
                nft_token = $4,
                version = version + 1,
                updated_at = $5
            WHERE content_hash = $6 AND version = $7
            RETURNING {}
            "#,
            ASSET_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(&asset.owner)
            .bind(asset.nft_status.as_str())
            .bind(&asset.price)
            .bind(&asset.nft_token)
            .bind(Utc::now())
            .bind(&asset.content_hash)
            .bind(asset.version)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from)?;

        if let Some(row) = row {
            return Self::row_to_asset(&row);
        }
        if self.asset_exists(&asset.content_hash).await? {
            return Err(AppError::Database(DatabaseError::StaleWrite(format!(
                "asset {} changed since version {}",
                asset.content_hash, asset.version
            ))));
        }
        Err(AppError::Database(DatabaseError::NotFound(format!(
            "asset {} not found",
            asset.content_hash
        ))))
    }

    #[instrument(skip(self))]
    async fn update_file_status(
        &self,
        content_hash: &str,
        status: FileStatus,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE assets SET file_status = $1, updated_at = $2 WHERE content_hash = $3",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(content_hash)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() == 0 {
            return Err(AppError::Database(DatabaseError::NotFound(format!(
                "asset {} not found",
                content_hash
            ))));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_asset(&self, content_hash: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM assets WHERE content_hash = $1")
            .bind(content_hash)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ActivityRepository for PostgresClient {
    #[instrument(skip(self, activity), fields(event_type = %activity.event_type, content_hash = %activity.content_hash))]
    async fn create_activity(&self, activity: &NewActivity) -> Result<Activity, AppError> {
        let row = sqlx::query(
            r#"
            INSERT INTO activities (event_type, creator, content_hash, source, target, state,
                                    nft_token, price, start_date, end_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(activity.event_type.as_str())
        .bind(&activity.creator)
        .bind(&activity.content_hash)
        .bind(&activity.source)
        .bind(&activity.target)
        .bind(activity.state.as_str())
        .bind(&activity.nft_token)
        .bind(&activity.price)
        .bind(activity.start_date)
        .bind(activity.end_date)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        let id: i64 = row.try_get("id").map_err(DatabaseError::from)?;
        Ok(activity.clone().into_activity(id))
    }

    #[instrument(skip(self, activity), fields(activity_id = activity.id, state = %activity.state))]
    async fn update_activity(&self, activity: &Activity) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE activities SET state = $1, tx_hash = $2, end_date = $3 WHERE id = $4",
        )
        .bind(activity.state.as_str())
        .bind(&activity.tx_hash)
        .bind(activity.end_date)
        .bind(activity.id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        if result.rows_affected() == 0 {
            return Err(AppError::Database(DatabaseError::NotFound(format!(
                "activity {} not found",
                activity.id
            ))));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_activities(&self, filter: &ActivityFilter) -> Result<Vec<Activity>, AppError> {
        let query = format!(
            r#"
            SELECT {}
            FROM activities
            WHERE ($1::TEXT IS NULL OR content_hash = $1)
              AND ($2::TEXT IS NULL OR event_type = $2)
              AND ($3::TEXT IS NULL OR state = $3)
            ORDER BY id DESC
            "#,
            ACTIVITY_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(&filter.content_hash)
            .bind(filter.event_type.map(|t| t.as_str()))
            .bind(filter.state.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from)?;

        rows.iter().map(Self::row_to_activity).collect()
    }
}
