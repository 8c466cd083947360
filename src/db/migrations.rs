use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if current_version < 2 {
        debug!("Running migration v2");
        run_migration_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating tweets table");

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS tweets (
            id TEXT PRIMARY KEY,
            handle TEXT NOT NULL,
            title TEXT,
            summary TEXT,
            published TEXT NOT NULL,
            nitter_url TEXT,
            x_url TEXT,
            image_urls TEXT,
            server_image_urls TEXT,
            profile_pic_url TEXT,
            raw_description TEXT,
            is_retweet INTEGER NOT NULL DEFAULT 0,
            is_reply INTEGER NOT NULL DEFAULT 0,
            retweet_author TEXT,
            quote_tweet_url TEXT,
            quote_author TEXT,
            quote_text TEXT,
            quote_image_urls TEXT,
            first_seen TEXT NOT NULL DEFAULT (datetime('now')),
            included_in_newsletter INTEGER NOT NULL DEFAULT 0
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create tweets table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tweets_handle_published ON tweets(handle, published)")
        .execute(pool)
        .await
        .context("Failed to create tweets index")?;

    Ok(())
}

async fn run_migration_v2(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v2: adding serialized quote data");

    // Either a JSON quote tree or legacy plain text.
    sqlx::query("ALTER TABLE tweets ADD COLUMN quote_data TEXT")
        .execute(pool)
        .await
        .context("Failed to add quote_data column")?;

    Ok(())
}
